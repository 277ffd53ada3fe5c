//! Submit-then-poll composition, run as a cancellable background task.

use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::models::analysis::Submission;
use crate::models::job::JobHandle;
use crate::services::errors::JobError;
use crate::services::job_client::JobBackend;
use crate::services::polling::{JobEvent, JobObserver, PollConfig, PollingOrchestrator, TrackOutcome};

/// Caller-side cancellation signal for a tracked job.
///
/// Cancellation is cooperative: no new poll starts once it is raised, and the
/// result of any call already in flight is discarded.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// A job being tracked on a background task.
///
/// Dropping it detaches the task; call [`TrackedJob::cancel`] first to stop polling.
#[derive(Debug)]
pub struct TrackedJob {
    cancel: CancellationToken,
    task: JoinHandle<Result<TrackOutcome, JobError>>,
}

impl TrackedJob {
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            token: self.cancel.clone(),
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the job to settle.
    pub async fn wait(self) -> Result<TrackOutcome, JobError> {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "Job tracking task did not finish");
                Err(JobError::TaskAborted(e.to_string()))
            }
        }
    }
}

/// Composes submission, polling and result delivery for one backend.
pub struct JobTracker<B: ?Sized> {
    backend: Arc<B>,
    config: PollConfig,
}

impl<B: ?Sized> Clone for JobTracker<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            config: self.config,
        }
    }
}

impl<B> JobTracker<B>
where
    B: JobBackend + ?Sized + 'static,
{
    pub fn new(backend: Arc<B>, config: PollConfig) -> Self {
        Self { backend, config }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Submit `submission` and poll it to completion on a spawned task.
    ///
    /// Submission failures are reported to `observer` and returned from
    /// [`TrackedJob::wait`], like every later failure.
    pub fn submit_and_track<O>(&self, submission: Submission, mut observer: O) -> TrackedJob
    where
        O: JobObserver + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let backend = Arc::clone(&self.backend);
        let config = self.config;

        let task = tokio::spawn(async move {
            if token.is_cancelled() {
                return Ok(TrackOutcome::Cancelled);
            }

            let handle = match backend.submit(&submission).await {
                Ok(handle) => handle,
                Err(error) if token.is_cancelled() => {
                    tracing::info!(
                        kind = submission.kind(),
                        error = %error,
                        "Submission failed after cancellation, discarding"
                    );
                    return Ok(TrackOutcome::Cancelled);
                }
                Err(error) => {
                    tracing::warn!(kind = submission.kind(), error = %error, "Job submission failed");
                    metrics::counter!("analysis_jobs_failed_total", "reason" => error.kind())
                        .increment(1);
                    observer.on_error(&error);
                    return Err(error);
                }
            };

            if token.is_cancelled() {
                tracing::info!(job_id = %handle.job_id, "Cancelled before polling started");
                return Ok(TrackOutcome::Cancelled);
            }
            observer.on_submitted(&handle);

            PollingOrchestrator::new(backend, config)
                .run(&handle, &mut observer, &token)
                .await
        });

        TrackedJob { cancel, task }
    }

    /// Same as [`JobTracker::submit_and_track`], with events delivered over a channel.
    pub fn submit_with_events(&self, submission: Submission) -> (TrackedJob, UnboundedReceiver<JobEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (self.submit_and_track(submission, tx), rx)
    }

    /// Resume tracking a job that was submitted earlier.
    pub fn track<O>(&self, handle: JobHandle, mut observer: O) -> TrackedJob
    where
        O: JobObserver + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let backend = Arc::clone(&self.backend);
        let config = self.config;

        let task = tokio::spawn(async move {
            PollingOrchestrator::new(backend, config)
                .run(&handle, &mut observer, &token)
                .await
        });

        TrackedJob { cancel, task }
    }
}
