//! Bounded status polling for background analysis jobs.
//!
//! One status fetch at a time per job, a fixed delay between polls, a hard
//! attempt ceiling, and exactly one result fetch once the job completes.

use garde::Validate;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use crate::models::analysis::AnalysisResult;
use crate::models::job::{JobHandle, JobProgressSnapshot, JobStatus};
use crate::services::errors::JobError;
use crate::services::job_client::JobBackend;

const DEFAULT_POLL_INTERVAL_MS: u64 = 1500;
const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 200;

/// Timing policy for the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
        }
    }
}

impl PollConfig {
    /// Approximate wall-clock ceiling of one poll loop.
    pub fn ceiling(&self) -> Duration {
        self.interval * self.max_attempts
    }
}

/// How a tracked job settled, when it did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackOutcome {
    Completed(AnalysisResult),
    /// The caller abandoned the job. Not an error.
    Cancelled,
}

impl TrackOutcome {
    pub fn into_result(self) -> Option<AnalysisResult> {
        match self {
            TrackOutcome::Completed(result) => Some(result),
            TrackOutcome::Cancelled => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TrackOutcome::Cancelled)
    }
}

/// Receives progress and errors while a job is tracked.
///
/// Errors passed to `on_error` are the same values the tracking call returns.
/// Transport failures that still have retry budget are reported here too, as
/// advisories that do not end the loop.
pub trait JobObserver: Send {
    fn on_submitted(&mut self, _handle: &JobHandle) {}

    fn on_progress(&mut self, snapshot: &JobProgressSnapshot);

    fn on_error(&mut self, error: &JobError);
}

impl<O: JobObserver + ?Sized> JobObserver for &mut O {
    fn on_submitted(&mut self, handle: &JobHandle) {
        (**self).on_submitted(handle)
    }

    fn on_progress(&mut self, snapshot: &JobProgressSnapshot) {
        (**self).on_progress(snapshot)
    }

    fn on_error(&mut self, error: &JobError) {
        (**self).on_error(error)
    }
}

impl<O: JobObserver + ?Sized> JobObserver for Box<O> {
    fn on_submitted(&mut self, handle: &JobHandle) {
        (**self).on_submitted(handle)
    }

    fn on_progress(&mut self, snapshot: &JobProgressSnapshot) {
        (**self).on_progress(snapshot)
    }

    fn on_error(&mut self, error: &JobError) {
        (**self).on_error(error)
    }
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl JobObserver for NoopObserver {
    fn on_progress(&mut self, _snapshot: &JobProgressSnapshot) {}

    fn on_error(&mut self, _error: &JobError) {}
}

/// Observer built from a pair of closures.
pub struct FnObserver<P, E> {
    on_progress: P,
    on_error: E,
}

impl<P, E> FnObserver<P, E>
where
    P: FnMut(&JobProgressSnapshot) + Send,
    E: FnMut(&JobError) + Send,
{
    pub fn new(on_progress: P, on_error: E) -> Self {
        Self { on_progress, on_error }
    }
}

impl<P, E> JobObserver for FnObserver<P, E>
where
    P: FnMut(&JobProgressSnapshot) + Send,
    E: FnMut(&JobError) + Send,
{
    fn on_progress(&mut self, snapshot: &JobProgressSnapshot) {
        (self.on_progress)(snapshot)
    }

    fn on_error(&mut self, error: &JobError) {
        (self.on_error)(error)
    }
}

/// One event emitted while tracking a job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Submitted(JobHandle),
    Progress(JobProgressSnapshot),
    Error(JobError),
}

/// Channel observer: each event is forwarded to the receiver side.
/// A dropped receiver is not an error, the events are simply discarded.
impl JobObserver for UnboundedSender<JobEvent> {
    fn on_submitted(&mut self, handle: &JobHandle) {
        let _ = self.send(JobEvent::Submitted(handle.clone()));
    }

    fn on_progress(&mut self, snapshot: &JobProgressSnapshot) {
        let _ = self.send(JobEvent::Progress(snapshot.clone()));
    }

    fn on_error(&mut self, error: &JobError) {
        let _ = self.send(JobEvent::Error(error.clone()));
    }
}

/// Build the error for a backend-reported FAILED or TIMEOUT snapshot.
fn terminal_error(handle: &JobHandle, snapshot: &JobProgressSnapshot) -> JobError {
    let message = snapshot
        .error_message
        .clone()
        .filter(|m| !m.trim().is_empty());
    match snapshot.status {
        JobStatus::Timeout => JobError::JobTimedOut {
            job_id: handle.job_id.clone(),
            message: message.unwrap_or_else(|| "Analysis job timed out on the backend".to_string()),
        },
        _ => JobError::JobFailed {
            job_id: handle.job_id.clone(),
            message: message.unwrap_or_else(|| "Analysis job failed".to_string()),
        },
    }
}

/// Drives status polls for one job until it settles.
pub struct PollingOrchestrator<B: ?Sized> {
    backend: Arc<B>,
    config: PollConfig,
}

impl<B: JobBackend + ?Sized> PollingOrchestrator<B> {
    pub fn new(backend: Arc<B>, config: PollConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> PollConfig {
        self.config
    }

    /// Poll `handle` until a terminal snapshot, the attempt ceiling, or cancellation.
    ///
    /// Progress is delivered for every successful poll, in poll order. On
    /// COMPLETED the result is fetched exactly once. Once `cancel` is observed no
    /// further callbacks are made and the outcome is [`TrackOutcome::Cancelled`].
    pub async fn run<O>(
        &self,
        handle: &JobHandle,
        observer: &mut O,
        cancel: &CancellationToken,
    ) -> Result<TrackOutcome, JobError>
    where
        O: JobObserver + ?Sized,
    {
        let started = Instant::now();
        let max_attempts = self.config.max_attempts;
        let mut attempts: u32 = 0;

        tracing::debug!(
            job_id = %handle.job_id,
            interval_ms = self.config.interval.as_millis() as u64,
            max_attempts,
            "Starting job polling"
        );

        while attempts < max_attempts {
            if cancel.is_cancelled() {
                return Ok(self.cancelled(handle, attempts));
            }

            metrics::counter!("analysis_poll_attempts_total").increment(1);
            let fetched = self.backend.fetch_status(handle).await.and_then(|snapshot| {
                snapshot.validate().map_err(|report| {
                    JobError::StatusFetchFailed(format!("malformed status payload: {}", report))
                })?;
                Ok(snapshot)
            });

            // In-flight results are discarded once cancellation is seen.
            if cancel.is_cancelled() {
                return Ok(self.cancelled(handle, attempts));
            }
            attempts += 1;

            match fetched {
                Ok(snapshot) => {
                    observer.on_progress(&snapshot);

                    match snapshot.status {
                        JobStatus::Completed => {
                            return self
                                .fetch_final_result(handle, observer, cancel, started, attempts)
                                .await;
                        }
                        JobStatus::Failed | JobStatus::Timeout => {
                            let error = terminal_error(handle, &snapshot);
                            tracing::warn!(
                                job_id = %handle.job_id,
                                status = %snapshot.status,
                                error = %error,
                                "Job reached a failed terminal state"
                            );
                            return Err(self.fail(observer, error));
                        }
                        JobStatus::Created | JobStatus::Processing => {
                            tracing::trace!(
                                job_id = %handle.job_id,
                                attempt = attempts,
                                percent = snapshot.completion_percentage,
                                "Job still running"
                            );
                        }
                    }
                }
                Err(error) => {
                    tracing::warn!(
                        job_id = %handle.job_id,
                        attempt = attempts,
                        max_attempts,
                        error = %error,
                        "Status poll failed"
                    );
                    observer.on_error(&error);

                    if attempts >= max_attempts {
                        metrics::counter!("analysis_jobs_failed_total", "reason" => error.kind())
                            .increment(1);
                        return Err(error);
                    }
                }
            }

            if attempts < max_attempts && !self.wait(cancel).await {
                return Ok(self.cancelled(handle, attempts));
            }
        }

        let error = JobError::PollingTimedOut {
            attempts,
            ceiling: self.config.ceiling(),
        };
        tracing::warn!(job_id = %handle.job_id, attempts, "Job polling ceiling reached");
        Err(self.fail(observer, error))
    }

    async fn fetch_final_result<O>(
        &self,
        handle: &JobHandle,
        observer: &mut O,
        cancel: &CancellationToken,
        started: Instant,
        attempts: u32,
    ) -> Result<TrackOutcome, JobError>
    where
        O: JobObserver + ?Sized,
    {
        let fetched = self.backend.fetch_result(handle).await;
        if cancel.is_cancelled() {
            return Ok(self.cancelled(handle, attempts));
        }

        match fetched {
            Ok(result) => {
                metrics::counter!("analysis_jobs_completed_total").increment(1);
                metrics::histogram!("analysis_job_duration_seconds")
                    .record(started.elapsed().as_secs_f64());
                tracing::info!(
                    job_id = %handle.job_id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Job completed"
                );
                Ok(TrackOutcome::Completed(result))
            }
            Err(error) => {
                if matches!(error, JobError::ResultNotReady(_)) {
                    tracing::error!(
                        job_id = %handle.job_id,
                        "Backend reported result not ready after COMPLETED status"
                    );
                }
                Err(self.fail(observer, error))
            }
        }
    }

    /// Report a terminal failure through the observer and hand it back for returning.
    fn fail<O>(&self, observer: &mut O, error: JobError) -> JobError
    where
        O: JobObserver + ?Sized,
    {
        metrics::counter!("analysis_jobs_failed_total", "reason" => error.kind()).increment(1);
        observer.on_error(&error);
        error
    }

    fn cancelled(&self, handle: &JobHandle, attempts: u32) -> TrackOutcome {
        metrics::counter!("analysis_jobs_cancelled_total").increment(1);
        tracing::info!(job_id = %handle.job_id, attempts, "Job tracking cancelled");
        TrackOutcome::Cancelled
    }

    /// Sleep one poll interval. Returns `false` if cancelled while waiting.
    async fn wait(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = sleep(self.config.interval) => true,
        }
    }
}
