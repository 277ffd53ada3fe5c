//! Conversation-scoped driver that routes each user turn through the job lifecycle.
//!
//! Holds the state that belongs to one conversation thread: its backend
//! conversation id, the single-flight gate, the job being tracked, and the
//! latest reconciled step timeline.

use garde::Validate;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::models::analysis::{AnalysisRequest, AnalysisResult, FollowUpRequest, Submission};
use crate::models::job::{JobHandle, JobProgressSnapshot};
use crate::models::timeline::{AnimationPlan, Reconciliation, StepTimeline};
use crate::services::errors::JobError;
use crate::services::job_client::AnalysisService;
use crate::services::policy::should_use_async;
use crate::services::polling::{JobObserver, PollConfig, TrackOutcome};
use crate::services::single_flight::{SingleFlight, SingleFlightPermit};
use crate::services::timeline::{StepLabelPolicy, StepTimelineReconciler};
use crate::services::tracker::{CancelHandle, JobTracker};

/// How one user turn ended, when it did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Completed(AnalysisResult),
    Cancelled,
    /// Another turn was already in flight; nothing was sent.
    Skipped,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Reconciles every snapshot into the shared timeline before forwarding it.
///
/// Lives on the tracking task, so the turn's permit is held until that task
/// settles rather than until the caller stops waiting.
struct TimelineObserver<O> {
    inner: O,
    reconciler: StepTimelineReconciler,
    latest: Arc<Mutex<Option<Reconciliation>>>,
    _permit: SingleFlightPermit,
}

impl<O: JobObserver> JobObserver for TimelineObserver<O> {
    fn on_submitted(&mut self, handle: &JobHandle) {
        self.inner.on_submitted(handle)
    }

    fn on_progress(&mut self, snapshot: &JobProgressSnapshot) {
        {
            let mut latest = lock(&self.latest);
            let previous = latest.as_ref().map(|r| &r.timeline);
            let next = self.reconciler.reconcile(previous, snapshot);
            *latest = Some(next);
        }
        self.inner.on_progress(snapshot)
    }

    fn on_error(&mut self, error: &JobError) {
        self.inner.on_error(error)
    }
}

/// Registers the tracked job as the session's active one for the length of a turn.
///
/// Dropping it cancels the job and clears the slot, including when the turn's
/// future is dropped before the job settles.
struct ActiveTurn<'a> {
    slot: &'a Mutex<Option<CancelHandle>>,
    handle: CancelHandle,
}

impl<'a> ActiveTurn<'a> {
    fn register(slot: &'a Mutex<Option<CancelHandle>>, handle: CancelHandle) -> Self {
        *lock(slot) = Some(handle.clone());
        Self { slot, handle }
    }
}

impl Drop for ActiveTurn<'_> {
    fn drop(&mut self) {
        self.handle.cancel();
        *lock(self.slot) = None;
    }
}

pub struct ConversationSession<S: ?Sized> {
    service: Arc<S>,
    tracker: JobTracker<S>,
    reconciler: StepTimelineReconciler,
    guard: SingleFlight,
    conversation_id: Mutex<Option<String>>,
    active: Mutex<Option<CancelHandle>>,
    latest: Arc<Mutex<Option<Reconciliation>>>,
}

impl<S> ConversationSession<S>
where
    S: AnalysisService + ?Sized + 'static,
{
    pub fn new(service: Arc<S>, poll: PollConfig) -> Self {
        Self::with_labels(service, poll, StepLabelPolicy::default())
    }

    pub fn with_labels(service: Arc<S>, poll: PollConfig, labels: StepLabelPolicy) -> Self {
        Self {
            tracker: JobTracker::new(Arc::clone(&service), poll),
            service,
            reconciler: StepTimelineReconciler::new(labels),
            guard: SingleFlight::new(),
            conversation_id: Mutex::new(None),
            active: Mutex::new(None),
            latest: Arc::new(Mutex::new(None)),
        }
    }

    pub fn conversation_id(&self) -> Option<String> {
        lock(&self.conversation_id).clone()
    }

    pub fn is_busy(&self) -> bool {
        self.guard.is_busy()
    }

    /// Timeline after the most recent progress snapshot of the current job.
    pub fn timeline(&self) -> Option<StepTimeline> {
        lock(&self.latest).as_ref().map(|r| r.timeline.clone())
    }

    /// Catch-up plan from the most recent snapshot, left in place for the next call.
    pub fn animation_plan(&self) -> AnimationPlan {
        lock(&self.latest)
            .as_ref()
            .map(|r| r.animation_plan.clone())
            .unwrap_or_default()
    }

    /// Stop tracking the job in flight, if any.
    pub fn cancel(&self) {
        if let Some(handle) = lock(&self.active).as_ref() {
            tracing::info!("Cancelling active analysis");
            handle.cancel();
        }
    }

    /// Run one analysis turn.
    ///
    /// Returns [`SessionOutcome::Skipped`] without any network call if another
    /// turn is still in flight on this session.
    pub async fn analyze<O>(&self, request: AnalysisRequest, mut observer: O) -> Result<SessionOutcome, JobError>
    where
        O: JobObserver + 'static,
    {
        let Some(permit) = self.guard.try_acquire() else {
            tracing::info!("Analysis already in progress, skipping duplicate submission");
            return Ok(SessionOutcome::Skipped);
        };

        if let Err(report) = request.validate() {
            let error = JobError::from(report);
            observer.on_error(&error);
            return Err(error);
        }

        if should_use_async(&request) {
            tracing::info!("Using background job for complex request");
            self.track(Submission::Analysis(request), observer, permit).await
        } else {
            tracing::info!("Using synchronous analysis for simple request");
            match self.service.analyze_sync(&request).await {
                Ok(result) => {
                    self.remember_conversation(&result);
                    Ok(SessionOutcome::Completed(result))
                }
                Err(error) => {
                    observer.on_error(&error);
                    Err(error)
                }
            }
        }
    }

    /// Send a follow-up message in the current conversation as a background job.
    pub async fn follow_up<O>(&self, message: &str, mut observer: O) -> Result<SessionOutcome, JobError>
    where
        O: JobObserver + 'static,
    {
        let Some(conversation_id) = self.conversation_id() else {
            let error = JobError::NoActiveConversation;
            observer.on_error(&error);
            return Err(error);
        };

        let Some(permit) = self.guard.try_acquire() else {
            tracing::info!(conversation_id = %conversation_id, "Follow-up already in progress, skipping");
            return Ok(SessionOutcome::Skipped);
        };

        let submission = Submission::FollowUp {
            conversation_id,
            request: FollowUpRequest {
                message: message.to_string(),
                user_id: None,
            },
        };
        self.track(submission, observer, permit).await
    }

    /// Forget the conversation and any timeline, cancelling an in-flight job.
    pub fn reset(&self) {
        self.cancel();
        *lock(&self.conversation_id) = None;
        *lock(&self.latest) = None;
        tracing::info!("Conversation reset");
    }

    async fn track<O>(
        &self,
        submission: Submission,
        observer: O,
        permit: SingleFlightPermit,
    ) -> Result<SessionOutcome, JobError>
    where
        O: JobObserver + 'static,
    {
        *lock(&self.latest) = None;

        let observer = TimelineObserver {
            inner: observer,
            reconciler: self.reconciler.clone(),
            latest: Arc::clone(&self.latest),
            _permit: permit,
        };
        let job = self.tracker.submit_and_track(submission, observer);
        let turn = ActiveTurn::register(&self.active, job.cancel_handle());

        let outcome = job.wait().await;
        drop(turn);

        match outcome? {
            TrackOutcome::Completed(result) => {
                self.remember_conversation(&result);
                Ok(SessionOutcome::Completed(result))
            }
            TrackOutcome::Cancelled => Ok(SessionOutcome::Cancelled),
        }
    }

    fn remember_conversation(&self, result: &AnalysisResult) {
        if let Some(id) = result.conversation_id() {
            let mut current = lock(&self.conversation_id);
            if current.as_deref() != Some(id) {
                tracing::info!(conversation_id = %id, "Conversation linked");
                *current = Some(id.to_string());
            }
        }
    }
}
