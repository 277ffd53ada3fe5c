//! Test helper utilities: a scripted in-memory backend and a recording observer.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use troubleshoot_client::models::analysis::{AnalysisMetadata, AnalysisRequest, AnalysisResult, Submission};
use troubleshoot_client::models::job::{JobHandle, JobProgressSnapshot, JobStatus};
use troubleshoot_client::services::errors::JobError;
use troubleshoot_client::services::job_client::{AnalysisService, JobBackend};
use troubleshoot_client::services::polling::{JobEvent, JobObserver};

pub const JOB_ID: &str = "job-1";

pub fn handle() -> JobHandle {
    JobHandle::new(JOB_ID, Utc::now())
}

pub fn snapshot(status: JobStatus, percent: u8, step: u32) -> JobProgressSnapshot {
    JobProgressSnapshot::new(JOB_ID, status, step, 5).with_percentage(percent)
}

pub fn processing(percent: u8, step: u32) -> JobProgressSnapshot {
    snapshot(JobStatus::Processing, percent, step)
}

pub fn completed() -> JobProgressSnapshot {
    snapshot(JobStatus::Completed, 100, 5)
}

pub fn analysis_result(conversation_id: Option<&str>) -> AnalysisResult {
    AnalysisResult {
        request_id: "req-1".to_string(),
        summary: "Database connection pool exhausted".to_string(),
        immediate_actions: vec!["Raise pool size".to_string()],
        analysis_metadata: AnalysisMetadata {
            conversation_id: conversation_id.map(str::to_string),
            ..AnalysisMetadata::default()
        },
        ..AnalysisResult::default()
    }
}

/// Request that the routing policy always sends to a background job.
pub fn complex_request() -> AnalysisRequest {
    AnalysisRequest::new("Why does checkout crash?")
        .with_stacktrace("java.lang.IllegalStateException: pool closed\n\tat com.acme.Pool.get(Pool.java:88)")
}

/// In-memory backend that replays a scripted sequence of status responses.
pub struct ScriptedBackend {
    statuses: Mutex<VecDeque<Result<JobProgressSnapshot, JobError>>>,
    /// Served once the script runs out.
    fallback_status: Mutex<Option<JobProgressSnapshot>>,
    submit_response: Mutex<Result<JobHandle, JobError>>,
    result_response: Mutex<Result<AnalysisResult, JobError>>,
    sync_response: Mutex<Result<AnalysisResult, JobError>>,
    status_delay: Mutex<Option<Duration>>,
    submit_gate: Mutex<Option<Arc<Notify>>>,
    pub submissions: Mutex<Vec<Submission>>,
    pub submit_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub result_calls: AtomicUsize,
    pub sync_calls: AtomicUsize,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self {
            statuses: Mutex::new(VecDeque::new()),
            fallback_status: Mutex::new(None),
            submit_response: Mutex::new(Ok(handle())),
            result_response: Mutex::new(Ok(analysis_result(Some("conv-1")))),
            sync_response: Mutex::new(Ok(analysis_result(Some("conv-sync")))),
            status_delay: Mutex::new(None),
            submit_gate: Mutex::new(None),
            submissions: Mutex::new(Vec::new()),
            submit_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            result_calls: AtomicUsize::new(0),
            sync_calls: AtomicUsize::new(0),
        }
    }
}

impl ScriptedBackend {
    pub fn with_statuses<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = JobProgressSnapshot>,
    {
        let backend = Self::default();
        for s in statuses {
            backend.push_status(Ok(s));
        }
        backend
    }

    pub fn push_status(&self, status: Result<JobProgressSnapshot, JobError>) {
        self.statuses.lock().unwrap().push_back(status);
    }

    pub fn set_fallback_status(&self, status: JobProgressSnapshot) {
        *self.fallback_status.lock().unwrap() = Some(status);
    }

    pub fn set_submit_response(&self, response: Result<JobHandle, JobError>) {
        *self.submit_response.lock().unwrap() = response;
    }

    pub fn set_result_response(&self, response: Result<AnalysisResult, JobError>) {
        *self.result_response.lock().unwrap() = response;
    }

    pub fn set_status_delay(&self, delay: Duration) {
        *self.status_delay.lock().unwrap() = Some(delay);
    }

    /// Make `submit` wait until the returned notifier fires.
    pub fn gate_submissions(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.submit_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn submits(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn polls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn result_fetches(&self) -> usize {
        self.result_calls.load(Ordering::SeqCst)
    }

    pub fn sync_analyses(&self) -> usize {
        self.sync_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobBackend for ScriptedBackend {
    async fn submit(&self, submission: &Submission) -> Result<JobHandle, JobError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.submissions.lock().unwrap().push(submission.clone());

        let gate = self.submit_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.submit_response.lock().unwrap().clone()
    }

    async fn fetch_status(&self, _handle: &JobHandle) -> Result<JobProgressSnapshot, JobError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.status_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.statuses.lock().unwrap().pop_front();
        match next {
            Some(status) => status,
            None => self
                .fallback_status
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| JobError::StatusFetchFailed("script exhausted".to_string())),
        }
    }

    async fn fetch_result(&self, _handle: &JobHandle) -> Result<AnalysisResult, JobError> {
        self.result_calls.fetch_add(1, Ordering::SeqCst);
        self.result_response.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnalysisService for ScriptedBackend {
    async fn analyze_sync(&self, _request: &AnalysisRequest) -> Result<AnalysisResult, JobError> {
        self.sync_calls.fetch_add(1, Ordering::SeqCst);
        self.sync_response.lock().unwrap().clone()
    }
}

/// Observer that records every event; clones share the same log.
#[derive(Clone, Default)]
pub struct RecordingObserver {
    events: Arc<Mutex<Vec<JobEvent>>>,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise `token` as soon as the `n`th progress snapshot arrives.
    pub fn cancelling_after(n: usize, token: CancellationToken) -> Self {
        Self {
            events: Arc::default(),
            cancel_after: Some((n, token)),
        }
    }

    pub fn events(&self) -> Vec<JobEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn progress(&self) -> Vec<JobProgressSnapshot> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                JobEvent::Progress(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<JobError> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                JobEvent::Error(err) => Some(err),
                _ => None,
            })
            .collect()
    }
}

impl JobObserver for RecordingObserver {
    fn on_submitted(&mut self, handle: &JobHandle) {
        self.events.lock().unwrap().push(JobEvent::Submitted(handle.clone()));
    }

    fn on_progress(&mut self, snapshot: &JobProgressSnapshot) {
        let count = {
            let mut events = self.events.lock().unwrap();
            events.push(JobEvent::Progress(snapshot.clone()));
            events.iter().filter(|e| matches!(e, JobEvent::Progress(_))).count()
        };
        if let Some((n, token)) = &self.cancel_after {
            if count == *n {
                token.cancel();
            }
        }
    }

    fn on_error(&mut self, error: &JobError) {
        self.events.lock().unwrap().push(JobEvent::Error(error.clone()));
    }
}
