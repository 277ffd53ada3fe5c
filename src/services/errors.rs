use std::time::Duration;

/// Message shown to users when the backend's per-user concurrent job cap is hit.
pub const RATE_LIMITED_MESSAGE: &str =
    "Too many concurrent analyses: wait for a running analysis to finish and try again";

/// Error taxonomy for the analysis job lifecycle.
///
/// Every variant renders a non-empty, user-presentable message. The same value is
/// handed to observers and returned from the governing task.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    #[error("{0}")]
    RateLimited(String),

    #[error("Backend accepted the submission but returned no usable job data: {0}")]
    InvalidJobData(String),

    #[error("Failed to submit analysis: {0}")]
    SubmissionFailed(String),

    #[error("Failed to fetch job status: {0}")]
    StatusFetchFailed(String),

    #[error("Failed to fetch job result: {0}")]
    ResultFetchFailed(String),

    #[error("Job result not ready: {0}")]
    ResultNotReady(String),

    /// Backend reported FAILED. Displays the backend message verbatim.
    #[error("{message}")]
    JobFailed { job_id: String, message: String },

    /// Backend reported TIMEOUT. Displays the backend message verbatim.
    #[error("{message}")]
    JobTimedOut { job_id: String, message: String },

    /// Client-side ceiling reached without a terminal snapshot.
    #[error("Job polling exceeded {} without a final status", describe_ceiling(.ceiling))]
    PollingTimedOut { attempts: u32, ceiling: Duration },

    #[error("No active conversation for follow-up")]
    NoActiveConversation,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Job tracking task aborted: {0}")]
    TaskAborted(String),
}

impl JobError {
    /// Whether the caller may reasonably resubmit.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            JobError::InvalidJobData(_) | JobError::SubmissionFailed(_) | JobError::StatusFetchFailed(_)
        )
    }

    /// Terminal outcome reported by the backend itself (FAILED or TIMEOUT).
    pub fn is_backend_terminal(&self) -> bool {
        matches!(self, JobError::JobFailed { .. } | JobError::JobTimedOut { .. })
    }

    /// Short machine-friendly label, used for logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::RateLimited(_) => "rate_limited",
            JobError::InvalidJobData(_) => "invalid_job_data",
            JobError::SubmissionFailed(_) => "submission_failed",
            JobError::StatusFetchFailed(_) => "status_fetch_failed",
            JobError::ResultFetchFailed(_) => "result_fetch_failed",
            JobError::ResultNotReady(_) => "result_not_ready",
            JobError::JobFailed { .. } => "job_failed",
            JobError::JobTimedOut { .. } => "job_timed_out",
            JobError::PollingTimedOut { .. } => "polling_timed_out",
            JobError::NoActiveConversation => "no_active_conversation",
            JobError::InvalidRequest(_) => "invalid_request",
            JobError::TaskAborted(_) => "task_aborted",
        }
    }
}

impl From<garde::Report> for JobError {
    fn from(report: garde::Report) -> Self {
        JobError::InvalidRequest(report.to_string())
    }
}

fn describe_ceiling(ceiling: &Duration) -> String {
    let secs = ceiling.as_secs();
    match secs {
        0 => format!("{} ms", ceiling.as_millis()),
        60 => "1 minute".to_string(),
        s if s % 60 == 0 => format!("{} minutes", s / 60),
        1 => "1 second".to_string(),
        s => format!("{} seconds", s),
    }
}
