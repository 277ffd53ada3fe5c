use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Status of a background analysis job as reported by the backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Created,
    Processing,
    Completed,
    Failed,
    Timeout,
}

impl JobStatus {
    /// Terminal states never transition again; polling stops once one is seen.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Timeout)
    }
}

/// Identifies one background job. Created by submit, referenced by every poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub job_id: String,
    pub created_at: DateTime<Utc>,
}

impl JobHandle {
    pub fn new(job_id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            job_id: job_id.into(),
            created_at,
        }
    }
}

/// One reported state of a job at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct JobProgressSnapshot {
    #[garde(length(min = 1))]
    pub job_id: String,

    #[garde(skip)]
    pub status: JobStatus,

    #[garde(skip)]
    pub current_step_index: u32,

    /// Bounded so a hostile payload cannot size the step timeline.
    #[garde(range(min = 1, max = 64))]
    pub total_steps: u32,

    #[garde(range(max = 100))]
    pub completion_percentage: u8,

    #[garde(skip)]
    pub current_step_label: Option<String>,

    #[garde(skip)]
    pub completed_step_labels: Vec<String>,

    #[garde(skip)]
    pub error_message: Option<String>,

    /// Advisory only; never used for control decisions.
    #[garde(skip)]
    pub estimated_time_remaining: Option<String>,

    #[garde(skip)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl JobProgressSnapshot {
    /// A bare snapshot with no labels, used as a starting point by callers and tests.
    pub fn new(job_id: impl Into<String>, status: JobStatus, current_step_index: u32, total_steps: u32) -> Self {
        Self {
            job_id: job_id.into(),
            status,
            current_step_index,
            total_steps,
            completion_percentage: 0,
            current_step_label: None,
            completed_step_labels: Vec::new(),
            error_message: None,
            estimated_time_remaining: None,
            updated_at: None,
        }
    }

    pub fn with_percentage(mut self, percentage: u8) -> Self {
        self.completion_percentage = percentage;
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Steps the backend considers finished, never more than `total_steps`.
    pub fn reported_completed_steps(&self) -> u32 {
        if self.status == JobStatus::Completed {
            return self.total_steps;
        }
        let by_labels = u32::try_from(self.completed_step_labels.len()).unwrap_or(u32::MAX);
        self.current_step_index.max(by_labels).min(self.total_steps)
    }

    /// 100% is only meaningful once the job reports COMPLETED.
    pub fn has_premature_completion(&self) -> bool {
        self.completion_percentage >= 100 && self.status != JobStatus::Completed
    }
}
