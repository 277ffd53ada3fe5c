use garde::Validate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A diagnostic request submitted by the user.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct AnalysisRequest {
    #[garde(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    #[garde(length(min = 1))]
    pub question: String,

    #[garde(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stacktrace: Option<String>,

    #[garde(skip)]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<String>,

    #[garde(skip)]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub code_snippets: Vec<String>,

    #[garde(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[garde(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl AnalysisRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Self::default()
        }
    }

    pub fn with_stacktrace(mut self, stacktrace: impl Into<String>) -> Self {
        self.stacktrace = Some(stacktrace.into());
        self
    }

    pub fn with_logs<I, S>(mut self, logs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.logs = logs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_code_snippets<I, S>(mut self, snippets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.code_snippets = snippets.into_iter().map(Into::into).collect();
        self
    }
}

/// A follow-up message within an existing conversation.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct FollowUpRequest {
    #[garde(length(min = 1))]
    pub message: String,

    #[garde(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Work handed to the backend as a background job.
#[derive(Debug, Clone)]
pub enum Submission {
    Analysis(AnalysisRequest),
    FollowUp {
        conversation_id: String,
        request: FollowUpRequest,
    },
}

impl Submission {
    pub fn kind(&self) -> &'static str {
        match self {
            Submission::Analysis(_) => "analysis",
            Submission::FollowUp { .. } => "follow_up",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
    /// Any level this client does not know yet.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EscalationCriteria {
    #[serde(default)]
    pub escalate_if: String,
    #[serde(default)]
    pub escalate_to: Option<String>,
    #[serde(default)]
    pub escalation_priority: Option<String>,
}

/// Conversation linkage and processing details attached to a result.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AnalysisMetadata {
    #[serde(default)]
    pub category_used: Option<String>,
    #[serde(default)]
    pub workflow_matched: Option<String>,
    #[serde(default)]
    pub code_context_retrieved: bool,
    #[serde(default)]
    pub processing_time_ms: u64,
    #[serde(default)]
    pub llm_calls_made: u32,
    #[serde(default)]
    pub files_loaded: Vec<String>,
    #[serde(default, rename = "conversationId")]
    pub conversation_id: Option<String>,
    #[serde(default, rename = "supportsFollowUp")]
    pub supports_follow_up: Option<bool>,
}

/// Terminal payload of a completed analysis. Owned by the caller once returned.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AnalysisResult {
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub immediate_actions: Vec<String>,
    #[serde(default)]
    pub follow_up_actions: Vec<String>,
    #[serde(default)]
    pub escalation_criteria: Option<EscalationCriteria>,
    #[serde(default)]
    pub confidence_level: Option<ConfidenceLevel>,
    #[serde(default)]
    pub confidence_explanation: String,
    #[serde(default)]
    pub estimated_resolution: String,
    #[serde(default)]
    pub related_documentation: Vec<String>,
    #[serde(default)]
    pub generated_at: Option<String>,
    #[serde(default)]
    pub analysis_metadata: AnalysisMetadata,
}

impl AnalysisResult {
    pub fn conversation_id(&self) -> Option<&str> {
        self.analysis_metadata.conversation_id.as_deref()
    }
}

/// Job-service statistics reported by the backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JobStats {
    #[serde(default)]
    pub active_jobs: u64,
    #[serde(default)]
    pub total_created: u64,
    #[serde(default)]
    pub total_completed: u64,
    #[serde(default)]
    pub total_failed: u64,
    #[serde(default)]
    pub total_timed_out: u64,
    #[serde(default)]
    pub success_rate: f64,
    #[serde(default)]
    pub user_job_counts: HashMap<String, u64>,
}
