use async_trait::async_trait;
use chrono::{DateTime, Utc};
use garde::Validate;
use reqwest::{Client, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use crate::config::ClientConfig;
use crate::models::analysis::{AnalysisRequest, AnalysisResult, JobStats, Submission};
use crate::models::job::{JobHandle, JobProgressSnapshot, JobStatus};
use crate::services::errors::{JobError, RATE_LIMITED_MESSAGE};

/// Step count assumed when a status payload carries no progress block.
pub const DEFAULT_TOTAL_STEPS: u32 = 5;

/// The three remote operations the job lifecycle depends on.
///
/// Implementations normalize transport and protocol failures into [`JobError`]
/// and never retry; retry policy belongs to the polling orchestrator.
#[async_trait]
pub trait JobBackend: Send + Sync {
    /// Create a background job.
    async fn submit(&self, submission: &Submission) -> Result<JobHandle, JobError>;

    /// Fetch the latest progress snapshot for a job.
    async fn fetch_status(&self, handle: &JobHandle) -> Result<JobProgressSnapshot, JobError>;

    /// Fetch the final result of a completed job.
    async fn fetch_result(&self, handle: &JobHandle) -> Result<AnalysisResult, JobError>;
}

/// A backend that can also answer simple requests in a single call.
#[async_trait]
pub trait AnalysisService: JobBackend {
    async fn analyze_sync(&self, request: &AnalysisRequest) -> Result<AnalysisResult, JobError>;
}

/// Standard response envelope used by every backend route.
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

impl<T> ApiEnvelope<T> {
    /// `Err` with the backend's message when it reports failure, otherwise the payload (if any).
    fn into_data(self, fallback: &str) -> Result<Option<T>, String> {
        if !self.success {
            return Err(self.error.unwrap_or_else(|| fallback.to_string()));
        }
        Ok(self.data)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmittedJob {
    #[serde(default)]
    job_id: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobPayload {
    #[serde(default)]
    job_id: Option<String>,
    status: JobStatus,
    #[serde(default)]
    progress: Option<ProgressPayload>,
    #[serde(default)]
    updated_at: Option<String>,
    #[serde(default)]
    estimated_time_remaining: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProgressPayload {
    #[serde(default)]
    current_step: Option<String>,
    #[serde(default)]
    step_message: Option<String>,
    #[serde(default)]
    completion_percentage: i64,
    #[serde(default)]
    current_step_index: i64,
    #[serde(default)]
    total_steps: Option<i64>,
    #[serde(default)]
    completed_steps: Vec<String>,
}

fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

impl JobPayload {
    fn into_snapshot(self, handle: &JobHandle) -> Result<JobProgressSnapshot, String> {
        let progress = self.progress.unwrap_or(ProgressPayload {
            current_step: None,
            step_message: None,
            completion_percentage: 0,
            current_step_index: 0,
            total_steps: Some(i64::from(DEFAULT_TOTAL_STEPS)),
            completed_steps: Vec::new(),
        });

        let current_step_index = u32::try_from(progress.current_step_index)
            .map_err(|_| format!("invalid currentStepIndex {}", progress.current_step_index))?;
        let total_steps = progress.total_steps.unwrap_or(i64::from(DEFAULT_TOTAL_STEPS));
        let total_steps =
            u32::try_from(total_steps).map_err(|_| format!("invalid totalSteps {}", total_steps))?;
        let completion_percentage = u8::try_from(progress.completion_percentage).map_err(|_| {
            format!("invalid completionPercentage {}", progress.completion_percentage)
        })?;

        let current_step_label = progress
            .current_step
            .or(progress.step_message)
            .filter(|s| !s.trim().is_empty());

        let snapshot = JobProgressSnapshot {
            job_id: self
                .job_id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| handle.job_id.clone()),
            status: self.status,
            current_step_index,
            total_steps,
            completion_percentage,
            current_step_label,
            completed_step_labels: progress.completed_steps,
            error_message: self.error_message.filter(|m| !m.trim().is_empty()),
            estimated_time_remaining: self.estimated_time_remaining,
            updated_at: parse_timestamp(self.updated_at.as_deref()),
        };

        snapshot.validate().map_err(|report| report.to_string())?;
        Ok(snapshot)
    }
}

/// Pull a human-readable reason out of a failed response body.
fn describe_failure(status: StatusCode, body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<String>,
        message: Option<String>,
    }

    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error.or(b.message))
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| format!("backend returned HTTP {}", status))
}

/// Read a response into the standard envelope, mapping HTTP failures to a message.
async fn read_envelope<T: DeserializeOwned>(response: Response) -> Result<ApiEnvelope<T>, String> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| format!("failed to read response body: {}", e))?;

    if !status.is_success() {
        return Err(describe_failure(status, &body));
    }

    serde_json::from_str(&body).map_err(|e| format!("malformed response payload: {}", e))
}

/// HTTP client for the analysis backend's job API.
pub struct HttpJobClient {
    http: Client,
    base_url: String,
    user_id: String,
}

impl HttpJobClient {
    pub fn new(base_url: &str, timeout: Duration, user_id: &str) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .user_agent(concat!("troubleshoot-client/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            user_id: user_id.to_string(),
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, reqwest::Error> {
        Self::new(&config.api_base_url, config.request_timeout(), &config.user_id)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build an endpoint URL under the base, percent-encoding each path segment.
    ///
    /// Ids come from the backend and the caller, so a segment may not be empty,
    /// `.` or `..`.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, String> {
        if let Some(bad) = segments.iter().find(|s| matches!(s.trim(), "" | "." | "..")) {
            return Err(format!("invalid path segment {:?}", bad));
        }

        let mut url = Url::parse(&self.base_url).map_err(|e| format!("invalid API base URL: {}", e))?;
        url.path_segments_mut()
            .map_err(|_| "API base URL cannot carry a path".to_string())?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Fill in the request id and user id the backend expects on every submission.
    fn prepare_request(&self, request: &AnalysisRequest) -> AnalysisRequest {
        let mut prepared = request.clone();
        if prepared.request_id.is_none() {
            prepared.request_id = Some(uuid::Uuid::new_v4().to_string());
        }
        if prepared.user_id.is_none() {
            prepared.user_id = Some(self.user_id.clone());
        }
        if prepared.created_at.is_none() {
            prepared.created_at = Some(Utc::now().to_rfc3339());
        }
        prepared
    }

    /// Backend job-service statistics.
    pub async fn fetch_stats(&self) -> Result<JobStats, JobError> {
        let url = self.endpoint(&["jobs", "stats"]).map_err(JobError::StatusFetchFailed)?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| JobError::StatusFetchFailed(e.to_string()))?;

        read_envelope::<JobStats>(response)
            .await
            .and_then(|env| env.into_data("failed to get job stats"))
            .map_err(JobError::StatusFetchFailed)?
            .ok_or_else(|| JobError::StatusFetchFailed("no job stats data received".to_string()))
    }
}

#[async_trait]
impl JobBackend for HttpJobClient {
    async fn submit(&self, submission: &Submission) -> Result<JobHandle, JobError> {
        let builder = match submission {
            Submission::Analysis(request) => {
                request.validate()?;
                let url = self.endpoint(&["analyze-async"]).map_err(JobError::SubmissionFailed)?;
                self.http.post(url).json(&self.prepare_request(request))
            }
            Submission::FollowUp { conversation_id, request } => {
                request.validate()?;
                let mut body = request.clone();
                if body.user_id.is_none() {
                    body.user_id = Some(self.user_id.clone());
                }
                let url = self
                    .endpoint(&["conversation", conversation_id.as_str(), "message-async"])
                    .map_err(JobError::SubmissionFailed)?;
                self.http.post(url).json(&body)
            }
        };

        tracing::debug!(kind = submission.kind(), "Submitting analysis job");

        let response = builder.send().await.map_err(|e| {
            tracing::warn!(error = %e, "Job submission request failed");
            JobError::SubmissionFailed(e.to_string())
        })?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            tracing::warn!("Job submission rejected: concurrent job limit reached");
            return Err(JobError::RateLimited(RATE_LIMITED_MESSAGE.to_string()));
        }

        let data = read_envelope::<SubmittedJob>(response)
            .await
            .and_then(|env| env.into_data("failed to start async analysis"))
            .map_err(JobError::SubmissionFailed)?
            .ok_or_else(|| JobError::InvalidJobData("no job data received".to_string()))?;

        let job_id = data
            .job_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| JobError::InvalidJobData("response is missing a job id".to_string()))?;
        let created_at = parse_timestamp(data.created_at.as_deref()).unwrap_or_else(Utc::now);

        metrics::counter!("analysis_jobs_submitted_total", "kind" => submission.kind()).increment(1);
        tracing::info!(job_id = %job_id, kind = submission.kind(), "Analysis job submitted");

        Ok(JobHandle::new(job_id, created_at))
    }

    async fn fetch_status(&self, handle: &JobHandle) -> Result<JobProgressSnapshot, JobError> {
        let url = self
            .endpoint(&["jobs", handle.job_id.as_str(), "status"])
            .map_err(JobError::StatusFetchFailed)?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| JobError::StatusFetchFailed(e.to_string()))?;

        let payload = read_envelope::<JobPayload>(response)
            .await
            .and_then(|env| env.into_data("failed to get job status"))
            .map_err(JobError::StatusFetchFailed)?
            .ok_or_else(|| JobError::StatusFetchFailed("no job status data received".to_string()))?;

        let snapshot = payload
            .into_snapshot(handle)
            .map_err(|e| JobError::StatusFetchFailed(format!("malformed status payload: {}", e)))?;

        if snapshot.has_premature_completion() {
            tracing::warn!(
                job_id = %handle.job_id,
                status = %snapshot.status,
                "Backend reported 100% before completion"
            );
        }

        tracing::debug!(
            job_id = %handle.job_id,
            status = %snapshot.status,
            step = snapshot.current_step_index,
            total_steps = snapshot.total_steps,
            percent = snapshot.completion_percentage,
            "Fetched job status"
        );

        Ok(snapshot)
    }

    async fn fetch_result(&self, handle: &JobHandle) -> Result<AnalysisResult, JobError> {
        let url = self
            .endpoint(&["jobs", handle.job_id.as_str(), "result"])
            .map_err(JobError::ResultFetchFailed)?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| JobError::ResultFetchFailed(e.to_string()))?;

        if response.status() == StatusCode::BAD_REQUEST {
            return Err(JobError::ResultNotReady(format!(
                "job {} has not completed yet",
                handle.job_id
            )));
        }

        read_envelope::<AnalysisResult>(response)
            .await
            .and_then(|env| env.into_data("failed to get job result"))
            .map_err(JobError::ResultFetchFailed)?
            .ok_or_else(|| JobError::ResultFetchFailed("no job result data received".to_string()))
    }
}

#[async_trait]
impl AnalysisService for HttpJobClient {
    async fn analyze_sync(&self, request: &AnalysisRequest) -> Result<AnalysisResult, JobError> {
        request.validate()?;

        let url = self.endpoint(&["analyze"]).map_err(JobError::SubmissionFailed)?;
        let response = self
            .http
            .post(url)
            .json(&self.prepare_request(request))
            .send()
            .await
            .map_err(|e| JobError::SubmissionFailed(e.to_string()))?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(JobError::RateLimited(RATE_LIMITED_MESSAGE.to_string()));
        }

        read_envelope::<AnalysisResult>(response)
            .await
            .and_then(|env| env.into_data("analysis failed"))
            .map_err(JobError::SubmissionFailed)?
            .ok_or_else(|| JobError::SubmissionFailed("no data received from analysis".to_string()))
    }
}
