//! Troubleshooting Assistant Job Client
//!
//! This library provides the client side of the troubleshooting assistant's
//! analysis API: routing requests between the synchronous and background-job
//! paths, submitting jobs, polling them to completion with a bounded retry
//! budget, and reconciling progress into a step timeline.

pub mod config;
pub mod models;
pub mod observability;
pub mod services;

pub use models::analysis::{AnalysisRequest, AnalysisResult, Submission};
pub use models::job::{JobHandle, JobProgressSnapshot, JobStatus};
pub use services::errors::JobError;
pub use services::job_client::{AnalysisService, HttpJobClient, JobBackend};
pub use services::policy::should_use_async;
pub use services::polling::{JobEvent, JobObserver, PollConfig, PollingOrchestrator, TrackOutcome};
pub use services::session::{ConversationSession, SessionOutcome};
pub use services::single_flight::SingleFlight;
pub use services::timeline::{StepLabelPolicy, StepTimelineReconciler};
pub use services::tracker::{CancelHandle, JobTracker, TrackedJob};
