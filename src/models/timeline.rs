use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::job::JobStatus;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Completed,
    Current,
    Pending,
}

/// One row of the derived step timeline. Never transmitted by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepTimelineEntry {
    pub label: String,
    pub state: StepState,
    /// Order in which the step was observed completing, `None` until it completes.
    pub completion_order: Option<u32>,
}

/// Ordered view of every step of a job after the latest snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepTimeline {
    pub total_steps: u32,
    pub job_status: JobStatus,
    pub entries: Vec<StepTimelineEntry>,
}

impl StepTimeline {
    pub fn completed_count(&self) -> u32 {
        let count = self
            .entries
            .iter()
            .filter(|e| e.state == StepState::Completed)
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    /// Index of the in-progress step, if the job is still running.
    pub fn current_index(&self) -> Option<usize> {
        self.entries.iter().position(|e| e.state == StepState::Current)
    }

    pub fn get(&self, index: usize) -> Option<&StepTimelineEntry> {
        self.entries.get(index)
    }

    pub fn is_terminal(&self) -> bool {
        self.job_status.is_terminal()
    }
}

/// A single incremental reveal instruction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnimationStep {
    MarkCompleted { index: u32, label: String },
}

impl AnimationStep {
    pub fn index(&self) -> u32 {
        match self {
            AnimationStep::MarkCompleted { index, .. } => *index,
        }
    }
}

/// Catch-up instructions for steps skipped between two polls.
///
/// Purely presentational: the timeline returned next to it is already caught up,
/// so a caller may ignore the plan entirely.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnimationPlan {
    pub steps: Vec<AnimationStep>,
}

impl AnimationPlan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn indices(&self) -> Vec<u32> {
        self.steps.iter().map(AnimationStep::index).collect()
    }

    /// Replay the plan, waiting `delay` before each instruction after the first.
    pub async fn play<F>(&self, delay: Duration, mut apply: F)
    where
        F: FnMut(&AnimationStep),
    {
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(delay).await;
            }
            apply(step);
        }
    }
}

/// Output of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub timeline: StepTimeline,
    pub animation_plan: AnimationPlan,
}
