//! Step timeline reconciliation.
//!
//! Turns a stream of progress snapshots, which may skip steps between polls,
//! into a timeline that only ever moves forward, plus an optional catch-up plan
//! for presenting skipped steps one at a time.

use crate::models::job::JobProgressSnapshot;
use crate::models::timeline::{
    AnimationPlan, AnimationStep, Reconciliation, StepState, StepTimeline, StepTimelineEntry,
};

/// Labels for the backend's standard five-step analysis pipeline.
pub const ANALYSIS_STEP_LABELS: [&str; 5] = [
    "Problem Understanding",
    "Pattern Recognition",
    "Root Cause Analysis",
    "Solution Development",
    "Solution Validation",
];

/// Caller-supplied fallback labels, consulted when the backend names no step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepLabelPolicy {
    defaults: Vec<String>,
}

impl StepLabelPolicy {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            defaults: labels.into_iter().map(Into::into).collect(),
        }
    }

    /// No defaults: unnamed steps fall back to "Step N".
    pub fn empty() -> Self {
        Self { defaults: Vec::new() }
    }

    pub fn default_label(&self, index: usize) -> Option<&str> {
        self.defaults.get(index).map(String::as_str)
    }
}

impl Default for StepLabelPolicy {
    fn default() -> Self {
        Self::new(ANALYSIS_STEP_LABELS)
    }
}

#[derive(Debug, Clone, Default)]
pub struct StepTimelineReconciler {
    labels: StepLabelPolicy,
}

impl StepTimelineReconciler {
    pub fn new(labels: StepLabelPolicy) -> Self {
        Self { labels }
    }

    /// Fold `snapshot` into `previous`, returning the caught-up timeline and the
    /// reveal plan for any steps that were skipped.
    ///
    /// The completed count never decreases while `total_steps` stays the same. If
    /// `total_steps` changes, the previous timeline is discarded and rebuilt.
    pub fn reconcile(
        &self,
        previous: Option<&StepTimeline>,
        snapshot: &JobProgressSnapshot,
    ) -> Reconciliation {
        let total = snapshot.total_steps;

        let previous = match previous {
            Some(p) if p.total_steps != total => {
                tracing::warn!(
                    job_id = %snapshot.job_id,
                    old_total = p.total_steps,
                    new_total = total,
                    "Total steps changed between snapshots, rebuilding timeline"
                );
                None
            }
            other => other,
        };

        let previous_completed = previous.map_or(0, StepTimeline::completed_count);
        let mut completed = snapshot.reported_completed_steps();
        if completed < previous_completed {
            tracing::warn!(
                job_id = %snapshot.job_id,
                previous = previous_completed,
                reported = completed,
                "Snapshot regressed step progress, keeping previous timeline position"
            );
            completed = previous_completed;
        }

        let active = if !snapshot.is_terminal() && completed < total {
            Some(completed as usize)
        } else {
            None
        };

        let mut next_order = previous_completed;
        let entries = (0..total as usize)
            .map(|index| {
                let state = if (index as u32) < completed {
                    StepState::Completed
                } else if Some(index) == active {
                    StepState::Current
                } else {
                    StepState::Pending
                };

                let completion_order = match state {
                    StepState::Completed => previous
                        .and_then(|p| p.get(index))
                        .and_then(|e| e.completion_order)
                        .or_else(|| {
                            let order = next_order;
                            next_order += 1;
                            Some(order)
                        }),
                    _ => None,
                };

                StepTimelineEntry {
                    label: self.resolve_label(index, active, snapshot),
                    state,
                    completion_order,
                }
            })
            .collect::<Vec<_>>();

        let animation_plan = if completed > previous_completed + 1 {
            AnimationPlan {
                steps: (previous_completed + 1..completed)
                    .map(|index| AnimationStep::MarkCompleted {
                        index,
                        label: entries[index as usize].label.clone(),
                    })
                    .collect(),
            }
        } else {
            AnimationPlan::default()
        };

        if !animation_plan.is_empty() {
            tracing::debug!(
                job_id = %snapshot.job_id,
                from = previous_completed,
                to = completed,
                "Progress jumped several steps, catch-up plan produced"
            );
        }

        Reconciliation {
            timeline: StepTimeline {
                total_steps: total,
                job_status: snapshot.status,
                entries,
            },
            animation_plan,
        }
    }

    /// Backend label for the step > backend's current label for the active step
    /// > policy default > "Step N".
    fn resolve_label(&self, index: usize, active: Option<usize>, snapshot: &JobProgressSnapshot) -> String {
        snapshot
            .completed_step_labels
            .get(index)
            .filter(|label| !label.trim().is_empty())
            .cloned()
            .or_else(|| {
                if Some(index) == active {
                    snapshot.current_step_label.clone()
                } else {
                    None
                }
            })
            .or_else(|| self.labels.default_label(index).map(str::to_string))
            .unwrap_or_else(|| format!("Step {}", index + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::JobStatus;

    fn snapshot(status: JobStatus, completed: u32, total: u32) -> JobProgressSnapshot {
        JobProgressSnapshot::new("job-1", status, completed, total)
    }

    fn states(timeline: &StepTimeline) -> Vec<StepState> {
        timeline.entries.iter().map(|e| e.state).collect()
    }

    #[test]
    fn test_multi_step_jump_produces_catch_up_plan() {
        let reconciler = StepTimelineReconciler::default();
        let first = reconciler.reconcile(None, &snapshot(JobStatus::Processing, 1, 5));
        assert!(first.animation_plan.is_empty());

        let next = reconciler.reconcile(Some(&first.timeline), &snapshot(JobStatus::Processing, 4, 5));

        assert_eq!(next.animation_plan.indices(), vec![2, 3]);
        assert_eq!(next.timeline.completed_count(), 4);
        for index in 0..4 {
            assert_eq!(next.timeline.entries[index].state, StepState::Completed);
        }
        assert_ne!(next.timeline.entries[4].state, StepState::Completed);
        assert_eq!(next.timeline.current_index(), Some(4));
    }

    #[test]
    fn test_single_step_advance_has_no_plan() {
        let reconciler = StepTimelineReconciler::default();
        let first = reconciler.reconcile(None, &snapshot(JobStatus::Processing, 1, 5));
        let next = reconciler.reconcile(Some(&first.timeline), &snapshot(JobStatus::Processing, 2, 5));
        assert!(next.animation_plan.is_empty());
        assert_eq!(
            states(&next.timeline),
            vec![
                StepState::Completed,
                StepState::Completed,
                StepState::Current,
                StepState::Pending,
                StepState::Pending
            ]
        );
    }

    #[test]
    fn test_regression_is_clamped() {
        let reconciler = StepTimelineReconciler::default();
        let first = reconciler.reconcile(None, &snapshot(JobStatus::Processing, 3, 5));
        let next = reconciler.reconcile(Some(&first.timeline), &snapshot(JobStatus::Processing, 1, 5));

        assert_eq!(next.timeline.completed_count(), 3);
        assert!(next.animation_plan.is_empty());
        assert_eq!(next.timeline.current_index(), Some(3));
    }

    #[test]
    fn test_completed_job_marks_every_step() {
        let reconciler = StepTimelineReconciler::default();
        let first = reconciler.reconcile(None, &snapshot(JobStatus::Processing, 2, 5));
        let done = reconciler.reconcile(Some(&first.timeline), &snapshot(JobStatus::Completed, 2, 5));

        assert_eq!(done.timeline.completed_count(), 5);
        assert_eq!(done.timeline.current_index(), None);
        assert_eq!(done.animation_plan.indices(), vec![3, 4]);
    }

    #[test]
    fn test_failed_job_has_no_current_step() {
        let reconciler = StepTimelineReconciler::default();
        let failed = reconciler.reconcile(None, &snapshot(JobStatus::Failed, 2, 5));
        assert_eq!(failed.timeline.current_index(), None);
        assert_eq!(
            states(&failed.timeline),
            vec![
                StepState::Completed,
                StepState::Completed,
                StepState::Pending,
                StepState::Pending,
                StepState::Pending
            ]
        );
    }

    #[test]
    fn test_total_steps_change_rebuilds() {
        let reconciler = StepTimelineReconciler::default();
        let first = reconciler.reconcile(None, &snapshot(JobStatus::Processing, 4, 5));
        let rebuilt = reconciler.reconcile(Some(&first.timeline), &snapshot(JobStatus::Processing, 1, 3));

        assert_eq!(rebuilt.timeline.total_steps, 3);
        assert_eq!(rebuilt.timeline.entries.len(), 3);
        assert_eq!(rebuilt.timeline.completed_count(), 1);
        assert!(rebuilt.animation_plan.is_empty());
    }

    #[test]
    fn test_label_precedence() {
        let reconciler = StepTimelineReconciler::new(StepLabelPolicy::new(["Default A", "Default B", "Default C"]));
        let mut snap = snapshot(JobStatus::Processing, 1, 4);
        snap.completed_step_labels = vec!["Parsed stack trace".to_string()];
        snap.current_step_label = Some("Matching known incidents".to_string());

        let result = reconciler.reconcile(None, &snap);
        let labels: Vec<&str> = result.timeline.entries.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["Parsed stack trace", "Matching known incidents", "Default C", "Step 4"]
        );
    }

    #[test]
    fn test_completion_order_is_preserved() {
        let reconciler = StepTimelineReconciler::new(StepLabelPolicy::empty());
        let first = reconciler.reconcile(None, &snapshot(JobStatus::Processing, 2, 4));
        let next = reconciler.reconcile(Some(&first.timeline), &snapshot(JobStatus::Processing, 3, 4));

        let orders: Vec<Option<u32>> = next.timeline.entries.iter().map(|e| e.completion_order).collect();
        assert_eq!(orders, vec![Some(0), Some(1), Some(2), None]);
        assert_eq!(next.timeline.entries[0].label, "Step 1");
    }

    #[test]
    fn test_plan_carries_resolved_labels() {
        let reconciler = StepTimelineReconciler::default();
        let result = reconciler.reconcile(None, &snapshot(JobStatus::Processing, 3, 5));
        assert_eq!(
            result.animation_plan.steps,
            vec![
                AnimationStep::MarkCompleted { index: 1, label: "Pattern Recognition".into() },
                AnimationStep::MarkCompleted { index: 2, label: "Root Cause Analysis".into() },
            ]
        );
    }
}
