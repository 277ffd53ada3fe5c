mod helpers;

use helpers::*;
use std::sync::Arc;

use troubleshoot_client::models::analysis::Submission;
use troubleshoot_client::services::errors::{JobError, RATE_LIMITED_MESSAGE};
use troubleshoot_client::services::polling::{JobEvent, PollConfig, TrackOutcome};
use troubleshoot_client::services::tracker::JobTracker;

fn tracker(backend: &Arc<ScriptedBackend>) -> JobTracker<ScriptedBackend> {
    JobTracker::new(Arc::clone(backend), PollConfig::default())
}

#[tokio::test(start_paused = true)]
async fn test_submit_and_track_completes() {
    let backend = Arc::new(ScriptedBackend::with_statuses([processing(40, 2), completed()]));
    let observer = RecordingObserver::new();

    let outcome = tracker(&backend)
        .submit_and_track(Submission::Analysis(complex_request()), observer.clone())
        .wait()
        .await
        .unwrap();

    assert!(matches!(outcome, TrackOutcome::Completed(_)));
    assert_eq!(backend.submits(), 1);
    assert_eq!(backend.polls(), 2);

    let events = observer.events();
    assert!(matches!(&events[0], JobEvent::Submitted(h) if h.job_id == JOB_ID));
    assert_eq!(observer.progress().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_submission_surfaces_on_both_channels() {
    let backend = Arc::new(ScriptedBackend::default());
    backend.set_submit_response(Err(JobError::RateLimited(RATE_LIMITED_MESSAGE.to_string())));
    let observer = RecordingObserver::new();

    let err = tracker(&backend)
        .submit_and_track(Submission::Analysis(complex_request()), observer.clone())
        .wait()
        .await
        .unwrap_err();

    assert_eq!(err, JobError::RateLimited(RATE_LIMITED_MESSAGE.to_string()));
    assert_eq!(observer.errors(), vec![err]);
    assert_eq!(backend.polls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_event_channel_stops_after_cancel() {
    let backend = Arc::new(ScriptedBackend::default());
    backend.set_fallback_status(processing(30, 1));

    let (job, mut events) = tracker(&backend).submit_with_events(Submission::Analysis(complex_request()));
    let cancel = job.cancel_handle();

    assert!(matches!(events.recv().await, Some(JobEvent::Submitted(_))));
    assert!(matches!(events.recv().await, Some(JobEvent::Progress(_))));
    assert!(matches!(events.recv().await, Some(JobEvent::Progress(_))));
    cancel.cancel();

    let outcome = job.wait().await.unwrap();
    assert_eq!(outcome, TrackOutcome::Cancelled);
    assert!(cancel.is_cancelled());

    // Sender is dropped with the task; nothing else was queued after cancellation.
    assert_eq!(events.recv().await, None);
    assert_eq!(backend.polls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_before_submit_resolves_immediately() {
    let backend = Arc::new(ScriptedBackend::default());
    let gate = backend.gate_submissions();
    let observer = RecordingObserver::new();

    let job = tracker(&backend).submit_and_track(Submission::Analysis(complex_request()), observer.clone());
    tokio::task::yield_now().await;
    job.cancel();
    gate.notify_one();

    let outcome = job.wait().await.unwrap();
    assert_eq!(outcome, TrackOutcome::Cancelled);
    assert_eq!(backend.polls(), 0);
    assert!(observer.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_track_resumes_existing_job() {
    let backend = Arc::new(ScriptedBackend::with_statuses([processing(90, 4), completed()]));
    let observer = RecordingObserver::new();

    let outcome = tracker(&backend)
        .track(handle(), observer.clone())
        .wait()
        .await
        .unwrap();

    assert!(matches!(outcome, TrackOutcome::Completed(_)));
    assert_eq!(backend.submits(), 0);
    assert_eq!(observer.progress().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failed_submit_after_cancel_resolves_as_cancelled() {
    let backend = Arc::new(ScriptedBackend::default());
    backend.set_submit_response(Err(JobError::SubmissionFailed("boom".to_string())));
    let gate = backend.gate_submissions();
    let observer = RecordingObserver::new();

    let job = tracker(&backend).submit_and_track(Submission::Analysis(complex_request()), observer.clone());
    while backend.submits() == 0 {
        tokio::task::yield_now().await;
    }
    job.cancel();
    gate.notify_one();

    let outcome = job.wait().await.unwrap();
    assert_eq!(outcome, TrackOutcome::Cancelled);
    assert!(observer.errors().is_empty());
    assert_eq!(backend.polls(), 0);
}
