/// Register descriptions for the job lifecycle metrics.
///
/// Metrics are recorded through the `metrics` facade and are no-ops until the
/// host application installs a recorder.
pub fn describe_metrics() {
    metrics::describe_counter!(
        "analysis_jobs_submitted_total",
        "Total analysis jobs submitted to the backend"
    );
    metrics::describe_counter!(
        "analysis_jobs_completed_total",
        "Total analysis jobs that completed with a result"
    );
    metrics::describe_counter!(
        "analysis_jobs_failed_total",
        "Total analysis jobs that ended in an error"
    );
    metrics::describe_counter!(
        "analysis_jobs_cancelled_total",
        "Total analysis jobs abandoned by the caller"
    );
    metrics::describe_counter!(
        "analysis_poll_attempts_total",
        "Total job status polls issued"
    );
    metrics::describe_histogram!(
        "analysis_job_duration_seconds",
        "Time from first poll to delivered result"
    );
}
