//! Sync vs async routing heuristic.
//!
//! Decides whether a request is expensive enough that blocking on a single
//! request/response call would keep the user waiting too long. This is a latency
//! heuristic, not a correctness boundary.

use crate::models::analysis::AnalysisRequest;

/// More than this many log entries routes a request to a background job.
pub const MAX_SYNC_LOG_ENTRIES: usize = 5;

/// Questions longer than this (in characters) route to a background job.
pub const MAX_SYNC_QUESTION_CHARS: usize = 500;

/// Returns `true` when the request should be submitted as a background job.
///
/// Any one of these is enough:
/// - a non-empty stack trace
/// - more than [`MAX_SYNC_LOG_ENTRIES`] log entries
/// - a question longer than [`MAX_SYNC_QUESTION_CHARS`] characters
/// - at least one code snippet
pub fn should_use_async(request: &AnalysisRequest) -> bool {
    let has_stacktrace = request
        .stacktrace
        .as_deref()
        .is_some_and(|s| !s.trim().is_empty());
    let has_many_logs = request.logs.len() > MAX_SYNC_LOG_ENTRIES;
    let is_long_question = request.question.chars().count() > MAX_SYNC_QUESTION_CHARS;
    let has_code_snippets = !request.code_snippets.is_empty();

    has_stacktrace || has_many_logs || is_long_question || has_code_snippets
}
