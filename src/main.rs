use std::io::{IsTerminal, Read};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use troubleshoot_client::config::ClientConfig;
use troubleshoot_client::models::analysis::AnalysisRequest;
use troubleshoot_client::observability;
use troubleshoot_client::services::job_client::HttpJobClient;
use troubleshoot_client::services::polling::FnObserver;
use troubleshoot_client::services::session::{ConversationSession, SessionOutcome};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let question = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if question.trim().is_empty() {
        eprintln!("usage: troubleshoot <question...>  (pipe a stack trace on stdin to include it)");
        std::process::exit(2);
    }

    let mut request = AnalysisRequest::new(question);
    if !std::io::stdin().is_terminal() {
        let mut stacktrace = String::new();
        if let Err(e) = std::io::stdin().read_to_string(&mut stacktrace) {
            tracing::warn!(error = %e, "Failed to read stack trace from stdin");
        } else if !stacktrace.trim().is_empty() {
            request.stacktrace = Some(stacktrace);
        }
    }

    // Load configuration from environment
    let config = ClientConfig::from_env().expect("Failed to load configuration from environment");
    observability::describe_metrics();

    tracing::info!(api = %config.api_base_url, "Initializing analysis client");
    let client = HttpJobClient::from_config(&config).expect("Failed to initialize HTTP client");
    let session = Arc::new(ConversationSession::new(Arc::new(client), config.poll_config()));

    let ctrl_c_session = Arc::clone(&session);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_session.cancel();
        }
    });

    let observer = FnObserver::new(
        |snapshot| {
            tracing::info!(
                status = %snapshot.status,
                step = snapshot.current_step_index,
                total_steps = snapshot.total_steps,
                percent = snapshot.completion_percentage,
                current = snapshot.current_step_label.as_deref().unwrap_or("-"),
                "Progress"
            );
        },
        |error| tracing::warn!(error = %error, "Analysis error"),
    );

    match session.analyze(request, observer).await {
        Ok(SessionOutcome::Completed(result)) => {
            println!("{}", result.summary);
            for action in &result.immediate_actions {
                println!("  - {}", action);
            }
            if let Some(criteria) = &result.escalation_criteria {
                if !criteria.escalate_if.is_empty() {
                    println!("Escalate if: {}", criteria.escalate_if);
                }
            }
        }
        Ok(SessionOutcome::Cancelled) => {
            eprintln!("Analysis cancelled");
            std::process::exit(130);
        }
        Ok(SessionOutcome::Skipped) => {
            eprintln!("An analysis is already in progress");
        }
        Err(e) => {
            eprintln!("Analysis failed: {}", e);
            std::process::exit(1);
        }
    }
}
