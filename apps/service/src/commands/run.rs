use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use pollwatch::notifier::now_stamp;
use pollwatch::{EngineEvent, HttpProbe, Notifier, PollEngine, SmtpNotifier, StopReason};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use crate::config::Config;

/// Command-line values that take precedence over the config file
#[derive(Debug, Default)]
pub struct RunOverrides {
    pub curl: Option<PathBuf>,
    pub interval: Option<u64>,
    pub max_attempts: Option<u32>,
    pub fail_notify_every: Option<u32>,
}

pub async fn run(mut config: Config, overrides: RunOverrides) -> Result<()> {
    if let Some(path) = overrides.curl.as_deref() {
        let command = super::read_command(Some(path))?;
        let descriptor = pollwatch::parse_command(&command)
            .with_context(|| format!("parsing {}", path.display()))?;
        config.merge_descriptor(&descriptor);
    }
    if let Some(interval) = overrides.interval {
        config.query.interval_seconds = interval;
    }
    if let Some(max_attempts) = overrides.max_attempts {
        config.query.max_attempts = max_attempts;
    }
    if let Some(every) = overrides.fail_notify_every {
        config.query.fail_notify_every = every;
    }

    config.validate_for_run()?;
    let policy = config.policy()?;
    let descriptor = config.descriptor()?;
    let probe = HttpProbe::new(&descriptor, config.probe_settings())?;

    let notifier: Option<Arc<dyn Notifier>> = if config.notify_enabled() {
        print_line("Mail settings complete, notifications enabled");
        Some(Arc::new(SmtpNotifier::new(config.smtp.clone(), config.query.stage.clone())?))
    } else {
        print_line("Mail settings incomplete, notifications disabled");
        None
    };

    print_line("Starting query task...");
    print_line(&format!("Target URL: {}", config.query.url));
    print_line(&format!("Stage: {}", config.query.stage));
    print_line(&format!("Interval: {} s", config.query.interval_seconds));
    print_line(&format!("Max attempts: {}", policy.describe_cap()));
    print_line(&format!("Failure reminder: every {} attempts", config.query.fail_notify_every));

    let (engine, events) = PollEngine::new(Arc::new(probe), notifier, policy, config.query.stage.clone());
    let cancel = engine.cancel_handle();

    let renderer = tokio::spawn(render(events));
    let engine_task = tokio::spawn(engine.run());

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                print_line("Stopping query task...");
                cancel.cancel();
            }
            Err(e) => warn!(error = %e, "Could not listen for Ctrl-C"),
        }
    });

    let summary = engine_task.await.context("poll engine task failed")?;
    renderer.await.context("event renderer task failed")?;

    print_line("Query task stopped");
    info!(attempts = summary.attempts, reason = ?summary.reason, "Run complete");

    if let (StopReason::Published, Some(payload)) = (summary.reason, summary.payload.as_deref()) {
        println!("{payload}");
    }
    Ok(())
}

/// Print engine logs on stdout and route status/progress to tracing
async fn render(mut events: UnboundedReceiver<EngineEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            EngineEvent::Log(text) => print_line(&text),
            EngineEvent::Status(text) => info!(status = %text),
            EngineEvent::Progress(value) => debug!(progress = value),
            EngineEvent::Succeeded { attempt, .. } => info!(attempt, "Result published"),
            EngineEvent::AttemptFailed { attempt, outcome } => debug!(attempt, %outcome, "Attempt failed"),
            EngineEvent::Finished(reason) => {
                debug!(?reason, "Engine finished");
                break;
            }
        }
    }
}

fn print_line(text: &str) { println!("[{}] {}", now_stamp(), text); }
