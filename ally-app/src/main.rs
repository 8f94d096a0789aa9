use ally_actors::{SessionCoordinator, SessionEvent};
use ally_common::observability::init_logging;
use ally_config::{AllyConfig, AllyConfigLoader};
use ally_llm::transcript::to_flat_trace;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};
use url::Url;
mod wiring;

/// Let a model drive a browser to complete a task.
#[derive(Parser, Debug)]
#[command(name = "ally", version)]
struct Cli {
    /// Configuration file; `ALLY__*` environment variables override it.
    #[arg(long, default_value = "ally.yaml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one task and print session events as JSON lines.
    Run {
        prompt: String,
        /// Open this page before the task instead of staying on the start page.
        #[arg(long, value_parser = Url::parse)]
        url: Option<Url>,
        /// Write the flattened conversation trace here.
        #[arg(long)]
        trace_out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg: AllyConfig = AllyConfigLoader::new()
        .with_file(&cli.config)
        .load()
        .with_context(|| format!("loading {}", cli.config.display()))?;

    let log_path = init_logging(cfg.logging.log_config("ally"))?;
    info!(log = %log_path.display(), "ally starting");

    let coordinator = Arc::new(wiring::build_coordinator(
        &cfg,
        wiring::webdriver_launcher(),
    )?);

    match cli.command {
        Command::Run {
            prompt,
            url,
            trace_out,
        } => run(coordinator, &prompt, url.as_ref().map(Url::as_str), trace_out).await,
    }
}

async fn run(
    coordinator: Arc<SessionCoordinator>,
    prompt: &str,
    url: Option<&str>,
    trace_out: Option<PathBuf>,
) -> Result<()> {
    let printer = tokio::spawn(print_events(coordinator.subscribe()));

    coordinator.start().await?;
    let result = run_task(&coordinator, prompt, url).await;

    if tokio::time::timeout(Duration::from_secs(2), printer)
        .await
        .is_err()
    {
        warn!("event printer did not finish");
    }
    coordinator.stop().await?;

    let outcome = result?;
    if let Some(path) = trace_out {
        let trace = to_flat_trace(&outcome.history, false);
        std::fs::write(&path, serde_json::to_vec_pretty(&trace)?)
            .with_context(|| format!("writing trace to {}", path.display()))?;
        info!(path = %path.display(), records = trace.len(), "trace written");
    }
    Ok(())
}

async fn run_task(
    coordinator: &SessionCoordinator,
    prompt: &str,
    url: Option<&str>,
) -> Result<ally_actors::LoopOutcome> {
    if let Some(url) = url {
        coordinator.navigate(url).await?;
    }

    let task = coordinator.run_task(prompt).await?;
    info!(task_id = %task.id, "task submitted");
    let outcome = task.outcome();
    tokio::pin!(outcome);
    loop {
        tokio::select! {
            res = &mut outcome => return Ok(res?),
            sig = tokio::signal::ctrl_c() => {
                sig?;
                warn!("interrupt received; cancelling task");
                coordinator.cancel_task().await;
            }
        }
    }
}

/// Print task events until the first final update. Frames are only counted.
async fn print_events(mut rx: broadcast::Receiver<SessionEvent>) {
    let mut frames = 0u64;
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "event printer lagged");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        let last = match &event {
            SessionEvent::Screenshot { .. } => {
                frames += 1;
                continue;
            }
            SessionEvent::TaskUpdate { status, .. } => status.is_final(),
            SessionEvent::Message { .. } => false,
        };
        match serde_json::to_string(&event) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!(error = %e, "unprintable event"),
        }
        if last {
            break;
        }
    }
    info!(frames, "event printer finished");
}
