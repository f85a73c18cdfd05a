//! alertctl
//!
//! Runs one reconciliation pass against a JSON snapshot of stored alerts and
//! prints what changed. Useful for replaying detection output and checking
//! notification wiring.

use alertmanager::{
    Alert, AlertManager, ManagerConfig, MemoryAlertStore, NotifierDispatcher, ReconcileContext,
    ReconcileError, ReconcileReport, ScopeFilter,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use notify::Notifier;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Alert reconciliation and notification tool
#[derive(Parser)]
#[command(name = "alertctl")]
#[command(about = "Reconcile detected policy violations against stored alerts")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (json or text)
    #[arg(long, default_value = "json", global = true)]
    format: OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Json,
    Text,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile a detection pass against stored alerts
    Reconcile {
        /// JSON array of stored alerts (created if missing)
        #[arg(long)]
        state: PathBuf,

        /// JSON array of alerts produced by the detection pass
        #[arg(long)]
        current: PathBuf,

        /// Limit the pass to one policy
        #[arg(long)]
        policy: Option<String>,

        /// Limit the pass to one deployment or resource
        #[arg(long)]
        entity: Option<String>,

        /// Overall deadline for the pass, e.g. "30s"
        #[arg(long, value_parser = humantime::parse_duration)]
        timeout: Option<Duration>,

        /// Write the reconciled alerts back to the state file
        #[arg(long)]
        write: bool,
    },
    /// Send a test notification to every configured channel
    NotifyTest {
        #[arg(long, default_value = "alertctl test notification")]
        message: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "alertmanager=debug,alertctl=debug,notify=debug"
    } else {
        "alertmanager=info,alertctl=info,notify=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Reconcile {
            state,
            current,
            policy,
            entity,
            timeout,
            write,
        } => {
            let mut filters = Vec::new();
            if let Some(policy) = policy {
                filters.push(ScopeFilter::Policy(policy));
            }
            if let Some(entity) = entity {
                filters.push(ScopeFilter::Entity(entity));
            }
            run_reconcile(&state, &current, &filters, timeout, write, cli.format).await
        }
        Commands::NotifyTest { message } => run_notify_test(&message, cli.format).await,
    }
}

async fn run_reconcile(
    state: &Path,
    current: &Path,
    filters: &[ScopeFilter],
    timeout: Option<Duration>,
    write: bool,
    format: OutputFormat,
) -> Result<()> {
    let config = ManagerConfig::from_env().context("invalid alert manager configuration")?;
    let stored = if state.exists() {
        read_alerts(state)?
    } else {
        Vec::new()
    };
    let detected = read_alerts(current)?;
    info!(
        stored = stored.len(),
        detected = detected.len(),
        "Loaded alert snapshots"
    );

    let store = Arc::new(MemoryAlertStore::with_alerts(stored));
    let notifier = Arc::new(NotifierDispatcher::new(Notifier::from_env()));
    let manager = AlertManager::new(store.clone(), notifier, &config);

    let mut ctx = ReconcileContext::new();
    if let Some(timeout) = timeout {
        ctx = ctx.with_timeout(timeout);
    }

    let shutdown = ctx.cancellation_token().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.cancel();
        }
    });

    let outcome = manager.reconcile(&ctx, detected, filters).await;

    if write {
        let alerts = store.all().await;
        let json = serde_json::to_string_pretty(&alerts)?;
        std::fs::write(state, json)
            .with_context(|| format!("failed to write {}", state.display()))?;
        info!(path = %state.display(), alerts = alerts.len(), "Wrote alert state");
    }

    match outcome {
        Ok(report) => {
            print_report(&report, format)?;
            Ok(())
        }
        Err(err @ ReconcileError::Persist { .. }) => {
            error!(error = %err, "Reconciliation finished with write failures");
            Err(err.into())
        }
        Err(err) => Err(anyhow::Error::new(err).context("reconciliation failed")),
    }
}

async fn run_notify_test(message: &str, format: OutputFormat) -> Result<()> {
    let notifier = Notifier::from_env();
    if !notifier.has_channels() {
        anyhow::bail!("no notification channels configured (set SLACK_WEBHOOK_URL)");
    }

    let results = notifier.send_test(message).await;
    let mut failed = 0;
    for (channel, result) in &results {
        match (format, result) {
            (OutputFormat::Json, Ok(())) => {
                println!("{}", serde_json::json!({ "channel": channel, "ok": true }));
            }
            (OutputFormat::Json, Err(e)) => {
                println!(
                    "{}",
                    serde_json::json!({ "channel": channel, "ok": false, "error": e.to_string() })
                );
            }
            (OutputFormat::Text, Ok(())) => println!("{} {channel}", "✓".green()),
            (OutputFormat::Text, Err(e)) => println!("{} {channel}: {e}", "✗".red()),
        }
        if result.is_err() {
            failed += 1;
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} channel(s) failed", results.len());
    }
    Ok(())
}

fn read_alerts(path: &Path) -> Result<Vec<Alert>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid alert JSON in {}", path.display()))
}

fn print_report(report: &ReconcileReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Text => {
            if report.is_empty() {
                println!("{}", "No alert changes".dimmed());
            }
            println!(
                "{} created  {} updated  {} resolved  {} unchanged",
                report.created.to_string().green(),
                report.updated.to_string().yellow(),
                report.resolved.to_string().cyan(),
                report.unchanged,
            );
            println!(
                "{} notified  {} suppressed  {} notify failures",
                report.notified,
                report.suppressed,
                report.notify_failures.to_string().red(),
            );
            for key in report.modified_ids() {
                println!("  {} {key}", "•".bold());
            }
        }
    }
    Ok(())
}
