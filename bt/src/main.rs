//! bt - replay and check build event logs

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use colored::*;
use eyre::{Context, Result, eyre};
use tracing::{debug, info};

use buildtree::cli::{Cli, Command};
use buildtree::config::Config;
use buildtree::notify::Delivery;
use buildtree::replay::{self, ReplayOutcome};
use buildtree::report::{self, BuildSummary, LineKind, NodeStatus, ReportLine};
use buildtree::{SessionRegistry, Severity};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("buildtree")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > INFO
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(log_dir.join("buildtree.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Replay { file, cancel, deltas } => cmd_replay(config, &file, cancel, deltas).await,
        Command::Check { file } => cmd_check(config, &file),
    }
}

fn session_title(file: &Path) -> String {
    file.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "build".to_string())
}

async fn cmd_replay(mut config: Config, file: &Path, cancel: bool, deltas: bool) -> Result<()> {
    let lines = replay::read_events(file)?;

    // Every line yields at most one delta and cancel at most one more per node,
    // so a buffer of twice the line count never lags
    if deltas {
        config.notifier.channel_capacity = config.notifier.channel_capacity.max(lines.len() * 2);
    }

    let registry = SessionRegistry::new(config);
    let session = registry.new_session(&session_title(file));

    let printer = if deltas {
        let (_, mut subscription) = session.subscribe()?;
        Some(tokio::spawn(async move {
            let mut printed = 0usize;
            while let Some(delivery) = subscription.recv().await {
                match delivery {
                    Delivery::Delta(delta) => {
                        match serde_json::to_string(&delta) {
                            Ok(json) => println!("{}", json),
                            Err(e) => eprintln!("failed to serialize delta {}: {}", delta.seq, e),
                        }
                        printed += 1;
                    }
                    Delivery::Lagged { missed } => eprintln!("{} {} deltas dropped", "warning:".yellow(), missed),
                }
            }
            printed
        }))
    } else {
        None
    };

    let producer = session.clone();
    let outcome = tokio::task::spawn_blocking(move || replay::replay(&producer, lines))
        .await
        .context("Replay task failed")?;

    if cancel {
        let cancelled = session.cancel("Cancelled by user")?;
        info!(count = cancelled.len(), "cmd_replay: cancelled running nodes");
    }

    let root = session.snapshot();
    registry.close_session(&session);
    if let Some(printer) = printer {
        let printed = printer.await.context("Delta printer failed")?;
        debug!(printed, "cmd_replay: delta stream ended");
    }

    if !deltas {
        match &root {
            Some(root) => {
                for line in report::render(root) {
                    println!("{}", colorize(&line));
                }
                print_summary(&BuildSummary::from_snapshot(root));
            }
            None => println!("{} no root event, build is incomplete", "!".yellow()),
        }
    }
    print_rejections(&outcome);
    Ok(())
}

fn cmd_check(config: Config, file: &Path) -> Result<()> {
    let lines = replay::read_events(file)?;
    let registry = SessionRegistry::new(config);
    let session = registry.new_session(&session_title(file));

    let outcome = replay::replay(&session, lines);
    let root = session.snapshot();
    registry.close_session(&session);

    print_rejections(&outcome);
    let Some(root) = root else {
        return Err(eyre!("{}: no root event, build is incomplete", file.display()));
    };
    if !outcome.is_clean() {
        return Err(eyre!("{}: {} event(s) rejected", file.display(), outcome.rejections.len()));
    }

    let summary = BuildSummary::from_snapshot(&root);
    if !summary.is_complete() {
        println!("{} {} node(s) never finished", "!".yellow(), summary.running);
    }
    println!(
        "{} {}: {} events, {} nodes",
        "✓".green(),
        file.display(),
        outcome.accepted,
        summary.nodes
    );
    Ok(())
}

fn colorize(line: &ReportLine) -> String {
    let indent = "  ".repeat(line.depth);
    match line.kind {
        LineKind::Node(status) => {
            let icon = match status {
                NodeStatus::Running => status.icon().yellow(),
                NodeStatus::Success | NodeStatus::UpToDate => status.icon().green(),
                NodeStatus::Failure => status.icon().red(),
                NodeStatus::Skipped | NodeStatus::Cancelled => status.icon().dimmed(),
            };
            format!("{}{} {}", indent, icon, line.text)
        }
        LineKind::Message(Severity::Error) => format!("{}{}", indent, line.text.red()),
        LineKind::Message(Severity::Warning) => format!("{}{}", indent, line.text.yellow()),
        LineKind::Message(Severity::Info) => format!("{}{}", indent, line.text.dimmed()),
    }
}

fn print_summary(summary: &BuildSummary) {
    println!();
    println!(
        "{} nodes, {} running, {} failed, {} cancelled, {} errors, {} warnings",
        summary.nodes.to_string().cyan(),
        summary.running,
        summary.failed,
        summary.cancelled,
        summary.errors,
        summary.warnings
    );
    if summary.late_messages > 0 {
        println!("{} late message(s)", summary.late_messages);
    }
}

fn print_rejections(outcome: &ReplayOutcome) {
    for rejection in &outcome.rejections {
        eprintln!(
            "{} line {}: {} ({})",
            "rejected".red(),
            rejection.line,
            rejection.error,
            rejection.error.kind()
        );
    }
}
