//! CLI command definitions for ecom-pipeline.
//!
//! Every command loads the configuration once and passes it explicitly to the
//! component it drives. Commands return the process exit code.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{ConfigError, PipelineConfig, DEFAULT_CONFIG_PATH};
use crate::error::ReportError;
use crate::lock::SingleFlightLock;
use crate::monitoring::MonitoringEvaluator;
use crate::pipeline::RunReport;
use crate::scheduler::{RetentionCleaner, Scheduler, TickOutcome};

/// Exit code of a run skipped because another run holds the lock.
pub const EXIT_LOCKED: i32 = 2;

/// Exit code of a run interrupted by a termination signal.
pub const EXIT_INTERRUPTED: i32 = 130;

/// E-commerce ETL pipeline orchestrator.
#[derive(Parser)]
#[command(name = "ecom-pipeline")]
#[command(about = "Run, schedule and monitor the e-commerce ETL pipeline")]
#[command(version)]
#[command(
    long_about = "ecom-pipeline runs the ETL steps in order with retries, guards runs with a single-flight lock, schedules a daily run and evaluates pipeline health.\n\nExample usage:\n  ecom-pipeline run\n  ecom-pipeline schedule --config config/config.yaml\n  ecom-pipeline monitor"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Path to the YAML configuration file.
    #[arg(short, long, env = "PIPELINE_CONFIG", default_value = DEFAULT_CONFIG_PATH, global = true)]
    pub config: PathBuf,

    /// Ignore the configuration file and use built-in defaults.
    #[arg(long, global = true)]
    pub defaults: bool,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Run the pipeline once under the single-flight lock.
    ///
    /// Exits 0 on success, 1 on a failed run and 2 if another run is active.
    Run(RunArgs),

    /// Run the daily scheduler until interrupted.
    #[command(alias = "sched")]
    Schedule,

    /// Evaluate pipeline health and write the monitoring report.
    ///
    /// Exits 0 when healthy, 1 when degraded or critical.
    Monitor(MonitorArgs),

    /// Show the lock holder and the last run.
    Status,

    /// Remove a lock left behind by a crashed run.
    Unlock,

    /// Delete files older than the retention period.
    Cleanup,
}

/// Arguments for `ecom-pipeline run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Skip the retention cleanup after the run.
    #[arg(long)]
    pub no_cleanup: bool,
}

/// Arguments for `ecom-pipeline monitor`.
#[derive(Parser, Debug)]
pub struct MonitorArgs {
    /// Print the report as compact JSON instead of pretty JSON.
    #[arg(long)]
    pub compact: bool,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Loads the configuration selected by the global flags.
pub fn load_config(cli: &Cli) -> Result<PipelineConfig, ConfigError> {
    if cli.defaults {
        let mut config = PipelineConfig::new();
        config.apply_env_overrides()?;
        config.validate()?;
        return Ok(config);
    }
    PipelineConfig::load(&cli.config)
}

/// Run the CLI with the parsed arguments and configuration.
///
/// Returns the process exit code.
pub async fn run_with_cli(cli: Cli, config: PipelineConfig) -> anyhow::Result<i32> {
    match cli.command {
        Commands::Run(args) => run_pipeline_command(&config, args).await,
        Commands::Schedule => run_schedule_command(&config).await,
        Commands::Monitor(args) => run_monitor_command(&config, args).await,
        Commands::Status => run_status_command(&config),
        Commands::Unlock => run_unlock_command(&config),
        Commands::Cleanup => run_cleanup_command(&config).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn run_pipeline_command(config: &PipelineConfig, args: RunArgs) -> anyhow::Result<i32> {
    let mut scheduler = Scheduler::from_config(config)?;
    if args.no_cleanup {
        scheduler = scheduler.without_cleanup();
    }

    let outcome = tokio::select! {
        outcome = scheduler.run_guarded() => outcome?,
        () = shutdown_signal() => {
            warn!("Run interrupted; lock released");
            return Ok(EXIT_INTERRUPTED);
        }
    };

    match outcome {
        TickOutcome::Skipped => {
            let holder = scheduler.lock().holder()?.unwrap_or_default();
            println!("Pipeline already running (lock held by process {})", holder);
            Ok(EXIT_LOCKED)
        }
        TickOutcome::Completed(report) => {
            println!("{}", report.summary());
            for warning in &report.warnings {
                println!("warning: {}", warning);
            }
            Ok(report.exit_code())
        }
    }
}

async fn run_schedule_command(config: &PipelineConfig) -> anyhow::Result<i32> {
    let scheduler = Scheduler::from_config(config)?;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        trigger.cancel();
    });

    scheduler.run(cancel).await?;
    info!("Scheduler shut down");
    Ok(0)
}

async fn run_monitor_command(config: &PipelineConfig, args: MonitorArgs) -> anyhow::Result<i32> {
    run_monitor_to(config, args, &mut std::io::stdout()).await
}

/// Writes the monitoring report to `out` as a single JSON document; logs go
/// to stderr so `out` stays machine-readable.
async fn run_monitor_to(
    config: &PipelineConfig,
    args: MonitorArgs,
    out: &mut impl Write,
) -> anyhow::Result<i32> {
    let evaluator = MonitoringEvaluator::from_config(config);
    let (report, persisted) = evaluator.evaluate_and_persist().await;

    if args.compact {
        serde_json::to_writer(&mut *out, &report)?;
    } else {
        serde_json::to_writer_pretty(&mut *out, &report)?;
    }
    writeln!(out)?;

    persisted.with_context(|| {
        format!(
            "Failed to write monitoring report to {}",
            evaluator.output_path().display()
        )
    })?;

    Ok(report.exit_code())
}

fn run_status_command(config: &PipelineConfig) -> anyhow::Result<i32> {
    let lock = SingleFlightLock::new(config.lock_path());
    match lock.holder()? {
        Some(pid) => println!("Lock: held by process {} ({})", pid, lock.path().display()),
        None => println!("Lock: free"),
    }

    let report_path = config.run_report_path();
    match RunReport::load(&report_path) {
        Ok(report) => {
            println!("Last run: {}", report.summary());
            for (name, result) in report.steps.iter() {
                println!(
                    "  {:<24} {:<8} {:>8.2}s  retries={}",
                    name, result.status, result.duration_seconds, result.retry_attempts
                );
            }
        }
        Err(ReportError::NotFound(_)) => println!("Last run: none recorded"),
        Err(e) => {
            error!("Failed to read {}: {}", report_path.display(), e);
            println!("Last run: unreadable ({})", e);
        }
    }

    Ok(0)
}

fn run_unlock_command(config: &PipelineConfig) -> anyhow::Result<i32> {
    let lock = SingleFlightLock::new(config.lock_path());
    match lock.force_clear()? {
        Some(pid) => println!("Removed lock held by process {}", pid),
        None => println!("No lock present at {}", lock.path().display()),
    }
    Ok(0)
}

async fn run_cleanup_command(config: &PipelineConfig) -> anyhow::Result<i32> {
    let cleaner = RetentionCleaner::from_config(config);
    let stats = tokio::task::spawn_blocking(move || cleaner.clean())
        .await
        .context("Cleanup task panicked")?;

    println!("{}", stats);
    Ok(if stats.failed == 0 { 0 } else { 1 })
}

/// Completes on SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl-C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT (Ctrl-C), shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
