//! ecom-pipeline CLI entry point.
//!
//! Loads configuration, initializes logging and delegates to the CLI module
//! for command handling.

use std::process::ExitCode;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Parse CLI arguments first to get log_level and the config path
    let cli = ecom_pipeline::cli::parse_cli();

    // A missing or invalid configuration is fatal at start
    let config = ecom_pipeline::cli::load_config(&cli)?;

    // Priority: RUST_LOG env var > --log-level CLI arg > default "info"
    ecom_pipeline::logging::init(&cli.log_level, Some(&config.log_dir()))?;

    let code = ecom_pipeline::cli::run_with_cli(cli, config).await?;
    Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
}
