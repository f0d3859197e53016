//! Command-line interface for ecom-pipeline.
//!
//! Provides commands for single runs, the daily scheduler, monitoring,
//! lock inspection and recovery, and retention cleanup.

mod commands;

pub use commands::{
    load_config, parse_cli, run_with_cli, Cli, Commands, EXIT_INTERRUPTED, EXIT_LOCKED,
};
