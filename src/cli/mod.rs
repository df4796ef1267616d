//! Command-line interface for imagen-forge.
//!
//! Provides one subcommand per pipeline stage plus a read-only status report.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
