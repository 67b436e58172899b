//! CLI module for revchain
//!
//! Provides command-line interface for:
//! - init: create the journal
//! - serve: run the HTTP API
//! - history: print one chain
//! - verify: check every chain's invariants

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{build_coordinator, default_registry, history, init, run, run_command, serve, verify};
pub use errors::{CliError, CliErrorCode, CliResult};
