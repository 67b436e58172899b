//! CLI argument definitions using clap
//!
//! Commands:
//! - revchain init --config <path>
//! - revchain serve --config <path>
//! - revchain history --config <path> --chain <id>
//! - revchain verify --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// revchain - immutable resource versioning
#[derive(Parser, Debug)]
#[command(name = "revchain")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the journal under the configured data directory
    Init {
        /// Path to configuration file
        #[arg(long, default_value = "./revchain.json")]
        config: PathBuf,
    },

    /// Serve the HTTP API
    Serve {
        /// Path to configuration file
        #[arg(long, default_value = "./revchain.json")]
        config: PathBuf,

        /// Override the configured port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Print the ordered history of one chain
    History {
        /// Path to configuration file
        #[arg(long, default_value = "./revchain.json")]
        config: PathBuf,

        /// Chain id
        #[arg(long)]
        chain: String,
    },

    /// Check chain invariants for every chain in the journal
    Verify {
        /// Path to configuration file
        #[arg(long, default_value = "./revchain.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
