//! CLI command definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// buildtree - build event aggregation
#[derive(Parser, Debug)]
#[command(
    name = "bt",
    about = "Assemble build event logs into a live build tree",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay a JSONL event file and print the resulting tree
    Replay {
        /// Event file, one JSON event per line
        #[arg(required = true)]
        file: PathBuf,

        /// Cancel whatever is still running once the file is consumed
        #[arg(long)]
        cancel: bool,

        /// Print each delta as a JSON line instead of the tree
        #[arg(long)]
        deltas: bool,
    },

    /// Validate an event file; exits non-zero on any rejected event
    Check {
        /// Event file, one JSON event per line
        #[arg(required = true)]
        file: PathBuf,
    },
}
