use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "scenic", version, about = "Scenario tests for message-oriented services")]
pub struct Cli {
    /// Emit JSON output instead of human-readable output.
    #[arg(long)]
    pub json: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a spec document.
    Run {
        /// Path to the spec document (JSON).
        spec: PathBuf,
        /// Base directory for relative file references; defaults to the
        /// spec's directory.
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Initial binding as NAME=VALUE (repeatable). JSON values are
        /// parsed; anything else is kept as a string.
        #[arg(short = 'p', long = "param")]
        params: Vec<String>,
        /// Overall deadline for the run (e.g. `30s`, `5m`).
        #[arg(long)]
        timeout: Option<String>,
    },
}
