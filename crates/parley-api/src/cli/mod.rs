//! CLI command definitions for the `parley` binary.
//!
//! Uses clap derive macros for argument parsing. `serve` runs the HTTP API;
//! `history` and `clear` operate on the configured session store directly.

pub mod history;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Chat-turn orchestration service with bounded per-session memory.
#[derive(Parser)]
#[command(name = "parley", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to a TOML config file (overrides `PARLEY_CONFIG`).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Also export spans to stdout through OpenTelemetry.
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Default log filter when `RUST_LOG` is unset.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 if self.quiet => "error",
            0 => "info",
            1 => "info,parley_core=debug,parley_infra=debug,parley=debug",
            _ => "trace",
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API server.
    Serve {
        /// Port to listen on (overrides config and `PORT`).
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (overrides config and `HOST`).
        #[arg(long)]
        host: Option<String>,
    },

    /// Show the stored history of one session.
    History {
        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// Clear one session, or every session matching the given components.
    Clear {
        #[command(flatten)]
        scope: ScopeArgs,

        /// Skip the confirmation prompt.
        #[arg(short, long)]
        force: bool,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

/// Session scope selectors shared by `history` and `clear`.
#[derive(clap::Args)]
pub struct ScopeArgs {
    /// User whose sessions to operate on.
    #[arg(short, long)]
    pub user: String,

    /// Session domain (default "universal"; omitted on `clear` matches all).
    #[arg(short, long)]
    pub domain: Option<String>,

    /// Session category (default "general"; omitted on `clear` matches all).
    #[arg(short, long)]
    pub category: Option<String>,
}
