// src/cli/mod.rs — CLI definition (clap derive)

pub mod hook;
pub mod learn;
pub mod status;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use crate::infra::paths;
use crate::memory::MemoryManager;

#[derive(Parser)]
#[command(
    name = "koi-learn",
    about = "Learns which helpers pay off in coding sessions",
    version
)]
pub struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Database path (defaults to the data directory)
    #[arg(long, global = true)]
    pub db: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Handle one host lifecycle event (JSON on stdin, JSON on stdout)
    Hook,
    /// Run a learning cycle and print the report
    Learn {
        /// Window in days (defaults to learning.window_days)
        #[arg(long)]
        days: Option<u32>,
        /// Session to predict a helper for
        #[arg(long)]
        session: Option<String>,
        /// Emit the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show or reset helper thresholds
    Thresholds {
        /// Reset one helper type to its default
        #[arg(long, conflicts_with = "reset_all")]
        reset: Option<String>,
        /// Reset every helper type
        #[arg(long)]
        reset_all: bool,
    },
    /// List the most frequent error patterns
    Patterns {
        #[arg(long, default_value = "10")]
        limit: u32,
    },
    /// Predict a helper for a session from similar past sessions
    Predict {
        #[arg(long)]
        session: String,
    },
    /// Show paths and store counts
    Status,
}

/// Database path from the flag, or the default location.
pub fn resolve_db_path(db: Option<&str>) -> PathBuf {
    db.map(PathBuf::from).unwrap_or_else(paths::db_path)
}

pub fn open_memory(path: &Path) -> anyhow::Result<MemoryManager> {
    MemoryManager::open(path)
}
