//! Command-line interface definition using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use filedao_persistence::DEFAULT_BACKUP_COUNT;

/// Version string with git hash and build date, e.g. "0.1.0 (abc1234, 2026-01-29)".
fn version_string() -> &'static str {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    const GIT_HASH: &str = env!("GIT_HASH");
    const BUILD_DATE: &str = env!("BUILD_DATE");

    static VERSION_STRING: std::sync::OnceLock<String> = std::sync::OnceLock::new();
    VERSION_STRING.get_or_init(|| format!("{} ({}, {})", VERSION, GIT_HASH, BUILD_DATE))
}

/// filedao - inspect and repair managed object files
#[derive(Parser, Debug)]
#[command(name = "filedao")]
#[command(author, version = version_string(), about, long_about = None)]
pub struct Cli {
    /// Enable verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Storage directory the managed objects live in
    #[arg(short = 'd', long, env = "FILEDAO_BASE_DIR")]
    pub base_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the live file and its backup generations
    Generations {
        /// Logical filename, relative to the storage directory
        #[arg(required = true)]
        name: String,

        /// Number of backup generations to look for
        #[arg(short, long, default_value_t = DEFAULT_BACKUP_COUNT)]
        backups: usize,

        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Make a backup generation the live file again
    Restore {
        /// Logical filename, relative to the storage directory
        #[arg(required = true)]
        name: String,

        /// Generation to restore (1 = most recent backup)
        #[arg(short, long)]
        generation: usize,

        /// Number of backup generations to keep
        #[arg(short, long, default_value_t = DEFAULT_BACKUP_COUNT)]
        backups: usize,
    },

    /// Check that a file parses as a document
    Check {
        /// Logical filename, relative to the storage directory
        #[arg(required = true)]
        name: String,
    },
}

/// Output format for list commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl Cli {
    /// Returns the storage directory, using `~/.filedao` if not specified.
    pub fn base_dir(&self) -> PathBuf {
        self.base_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .map(|h| h.join(".filedao"))
                .unwrap_or_else(|| PathBuf::from(".filedao"))
        })
    }

    /// Returns the log level based on verbosity.
    pub fn log_level(&self) -> tracing::Level {
        match self.verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}
