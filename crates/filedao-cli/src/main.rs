//! filedao CLI entry point.

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use filedao_cli::cli::Cli;
use filedao_cli::commands;

fn main() {
    // Load .env.local if it exists (FILEDAO_BASE_DIR, FILEDAO_BACKUP_COUNT etc.)
    let _ = dotenvy::from_filename(".env.local");

    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level().to_string()));

    fmt().with_env_filter(filter).with_target(false).init();

    let base_dir = cli.base_dir();

    if let Err(e) = commands::execute(cli.command, &base_dir) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
