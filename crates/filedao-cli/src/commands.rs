//! Command handlers for CLI subcommands.

use std::fs;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use filedao_persistence::{
    generation_filename, list_generations, Change, ContentDao, DaoConfig, DataProvider, Dao,
    Document, HookResult, PersistenceError,
};
use filedao_storage::{FileSystemGateway, StorageGateway};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::cli::{Commands, OutputFormat};

/// Errors of CLI commands.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("'{0}' does not exist")]
    NotFound(String),

    #[error("generation 0 is the live file; choose a backup generation (1..={0})")]
    LiveGeneration(usize),

    #[error("generation {generation} is outside the configured {backups} backups")]
    GenerationOutOfRange { generation: usize, backups: usize },

    #[error("'{0}' could not be written; see the log for details")]
    RestoreFailed(String),

    #[error("'{name}' is not a valid document: {reason}")]
    InvalidDocument { name: String, reason: String },
}

/// Result type for command operations.
pub type Result<T> = std::result::Result<T, CommandError>;

/// Execute a CLI command against the storage directory `base_dir`.
pub fn execute(command: Commands, base_dir: &Path) -> Result<()> {
    let gateway = Arc::new(FileSystemGateway::new(base_dir));

    match command {
        Commands::Generations {
            name,
            backups,
            format,
        } => cmd_generations(gateway.as_ref(), &name, backups, format),
        Commands::Restore {
            name,
            generation,
            backups,
        } => cmd_restore(gateway, &name, generation, backups),
        Commands::Check { name } => cmd_check(gateway.as_ref(), &name),
    }
}

/// One row of the `generations` listing.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationInfo {
    pub generation: usize,
    pub filename: String,
    pub size: Option<u64>,
    pub modified: Option<DateTime<Utc>>,
}

/// Collects the existing generations of `name` with file metadata.
pub fn generation_infos(
    gateway: &dyn StorageGateway,
    name: &str,
    backups: usize,
) -> Vec<GenerationInfo> {
    list_generations(gateway, name, backups)
        .into_iter()
        .map(|g| {
            let meta = g.path.as_ref().and_then(|p| fs::metadata(p).ok());
            GenerationInfo {
                generation: g.generation,
                filename: g.filename,
                size: meta.as_ref().map(|m| m.len()),
                modified: meta
                    .and_then(|m| m.modified().ok())
                    .map(DateTime::<Utc>::from),
            }
        })
        .collect()
}

fn cmd_generations(
    gateway: &dyn StorageGateway,
    name: &str,
    backups: usize,
    format: OutputFormat,
) -> Result<()> {
    let infos = generation_infos(gateway, name, backups);

    match format {
        OutputFormat::Table => {
            if infos.is_empty() {
                println!("No generations of '{}' found.", name);
                return Ok(());
            }

            println!("{:<4}  {:<30}  {:>10}  MODIFIED", "GEN", "FILE", "SIZE");
            println!("{}", "-".repeat(70));
            for info in &infos {
                println!(
                    "{:<4}  {:<30}  {:>10}  {}",
                    info.generation,
                    truncate(&info.filename, 30),
                    info.size.map_or_else(|| "-".to_string(), |s| s.to_string()),
                    info.modified.map_or_else(
                        || "-".to_string(),
                        |m| m.format("%Y-%m-%d %H:%M:%S").to_string()
                    )
                );
            }
            println!("\n{} generation(s)", infos.len());
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&infos)?;
            println!("{}", json);
        }
    }

    Ok(())
}

/// Raw file content, written back verbatim.
#[derive(Debug, Default)]
struct RawContent(String);

impl DataProvider for RawContent {
    fn read_from_stream(&mut self, input: &mut dyn Read) -> HookResult<Change> {
        self.0.clear();
        input.read_to_string(&mut self.0)?;
        Ok(Change::Unchanged)
    }

    fn fill_buffer_for_saving(&self, buffer: &mut String) -> HookResult<()> {
        buffer.push_str(&self.0);
        Ok(())
    }
}

/// Writes the content of `generation` as the new live file. The current live
/// file becomes generation 1.
pub fn restore_generation(
    gateway: Arc<dyn StorageGateway>,
    name: &str,
    generation: usize,
    backups: usize,
) -> Result<()> {
    if generation == 0 {
        return Err(CommandError::LiveGeneration(backups));
    }
    if generation > backups {
        return Err(CommandError::GenerationOutOfRange {
            generation,
            backups,
        });
    }

    let source = generation_filename(name, generation);
    let mut content = String::new();
    gateway
        .open_input(Some(source.as_str()))?
        .ok_or_else(|| CommandError::NotFound(source.clone()))?
        .read_to_string(&mut content)?;

    let config = DaoConfig::from_env()?
        .with_backup_count(backups)
        .with_auto_save(true);
    let dao = ContentDao::with_config(name.to_string(), gateway, RawContent::default(), config)?;

    dao.modify(|raw| {
        raw.0 = content;
        Change::Changed
    });
    if dao.has_pending_changes() {
        return Err(CommandError::RestoreFailed(name.to_string()));
    }

    info!(name = %name, generation = generation, "Restored generation");
    Ok(())
}

fn cmd_restore(
    gateway: Arc<FileSystemGateway>,
    name: &str,
    generation: usize,
    backups: usize,
) -> Result<()> {
    restore_generation(gateway, name, generation, backups)?;
    println!(
        "Restored '{}' from generation {}",
        name,
        generation_filename(name, generation)
    );
    println!("  Previous live file kept as {}", generation_filename(name, 1));
    Ok(())
}

/// Summary of a parsed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSummary {
    pub root: Option<String>,
    pub children: usize,
    pub comments: usize,
}

/// Parses `name` as a document.
pub fn check_document(gateway: &dyn StorageGateway, name: &str) -> Result<DocumentSummary> {
    let input = gateway
        .open_input(Some(name))?
        .ok_or_else(|| CommandError::NotFound(name.to_string()))?;
    let doc = Document::from_reader(input).map_err(|e| CommandError::InvalidDocument {
        name: name.to_string(),
        reason: e.to_string(),
    })?;

    Ok(DocumentSummary {
        root: doc.root().map(|r| r.name.clone()),
        children: doc.root().map_or(0, |r| r.child_elements().count()),
        comments: doc.comments.len(),
    })
}

fn cmd_check(gateway: &dyn StorageGateway, name: &str) -> Result<()> {
    let summary = check_document(gateway, name)?;
    match &summary.root {
        Some(root) => {
            println!("{}: ok", name);
            println!("  Root: <{}>", root);
            println!("  Child elements: {}", summary.children);
            println!("  Comments: {}", summary.comments);
        }
        None => println!("{}: ok (no root element)", name),
    }
    Ok(())
}

/// Truncates a string to the given length, adding "..." if truncated.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
