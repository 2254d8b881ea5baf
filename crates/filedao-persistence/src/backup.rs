//! Backup generations of content files.
//!
//! Generation 0 is the live file; generation `i` is the live filename with
//! the suffix `.i`. Before each overwrite the chain is shifted one slot back,
//! oldest first, so no generation is overwritten before it has been moved.

use std::io;
use std::path::PathBuf;

use filedao_storage::StorageGateway;
use serde::Serialize;

/// Filename of `generation` of `filename`.
pub fn generation_filename(filename: &str, generation: usize) -> String {
    if generation == 0 {
        filename.to_string()
    } else {
        format!("{}.{}", filename, generation)
    }
}

/// Shifts every generation one slot back, dropping the oldest one once the
/// chain holds `backup_count` backups. Afterwards generation 0 is free.
pub fn rotate_backups(
    gateway: &dyn StorageGateway,
    filename: &str,
    backup_count: usize,
) -> io::Result<()> {
    for i in (1..=backup_count).rev() {
        gateway.rename(
            &generation_filename(filename, i - 1),
            &generation_filename(filename, i),
        )?;
    }
    Ok(())
}

/// One stored generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Generation {
    pub generation: usize,
    pub filename: String,
    /// Local path, if the gateway is filesystem-backed.
    pub path: Option<PathBuf>,
}

/// Lists the generations 0..=`backup_count` that currently exist.
pub fn list_generations(
    gateway: &dyn StorageGateway,
    filename: &str,
    backup_count: usize,
) -> Vec<Generation> {
    (0..=backup_count)
        .map(|generation| generation_filename(filename, generation))
        .enumerate()
        .filter(|(_, name)| gateway.exists(name))
        .map(|(generation, name)| Generation {
            generation,
            path: gateway.resolve(&name).path,
            filename: name,
        })
        .collect()
}
