//! The storage gateway contract consumed by managed objects.
//!
//! A gateway maps logical filenames (for example `config/users.json`) to
//! actual storage. Managed objects never touch the filesystem themselves;
//! they open, rename and save through the gateway they were constructed with.

use std::fmt;
use std::io::{self, Read, Write};
use std::path::PathBuf;

/// Text encoding used when persisting string content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// UTF-8 (the default).
    #[default]
    Utf8,
    /// ISO-8859-1. Characters above U+00FF cannot be represented.
    Latin1,
}

impl Encoding {
    /// Encodes `content` into bytes.
    ///
    /// # Errors
    /// Returns an `InvalidData` error if a character cannot be represented.
    pub fn encode(&self, content: &str) -> io::Result<Vec<u8>> {
        match self {
            Encoding::Utf8 => Ok(content.as_bytes().to_vec()),
            Encoding::Latin1 => content
                .chars()
                .map(|c| {
                    u8::try_from(u32::from(c)).map_err(|_| {
                        io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!("character {:?} is not representable in ISO-8859-1", c),
                        )
                    })
                })
                .collect(),
        }
    }

    /// Decodes bytes previously produced by [`Encoding::encode`].
    ///
    /// # Errors
    /// Returns an `InvalidData` error for malformed UTF-8.
    pub fn decode(&self, bytes: &[u8]) -> io::Result<String> {
        match self {
            Encoding::Utf8 => String::from_utf8(bytes.to_vec())
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
            Encoding::Latin1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
        }
    }

    /// Canonical charset name.
    pub fn name(&self) -> &'static str {
        match self {
            Encoding::Utf8 => "UTF-8",
            Encoding::Latin1 => "ISO-8859-1",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An addressable resource a logical filename resolves to.
///
/// Used for diagnostics (logging, exception handlers) and by operator tooling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    /// The logical filename this resource was resolved from.
    pub filename: String,
    /// Local path, when the gateway is backed by the filesystem.
    pub path: Option<PathBuf>,
}

impl Resource {
    /// A resource without a local path (e.g. in-memory storage).
    pub fn logical(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            path: None,
        }
    }

    /// A resource backed by a local file.
    pub fn local(filename: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            filename: filename.into(),
            path: Some(path.into()),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{}", path.display()),
            None => write!(f, "memory:{}", self.filename),
        }
    }
}

/// A writable destination that only becomes visible once committed.
///
/// Dropping a sink without calling [`OutputSink::commit`] discards everything
/// written to it.
pub trait OutputSink: Write + Send {
    /// Makes the written bytes the new content of the target.
    fn commit(self: Box<Self>) -> io::Result<()>;
}

/// Raw storage operations over a logical filename space.
pub trait StorageGateway: Send + Sync {
    /// Opens a readable stream.
    ///
    /// Returns `Ok(None)` if there is nothing to read, which includes the case
    /// of no filename at all.
    fn open_input(&self, filename: Option<&str>) -> io::Result<Option<Box<dyn Read + Send>>>;

    /// Resolves a logical filename to an addressable resource.
    fn resolve(&self, filename: &str) -> Resource;

    /// Returns true if content is stored under `filename`.
    fn exists(&self, filename: &str) -> bool;

    /// Renames `from` to `to`.
    ///
    /// A missing source is not an error. An existing destination is replaced.
    fn rename(&self, from: &str, to: &str) -> io::Result<()>;

    /// Persists `content` under `filename` using `encoding`.
    fn save_text(&self, filename: &str, content: &str, encoding: Encoding) -> io::Result<()>;

    /// Opens an output sink for `filename`.
    ///
    /// Returns `Ok(None)` if the target is currently unavailable, e.g. because
    /// another application holds it open.
    fn open_output(&self, filename: &str) -> io::Result<Option<Box<dyn OutputSink>>>;
}
