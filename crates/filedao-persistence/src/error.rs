//! Error types for persistence operations.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use thiserror::Error;

/// Boxed error returned by strategy hooks.
pub type HookError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type returned by strategy hooks.
pub type HookResult<T> = std::result::Result<T, HookError>;

/// Errors that can occur during persistence operations.
///
/// Only construction and configuration surface these to callers. Failures
/// while writing are logged, handed to the write exception handler and turned
/// into [`crate::Success::Failure`].
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Reading or initializing a managed object failed.
    #[error("error {} the file '{}': {source}", phase(.initialization), display_name(.filename))]
    Read {
        filename: Option<String>,
        initialization: bool,
        #[source]
        source: Box<PersistenceError>,
    },

    /// The write triggered by the initial read failed and the configuration
    /// asks for construction to be aborted.
    #[error("initial write of '{0}' failed")]
    InitialWrite(String),

    /// Raw storage failure.
    #[error("I/O error on '{filename}': {source}")]
    Io {
        filename: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to serialize or parse a document.
    #[error("failed to serialize: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A strategy hook failed.
    #[error("{hook} failed: {source}")]
    Hook {
        hook: &'static str,
        #[source]
        source: HookError,
    },

    /// A strategy hook panicked.
    #[error("{hook} panicked: {message}")]
    HookPanicked { hook: &'static str, message: String },

    /// The document strategy produced no root element to write.
    #[error("no data to write for '{0}'")]
    MissingWriteData(String),

    /// The data provider rejected the generated content.
    #[error("content generated for '{0}' is not valid for saving")]
    InvalidContent(String),

    /// No filename is available, so nothing can be written.
    #[error("managed object is memory-only")]
    MemoryOnly,
}

impl PersistenceError {
    pub(crate) fn io(filename: impl Into<String>, source: std::io::Error) -> Self {
        PersistenceError::Io {
            filename: filename.into(),
            source,
        }
    }

    pub(crate) fn hook(hook: &'static str, source: HookError) -> Self {
        PersistenceError::Hook { hook, source }
    }

    pub(crate) fn read(
        filename: Option<&str>,
        initialization: bool,
        source: PersistenceError,
    ) -> Self {
        PersistenceError::Read {
            filename: filename.map(str::to_string),
            initialization,
            source: Box::new(source),
        }
    }
}

fn phase(initialization: &bool) -> &'static str {
    if *initialization {
        "initializing"
    } else {
        "reading"
    }
}

fn display_name(filename: &Option<String>) -> &str {
    filename.as_deref().unwrap_or("<memory-only>")
}

/// Result type alias for persistence operations.
pub type Result<T> = std::result::Result<T, PersistenceError>;

/// Runs a strategy hook, converting both a returned error and a panic into a
/// [`PersistenceError`].
pub(crate) fn call_hook<T>(hook: &'static str, f: impl FnOnce() -> HookResult<T>) -> Result<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(PersistenceError::hook(hook, source)),
        Err(payload) => Err(PersistenceError::HookPanicked {
            hook,
            message: panic_message(payload.as_ref()),
        }),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
