//! File-backed managed objects for filedao.
//!
//! A managed object keeps application state in memory and mirrors it to a
//! single logical file. It is read once at construction (or initialized when
//! the file does not exist yet) and written whenever it is marked as changed,
//! unless auto-save is suppressed.
//!
//! Two variants exist:
//!
//! - [`DocumentDao`]: the state is converted to and from a structured
//!   [`Document`] by a [`DocumentStrategy`].
//! - [`ContentDao`]: the state is serialized to opaque text by a
//!   [`DataProvider`], and previous versions are kept as numbered backup
//!   generations.
//!
//! Both share the locking and auto-save bookkeeping of [`LifecycleCore`]
//! and expose it through the [`Dao`] trait. All storage access goes through
//! a [`StorageGateway`].
//!
//! # Example
//!
//! ```
//! use std::io::Read;
//! use std::sync::Arc;
//! use filedao_persistence::{Change, ContentDao, Dao, DataProvider, HookResult};
//! use filedao_storage::MemoryGateway;
//!
//! #[derive(Default)]
//! struct Motd(String);
//!
//! impl DataProvider for Motd {
//!     fn read_from_stream(&mut self, input: &mut dyn Read) -> HookResult<Change> {
//!         input.read_to_string(&mut self.0)?;
//!         Ok(Change::Unchanged)
//!     }
//!
//!     fn fill_buffer_for_saving(&self, buffer: &mut String) -> HookResult<()> {
//!         buffer.push_str(&self.0);
//!         Ok(())
//!     }
//! }
//!
//! let gateway = Arc::new(MemoryGateway::new());
//! let dao = ContentDao::new("motd.txt", gateway.clone(), Motd::default()).unwrap();
//!
//! dao.perform_without_auto_save(|| {
//!     dao.modify(|motd| {
//!         motd.0 = "maintenance at noon".to_string();
//!         Change::Changed
//!     });
//!     assert!(dao.has_pending_changes());
//! });
//!
//! assert!(!dao.has_pending_changes());
//! assert_eq!(gateway.content("motd.txt").unwrap(), "maintenance at noon");
//! ```

pub mod backup;
mod binding;
pub mod config;
pub mod content_dao;
pub mod document;
pub mod document_dao;
pub mod error;
pub mod filename;
pub mod handlers;
pub mod lifecycle;
pub mod state;

pub use backup::{generation_filename, list_generations, rotate_backups, Generation};
pub use config::{DaoConfig, InitialWriteFailure, DEFAULT_BACKUP_COUNT, MAX_BACKUP_COUNT};
pub use content_dao::{ContentDao, DataProvider};
pub use document::{provenance_comment, Document, Element, Node};
pub use document_dao::{DocumentDao, DocumentStrategy};
pub use error::{HookError, HookResult, PersistenceError, Result};
pub use filename::{filename_fn, FilenameProvider, FnFilename};
pub use handlers::{ExceptionHandlers, HandlerGuard, ReadExceptionHandler, WriteExceptionHandler};
pub use lifecycle::{
    AutoSaveSuspension, Bookkeeping, Dao, DaoStats, LifecycleCore, LockedState,
    DEFAULT_AUTO_SAVE_ENABLED,
};
pub use state::{Change, Success};

pub use filedao_storage::{Encoding, Resource, StorageGateway};
