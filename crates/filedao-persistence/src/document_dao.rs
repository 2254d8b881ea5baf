//! Managed objects persisted as structured documents.
//!
//! A [`DocumentDao`] owns a [`DocumentStrategy`] that holds the application
//! state and knows how to fill it from a [`Document`] and how to turn it back
//! into one. The DAO takes care of locking, first-run initialization,
//! auto-save and failure handling.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use filedao_persistence::{
//!     Change, Dao, Document, DocumentDao, DocumentStrategy, Element, HookResult,
//! };
//! use filedao_storage::MemoryGateway;
//!
//! #[derive(Default)]
//! struct Names(Vec<String>);
//!
//! impl DocumentStrategy for Names {
//!     fn on_read(&mut self, doc: &Document) -> HookResult<Change> {
//!         if let Some(root) = doc.root() {
//!             self.0 = root.children_named("name").map(|e| e.text()).collect();
//!         }
//!         Ok(Change::Unchanged)
//!     }
//!
//!     fn create_write_data(&self) -> HookResult<Document> {
//!         let mut root = Element::new("names");
//!         for name in &self.0 {
//!             root.append_element(Element::new("name")).append_text(name.clone());
//!         }
//!         Ok(Document::with_root(root))
//!     }
//! }
//!
//! let gateway = Arc::new(MemoryGateway::new());
//! let dao = DocumentDao::new("names.json", gateway.clone(), Names::default()).unwrap();
//!
//! dao.modify(|names| {
//!     names.0.push("alice".to_string());
//!     Change::Changed
//! });
//!
//! assert!(!dao.has_pending_changes());
//! assert!(gateway.content("names.json").unwrap().contains("alice"));
//! ```

use std::fmt;
use std::io::Write;
use std::sync::Arc;

use chrono::Utc;
use filedao_storage::{Resource, StorageGateway};
use tracing::{debug, error, info, warn};

use crate::binding::Binding;
use crate::config::{DaoConfig, InitialWriteFailure};
use crate::document::{provenance_comment, Document};
use crate::error::{call_hook, HookResult, PersistenceError, Result};
use crate::filename::FilenameProvider;
use crate::lifecycle::{Dao, LifecycleCore, LockedState};
use crate::state::{Change, Success};

/// Hooks of a document-backed managed object.
///
/// All hooks run while the object's write lock is held.
pub trait DocumentStrategy {
    /// Called instead of [`DocumentStrategy::on_read`] when there is no file
    /// yet. Return `Changed` to have the initial state written right away.
    fn on_init(&mut self) -> HookResult<Change> {
        Ok(Change::Unchanged)
    }

    /// Fills the state from a parsed document. Return `Changed` if the state
    /// differs from the document (e.g. after a migration) and should be
    /// written back.
    fn on_read(&mut self, doc: &Document) -> HookResult<Change>;

    /// Builds the document to write. It must have a root element.
    fn create_write_data(&self) -> HookResult<Document>;

    /// Decorates the document before it is written. Stamps the provenance
    /// comment by default.
    fn modify_write_data(&self, doc: &mut Document) {
        doc.insert_comment(provenance_comment(Utc::now()));
    }

    /// Last chance for side effects (e.g. snapshots) before the file is
    /// overwritten.
    fn before_write_to_file(&mut self, _filename: &str, _resource: &Resource) -> HookResult<()> {
        Ok(())
    }

    /// Called once when a write goes to a different file than the previous
    /// one.
    fn on_filename_change(&mut self, _old: Option<&str>, _new: &str) {}
}

/// A managed object persisted as a [`Document`].
pub struct DocumentDao<S> {
    lifecycle: LifecycleCore<S>,
    binding: Binding,
}

impl<S: DocumentStrategy> DocumentDao<S> {
    /// Creates the object with the default configuration and performs the
    /// initial read.
    pub fn new(
        filename_provider: impl FilenameProvider + 'static,
        gateway: Arc<dyn StorageGateway>,
        strategy: S,
    ) -> Result<Self> {
        Self::with_config(filename_provider, gateway, strategy, DaoConfig::default())
    }

    /// Creates the object and performs the initial read.
    ///
    /// # Errors
    /// Fails on invalid configuration, if reading or initializing fails, or
    /// if the resulting write fails and the config asks to abort.
    pub fn with_config(
        filename_provider: impl FilenameProvider + 'static,
        gateway: Arc<dyn StorageGateway>,
        strategy: S,
        config: DaoConfig,
    ) -> Result<Self> {
        config.validate()?;
        let filename = filename_provider.filename();
        let dao = Self {
            lifecycle: LifecycleCore::new(strategy, config.auto_save_enabled, filename),
            binding: Binding::new(Box::new(filename_provider), gateway, config),
        };
        dao.initial_read()?;
        Ok(dao)
    }

    /// The current logical filename.
    pub fn filename(&self) -> Option<String> {
        self.binding.filename()
    }

    pub fn config(&self) -> &DaoConfig {
        &self.binding.config
    }

    /// Read-locked access to the state.
    pub fn read<R>(&self, op: impl FnOnce(&S) -> R) -> R {
        op(&self.lifecycle.read().value)
    }

    /// Write-locked mutation of the state. If `op` reports `Changed`, the
    /// object is marked as changed under the same lock.
    pub fn modify(&self, op: impl FnOnce(&mut S) -> Change) -> Change {
        let mut state = self.lifecycle.write();
        let change = op(&mut state.value);
        if change.is_changed() {
            self.mark_changed_locked(&mut state);
        }
        change
    }

    /// Records a mutation. With auto-save enabled the state is written
    /// immediately; a failed write keeps the changes pending.
    pub fn mark_as_changed(&self) {
        let mut state = self.lifecycle.write();
        self.mark_changed_locked(&mut state);
    }

    fn mark_changed_locked(&self, state: &mut LockedState<S>) {
        state.core.internal_set_pending_changes(true);
        if !state.core.internal_is_auto_save_enabled() {
            return;
        }
        if self.write_locked(state).is_success() {
            state.core.internal_set_pending_changes(false);
        } else {
            warn!(
                "'{}' still has pending changes after mark_as_changed",
                self.filename().unwrap_or_default()
            );
        }
    }

    fn initial_read(&self) -> Result<()> {
        let mut guard = self.lifecycle.write();
        let state = &mut *guard;

        let Some(filename) = self.filename() else {
            info!("No filename available; operating memory-only");
            state.core.internal_set_pending_changes(false);
            return Ok(());
        };

        let mut is_initialization = true;
        let outcome = self.read_document(state, &filename, &mut is_initialization);
        // The hook's result decides whether to write, not the flag.
        state.core.internal_set_pending_changes(false);

        let change = match outcome {
            Ok(change) => change,
            Err(source) => {
                return Err(self.binding.read_failure(Some(&filename), is_initialization, source));
            }
        };

        if change.is_changed() && self.write_locked(state).is_failure() {
            state.core.internal_set_pending_changes(true);
            warn!("'{}' has pending changes after initialization", filename);
            if self.binding.config.initial_write_failure == InitialWriteFailure::Abort {
                let err = PersistenceError::InitialWrite(filename.clone());
                let resource = self.binding.resolve(&filename);
                self.binding
                    .config
                    .handlers
                    .report_read(&err, is_initialization, Some(&resource));
                return Err(err);
            }
        }
        Ok(())
    }

    fn read_document(
        &self,
        state: &mut LockedState<S>,
        filename: &str,
        is_initialization: &mut bool,
    ) -> Result<Change> {
        debug!("Trying to read '{}'", filename);
        let input = self
            .binding
            .gateway
            .open_input(Some(filename))
            .map_err(|e| PersistenceError::io(filename, e))?;

        let Some(input) = input else {
            info!("Initializing '{}' for first time usage", filename);
            state.core.stats.record_init();
            return state.without_auto_save(|strategy| call_hook("on_init", || strategy.on_init()));
        };

        *is_initialization = false;
        let parsed = Document::from_reader(input);
        let doc = match parsed {
            Ok(doc) => doc,
            Err(e) => {
                error!("Failed to read document from '{}': {}", filename, e);
                return Ok(Change::Unchanged);
            }
        };
        state.core.stats.record_read();
        state.without_auto_save(|strategy| call_hook("on_read", || strategy.on_read(&doc)))
    }

    /// Writes the current state. Must be called with the write lock held.
    fn write_locked(&self, state: &mut LockedState<S>) -> Success {
        let Some(filename) = self.filename() else {
            error!("Cannot write: {}", PersistenceError::MemoryOnly);
            return Success::Failure;
        };
        let resource = self.binding.resolve(&filename);
        debug!("Trying to write {}", resource);

        let mut attempted = None;
        match self.write_document(state, &filename, &resource, &mut attempted) {
            Ok(Success::Success) => {
                state.core.stats.record_write();
                Success::Success
            }
            Ok(Success::Failure) => Success::Failure,
            Err(err) => {
                let attempted =
                    attempted.unwrap_or_else(|| format!("document for '{}'", filename));
                self.binding.write_failure(&resource, &err, &attempted);
                Success::Failure
            }
        }
    }

    fn write_document(
        &self,
        state: &mut LockedState<S>,
        filename: &str,
        resource: &Resource,
        attempted: &mut Option<String>,
    ) -> Result<Success> {
        let LockedState { core, value } = state;

        if core.last_filename.as_deref() != Some(filename) {
            let old = core.last_filename.replace(filename.to_string());
            call_hook("on_filename_change", || {
                value.on_filename_change(old.as_deref(), filename);
                Ok(())
            })?;
        }

        let mut doc = call_hook("create_write_data", || value.create_write_data())?;
        if doc.root().is_none() {
            return Err(PersistenceError::MissingWriteData(filename.to_string()));
        }
        call_hook("modify_write_data", || {
            value.modify_write_data(&mut doc);
            Ok(())
        })?;
        call_hook("before_write_to_file", || value.before_write_to_file(filename, resource))?;

        let json = doc.to_json()?;
        let json = attempted.insert(json);

        let sink = self
            .binding
            .gateway
            .open_output(filename)
            .map_err(|e| PersistenceError::io(filename, e))?;
        let Some(mut sink) = sink else {
            warn!("{} is not available for writing", resource);
            return Ok(Success::Failure);
        };
        sink.write_all(json.as_bytes())
            .map_err(|e| PersistenceError::io(filename, e))?;
        sink.commit().map_err(|e| PersistenceError::io(filename, e))?;
        Ok(Success::Success)
    }
}

impl<S: DocumentStrategy> Dao for DocumentDao<S> {
    type State = S;

    fn lifecycle(&self) -> &LifecycleCore<S> {
        &self.lifecycle
    }

    fn write_to_file_on_pending_changes(&self) -> Success {
        let mut state = self.lifecycle.write();
        if !state.core.internal_has_pending_changes() {
            return Success::Success;
        }
        let result = self.write_locked(&mut state);
        if result.is_success() {
            state.core.internal_set_pending_changes(false);
        } else {
            warn!(
                "'{}' still has pending changes after write_to_file_on_pending_changes",
                self.filename().unwrap_or_default()
            );
        }
        result
    }
}

impl<S> fmt::Debug for DocumentDao<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lifecycle.read();
        f.debug_struct("DocumentDao")
            .field("binding", &self.binding)
            .field("auto_save_enabled", &state.core.internal_is_auto_save_enabled())
            .field("pending_changes", &state.core.internal_has_pending_changes())
            .field("suppression_depth", &state.core.suppression_depth())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Element;
    use filedao_storage::MemoryGateway;

    #[derive(Default)]
    struct Settings {
        mode: String,
        renames: Vec<(Option<String>, String)>,
    }

    impl DocumentStrategy for Settings {
        fn on_init(&mut self) -> HookResult<Change> {
            self.mode = "default".to_string();
            Ok(Change::Changed)
        }

        fn on_read(&mut self, doc: &Document) -> HookResult<Change> {
            let root = doc.root().ok_or("missing root")?;
            self.mode = root.attribute("mode").unwrap_or_default().to_string();
            Ok(Change::Unchanged)
        }

        fn create_write_data(&self) -> HookResult<Document> {
            Ok(Document::with_root(
                Element::new("settings").with_attribute("mode", &self.mode),
            ))
        }

        fn on_filename_change(&mut self, old: Option<&str>, new: &str) {
            self.renames.push((old.map(str::to_string), new.to_string()));
        }
    }

    #[test]
    fn test_first_run_writes_initial_state() {
        let gateway = Arc::new(MemoryGateway::new());
        let dao = DocumentDao::new("settings.json", gateway.clone(), Settings::default()).unwrap();

        let doc = Document::from_json(&gateway.content("settings.json").unwrap()).unwrap();
        assert_eq!(doc.root().unwrap().attribute("mode"), Some("default"));
        assert!(doc.comments[0].starts_with("This file was generated automatically"));
        assert!(!dao.has_pending_changes());
        assert_eq!(dao.stats().init_count, 1);
        assert_eq!(dao.stats().write_count, 1);
    }

    #[test]
    fn test_existing_document_is_read_without_write() {
        let gateway = Arc::new(MemoryGateway::new());
        let doc = Document::with_root(Element::new("settings").with_attribute("mode", "fast"));
        gateway.insert("settings.json", doc.to_json().unwrap());

        let dao = DocumentDao::new("settings.json", gateway.clone(), Settings::default()).unwrap();

        assert_eq!(dao.read(|s| s.mode.clone()), "fast");
        assert_eq!(gateway.write_count(), 0);
        assert_eq!(dao.stats().read_count, 1);
    }

    #[test]
    fn test_unparsable_document_is_not_escalated() {
        let gateway = Arc::new(MemoryGateway::new());
        gateway.insert("settings.json", "<settings mode=\"fast\"/>");

        let dao = DocumentDao::new("settings.json", gateway.clone(), Settings::default()).unwrap();

        assert_eq!(dao.read(|s| s.mode.clone()), "");
        assert_eq!(dao.stats().read_count, 0);
        assert_eq!(gateway.write_count(), 0);
    }

    #[test]
    fn test_filename_change_notifies_once() {
        use std::sync::Mutex;

        let gateway = Arc::new(MemoryGateway::new());
        let name = Arc::new(Mutex::new("a.json".to_string()));
        let provider = {
            let name = Arc::clone(&name);
            crate::filename::filename_fn(move || Some(name.lock().unwrap().clone()))
        };
        let dao = DocumentDao::new(provider, gateway.clone(), Settings::default()).unwrap();
        assert!(dao.read(|s| s.renames.is_empty()));

        *name.lock().unwrap() = "b.json".to_string();
        dao.mark_as_changed();
        dao.mark_as_changed();

        let renames = dao.read(|s| s.renames.clone());
        assert_eq!(renames, vec![(Some("a.json".to_string()), "b.json".to_string())]);
        assert!(gateway.content("b.json").is_some());
    }

    #[test]
    fn test_locked_output_keeps_changes_pending() {
        let gateway = Arc::new(MemoryGateway::new());
        let dao = DocumentDao::new("settings.json", gateway.clone(), Settings::default()).unwrap();
        gateway.lock("settings.json");

        dao.modify(|s| {
            s.mode = "slow".to_string();
            Change::Changed
        });
        assert!(dao.has_pending_changes());

        gateway.unlock("settings.json");
        assert!(dao.write_to_file_on_pending_changes().is_success());
        assert!(!dao.has_pending_changes());
        assert!(gateway.content("settings.json").unwrap().contains("slow"));
    }

    #[test]
    fn test_memory_only_never_writes() {
        let gateway = Arc::new(MemoryGateway::new());
        let dao = DocumentDao::new(None::<String>, gateway.clone(), Settings::default()).unwrap();

        dao.mark_as_changed();

        assert!(dao.has_pending_changes());
        assert!(dao.write_to_file_on_pending_changes().is_failure());
        assert!(gateway.filenames().is_empty());
    }
}
