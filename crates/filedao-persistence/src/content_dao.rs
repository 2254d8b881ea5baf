//! Managed objects persisted as opaque text with backup generations.
//!
//! A [`ContentDao`] asks its [`DataProvider`] for the complete file content on
//! every write. Before the live file is overwritten, the previous generations
//! are shifted back (`name` → `name.1` → `name.2` …), keeping at most
//! [`DaoConfig::backup_count`] backups.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::io::Read;
use std::sync::Arc;

use filedao_storage::{Encoding, StorageGateway};
use tracing::{debug, error, info, warn};

use crate::backup::rotate_backups;
use crate::binding::Binding;
use crate::config::{DaoConfig, InitialWriteFailure};
use crate::error::{call_hook, HookResult, PersistenceError, Result};
use crate::filename::FilenameProvider;
use crate::lifecycle::{Dao, LifecycleCore, LockedState};
use crate::state::{Change, Success};

/// Hooks of a content-backed managed object.
pub trait DataProvider {
    /// Called when there is no file yet.
    fn init_for_first_time_usage(&mut self) -> HookResult<Change> {
        Ok(Change::Unchanged)
    }

    /// Fills the state from the stored content.
    fn read_from_stream(&mut self, input: &mut dyn Read) -> HookResult<Change>;

    /// Appends the content to write to `buffer`.
    fn fill_buffer_for_saving(&self, buffer: &mut String) -> HookResult<()>;

    /// Content that fails this check is never written. Rejects blank content
    /// by default.
    fn is_content_valid_for_saving(&self, content: &str) -> bool {
        !content.trim().is_empty()
    }

    fn encoding(&self) -> Encoding {
        Encoding::Utf8
    }

    fn on_filename_change(&mut self, _old: Option<&str>, _new: &str) {}
}

/// A managed object persisted as text with rotating backups.
pub struct ContentDao<P> {
    lifecycle: LifecycleCore<P>,
    binding: Binding,
}

impl<P: DataProvider> ContentDao<P> {
    pub fn new(
        filename_provider: impl FilenameProvider + 'static,
        gateway: Arc<dyn StorageGateway>,
        provider: P,
    ) -> Result<Self> {
        Self::with_config(filename_provider, gateway, provider, DaoConfig::default())
    }

    /// Creates the object and reads the existing content, or initializes it
    /// for first time usage.
    pub fn with_config(
        filename_provider: impl FilenameProvider + 'static,
        gateway: Arc<dyn StorageGateway>,
        provider: P,
        config: DaoConfig,
    ) -> Result<Self> {
        config.validate()?;
        let filename = filename_provider.filename();
        let mut dao = Self {
            lifecycle: LifecycleCore::new(provider, config.auto_save_enabled, filename),
            binding: Binding::new(Box::new(filename_provider), gateway, config),
        };
        dao.read_from_file()?;
        Ok(dao)
    }

    pub fn filename(&self) -> Option<String> {
        self.binding.filename()
    }

    pub fn config(&self) -> &DaoConfig {
        &self.binding.config
    }

    pub fn backup_count(&self) -> usize {
        self.binding.config.backup_count
    }

    pub fn read<R>(&self, op: impl FnOnce(&P) -> R) -> R {
        op(&self.lifecycle.read().value)
    }

    /// Write-locked mutation; `Changed` marks the object as changed.
    pub fn modify(&self, op: impl FnOnce(&mut P) -> Change) -> Change {
        let mut state = self.lifecycle.write();
        let change = op(&mut state.value);
        if change.is_changed() {
            mark_changed(&self.binding, &mut state);
        }
        change
    }

    pub fn mark_as_changed(&self) {
        let mut state = self.lifecycle.write();
        mark_changed(&self.binding, &mut state);
    }

    // Runs before the object is shared, so no lock is taken.
    fn read_from_file(&mut self) -> Result<()> {
        let Self { lifecycle, binding } = self;
        let state = lifecycle.get_mut();

        let filename = binding.filename();
        let name = filename.as_deref();
        let input = binding.gateway.open_input(name).map_err(|e| {
            let source = PersistenceError::io(name.unwrap_or_default(), e);
            binding.read_failure(name, true, source)
        })?;

        let is_initialization = input.is_none();
        let outcome = match (input, name) {
            (None, None) => {
                info!("No filename available; operating memory-only");
                state.core.internal_set_pending_changes(false);
                return Ok(());
            }
            (None, Some(name)) => {
                info!("Initializing '{}' for first time usage", name);
                state.core.stats.record_init();
                state.without_auto_save(|provider| {
                    call_hook("init_for_first_time_usage", || provider.init_for_first_time_usage())
                })
            }
            (Some(mut input), name) => {
                debug!("Reading '{}'", name.unwrap_or("<memory-only>"));
                state.core.stats.record_read();
                // The stream is dropped at the end of this arm.
                state.without_auto_save(|provider| {
                    call_hook("read_from_stream", || provider.read_from_stream(&mut input))
                })
            }
        };
        // The hook's result decides whether to write, not the flag.
        state.core.internal_set_pending_changes(false);

        let change =
            outcome.map_err(|source| binding.read_failure(name, is_initialization, source))?;

        if change.is_changed() && write_to_file(binding, state).is_failure() {
            state.core.internal_set_pending_changes(true);
            let display_name = name.unwrap_or_default();
            warn!("'{}' has pending changes after initialization", display_name);
            if binding.config.initial_write_failure == InitialWriteFailure::Abort {
                let err = PersistenceError::InitialWrite(display_name.to_string());
                let resource = name.map(|n| binding.resolve(n));
                binding
                    .config
                    .handlers
                    .report_read(&err, is_initialization, resource.as_ref());
                return Err(err);
            }
        }
        Ok(())
    }
}

fn mark_changed<P: DataProvider>(binding: &Binding, state: &mut LockedState<P>) {
    state.core.internal_set_pending_changes(true);
    if !state.core.internal_is_auto_save_enabled() {
        return;
    }
    if write_to_file(binding, state).is_success() {
        state.core.internal_set_pending_changes(false);
    } else {
        warn!(
            "'{}' still has pending changes after mark_as_changed",
            binding.filename().unwrap_or_default()
        );
    }
}

fn write_to_file<P: DataProvider>(binding: &Binding, state: &mut LockedState<P>) -> Success {
    let Some(filename) = binding.filename() else {
        error!("Cannot write: {}", PersistenceError::MemoryOnly);
        return Success::Failure;
    };
    let resource = binding.resolve(&filename);

    let mut content = None;
    match write_content(binding, state, &filename, &mut content) {
        Ok(()) => {
            state.core.stats.record_write();
            Success::Success
        }
        Err(err) => {
            let attempted = content.unwrap_or_else(|| format!("content for '{}'", filename));
            binding.write_failure(&resource, &err, &attempted);
            Success::Failure
        }
    }
}

fn write_content<P: DataProvider>(
    binding: &Binding,
    state: &mut LockedState<P>,
    filename: &str,
    content: &mut Option<String>,
) -> Result<()> {
    let LockedState { core, value } = state;

    if core.last_filename.as_deref() != Some(filename) {
        let old = core.last_filename.replace(filename.to_string());
        call_hook("on_filename_change", || {
            value.on_filename_change(old.as_deref(), filename);
            Ok(())
        })?;
    }

    let buffer = content.insert(String::new());
    call_hook("fill_buffer_for_saving", || value.fill_buffer_for_saving(buffer))?;

    let valid = call_hook("is_content_valid_for_saving", || {
        Ok(value.is_content_valid_for_saving(buffer))
    })?;
    if !valid {
        warn!("Content for '{}' is not valid for saving: {:?}", filename, buffer);
        return Err(PersistenceError::InvalidContent(filename.to_string()));
    }

    let backup_count = binding.config.backup_count;
    debug!("Rotating {} backups of '{}'", backup_count, filename);
    rotate_backups(binding.gateway.as_ref(), filename, backup_count)
        .map_err(|e| PersistenceError::io(filename, e))?;

    let encoding = value.encoding();
    binding
        .gateway
        .save_text(filename, buffer, encoding)
        .map_err(|e| PersistenceError::io(filename, e))
}

impl<P: DataProvider> Dao for ContentDao<P> {
    type State = P;

    fn lifecycle(&self) -> &LifecycleCore<P> {
        &self.lifecycle
    }

    fn write_to_file_on_pending_changes(&self) -> Success {
        let mut state = self.lifecycle.write();
        if !state.core.internal_has_pending_changes() {
            return Success::Success;
        }
        let result = write_to_file(&self.binding, &mut state);
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

impl<P: PartialEq> PartialEq for ContentDao<P> {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        self.binding.filename() == other.binding.filename()
            && self.binding.config.backup_count == other.binding.config.backup_count
            && self.lifecycle.read().value == other.lifecycle.read().value
    }
}

impl<P: Hash> Hash for ContentDao<P> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.binding.filename().hash(state);
        self.binding.config.backup_count.hash(state);
        self.lifecycle.read().value.hash(state);
    }
}

impl<P> fmt::Debug for ContentDao<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lifecycle.read();
        f.debug_struct("ContentDao")
            .field("binding", &self.binding)
            .field("auto_save_enabled", &state.core.internal_is_auto_save_enabled())
            .field("pending_changes", &state.core.internal_has_pending_changes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filedao_storage::MemoryGateway;
    use std::collections::hash_map::DefaultHasher;

    #[derive(Debug, Default, PartialEq, Hash)]
    struct Lines(Vec<String>);

    impl DataProvider for Lines {
        fn read_from_stream(&mut self, input: &mut dyn Read) -> HookResult<Change> {
            let mut text = String::new();
            input.read_to_string(&mut text)?;
            self.0 = text.lines().map(str::to_string).collect();
            Ok(Change::Unchanged)
        }

        fn fill_buffer_for_saving(&self, buffer: &mut String) -> HookResult<()> {
            for line in &self.0 {
                buffer.push_str(line);
                buffer.push('\n');
            }
            Ok(())
        }
    }

    fn push(dao: &ContentDao<Lines>, line: &str) {
        dao.modify(|lines| {
            lines.0.push(line.to_string());
            Change::Changed
        });
    }

    #[test]
    fn test_reads_existing_content() {
        let gateway = Arc::new(MemoryGateway::new());
        gateway.insert("lines.txt", "a\nb\n");

        let dao = ContentDao::new("lines.txt", gateway.clone(), Lines::default()).unwrap();

        assert_eq!(dao.read(|l| l.0.clone()), vec!["a", "b"]);
        assert_eq!(dao.stats().read_count, 1);
        assert_eq!(gateway.write_count(), 0);
    }

    #[test]
    fn test_write_rotates_backups() {
        let gateway = Arc::new(MemoryGateway::new());
        let config = DaoConfig::new().with_backup_count(2);
        let dao = ContentDao::with_config("lines.txt", gateway.clone(), Lines::default(), config)
            .unwrap();

        push(&dao, "one");
        push(&dao, "two");
        push(&dao, "three");

        assert_eq!(gateway.content("lines.txt").unwrap(), "one\ntwo\nthree\n");
        assert_eq!(gateway.content("lines.txt.1").unwrap(), "one\ntwo\n");
        assert_eq!(gateway.content("lines.txt.2").unwrap(), "one\n");
        assert!(gateway.content("lines.txt.3").is_none());
        assert_eq!(dao.stats().write_count, 3);
    }

    #[test]
    fn test_invalid_content_is_not_written() {
        let gateway = Arc::new(MemoryGateway::new());
        let dao = ContentDao::new("lines.txt", gateway.clone(), Lines::default()).unwrap();

        dao.modify(|_| Change::Changed);

        assert!(dao.has_pending_changes());
        assert_eq!(gateway.write_count(), 0);
        assert!(gateway.filenames().is_empty());
    }

    #[test]
    fn test_equality_and_hash() {
        let gateway: Arc<dyn StorageGateway> = Arc::new(MemoryGateway::new());
        let a = ContentDao::new("x.txt", gateway.clone(), Lines::default()).unwrap();
        let b = ContentDao::new("x.txt", gateway.clone(), Lines::default()).unwrap();
        let c = ContentDao::new("y.txt", gateway.clone(), Lines::default()).unwrap();

        assert_eq!(a, a);
        assert_eq!(a, b);
        assert_ne!(a, c);

        let hash = |dao: &ContentDao<Lines>| {
            let mut hasher = DefaultHasher::new();
            dao.hash(&mut hasher);
            hasher.finish()
        };
        assert_eq!(hash(&a), hash(&b));
    }
}
