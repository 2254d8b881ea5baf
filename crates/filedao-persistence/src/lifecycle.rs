//! Locking and auto-save bookkeeping shared by all managed objects.
//!
//! Every managed object owns one [`LifecycleCore`]: a reader-writer lock
//! around its [`Bookkeeping`] and the strategy holding the application state.
//! Readers (pending-change and auto-save queries, statistics, `read`
//! closures) share the lock; anything that may write takes it exclusively.
//!
//! Auto-save can be suppressed in nested scopes. Each `begin` pushes the
//! current state on a stack and each `end` pops it, so an inner scope
//! restores exactly what was in effect before it started, even inside an
//! outer scope.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::state::{Change, Success};

/// Auto-save is enabled unless configured otherwise.
pub const DEFAULT_AUTO_SAVE_ENABLED: bool = true;

/// Counters and timestamps of the init/read/write cycles of a managed object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DaoStats {
    /// How often the first-time initialization hook ran.
    pub init_count: u64,
    pub last_init_at: Option<DateTime<Utc>>,
    /// How often existing content was handed to the read hook.
    pub read_count: u64,
    pub last_read_at: Option<DateTime<Utc>>,
    /// Number of successful writes.
    pub write_count: u64,
    pub last_write_at: Option<DateTime<Utc>>,
}

impl DaoStats {
    pub(crate) fn record_init(&mut self) {
        self.init_count += 1;
        self.last_init_at = Some(Utc::now());
    }

    pub(crate) fn record_read(&mut self) {
        self.read_count += 1;
        self.last_read_at = Some(Utc::now());
    }

    pub(crate) fn record_write(&mut self) {
        self.write_count += 1;
        self.last_write_at = Some(Utc::now());
    }
}

/// Auto-save and pending-change state of a managed object.
///
/// Only reachable through a lock guard of the owning [`LifecycleCore`], so
/// the `internal_*` accessors can assume the caller holds the lock.
#[derive(Debug)]
pub struct Bookkeeping {
    auto_save_enabled: bool,
    auto_save_stack: Vec<bool>,
    pending_changes: bool,
    pub(crate) last_filename: Option<String>,
    pub(crate) stats: DaoStats,
}

impl Bookkeeping {
    fn new(auto_save_enabled: bool, last_filename: Option<String>) -> Self {
        Self {
            auto_save_enabled,
            auto_save_stack: Vec::new(),
            pending_changes: false,
            last_filename,
            stats: DaoStats::default(),
        }
    }

    pub fn internal_is_auto_save_enabled(&self) -> bool {
        self.auto_save_enabled
    }

    pub fn internal_has_pending_changes(&self) -> bool {
        self.pending_changes
    }

    pub fn internal_set_pending_changes(&mut self, pending_changes: bool) {
        self.pending_changes = pending_changes;
    }

    /// Number of currently open suppression scopes.
    pub fn suppression_depth(&self) -> usize {
        self.auto_save_stack.len()
    }

    /// The filename of the last write (or the construction-time filename).
    pub fn last_filename(&self) -> Option<&str> {
        self.last_filename.as_deref()
    }

    pub(crate) fn push_without_auto_save(&mut self) {
        self.auto_save_stack.push(self.auto_save_enabled);
        self.auto_save_enabled = false;
    }

    /// Restores the state saved by the matching push. Returns the restored
    /// state, or `None` if there was no matching push.
    pub(crate) fn pop_without_auto_save(&mut self) -> Option<bool> {
        let previous = self.auto_save_stack.pop()?;
        self.auto_save_enabled = previous;
        Some(previous)
    }
}

/// Lock-protected state of a managed object.
#[derive(Debug)]
pub struct LockedState<T> {
    pub core: Bookkeeping,
    pub value: T,
}

impl<T> LockedState<T> {
    /// Runs `f` on the value with auto-save suppressed for its duration.
    ///
    /// `f` must not unwind; hooks are run through a panic-catching wrapper
    /// before they get here.
    pub(crate) fn without_auto_save<R>(&mut self, f: impl FnOnce(&mut T) -> R) -> R {
        self.core.push_without_auto_save();
        let result = f(&mut self.value);
        self.core.pop_without_auto_save();
        result
    }
}

/// The reader-writer lock of one managed object.
#[derive(Debug)]
pub struct LifecycleCore<T> {
    lock: RwLock<LockedState<T>>,
}

impl<T> LifecycleCore<T> {
    pub fn new(value: T, auto_save_enabled: bool, last_filename: Option<String>) -> Self {
        Self {
            lock: RwLock::new(LockedState {
                core: Bookkeeping::new(auto_save_enabled, last_filename),
                value,
            }),
        }
    }

    /// Acquires the read lock.
    ///
    /// A poisoned lock is recovered: hooks run behind a panic-catching
    /// wrapper, so the bookkeeping is consistent even if a thread died.
    pub fn read(&self) -> RwLockReadGuard<'_, LockedState<T>> {
        self.lock.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Acquires the write lock.
    pub fn write(&self) -> RwLockWriteGuard<'_, LockedState<T>> {
        self.lock.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Exclusive access without locking, for construction time.
    pub fn get_mut(&mut self) -> &mut LockedState<T> {
        self.lock.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_auto_save_enabled(&self) -> bool {
        self.read().core.auto_save_enabled
    }

    pub fn has_pending_changes(&self) -> bool {
        self.read().core.pending_changes
    }

    /// Enables or disables auto-save. Never triggers a write.
    pub fn set_auto_save_enabled(&self, enabled: bool) -> Change {
        let mut state = self.write();
        if state.core.auto_save_enabled == enabled {
            return Change::Unchanged;
        }
        state.core.auto_save_enabled = enabled;
        Change::Changed
    }

    pub fn stats(&self) -> DaoStats {
        self.read().core.stats.clone()
    }

    pub fn begin_without_auto_save(&self) {
        self.write().core.push_without_auto_save();
    }

    /// Closes the innermost suppression scope and returns the restored
    /// auto-save state.
    ///
    /// # Panics
    /// Panics if there is no matching [`LifecycleCore::begin_without_auto_save`].
    pub fn end_without_auto_save(&self) -> bool {
        let restored = self.write().core.pop_without_auto_save();
        match restored {
            Some(enabled) => enabled,
            None => panic!("end_without_auto_save called without matching begin_without_auto_save"),
        }
    }
}

/// Operations every managed object offers on top of its [`LifecycleCore`].
pub trait Dao {
    /// The strategy type holding the application state.
    type State;

    fn lifecycle(&self) -> &LifecycleCore<Self::State>;

    /// Writes the current state if there are pending changes. Succeeds
    /// trivially when nothing is pending.
    fn write_to_file_on_pending_changes(&self) -> Success;

    fn is_auto_save_enabled(&self) -> bool {
        self.lifecycle().is_auto_save_enabled()
    }

    fn has_pending_changes(&self) -> bool {
        self.lifecycle().has_pending_changes()
    }

    /// Enables or disables auto-save without writing anything.
    fn set_auto_save_enabled(&self, enabled: bool) -> Change {
        self.lifecycle().set_auto_save_enabled(enabled)
    }

    fn stats(&self) -> DaoStats {
        self.lifecycle().stats()
    }

    /// Opens a scope in which auto-save is disabled. Must be paired with
    /// [`Dao::end_without_auto_save`].
    fn begin_without_auto_save(&self) {
        self.lifecycle().begin_without_auto_save();
    }

    /// Closes the innermost scope. If that re-enables auto-save, pending
    /// changes are written. The write lock is released before writing.
    fn end_without_auto_save(&self) {
        if self.lifecycle().end_without_auto_save() {
            self.write_to_file_on_pending_changes();
        }
    }

    /// Suppresses auto-save until the returned guard is dropped.
    fn suspend_auto_save(&self) -> AutoSaveSuspension<'_, Self>
    where
        Self: Sized,
    {
        self.begin_without_auto_save();
        AutoSaveSuspension { dao: self }
    }

    /// Runs `op` with auto-save suppressed. The scope is closed even if `op`
    /// panics.
    fn perform_without_auto_save<R>(&self, op: impl FnOnce() -> R) -> R
    where
        Self: Sized,
    {
        let _suspension = self.suspend_auto_save();
        op()
    }
}

/// Guard returned by [`Dao::suspend_auto_save`].
#[must_use = "auto-save is restored as soon as the guard is dropped"]
pub struct AutoSaveSuspension<'a, D: Dao> {
    dao: &'a D,
}

impl<D: Dao> Drop for AutoSaveSuspension<'_, D> {
    fn drop(&mut self) {
        self.dao.end_without_auto_save();
    }
}
