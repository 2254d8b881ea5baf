//! Read/write exception handler registry.
//!
//! A registry holds at most one read handler and one write handler. Every
//! managed object reports to the registry in its [`crate::DaoConfig`]; by
//! default that is the process-wide instance, but tests and multi-tenant
//! hosts can hand each object its own registry.
//!
//! Reporting is best-effort: a handler that returns an error or panics is
//! logged and otherwise ignored, so it can never mask the original failure.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use filedao_storage::Resource;
use tracing::error;

use crate::error::{panic_message, HookResult, PersistenceError};

/// Called when reading or initializing a managed object fails.
pub trait ReadExceptionHandler: Send + Sync {
    fn on_read_exception(
        &self,
        error: &PersistenceError,
        is_initialization: bool,
        resource: Option<&Resource>,
    ) -> HookResult<()>;
}

impl<F> ReadExceptionHandler for F
where
    F: Fn(&PersistenceError, bool, Option<&Resource>) -> HookResult<()> + Send + Sync,
{
    fn on_read_exception(
        &self,
        error: &PersistenceError,
        is_initialization: bool,
        resource: Option<&Resource>,
    ) -> HookResult<()> {
        self(error, is_initialization, resource)
    }
}

/// Called when writing a managed object fails.
///
/// `attempted` is the content that was about to be written, or a description
/// of it when the content could not be produced.
pub trait WriteExceptionHandler: Send + Sync {
    fn on_write_exception(
        &self,
        error: &PersistenceError,
        resource: &Resource,
        attempted: &str,
    ) -> HookResult<()>;
}

impl<F> WriteExceptionHandler for F
where
    F: Fn(&PersistenceError, &Resource, &str) -> HookResult<()> + Send + Sync,
{
    fn on_write_exception(
        &self,
        error: &PersistenceError,
        resource: &Resource,
        attempted: &str,
    ) -> HookResult<()> {
        self(error, resource, attempted)
    }
}

#[derive(Default)]
struct Slots {
    read: Option<Arc<dyn ReadExceptionHandler>>,
    write: Option<Arc<dyn WriteExceptionHandler>>,
}

/// Registry of the read and write exception handlers.
#[derive(Default)]
pub struct ExceptionHandlers {
    slots: RwLock<Slots>,
}

impl ExceptionHandlers {
    /// Creates a registry with no handlers installed.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry used by managed objects unless configured
    /// otherwise.
    pub fn process_wide() -> Arc<ExceptionHandlers> {
        static GLOBAL: OnceLock<Arc<ExceptionHandlers>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(ExceptionHandlers::new())))
    }

    /// Installs (or with `None` removes) the read handler. Returns the
    /// previously installed handler.
    pub fn set_read_handler(
        &self,
        handler: Option<Arc<dyn ReadExceptionHandler>>,
    ) -> Option<Arc<dyn ReadExceptionHandler>> {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut slots.read, handler)
    }

    /// Returns the current read handler.
    pub fn read_handler(&self) -> Option<Arc<dyn ReadExceptionHandler>> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .read
            .clone()
    }

    /// Installs (or with `None` removes) the write handler. Returns the
    /// previously installed handler.
    pub fn set_write_handler(
        &self,
        handler: Option<Arc<dyn WriteExceptionHandler>>,
    ) -> Option<Arc<dyn WriteExceptionHandler>> {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut slots.write, handler)
    }

    /// Returns the current write handler.
    pub fn write_handler(&self) -> Option<Arc<dyn WriteExceptionHandler>> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .write
            .clone()
    }

    /// Installs `handler` as read handler until the returned guard is dropped,
    /// then restores whatever was installed before.
    pub fn scoped_read_handler(
        self: &Arc<Self>,
        handler: impl ReadExceptionHandler + 'static,
    ) -> HandlerGuard {
        let previous = self.set_read_handler(Some(Arc::new(handler)));
        HandlerGuard {
            registry: Arc::clone(self),
            previous: Previous::Read(previous),
        }
    }

    /// Installs `handler` as write handler until the returned guard is
    /// dropped, then restores whatever was installed before.
    pub fn scoped_write_handler(
        self: &Arc<Self>,
        handler: impl WriteExceptionHandler + 'static,
    ) -> HandlerGuard {
        let previous = self.set_write_handler(Some(Arc::new(handler)));
        HandlerGuard {
            registry: Arc::clone(self),
            previous: Previous::Write(previous),
        }
    }

    /// Hands a read failure to the read handler, if any.
    pub(crate) fn report_read(
        &self,
        error: &PersistenceError,
        is_initialization: bool,
        resource: Option<&Resource>,
    ) {
        let Some(handler) = self.read_handler() else {
            return;
        };
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            handler.on_read_exception(error, is_initialization, resource)
        }));
        let target = resource.map_or_else(|| "memory-only".to_string(), |r| r.to_string());
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Error in custom exception handler for reading {}: {}", target, e),
            Err(payload) => error!(
                "Custom exception handler for reading {} panicked: {}",
                target,
                panic_message(payload.as_ref())
            ),
        }
    }

    /// Hands a write failure to the write handler, if any.
    pub(crate) fn report_write(
        &self,
        error: &PersistenceError,
        resource: &Resource,
        attempted: &str,
    ) {
        let Some(handler) = self.write_handler() else {
            return;
        };
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            handler.on_write_exception(error, resource, attempted)
        }));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(
                "Error in custom exception handler for writing {}: {}",
                resource, e
            ),
            Err(payload) => error!(
                "Custom exception handler for writing {} panicked: {}",
                resource,
                panic_message(payload.as_ref())
            ),
        }
    }
}

impl fmt::Debug for ExceptionHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("ExceptionHandlers")
            .field("read", &slots.read.is_some())
            .field("write", &slots.write.is_some())
            .finish()
    }
}

enum Previous {
    Read(Option<Arc<dyn ReadExceptionHandler>>),
    Write(Option<Arc<dyn WriteExceptionHandler>>),
}

/// Restores the previously installed handler on drop.
#[must_use = "the handler is removed again as soon as the guard is dropped"]
pub struct HandlerGuard {
    registry: Arc<ExceptionHandlers>,
    previous: Previous,
}

impl Drop for HandlerGuard {
    fn drop(&mut self) {
        match std::mem::replace(&mut self.previous, Previous::Read(None)) {
            Previous::Read(previous) => {
                self.registry.set_read_handler(previous);
            }
            Previous::Write(previous) => {
                self.registry.set_write_handler(previous);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_read(counter: &Arc<AtomicUsize>) -> impl ReadExceptionHandler + 'static {
        let counter = Arc::clone(counter);
        move |_: &PersistenceError, _: bool, _: Option<&Resource>| -> HookResult<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_last_writer_wins_and_none_clears() {
        let registry = ExceptionHandlers::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        registry.set_read_handler(Some(Arc::new(counting_read(&first))));
        registry.set_read_handler(Some(Arc::new(counting_read(&second))));
        registry.report_read(&PersistenceError::MemoryOnly, true, None);

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);

        registry.set_read_handler(None);
        assert!(registry.read_handler().is_none());
        registry.report_read(&PersistenceError::MemoryOnly, true, None);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_scoped_handler_restores_previous() {
        let registry = Arc::new(ExceptionHandlers::new());
        let outer = Arc::new(AtomicUsize::new(0));
        let inner = Arc::new(AtomicUsize::new(0));
        registry.set_read_handler(Some(Arc::new(counting_read(&outer))));

        {
            let _guard = registry.scoped_read_handler(counting_read(&inner));
            registry.report_read(&PersistenceError::MemoryOnly, false, None);
        }
        registry.report_read(&PersistenceError::MemoryOnly, false, None);

        assert_eq!(inner.load(Ordering::SeqCst), 1);
        assert_eq!(outer.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failing_and_panicking_handlers_are_contained() {
        let registry = Arc::new(ExceptionHandlers::new());
        let resource = Resource::logical("a.txt");

        let _w = registry.scoped_write_handler(
            |_: &PersistenceError, _: &Resource, _: &str| -> HookResult<()> {
                Err("handler failed".into())
            },
        );
        registry.report_write(&PersistenceError::MemoryOnly, &resource, "content");

        let _r = registry.scoped_read_handler(
            |_: &PersistenceError, _: bool, _: Option<&Resource>| -> HookResult<()> {
                panic!("handler panicked")
            },
        );
        registry.report_read(&PersistenceError::MemoryOnly, true, Some(&resource));
    }

    #[test]
    fn test_process_wide_is_shared() {
        let a = ExceptionHandlers::process_wide();
        let b = ExceptionHandlers::process_wide();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_debug_shows_installed_slots() {
        let registry = ExceptionHandlers::new();
        assert_eq!(
            format!("{:?}", registry),
            "ExceptionHandlers { read: false, write: false }"
        );
    }
}
