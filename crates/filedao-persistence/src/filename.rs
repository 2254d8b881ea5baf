//! Filename providers.
//!
//! A managed object asks its provider for the logical filename every time it
//! reads or writes, so the name may change over the object's lifetime (for
//! example a per-day file). `None` means the object is memory-only.

use std::fmt;

/// Supplies the logical filename of a managed object.
pub trait FilenameProvider: Send + Sync {
    /// The current logical filename, or `None` for memory-only operation.
    fn filename(&self) -> Option<String>;
}

impl FilenameProvider for String {
    fn filename(&self) -> Option<String> {
        Some(self.clone())
    }
}

impl FilenameProvider for &'static str {
    fn filename(&self) -> Option<String> {
        Some((*self).to_string())
    }
}

impl FilenameProvider for Option<String> {
    fn filename(&self) -> Option<String> {
        self.clone()
    }
}

/// Provider computing the filename with a closure.
pub struct FnFilename<F>(F);

impl<F> FilenameProvider for FnFilename<F>
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn filename(&self) -> Option<String> {
        (self.0)()
    }
}

impl<F> fmt::Debug for FnFilename<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnFilename")
    }
}

/// Wraps a closure as a [`FilenameProvider`].
///
/// ```
/// use filedao_persistence::{filename_fn, FilenameProvider};
///
/// let provider = filename_fn(|| Some(format!("audit-{}.log", 2024)));
/// assert_eq!(provider.filename().as_deref(), Some("audit-2024.log"));
/// ```
pub fn filename_fn<F>(f: F) -> FnFilename<F>
where
    F: Fn() -> Option<String> + Send + Sync,
{
    FnFilename(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_static_providers() {
        assert_eq!("a.json".filename().as_deref(), Some("a.json"));
        assert_eq!(String::from("b.json").filename().as_deref(), Some("b.json"));
        assert_eq!(None::<String>.filename(), None);
    }

    #[test]
    fn test_fn_provider_is_evaluated_each_time() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        let provider = filename_fn(move || {
            let n = c.fetch_add(1, Ordering::SeqCst);
            Some(format!("file-{}.txt", n))
        });

        assert_eq!(provider.filename().as_deref(), Some("file-0.txt"));
        assert_eq!(provider.filename().as_deref(), Some("file-1.txt"));
    }
}
