//! In-memory gateway.
//!
//! Keeps every logical file as a byte vector in a map. Besides serving as
//! storage for memory-only setups it can simulate failures (failing opens,
//! saves, renames or output sinks, and locked files) and counts operations, which
//! makes it the gateway of choice for exercising managed objects in tests.

use std::collections::BTreeMap;
use std::io::{self, Cursor, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::gateway::{Encoding, OutputSink, Resource, StorageGateway};

type Files = Arc<Mutex<BTreeMap<String, Vec<u8>>>>;

/// Operation counters of a [`MemoryGateway`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewayCounters {
    pub opens: usize,
    pub renames: usize,
    pub saves: usize,
    pub outputs: usize,
}

/// Gateway backed by an in-memory map.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    files: Files,
    locked: Mutex<Vec<String>>,
    fail_opens: AtomicBool,
    fail_saves: AtomicBool,
    fail_renames: AtomicBool,
    fail_outputs: AtomicBool,
    opens: AtomicUsize,
    renames: AtomicUsize,
    saves: AtomicUsize,
    outputs: Arc<AtomicUsize>,
}

impl MemoryGateway {
    /// Creates an empty gateway.
    pub fn new() -> Self {
        Self::default()
    }

    fn files(&self) -> MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores raw content under `filename`, bypassing counters and failure
    /// injection.
    pub fn insert(&self, filename: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.files().insert(filename.into(), content.into());
    }

    /// Removes `filename`.
    pub fn remove(&self, filename: &str) -> Option<Vec<u8>> {
        self.files().remove(filename)
    }

    /// Returns the content of `filename` decoded as UTF-8 (lossy).
    pub fn content(&self, filename: &str) -> Option<String> {
        self.files()
            .get(filename)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    /// Returns the raw bytes of `filename`.
    pub fn bytes(&self, filename: &str) -> Option<Vec<u8>> {
        self.files().get(filename).cloned()
    }

    /// Lists all stored filenames in sorted order.
    pub fn filenames(&self) -> Vec<String> {
        self.files().keys().cloned().collect()
    }

    /// Makes every subsequent `open_input` of a named file fail with an I/O
    /// error.
    pub fn set_fail_opens(&self, fail: bool) {
        self.fail_opens.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent `save_text` fail with an I/O error.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent `rename` fail with an I/O error.
    pub fn set_fail_renames(&self, fail: bool) {
        self.fail_renames.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent `open_output` fail with an I/O error.
    pub fn set_fail_outputs(&self, fail: bool) {
        self.fail_outputs.store(fail, Ordering::SeqCst);
    }

    /// Marks `filename` as held open by someone else: `open_output` reports
    /// it as unavailable until [`MemoryGateway::unlock`] is called.
    pub fn lock(&self, filename: impl Into<String>) {
        self.locked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(filename.into());
    }

    /// Releases a lock set with [`MemoryGateway::lock`].
    pub fn unlock(&self, filename: &str) {
        self.locked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|f| f != filename);
    }

    fn is_locked(&self, filename: &str) -> bool {
        self.locked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|f| f == filename)
    }

    /// Returns a snapshot of the operation counters.
    pub fn counters(&self) -> GatewayCounters {
        GatewayCounters {
            opens: self.opens.load(Ordering::SeqCst),
            renames: self.renames.load(Ordering::SeqCst),
            saves: self.saves.load(Ordering::SeqCst),
            outputs: self.outputs.load(Ordering::SeqCst),
        }
    }

    /// Number of successful saves plus committed output sinks.
    pub fn write_count(&self) -> usize {
        let counters = self.counters();
        counters.saves + counters.outputs
    }
}

fn injected(op: &str) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("injected {} failure", op))
}

impl StorageGateway for MemoryGateway {
    fn open_input(&self, filename: Option<&str>) -> io::Result<Option<Box<dyn Read + Send>>> {
        let Some(filename) = filename else {
            return Ok(None);
        };
        if self.fail_opens.load(Ordering::SeqCst) {
            return Err(injected("open"));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .files()
            .get(filename)
            .cloned()
            .map(|bytes| Box::new(Cursor::new(bytes)) as Box<dyn Read + Send>))
    }

    fn resolve(&self, filename: &str) -> Resource {
        Resource::logical(filename)
    }

    fn exists(&self, filename: &str) -> bool {
        self.files().contains_key(filename)
    }

    fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        if self.fail_renames.load(Ordering::SeqCst) {
            return Err(injected("rename"));
        }
        let mut files = self.files();
        if let Some(bytes) = files.remove(from) {
            files.insert(to.to_string(), bytes);
            self.renames.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn save_text(&self, filename: &str, content: &str, encoding: Encoding) -> io::Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(injected("save"));
        }
        let bytes = encoding.encode(content)?;
        self.files().insert(filename.to_string(), bytes);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn open_output(&self, filename: &str) -> io::Result<Option<Box<dyn OutputSink>>> {
        if self.fail_outputs.load(Ordering::SeqCst) {
            return Err(injected("output"));
        }
        if self.is_locked(filename) {
            return Ok(None);
        }
        Ok(Some(Box::new(MemorySink {
            files: Arc::clone(&self.files),
            filename: filename.to_string(),
            buffer: Vec::new(),
            commits: Arc::clone(&self.outputs),
        })))
    }
}

struct MemorySink {
    files: Files,
    filename: String,
    buffer: Vec<u8>,
    commits: Arc<AtomicUsize>,
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl OutputSink for MemorySink {
    fn commit(self: Box<Self>) -> io::Result<()> {
        let MemorySink {
            files,
            filename,
            buffer,
            commits,
        } = *self;
        files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(filename, buffer);
        commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_open() {
        let gateway = MemoryGateway::new();
        gateway.save_text("a.txt", "hello", Encoding::Utf8).unwrap();

        let mut input = gateway.open_input(Some("a.txt")).unwrap().unwrap();
        let mut s = String::new();
        input.read_to_string(&mut s).unwrap();

        assert_eq!(s, "hello");
        assert_eq!(gateway.counters().saves, 1);
    }

    #[test]
    fn test_rename_chain() {
        let gateway = MemoryGateway::new();
        gateway.insert("a", "live");
        gateway.insert("a.1", "old");

        gateway.rename("a.1", "a.2").unwrap();
        gateway.rename("a", "a.1").unwrap();
        gateway.rename("missing", "missing.1").unwrap();

        assert_eq!(gateway.filenames(), vec!["a.1", "a.2"]);
        assert_eq!(gateway.content("a.1").unwrap(), "live");
        assert_eq!(gateway.counters().renames, 2);
    }

    #[test]
    fn test_injected_save_failure() {
        let gateway = MemoryGateway::new();
        gateway.set_fail_saves(true);

        assert!(gateway.save_text("a", "x", Encoding::Utf8).is_err());
        assert!(!gateway.exists("a"));

        gateway.set_fail_saves(false);
        assert!(gateway.save_text("a", "x", Encoding::Utf8).is_ok());
    }

    #[test]
    fn test_injected_open_failure() {
        let gateway = MemoryGateway::new();
        gateway.insert("a.txt", "hello");
        gateway.set_fail_opens(true);

        let err = gateway.open_input(Some("a.txt")).err().unwrap();
        assert!(err.to_string().contains("injected open failure"));
        assert!(gateway.open_input(None).unwrap().is_none());
        assert_eq!(gateway.counters().opens, 0);

        gateway.set_fail_opens(false);
        assert!(gateway.open_input(Some("a.txt")).unwrap().is_some());
    }

    #[test]
    fn test_locked_output_is_unavailable() {
        let gateway = MemoryGateway::new();
        gateway.lock("doc.json");
        assert!(gateway.open_output("doc.json").unwrap().is_none());

        gateway.unlock("doc.json");
        let mut sink = gateway.open_output("doc.json").unwrap().unwrap();
        sink.write_all(b"{}").unwrap();
        sink.commit().unwrap();

        assert_eq!(gateway.content("doc.json").unwrap(), "{}");
        assert_eq!(gateway.counters().outputs, 1);
        assert_eq!(gateway.write_count(), 1);
    }
}
