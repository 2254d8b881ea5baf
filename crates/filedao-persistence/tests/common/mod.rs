//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use filedao_persistence::{
    Change, DataProvider, Document, DocumentStrategy, Element, ExceptionHandlers, HookResult,
    PersistenceError, Resource,
};

/// Text content held as a single string.
#[derive(Debug, Default, Clone, PartialEq, Hash)]
pub struct Text {
    pub value: String,
    pub init_result: Change,
}

impl Text {
    pub fn with_init(init_result: Change, value: &str) -> Self {
        Self {
            value: value.to_string(),
            init_result,
        }
    }
}

impl DataProvider for Text {
    fn init_for_first_time_usage(&mut self) -> HookResult<Change> {
        Ok(self.init_result)
    }

    fn read_from_stream(&mut self, input: &mut dyn Read) -> HookResult<Change> {
        self.value.clear();
        input.read_to_string(&mut self.value)?;
        Ok(Change::Unchanged)
    }

    fn fill_buffer_for_saving(&self, buffer: &mut String) -> HookResult<()> {
        buffer.push_str(&self.value);
        Ok(())
    }
}

/// Key/value settings stored as a document, counting hook calls.
#[derive(Debug, Default)]
pub struct Settings {
    pub entries: Vec<(String, String)>,
    pub init_calls: usize,
    pub read_results: Vec<Change>,
    pub init_result: Change,
}

impl Settings {
    pub fn set(&mut self, key: &str, value: &str) -> Change {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) if v == value => Change::Unchanged,
            Some((_, v)) => {
                *v = value.to_string();
                Change::Changed
            }
            None => {
                self.entries.push((key.to_string(), value.to_string()));
                Change::Changed
            }
        }
    }
}

impl DocumentStrategy for Settings {
    fn on_init(&mut self) -> HookResult<Change> {
        self.init_calls += 1;
        if self.init_result.is_changed() {
            self.set("created", "yes");
        }
        Ok(self.init_result)
    }

    fn on_read(&mut self, doc: &Document) -> HookResult<Change> {
        let root = doc.root().ok_or("document has no root")?;
        self.entries.clear();
        for entry in root.children_named("entry") {
            let key = entry.attribute("key").ok_or("entry without key")?;
            self.entries.push((key.to_string(), entry.text()));
        }
        // Documents written before version 2 are rewritten in the current layout.
        let change = Change::from(root.attribute_as::<u32>("version").unwrap_or(1) < 2);
        self.read_results.push(change);
        Ok(change)
    }

    fn create_write_data(&self) -> HookResult<Document> {
        let mut root = Element::new("settings").with_attribute("version", 2);
        for (key, value) in &self.entries {
            root.append_element(Element::new("entry").with_attribute("key", key))
                .append_text(value.clone());
        }
        Ok(Document::with_root(root))
    }
}

/// Write failures seen by a handler.
#[derive(Debug, Default)]
pub struct WriteLog {
    pub calls: AtomicUsize,
    pub messages: Mutex<Vec<String>>,
    pub attempted: Mutex<Vec<String>>,
}

/// Installs a recording write handler on a fresh registry.
pub fn recording_write_handler(registry: &Arc<ExceptionHandlers>) -> Arc<WriteLog> {
    let log = Arc::new(WriteLog::default());
    let sink = Arc::clone(&log);
    registry.set_write_handler(Some(Arc::new(
        move |err: &PersistenceError, _: &Resource, attempted: &str| -> HookResult<()> {
            sink.calls.fetch_add(1, Ordering::SeqCst);
            sink.messages.lock().unwrap().push(err.to_string());
            sink.attempted.lock().unwrap().push(attempted.to_string());
            Ok(())
        },
    )));
    log
}

/// Installs a read handler counting its calls.
pub fn counting_read_handler(registry: &Arc<ExceptionHandlers>) -> Arc<AtomicUsize> {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    registry.set_read_handler(Some(Arc::new(
        move |_: &PersistenceError, _: bool, _: Option<&Resource>| -> HookResult<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
    )));
    calls
}
