//! Local filesystem gateway.
//!
//! Logical filenames are resolved relative to a base directory. All writes
//! are atomic: content goes to a temporary file in the target directory which
//! is then renamed over the target, so a live file is never partially
//! written, even if the process crashes mid-write.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::gateway::{Encoding, OutputSink, Resource, StorageGateway};

/// Gateway storing each logical filename as a file below `base_dir`.
#[derive(Debug, Clone)]
pub struct FileSystemGateway {
    base_dir: PathBuf,
}

impl FileSystemGateway {
    /// Creates a gateway rooted at `base_dir`.
    ///
    /// The directory is created lazily on the first write.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Returns the base directory.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Returns the local path for a logical filename.
    pub fn path_of(&self, filename: &str) -> PathBuf {
        self.base_dir.join(filename)
    }
}

impl StorageGateway for FileSystemGateway {
    fn open_input(&self, filename: Option<&str>) -> io::Result<Option<Box<dyn Read + Send>>> {
        let Some(filename) = filename else {
            return Ok(None);
        };
        let path = self.path_of(filename);
        if !path.exists() {
            debug!("{} does not exist", path.display());
            return Ok(None);
        }
        if !path.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is a directory and not a file", path.display()),
            ));
        }
        let file = fs::File::open(&path)?;
        Ok(Some(Box::new(io::BufReader::new(file))))
    }

    fn resolve(&self, filename: &str) -> Resource {
        Resource::local(filename, self.path_of(filename))
    }

    fn exists(&self, filename: &str) -> bool {
        self.path_of(filename).is_file()
    }

    fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        let source = self.path_of(from);
        if !source.exists() {
            return Ok(());
        }
        let target = self.path_of(to);
        ensure_parent_dir(&target)?;
        if target.exists() {
            fs::remove_file(&target)?;
        }
        debug!("Renaming {} to {}", source.display(), target.display());
        fs::rename(&source, &target)
    }

    fn save_text(&self, filename: &str, content: &str, encoding: Encoding) -> io::Result<()> {
        let bytes = encoding.encode(content)?;
        atomic_write(&self.path_of(filename), &bytes)
    }

    fn open_output(&self, filename: &str) -> io::Result<Option<Box<dyn OutputSink>>> {
        let target = self.path_of(filename);
        if let Ok(meta) = fs::metadata(&target) {
            if meta.permissions().readonly() {
                warn!("{} is read-only and cannot be written", target.display());
                return Ok(None);
            }
        }
        ensure_parent_dir(&target)?;
        let dir = target.parent().unwrap_or(Path::new("."));
        let temp = NamedTempFile::new_in(dir)?;
        Ok(Some(Box::new(AtomicFileSink { temp, target })))
    }
}

/// Sink that writes to a temporary file and renames it over the target on
/// commit.
struct AtomicFileSink {
    temp: NamedTempFile,
    target: PathBuf,
}

impl Write for AtomicFileSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.temp.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.temp.flush()
    }
}

impl OutputSink for AtomicFileSink {
    fn commit(self: Box<Self>) -> io::Result<()> {
        let AtomicFileSink { mut temp, target } = *self;
        temp.flush()?;
        temp.as_file().sync_all()?;
        temp.persist(&target).map_err(|e| e.error)?;
        Ok(())
    }
}

fn ensure_parent_dir(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Writes data to a file atomically.
///
/// The data is written to a temporary file in the same directory (so the
/// final rename stays on one filesystem), synced, then renamed to `path`.
/// Missing parent directories are created.
///
/// # Errors
/// Returns an error if creating the directory, writing or renaming fails.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    ensure_parent_dir(path)?;

    let dir = path.parent().unwrap_or(Path::new("."));
    let mut temp_file = NamedTempFile::new_in(dir)?;
    temp_file.write_all(data)?;
    temp_file.flush()?;
    temp_file.as_file().sync_all()?;
    temp_file.persist(path).map_err(|e| e.error)?;

    debug!("Wrote {} bytes to {}", data.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn read_all(gateway: &FileSystemGateway, name: &str) -> Option<String> {
        let mut input = gateway.open_input(Some(name)).unwrap()?;
        let mut s = String::new();
        input.read_to_string(&mut s).unwrap();
        Some(s)
    }

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/dir/test.txt");

        atomic_write(&path, b"nested content").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "nested content");
    }

    #[test]
    fn test_open_input_missing_and_none() {
        let dir = tempdir().unwrap();
        let gateway = FileSystemGateway::new(dir.path());

        assert!(gateway.open_input(None).unwrap().is_none());
        assert!(gateway.open_input(Some("missing.json")).unwrap().is_none());
    }

    #[test]
    fn test_open_input_directory_is_error() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        let gateway = FileSystemGateway::new(dir.path());

        assert!(gateway.open_input(Some("sub")).is_err());
    }

    #[test]
    fn test_save_and_read_text() {
        let dir = tempdir().unwrap();
        let gateway = FileSystemGateway::new(dir.path());

        gateway
            .save_text("data/users.txt", "alice\nbob", Encoding::Utf8)
            .unwrap();

        assert!(gateway.exists("data/users.txt"));
        assert_eq!(read_all(&gateway, "data/users.txt").unwrap(), "alice\nbob");
    }

    #[test]
    fn test_save_latin1() {
        let dir = tempdir().unwrap();
        let gateway = FileSystemGateway::new(dir.path());

        gateway.save_text("l1.txt", "Größe", Encoding::Latin1).unwrap();

        let bytes = fs::read(gateway.path_of("l1.txt")).unwrap();
        assert_eq!(bytes, vec![b'G', b'r', 0xf6, 0xdf, b'e']);
    }

    #[test]
    fn test_rename_missing_source_is_noop() {
        let dir = tempdir().unwrap();
        let gateway = FileSystemGateway::new(dir.path());

        gateway.rename("nothing", "nothing.1").unwrap();
        assert!(!gateway.exists("nothing.1"));
    }

    #[test]
    fn test_rename_replaces_destination() {
        let dir = tempdir().unwrap();
        let gateway = FileSystemGateway::new(dir.path());
        gateway.save_text("a", "new", Encoding::Utf8).unwrap();
        gateway.save_text("a.1", "old", Encoding::Utf8).unwrap();

        gateway.rename("a", "a.1").unwrap();

        assert!(!gateway.exists("a"));
        assert_eq!(read_all(&gateway, "a.1").unwrap(), "new");
    }

    #[test]
    fn test_output_sink_visible_only_after_commit() {
        let dir = tempdir().unwrap();
        let gateway = FileSystemGateway::new(dir.path());

        let mut sink = gateway.open_output("doc.json").unwrap().unwrap();
        sink.write_all(b"{}").unwrap();
        assert!(!gateway.exists("doc.json"));

        sink.commit().unwrap();
        assert_eq!(read_all(&gateway, "doc.json").unwrap(), "{}");
    }

    #[test]
    fn test_dropped_sink_leaves_target_untouched() {
        let dir = tempdir().unwrap();
        let gateway = FileSystemGateway::new(dir.path());
        gateway.save_text("doc.json", "old", Encoding::Utf8).unwrap();

        {
            let mut sink = gateway.open_output("doc.json").unwrap().unwrap();
            sink.write_all(b"half").unwrap();
        }

        assert_eq!(read_all(&gateway, "doc.json").unwrap(), "old");
    }

    #[test]
    fn test_resolve_points_below_base_dir() {
        let gateway = FileSystemGateway::new("/var/lib/app");
        let resource = gateway.resolve("users.json");

        assert_eq!(resource.filename, "users.json");
        assert_eq!(resource.path, Some(PathBuf::from("/var/lib/app/users.json")));
    }
}
