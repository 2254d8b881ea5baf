//! Storage gateways for filedao.
//!
//! Managed objects in `filedao-persistence` never perform raw I/O. They are
//! handed a [`StorageGateway`] at construction and open, rename and save
//! logical files through it. Two gateways ship with this crate:
//!
//! - [`FileSystemGateway`]: files below a base directory, atomic writes.
//! - [`MemoryGateway`]: an in-memory map with failure injection, for
//!   memory-only setups and tests.
//!
//! # Example
//!
//! ```no_run
//! use filedao_storage::{Encoding, FileSystemGateway, StorageGateway};
//!
//! let gateway = FileSystemGateway::new("/var/lib/myapp");
//! gateway.save_text("settings.txt", "mode=fast", Encoding::Utf8).unwrap();
//! assert!(gateway.exists("settings.txt"));
//! ```

pub mod fs;
pub mod gateway;
pub mod memory;

pub use fs::{atomic_write, FileSystemGateway};
pub use gateway::{Encoding, OutputSink, Resource, StorageGateway};
pub use memory::{GatewayCounters, MemoryGateway};
