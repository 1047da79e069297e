//! Arrow IPC file connector
//!
//! Implements [`igloo_dataset::FileFormat`] for files in the Arrow IPC file
//! layout: probing and inspecting sources, blocking and asynchronous scans
//! with column projection, row counts from metadata, and writing.
//!
//! ```no_run
//! use igloo_connector_ipc::IpcFileFormat;
//! use igloo_dataset::{FileFormat, FileSource};
//!
//! let format = IpcFileFormat::new();
//! let source = FileSource::from_path("/data/events.arrow");
//! if format.is_supported(&source).unwrap_or(false) {
//!     let schema = format.inspect(&source).unwrap();
//!     println!("{schema:?}");
//! }
//! ```

pub mod format;
pub mod options;
pub mod projection;
pub mod reader;
pub mod scan_task;
pub mod writer;

pub use format::IpcFileFormat;
pub use options::{
    default_read_options, derive_read_options, CacheOptions, IpcFragmentScanOptions,
    IpcReadOptions, IPC_TYPE_NAME,
};
pub use projection::included_fields;
pub use reader::{open_reader, open_reader_async, IpcFileReader};
pub use scan_task::{IpcScanTask, IpcScanTaskIterator};
pub use writer::{IpcFileWriteOptions, IpcFileWriter};
