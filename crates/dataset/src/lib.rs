//! Dataset crate
//!
//! The interfaces a file format plugs into: byte sources, scan options,
//! executors, batch generators, fragments and writers. Format adapters such as
//! `igloo-connector-ipc` implement [`FileFormat`] on top of these.

pub mod executor;
pub mod expr;
pub mod format;
pub mod generator;
pub mod memory;
pub mod scan_options;
pub mod source;

pub use executor::{submit, Executor, InlineExecutor, IoContext, TokioExecutor};
pub use expr::{Expression, FieldPath, FieldRef, ScalarValue};
pub use format::{
    FileFormat, FileFragment, FileWriteOptions, FileWriter, FormatRegistry, RecordBatchIterator,
    ScanTask, ScanTaskIterator,
};
pub use generator::{
    make_from_future, make_readahead_generator, BatchFutureGenerator, RecordBatchGenerator,
};
pub use memory::{default_memory_pool, MemoryPool, TrackingMemoryPool};
pub use scan_options::{get_fragment_scan_options, FragmentScanOptions, ScanOptions};
pub use source::{BufferFile, FileLocator, FileSource, LocalFile, RandomAccessFile};
