//! Read options and the scan-time derivation of them.

use crate::projection::included_fields;
use arrow::datatypes::Schema;
use igloo_common::{Result, Settings};
use igloo_dataset::{
    default_memory_pool, get_fragment_scan_options, FragmentScanOptions, MemoryPool, ScanOptions,
};
use std::any::Any;
use std::sync::Arc;
use tracing::warn;

pub const IPC_TYPE_NAME: &str = "ipc";

/// Options for opening an IPC file.
#[derive(Debug, Clone)]
pub struct IpcReadOptions {
    pub memory_pool: Arc<dyn MemoryPool>,
    /// Top-level columns to decode, applied as a mask in file order.
    /// Empty decodes every column.
    pub included_fields: Vec<usize>,
    pub use_threads: bool,
}

impl IpcReadOptions {
    pub fn defaults() -> Self {
        Self { memory_pool: default_memory_pool(), included_fields: Vec::new(), use_threads: true }
    }
}

/// Read options for this connector: never decode with threads of our own, the
/// scanner already reads fragments in parallel.
pub fn default_read_options() -> IpcReadOptions {
    IpcReadOptions { use_threads: false, ..IpcReadOptions::defaults() }
}

/// Controls merging of nearby block reads into larger ranged reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    /// Largest gap in bytes between two reads that still get merged.
    pub hole_size_limit: u64,
    /// Merged reads never grow past this many bytes.
    pub range_size_limit: u64,
}

impl CacheOptions {
    pub fn defaults() -> Self {
        Self { hole_size_limit: 8192, range_size_limit: 32 * 1024 * 1024 }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            hole_size_limit: settings.hole_size_limit,
            range_size_limit: settings.range_size_limit,
        }
    }
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self::defaults()
    }
}

#[derive(Debug, Clone, Default)]
pub struct IpcFragmentScanOptions {
    /// Base read options; `included_fields` is always replaced at scan time.
    pub options: Option<IpcReadOptions>,
    /// Coalesce block reads when set.
    pub cache_options: Option<CacheOptions>,
}

impl IpcFragmentScanOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            options: None,
            cache_options: settings.coalesce.then(|| CacheOptions::from_settings(settings)),
        }
    }
}

impl FragmentScanOptions for IpcFragmentScanOptions {
    fn type_name(&self) -> &str {
        IPC_TYPE_NAME
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Read options for scanning a file whose schema is `schema`.
///
/// Must be derived per file: two files of one dataset may order or name
/// their columns differently.
pub fn derive_read_options(
    schema: &Schema,
    default_fragment_scan_options: Option<&Arc<dyn FragmentScanOptions>>,
    scan_options: &ScanOptions,
) -> Result<IpcReadOptions> {
    let ipc_scan_options = get_fragment_scan_options::<IpcFragmentScanOptions>(
        IPC_TYPE_NAME,
        scan_options,
        default_fragment_scan_options,
    )?;
    let mut options = ipc_scan_options.options.clone().unwrap_or_else(default_read_options);
    options.memory_pool = scan_options.pool.clone();
    options.use_threads = false;
    if !options.included_fields.is_empty() {
        warn!(
            included_fields = ?options.included_fields,
            "IpcFragmentScanOptions.options.included_fields was set but will be ignored; \
             included fields are derived from fields referenced by the scan"
        );
    }
    options.included_fields = included_fields(schema, &scan_options.materialized_fields())?;
    Ok(options)
}
