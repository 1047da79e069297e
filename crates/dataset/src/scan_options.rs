//! Per-scan configuration handed to every file format.

use crate::executor::{Executor, InlineExecutor, IoContext};
use crate::expr::{Expression, FieldRef};
use crate::memory::{default_memory_pool, MemoryPool};
use igloo_common::{Error, Result, Settings};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

pub const DEFAULT_BATCH_READAHEAD: usize = 16;

/// Format-specific knobs for scanning a fragment.
pub trait FragmentScanOptions: Send + Sync + fmt::Debug {
    /// The format these options belong to, e.g. `"ipc"`.
    fn type_name(&self) -> &str;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub filter: Expression,
    /// Fields the scan projects; empty means "every field".
    pub projection: Vec<FieldRef>,
    pub pool: Arc<dyn MemoryPool>,
    /// Batches a generator may prefetch ahead of its consumer.
    pub batch_readahead: usize,
    pub io_context: IoContext,
    /// Where CPU-heavy work such as decoding is sent.
    pub cpu_executor: Arc<dyn Executor>,
    pub fragment_scan_options: Option<Arc<dyn FragmentScanOptions>>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            filter: Expression::default(),
            projection: Vec::new(),
            pool: default_memory_pool(),
            batch_readahead: DEFAULT_BATCH_READAHEAD,
            io_context: IoContext::default(),
            cpu_executor: Arc::new(InlineExecutor),
            fragment_scan_options: None,
        }
    }
}

impl ScanOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self { batch_readahead: settings.batch_readahead, ..Self::default() }
    }

    /// Routes both I/O and CPU work to `executor`.
    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.io_context = IoContext::new(executor.clone());
        self.cpu_executor = executor;
        self
    }

    /// Fields the scan actually needs: the projection's, then the filter's,
    /// without repeats. An empty projection yields an empty list, which
    /// stands for every field.
    pub fn materialized_fields(&self) -> Vec<FieldRef> {
        let mut fields: Vec<FieldRef> = Vec::new();
        if self.projection.is_empty() {
            return fields;
        }
        for field in self.projection.iter().chain(self.filter.field_refs()) {
            if !fields.contains(field) {
                fields.push(field.clone());
            }
        }
        fields
    }
}

/// Picks the fragment scan options of type `T` for a scan.
///
/// The scan's own options win over `default_options`; when neither is set,
/// `T::default()` is used.
pub fn get_fragment_scan_options<T>(
    type_name: &str,
    scan_options: &ScanOptions,
    default_options: Option<&Arc<dyn FragmentScanOptions>>,
) -> Result<Arc<T>>
where
    T: FragmentScanOptions + Default + 'static,
{
    let Some(source) = scan_options.fragment_scan_options.as_ref().or(default_options) else {
        return Ok(Arc::new(T::default()));
    };
    if source.type_name() != type_name {
        return Err(Error::InvalidArgument(format!(
            "FragmentScanOptions of type {} were provided for scanning a fragment of type {}",
            source.type_name(),
            type_name
        )));
    }
    source.clone().into_any().downcast::<T>().map_err(|_| {
        Error::InvalidArgument(format!(
            "FragmentScanOptions named {type_name} are not of the expected type"
        ))
    })
}
