//! The interface every pluggable file format implements.

use crate::expr::Expression;
use crate::generator::RecordBatchGenerator;
use crate::scan_options::{FragmentScanOptions, ScanOptions};
use crate::source::{FileLocator, FileSource};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::{RecordBatch, RecordBatchReader};
use async_trait::async_trait;
use igloo_common::{Error, Result};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::sync::{Arc, OnceLock};

pub type RecordBatchIterator = Box<dyn Iterator<Item = Result<RecordBatch>> + Send>;

/// A unit of work producing the batches of (part of) a fragment.
pub trait ScanTask: Send + Sync + fmt::Debug {
    /// A lazy sequence of batches. Nothing is read before the first pull.
    fn execute(&self) -> Result<RecordBatchIterator>;

    fn options(&self) -> &Arc<ScanOptions>;

    fn fragment(&self) -> &Arc<FileFragment>;
}

pub type ScanTaskIterator = Box<dyn Iterator<Item = Result<Arc<dyn ScanTask>>> + Send>;

/// Format-specific options for writing files.
pub trait FileWriteOptions: Send + Sync + fmt::Debug {
    fn format(&self) -> Arc<dyn FileFormat>;

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Writes batches to one destination, in the order they are given.
///
/// A writer must be finished exactly once.
pub trait FileWriter: Send {
    fn schema(&self) -> &SchemaRef;

    fn options(&self) -> Arc<dyn FileWriteOptions>;

    fn destination(&self) -> &FileLocator;

    fn write(&mut self, batch: &RecordBatch) -> Result<()>;

    /// Writes every batch `reader` yields.
    fn write_reader(&mut self, reader: &mut dyn RecordBatchReader) -> Result<()> {
        for batch in reader {
            self.write(&batch?)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()>;
}

#[async_trait]
pub trait FileFormat: Send + Sync + fmt::Debug {
    /// Short name identifying the format, e.g. `"ipc"`.
    fn type_name(&self) -> &str;

    fn equals(&self, other: &dyn FileFormat) -> bool {
        self.type_name() == other.type_name()
    }

    fn default_fragment_scan_options(&self) -> Option<Arc<dyn FragmentScanOptions>>;

    /// Best-effort check: never fails for unreadable or malformed sources.
    fn is_supported(&self, source: &FileSource) -> Result<bool>;

    /// The schema stored in `source`, read without materializing data.
    fn inspect(&self, source: &FileSource) -> Result<SchemaRef>;

    fn scan_file(
        &self,
        options: Arc<ScanOptions>,
        fragment: Arc<FileFragment>,
    ) -> Result<ScanTaskIterator>;

    async fn scan_batches_async(
        &self,
        options: Arc<ScanOptions>,
        fragment: Arc<FileFragment>,
    ) -> Result<RecordBatchGenerator>;

    /// Row count from metadata alone, or `None` when a scan is required.
    async fn count_rows(
        &self,
        fragment: Arc<FileFragment>,
        predicate: Expression,
        options: Arc<ScanOptions>,
    ) -> Result<Option<i64>>;

    fn default_write_options(self: Arc<Self>) -> Arc<dyn FileWriteOptions>;

    fn make_writer(
        &self,
        destination: Box<dyn Write + Send>,
        schema: SchemaRef,
        options: Arc<dyn FileWriteOptions>,
        destination_locator: FileLocator,
    ) -> Result<Box<dyn FileWriter>>;
}

/// One file of a dataset, read through its format.
pub struct FileFragment {
    source: FileSource,
    format: Arc<dyn FileFormat>,
    physical_schema: OnceLock<SchemaRef>,
}

impl FileFragment {
    pub fn new(source: FileSource, format: Arc<dyn FileFormat>) -> Self {
        Self { source, format, physical_schema: OnceLock::new() }
    }

    pub fn source(&self) -> &FileSource {
        &self.source
    }

    pub fn format(&self) -> &Arc<dyn FileFormat> {
        &self.format
    }

    /// The schema of this file, inspected on first use.
    pub fn read_physical_schema(&self) -> Result<SchemaRef> {
        if let Some(schema) = self.physical_schema.get() {
            return Ok(schema.clone());
        }
        let schema = self.format.inspect(&self.source)?;
        Ok(self.physical_schema.get_or_init(|| schema).clone())
    }

    pub fn scan(self: &Arc<Self>, options: Arc<ScanOptions>) -> Result<ScanTaskIterator> {
        self.format.scan_file(options, self.clone())
    }

    pub async fn scan_batches_async(
        self: &Arc<Self>,
        options: Arc<ScanOptions>,
    ) -> Result<RecordBatchGenerator> {
        self.format.scan_batches_async(options, self.clone()).await
    }

    pub async fn count_rows(
        self: &Arc<Self>,
        predicate: Expression,
        options: Arc<ScanOptions>,
    ) -> Result<Option<i64>> {
        self.format.count_rows(self.clone(), predicate, options).await
    }
}

impl fmt::Debug for FileFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileFragment")
            .field("source", &self.source)
            .field("format", &self.format.type_name())
            .finish()
    }
}

/// Runtime lookup of file formats by name.
#[derive(Debug, Default)]
pub struct FormatRegistry {
    formats: Vec<Arc<dyn FileFormat>>,
    by_name: HashMap<String, usize>,
}

impl FormatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, format: Arc<dyn FileFormat>) -> Result<()> {
        let name = format.type_name().to_string();
        if self.by_name.contains_key(&name) {
            return Err(Error::InvalidArgument(format!("format '{name}' is already registered")));
        }
        self.by_name.insert(name, self.formats.len());
        self.formats.push(format);
        Ok(())
    }

    pub fn get(&self, type_name: &str) -> Option<Arc<dyn FileFormat>> {
        self.by_name.get(type_name).map(|&i| self.formats[i].clone())
    }

    /// The first registered format that recognizes `source`.
    pub fn detect(&self, source: &FileSource) -> Result<Option<Arc<dyn FileFormat>>> {
        for format in &self.formats {
            if format.is_supported(source)? {
                return Ok(Some(format.clone()));
            }
        }
        Ok(None)
    }
}
