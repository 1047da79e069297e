use crate::options::{
    default_read_options, derive_read_options, IpcFragmentScanOptions, IPC_TYPE_NAME,
};
use crate::reader::{open_reader, open_reader_async};
use crate::scan_task::{IpcScanTask, IpcScanTaskIterator};
use crate::writer::{IpcFileWriteOptions, IpcFileWriter};
use arrow::datatypes::SchemaRef;
use async_trait::async_trait;
use igloo_common::{Error, Result, Settings};
use igloo_dataset::{
    get_fragment_scan_options, make_from_future, make_readahead_generator, submit, Expression,
    FileFormat, FileFragment, FileLocator, FileSource, FileWriteOptions, FileWriter,
    FragmentScanOptions, RecordBatchGenerator, ScanOptions, ScanTaskIterator,
};
use std::io::Write;
use std::sync::Arc;
use tracing::{debug, trace};

/// The Arrow IPC file format.
#[derive(Debug, Clone, Default)]
pub struct IpcFileFormat {
    default_fragment_scan_options: Option<Arc<dyn FragmentScanOptions>>,
}

impl IpcFileFormat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options used by scans that bring none of their own.
    pub fn with_default_fragment_scan_options(mut self, options: IpcFragmentScanOptions) -> Self {
        self.default_fragment_scan_options = Some(Arc::new(options));
        self
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let scan_options = IpcFragmentScanOptions::from_settings(settings);
        Self::new().with_default_fragment_scan_options(scan_options)
    }

    /// Like [`FileFormat::scan_batches_async`], but returns the generator
    /// straight away; opening happens on its first pull.
    pub fn scan_batches_stream(
        &self,
        options: Arc<ScanOptions>,
        fragment: Arc<FileFragment>,
    ) -> RecordBatchGenerator {
        let format = self.clone();
        make_from_future(async move { format.scan_batches_async(options, fragment).await })
    }
}

#[async_trait]
impl FileFormat for IpcFileFormat {
    fn type_name(&self) -> &str {
        IPC_TYPE_NAME
    }

    fn default_fragment_scan_options(&self) -> Option<Arc<dyn FragmentScanOptions>> {
        self.default_fragment_scan_options.clone()
    }

    fn is_supported(&self, source: &FileSource) -> Result<bool> {
        match open_reader(source, default_read_options()) {
            Ok(_) => Ok(true),
            Err(e) => {
                trace!(path = source.path(), error = %e, "source is not an IPC file");
                Ok(false)
            }
        }
    }

    fn inspect(&self, source: &FileSource) -> Result<SchemaRef> {
        Ok(open_reader(source, default_read_options())?.schema())
    }

    fn scan_file(
        &self,
        options: Arc<ScanOptions>,
        fragment: Arc<FileFragment>,
    ) -> Result<ScanTaskIterator> {
        let task = IpcScanTask::new(options, fragment, self.default_fragment_scan_options.clone());
        Ok(Box::new(IpcScanTaskIterator::new(Arc::new(task))))
    }

    async fn scan_batches_async(
        &self,
        options: Arc<ScanOptions>,
        fragment: Arc<FileFragment>,
    ) -> Result<RecordBatchGenerator> {
        let source = fragment.source();
        let io_context = &options.io_context;

        let schema = open_reader_async(source, default_read_options(), io_context).await?.schema();
        let read_options =
            derive_read_options(&schema, self.default_fragment_scan_options.as_ref(), &options)?;
        let reader = Arc::new(open_reader_async(source, read_options, io_context).await?);

        let ipc_scan_options = get_fragment_scan_options::<IpcFragmentScanOptions>(
            IPC_TYPE_NAME,
            &options,
            self.default_fragment_scan_options.as_ref(),
        )?;
        debug!(
            path = source.path(),
            batches = reader.num_record_batches(),
            coalesce = ipc_scan_options.cache_options.is_some(),
            readahead = options.batch_readahead,
            "scanning IPC file asynchronously"
        );
        let generator = match ipc_scan_options.cache_options {
            Some(cache_options) => reader.coalescing_record_batch_generator(
                io_context,
                cache_options,
                options.cpu_executor.clone(),
            )?,
            None => reader.record_batch_generator(io_context),
        };
        Ok(make_readahead_generator(generator, options.batch_readahead))
    }

    async fn count_rows(
        &self,
        fragment: Arc<FileFragment>,
        predicate: Expression,
        options: Arc<ScanOptions>,
    ) -> Result<Option<i64>> {
        if predicate.has_field_refs() {
            return Ok(None);
        }
        let source = fragment.source().clone();
        let rows = submit(options.io_context.executor().clone(), move || {
            open_reader(&source, default_read_options())?.count_rows()
        })
        .await?;
        Ok(Some(rows))
    }

    fn default_write_options(self: Arc<Self>) -> Arc<dyn FileWriteOptions> {
        Arc::new(IpcFileWriteOptions::new(self))
    }

    fn make_writer(
        &self,
        destination: Box<dyn Write + Send>,
        schema: SchemaRef,
        options: Arc<dyn FileWriteOptions>,
        destination_locator: FileLocator,
    ) -> Result<Box<dyn FileWriter>> {
        let mismatch = || Error::OptionMismatch {
            expected: self.type_name().to_string(),
            actual: options.format().type_name().to_string(),
        };
        if !self.equals(options.format().as_ref()) {
            return Err(mismatch());
        }
        let ipc_options =
            options.as_any().downcast_ref::<IpcFileWriteOptions>().ok_or_else(mismatch)?;
        let writer = IpcFileWriter::try_new(destination, schema, ipc_options, destination_locator)?;
        Ok(Box::new(writer))
    }
}
