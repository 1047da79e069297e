//! Writing IPC files.

use arrow::datatypes::SchemaRef;
use arrow::ipc::writer::{FileWriter as ArrowFileWriter, IpcWriteOptions};
use arrow::record_batch::RecordBatch;
use igloo_common::{Error, Result};
use igloo_dataset::{FileFormat, FileLocator, FileWriteOptions, FileWriter};
use std::any::Any;
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct IpcFileWriteOptions {
    pub format: Arc<dyn FileFormat>,
    pub options: IpcWriteOptions,
    /// Always cleared by the writer.
    pub use_threads: bool,
    /// Custom key/value pairs stored in the file footer.
    pub metadata: HashMap<String, String>,
}

impl IpcFileWriteOptions {
    pub fn new(format: Arc<dyn FileFormat>) -> Self {
        Self {
            format,
            options: IpcWriteOptions::default(),
            use_threads: true,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

impl FileWriteOptions for IpcFileWriteOptions {
    fn format(&self) -> Arc<dyn FileFormat> {
        self.format.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Appends batches to one IPC file.
///
/// Writing after [`FileWriter::finish`], or finishing twice, is an error.
pub struct IpcFileWriter {
    writer: Option<ArrowFileWriter<Box<dyn Write + Send>>>,
    schema: SchemaRef,
    options: Arc<IpcFileWriteOptions>,
    destination: FileLocator,
}

impl IpcFileWriter {
    pub fn try_new(
        destination: Box<dyn Write + Send>,
        schema: SchemaRef,
        options: &IpcFileWriteOptions,
        locator: FileLocator,
    ) -> Result<Self> {
        let options = Arc::new(IpcFileWriteOptions { use_threads: false, ..options.clone() });
        let mut writer =
            ArrowFileWriter::try_new_with_options(destination, &schema, options.options.clone())?;
        for (key, value) in &options.metadata {
            writer.write_metadata(key, value);
        }
        debug!(path = %locator.path, "created IPC file writer");
        Ok(Self { writer: Some(writer), schema, options, destination: locator })
    }
}

impl FileWriter for IpcFileWriter {
    fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    fn options(&self) -> Arc<dyn FileWriteOptions> {
        self.options.clone()
    }

    fn destination(&self) -> &FileLocator {
        &self.destination
    }

    fn write(&mut self, batch: &RecordBatch) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(Error::WriteAfterFinish)?;
        if batch.schema().fields() != self.schema.fields() {
            return Err(Error::SchemaMismatch(format!(
                "batch schema {} does not match file schema {}",
                batch.schema(),
                self.schema
            )));
        }
        writer.write(batch)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let mut writer = self.writer.take().ok_or(Error::DoubleFinish)?;
        writer.finish()?;
        writer.into_inner()?.flush()?;
        debug!(path = %self.destination.path, "finished IPC file");
        Ok(())
    }
}
