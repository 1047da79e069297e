#![allow(dead_code)]

use arrow::array::{Int32Array, StringArray};
use arrow::buffer::Buffer;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use igloo_connector_ipc::IpcFileFormat;
use igloo_dataset::executor::Task;
use igloo_dataset::{
    BufferFile, Executor, FileFormat, FileFragment, FileLocator, FileSource, RandomAccessFile,
    ScanOptions,
};
use std::collections::HashMap;
use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A `Write` sink whose bytes stay reachable after the writer is gone.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(pub Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn bytes(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn people_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int32, false),
        Field::new("name", DataType::Utf8, true),
        Field::new("score", DataType::Int32, true),
    ]))
}

pub fn people_batches() -> Vec<RecordBatch> {
    let schema = people_schema();
    let rows: [(&[i32], &[Option<&str>], &[Option<i32>]); 3] = [
        (&[1, 2, 3], &[Some("ada"), Some("brian"), None], &[Some(10), None, Some(30)]),
        (&[4], &[Some("dennis")], &[Some(40)]),
        (&[5, 6], &[None, Some("grace")], &[Some(50), Some(60)]),
    ];
    rows.iter()
        .map(|(ids, names, scores)| {
            RecordBatch::try_new(
                schema.clone(),
                vec![
                    Arc::new(Int32Array::from(ids.to_vec())),
                    Arc::new(StringArray::from(names.to_vec())),
                    Arc::new(Int32Array::from(scores.to_vec())),
                ],
            )
            .unwrap()
        })
        .collect()
}

/// Encodes `batches` as an IPC file through the connector's own writer.
pub fn write_file(
    schema: SchemaRef,
    batches: &[RecordBatch],
    metadata: &[(&str, &str)],
) -> Buffer {
    let format = Arc::new(IpcFileFormat::new());
    let mut options = igloo_connector_ipc::IpcFileWriteOptions::new(format.clone());
    for (key, value) in metadata {
        options = options.with_metadata(*key, *value);
    }
    let sink = SharedBuffer::default();
    let mut writer = format
        .make_writer(Box::new(sink.clone()), schema, Arc::new(options), FileLocator::new("memory"))
        .unwrap();
    for batch in batches {
        writer.write(batch).unwrap();
    }
    writer.finish().unwrap();
    Buffer::from_vec(sink.bytes())
}

pub fn people_file() -> Buffer {
    write_file(people_schema(), &people_batches(), &[])
}

/// A source backed by `buffer` that counts how often it is opened.
pub fn counting_source(path: &str, buffer: Buffer) -> (FileSource, Arc<AtomicUsize>) {
    let opens = Arc::new(AtomicUsize::new(0));
    let counter = opens.clone();
    let source = FileSource::with_opener(path, move || {
        counter.fetch_add(1, Ordering::SeqCst);
        let file: Arc<dyn RandomAccessFile> = Arc::new(BufferFile::new(buffer.clone()));
        Ok(file)
    });
    (source, opens)
}

pub fn fragment(source: FileSource) -> Arc<FileFragment> {
    Arc::new(FileFragment::new(source, Arc::new(IpcFileFormat::new())))
}

/// Runs every task of a blocking scan and gathers the batches.
pub fn scan_sync(
    fragment: &Arc<FileFragment>,
    options: ScanOptions,
) -> igloo_common::Result<Vec<RecordBatch>> {
    let mut batches = Vec::new();
    for task in fragment.scan(Arc::new(options))? {
        for batch in task?.execute()? {
            batches.push(batch?);
        }
    }
    Ok(batches)
}

pub async fn scan_async(
    fragment: &Arc<FileFragment>,
    options: ScanOptions,
) -> igloo_common::Result<Vec<RecordBatch>> {
    fragment.scan_batches_async(Arc::new(options)).await?.try_collect().await
}

/// Holds submitted tasks until the test runs them.
#[derive(Default)]
pub struct QueueExecutor {
    tasks: Mutex<Vec<Task>>,
}

impl fmt::Debug for QueueExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueExecutor").field("queued", &self.len()).finish()
    }
}

impl QueueExecutor {
    pub fn len(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    pub fn run_all(&self) {
        let tasks: Vec<Task> = std::mem::take(&mut *self.tasks.lock().unwrap());
        for task in tasks {
            task();
        }
    }
}

impl Executor for QueueExecutor {
    fn spawn_blocking(&self, task: Task) {
        self.tasks.lock().unwrap().push(task);
    }
}

pub fn column_names(batch: &RecordBatch) -> Vec<String> {
    batch.schema().fields().iter().map(|f| f.name().clone()).collect()
}

pub fn metadata_map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}
