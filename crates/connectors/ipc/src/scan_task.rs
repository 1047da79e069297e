//! Blocking scan of one IPC file.

use crate::options::{default_read_options, derive_read_options};
use crate::reader::{open_reader, IpcFileReader};
use arrow::record_batch::RecordBatch;
use igloo_common::Result;
use igloo_dataset::{
    FileFragment, FragmentScanOptions, RecordBatchIterator, ScanOptions, ScanTask,
};
use std::iter::FusedIterator;
use std::sync::Arc;
use tracing::debug;

/// Scans a whole file as a single task.
#[derive(Debug)]
pub struct IpcScanTask {
    options: Arc<ScanOptions>,
    fragment: Arc<FileFragment>,
    default_fragment_scan_options: Option<Arc<dyn FragmentScanOptions>>,
}

impl IpcScanTask {
    pub fn new(
        options: Arc<ScanOptions>,
        fragment: Arc<FileFragment>,
        default_fragment_scan_options: Option<Arc<dyn FragmentScanOptions>>,
    ) -> Self {
        Self { options, fragment, default_fragment_scan_options }
    }
}

impl ScanTask for IpcScanTask {
    fn execute(&self) -> Result<RecordBatchIterator> {
        Ok(Box::new(IpcBatchIterator {
            options: self.options.clone(),
            fragment: self.fragment.clone(),
            default_fragment_scan_options: self.default_fragment_scan_options.clone(),
            state: State::NotStarted,
        }))
    }

    fn options(&self) -> &Arc<ScanOptions> {
        &self.options
    }

    fn fragment(&self) -> &Arc<FileFragment> {
        &self.fragment
    }
}

enum State {
    NotStarted,
    Streaming { reader: IpcFileReader, next: usize },
    Done,
}

/// Opens the file on the first pull, then reads one batch per pull.
struct IpcBatchIterator {
    options: Arc<ScanOptions>,
    fragment: Arc<FileFragment>,
    default_fragment_scan_options: Option<Arc<dyn FragmentScanOptions>>,
    state: State,
}

impl IpcBatchIterator {
    fn open(&self) -> Result<IpcFileReader> {
        let source = self.fragment.source();
        let schema = open_reader(source, default_read_options())?.schema();
        let options = derive_read_options(
            &schema,
            self.default_fragment_scan_options.as_ref(),
            &self.options,
        )?;
        let reader = open_reader(source, options)?;
        debug!(
            path = source.path(),
            batches = reader.num_record_batches(),
            "scanning IPC file"
        );
        Ok(reader)
    }
}

impl Iterator for IpcBatchIterator {
    type Item = Result<RecordBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if let State::NotStarted = self.state {
            match self.open() {
                Ok(reader) => self.state = State::Streaming { reader, next: 0 },
                Err(e) => {
                    self.state = State::Done;
                    return Some(Err(e));
                }
            }
        }
        let State::Streaming { reader, next } = &mut self.state else {
            return None;
        };
        if *next == reader.num_record_batches() {
            self.state = State::Done;
            return None;
        }
        let batch = reader.read_record_batch(*next);
        *next += 1;
        Some(batch)
    }
}

impl FusedIterator for IpcBatchIterator {}

/// Yields its one task once.
pub struct IpcScanTaskIterator {
    task: Option<Arc<dyn ScanTask>>,
}

impl IpcScanTaskIterator {
    pub fn new(task: Arc<dyn ScanTask>) -> Self {
        Self { task: Some(task) }
    }
}

impl Iterator for IpcScanTaskIterator {
    type Item = Result<Arc<dyn ScanTask>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.task.take().map(Ok)
    }
}

impl FusedIterator for IpcScanTaskIterator {}
