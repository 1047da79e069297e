//! Opening IPC files and reading their record batches.
//!
//! The footer (schema, dictionary and record batch block index) is parsed at
//! open. Batches are then read by index with positional reads, so one reader
//! can serve several in-flight reads without seeking a shared cursor.

use crate::options::{CacheOptions, IpcReadOptions};
use arrow::buffer::Buffer;
use arrow::datatypes::SchemaRef;
use arrow::ipc::convert::fb_to_schema;
use arrow::ipc::reader::{read_footer_length, FileDecoder};
use arrow::ipc::{root_as_footer, root_as_message, Block, Type};
use arrow::record_batch::RecordBatch;
use futures::future::{self, BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use igloo_common::{Error, Result};
use igloo_dataset::{
    submit, BatchFutureGenerator, Executor, FileSource, IoContext, RandomAccessFile,
};
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, trace};

const ARROW_MAGIC: [u8; 6] = *b"ARROW1";
const CONTINUATION_MARKER: [u8; 4] = [0xff; 4];
/// Footer length (4 bytes) followed by the trailing magic.
const TRAILER_LENGTH: usize = 10;
/// Leading magic plus padding to an 8-byte boundary.
const HEADER_LENGTH: u64 = 8;

/// An open IPC file.
pub struct IpcFileReader {
    file: Arc<dyn RandomAccessFile>,
    file_schema: SchemaRef,
    schema: SchemaRef,
    decoder: FileDecoder,
    blocks: Vec<Block>,
    metadata: HashMap<String, String>,
    options: IpcReadOptions,
}

impl IpcFileReader {
    /// Parses and validates the footer of `file`.
    pub fn open(file: Arc<dyn RandomAccessFile>, options: IpcReadOptions) -> Result<Self> {
        let size = file.size()?;
        if size < HEADER_LENGTH + TRAILER_LENGTH as u64 {
            return Err(Error::Invalid(format!("file is too small ({size} bytes)")));
        }
        if file.read_at(0, ARROW_MAGIC.len())?.as_slice() != ARROW_MAGIC {
            return Err(Error::Invalid("not an Arrow file: leading magic missing".to_string()));
        }

        let trailer = file.read_at(size - TRAILER_LENGTH as u64, TRAILER_LENGTH)?;
        let mut trailer_bytes = [0u8; TRAILER_LENGTH];
        trailer_bytes.copy_from_slice(&trailer);
        let footer_length = read_footer_length(trailer_bytes)?;
        if (footer_length as u64) + (TRAILER_LENGTH as u64) + HEADER_LENGTH > size {
            return Err(Error::Invalid(format!(
                "footer length {footer_length} exceeds file size {size}"
            )));
        }

        let footer_start = size - TRAILER_LENGTH as u64 - footer_length as u64;
        let footer_data = file.read_at(footer_start, footer_length)?;
        let footer = root_as_footer(&footer_data)
            .map_err(|e| Error::Invalid(format!("unable to read footer: {e:?}")))?;
        let fb_schema =
            footer.schema().ok_or_else(|| Error::Invalid("footer has no schema".to_string()))?;
        let file_schema = Arc::new(convert_schema(fb_schema)?);

        let mask = inclusion_mask(&options.included_fields, file_schema.fields().len())?;
        let schema = if mask.is_empty() {
            file_schema.clone()
        } else {
            Arc::new(file_schema.project(&mask)?)
        };
        let mut decoder = FileDecoder::new(file_schema.clone(), footer.version());
        if !mask.is_empty() {
            decoder = decoder.with_projection(mask);
        }

        for block in footer.dictionaries().iter().flatten() {
            let data = read_block(file.as_ref(), block, size)?;
            decoder.read_dictionary(block, &data)?;
        }
        let blocks: Vec<Block> =
            footer.recordBatches().map(|b| b.iter().copied().collect()).unwrap_or_default();
        for block in &blocks {
            block_range(block, size)?;
        }

        let metadata = footer
            .custom_metadata()
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|kv| Some((kv.key()?.to_string(), kv.value()?.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self { file, file_schema, schema, decoder, blocks, metadata, options })
    }

    /// The schema of the batches this reader produces.
    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    /// The schema stored in the file, regardless of projection.
    pub fn file_schema(&self) -> SchemaRef {
        self.file_schema.clone()
    }

    pub fn options(&self) -> &IpcReadOptions {
        &self.options
    }

    /// Custom key/value metadata from the footer.
    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    pub fn num_record_batches(&self) -> usize {
        self.blocks.len()
    }

    pub fn read_record_batch(&self, index: usize) -> Result<RecordBatch> {
        let block = self.blocks.get(index).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "record batch index {index} out of range for file with {} batches",
                self.blocks.len()
            ))
        })?;
        let size = self.file.size()?;
        let data = read_block(self.file.as_ref(), block, size)?;
        self.decode_block(block, &data)
    }

    /// Total number of rows, read from the batch message headers only.
    pub fn count_rows(&self) -> Result<i64> {
        let mut total = 0;
        for block in &self.blocks {
            let offset = u64::try_from(block.offset()).map_err(|_| invalid_block(block))?;
            let length =
                usize::try_from(block.metaDataLength()).map_err(|_| invalid_block(block))?;
            let header = self.file.read_at(offset, length)?;
            let message = parse_message(&header)?;
            let batch = message.header_as_record_batch().ok_or_else(|| {
                Error::Invalid("block does not point at a record batch message".to_string())
            })?;
            total += batch.length();
        }
        Ok(total)
    }

    fn decode_block(&self, block: &Block, data: &Buffer) -> Result<RecordBatch> {
        let batch = self
            .decoder
            .read_record_batch(block, data)?
            .ok_or_else(|| Error::Invalid("block does not hold a record batch".to_string()))?;
        self.options.memory_pool.allocate(batch.get_array_memory_size());
        trace!(rows = batch.num_rows(), "decoded record batch");
        Ok(batch)
    }

    /// One read per batch, each performed on the I/O executor when polled.
    pub fn record_batch_generator(self: Arc<Self>, io_context: &IoContext) -> BatchFutureGenerator {
        let executor = io_context.executor().clone();
        stream::iter(0..self.num_record_batches())
            .map(move |index| {
                let reader = self.clone();
                submit(executor.clone(), move || reader.read_record_batch(index)).boxed()
            })
            .boxed()
    }

    /// Reads neighbouring blocks with single ranged reads on the I/O executor
    /// and decodes each batch on `cpu_executor`.
    ///
    /// Batches are zero-copy slices of the ranged read.
    pub fn coalescing_record_batch_generator(
        self: Arc<Self>,
        io_context: &IoContext,
        cache_options: CacheOptions,
        cpu_executor: Arc<dyn Executor>,
    ) -> Result<BatchFutureGenerator> {
        let ranges = coalesce_blocks(&self.blocks, self.file.size()?, cache_options)?;
        debug!(
            batches = self.blocks.len(),
            ranges = ranges.len(),
            "coalesced record batch reads"
        );
        let io = io_context.executor().clone();
        let reader = self;
        let generator = stream::iter(ranges)
            .then(move |range| {
                let reader = reader.clone();
                let io = io.clone();
                async move {
                    let file = reader.file.clone();
                    let (offset, length) = (range.offset, range.length);
                    let data = submit(io, move || Ok(file.read_at(offset, length)?)).await;
                    (reader, range, data)
                }
            })
            .flat_map(move |(reader, range, data)| {
                let batches: Vec<BoxFuture<'static, Result<RecordBatch>>> = match data {
                    Err(e) => vec![future::ready(Err(e)).boxed()],
                    Ok(data) => range
                        .blocks
                        .into_iter()
                        .map(|slot| {
                            let reader = reader.clone();
                            let data = data.slice_with_length(slot.start, slot.length);
                            submit(cpu_executor.clone(), move || {
                                reader.decode_block(&slot.block, &data)
                            })
                            .boxed()
                        })
                        .collect(),
                };
                stream::iter(batches)
            })
            .boxed();
        Ok(generator)
    }
}

impl fmt::Debug for IpcFileReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IpcFileReader")
            .field("file", &self.file)
            .field("schema", &self.schema)
            .field("num_record_batches", &self.blocks.len())
            .field("included_fields", &self.options.included_fields)
            .finish()
    }
}

/// Opens `source`. Failures carry the source's path.
pub fn open_reader(source: &FileSource, options: IpcReadOptions) -> Result<IpcFileReader> {
    debug!(path = source.path(), included_fields = ?options.included_fields, "opening IPC file");
    source
        .open()
        .and_then(|file| IpcFileReader::open(file, options))
        .map_err(|e| Error::open("IPC", source.path(), e))
}

/// [`open_reader`] run on the I/O executor.
pub async fn open_reader_async(
    source: &FileSource,
    options: IpcReadOptions,
    io_context: &IoContext,
) -> Result<IpcFileReader> {
    let source = source.clone();
    submit(io_context.executor().clone(), move || open_reader(&source, options)).await
}

/// Converts the footer schema, rejecting tables the flatbuffer converter
/// would otherwise abort on.
fn convert_schema(fb_schema: arrow::ipc::Schema<'_>) -> Result<arrow::datatypes::Schema> {
    let fields = fb_schema.fields().ok_or_else(|| malformed_schema("no field list"))?;
    for field in fields.iter() {
        check_field(field)?;
    }
    // Enum values outside the known range still panic inside the converter.
    panic::catch_unwind(AssertUnwindSafe(|| fb_to_schema(fb_schema)))
        .map_err(|_| malformed_schema("unsupported type parameters"))
}

fn check_field(field: arrow::ipc::Field<'_>) -> Result<()> {
    let name = field.name().ok_or_else(|| malformed_schema("field without a name"))?;
    if field.type_type() == Type::NONE || field.type_().is_none() {
        return Err(malformed_schema(&format!("field '{name}' has no type")));
    }
    if let Some(dictionary) = field.dictionary() {
        if dictionary.indexType().is_none() {
            return Err(malformed_schema(&format!("dictionary field '{name}' has no index type")));
        }
    }

    let children = field.children();
    let expected = match field.type_type() {
        Type::List | Type::LargeList | Type::FixedSizeList | Type::Map => Some(1),
        Type::RunEndEncoded => Some(2),
        _ => None,
    };
    if let Some(expected) = expected {
        let found = children.map(|c| c.len()).unwrap_or(0);
        if found != expected {
            return Err(malformed_schema(&format!(
                "field '{name}' needs {expected} children, found {found}"
            )));
        }
    }
    if let Some(children) = children {
        for child in children.iter() {
            check_field(child)?;
        }
    }
    Ok(())
}

fn malformed_schema(reason: &str) -> Error {
    Error::Invalid(format!("malformed schema in footer: {reason}"))
}

/// Sorted, de-duplicated column indices; empty selects every column.
fn inclusion_mask(included_fields: &[usize], num_fields: usize) -> Result<Vec<usize>> {
    let mut mask = included_fields.to_vec();
    mask.sort_unstable();
    mask.dedup();
    if let Some(&out_of_range) = mask.iter().find(|&&i| i >= num_fields) {
        return Err(Error::Invalid(format!(
            "included field index {out_of_range} out of range for schema with {num_fields} fields"
        )));
    }
    Ok(mask)
}

fn invalid_block(block: &Block) -> Error {
    Error::Invalid(format!(
        "invalid block (offset {}, metadata {}, body {})",
        block.offset(),
        block.metaDataLength(),
        block.bodyLength()
    ))
}

/// Byte range `(offset, length)` covering a block's metadata and body.
fn block_range(block: &Block, file_size: u64) -> Result<(u64, usize)> {
    let offset = u64::try_from(block.offset()).map_err(|_| invalid_block(block))?;
    let metadata = u64::try_from(block.metaDataLength()).map_err(|_| invalid_block(block))?;
    let body = u64::try_from(block.bodyLength()).map_err(|_| invalid_block(block))?;
    let length = metadata + body;
    match offset.checked_add(length) {
        Some(end) if end <= file_size => {
            Ok((offset, usize::try_from(length).map_err(|_| invalid_block(block))?))
        }
        _ => Err(invalid_block(block)),
    }
}

fn read_block(file: &dyn RandomAccessFile, block: &Block, file_size: u64) -> Result<Buffer> {
    let (offset, length) = block_range(block, file_size)?;
    Ok(file.read_at(offset, length)?)
}

fn parse_message(buf: &[u8]) -> Result<arrow::ipc::Message<'_>> {
    let buf = match buf.get(..4) {
        Some(prefix) if prefix == CONTINUATION_MARKER => buf.get(8..),
        Some(_) => buf.get(4..),
        None => None,
    }
    .ok_or_else(|| Error::Invalid("truncated message header".to_string()))?;
    root_as_message(buf).map_err(|e| Error::Invalid(format!("unable to read message: {e:?}")))
}

/// A block and where it sits inside a [`ReadRange`].
#[derive(Debug, Clone, Copy)]
struct BlockSlot {
    block: Block,
    start: usize,
    length: usize,
}

/// One physical read covering one or more blocks.
#[derive(Debug)]
struct ReadRange {
    offset: u64,
    length: usize,
    blocks: Vec<BlockSlot>,
}

fn coalesce_blocks(
    blocks: &[Block],
    file_size: u64,
    cache_options: CacheOptions,
) -> Result<Vec<ReadRange>> {
    let mut ranges: Vec<ReadRange> = Vec::new();
    for block in blocks {
        let (offset, length) = block_range(block, file_size)?;
        if let Some(last) = ranges.last_mut() {
            let end = last.offset + last.length as u64;
            let mergeable = offset >= end
                && offset - end <= cache_options.hole_size_limit
                && offset + length as u64 - last.offset <= cache_options.range_size_limit;
            if mergeable {
                let start = (offset - last.offset) as usize;
                last.length = start + length;
                last.blocks.push(BlockSlot { block: *block, start, length });
                continue;
            }
        }
        ranges.push(ReadRange {
            offset,
            length,
            blocks: vec![BlockSlot { block: *block, start: 0, length }],
        });
    }
    Ok(ranges)
}
