//! Byte sources a fragment can be read from.

use arrow::buffer::Buffer;
use igloo_common::{Error, Result};
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// A handle that supports positional reads.
///
/// Reads take `&self` so one handle can serve several in-flight reads.
pub trait RandomAccessFile: Send + Sync + fmt::Debug {
    /// Total size of the file in bytes.
    fn size(&self) -> io::Result<u64>;

    /// Reads exactly `length` bytes starting at `offset`.
    fn read_at(&self, offset: u64, length: usize) -> io::Result<Buffer>;
}

/// A file on the local filesystem.
#[derive(Debug)]
pub struct LocalFile {
    path: PathBuf,
    file: Mutex<File>,
    size: u64,
}

impl LocalFile {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let size = file.metadata()?.len();
        Ok(Self { path, file: Mutex::new(file), size })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RandomAccessFile for LocalFile {
    fn size(&self) -> io::Result<u64> {
        Ok(self.size)
    }

    fn read_at(&self, offset: u64, length: usize) -> io::Result<Buffer> {
        check_range(self.size, offset, length)?;
        let mut file = self.file.lock().map_err(|_| io::Error::other("file lock poisoned"))?;
        file.seek(SeekFrom::Start(offset))?;
        let mut data = vec![0u8; length];
        file.read_exact(&mut data)?;
        Ok(Buffer::from_vec(data))
    }
}

/// An in-memory file. Reads are zero-copy slices of the backing buffer.
#[derive(Debug, Clone)]
pub struct BufferFile {
    buffer: Buffer,
}

impl BufferFile {
    pub fn new(buffer: Buffer) -> Self {
        Self { buffer }
    }
}

impl RandomAccessFile for BufferFile {
    fn size(&self) -> io::Result<u64> {
        Ok(self.buffer.len() as u64)
    }

    fn read_at(&self, offset: u64, length: usize) -> io::Result<Buffer> {
        check_range(self.buffer.len() as u64, offset, length)?;
        Ok(self.buffer.slice_with_length(offset as usize, length))
    }
}

fn check_range(size: u64, offset: u64, length: usize) -> io::Result<()> {
    match offset.checked_add(length as u64) {
        Some(end) if end <= size => Ok(()),
        _ => Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("read of {length} bytes at offset {offset} exceeds file size {size}"),
        )),
    }
}

type Opener = Arc<dyn Fn() -> io::Result<Arc<dyn RandomAccessFile>> + Send + Sync>;

#[derive(Clone)]
enum SourceKind {
    Local,
    Buffer(Buffer),
    Custom(Opener),
}

/// Identifies a file and knows how to open it.
#[derive(Clone)]
pub struct FileSource {
    path: String,
    kind: SourceKind,
}

impl FileSource {
    pub fn from_path(path: impl Into<String>) -> Self {
        Self { path: path.into(), kind: SourceKind::Local }
    }

    pub fn from_buffer(buffer: Buffer) -> Self {
        Self { path: "<Buffer>".to_string(), kind: SourceKind::Buffer(buffer) }
    }

    /// A source opened through `opener`, e.g. a remote object store client.
    pub fn with_opener<F>(path: impl Into<String>, opener: F) -> Self
    where
        F: Fn() -> io::Result<Arc<dyn RandomAccessFile>> + Send + Sync + 'static,
    {
        Self { path: path.into(), kind: SourceKind::Custom(Arc::new(opener)) }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn open(&self) -> Result<Arc<dyn RandomAccessFile>> {
        let file: Arc<dyn RandomAccessFile> = match &self.kind {
            SourceKind::Local => Arc::new(LocalFile::open(&self.path)?),
            SourceKind::Buffer(buffer) => Arc::new(BufferFile::new(buffer.clone())),
            SourceKind::Custom(opener) => opener().map_err(Error::Io)?,
        };
        Ok(file)
    }
}

impl fmt::Debug for FileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            SourceKind::Local => "local",
            SourceKind::Buffer(_) => "buffer",
            SourceKind::Custom(_) => "custom",
        };
        f.debug_struct("FileSource").field("path", &self.path).field("kind", &kind).finish()
    }
}

/// Where a written file ends up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLocator {
    pub path: String,
}

impl FileLocator {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}
