use arrow::buffer::Buffer;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use async_trait::async_trait;
use igloo_common::{Error, Result};
use igloo_dataset::{
    Expression, FileFormat, FileFragment, FileLocator, FileSource, FileWriteOptions, FileWriter,
    FormatRegistry, FragmentScanOptions, RecordBatchGenerator, ScanOptions, ScanTask,
    ScanTaskIterator,
};
use std::any::Any;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Recognizes buffers starting with a fixed prefix.
#[derive(Debug)]
struct PrefixFormat {
    name: &'static str,
    prefix: &'static [u8],
    inspections: AtomicUsize,
}

impl PrefixFormat {
    fn new(name: &'static str, prefix: &'static [u8]) -> Self {
        Self { name, prefix, inspections: AtomicUsize::new(0) }
    }
}

#[derive(Debug)]
struct NoWriteOptions;

impl FileWriteOptions for NoWriteOptions {
    fn format(&self) -> Arc<dyn FileFormat> {
        Arc::new(PrefixFormat::new("none", b""))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[async_trait]
impl FileFormat for PrefixFormat {
    fn type_name(&self) -> &str {
        self.name
    }

    fn default_fragment_scan_options(&self) -> Option<Arc<dyn FragmentScanOptions>> {
        None
    }

    fn is_supported(&self, source: &FileSource) -> Result<bool> {
        let Ok(file) = source.open() else {
            return Ok(false);
        };
        let len = self.prefix.len();
        Ok(file.read_at(0, len).map(|head| head.as_slice() == self.prefix).unwrap_or(false))
    }

    fn inspect(&self, _source: &FileSource) -> Result<SchemaRef> {
        self.inspections.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(Schema::new(vec![Field::new(self.name, DataType::Utf8, true)])))
    }

    fn scan_file(&self, _: Arc<ScanOptions>, _: Arc<FileFragment>) -> Result<ScanTaskIterator> {
        Ok(Box::new(std::iter::empty::<Result<Arc<dyn ScanTask>>>()))
    }

    async fn scan_batches_async(
        &self,
        _: Arc<ScanOptions>,
        _: Arc<FileFragment>,
    ) -> Result<RecordBatchGenerator> {
        Err(Error::NotSupported("async scan".into()))
    }

    async fn count_rows(
        &self,
        _: Arc<FileFragment>,
        _: Expression,
        _: Arc<ScanOptions>,
    ) -> Result<Option<i64>> {
        Ok(Some(42))
    }

    fn default_write_options(self: Arc<Self>) -> Arc<dyn FileWriteOptions> {
        Arc::new(NoWriteOptions)
    }

    fn make_writer(
        &self,
        _: Box<dyn Write + Send>,
        _: SchemaRef,
        _: Arc<dyn FileWriteOptions>,
        _: FileLocator,
    ) -> Result<Box<dyn FileWriter>> {
        Err(Error::NotSupported("write".into()))
    }
}

fn registry() -> FormatRegistry {
    let mut registry = FormatRegistry::new();
    registry.register(Arc::new(PrefixFormat::new("alpha", b"AAAA"))).unwrap();
    registry.register(Arc::new(PrefixFormat::new("beta", b"BBBB"))).unwrap();
    registry
}

#[test]
fn formats_are_found_by_name() {
    let registry = registry();

    assert_eq!(registry.get("beta").unwrap().type_name(), "beta");
    assert!(registry.get("gamma").is_none());
}

#[test]
fn registering_a_name_twice_fails() {
    let mut registry = registry();

    let err = registry.register(Arc::new(PrefixFormat::new("alpha", b"ZZ"))).unwrap_err();

    assert!(matches!(err, Error::InvalidArgument(_)));
}

#[test]
fn detect_picks_the_first_supporting_format() {
    let registry = registry();
    let beta = FileSource::from_buffer(Buffer::from_vec(b"BBBB rest".to_vec()));
    let unknown = FileSource::from_buffer(Buffer::from_vec(b"CC".to_vec()));
    let missing = FileSource::from_path("/definitely/not/here.bin");

    assert_eq!(registry.detect(&beta).unwrap().unwrap().type_name(), "beta");
    assert!(registry.detect(&unknown).unwrap().is_none());
    assert!(registry.detect(&missing).unwrap().is_none());
}

#[test]
fn formats_compare_by_name() {
    let a = PrefixFormat::new("alpha", b"A");
    let also_a = PrefixFormat::new("alpha", b"Z");
    let b = PrefixFormat::new("beta", b"A");

    assert!(a.equals(&also_a));
    assert!(!a.equals(&b));
}

#[test]
fn fragment_inspects_its_schema_once() -> anyhow::Result<()> {
    let format = Arc::new(PrefixFormat::new("alpha", b"AAAA"));
    let fragment = FileFragment::new(FileSource::from_path("/data/a"), format.clone());

    let first = fragment.read_physical_schema()?;
    let second = fragment.read_physical_schema()?;

    assert_eq!(first, second);
    assert_eq!(first.field(0).name(), "alpha");
    assert_eq!(format.inspections.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn fragment_delegates_to_its_format() -> anyhow::Result<()> {
    let fragment = Arc::new(FileFragment::new(
        FileSource::from_path("/data/a"),
        Arc::new(PrefixFormat::new("alpha", b"AAAA")),
    ));
    let options = Arc::new(ScanOptions::default());

    assert_eq!(fragment.count_rows(Expression::default(), options.clone()).await?, Some(42));
    assert_eq!(fragment.scan(options.clone())?.count(), 0);
    assert!(matches!(
        fragment.scan_batches_async(options).await,
        Err(Error::NotSupported(_))
    ));
    assert_eq!(fragment.format().type_name(), "alpha");
    assert_eq!(fragment.source().path(), "/data/a");
    Ok(())
}
