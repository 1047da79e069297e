use arrow::error::ArrowError;
use thiserror::Error;

/// Unified error type for Igloo crates.
#[derive(Debug, Error)]
pub enum Error {
    #[error("An unknown error occurred: {0}")]
    Unknown(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),
    #[error("Invalid file: {0}")]
    Invalid(String),
    /// A source could not be opened as a file of the given format.
    #[error("Could not open {format} input source '{path}': {source}")]
    Open {
        format: &'static str,
        path: String,
        #[source]
        source: Box<Error>,
    },
    #[error("Ambiguous field reference '{path}': matched {matches} fields")]
    AmbiguousProjection { path: String, matches: usize },
    #[error("Mismatching format/write options: expected {expected}, got {actual}")]
    OptionMismatch { expected: String, actual: String },
    #[error("Cannot write to a file writer that has already been finished")]
    WriteAfterFinish,
    #[error("File writer has already been finished")]
    DoubleFinish,
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Task was cancelled before it produced a result")]
    Cancelled,
    #[error("Execution error: {0}")]
    Execution(String),
    #[error("Operation not supported: {0}")]
    NotSupported(String),
    #[error("Failed to load configuration: {0}")]
    Config(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn new(msg: &str) -> Self {
        Error::Unknown(msg.to_string())
    }

    /// Annotates an open failure with the format and the path of the source.
    pub fn open(format: &'static str, path: impl Into<String>, source: Error) -> Self {
        Error::Open { format, path: path.into(), source: Box::new(source) }
    }
}
