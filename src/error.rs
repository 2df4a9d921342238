//! Error taxonomy for the inference orchestrator.
//!
//! Every failure a caller can observe is one of these values. None of them
//! is fatal to the process; the shell turns them into user-facing messages.

/// Failure to turn a serialized model into a usable handle.
#[derive(Debug, thiserror::Error)]
pub enum ModelLoadError {
    #[error("model artifact is empty")]
    Empty,

    #[error("model artifact is not valid UTF-8 text: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    #[error("malformed model document: {0}")]
    Malformed(String),

    #[error("unsupported model type: {0}")]
    Unsupported(String),
}

/// A single input value that could not be coerced to its declared type.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid value for field '{field}': {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// The scoring engine rejected or failed on a single record.
#[derive(Debug, Clone, thiserror::Error)]
#[error("prediction failed: {message}")]
pub struct PredictionError {
    /// Diagnostic text as reported by the engine, with its cause chain.
    pub message: String,
    /// Full cause chain (and backtrace, when captured) for display.
    pub trace: String,
}

impl PredictionError {
    pub(crate) fn from_engine(err: &anyhow::Error) -> Self {
        Self {
            message: format!("{err:#}"),
            trace: format!("{err:?}"),
        }
    }

    pub(crate) fn from_panic(message: String) -> Self {
        Self {
            trace: format!("scoring engine panicked: {message}"),
            message,
        }
    }
}

/// Batch scoring failed for the whole table. Partial results are never exposed.
#[derive(Debug, thiserror::Error)]
pub enum BatchPredictionError {
    #[error("no model is loaded")]
    NoModel,

    #[error("input table is missing model input column(s): {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("row {row}: {source}")]
    Validation {
        row: usize,
        #[source]
        source: ValidationError,
    },

    #[error("batch scoring failed: {message}")]
    Engine { message: String, trace: String },

    #[error("internal error: engine returned {actual} rows for {expected} input rows")]
    RowCountMismatch { expected: usize, actual: usize },
}

impl BatchPredictionError {
    pub(crate) fn engine(err: PredictionError) -> Self {
        Self::Engine {
            message: err.message,
            trace: err.trace,
        }
    }

    /// Trace text suitable for an expandable "details" view.
    pub fn trace(&self) -> Option<&str> {
        match self {
            Self::Engine { trace, .. } => Some(trace),
            _ => None,
        }
    }
}

/// Malformed delimited input, reported before any scoring.
#[derive(Debug, thiserror::Error)]
pub enum TableParseError {
    #[error("table has no header row")]
    MissingHeader,

    #[error("header column {index} is empty")]
    EmptyColumnName { index: usize },

    #[error("duplicate column name '{0}'")]
    DuplicateColumn(String),

    #[error("line {line}: expected at most {expected} fields, found {found}")]
    TooManyFields {
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error("invalid delimiter {0:?}: must be a single ASCII character")]
    InvalidDelimiter(char),

    #[error("failed to read delimited text: {0}")]
    Csv(#[from] csv::Error),
}

/// Failure to write a result table as delimited text.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("invalid delimiter {0:?}: must be a single ASCII character")]
    InvalidDelimiter(char),

    #[error("failed to write delimited text: {0}")]
    Csv(#[from] csv::Error),

    #[error("exported text is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),

    #[error("failed to flush export buffer: {0}")]
    Io(#[from] std::io::Error),
}
