//! PMML Predictor Library
//!
//! Loads a declarative predictive model (PMML), introspects its input and
//! output fields, validates user values against them, and scores single
//! records or delimited batches into a stable tabular result.

pub mod coercer;
pub mod config;
pub mod error;
pub mod formatter;
pub mod metrics;
pub mod models;
pub mod schema;
pub mod session;
pub mod table;
pub mod types;

pub use coercer::{Coercer, ManualEntry};
pub use config::AppConfig;
pub use error::{
    BatchPredictionError, ExportError, ModelLoadError, PredictionError, TableParseError,
    ValidationError,
};
pub use models::{ModelHandle, ModelInfo, ModelLoader, Predictor};
pub use schema::{SchemaIncomplete, SchemaInfo};
pub use session::{DeclareTypeError, Session, SinglePredictionError};
pub use table::{BatchTable, ResultTable};
pub use types::{DataType, FieldDescriptor, PredictionOutcome, RawValue, Record, Value};
