//! Type definitions shared across the orchestrator

pub mod field;
pub mod outcome;
pub mod record;

pub use field::{DataType, FieldDescriptor, RawField};
pub use outcome::PredictionOutcome;
pub use record::{RawValue, Record, Value};
