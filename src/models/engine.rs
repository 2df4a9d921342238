//! Scoring engine boundary
//!
//! The orchestrator never evaluates model semantics itself. It talks to an
//! engine through these two traits, which keeps engine-specific object
//! models (optional attributes, loosely typed field objects) out of the rest
//! of the crate.

use crate::error::ModelLoadError;
use crate::types::{PredictionOutcome, RawField, Record};

/// Turns a model document into a scorable [`Model`].
pub trait ScoringEngine {
    /// Short engine name for logs and model info.
    fn name(&self) -> &str;

    /// Parse a model document. Must not return a partially usable model.
    fn load(&self, document: &str) -> Result<Box<dyn Model>, ModelLoadError>;
}

/// A parsed model as exposed by its engine.
///
/// Implementations need not be thread-safe; a model is owned by exactly one
/// session.
pub trait Model {
    /// Model element kind, e.g. `RegressionModel`.
    fn kind(&self) -> &str;

    /// Mining function (`regression`, `classification`, ...), when declared.
    fn function_name(&self) -> Option<&str> {
        None
    }

    /// Free-text description carried by the document, if any.
    fn description(&self) -> Option<String> {
        None
    }

    /// Declared input fields in order, or `None` when the engine cannot tell.
    fn input_fields(&self) -> Option<Vec<RawField>>;

    /// Declared output fields in order, or `None` when the engine cannot tell.
    fn output_fields(&self) -> Option<Vec<RawField>>;

    /// Score exactly one record.
    fn score(&self, record: &Record) -> anyhow::Result<PredictionOutcome>;

    /// Vectorized scoring hook. Engines without one return `None` and are
    /// scored row by row.
    fn score_batch(&self, records: &[Record]) -> Option<anyhow::Result<PredictionOutcome>> {
        let _ = records;
        None
    }
}
