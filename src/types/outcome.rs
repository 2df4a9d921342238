//! Raw outcome shapes a scoring engine can hand back

use crate::types::record::{Record, Value};

/// What the engine produced for one record or for a whole batch.
///
/// Single-record scoring yields `Scalar`, `Vector` or `Struct`; batch
/// scoring yields `Vector` (one scalar per row) or `Rows` (one struct per
/// row). The formatter normalises every shape.
#[derive(Debug, Clone, PartialEq)]
pub enum PredictionOutcome {
    Scalar(Value),
    Vector(Vec<Value>),
    Struct(Record),
    Rows(Vec<Record>),
}

impl PredictionOutcome {
    /// Number of rows this outcome covers when read as a batch result.
    pub fn row_count(&self) -> usize {
        match self {
            PredictionOutcome::Scalar(_) | PredictionOutcome::Struct(_) => 1,
            PredictionOutcome::Vector(values) => values.len(),
            PredictionOutcome::Rows(rows) => rows.len(),
        }
    }

    /// Collect per-row single outcomes into one batch outcome.
    ///
    /// Scalars collapse into a `Vector`; anything structured becomes `Rows`.
    pub fn collect_rows(outcomes: Vec<PredictionOutcome>) -> PredictionOutcome {
        if outcomes
            .iter()
            .all(|o| matches!(o, PredictionOutcome::Scalar(_)))
        {
            let values = outcomes
                .into_iter()
                .filter_map(|o| match o {
                    PredictionOutcome::Scalar(v) => Some(v),
                    _ => None,
                })
                .collect();
            return PredictionOutcome::Vector(values);
        }

        let rows = outcomes
            .into_iter()
            .map(|o| match o {
                PredictionOutcome::Scalar(v) => std::iter::once(("prediction", v)).collect(),
                PredictionOutcome::Struct(r) => r,
                PredictionOutcome::Vector(values) => vector_record(values),
                // Callers check that each per-row outcome covers exactly one row.
                PredictionOutcome::Rows(rows) => rows.into_iter().next().unwrap_or_default(),
            })
            .collect();
        PredictionOutcome::Rows(rows)
    }
}

/// Spread a vector across `prediction_0..n` columns.
pub(crate) fn vector_record(values: Vec<Value>) -> Record {
    values
        .into_iter()
        .enumerate()
        .map(|(i, v)| (format!("prediction_{i}"), v))
        .collect()
}
