//! Single-record and batch prediction

use crate::coercer::Coercer;
use crate::config::BatchMode;
use crate::error::{BatchPredictionError, PredictionError};
use crate::formatter;
use crate::models::engine::Model;
use crate::models::loader::ModelHandle;
use crate::table::{BatchTable, ResultTable};
use crate::types::{PredictionOutcome, Record, Value};
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error, info};

/// Runs validated records through a model handle
#[derive(Debug, Clone, Copy, Default)]
pub struct Predictor {
    batch_mode: BatchMode,
}

impl Predictor {
    pub fn new(batch_mode: BatchMode) -> Self {
        Self { batch_mode }
    }

    /// Score exactly one record.
    ///
    /// Engine errors and engine panics both come back as [`PredictionError`].
    pub fn predict_one(
        &self,
        handle: &ModelHandle,
        record: &Record,
    ) -> Result<PredictionOutcome, PredictionError> {
        let outcome = score_guarded(handle.model(), record).inspect_err(|e| {
            error!(model = %handle.info().name, error = %e.message, "Prediction failed");
        })?;

        if let PredictionOutcome::Rows(rows) = &outcome {
            if rows.len() != 1 {
                let err = PredictionError {
                    message: format!("engine returned {} rows for a single record", rows.len()),
                    trace: format!("{outcome:?}"),
                };
                error!(model = %handle.info().name, error = %err.message, "Prediction failed");
                return Err(err);
            }
        }

        debug!(model = %handle.info().name, "Single prediction complete");
        Ok(outcome)
    }

    /// Score every row of a table and append the predictions.
    ///
    /// Rows are coerced against the model schema first; the first invalid
    /// row fails the whole batch before anything is scored. Scoring is
    /// all-or-nothing as well.
    pub fn predict_batch(
        &self,
        handle: &ModelHandle,
        table: &BatchTable,
        coercer: &Coercer,
    ) -> Result<ResultTable, BatchPredictionError> {
        let records = self.coerce_rows(handle, table, coercer)?;

        let result = if records.is_empty() {
            formatter::format_empty_batch(table, handle.schema())
        } else {
            let outcome = self.score_rows(handle, &records)?;
            formatter::format_batch(table, &outcome)?
        };

        info!(
            model = %handle.info().name,
            rows = result.len(),
            prediction_columns = result.prediction_columns().len(),
            "Batch prediction complete"
        );
        Ok(result)
    }

    fn coerce_rows(
        &self,
        handle: &ModelHandle,
        table: &BatchTable,
        coercer: &Coercer,
    ) -> Result<Vec<Record>, BatchPredictionError> {
        let schema = handle.schema();

        // Without declared inputs every column goes to the engine, typed by content.
        if schema.is_manual_entry() {
            return Ok(table
                .rows()
                .iter()
                .map(|cells| {
                    table
                        .columns()
                        .iter()
                        .zip(cells)
                        .map(|(name, cell)| (name.clone(), Value::infer(cell)))
                        .collect()
                })
                .collect());
        }

        let missing: Vec<String> = schema
            .inputs()
            .iter()
            .filter(|f| !table.has_column(f.name()))
            .map(|f| f.name().to_string())
            .collect();
        if !missing.is_empty() {
            return Err(BatchPredictionError::MissingColumns(missing));
        }

        table
            .rows()
            .iter()
            .enumerate()
            .map(|(i, cells)| {
                coercer
                    .coerce_row(schema, table.columns(), cells)
                    .map_err(|source| BatchPredictionError::Validation { row: i + 1, source })
            })
            .collect()
    }

    fn score_rows(
        &self,
        handle: &ModelHandle,
        records: &[Record],
    ) -> Result<PredictionOutcome, BatchPredictionError> {
        let model = handle.model();

        if self.batch_mode == BatchMode::Auto {
            if let Some(outcome) = score_batch_guarded(model, records) {
                debug!(model = %handle.info().name, rows = records.len(), "Scored batch as one unit");
                return outcome.map_err(|e| {
                    error!(model = %handle.info().name, error = %e.message, "Batch prediction failed");
                    BatchPredictionError::engine(e)
                });
            }
        }

        let mut outcomes = Vec::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            let outcome = score_guarded(model, record).map_err(|e| {
                error!(model = %handle.info().name, row = i + 1, error = %e.message, "Batch prediction failed");
                BatchPredictionError::engine(PredictionError {
                    message: format!("row {}: {}", i + 1, e.message),
                    trace: e.trace,
                })
            })?;
            if let PredictionOutcome::Rows(rows) = &outcome {
                if rows.len() != 1 {
                    return Err(BatchPredictionError::RowCountMismatch {
                        expected: 1,
                        actual: rows.len(),
                    });
                }
            }
            outcomes.push(outcome);
        }

        Ok(PredictionOutcome::collect_rows(outcomes))
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

fn score_guarded(model: &dyn Model, record: &Record) -> Result<PredictionOutcome, PredictionError> {
    match panic::catch_unwind(AssertUnwindSafe(|| model.score(record))) {
        Ok(Ok(outcome)) => Ok(outcome),
        Ok(Err(e)) => Err(PredictionError::from_engine(&e)),
        Err(payload) => Err(PredictionError::from_panic(panic_message(payload))),
    }
}

fn score_batch_guarded(
    model: &dyn Model,
    records: &[Record],
) -> Option<Result<PredictionOutcome, PredictionError>> {
    match panic::catch_unwind(AssertUnwindSafe(|| model.score_batch(records))) {
        Ok(None) => None,
        Ok(Some(Ok(outcome))) => Some(Ok(outcome)),
        Ok(Some(Err(e))) => Some(Err(PredictionError::from_engine(&e))),
        Err(payload) => Some(Err(PredictionError::from_panic(panic_message(payload)))),
    }
}
