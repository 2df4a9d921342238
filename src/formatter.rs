//! Result formatting: every outcome shape to a stable presentable structure

use crate::error::BatchPredictionError;
use crate::schema::SchemaInfo;
use crate::table::{BatchTable, ResultTable};
use crate::types::outcome::vector_record;
use crate::types::{PredictionOutcome, Record, Value};
use tracing::error;

/// Name of the column used when the engine returns bare scalars
pub const PREDICTION_COLUMN: &str = "prediction";

/// Shape one record's outcome as a key → value mapping.
///
/// - scalar → `{prediction: v}`
/// - vector → `{prediction: v}` for a single element, else `prediction_0..n`
/// - struct → its fields, in order
/// - rows → the first row's fields
pub fn format_single(outcome: &PredictionOutcome) -> Record {
    match outcome {
        PredictionOutcome::Scalar(v) => std::iter::once((PREDICTION_COLUMN, v.clone())).collect(),
        PredictionOutcome::Vector(values) if values.len() == 1 => {
            std::iter::once((PREDICTION_COLUMN, values[0].clone())).collect()
        }
        PredictionOutcome::Vector(values) => vector_record(values.clone()),
        PredictionOutcome::Struct(record) => record.clone(),
        PredictionOutcome::Rows(rows) => rows.first().cloned().unwrap_or_default(),
    }
}

/// Append a batch outcome to its input table.
///
/// Scalar sequences become one `prediction` column; per-row structs
/// contribute their fields (union of names, first-seen order, missing
/// fields left empty). Fails when the outcome does not cover exactly one row
/// per input row.
pub fn format_batch(
    input: &BatchTable,
    outcome: &PredictionOutcome,
) -> Result<ResultTable, BatchPredictionError> {
    let expected = input.len();
    let actual = outcome.row_count();
    if actual != expected {
        error!(expected, actual, "Engine broke row alignment");
        return Err(BatchPredictionError::RowCountMismatch { expected, actual });
    }

    let (columns, rows) = match outcome {
        PredictionOutcome::Scalar(v) => (vec![PREDICTION_COLUMN.to_string()], vec![vec![v.clone()]]),
        PredictionOutcome::Vector(values) => (
            vec![PREDICTION_COLUMN.to_string()],
            values.iter().map(|v| vec![v.clone()]).collect(),
        ),
        PredictionOutcome::Struct(record) => struct_columns(std::slice::from_ref(record)),
        PredictionOutcome::Rows(records) => struct_columns(records),
    };

    Ok(ResultTable::assemble(input, columns, rows))
}

/// Result for a header-only batch.
///
/// Prediction columns come from the model's declared outputs so the shape
/// matches what a non-empty batch produces; `prediction` when none are declared.
pub fn format_empty_batch(input: &BatchTable, schema: &SchemaInfo) -> ResultTable {
    let columns = if schema.outputs().is_empty() {
        vec![PREDICTION_COLUMN.to_string()]
    } else {
        schema.outputs().iter().map(|f| f.name().to_string()).collect()
    };
    ResultTable::assemble(input, columns, Vec::new())
}

fn struct_columns(records: &[Record]) -> (Vec<String>, Vec<Vec<Value>>) {
    let mut columns: Vec<String> = Vec::new();
    for record in records {
        for name in record.names() {
            if !columns.iter().any(|c| c == name) {
                columns.push(name.to_string());
            }
        }
    }

    let rows = records
        .iter()
        .map(|record| {
            columns
                .iter()
                .map(|c| record.get(c).cloned().unwrap_or(Value::Missing))
                .collect()
        })
        .collect();

    (columns, rows)
}
