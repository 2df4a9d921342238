//! Delimited tabular input and output

use crate::error::{ExportError, TableParseError};
use crate::schema::SchemaInfo;
use crate::types::{Record, Value};
use csv::{ReaderBuilder, WriterBuilder};
use serde::Serialize;
use std::collections::HashSet;
use std::io::Read;
use tracing::debug;

/// Byte form of a field delimiter; `None` for non-ASCII, quote or line breaks.
pub fn delimiter_byte(delimiter: char) -> Option<u8> {
    if delimiter.is_ascii() && delimiter != '"' && delimiter != '\n' && delimiter != '\r' {
        Some(delimiter as u8)
    } else {
        None
    }
}

/// Rows of raw cells under a header, in input order.
///
/// Cells are kept as the text that was read; typing happens per model
/// schema at scoring time. Short rows are padded with empty cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl BatchTable {
    /// Build a table in memory. Rows shorter than the header are padded.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self, TableParseError> {
        validate_header(&columns)?;
        let width = columns.len();
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(i, mut row)| {
                if row.len() > width {
                    return Err(TableParseError::TooManyFields {
                        line: i as u64 + 2,
                        expected: width,
                        found: row.len(),
                    });
                }
                row.resize(width, String::new());
                Ok(row)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { columns, rows })
    }

    /// Parse delimited text with a header row.
    pub fn parse(text: &str, delimiter: char) -> Result<Self, TableParseError> {
        Self::from_reader(text.as_bytes(), delimiter)
    }

    pub fn from_reader<R: Read>(reader: R, delimiter: char) -> Result<Self, TableParseError> {
        let delim = delimiter_byte(delimiter).ok_or(TableParseError::InvalidDelimiter(delimiter))?;
        let mut reader = ReaderBuilder::new()
            .delimiter(delim)
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let columns: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        if columns.is_empty() || columns.iter().all(String::is_empty) {
            return Err(TableParseError::MissingHeader);
        }
        validate_header(&columns)?;

        let width = columns.len();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            if record.len() > width {
                return Err(TableParseError::TooManyFields {
                    line: record.position().map_or(0, |p| p.line()),
                    expected: width,
                    found: record.len(),
                });
            }
            let mut row: Vec<String> = record.iter().map(str::to_string).collect();
            row.resize(width, String::new());
            rows.push(row);
        }

        debug!(columns = width, rows = rows.len(), "Parsed batch table");
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// First `n` rows, for previews.
    pub fn head(&self, n: usize) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }
}

fn validate_header(columns: &[String]) -> Result<(), TableParseError> {
    if columns.is_empty() {
        return Err(TableParseError::MissingHeader);
    }
    let mut seen = HashSet::new();
    for (index, name) in columns.iter().enumerate() {
        if name.is_empty() {
            return Err(TableParseError::EmptyColumnName { index: index + 1 });
        }
        if !seen.insert(name.as_str()) {
            return Err(TableParseError::DuplicateColumn(name.clone()));
        }
    }
    Ok(())
}

/// Input rows with prediction columns appended.
///
/// Row `i` always corresponds to row `i` of the input table. Input cells are
/// carried through unchanged as strings; prediction cells keep their types.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultTable {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    input_columns: usize,
}

impl ResultTable {
    /// Concatenate input rows with prediction rows column-wise.
    ///
    /// Callers guarantee `predictions.len() == input.len()`. Prediction column
    /// names that clash with an input column get a numeric suffix.
    pub(crate) fn assemble(
        input: &BatchTable,
        prediction_columns: Vec<String>,
        predictions: Vec<Vec<Value>>,
    ) -> Self {
        debug_assert_eq!(input.len(), predictions.len());

        let mut columns = input.columns.clone();
        for name in prediction_columns {
            let unique = unique_name(&name, &columns);
            columns.push(unique);
        }

        let rows = input
            .rows
            .iter()
            .zip(predictions)
            .map(|(cells, prediction)| {
                cells
                    .iter()
                    .map(|c| Value::String(c.clone()))
                    .chain(prediction)
                    .collect()
            })
            .collect();

        Self {
            columns,
            rows,
            input_columns: input.columns.len(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Columns appended from the model outcome.
    pub fn prediction_columns(&self) -> &[String] {
        &self.columns[self.input_columns..]
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows as name → value records, for JSON display.
    pub fn to_records(&self) -> Vec<Record> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect()
            })
            .collect()
    }

    /// Export as delimited text: input columns first, predictions last.
    pub fn to_delimited(&self, delimiter: char) -> Result<String, ExportError> {
        write_delimited(&self.columns, self.rows.iter().map(|r| r.iter().map(Value::to_string)), delimiter)
    }
}

fn unique_name(name: &str, taken: &[String]) -> String {
    if !taken.iter().any(|c| c == name) {
        return name.to_string();
    }
    (1..)
        .map(|i| format!("{name}_{i}"))
        .find(|candidate| !taken.iter().any(|c| c == candidate))
        .unwrap_or_else(|| name.to_string())
}

fn write_delimited<R, C>(columns: &[String], rows: R, delimiter: char) -> Result<String, ExportError>
where
    R: Iterator<Item = C>,
    C: Iterator<Item = String>,
{
    let delim = delimiter_byte(delimiter).ok_or(ExportError::InvalidDelimiter(delimiter))?;
    let mut writer = WriterBuilder::new()
        .delimiter(delim)
        .from_writer(Vec::new());

    writer.write_record(columns)?;
    for row in rows {
        writer.write_record(row.collect::<Vec<_>>())?;
    }

    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    Ok(String::from_utf8(bytes)?)
}

/// Header-only delimited text listing a model's declared inputs.
pub fn batch_template(schema: &SchemaInfo, delimiter: char) -> Result<String, ExportError> {
    let columns: Vec<String> = schema.inputs().iter().map(|f| f.name().to_string()).collect();
    write_delimited(&columns, std::iter::empty::<std::iter::Empty<String>>(), delimiter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DataType, FieldDescriptor};

    #[test]
    fn test_parse_pads_short_rows() {
        let table = BatchTable::parse("age,city\n34,NY\n41\n,LA\n", ',').unwrap();
        assert_eq!(table.columns(), &["age", "city"]);
        assert_eq!(table.len(), 3);
        assert_eq!(table.rows()[1], vec!["41".to_string(), String::new()]);
        assert_eq!(table.rows()[2], vec![String::new(), "LA".to_string()]);
    }

    #[test]
    fn test_header_only_is_empty_table() {
        let table = BatchTable::parse("age,city\n", ',').unwrap();
        assert!(table.is_empty());
        assert_eq!(table.columns().len(), 2);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            BatchTable::parse("", ','),
            Err(TableParseError::MissingHeader)
        ));
        assert!(matches!(
            BatchTable::parse("a,a\n1,2\n", ','),
            Err(TableParseError::DuplicateColumn(name)) if name == "a"
        ));
        assert!(matches!(
            BatchTable::parse("a,,b\n1,2,3\n", ','),
            Err(TableParseError::EmptyColumnName { index: 2 })
        ));
        assert!(matches!(
            BatchTable::parse("a,b\n1,2\n1,2,3\n", ','),
            Err(TableParseError::TooManyFields { line: 3, expected: 2, found: 3 })
        ));
        assert!(matches!(
            BatchTable::parse("a,b\n", 'é'),
            Err(TableParseError::InvalidDelimiter('é'))
        ));
    }

    #[test]
    fn test_delimiter_byte() {
        assert_eq!(delimiter_byte(','), Some(b','));
        assert_eq!(delimiter_byte('\t'), Some(b'\t'));
        assert_eq!(delimiter_byte('"'), None);
        assert_eq!(delimiter_byte('\n'), None);
        assert_eq!(delimiter_byte('é'), None);
    }

    #[test]
    fn test_semicolon_delimiter_and_quoting() {
        let table = BatchTable::parse("name;note\n\"Smith; J\";\"said \"\"hi\"\"\"\n", ';').unwrap();
        assert_eq!(table.rows()[0][0], "Smith; J");
        assert_eq!(table.rows()[0][1], "said \"hi\"");
    }

    #[test]
    fn test_assemble_renames_clashing_columns() {
        let input = BatchTable::new(
            vec!["x".into(), "prediction".into()],
            vec![vec!["1".into(), "old".into()]],
        )
        .unwrap();

        let result = ResultTable::assemble(
            &input,
            vec!["prediction".into()],
            vec![vec![Value::Float(2.0)]],
        );
        assert_eq!(result.columns(), &["x", "prediction", "prediction_1"]);
        assert_eq!(result.prediction_columns(), &["prediction_1"]);
        assert_eq!(result.rows()[0][1], Value::String("old".into()));
    }

    #[test]
    fn test_export_round_trip() {
        let input = BatchTable::parse("id,city,age\n1,\"New York, NY\",34\n2,,41.5\n", ',').unwrap();
        let result = ResultTable::assemble(
            &input,
            vec!["predicted".into(), "label".into()],
            vec![
                vec![Value::Float(0.25), Value::from("low")],
                vec![Value::Float(1e-3), Value::Missing],
            ],
        );

        let text = result.to_delimited(',').unwrap();
        let reparsed = BatchTable::parse(&text, ',').unwrap();

        assert_eq!(reparsed.columns(), result.columns());
        assert_eq!(reparsed.len(), result.len());
        for (original, parsed) in result.rows().iter().zip(reparsed.rows()) {
            let original: Vec<String> = original.iter().map(Value::to_string).collect();
            assert_eq!(&original, parsed);
        }
        assert_eq!(reparsed.rows()[0][1], "New York, NY");
    }

    #[test]
    fn test_to_records() {
        let input = BatchTable::parse("a\n1\n", ',').unwrap();
        let result = ResultTable::assemble(&input, vec!["p".into()], vec![vec![Value::Integer(5)]]);

        let records = result.to_records();
        assert_eq!(records[0].get("a"), Some(&Value::String("1".into())));
        assert_eq!(records[0].get("p"), Some(&Value::Integer(5)));
    }

    #[test]
    fn test_batch_template() {
        let schema = SchemaInfo::new(
            vec![
                FieldDescriptor::new("age", DataType::Float).unwrap(),
                FieldDescriptor::new("city", DataType::String).unwrap(),
            ],
            Vec::new(),
        );
        assert_eq!(batch_template(&schema, ',').unwrap(), "age,city\n");
        assert_eq!(batch_template(&schema, '\t').unwrap(), "age\tcity\n");
    }
}
