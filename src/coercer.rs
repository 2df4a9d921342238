//! Record validation and coercion.
//!
//! Raw user values (form text or numbers) are checked against the model's
//! declared input types and turned into a typed [`Record`]. A record that
//! fails here never reaches the scoring engine.
//!
//! Defaults for absent values: `0` for integers, `0.0` for floats, the empty
//! string for strings. Keys that are not declared inputs are dropped.

use crate::config::{ManualEntryConfig, UnknownTypePolicy};
use crate::error::ValidationError;
use crate::schema::SchemaInfo;
use crate::types::{DataType, RawValue, Record, Value};
use std::collections::HashSet;
use tracing::debug;

/// Coerces raw values against a schema
#[derive(Debug, Clone, Copy, Default)]
pub struct Coercer {
    unknown: UnknownTypePolicy,
}

impl Coercer {
    pub fn new(unknown: UnknownTypePolicy) -> Self {
        Self { unknown }
    }

    pub fn unknown_policy(&self) -> UnknownTypePolicy {
        self.unknown
    }

    /// Coerce a name → value mapping. When a name repeats, the last value wins.
    pub fn coerce(
        &self,
        schema: &SchemaInfo,
        raw: &[(String, RawValue)],
    ) -> Result<Record, ValidationError> {
        for (name, _) in raw {
            if schema.input(name).is_none() {
                debug!(field = %name, "Ignoring value for undeclared input");
            }
        }

        self.coerce_by(schema, |name| {
            raw.iter()
                .rev()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone())
        })
    }

    /// Coerce one row of a delimited table. Missing columns read as absent.
    pub fn coerce_row(
        &self,
        schema: &SchemaInfo,
        columns: &[String],
        cells: &[String],
    ) -> Result<Record, ValidationError> {
        self.coerce_by(schema, |name| {
            columns
                .iter()
                .position(|c| c == name)
                .and_then(|i| cells.get(i))
                .map(|cell| RawValue::Text(cell.clone()))
        })
    }

    fn coerce_by<F>(&self, schema: &SchemaInfo, lookup: F) -> Result<Record, ValidationError>
    where
        F: Fn(&str) -> Option<RawValue>,
    {
        let mut record = Record::with_capacity(schema.inputs().len());

        for field in schema.inputs() {
            let raw = lookup(field.name()).filter(|v| !is_blank(v));
            let value = self.coerce_value(field.name(), field.data_type(), raw.as_ref())?;
            record.insert(field.name(), value);
        }

        Ok(record)
    }

    fn coerce_value(
        &self,
        name: &str,
        data_type: DataType,
        raw: Option<&RawValue>,
    ) -> Result<Value, ValidationError> {
        match data_type {
            DataType::Integer => coerce_integer(name, raw),
            DataType::Float => coerce_float(name, raw),
            DataType::String => Ok(match raw {
                Some(RawValue::Text(s)) => Value::String(s.clone()),
                Some(RawValue::Number(n)) => Value::String(Value::Float(*n).to_string()),
                None => Value::String(String::new()),
            }),
            DataType::Unknown => match self.unknown {
                UnknownTypePolicy::Float => coerce_float(name, raw),
                UnknownTypePolicy::RequireDeclared => Err(ValidationError::new(
                    name,
                    "type not declared by the model; declare a type for this field",
                )),
            },
        }
    }
}

fn is_blank(raw: &RawValue) -> bool {
    matches!(raw, RawValue::Text(s) if s.trim().is_empty())
}

fn coerce_integer(name: &str, raw: Option<&RawValue>) -> Result<Value, ValidationError> {
    let not_integer = || ValidationError::new(name, "not an integer");

    match raw {
        None => Ok(Value::Integer(0)),
        Some(RawValue::Number(n)) => whole_number(*n).ok_or_else(not_integer),
        Some(RawValue::Text(s)) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                return Ok(Value::Integer(i));
            }
            s.parse::<f64>()
                .ok()
                .and_then(whole_number)
                .ok_or_else(not_integer)
        }
    }
}

fn whole_number(n: f64) -> Option<Value> {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Some(Value::Integer(n as i64))
    } else {
        None
    }
}

fn coerce_float(name: &str, raw: Option<&RawValue>) -> Result<Value, ValidationError> {
    match raw {
        None => Ok(Value::Float(0.0)),
        Some(RawValue::Number(n)) => Ok(Value::Float(*n)),
        Some(RawValue::Text(s)) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| ValidationError::new(name, "not a number")),
    }
}

/// Degraded entry mode for models that expose no input fields.
///
/// The user names the fields; every value is numeric.
#[derive(Debug, Clone)]
pub struct ManualEntry {
    default_fields: usize,
    max_fields: usize,
}

impl ManualEntry {
    pub fn new(config: &ManualEntryConfig) -> Self {
        let max_fields = config.max_fields.max(1);
        Self {
            default_fields: config.default_fields.clamp(1, max_fields),
            max_fields,
        }
    }

    pub fn max_fields(&self) -> usize {
        self.max_fields
    }

    /// Placeholder names `feature_1..feature_n`; `n` is clamped to `1..=max_fields`
    /// and defaults to the configured count.
    pub fn default_names(&self, count: Option<usize>) -> Vec<String> {
        let n = count
            .unwrap_or(self.default_fields)
            .clamp(1, self.max_fields);
        (1..=n).map(|i| format!("feature_{i}")).collect()
    }

    /// Coerce user-declared fields. Blank names are skipped; duplicate names
    /// and non-numeric values are rejected.
    pub fn coerce(&self, entries: &[(String, RawValue)]) -> Result<Record, ValidationError> {
        if entries.len() > self.max_fields {
            return Err(ValidationError::new(
                "<manual entry>",
                format!("too many fields ({} > {})", entries.len(), self.max_fields),
            ));
        }

        let mut seen = HashSet::new();
        let mut record = Record::with_capacity(entries.len());

        for (name, raw) in entries {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            if !seen.insert(name.to_string()) {
                return Err(ValidationError::new(name, "duplicate field name"));
            }
            let raw = Some(raw).filter(|v| !is_blank(v));
            record.insert(name, coerce_float(name, raw)?);
        }

        Ok(record)
    }
}

impl Default for ManualEntry {
    fn default() -> Self {
        Self::new(&ManualEntryConfig::default())
    }
}
