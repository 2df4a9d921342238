//! Schema introspection
//!
//! Turns whatever field metadata an engine reports into ordered, typed
//! [`FieldDescriptor`]s. Gaps in the metadata never fail a load; they are
//! collected into a [`SchemaIncomplete`] warning instead.

use crate::models::engine::Model;
use crate::types::{DataType, FieldDescriptor, RawField};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use tracing::warn;

/// Non-fatal: the model's field metadata was partial or unavailable
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaIncomplete {
    pub reasons: Vec<String>,
}

impl fmt::Display for SchemaIncomplete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "model schema is incomplete: {}", self.reasons.join("; "))
    }
}

/// Ordered input and output fields of a loaded model
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchemaInfo {
    inputs: Vec<FieldDescriptor>,
    outputs: Vec<FieldDescriptor>,
    incomplete: Option<SchemaIncomplete>,
}

impl SchemaInfo {
    /// Build a schema from already-typed descriptors.
    pub fn new(inputs: Vec<FieldDescriptor>, outputs: Vec<FieldDescriptor>) -> Self {
        Self {
            inputs,
            outputs,
            incomplete: None,
        }
    }

    pub fn inputs(&self) -> &[FieldDescriptor] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[FieldDescriptor] {
        &self.outputs
    }

    pub fn input(&self, name: &str) -> Option<&FieldDescriptor> {
        self.inputs.iter().find(|f| f.name() == name)
    }

    /// Present when introspection had to guess or drop metadata.
    pub fn incomplete(&self) -> Option<&SchemaIncomplete> {
        self.incomplete.as_ref()
    }

    /// No declared inputs: callers fall back to manual field entry.
    pub fn is_manual_entry(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Copy of this schema with a caller-declared type for one input.
    ///
    /// Used to resolve `Unknown` inputs when the coercer is configured to
    /// require declared types. Unknown names leave the schema unchanged.
    pub fn with_declared_type(&self, name: &str, data_type: DataType) -> Self {
        let inputs = self
            .inputs
            .iter()
            .map(|f| {
                if f.name() == name {
                    FieldDescriptor::new(name, data_type).unwrap_or_else(|| f.clone())
                } else {
                    f.clone()
                }
            })
            .collect();

        Self {
            inputs,
            outputs: self.outputs.clone(),
            incomplete: self.incomplete.clone(),
        }
    }
}

/// Extract the ordered input and output fields of a model.
pub fn introspect(model: &dyn Model) -> SchemaInfo {
    let mut reasons = Vec::new();

    let inputs = describe("input", model.input_fields(), &mut reasons);
    let outputs = describe("output", model.output_fields(), &mut reasons);

    let incomplete = if reasons.is_empty() {
        None
    } else {
        let incomplete = SchemaIncomplete { reasons };
        warn!(kind = model.kind(), "{}", incomplete);
        Some(incomplete)
    };

    SchemaInfo {
        inputs,
        outputs,
        incomplete,
    }
}

fn describe(
    role: &str,
    fields: Option<Vec<RawField>>,
    reasons: &mut Vec<String>,
) -> Vec<FieldDescriptor> {
    let Some(fields) = fields else {
        reasons.push(format!("{role} field list unavailable"));
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(fields.len());

    for (index, raw) in fields.into_iter().enumerate() {
        let data_type = match raw.data_type.as_deref() {
            Some(name) => DataType::from_engine_name(name),
            None => {
                reasons.push(format!("{role} field '{}' has no declared type", raw.name));
                DataType::Unknown
            }
        };

        let Some(field) = FieldDescriptor::new(raw.name, data_type) else {
            reasons.push(format!("{role} field #{} has no name", index + 1));
            continue;
        };

        if !seen.insert(field.name().to_string()) {
            reasons.push(format!("duplicate {role} field '{}' ignored", field.name()));
            continue;
        }

        out.push(field);
    }

    out
}
