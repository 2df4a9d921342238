//! Field descriptors for model inputs and outputs

use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared data type of a model field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Integer,
    Float,
    String,
    /// Type absent from the model metadata, or one the orchestrator does not model
    Unknown,
}

impl DataType {
    /// Map an engine-reported type name onto a declared type.
    ///
    /// Accepts the PMML names (`integer`, `double`, `float`, `string`) along
    /// with the common short aliases.
    pub fn from_engine_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "integer" | "int" | "long" => DataType::Integer,
            "double" | "float" | "real" => DataType::Float,
            "string" | "str" => DataType::String,
            _ => DataType::Unknown,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, DataType::Integer | DataType::Float)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Integer => "integer",
            DataType::Float => "float",
            DataType::String => "string",
            DataType::Unknown => "N/A",
        };
        f.write_str(name)
    }
}

/// Name and declared type of one model input or output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    name: String,
    data_type: DataType,
}

impl FieldDescriptor {
    /// Build a descriptor. Names are trimmed; an empty name yields `None`.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Option<Self> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return None;
        }
        Some(Self { name, data_type })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }
}

/// Field metadata exactly as an engine reports it.
///
/// Engines may omit a type or hand back names that need normalising; the
/// schema introspector turns these into [`FieldDescriptor`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawField {
    pub name: String,
    pub data_type: Option<String>,
}

impl RawField {
    pub fn typed(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: Some(data_type.into()),
        }
    }

    pub fn untyped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: None,
        }
    }
}
