//! Model loader: serialized model bytes to a ready-to-score handle

use crate::error::ModelLoadError;
use crate::models::engine::{Model, ScoringEngine};
use crate::models::pmml::PmmlEngine;
use crate::schema::{self, SchemaInfo};
use crate::types::DataType;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};

/// Summary of a loaded model for display
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    /// Name the model was loaded under (usually the file name)
    pub name: String,
    /// Model element kind, e.g. `TreeModel`
    pub kind: String,
    /// Mining function, when declared
    pub function: Option<String>,
    /// Description carried by the document
    pub description: Option<String>,
    /// Engine that parsed the model
    pub engine: String,
    pub loaded_at: DateTime<Utc>,
    pub input_count: usize,
    pub output_count: usize,
}

/// Loaded model with its introspected schema.
///
/// Immutable once built. Reloading produces a new handle.
pub struct ModelHandle {
    model: Box<dyn Model>,
    schema: SchemaInfo,
    info: ModelInfo,
}

impl ModelHandle {
    pub fn schema(&self) -> &SchemaInfo {
        &self.schema
    }

    pub fn info(&self) -> &ModelInfo {
        &self.info
    }

    pub(crate) fn model(&self) -> &dyn Model {
        self.model.as_ref()
    }

    /// Same model with a caller-declared type for one input.
    pub(crate) fn with_declared_type(self, name: &str, data_type: DataType) -> Self {
        Self {
            schema: self.schema.with_declared_type(name, data_type),
            ..self
        }
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("info", &self.info)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

/// Loader for serialized models
pub struct ModelLoader {
    engine: Box<dyn ScoringEngine>,
}

impl ModelLoader {
    /// Create a loader backed by the built-in PMML engine
    pub fn new() -> Self {
        Self::with_engine(Box::new(PmmlEngine::new()))
    }

    /// Create a loader backed by a custom scoring engine
    pub fn with_engine(engine: Box<dyn ScoringEngine>) -> Self {
        Self { engine }
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    /// Parse a serialized model and introspect its schema.
    ///
    /// Either returns a complete handle or an error; nothing partial escapes.
    pub fn load(&self, name: &str, bytes: &[u8]) -> Result<ModelHandle, ModelLoadError> {
        info!(model = %name, bytes = bytes.len(), engine = self.engine.name(), "Loading model");

        let result = self.parse(name, bytes);
        if let Err(e) = &result {
            error!(model = %name, error = %e, "Failed to load model");
        }
        result
    }

    fn parse(&self, name: &str, bytes: &[u8]) -> Result<ModelHandle, ModelLoadError> {
        if bytes.is_empty() {
            return Err(ModelLoadError::Empty);
        }
        let text = std::str::from_utf8(bytes)?;
        if text.trim().is_empty() {
            return Err(ModelLoadError::Empty);
        }

        let model = self.engine.load(text)?;
        let schema = schema::introspect(model.as_ref());

        let info = ModelInfo {
            name: name.to_string(),
            kind: model.kind().to_string(),
            function: model.function_name().map(str::to_string),
            description: model.description(),
            engine: self.engine.name().to_string(),
            loaded_at: Utc::now(),
            input_count: schema.inputs().len(),
            output_count: schema.outputs().len(),
        };

        info!(
            model = %name,
            kind = %info.kind,
            inputs = info.input_count,
            outputs = info.output_count,
            complete = schema.incomplete().is_none(),
            "Model loaded successfully"
        );

        Ok(ModelHandle {
            model,
            schema,
            info,
        })
    }
}

impl Default for ModelLoader {
    fn default() -> Self {
        Self::new()
    }
}
