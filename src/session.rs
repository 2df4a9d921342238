//! Prediction session: the active model plus everything needed to use it.
//!
//! A [`Session`] owns at most one [`ModelHandle`]. Loading builds the new
//! handle completely before swapping it in, so a failed load leaves the
//! previous model (or no model) in place.

use crate::coercer::{Coercer, ManualEntry};
use crate::config::AppConfig;
use crate::error::{
    BatchPredictionError, ExportError, ModelLoadError, PredictionError, TableParseError,
    ValidationError,
};
use crate::formatter;
use crate::metrics::SessionMetrics;
use crate::models::engine::ScoringEngine;
use crate::models::inference::Predictor;
use crate::models::loader::{ModelHandle, ModelInfo, ModelLoader};
use crate::schema::SchemaInfo;
use crate::table::{self, BatchTable, ResultTable};
use crate::types::{DataType, RawValue, Record};
use std::time::Instant;
use tracing::{info, warn};

/// Failure of a single-record prediction request
#[derive(Debug, thiserror::Error)]
pub enum SinglePredictionError {
    #[error("no model is loaded")]
    NoModel,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Prediction(#[from] PredictionError),
}

/// Failure to declare a type for a model input
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeclareTypeError {
    #[error("no model is loaded")]
    NoModel,

    #[error("model has no input named '{0}'")]
    UnknownInput(String),

    #[error("cannot declare type {1} for '{0}'")]
    InvalidType(String, DataType),
}

pub struct Session {
    config: AppConfig,
    loader: ModelLoader,
    coercer: Coercer,
    predictor: Predictor,
    manual: ManualEntry,
    handle: Option<ModelHandle>,
    metrics: SessionMetrics,
}

impl Session {
    /// Create a session backed by the built-in PMML engine
    pub fn new(config: AppConfig) -> Self {
        Self::with_loader(config, ModelLoader::new())
    }

    /// Create a session backed by a custom scoring engine
    pub fn with_engine(config: AppConfig, engine: Box<dyn ScoringEngine>) -> Self {
        Self::with_loader(config, ModelLoader::with_engine(engine))
    }

    fn with_loader(config: AppConfig, loader: ModelLoader) -> Self {
        Self {
            coercer: Coercer::new(config.scoring.unknown_type),
            predictor: Predictor::new(config.scoring.batch_mode),
            manual: ManualEntry::new(&config.manual_entry),
            loader,
            config,
            handle: None,
            metrics: SessionMetrics::new(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Load a model, replacing the active one only on success.
    pub fn load(&mut self, name: &str, bytes: &[u8]) -> Result<&ModelHandle, ModelLoadError> {
        match self.loader.load(name, bytes) {
            Ok(handle) => {
                if let Some(previous) = &self.handle {
                    info!(previous = %previous.info().name, model = %name, "Replacing active model");
                }
                self.metrics.record_load(true);
                Ok(&*self.handle.insert(handle))
            }
            Err(e) => {
                self.metrics.record_load(false);
                if let Some(current) = &self.handle {
                    warn!(model = %current.info().name, "Keeping previously loaded model");
                }
                Err(e)
            }
        }
    }

    /// Drop the active model. Returns whether one was loaded.
    pub fn unload(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                info!(model = %handle.info().name, "Model unloaded");
                true
            }
            None => false,
        }
    }

    pub fn handle(&self) -> Option<&ModelHandle> {
        self.handle.as_ref()
    }

    pub fn schema(&self) -> Option<&SchemaInfo> {
        self.handle.as_ref().map(ModelHandle::schema)
    }

    pub fn model_info(&self) -> Option<&ModelInfo> {
        self.handle.as_ref().map(ModelHandle::info)
    }

    /// Declare the type of one model input, typically one the model left
    /// untyped. Lasts until the next load.
    pub fn declare_type(
        &mut self,
        name: &str,
        data_type: DataType,
    ) -> Result<(), DeclareTypeError> {
        if data_type == DataType::Unknown {
            return Err(DeclareTypeError::InvalidType(name.to_string(), data_type));
        }
        let handle = self.handle.take().ok_or(DeclareTypeError::NoModel)?;
        if handle.schema().input(name).is_none() {
            self.handle = Some(handle);
            return Err(DeclareTypeError::UnknownInput(name.to_string()));
        }

        info!(model = %handle.info().name, field = %name, data_type = %data_type, "Declared input type");
        self.handle = Some(handle.with_declared_type(name, data_type));
        Ok(())
    }

    pub fn manual_entry(&self) -> &ManualEntry {
        &self.manual
    }

    /// Validate raw values and score them as one record.
    ///
    /// With no declared inputs the values are taken as user-named numeric
    /// fields (manual entry).
    pub fn predict_one(
        &self,
        raw: &[(String, RawValue)],
    ) -> Result<Record, SinglePredictionError> {
        let handle = self.handle.as_ref().ok_or(SinglePredictionError::NoModel)?;

        let record = if handle.schema().is_manual_entry() {
            self.manual.coerce(raw)?
        } else {
            self.coercer.coerce(handle.schema(), raw)?
        };

        let start = Instant::now();
        match self.predictor.predict_one(handle, &record) {
            Ok(outcome) => {
                self.metrics.record_single(start.elapsed());
                Ok(formatter::format_single(&outcome))
            }
            Err(e) => {
                self.metrics.record_failure();
                Err(e.into())
            }
        }
    }

    /// Score every row of a table. All-or-nothing.
    pub fn predict_batch(&self, table: &BatchTable) -> Result<ResultTable, BatchPredictionError> {
        let handle = self.handle.as_ref().ok_or(BatchPredictionError::NoModel)?;

        let start = Instant::now();
        match self.predictor.predict_batch(handle, table, &self.coercer) {
            Ok(result) => {
                self.metrics.record_batch(result.len(), start.elapsed());
                Ok(result)
            }
            Err(e) => {
                self.metrics.record_failure();
                Err(e)
            }
        }
    }

    /// Parse delimited text with the configured delimiter
    pub fn parse_table(&self, text: &str) -> Result<BatchTable, TableParseError> {
        BatchTable::parse(text, self.config.table.delimiter)
    }

    /// Export a result with the configured delimiter
    pub fn export(&self, result: &ResultTable) -> Result<String, ExportError> {
        let text = result.to_delimited(self.config.table.delimiter)?;
        info!(rows = result.len(), bytes = text.len(), "Exported batch result");
        Ok(text)
    }

    /// Header-only template of the active model's inputs
    pub fn template(&self) -> Option<Result<String, ExportError>> {
        self.schema()
            .map(|schema| table::batch_template(schema, self.config.table.delimiter))
    }

    pub fn metrics(&self) -> &SessionMetrics {
        &self.metrics
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("engine", &self.loader.engine_name())
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fakes::{FakeEngine, FakeModel, Scoring};
    use crate::types::Value;
    use std::sync::atomic::Ordering;

    const INSURANCE: &[u8] = include_bytes!("../testdata/insurance_regression.pmml");
    const IRIS: &[u8] = include_bytes!("../testdata/iris_tree.pmml");

    fn raw(pairs: &[(&str, RawValue)]) -> Vec<(String, RawValue)> {
        pairs.iter().map(|(n, v)| (n.to_string(), v.clone())).collect()
    }

    fn insurance_session() -> Session {
        let mut session = Session::new(AppConfig::default());
        session.load("insurance.pmml", INSURANCE).unwrap();
        session
    }

    #[test]
    fn test_predict_without_model() {
        let session = Session::new(AppConfig::default());
        assert!(matches!(
            session.predict_one(&[]),
            Err(SinglePredictionError::NoModel)
        ));
        let table = BatchTable::parse("a\n1\n", ',').unwrap();
        assert!(matches!(
            session.predict_batch(&table),
            Err(BatchPredictionError::NoModel)
        ));
        assert!(session.template().is_none());
    }

    #[test]
    fn test_failed_load_keeps_previous_model() {
        let mut session = insurance_session();

        assert!(matches!(session.load("empty.pmml", b""), Err(ModelLoadError::Empty)));
        assert!(session.load("broken.pmml", b"<PMML").is_err());

        assert_eq!(session.model_info().unwrap().name, "insurance.pmml");
        assert_eq!(session.metrics().models_loaded.load(Ordering::Relaxed), 1);
        assert_eq!(session.metrics().load_failures.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_reload_replaces_model() {
        let mut session = insurance_session();
        session.load("iris.pmml", IRIS).unwrap();

        assert_eq!(session.model_info().unwrap().kind, "TreeModel");
        assert!(session.unload());
        assert!(!session.unload());
        assert!(session.handle().is_none());
    }

    #[test]
    fn test_single_prediction_scenario() {
        let session = insurance_session();

        let row = session
            .predict_one(&raw(&[
                ("age", RawValue::Number(34.0)),
                ("city", "NY".into()),
            ]))
            .unwrap();
        assert!(!row.is_empty());
        assert_eq!(row.get("predicted_charges"), Some(&Value::Float(14500.0)));
    }

    #[test]
    fn test_validation_error_never_reaches_engine() {
        let mut session = Session::with_engine(
            AppConfig::default(),
            Box::new(FakeEngine::new(
                FakeModel::new()
                    .with_inputs(vec![crate::types::RawField::typed("n", "integer")])
                    .with_outputs(Vec::new())
                    .scoring(Scoring::Panic),
            )),
        );
        session.load("fake", b"model").unwrap();

        let err = session.predict_one(&raw(&[("n", "3.5".into())])).unwrap_err();
        match err {
            SinglePredictionError::Validation(e) => assert_eq!(e.reason, "not an integer"),
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(session.metrics().prediction_failures.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_batch_with_missing_city_uses_default() {
        let session = insurance_session();
        let table = session
            .parse_table("age,city\n34,NY\n41,\n29,LA\n")
            .unwrap();

        let result = session.predict_batch(&table).unwrap();
        assert_eq!(result.len(), 3);
        assert_eq!(result.columns(), &["age", "city", "predicted_charges"]);
        assert_eq!(result.rows()[0][2], Value::Float(14500.0));
        // 1000 + 250 * 41, no city adjustment
        assert_eq!(result.rows()[1][2], Value::Float(11250.0));
        assert_eq!(result.rows()[2][2], Value::Float(11250.0));

        let exported = session.export(&result).unwrap();
        let reparsed = session.parse_table(&exported).unwrap();
        assert_eq!(reparsed.columns(), result.columns());
        assert_eq!(reparsed.rows()[1][1], "");
        assert_eq!(session.metrics().rows_scored.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_header_only_batch() {
        let session = insurance_session();
        let table = session.parse_table("age,city\n").unwrap();

        let result = session.predict_batch(&table).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_manual_entry_session() {
        let mut session = Session::with_engine(
            AppConfig::default(),
            Box::new(FakeEngine::new(FakeModel::new())),
        );
        session.load("opaque", b"model").unwrap();
        assert!(session.schema().unwrap().is_manual_entry());
        assert_eq!(session.manual_entry().default_names(None).len(), 5);

        let row = session
            .predict_one(&raw(&[("a", "1.5".into()), ("b", RawValue::Number(2.0))]))
            .unwrap();
        assert_eq!(row.get("prediction"), Some(&Value::Float(3.5)));
    }

    #[test]
    fn test_header_only_batch_keeps_output_columns() {
        let session = insurance_session();

        let empty = session
            .predict_batch(&session.parse_table("age,city\n").unwrap())
            .unwrap();
        let full = session
            .predict_batch(&session.parse_table("age,city\n1,NY\n").unwrap())
            .unwrap();

        assert_eq!(empty.columns(), full.columns());
        assert_eq!(session.export(&empty).unwrap(), "age,city,predicted_charges\n");
    }

    fn untyped_session() -> Session {
        let mut config = AppConfig::default();
        config.scoring.unknown_type = crate::config::UnknownTypePolicy::RequireDeclared;
        let mut session = Session::with_engine(
            config,
            Box::new(FakeEngine::new(
                FakeModel::new()
                    .with_inputs(vec![crate::types::RawField::untyped("x")])
                    .with_outputs(vec![crate::types::RawField::typed("prediction", "double")]),
            )),
        );
        session.load("fake", b"model").unwrap();
        session
    }

    #[test]
    fn test_declared_type_unblocks_scoring() {
        let mut session = untyped_session();
        let input = raw(&[("x", "2".into())]);
        let table = session.parse_table("x\n2\n3\n").unwrap();

        assert!(matches!(
            session.predict_one(&input),
            Err(SinglePredictionError::Validation(e)) if e.field == "x"
        ));
        assert!(matches!(
            session.predict_batch(&table),
            Err(BatchPredictionError::Validation { row: 1, .. })
        ));

        session.declare_type("x", DataType::Integer).unwrap();
        assert_eq!(
            session.schema().unwrap().input("x").unwrap().data_type(),
            DataType::Integer
        );

        let row = session.predict_one(&input).unwrap();
        assert_eq!(row.get("prediction"), Some(&Value::Float(2.0)));
        let result = session.predict_batch(&table).unwrap();
        assert_eq!(result.rows()[1][1], Value::Float(3.0));
    }

    #[test]
    fn test_declare_type_errors() {
        let mut session = Session::new(AppConfig::default());
        assert_eq!(
            session.declare_type("x", DataType::Float),
            Err(DeclareTypeError::NoModel)
        );

        let mut session = untyped_session();
        assert_eq!(
            session.declare_type("nope", DataType::Float),
            Err(DeclareTypeError::UnknownInput("nope".to_string()))
        );
        assert!(matches!(
            session.declare_type("x", DataType::Unknown),
            Err(DeclareTypeError::InvalidType(..))
        ));
        // the model survives a rejected declaration
        assert!(session.handle().is_some());

        session.declare_type("x", DataType::Float).unwrap();
        session.load("fake", b"model").unwrap();
        assert_eq!(
            session.schema().unwrap().input("x").unwrap().data_type(),
            DataType::Unknown
        );
    }

    #[test]
    fn test_template_and_delimiter() {
        let mut config = AppConfig::default();
        config.table.delimiter = ';';
        let mut session = Session::new(config);
        session.load("insurance.pmml", INSURANCE).unwrap();

        assert_eq!(session.template().unwrap().unwrap(), "age;city\n");
    }
}
