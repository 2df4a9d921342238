//! Built-in PMML scoring engine
//!
//! Supports `RegressionModel` and `TreeModel` documents. The whole document is
//! parsed into owned structures at load time, so a loaded model never holds
//! on to the source text.

mod document;
mod regression;
mod tree;

use crate::error::ModelLoadError;
use crate::models::engine::{Model, ScoringEngine};
use crate::types::{PredictionOutcome, RawField, Record, Value};
use anyhow::{bail, Result};
use document::{DataField, MiningField, OutputFeature, OutputField, Usage};
use regression::RegressionModel;
use tree::TreeModel;
use tracing::debug;

/// Model elements this engine recognises but cannot evaluate
const UNSUPPORTED_MODELS: &[&str] = &[
    "AnomalyDetectionModel",
    "AssociationModel",
    "BayesianNetworkModel",
    "BaselineModel",
    "ClusteringModel",
    "GaussianProcessModel",
    "GeneralRegressionModel",
    "MiningModel",
    "NaiveBayesModel",
    "NearestNeighborModel",
    "NeuralNetwork",
    "RuleSetModel",
    "Scorecard",
    "SequenceModel",
    "SupportVectorMachineModel",
    "TextModel",
    "TimeSeriesModel",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MiningFunction {
    Regression,
    Classification,
}

impl MiningFunction {
    fn parse(raw: Option<&str>) -> Result<Self, ModelLoadError> {
        match raw {
            Some("regression") => Ok(MiningFunction::Regression),
            Some("classification") => Ok(MiningFunction::Classification),
            Some(other) => Err(ModelLoadError::Unsupported(format!(
                "mining function '{other}'"
            ))),
            None => Err(document::malformed("model is missing attribute 'functionName'")),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            MiningFunction::Regression => "regression",
            MiningFunction::Classification => "classification",
        }
    }
}

/// Intermediate result of evaluating a model body
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Scored {
    pub value: Value,
    /// Per-category probabilities, classification only
    pub probabilities: Vec<(String, f64)>,
}

impl Scored {
    fn continuous(value: f64) -> Self {
        Self {
            value: Value::Float(value),
            probabilities: Vec::new(),
        }
    }

    fn missing() -> Self {
        Self {
            value: Value::Missing,
            probabilities: Vec::new(),
        }
    }

    /// Pick the most probable category; ties go to the first one.
    fn categorical(probabilities: Vec<(String, f64)>) -> Self {
        let winner = probabilities
            .iter()
            .fold(None::<&(String, f64)>, |best, candidate| match best {
                Some(b) if b.1 >= candidate.1 => Some(b),
                _ => Some(candidate),
            })
            .map(|(category, _)| Value::String(category.clone()))
            .unwrap_or(Value::Missing);

        Self {
            value: winner,
            probabilities,
        }
    }

    fn with_winner(category: String, probabilities: Vec<(String, f64)>) -> Self {
        Self {
            value: Value::String(category),
            probabilities,
        }
    }

    fn probability_of(&self, category: &str) -> Option<f64> {
        self.probabilities
            .iter()
            .find(|(c, _)| c == category)
            .map(|(_, p)| *p)
    }
}

/// Read a numeric input, failing with the field name when absent or non-numeric.
pub(crate) fn numeric_input(record: &Record, name: &str) -> Result<f64> {
    match record.get(name) {
        None | Some(Value::Missing) => bail!("missing value for numeric field '{name}'"),
        Some(v) => match v.as_f64() {
            Some(x) => Ok(x),
            None => bail!("field '{name}' is not numeric: {v:?}"),
        },
    }
}

#[derive(Debug, Clone)]
enum ModelBody {
    Regression(RegressionModel),
    Tree(TreeModel),
}

/// PMML engine supporting regression and tree models
#[derive(Debug, Default, Clone, Copy)]
pub struct PmmlEngine;

impl PmmlEngine {
    pub fn new() -> Self {
        Self
    }
}

impl ScoringEngine for PmmlEngine {
    fn name(&self) -> &str {
        "pmml"
    }

    fn load(&self, document: &str) -> Result<Box<dyn Model>, ModelLoadError> {
        let model = PmmlModel::parse(document)?;
        Ok(Box::new(model))
    }
}

/// A parsed PMML model
#[derive(Debug, Clone)]
pub struct PmmlModel {
    kind: &'static str,
    function: MiningFunction,
    description: Option<String>,
    dictionary: Vec<DataField>,
    mining: Option<Vec<MiningField>>,
    output: Option<Vec<OutputField>>,
    body: ModelBody,
}

impl PmmlModel {
    pub fn parse(text: &str) -> Result<Self, ModelLoadError> {
        let doc = roxmltree::Document::parse(text)
            .map_err(|e| ModelLoadError::Malformed(e.to_string()))?;
        let root = doc.root_element();

        if root.tag_name().name() != "PMML" {
            return Err(document::malformed(format!(
                "expected <PMML> root element, found <{}>",
                root.tag_name().name()
            )));
        }

        let dictionary = document::parse_data_dictionary(root)?;
        let description = document::parse_header(root);

        let model_node = root
            .children()
            .filter(|c| c.is_element())
            .find(|c| matches!(c.tag_name().name(), "RegressionModel" | "TreeModel"));

        let Some(model_node) = model_node else {
            let unsupported = root
                .children()
                .filter(|c| c.is_element())
                .map(|c| c.tag_name().name())
                .find(|name| UNSUPPORTED_MODELS.contains(name));
            return Err(match unsupported {
                Some(name) => ModelLoadError::Unsupported(name.to_string()),
                None => document::malformed("document contains no model element"),
            });
        };

        let function = MiningFunction::parse(model_node.attribute("functionName"))?;
        let (kind, body) = match model_node.tag_name().name() {
            "RegressionModel" => (
                "RegressionModel",
                ModelBody::Regression(RegressionModel::parse(model_node, function)?),
            ),
            _ => (
                "TreeModel",
                ModelBody::Tree(TreeModel::parse(model_node, function)?),
            ),
        };

        let mining = document::parse_mining_schema(model_node)?;
        let output = document::parse_output(model_node)?;

        debug!(kind, function = function.as_str(), "Parsed PMML model");

        Ok(Self {
            kind,
            function,
            description,
            dictionary,
            mining,
            output,
            body,
        })
    }

    fn data_field(&self, name: &str) -> Option<&DataField> {
        self.dictionary.iter().find(|f| f.name == name)
    }

    fn target(&self) -> Option<&str> {
        self.mining
            .as_ref()?
            .iter()
            .find(|f| f.usage == Usage::Target)
            .map(|f| f.name.as_str())
    }

    fn target_type(&self) -> Option<&str> {
        self.target()
            .and_then(|t| self.data_field(t))
            .and_then(|f| f.data_type.as_deref())
    }

    fn categories(&self) -> Vec<String> {
        if self.function != MiningFunction::Classification {
            return Vec::new();
        }
        if let Some(field) = self.target().and_then(|t| self.data_field(t)) {
            if !field.values.is_empty() {
                return field.values.clone();
            }
        }
        match &self.body {
            ModelBody::Regression(m) => m.categories(),
            ModelBody::Tree(m) => m.categories(),
        }
    }

    fn predicted_name(&self) -> String {
        match self.target() {
            Some(target) => format!("predicted_{target}"),
            None => "prediction".to_string(),
        }
    }

    /// Convert the raw predicted category into the target's declared type.
    fn typed_prediction(&self, value: Value) -> Value {
        match (&value, self.function) {
            (Value::String(raw), MiningFunction::Classification) => {
                document::typed_value(self.target_type(), raw)
            }
            _ => value,
        }
    }

    fn evaluate(&self, record: &Record) -> Result<Scored> {
        match &self.body {
            ModelBody::Regression(m) => m.score(record),
            ModelBody::Tree(m) => Ok(m.score(record)),
        }
    }

    fn shape_output(&self, scored: Scored) -> Record {
        let winner = match &scored.value {
            Value::Missing => None,
            v => Some(v.to_string()),
        };
        let predicted = self.typed_prediction(scored.value.clone());

        match &self.output {
            Some(fields) => fields
                .iter()
                .map(|f| {
                    let value = match f.feature {
                        OutputFeature::PredictedValue => predicted.clone(),
                        OutputFeature::Probability => f
                            .value
                            .as_deref()
                            .or(winner.as_deref())
                            .and_then(|c| scored.probability_of(c))
                            .map(Value::Float)
                            .unwrap_or(Value::Missing),
                        OutputFeature::Other(_) => Value::Missing,
                    };
                    (f.name.clone(), value)
                })
                .collect(),
            None => {
                let mut row = Record::with_capacity(1 + scored.probabilities.len());
                row.insert(self.predicted_name(), predicted);
                for category in self.categories() {
                    let p = scored
                        .probability_of(&category)
                        .map(Value::Float)
                        .unwrap_or(Value::Missing);
                    row.insert(format!("probability_{category}"), p);
                }
                row
            }
        }
    }
}

impl Model for PmmlModel {
    fn kind(&self) -> &str {
        self.kind
    }

    fn function_name(&self) -> Option<&str> {
        Some(self.function.as_str())
    }

    fn description(&self) -> Option<String> {
        self.description.clone()
    }

    fn input_fields(&self) -> Option<Vec<RawField>> {
        let mining = self.mining.as_ref()?;
        Some(
            mining
                .iter()
                .filter(|f| f.usage == Usage::Active)
                .map(|f| RawField {
                    name: f.name.clone(),
                    data_type: self.data_field(&f.name).and_then(|d| d.data_type.clone()),
                })
                .collect(),
        )
    }

    fn output_fields(&self) -> Option<Vec<RawField>> {
        let predicted_type = match self.function {
            MiningFunction::Regression => Some("double".to_string()),
            MiningFunction::Classification => self.target_type().map(str::to_string),
        };

        match &self.output {
            Some(fields) => Some(
                fields
                    .iter()
                    .map(|f| {
                        let data_type = f.data_type.clone().or_else(|| match f.feature {
                            OutputFeature::PredictedValue => predicted_type.clone(),
                            OutputFeature::Probability => Some("double".to_string()),
                            OutputFeature::Other(_) => None,
                        });
                        RawField {
                            name: f.name.clone(),
                            data_type,
                        }
                    })
                    .collect(),
            ),
            None => {
                let mut fields = vec![RawField {
                    name: self.predicted_name(),
                    data_type: predicted_type,
                }];
                fields.extend(
                    self.categories()
                        .into_iter()
                        .map(|c| RawField::typed(format!("probability_{c}"), "double")),
                );
                Some(fields)
            }
        }
    }

    fn score(&self, record: &Record) -> Result<PredictionOutcome> {
        let scored = self.evaluate(record)?;
        Ok(PredictionOutcome::Struct(self.shape_output(scored)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IRIS_TREE: &str = include_str!("../../../testdata/iris_tree.pmml");
    const INSURANCE: &str = include_str!("../../../testdata/insurance_regression.pmml");

    fn record(pairs: &[(&str, Value)]) -> Record {
        pairs.iter().cloned().collect()
    }

    #[test]
    fn test_regression_fields_and_score() {
        let model = PmmlModel::parse(INSURANCE).unwrap();
        assert_eq!(model.kind(), "RegressionModel");

        let inputs = model.input_fields().unwrap();
        assert_eq!(inputs[0], RawField::typed("age", "double"));
        assert_eq!(inputs[1], RawField::typed("city", "string"));
        assert_eq!(inputs.len(), 2);

        let outputs = model.output_fields().unwrap();
        assert_eq!(outputs, vec![RawField::typed("predicted_charges", "double")]);

        let outcome = model
            .score(&record(&[
                ("age", Value::Float(34.0)),
                ("city", Value::from("NY")),
            ]))
            .unwrap();
        match outcome {
            PredictionOutcome::Struct(row) => {
                // 1000 + 250*34 + 5000
                assert_eq!(row.get("predicted_charges"), Some(&Value::Float(14500.0)));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_tree_explicit_outputs() {
        let model = PmmlModel::parse(IRIS_TREE).unwrap();
        let outputs = model.output_fields().unwrap();
        let names: Vec<&str> = outputs.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["predicted_species", "probability_setosa", "probability"]);

        let outcome = model
            .score(&record(&[
                ("petal_length", Value::Float(1.4)),
                ("petal_width", Value::Float(0.2)),
            ]))
            .unwrap();
        let PredictionOutcome::Struct(row) = outcome else {
            panic!("expected struct outcome");
        };
        assert_eq!(row.get("predicted_species"), Some(&Value::from("setosa")));
        assert_eq!(row.get("probability_setosa"), Some(&Value::Float(1.0)));
        assert_eq!(row.get("probability"), Some(&Value::Float(1.0)));
    }

    #[test]
    fn test_synthesized_classification_outputs() {
        let doc = r#"<PMML version="4.4">
  <DataDictionary>
    <DataField name="x" dataType="double"/>
    <DataField name="label" dataType="integer"><Value value="1"/><Value value="0"/></DataField>
  </DataDictionary>
  <RegressionModel functionName="classification" normalizationMethod="logit">
    <MiningSchema><MiningField name="x"/><MiningField name="label" usageType="target"/></MiningSchema>
    <RegressionTable intercept="0" targetCategory="1"><NumericPredictor name="x" coefficient="1"/></RegressionTable>
    <RegressionTable intercept="0" targetCategory="0"/>
  </RegressionModel>
</PMML>"#;
        let model = PmmlModel::parse(doc).unwrap();
        let outcome = model.score(&record(&[("x", Value::Float(2.0))])).unwrap();
        let PredictionOutcome::Struct(row) = outcome else {
            panic!("expected struct outcome");
        };

        let names: Vec<&str> = row.names().collect();
        assert_eq!(names, vec!["predicted_label", "probability_1", "probability_0"]);
        assert_eq!(row.get("predicted_label"), Some(&Value::Integer(1)));
    }

    #[test]
    fn test_missing_mining_schema_reports_no_inputs() {
        let doc = r#"<PMML version="4.4">
  <RegressionModel functionName="regression"><RegressionTable intercept="3"/></RegressionModel>
</PMML>"#;
        let model = PmmlModel::parse(doc).unwrap();
        assert!(model.input_fields().is_none());

        let outcome = model.score(&Record::new()).unwrap();
        let PredictionOutcome::Struct(row) = outcome else {
            panic!("expected struct outcome");
        };
        assert_eq!(row.get("prediction"), Some(&Value::Float(3.0)));
    }

    #[test]
    fn test_load_errors() {
        assert!(matches!(
            PmmlModel::parse("<PMML"),
            Err(ModelLoadError::Malformed(_))
        ));
        assert!(matches!(
            PmmlModel::parse("<Other/>"),
            Err(ModelLoadError::Malformed(_))
        ));
        assert!(matches!(
            PmmlModel::parse(r#"<PMML><NeuralNetwork functionName="regression"/></PMML>"#),
            Err(ModelLoadError::Unsupported(name)) if name == "NeuralNetwork"
        ));
        assert!(matches!(
            PmmlModel::parse(r#"<PMML><DataDictionary/></PMML>"#),
            Err(ModelLoadError::Malformed(_))
        ));
        assert!(matches!(
            PmmlModel::parse(
                r#"<PMML><RegressionModel functionName="clustering"><RegressionTable intercept="0"/></RegressionModel></PMML>"#
            ),
            Err(ModelLoadError::Unsupported(_))
        ));
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let model = PmmlModel::parse(IRIS_TREE).unwrap();
        let input = record(&[
            ("petal_length", Value::Float(5.1)),
            ("petal_width", Value::Float(1.9)),
        ]);

        let first = model.score(&input).unwrap();
        for _ in 0..10 {
            assert_eq!(model.score(&input).unwrap(), first);
        }
    }
}
