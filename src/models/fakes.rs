//! In-memory engine and model used by unit tests

use crate::error::ModelLoadError;
use crate::models::engine::{Model, ScoringEngine};
use crate::types::{PredictionOutcome, RawField, Record, Value};
use anyhow::{anyhow, Result};

/// How a [`FakeModel`] answers `score`
#[derive(Debug, Clone)]
pub enum Scoring {
    /// Scalar sum of all numeric inputs
    Sum,
    /// Struct with `score` (sum) and `label` (`high` when sum > 10)
    Labelled,
    /// Fail every call with the given message
    Fail(String),
    /// Fail when the named field holds the given text
    FailWhen(String, String),
    /// Panic inside the engine
    Panic,
}

#[derive(Debug, Clone)]
pub struct FakeModel {
    inputs: Option<Vec<RawField>>,
    outputs: Option<Vec<RawField>>,
    scoring: Scoring,
    vectorized: bool,
    /// Rows the vectorized path drops, to exercise the row-count check
    short_by: usize,
}

impl FakeModel {
    pub fn new() -> Self {
        Self {
            inputs: None,
            outputs: None,
            scoring: Scoring::Sum,
            vectorized: false,
            short_by: 0,
        }
    }

    pub fn with_inputs(mut self, inputs: Vec<RawField>) -> Self {
        self.inputs = Some(inputs);
        self
    }

    pub fn with_outputs(mut self, outputs: Vec<RawField>) -> Self {
        self.outputs = Some(outputs);
        self
    }

    pub fn scoring(mut self, scoring: Scoring) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn vectorized(mut self, short_by: usize) -> Self {
        self.vectorized = true;
        self.short_by = short_by;
        self
    }

    fn sum(record: &Record) -> f64 {
        record
            .iter()
            .filter_map(|(_, v)| match v {
                Value::Integer(_) | Value::Float(_) => v.as_f64(),
                _ => None,
            })
            .sum()
    }
}

impl Model for FakeModel {
    fn kind(&self) -> &str {
        "FakeModel"
    }

    fn input_fields(&self) -> Option<Vec<RawField>> {
        self.inputs.clone()
    }

    fn output_fields(&self) -> Option<Vec<RawField>> {
        self.outputs.clone()
    }

    fn score(&self, record: &Record) -> Result<PredictionOutcome> {
        match &self.scoring {
            Scoring::Sum => Ok(PredictionOutcome::Scalar(Value::Float(Self::sum(record)))),
            Scoring::Labelled => {
                let sum = Self::sum(record);
                let label = if sum > 10.0 { "high" } else { "low" };
                Ok(PredictionOutcome::Struct(
                    vec![("score", Value::Float(sum)), ("label", Value::from(label))]
                        .into_iter()
                        .collect(),
                ))
            }
            Scoring::Fail(msg) => Err(anyhow!(msg.clone()).context("evaluating fake model")),
            Scoring::FailWhen(field, text) => match record.get(field) {
                Some(Value::String(s)) if s == text => Err(anyhow!("bad value {text:?} for '{field}'")),
                _ => Ok(PredictionOutcome::Scalar(Value::Float(Self::sum(record)))),
            },
            Scoring::Panic => panic!("fake engine exploded"),
        }
    }

    fn score_batch(&self, records: &[Record]) -> Option<Result<PredictionOutcome>> {
        if !self.vectorized {
            return None;
        }
        let keep = records.len().saturating_sub(self.short_by);
        let values = records[..keep]
            .iter()
            .map(|r| Value::Float(Self::sum(r) * 10.0))
            .collect();
        Some(Ok(PredictionOutcome::Vector(values)))
    }
}

/// Engine that hands out clones of a prepared [`FakeModel`].
///
/// A document reading `unsupported` fails as an unsupported model type.
pub struct FakeEngine {
    model: FakeModel,
}

impl FakeEngine {
    pub fn new(model: FakeModel) -> Self {
        Self { model }
    }
}

impl ScoringEngine for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    fn load(&self, document: &str) -> Result<Box<dyn Model>, ModelLoadError> {
        if document.trim() == "unsupported" {
            return Err(ModelLoadError::Unsupported("FakeModel".to_string()));
        }
        Ok(Box::new(self.model.clone()))
    }
}
