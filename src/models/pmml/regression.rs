//! `RegressionModel` evaluation

use super::document::{children_named, f64_attr, malformed, required_attr};
use super::{numeric_input, MiningFunction, Scored};
use crate::error::ModelLoadError;
use crate::types::Record;
use anyhow::Result;
use roxmltree::Node;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Normalization {
    None,
    Softmax,
    Logit,
    Exp,
    Simplemax,
}

impl Normalization {
    fn parse(raw: Option<&str>) -> Result<Self, ModelLoadError> {
        match raw.unwrap_or("none") {
            "none" => Ok(Normalization::None),
            "softmax" => Ok(Normalization::Softmax),
            "logit" => Ok(Normalization::Logit),
            "exp" => Ok(Normalization::Exp),
            "simplemax" => Ok(Normalization::Simplemax),
            other => Err(ModelLoadError::Unsupported(format!(
                "RegressionModel normalizationMethod '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
struct NumericPredictor {
    name: String,
    exponent: i32,
    coefficient: f64,
}

#[derive(Debug, Clone)]
struct CategoricalPredictor {
    name: String,
    value: String,
    coefficient: f64,
}

#[derive(Debug, Clone)]
struct RegressionTable {
    intercept: f64,
    target_category: Option<String>,
    numeric: Vec<NumericPredictor>,
    categorical: Vec<CategoricalPredictor>,
}

impl RegressionTable {
    fn parse(node: Node<'_, '_>) -> Result<Self, ModelLoadError> {
        let numeric = children_named(node, "NumericPredictor")
            .map(|p| {
                let exponent = f64_attr(p, "exponent", Some(1.0))?;
                if exponent.fract() != 0.0 {
                    return Err(malformed("NumericPredictor exponent must be an integer"));
                }
                Ok(NumericPredictor {
                    name: required_attr(p, "name")?.to_string(),
                    exponent: exponent as i32,
                    coefficient: f64_attr(p, "coefficient", None)?,
                })
            })
            .collect::<Result<Vec<_>, ModelLoadError>>()?;

        let categorical = children_named(node, "CategoricalPredictor")
            .map(|p| {
                Ok(CategoricalPredictor {
                    name: required_attr(p, "name")?.to_string(),
                    value: required_attr(p, "value")?.to_string(),
                    coefficient: f64_attr(p, "coefficient", None)?,
                })
            })
            .collect::<Result<Vec<_>, ModelLoadError>>()?;

        if children_named(node, "PredictorTerm").next().is_some() {
            return Err(ModelLoadError::Unsupported(
                "RegressionTable PredictorTerm interactions".to_string(),
            ));
        }

        Ok(Self {
            intercept: f64_attr(node, "intercept", None)?,
            target_category: node.attribute("targetCategory").map(str::to_string),
            numeric,
            categorical,
        })
    }

    fn evaluate(&self, record: &Record) -> Result<f64> {
        let mut y = self.intercept;

        for p in &self.numeric {
            let x = numeric_input(record, &p.name)?;
            y += p.coefficient * x.powi(p.exponent);
        }

        for p in &self.categorical {
            let matches = record
                .get(&p.name)
                .filter(|v| !v.is_missing())
                .map_or(false, |v| category_matches(&v.to_string(), &p.value));
            if matches {
                y += p.coefficient;
            }
        }

        Ok(y)
    }
}

/// Category comparison that treats `1` and `1.0` as the same category.
fn category_matches(actual: &str, expected: &str) -> bool {
    if actual == expected {
        return true;
    }
    match (actual.trim().parse::<f64>(), expected.trim().parse::<f64>()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn logistic(y: f64) -> f64 {
    1.0 / (1.0 + (-y).exp())
}

/// A parsed `RegressionModel`
#[derive(Debug, Clone)]
pub(crate) struct RegressionModel {
    function: MiningFunction,
    normalization: Normalization,
    tables: Vec<RegressionTable>,
}

impl RegressionModel {
    pub fn parse(node: Node<'_, '_>, function: MiningFunction) -> Result<Self, ModelLoadError> {
        let normalization = Normalization::parse(node.attribute("normalizationMethod"))?;
        let tables = children_named(node, "RegressionTable")
            .map(RegressionTable::parse)
            .collect::<Result<Vec<_>, _>>()?;

        if tables.is_empty() {
            return Err(malformed("RegressionModel has no RegressionTable"));
        }
        if function == MiningFunction::Classification {
            if tables.len() < 2 {
                return Err(malformed(
                    "classification RegressionModel needs one RegressionTable per category",
                ));
            }
            if tables.iter().any(|t| t.target_category.is_none()) {
                return Err(malformed(
                    "classification RegressionTable is missing targetCategory",
                ));
            }
        }

        Ok(Self {
            function,
            normalization,
            tables,
        })
    }

    /// Target categories declared by the tables, in order.
    pub fn categories(&self) -> Vec<String> {
        match self.function {
            MiningFunction::Classification => self
                .tables
                .iter()
                .filter_map(|t| t.target_category.clone())
                .collect(),
            MiningFunction::Regression => Vec::new(),
        }
    }

    pub fn score(&self, record: &Record) -> Result<Scored> {
        match self.function {
            MiningFunction::Regression => {
                let y = self.tables[0].evaluate(record)?;
                let value = match self.normalization {
                    Normalization::Logit | Normalization::Softmax => logistic(y),
                    Normalization::Exp => y.exp(),
                    Normalization::None | Normalization::Simplemax => y,
                };
                Ok(Scored::continuous(value))
            }
            MiningFunction::Classification => {
                let raw = self
                    .tables
                    .iter()
                    .map(|t| t.evaluate(record))
                    .collect::<Result<Vec<f64>>>()?;
                let probs = self.normalize(&raw);
                let categories = self.categories();
                Ok(Scored::categorical(categories.into_iter().zip(probs).collect()))
            }
        }
    }

    fn normalize(&self, raw: &[f64]) -> Vec<f64> {
        match self.normalization {
            Normalization::Softmax => {
                let max = raw.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let exps: Vec<f64> = raw.iter().map(|y| (y - max).exp()).collect();
                let sum: f64 = exps.iter().sum();
                exps.iter().map(|e| e / sum).collect()
            }
            Normalization::Simplemax => {
                let sum: f64 = raw.iter().sum();
                raw.iter().map(|y| y / sum).collect()
            }
            Normalization::Exp => raw.iter().map(|y| y.exp()).collect(),
            // The last category takes the remaining mass.
            Normalization::Logit | Normalization::None => {
                let last = raw.len() - 1;
                let mut probs: Vec<f64> = raw[..last]
                    .iter()
                    .map(|&y| {
                        if self.normalization == Normalization::Logit {
                            logistic(y)
                        } else {
                            y
                        }
                    })
                    .collect();
                let rest = 1.0 - probs.iter().sum::<f64>();
                probs.push(rest);
                probs
            }
        }
    }
}
