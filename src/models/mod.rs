//! Model loading and inference components

pub mod engine;
pub mod inference;
pub mod loader;
pub mod pmml;

#[cfg(test)]
pub(crate) mod fakes;

pub use engine::{Model, ScoringEngine};
pub use inference::Predictor;
pub use loader::{ModelHandle, ModelInfo, ModelLoader};
pub use pmml::PmmlEngine;
