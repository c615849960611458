use candle_core::{Tensor, D};
use serde::{Serialize, Serializer};
use tracing::debug;

use super::error::EngineError;
use super::labels::LabelScheme;
use super::model::LoadedModel;

/// Text accepted for classification: non-empty after trimming whitespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictionRequest {
    text: String,
}

impl PredictionRequest {
    pub fn new(text: impl Into<String>) -> Result<Self, EngineError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(EngineError::validation("Input text cannot be empty"));
        }
        Ok(Self { text })
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Label -> probability, kept in logit order.
#[derive(Debug, Clone, PartialEq)]
pub struct Probabilities(Vec<(String, f32)>);

impl Probabilities {
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(l, _)| l.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.0.iter().map(|(l, p)| (l.as_str(), *p))
    }
}

impl Serialize for Probabilities {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(l, p)| (l, p)))
    }
}

/// The classification of one text. Field names are part of the HTTP contract.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub label: String,
    pub confidence: f32,
    pub probabilities: Probabilities,
}

/// Runs the model on a validated request.
pub fn predict(model: &LoadedModel, request: &PredictionRequest) -> Result<PredictionResult, EngineError> {
    let logits = model.classifier().logits(request.text())?;
    let probs = softmax(&logits)?;
    debug!("Class probabilities: {:?}", probs);
    build_result(&probs, &model.scheme)
}

/// Softmax over the last dimension, flattened to one row of probabilities.
pub fn softmax(logits: &Tensor) -> Result<Vec<f32>, EngineError> {
    let compute = || -> candle_core::Result<Vec<f32>> {
        candle_nn::ops::softmax(logits, D::Minus1)?
            .to_dtype(candle_core::DType::F32)?
            .flatten_all()?
            .to_vec1::<f32>()
    };
    compute().map_err(|e| EngineError::prediction(format!("Softmax failed: {}", e)))
}

/// Maps probabilities onto label names positionally and picks the top label.
/// Ties go to the lowest index.
pub fn build_result(probs: &[f32], scheme: &LabelScheme) -> Result<PredictionResult, EngineError> {
    if scheme.is_empty() {
        return Err(EngineError::prediction("Label head has no outputs"));
    }
    if probs.len() != scheme.len() {
        return Err(EngineError::prediction(format!(
            "Model produced {} scores for a {}-label head",
            probs.len(),
            scheme.len()
        )));
    }
    if probs.iter().any(|p| !p.is_finite()) {
        return Err(EngineError::prediction("Model produced non-finite probabilities"));
    }

    let mut best: Option<(usize, f32)> = None;
    for (i, &p) in probs.iter().enumerate() {
        match best {
            Some((_, top)) if p <= top => {}
            _ => best = Some((i, p)),
        }
    }
    let (index, confidence) =
        best.ok_or_else(|| EngineError::prediction("Model produced no scores"))?;

    let entries = probs
        .iter()
        .enumerate()
        .map(|(i, &p)| {
            scheme
                .name(i)
                .map(|name| (name, p))
                .ok_or_else(|| EngineError::prediction(format!("No label for output {}", i)))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let label = entries[index].0.clone();

    Ok(PredictionResult {
        label,
        confidence,
        probabilities: Probabilities(entries),
    })
}
