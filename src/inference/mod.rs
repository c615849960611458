//! # Inference Engine Module
//!
//! Loads a pretrained transformer sequence classifier once per process and
//! scores email text with it.
//!
//! ## Key Components
//!
//! - `InferenceEngine`: owns the single `LoadedModel` behind a once-cell and
//!   exposes `predict`
//! - `CandleModelLoader`: resolves the checkpoint (public hub model or a local
//!   fine-tuned directory), picks the device and binds the label head
//! - `predictor`: softmax plus positional mapping onto the `LabelScheme`
//!
//! ## Concurrency
//!
//! The loaded model is read-only after construction. Forward passes borrow it
//! immutably, so requests may score text in parallel without a lock.

pub mod device;
pub mod engine;
pub mod error;
pub mod labels;
pub mod model;
pub mod network;
pub mod predictor;
pub mod provider;
pub mod tokenizer;

pub use device::{DeviceKind, DevicePreference};
pub use engine::InferenceEngine;
pub use error::EngineError;
pub use labels::LabelScheme;
pub use model::{LoadedModel, ModelConfig, ModelInfo, ModelLoader, ModelSource, SequenceClassifier};
pub use predictor::{PredictionRequest, PredictionResult, Probabilities};
pub use provider::{CandleModelLoader, DEFAULT_MODEL_ID};
