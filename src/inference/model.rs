use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use candle_core::Tensor;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::device::DeviceKind;
use super::error::EngineError;
use super::labels::LabelScheme;

/// Which checkpoint the engine loads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// The public checkpoint from the Hugging Face hub
    Default,
    /// A fine-tuned checkpoint directory on local disk
    LocalPath(PathBuf),
}

impl ModelSource {
    /// An absent or empty path selects the default public model.
    pub fn from_path(path: Option<PathBuf>) -> Self {
        match path {
            Some(p) if !p.as_os_str().is_empty() => ModelSource::LocalPath(p),
            _ => ModelSource::Default,
        }
    }

    /// Label count bound to the classification head for this source.
    pub fn num_labels(&self) -> usize {
        match self {
            ModelSource::Default => 4,
            ModelSource::LocalPath(_) => 2,
        }
    }
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelSource::Default => write!(f, "default"),
            ModelSource::LocalPath(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Resolved model configuration. Immutable once the model is loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub source: ModelSource,
    pub num_labels: usize,
    pub id2label: BTreeMap<usize, String>,
    pub device: DeviceKind,
}

impl ModelConfig {
    pub fn resolve(source: ModelSource, device: DeviceKind) -> Self {
        let num_labels = source.num_labels();
        Self {
            source,
            num_labels,
            id2label: LabelScheme::from_num_labels(num_labels).id2label(),
            device,
        }
    }
}

/// A tokenizer plus network able to score a single text.
///
/// Implementations must be safe to call from several threads at once:
/// `logits` takes `&self` and must not mutate shared state.
pub trait SequenceClassifier: Send + Sync {
    /// Tokenizes `text` (truncating to `max_length`) and runs the forward pass.
    /// Returns raw logits shaped `(1, num_labels)`.
    fn logits(&self, text: &str) -> Result<Tensor, EngineError>;

    /// Short architecture name, e.g. `distilbert`
    fn architecture(&self) -> &str;

    fn max_length(&self) -> usize;
}

/// Produces the engine's single model. Called at most once per engine.
pub trait ModelLoader: Send + Sync {
    fn load(&self) -> Result<LoadedModel, EngineError>;
}

/// The model the engine serves from. Never mutated after construction.
pub struct LoadedModel {
    pub config: ModelConfig,
    pub scheme: LabelScheme,
    pub loaded_at: DateTime<Utc>,
    classifier: Box<dyn SequenceClassifier>,
}

impl fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModel")
            .field("config", &self.config)
            .field("scheme", &self.scheme)
            .field("architecture", &self.classifier.architecture())
            .field("loaded_at", &self.loaded_at)
            .finish()
    }
}

impl LoadedModel {
    pub fn new(config: ModelConfig, classifier: Box<dyn SequenceClassifier>) -> Self {
        let scheme = LabelScheme::from_num_labels(config.num_labels);
        Self {
            config,
            scheme,
            loaded_at: Utc::now(),
            classifier,
        }
    }

    pub fn classifier(&self) -> &dyn SequenceClassifier {
        self.classifier.as_ref()
    }

    pub fn info(&self) -> ModelInfo {
        ModelInfo {
            source: self.config.source.to_string(),
            architecture: self.classifier.architecture().to_string(),
            num_labels: self.config.num_labels,
            labels: self.scheme.names(),
            device: self.config.device,
            max_length: self.classifier.max_length(),
            loaded_at: self.loaded_at,
        }
    }
}

/// Description of the loaded model for API responses and the `check` command.
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub source: String,
    pub architecture: String,
    pub num_labels: usize,
    /// Label names in logit order
    pub labels: Vec<String>,
    pub device: DeviceKind,
    pub max_length: usize,
    pub loaded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_from_path() {
        assert_eq!(ModelSource::from_path(None), ModelSource::Default);
        assert_eq!(ModelSource::from_path(Some(PathBuf::new())), ModelSource::Default);
        assert_eq!(
            ModelSource::from_path(Some(PathBuf::from("/models/ft"))),
            ModelSource::LocalPath(PathBuf::from("/models/ft"))
        );
    }

    #[test]
    fn test_resolve_overrides_local_head_to_two_labels() {
        let config = ModelConfig::resolve(
            ModelSource::LocalPath(PathBuf::from("/models/ft")),
            DeviceKind::Cpu,
        );
        assert_eq!(config.num_labels, 2);
        assert_eq!(config.id2label.get(&0).map(String::as_str), Some("benign"));
        assert_eq!(config.id2label.get(&1).map(String::as_str), Some("phishing"));
    }

    #[test]
    fn test_resolve_default_uses_four_labels() {
        let config = ModelConfig::resolve(ModelSource::Default, DeviceKind::Cpu);
        assert_eq!(config.num_labels, 4);
        assert_eq!(config.id2label.len(), 4);
    }
}
