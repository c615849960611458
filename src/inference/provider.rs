use std::fs;
use std::path::{Path, PathBuf};

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use hf_hub::api::sync::{Api, ApiRepo};
use hf_hub::{Repo, RepoType};
use serde_json::Value;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use super::device::{select_device, DeviceKind, DevicePreference};
use super::error::EngineError;
use super::model::{LoadedModel, ModelConfig, ModelLoader, ModelSource, SequenceClassifier};
use super::network::{Architecture, ClassifierNetwork};
use super::tokenizer::{load_tokenizer, TokenizerFile, MAX_SEQUENCE_LENGTH};

/// Public checkpoint served when no local model path is configured.
pub const DEFAULT_MODEL_ID: &str = "cybersectony/phishing-email-detection-distilbert_v2.4.1";

/// Weight file formats, in order of preference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeightsFile {
    Safetensors(PathBuf),
    Pytorch(PathBuf),
}

/// The three pieces a checkpoint needs: config, tokenizer and weights.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointFiles {
    pub config: PathBuf,
    pub tokenizer: TokenizerFile,
    pub weights: WeightsFile,
}

impl CheckpointFiles {
    /// Locates checkpoint files in a local directory.
    pub fn from_dir(dir: &Path) -> Result<Self, EngineError> {
        if !dir.is_dir() {
            return Err(EngineError::configuration(format!(
                "Model path does not exist: {}",
                dir.display()
            )));
        }

        let config = dir.join("config.json");
        if !config.is_file() {
            return Err(EngineError::configuration(format!(
                "No config.json found in {}",
                dir.display()
            )));
        }

        let tokenizer = TokenizerFile::find_in(dir).ok_or_else(|| {
            EngineError::configuration(format!(
                "No tokenizer found in {} (tried tokenizer.json, vocab.txt)",
                dir.display()
            ))
        })?;

        let safetensors = dir.join("model.safetensors");
        let pytorch = dir.join("pytorch_model.bin");
        let weights = if safetensors.is_file() {
            WeightsFile::Safetensors(safetensors)
        } else if pytorch.is_file() {
            WeightsFile::Pytorch(pytorch)
        } else {
            return Err(EngineError::configuration(format!(
                "No model weights found in {} (tried model.safetensors, pytorch_model.bin)",
                dir.display()
            )));
        };

        Ok(Self {
            config,
            tokenizer,
            weights,
        })
    }

    /// Fetches checkpoint files through the Hugging Face hub cache.
    pub fn from_hub(model_id: &str, revision: &str) -> Result<Self, EngineError> {
        info!("Resolving {} ({}) from the Hugging Face hub", model_id, revision);
        let api = Api::new().map_err(|e| {
            EngineError::configuration(format!("Failed to initialize Hugging Face API: {}", e))
        })?;
        let repo = api.repo(Repo::with_revision(
            model_id.to_string(),
            RepoType::Model,
            revision.to_string(),
        ));

        let config = fetch(&repo, "config.json")?;
        let tokenizer = match repo.get("tokenizer.json") {
            Ok(path) => TokenizerFile::Json(path),
            Err(e) => {
                debug!("tokenizer.json unavailable ({}), trying vocab.txt", e);
                TokenizerFile::Vocab(fetch(&repo, "vocab.txt")?)
            }
        };
        let weights = match repo.get("model.safetensors") {
            Ok(path) => WeightsFile::Safetensors(path),
            Err(e) => {
                debug!("model.safetensors unavailable ({}), trying pytorch_model.bin", e);
                WeightsFile::Pytorch(fetch(&repo, "pytorch_model.bin")?)
            }
        };

        Ok(Self {
            config,
            tokenizer,
            weights,
        })
    }
}

fn fetch(repo: &ApiRepo, file: &str) -> Result<PathBuf, EngineError> {
    repo.get(file)
        .map_err(|e| EngineError::configuration(format!("Failed to download {}: {}", file, e)))
}

/// Loads a DistilBERT/BERT sequence classifier with candle.
#[derive(Debug, Clone)]
pub struct CandleModelLoader {
    pub source: ModelSource,
    pub default_model_id: String,
    pub revision: String,
    pub device: DevicePreference,
    pub max_length: usize,
}

impl CandleModelLoader {
    pub fn new(source: ModelSource) -> Self {
        Self {
            source,
            default_model_id: DEFAULT_MODEL_ID.to_string(),
            revision: "main".to_string(),
            device: DevicePreference::Auto,
            max_length: MAX_SEQUENCE_LENGTH,
        }
    }

    fn checkpoint_files(&self) -> Result<CheckpointFiles, EngineError> {
        match &self.source {
            ModelSource::Default => {
                info!("Using default model: {}", self.default_model_id);
                CheckpointFiles::from_hub(&self.default_model_id, &self.revision)
            }
            ModelSource::LocalPath(path) => {
                info!("Loading fine-tuned model from: {}", path.display());
                CheckpointFiles::from_dir(path)
            }
        }
    }
}

impl ModelLoader for CandleModelLoader {
    fn load(&self) -> Result<LoadedModel, EngineError> {
        let device = select_device(self.device)?;
        let files = self.checkpoint_files()?;
        let tokenizer = load_tokenizer(&files.tokenizer, self.max_length)?;

        let config_json = fs::read_to_string(&files.config).map_err(|e| {
            EngineError::configuration(format!("Failed to read {}: {}", files.config.display(), e))
        })?;
        let raw: Value = serde_json::from_str(&config_json)
            .map_err(|e| EngineError::configuration(format!("Failed to parse config.json: {}", e)))?;
        let architecture = Architecture::detect(&raw)?;

        let config = ModelConfig::resolve(self.source.clone(), DeviceKind::of(&device));
        let vb = var_builder(&files.weights, &device)?;
        let network = ClassifierNetwork::load(architecture, &config_json, vb, config.num_labels)?;

        info!(
            "Model loaded successfully on {} ({} labels: {:?})",
            config.device,
            config.num_labels,
            config.id2label.values().collect::<Vec<_>>()
        );

        let classifier = CandleClassifier {
            tokenizer,
            network,
            max_length: self.max_length,
        };
        Ok(LoadedModel::new(config, Box::new(classifier)))
    }
}

fn var_builder(weights: &WeightsFile, device: &Device) -> Result<VarBuilder<'static>, EngineError> {
    match weights {
        WeightsFile::Safetensors(path) => {
            // SAFETY: the checkpoint file is not modified while the process runs.
            unsafe { VarBuilder::from_mmaped_safetensors(&[path], DType::F32, device) }.map_err(|e| {
                EngineError::configuration(format!("Failed to load weights {}: {}", path.display(), e))
            })
        }
        WeightsFile::Pytorch(path) => VarBuilder::from_pth(path, DType::F32, device).map_err(|e| {
            EngineError::configuration(format!("Failed to load weights {}: {}", path.display(), e))
        }),
    }
}

/// Tokenizer and network bound together. Both are read-only after load, so
/// forward passes from several requests may overlap.
struct CandleClassifier {
    tokenizer: Tokenizer,
    network: ClassifierNetwork,
    max_length: usize,
}

impl SequenceClassifier for CandleClassifier {
    fn logits(&self, text: &str) -> Result<Tensor, EngineError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| EngineError::prediction(format!("Tokenization failed: {}", e)))?;
        let ids = encoding.get_ids();
        debug!("Encoded {} tokens", ids.len());

        self.network
            .forward(ids)
            .map_err(|e| EngineError::prediction(format!("Model forward pass failed: {}", e)))
    }

    fn architecture(&self) -> &str {
        self.network.architecture().name()
    }

    fn max_length(&self) -> usize {
        self.max_length
    }
}
