use candle_core::{DType, Device, IndexOp, Module, Tensor};
use candle_nn::{Linear, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use candle_transformers::models::distilbert::{Config as DistilBertConfig, DistilBertModel};
use serde_json::Value;
use tracing::{info, warn};

use super::error::EngineError;

/// Encoder families with a sequence-classification head we can bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    DistilBert,
    Bert,
}

impl Architecture {
    /// Reads `model_type`, then `architectures`, from a checkpoint's `config.json`.
    pub fn detect(config: &Value) -> Result<Self, EngineError> {
        let from_name = |name: &str| -> Option<Architecture> {
            let name = name.to_lowercase();
            if name.starts_with("distilbert") {
                Some(Architecture::DistilBert)
            } else if name.starts_with("bert") {
                Some(Architecture::Bert)
            } else {
                None
            }
        };

        if let Some(arch) = config.get("model_type").and_then(Value::as_str).and_then(from_name) {
            return Ok(arch);
        }
        config
            .get("architectures")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .find_map(from_name)
            .ok_or_else(|| {
                EngineError::configuration(
                    "Unsupported checkpoint: config.json names neither a DistilBERT nor a BERT model",
                )
            })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Architecture::DistilBert => "distilbert",
            Architecture::Bert => "bert",
        }
    }

    /// Width of the encoder output. DistilBERT calls it `dim`.
    pub fn hidden_size(&self, config: &Value) -> Result<usize, EngineError> {
        let key = match self {
            Architecture::DistilBert => "dim",
            Architecture::Bert => "hidden_size",
        };
        config
            .get(key)
            .and_then(Value::as_u64)
            .map(|v| v as usize)
            .ok_or_else(|| EngineError::configuration(format!("config.json is missing '{}'", key)))
    }
}

enum Encoder {
    DistilBert(DistilBertModel),
    Bert(BertModel),
}

/// Transformer encoder with its sequence-classification head.
///
/// DistilBERT: `[CLS]` state -> `pre_classifier` -> ReLU -> `classifier`.
/// BERT: `[CLS]` state -> pooler dense -> tanh -> `classifier`.
pub struct ClassifierNetwork {
    architecture: Architecture,
    encoder: Encoder,
    pooler: Linear,
    classifier: Linear,
    device: Device,
}

impl ClassifierNetwork {
    /// Binds the encoder strictly and the head leniently: head tensors that are
    /// missing or shaped for a different label count are reinitialized.
    pub fn load(
        architecture: Architecture,
        config_json: &str,
        vb: VarBuilder,
        num_labels: usize,
    ) -> Result<Self, EngineError> {
        let raw: Value = serde_json::from_str(config_json)
            .map_err(|e| EngineError::configuration(format!("Failed to parse config.json: {}", e)))?;
        let hidden_size = architecture.hidden_size(&raw)?;
        let device = vb.device().clone();

        let (encoder, pooler) = match architecture {
            Architecture::DistilBert => {
                let config: DistilBertConfig = serde_json::from_str(config_json).map_err(|e| {
                    EngineError::configuration(format!("Invalid DistilBERT config: {}", e))
                })?;
                let model = DistilBertModel::load(vb.pp("distilbert"), &config).map_err(|e| {
                    EngineError::configuration(format!("Failed to load DistilBERT encoder: {}", e))
                })?;
                let pooler = linear_or_reinit(&vb, hidden_size, hidden_size, "pre_classifier")?;
                (Encoder::DistilBert(model), pooler)
            }
            Architecture::Bert => {
                let config: BertConfig = serde_json::from_str(config_json)
                    .map_err(|e| EngineError::configuration(format!("Invalid BERT config: {}", e)))?;
                let model = BertModel::load(vb.pp("bert"), &config).map_err(|e| {
                    EngineError::configuration(format!("Failed to load BERT encoder: {}", e))
                })?;
                let pooler = linear_or_reinit(&vb, hidden_size, hidden_size, "bert.pooler.dense")?;
                (Encoder::Bert(model), pooler)
            }
        };
        let classifier = linear_or_reinit(&vb, hidden_size, num_labels, "classifier")?;

        info!(
            "Bound {} encoder (hidden_size={}) with {}-way head",
            architecture.name(),
            hidden_size,
            num_labels
        );

        Ok(Self {
            architecture,
            encoder,
            pooler,
            classifier,
            device,
        })
    }

    pub fn architecture(&self) -> Architecture {
        self.architecture
    }

    /// Scores one tokenized sequence. Returns logits shaped `(1, num_labels)`.
    pub fn forward(&self, token_ids: &[u32]) -> candle_core::Result<Tensor> {
        let seq_len = token_ids.len();
        let input_ids = Tensor::new(token_ids, &self.device)?.unsqueeze(0)?;

        let hidden = match &self.encoder {
            Encoder::DistilBert(model) => {
                // candle's DistilBERT masks positions set to 1; a single unpadded
                // sequence attends everywhere.
                let mask = Tensor::zeros((1, seq_len), DType::U8, &self.device)?;
                model.forward(&input_ids, &mask)?
            }
            Encoder::Bert(model) => {
                let token_type_ids = input_ids.zeros_like()?;
                model.forward(&input_ids, &token_type_ids, None)?
            }
        };

        let cls = hidden.i((.., 0))?;
        let pooled = self.pooler.forward(&cls)?;
        let pooled = match self.architecture {
            Architecture::DistilBert => pooled.relu()?,
            Architecture::Bert => pooled.tanh()?,
        };
        self.classifier.forward(&pooled)
    }
}

/// Loads `prefix.weight`/`prefix.bias`, falling back to a fresh
/// normal(0, 0.02) layer when the tensors are absent or mis-shaped.
fn linear_or_reinit(
    vb: &VarBuilder,
    in_dim: usize,
    out_dim: usize,
    prefix: &str,
) -> Result<Linear, EngineError> {
    match candle_nn::linear(in_dim, out_dim, vb.pp(prefix)) {
        Ok(linear) => Ok(linear),
        Err(e) => {
            warn!(
                "Reinitializing '{}' as {}x{} ({}). Predictions from this layer are untrained.",
                prefix, out_dim, in_dim, e
            );
            let init = || -> candle_core::Result<Linear> {
                let weight = Tensor::randn(0f32, 0.02, (out_dim, in_dim), vb.device())?;
                let bias = Tensor::zeros(out_dim, DType::F32, vb.device())?;
                Ok(Linear::new(weight, Some(bias)))
            };
            init().map_err(|e| {
                EngineError::configuration(format!("Failed to initialize '{}': {}", prefix, e))
            })
        }
    }
}
