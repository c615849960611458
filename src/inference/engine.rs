use once_cell::sync::OnceCell;
use tracing::{error, info};

use crate::config::Settings;

use super::error::EngineError;
use super::model::{LoadedModel, ModelLoader, ModelSource};
use super::predictor::{self, PredictionRequest, PredictionResult};
use super::provider::CandleModelLoader;

/// Process-wide holder of the single loaded model.
///
/// The first call to [`InferenceEngine::model`] runs the loader; concurrent
/// callers block until it finishes. The outcome, success or failure, is kept
/// for the engine's lifetime: a failed load is reported on every later call
/// and never retried.
pub struct InferenceEngine {
    loader: Box<dyn ModelLoader>,
    model: OnceCell<Result<LoadedModel, EngineError>>,
}

impl InferenceEngine {
    pub fn new(loader: impl ModelLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            model: OnceCell::new(),
        }
    }

    /// Engine backed by the candle loader configured from `settings`.
    pub fn from_settings(settings: &Settings) -> Self {
        let loader = CandleModelLoader {
            source: ModelSource::from_path(settings.model.path.clone()),
            default_model_id: settings.model.default_id.clone(),
            revision: settings.model.revision.clone(),
            device: settings.inference.device,
            max_length: settings.inference.max_length,
        };
        Self::new(loader)
    }

    /// Returns the loaded model, loading it on first use.
    pub fn model(&self) -> Result<&LoadedModel, EngineError> {
        let outcome = self.model.get_or_init(|| {
            info!("Initializing model...");
            match self.loader.load() {
                Ok(model) => {
                    info!("Model ready: {:?}", model);
                    Ok(model)
                }
                Err(e) => {
                    error!("Error initializing model: {}", e);
                    Err(e)
                }
            }
        });
        outcome.as_ref().map_err(Clone::clone)
    }

    /// True once a model has loaded successfully.
    pub fn is_ready(&self) -> bool {
        matches!(self.model.get(), Some(Ok(_)))
    }

    /// Validates `text` and classifies it.
    pub fn predict(&self, text: &str) -> Result<PredictionResult, EngineError> {
        let request = PredictionRequest::new(text)?;
        self.predict_request(&request)
    }

    pub fn predict_request(&self, request: &PredictionRequest) -> Result<PredictionResult, EngineError> {
        let model = self.model()?;
        predictor::predict(model, request).map_err(|e| {
            error!("Error during prediction: {}", e);
            e
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::device::DeviceKind;
    use crate::inference::model::{ModelConfig, SequenceClassifier};
    use candle_core::{Device, Tensor};
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    /// Scores text by simple word statistics so outputs vary with input.
    struct WordCountClassifier {
        num_labels: usize,
    }

    impl SequenceClassifier for WordCountClassifier {
        fn logits(&self, text: &str) -> Result<Tensor, EngineError> {
            let words = text.split_whitespace().take(self.max_length()).count() as f32;
            let scores: Vec<f32> = (0..self.num_labels)
                .map(|i| ((i as f32 + 1.0) * words).sin())
                .collect();
            Tensor::new(scores.as_slice(), &Device::Cpu)
                .and_then(|t| t.unsqueeze(0))
                .map_err(|e| EngineError::prediction(e.to_string()))
        }

        fn architecture(&self) -> &str {
            "word-count"
        }

        fn max_length(&self) -> usize {
            512
        }
    }

    struct CountingLoader {
        source: ModelSource,
        loads: Arc<AtomicUsize>,
        delay: Duration,
    }

    impl CountingLoader {
        fn new(source: ModelSource) -> (Self, Arc<AtomicUsize>) {
            let loads = Arc::new(AtomicUsize::new(0));
            let loader = Self {
                source,
                loads: Arc::clone(&loads),
                delay: Duration::ZERO,
            };
            (loader, loads)
        }
    }

    impl ModelLoader for CountingLoader {
        fn load(&self) -> Result<LoadedModel, EngineError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            thread::sleep(self.delay);
            let config = ModelConfig::resolve(self.source.clone(), DeviceKind::Cpu);
            let classifier = WordCountClassifier {
                num_labels: config.num_labels,
            };
            Ok(LoadedModel::new(config, Box::new(classifier)))
        }
    }

    struct FailingLoader {
        loads: Arc<AtomicUsize>,
    }

    impl ModelLoader for FailingLoader {
        fn load(&self) -> Result<LoadedModel, EngineError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Err(EngineError::configuration("No config.json found in /models/broken"))
        }
    }

    #[test]
    fn test_default_source_predicts_four_class_keys() {
        let (loader, _) = CountingLoader::new(ModelSource::Default);
        let engine = InferenceEngine::new(loader);

        let result = engine.predict("Please verify your account now").unwrap();
        let keys: HashSet<&str> = result.probabilities.labels().collect();
        let expected: HashSet<&str> =
            ["legitimate_email", "phishing_url", "legitimate_url", "phishing_url_alt"].into();
        assert_eq!(keys, expected);
        assert!(expected.contains(result.label.as_str()));
    }

    #[test]
    fn test_local_source_predicts_two_class_keys() {
        let (loader, _) = CountingLoader::new(ModelSource::LocalPath(PathBuf::from("/models/ft")));
        let engine = InferenceEngine::new(loader);

        let result = engine.predict("Hi, attached is the invoice").unwrap();
        let keys: Vec<&str> = result.probabilities.labels().collect();
        assert_eq!(keys, vec!["benign", "phishing"]);
    }

    #[test]
    fn test_probabilities_form_a_distribution_and_label_is_argmax() {
        let (loader, _) = CountingLoader::new(ModelSource::Default);
        let engine = InferenceEngine::new(loader);

        for text in ["a", "urgent: reset your password", "lunch tomorrow?", "x y z w v u"] {
            let result = engine.predict(text).unwrap();
            let sum: f32 = result.probabilities.iter().map(|(_, p)| p).sum();
            assert!((sum - 1.0).abs() < 1e-5, "sum was {}", sum);
            assert!(result.probabilities.iter().all(|(_, p)| (0.0..=1.0).contains(&p)));

            let top = result
                .probabilities
                .iter()
                .fold(None, |best: Option<(&str, f32)>, (l, p)| match best {
                    Some((_, bp)) if p <= bp => best,
                    _ => Some((l, p)),
                })
                .unwrap();
            assert_eq!(result.label, top.0);
            assert_eq!(result.confidence, top.1);
        }
    }

    #[test]
    fn test_prediction_is_idempotent() {
        let (loader, _) = CountingLoader::new(ModelSource::Default);
        let engine = InferenceEngine::new(loader);

        let first = engine.predict("Your mailbox is full, click here").unwrap();
        let second = engine.predict("Your mailbox is full, click here").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_blank_text_never_reaches_the_model() {
        let (loader, loads) = CountingLoader::new(ModelSource::Default);
        let engine = InferenceEngine::new(loader);

        assert!(matches!(engine.predict(""), Err(EngineError::Validation(_))));
        assert!(matches!(engine.predict("   \n"), Err(EngineError::Validation(_))));
        assert_eq!(loads.load(Ordering::SeqCst), 0);
        assert!(!engine.is_ready());
    }

    #[test]
    fn test_long_input_does_not_fail() {
        let (loader, _) = CountingLoader::new(ModelSource::Default);
        let engine = InferenceEngine::new(loader);

        let text = "verify your account ".repeat(2000);
        assert!(engine.predict(&text).is_ok());
    }

    #[test]
    fn test_concurrent_first_access_loads_once() {
        let (mut loader, loads) = CountingLoader::new(ModelSource::Default);
        loader.delay = Duration::from_millis(50);
        let engine = Arc::new(InferenceEngine::new(loader));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let engine = Arc::clone(&engine);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    engine.predict(&format!("message number {}", i)).map(|r| r.label)
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap().is_ok());
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(engine.is_ready());
    }

    #[test]
    fn test_failed_load_is_not_retried() {
        let loads = Arc::new(AtomicUsize::new(0));
        let engine = InferenceEngine::new(FailingLoader {
            loads: Arc::clone(&loads),
        });

        for _ in 0..3 {
            let err = engine.predict("hello").unwrap_err();
            assert!(err.is_fatal());
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(!engine.is_ready());
    }
}
