use thiserror::Error;

/// Failures surfaced by the inference engine.
///
/// `Configuration` is fatal at startup and is never retried. `Validation` and
/// `Prediction` are per-request: the former is the caller's fault (HTTP 400),
/// the latter a server-side failure (HTTP 500).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    #[error("model configuration error: {0}")]
    Configuration(String),

    #[error("{0}")]
    Validation(String),

    #[error("prediction failed: {0}")]
    Prediction(String),
}

impl EngineError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn prediction(message: impl Into<String>) -> Self {
        Self::Prediction(message.into())
    }

    /// True for errors that mean the engine can never serve.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_configuration_errors_are_fatal() {
        assert!(EngineError::configuration("missing config.json").is_fatal());
        assert!(!EngineError::validation("empty").is_fatal());
        assert!(!EngineError::prediction("oom").is_fatal());
    }

    #[test]
    fn test_display_messages() {
        let err = EngineError::prediction("forward pass failed");
        assert_eq!(err.to_string(), "prediction failed: forward pass failed");
        let err = EngineError::validation("Input text cannot be empty");
        assert_eq!(err.to_string(), "Input text cannot be empty");
    }
}
