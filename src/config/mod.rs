// Required external crates for configuration management and serialization
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::inference::tokenizer::MAX_SEQUENCE_LENGTH;
use crate::inference::{DevicePreference, DEFAULT_MODEL_ID};

/// Environment variable naming a local fine-tuned checkpoint directory.
pub const MODEL_PATH_ENV: &str = "ML_MODEL_PATH";

/// Which checkpoint to load
#[derive(Debug, Deserialize, Clone)]
pub struct ModelSettings {
    /// Local fine-tuned checkpoint directory; unset selects the public model
    pub path: Option<PathBuf>,
    /// Hugging Face hub id of the public model
    pub default_id: String,
    /// Hub revision (branch, tag or commit) of the public model
    pub revision: String,
}

/// Configuration for model inference parameters
#[derive(Debug, Deserialize, Clone)]
pub struct InferenceSettings {
    /// auto, cpu or cuda
    pub device: DevicePreference,
    /// Token limit per input; longer inputs are truncated
    pub max_length: usize,
    /// Load the model before the server starts accepting requests
    pub eager_load: bool,
}

/// Configuration for the HTTP server
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl ServerConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Configuration for application logging
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// text or json
    pub format: String,
    /// Directory for daily-rolling log files; console only when unset
    pub directory: Option<PathBuf>,
}

/// Main settings struct that contains all configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub model: ModelSettings,
    pub inference: InferenceSettings,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

impl Settings {
    /// Loads settings from `./config`, in the following order of precedence
    /// (highest to lowest):
    /// 1. `ML_MODEL_PATH` (model path only)
    /// 2. Environment variables prefixed with PHISHSCAN__ (e.g. PHISHSCAN__SERVER__PORT)
    /// 3. Local config file (local.toml) if present
    /// 4. Default config file (default.toml) if present
    /// 5. Built-in defaults
    pub fn new() -> Result<Self, ConfigError> {
        let config_dir = std::env::current_dir()
            .map_err(|e| ConfigError::Message(format!("Failed to get current directory: {}", e)))?
            .join("config");
        Self::load(&config_dir)
    }

    pub fn load(config_dir: &Path) -> Result<Self, ConfigError> {
        let default_config = config_dir.join("default.toml");
        let local_config = config_dir.join("local.toml");

        let builder = Self::defaults()?
            .add_source(File::with_name(&default_config.to_string_lossy()).required(false))
            .add_source(File::with_name(&local_config.to_string_lossy()).required(false))
            .add_source(
                Environment::with_prefix("PHISHSCAN")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        Self::finish(builder, std::env::var_os(MODEL_PATH_ENV))
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("model.default_id", DEFAULT_MODEL_ID)?
            .set_default("model.revision", "main")?
            .set_default("inference.device", "auto")?
            .set_default("inference.max_length", MAX_SEQUENCE_LENGTH as i64)?
            .set_default("inference.eager_load", true)?
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8000)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "text")
    }

    fn finish(
        builder: ConfigBuilder<DefaultState>,
        model_path_env: Option<OsString>,
    ) -> Result<Self, ConfigError> {
        let mut settings = builder.build()?.try_deserialize::<Settings>()?;
        settings.apply_model_path(model_path_env);
        settings.validate()?;
        Ok(settings)
    }

    /// A non-empty `ML_MODEL_PATH` overrides any configured model path.
    fn apply_model_path(&mut self, value: Option<OsString>) {
        if let Some(path) = value.filter(|v| !v.is_empty()) {
            self.model.path = Some(PathBuf::from(path));
        }
    }

    /// Validate configuration values
    fn validate(&self) -> Result<(), ConfigError> {
        if self.inference.max_length == 0 || self.inference.max_length > MAX_SEQUENCE_LENGTH {
            return Err(ConfigError::Message(format!(
                "max_length must be between 1 and {}, got: {}",
                MAX_SEQUENCE_LENGTH, self.inference.max_length
            )));
        }

        if self.model.path.is_none() && self.model.default_id.trim().is_empty() {
            return Err(ConfigError::Message(
                "model.default_id must be set when no model path is configured".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigError::Message(
                "Port must be between 1 and 65535, got: 0".to_string(),
            ));
        }

        match self.logging.level.to_lowercase().as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => Ok(()),
            _ => Err(ConfigError::Message(format!(
                "Invalid logging level: {}. Must be one of: error, warn, info, debug, trace",
                self.logging.level
            ))),
        }?;

        match self.logging.format.to_lowercase().as_str() {
            "text" | "json" => Ok(()),
            _ => Err(ConfigError::Message(format!(
                "Invalid logging format: {}. Must be one of: text, json",
                self.logging.format
            ))),
        }?;

        if let Some(dir) = &self.logging.directory {
            if !dir.exists() {
                std::fs::create_dir_all(dir).map_err(|e| {
                    ConfigError::Message(format!(
                        "Failed to create log directory at {}: {}",
                        dir.display(),
                        e
                    ))
                })?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(toml: &str, model_path_env: Option<&str>) -> Result<Settings, ConfigError> {
        let builder = Settings::defaults()?.add_source(File::from_str(toml, FileFormat::Toml));
        Settings::finish(builder, model_path_env.map(OsString::from))
    }

    #[test]
    fn test_defaults_select_public_model() {
        let settings = from_toml("", None).unwrap();
        assert!(settings.model.path.is_none());
        assert_eq!(settings.model.default_id, DEFAULT_MODEL_ID);
        assert_eq!(settings.inference.device, DevicePreference::Auto);
        assert_eq!(settings.inference.max_length, 512);
        assert!(settings.inference.eager_load);
        assert_eq!(settings.server.base_url(), "http://127.0.0.1:8000");
    }

    #[test]
    fn test_model_path_env_overrides_file() {
        let toml = "[model]\npath = \"/srv/models/from-file\"\n";
        let settings = from_toml(toml, Some("/srv/models/from-env")).unwrap();
        assert_eq!(settings.model.path, Some(PathBuf::from("/srv/models/from-env")));

        let settings = from_toml(toml, Some("")).unwrap();
        assert_eq!(settings.model.path, Some(PathBuf::from("/srv/models/from-file")));
    }

    #[test]
    fn test_device_accepts_gpu_alias() {
        let settings = from_toml("[inference]\ndevice = \"gpu\"\n", None).unwrap();
        assert_eq!(settings.inference.device, DevicePreference::Cuda);
        assert!(from_toml("[inference]\ndevice = \"tpu\"\n", None).is_err());
    }

    #[test]
    fn test_rejects_out_of_range_max_length() {
        assert!(from_toml("[inference]\nmax_length = 0\n", None).is_err());
        assert!(from_toml("[inference]\nmax_length = 1024\n", None).is_err());
        assert!(from_toml("[inference]\nmax_length = 128\n", None).is_ok());
    }

    #[test]
    fn test_rejects_unknown_log_level() {
        let err = from_toml("[logging]\nlevel = \"loud\"\n", None).unwrap_err();
        assert!(err.to_string().contains("Invalid logging level"));
    }

    #[test]
    fn test_rejects_port_zero() {
        assert!(from_toml("[server]\nport = 0\n", None).is_err());
    }
}
