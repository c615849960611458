use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

use phishscan::client::{
    display_indicators, display_model_info, display_prediction, shell_loop, ApiClient,
    PredictionResponse,
};
use phishscan::config::{LoggingConfig, Settings};
use phishscan::eml;
use phishscan::inference::{InferenceEngine, ModelInfo};
use phishscan::server::ApiServer;

#[derive(Parser)]
#[command(name = "phishscan", version, about = "Phishing email classifier service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the model and serve the prediction API
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        /// Local fine-tuned checkpoint directory (overrides ML_MODEL_PATH)
        #[arg(long)]
        model_path: Option<PathBuf>,
    },
    /// Load the model in-process and score one sample text
    Check {
        #[arg(long)]
        model_path: Option<PathBuf>,
        #[arg(long, default_value = "This is a test sentence.")]
        text: String,
    },
    /// Classify text or an .eml file through a running server
    Classify {
        #[arg(long, conflicts_with = "eml", required_unless_present = "eml")]
        text: Option<String>,
        #[arg(long)]
        eml: Option<PathBuf>,
    },
    /// Interactive classification shell against a running server
    Shell,
}

/// Main entry point
///
/// Settings are loaded before logging so the subscriber can honour the
/// configured level, format and log directory.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = Settings::new().context("Failed to load settings")?;

    match cli.command {
        Commands::Serve { host, port, model_path } => {
            if let Some(host) = host {
                settings.server.host = host;
            }
            if let Some(port) = port {
                settings.server.port = port;
            }
            if model_path.is_some() {
                settings.model.path = model_path;
            }
            let _guard = init_logging(&settings.logging);
            serve(settings).await
        }
        Commands::Check { model_path, text } => {
            if model_path.is_some() {
                settings.model.path = model_path;
            }
            let _guard = init_logging(&settings.logging);
            check(settings, text).await
        }
        Commands::Classify { text, eml } => {
            let _guard = init_logging(&settings.logging);
            let (text, email) = match (text, eml) {
                (Some(text), _) => (text, None),
                (None, Some(path)) => {
                    let raw = std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    let email = eml::extract_text(&raw);
                    let indicators = eml::extract_indicators(&raw);
                    (email.classifiable_text(), Some((email, indicators)))
                }
                (None, None) => bail!("Either --text or --eml is required"),
            };
            let client = ApiClient::new(settings.server.base_url());
            let prediction = client.classify(&text).await?;
            display_prediction(&prediction);
            if let Some((email, indicators)) = email {
                display_indicators(&email, &indicators);
            }
            Ok(())
        }
        Commands::Shell => {
            let _guard = init_logging(&settings.logging);
            shell_loop(&settings).await
        }
    }
}

async fn serve(settings: Settings) -> Result<()> {
    info!("phishscan starting up...");
    let engine = Arc::new(InferenceEngine::from_settings(&settings));

    if settings.inference.eager_load {
        // A model that cannot load must never serve.
        let info = load_model(Arc::clone(&engine)).await.map_err(|e| {
            error!("Refusing to serve: {}", e);
            e
        })?;
        info!("Serving {} on {}", info.source, info.device);
    } else {
        info!("Model will load on first request");
    }

    let server = ApiServer::new(engine, settings.server.host.clone(), settings.server.port);
    server.start().await?;
    Ok(())
}

async fn check(settings: Settings, text: String) -> Result<()> {
    let engine = Arc::new(InferenceEngine::from_settings(&settings));
    let info = load_model(Arc::clone(&engine)).await?;
    display_model_info(&json!({ "status": "success", "data": info }));

    info!("Testing a simple inference");
    let result = tokio::task::spawn_blocking(move || engine.predict(&text)).await??;
    let prediction: PredictionResponse = serde_json::from_value(serde_json::to_value(&result)?)?;
    display_prediction(&prediction);
    info!("Model inference successful");
    Ok(())
}

/// Runs the (blocking) model load behind a spinner.
async fn load_model(engine: Arc<InferenceEngine>) -> Result<ModelInfo> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner} {wide_msg}")?);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message("Loading model...");

    let outcome = tokio::task::spawn_blocking(move || engine.model().map(|m| m.info())).await?;
    match outcome {
        Ok(info) => {
            pb.finish_with_message(format!("Model loaded ({}, {})", info.architecture, info.device));
            Ok(info)
        }
        Err(e) => {
            pb.finish_with_message("Model failed to load");
            Err(e.into())
        }
    }
}

fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},tower_http=info", config.level.to_lowercase())));

    let (writer, guard) = match &config.directory {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "phishscan.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            (BoxMakeWriter::new(non_blocking), Some(guard))
        }
        None => (BoxMakeWriter::new(std::io::stderr), None),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        // Disable ANSI colors for cleaner log files
        .with_ansi(config.directory.is_none())
        .with_line_number(true)
        .with_file(true)
        .with_thread_ids(true)
        .with_target(false);

    if config.format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }
    guard
}
