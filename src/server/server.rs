use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use axum::{Router, routing::{get, post}};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::inference::InferenceEngine;
use super::routes;

/// API Server exposing the classifier over HTTP
pub struct ApiServer {
    engine: Arc<InferenceEngine>,
    host: String,
    port: u16,
}

impl ApiServer {
    pub fn new(engine: Arc<InferenceEngine>, host: String, port: u16) -> Self {
        info!("Creating new API server on {}:{}", host, port);
        Self { engine, host, port }
    }

    /// Routes with the engine as shared state.
    pub fn router(engine: Arc<InferenceEngine>) -> Router {
        Router::new()
            .route("/", get(routes::health_check))
            .route("/predict/", post(routes::predict))
            .route("/api/v1/predict", post(routes::predict))
            .route("/api/v1/model", get(routes::model_info))
            .layer(TraceLayer::new_for_http())
            .with_state(engine)
    }

    pub async fn start(&self) -> Result<()> {
        let app = Self::router(Arc::clone(&self.engine));

        info!("Starting server on {}:{}", self.host, self.port);
        let listener = TcpListener::bind((self.host.as_str(), self.port))
            .await
            .with_context(|| format!("Failed to bind {}:{}", self.host, self.port))?;

        info!("API endpoints:");
        info!("  GET  /               - Health check");
        info!("  POST /predict/       - Classify input_text");
        info!("  POST /api/v1/predict - Classify input_text");
        info!("  GET  /api/v1/model   - Loaded model details");
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        info!("Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
