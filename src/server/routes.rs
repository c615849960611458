use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    response::{IntoResponse, Response},
    http::StatusCode,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, error, warn};

use crate::inference::{EngineError, InferenceEngine, ModelInfo, PredictionRequest};
use super::types::{ApiResponse, ErrorResponse, PredictRequest};

/// Returns a health check response
pub async fn health_check() -> &'static str {
    info!("Health check endpoint called");
    "phishscan is running!"
}

/// Classifies `input_text`.
///
/// 200 carries the prediction verbatim, 400 a malformed body or blank text,
/// 500 an inference or model initialization failure.
pub async fn predict(
    State(engine): State<Arc<InferenceEngine>>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Response {
    let Json(body) = match payload {
        Ok(body) => body,
        Err(rejection) => {
            warn!("Rejected prediction request: {}", rejection.body_text());
            return bad_request(json!(rejection.body_text()));
        }
    };

    let request = match PredictionRequest::new(body.input_text) {
        Ok(request) => request,
        Err(e) => {
            warn!("Rejected prediction request: {}", e);
            return bad_request(json!({ "input_text": [e.to_string()] }));
        }
    };

    info!("Predict endpoint called ({} chars)", request.text().len());

    // Forward passes are CPU/GPU bound; keep them off the async workers.
    let outcome = tokio::task::spawn_blocking(move || engine.predict_request(&request)).await;

    match outcome {
        Ok(Ok(result)) => {
            info!("Prediction: {} ({:.4})", result.label, result.confidence);
            (StatusCode::OK, Json(result)).into_response()
        }
        Ok(Err(EngineError::Validation(message))) => bad_request(json!({ "input_text": [message] })),
        Ok(Err(e)) => {
            error!("Error during prediction: {}", e);
            server_error(e.to_string())
        }
        Err(e) => {
            error!("Prediction task failed: {}", e);
            server_error(format!("Prediction task failed: {}", e))
        }
    }
}

/// Describes the loaded model, loading it first if needed.
pub async fn model_info(State(engine): State<Arc<InferenceEngine>>) -> impl IntoResponse {
    info!("Model info endpoint called");

    let outcome = tokio::task::spawn_blocking(move || engine.model().map(|m| m.info())).await;

    match outcome {
        Ok(Ok(info)) => (StatusCode::OK, Json(ApiResponse::success(info))),
        Ok(Err(e)) => {
            error!("Model unavailable: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse::<ModelInfo>::error(e.to_string())),
            )
        }
        Err(e) => {
            error!("Model info task failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<ModelInfo>::error(e.to_string())),
            )
        }
    }
}

fn bad_request(details: serde_json::Value) -> Response {
    let body = ErrorResponse {
        error: "Invalid request".to_string(),
        details,
    };
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

fn server_error(details: String) -> Response {
    let body = ErrorResponse {
        error: "Prediction failed".to_string(),
        details: json!(details),
    };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}
