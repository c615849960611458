// Client side of the prediction API: one-shot classification and an
// interactive shell, both talking to a running server over HTTP.
mod display;
mod shell;

use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::server::types::{ErrorResponse, PredictRequest};

pub use display::{display_indicators, display_model_info, display_prediction};
pub use shell::shell_loop;

/// Prediction as received from the server.
#[derive(Debug, Clone, Deserialize)]
pub struct PredictionResponse {
    pub label: String,
    pub confidence: f64,
    pub probabilities: BTreeMap<String, f64>,
}

/// Thin wrapper over the server's HTTP endpoints
pub struct ApiClient {
    client: Client,
    server_url: String,
}

impl ApiClient {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            server_url: server_url.into(),
        }
    }

    pub async fn classify(&self, text: &str) -> Result<PredictionResponse> {
        let response = self
            .client
            .post(format!("{}/api/v1/predict", self.server_url))
            .json(&PredictRequest {
                input_text: text.to_string(),
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if status.is_success() {
            return Ok(serde_json::from_str(&body)?);
        }

        match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(err) => Err(anyhow!("{} ({}): {}", err.error, status, details_text(&err.details))),
            Err(_) => Err(anyhow!("Server returned {}: {}", status, body)),
        }
    }

    /// Raw JSON body of `GET /api/v1/model`.
    pub async fn model_info(&self) -> Result<Value> {
        let response = self
            .client
            .get(format!("{}/api/v1/model", self.server_url))
            .send()
            .await?;
        Ok(response.json().await?)
    }
}

/// Flattens the `details` of an error body into one line.
fn details_text(details: &Value) -> String {
    match details {
        Value::String(s) => s.clone(),
        Value::Object(fields) => fields
            .iter()
            .map(|(field, messages)| match messages {
                Value::Array(items) => {
                    let joined: Vec<String> = items
                        .iter()
                        .map(|m| m.as_str().map(str::to_string).unwrap_or_else(|| m.to_string()))
                        .collect();
                    format!("{}: {}", field, joined.join("; "))
                }
                other => format!("{}: {}", field, other),
            })
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}
