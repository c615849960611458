use std::sync::Arc;

use candle_core::{Device, Tensor};
use phishscan::inference::{
    DeviceKind, EngineError, InferenceEngine, LoadedModel, ModelConfig, ModelLoader, ModelSource,
    SequenceClassifier,
};
use phishscan::server::ApiServer;
use serde_json::{json, Value};
use tokio::net::TcpListener;

/// Puts most of the mass on the second label when the text mentions a link.
struct KeywordClassifier {
    num_labels: usize,
}

impl SequenceClassifier for KeywordClassifier {
    fn logits(&self, text: &str) -> Result<Tensor, EngineError> {
        let suspicious = text.contains("http");
        let scores: Vec<f32> = (0..self.num_labels)
            .map(|i| if (i == 1) == suspicious { 4.0 } else { 0.0 })
            .collect();
        Tensor::new(scores.as_slice(), &Device::Cpu)
            .and_then(|t| t.unsqueeze(0))
            .map_err(|e| EngineError::prediction(e.to_string()))
    }

    fn architecture(&self) -> &str {
        "keyword"
    }

    fn max_length(&self) -> usize {
        512
    }
}

struct StubLoader(ModelSource);

impl ModelLoader for StubLoader {
    fn load(&self) -> Result<LoadedModel, EngineError> {
        let config = ModelConfig::resolve(self.0.clone(), DeviceKind::Cpu);
        let classifier = KeywordClassifier {
            num_labels: config.num_labels,
        };
        Ok(LoadedModel::new(config, Box::new(classifier)))
    }
}

struct BrokenLoader;

impl ModelLoader for BrokenLoader {
    fn load(&self) -> Result<LoadedModel, EngineError> {
        Err(EngineError::configuration("No config.json found in /models/missing"))
    }
}

async fn spawn_server(loader: impl ModelLoader + 'static) -> String {
    let engine = Arc::new(InferenceEngine::new(loader));
    let app = ApiServer::router(engine);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn post_predict(base: &str, path: &str, body: Value) -> (u16, Value) {
    let response = reqwest::Client::new()
        .post(format!("{}{}", base, path))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = response.status().as_u16();
    (status, response.json().await.unwrap())
}

#[tokio::test]
async fn test_predict_returns_four_class_distribution() {
    let base = spawn_server(StubLoader(ModelSource::Default)).await;

    let (status, body) = post_predict(
        &base,
        "/predict/",
        json!({ "input_text": "Your account is locked, verify at http://example.test" }),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(body["label"], "phishing_url");
    let probabilities = body["probabilities"].as_object().unwrap();
    let mut keys: Vec<&str> = probabilities.keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(
        keys,
        vec!["legitimate_email", "legitimate_url", "phishing_url", "phishing_url_alt"]
    );
    let total: f64 = probabilities.values().map(|v| v.as_f64().unwrap()).sum();
    assert!((total - 1.0).abs() < 1e-4);
    let max = probabilities
        .values()
        .map(|v| v.as_f64().unwrap())
        .fold(f64::MIN, f64::max);
    assert!((body["confidence"].as_f64().unwrap() - max).abs() < 1e-6);
}

#[tokio::test]
async fn test_versioned_route_uses_binary_labels_for_local_checkpoint() {
    let base = spawn_server(StubLoader(ModelSource::LocalPath("/models/ft".into()))).await;

    let (status, body) = post_predict(
        &base,
        "/api/v1/predict",
        json!({ "input_text": "Lunch at noon tomorrow?" }),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(body["label"], "benign");
    let probabilities = body["probabilities"].as_object().unwrap();
    assert_eq!(probabilities.len(), 2);
    assert!(probabilities.contains_key("phishing"));
}

#[tokio::test]
async fn test_blank_input_is_rejected() {
    let base = spawn_server(StubLoader(ModelSource::Default)).await;

    let (status, body) = post_predict(&base, "/predict/", json!({ "input_text": "   " })).await;

    assert_eq!(status, 400);
    assert_eq!(body["error"], "Invalid request");
    assert_eq!(body["details"]["input_text"][0], "Input text cannot be empty");
}

#[tokio::test]
async fn test_missing_field_is_rejected() {
    let base = spawn_server(StubLoader(ModelSource::Default)).await;

    let (status, body) = post_predict(&base, "/predict/", json!({ "text": "hello" })).await;

    assert_eq!(status, 400);
    assert_eq!(body["error"], "Invalid request");
    assert!(body["details"].is_string());
}

#[tokio::test]
async fn test_failed_model_load_reports_server_error() {
    let base = spawn_server(BrokenLoader).await;

    for _ in 0..2 {
        let (status, body) =
            post_predict(&base, "/predict/", json!({ "input_text": "hello there" })).await;
        assert_eq!(status, 500);
        assert_eq!(body["error"], "Prediction failed");
        assert!(body["details"].as_str().unwrap().contains("config.json"));
    }
}

#[tokio::test]
async fn test_model_info_endpoint() {
    let base = spawn_server(StubLoader(ModelSource::Default)).await;

    let body: Value = reqwest::get(format!("{}/api/v1/model", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["status"], "success");
    assert_eq!(body["data"]["num_labels"], 4);
    assert_eq!(body["data"]["architecture"], "keyword");
    assert_eq!(body["data"]["device"], "cpu");
}

#[tokio::test]
async fn test_model_info_unavailable_when_load_fails() {
    let base = spawn_server(BrokenLoader).await;

    let response = reqwest::get(format!("{}/api/v1/model", base)).await.unwrap();
    assert_eq!(response.status().as_u16(), 503);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn test_start_reports_bind_failure() {
    let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = taken.local_addr().unwrap().port();
    let engine = Arc::new(InferenceEngine::new(BrokenLoader));

    let err = ApiServer::new(engine, "127.0.0.1".to_string(), port)
        .start()
        .await
        .unwrap_err();
    assert!(err.to_string().contains(&format!("Failed to bind 127.0.0.1:{}", port)));
}

#[tokio::test]
async fn test_health_check() {
    let base = spawn_server(BrokenLoader).await;

    let text = reqwest::get(&base).await.unwrap().text().await.unwrap();
    assert_eq!(text, "phishscan is running!");
}
