//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::{Router, body::Body, http::Request, response::Response};
use http_body_util::BodyExt;
use serde_json::Value;

use callbridge_gateway::{ServerConfig, routes, state::AppState};

/// Config pointing both providers at mock servers.
pub fn mock_config(openai_uri: &str, twilio_uri: &str) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.host = "127.0.0.1".to_string();
    config.port = 0;
    config.openai_api_key = Some("sk-test".to_string());
    config.openai_api_base_url = format!("{openai_uri}/v1");
    config.twilio_account_sid = Some("AC123".to_string());
    config.twilio_auth_token = Some("twilio-secret".to_string());
    config.twilio_phone_number = Some("+15557654321".to_string());
    config.twilio_api_base_url = twilio_uri.to_string();
    config.base_url = Some("https://calls.example.com".to_string());
    config
}

pub async fn app(config: ServerConfig) -> Router {
    routes::create_app(AppState::new(config).await)
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

pub async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub fn session_descriptor(token: &str) -> Value {
    serde_json::json!({
        "id": "sess_001",
        "object": "realtime.session",
        "model": "gpt-4o-realtime-preview-2024-12-17",
        "modalities": ["audio", "text"],
        "voice": "alloy",
        "client_secret": {"value": token, "expires_at": 1_900_000_000}
    })
}

pub fn shared<T>(value: T) -> Arc<parking_lot::Mutex<T>> {
    Arc::new(parking_lot::Mutex::new(value))
}
