//! HTTP surface: the platform webhook and a health check.
//!
//! The webhook acknowledges every delivery with 200 before processing it; the platform expects
//! a fast answer and retries are not wanted. Processing runs on a spawned task.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use dflow_core::DflowError;
use flow_engine::EventProcessor;
use std::sync::Arc;
use tracing::{debug, error, warn};

#[derive(Clone)]
struct WebhookState {
    processor: Arc<EventProcessor>,
}

pub fn router(processor: Arc<EventProcessor>, webhook_path: &str) -> Router {
    Router::new()
        .route(webhook_path, post(receive))
        .route("/health", get(health))
        .with_state(WebhookState { processor })
}

async fn receive(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let header = state.processor.platform().signature_header();
    let signature = headers
        .get(header)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    debug!(bytes = body.len(), has_signature = signature.is_some(), "Webhook received");

    let processor = state.processor.clone();
    tokio::spawn(async move {
        match processor.process_delivery(signature.as_deref(), &body).await {
            Ok(_) => {}
            Err(DflowError::InvalidSignature) => {
                warn!("Signature validation failed, delivery dropped");
            }
            Err(e) => error!(error = %e, "Failed to process delivery"),
        }
    });

    StatusCode::OK
}

async fn health() -> &'static str {
    "ok"
}
