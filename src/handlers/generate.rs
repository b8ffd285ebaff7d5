use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde_json::Value;
use std::sync::Arc;

use crate::error::ProxyError;
use crate::metrics::REQUEST_TOTAL;
use crate::models::{GenerateResponse, GenerationRequest};
use crate::state::AppState;

use super::data_url;

pub async fn generate_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<GenerateResponse>, ProxyError> {
    REQUEST_TOTAL.inc();

    let Json(body) = payload.map_err(|e| ProxyError::InvalidRequest(e.body_text()))?;
    let request = GenerationRequest::try_from(body)?;

    let outcome = state.orchestrator.handle_generate(&request).await?;

    Ok(Json(GenerateResponse {
        success: true,
        cached: outcome.cached,
        images: vec![data_url(&outcome.image)],
        metadata: outcome.metadata,
        cache_key: outcome.fingerprint.to_string(),
    }))
}
