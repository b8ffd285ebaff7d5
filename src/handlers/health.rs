use axum::{Json, extract::State, response::IntoResponse};
use std::sync::Arc;

use crate::state::AppState;

pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let index = state.orchestrator.index();
    Json(serde_json::json!({
        "status": "healthy",
        "cacheSize": index.len(),
        "maxCacheSize": index.capacity(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}
