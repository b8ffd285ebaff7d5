use axum::{
    Json,
    extract::{Path, State},
};
use serde_json::json;
use std::sync::Arc;

use crate::error::ProxyError;
use crate::fingerprint::Fingerprint;
use crate::models::{CacheListItem, CacheListResponse, CachedImageResponse};
use crate::state::AppState;

use super::data_url;

// GET /api/cache/{key}
pub async fn cache_entry_handler(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<CachedImageResponse>, ProxyError> {
    let key = Fingerprint::from(key);
    let (entry, image) = state
        .orchestrator
        .cached_image(&key)
        .await
        .map_err(|e| match e {
            ProxyError::NotFound(_) => ProxyError::NotFound("Cached file not found".to_string()),
            other => other,
        })?;

    Ok(Json(CachedImageResponse {
        success: true,
        image: data_url(&image),
        metadata: entry.metadata,
    }))
}

// GET /api/cache
pub async fn list_cache_handler(State(state): State<Arc<AppState>>) -> Json<CacheListResponse> {
    let index = state.orchestrator.index();
    let cache: Vec<CacheListItem> = index
        .list_all()
        .into_iter()
        .map(|entry| CacheListItem {
            key: entry.fingerprint.to_string(),
            filename: entry.filename,
            timestamp: entry.created_at.timestamp_millis(),
            metadata: entry.metadata,
        })
        .collect();

    Json(CacheListResponse {
        success: true,
        total_files: cache.len(),
        cache,
        max_size: index.capacity(),
    })
}

// DELETE /api/cache
pub async fn clear_cache_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    state.orchestrator.index().clear().await;
    Json(json!({
        "success": true,
        "message": "Cache cleared successfully"
    }))
}
