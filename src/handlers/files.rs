use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
};
use std::sync::Arc;

use crate::error::ProxyError;
use crate::state::AppState;

// GET /files/{filename}: raw bytes straight from the store
pub async fn file_handler(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, ProxyError> {
    let bytes = state
        .orchestrator
        .store()
        .read(&filename)
        .await
        .map_err(|e| match e {
            ProxyError::NotFound(_) => ProxyError::NotFound("File not found".to_string()),
            other => other,
        })?;

    Ok(([(header::CONTENT_TYPE, "image/png")], bytes))
}
