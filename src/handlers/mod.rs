mod cache;
mod error;
mod files;
mod generate;
mod health;
mod metrics;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::state::AppState;

pub use cache::{cache_entry_handler, clear_cache_handler, list_cache_handler};
pub use files::file_handler;
pub use generate::generate_handler;
pub use health::health_handler;
pub use metrics::metrics_handler;

// img2img requests carry their source images inline
pub const BODY_LIMIT: usize = 50 * 1024 * 1024;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/generate", post(generate_handler))
        .route("/api/cache", get(list_cache_handler).delete(clear_cache_handler))
        .route("/api/cache/{key}", get(cache_entry_handler))
        .route("/files/{filename}", get(file_handler))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

// Images cross the JSON boundary as PNG data URLs
pub fn data_url(image: &[u8]) -> String {
    use base64::Engine;
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(image)
    )
}
