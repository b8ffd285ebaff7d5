use clap::Parser;
use std::sync::Arc;

use drawthings_cache::{AppState, config::Args, handlers, logging, shutdown::shutdown_signal};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // parse cli arguments
    let args = Args::parse();
    logging::init(&args.log_level);

    let state = Arc::new(AppState::from_args(&args)?);

    // no request can be served without the cache directory
    if let Err(e) = state.orchestrator.store().ensure_root().await {
        tracing::error!(dir = %args.cache_dir.display(), error = %e, "Error creating cache directory");
        std::process::exit(1);
    }

    let app = handlers::router(Arc::clone(&state));

    let addr = args.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(
        %addr,
        cache_dir = %args.cache_dir.display(),
        max_cache_size = args.max_cache_size,
        backend = %state.orchestrator.gateway().base_url(),
        timeout_secs = args.timeout_secs,
        "Draw Things cache server running"
    );
    tracing::info!(
        "Available endpoints: GET /health, GET /metrics, POST /api/generate, GET /api/cache, \
         GET /api/cache/{{key}}, DELETE /api/cache, GET /files/{{filename}}"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
