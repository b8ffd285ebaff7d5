//! Request-deduplicating image cache in front of a Draw Things generation
//! backend.
//!
//! A generate request is fingerprinted over its canonical JSON form. Hits are
//! served from disk; misses go to the backend once, the resulting image is
//! written to the artifact directory and recorded in a bounded FIFO index.

pub mod cache;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod gateway;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod shutdown;
pub mod state;
pub mod store;

pub use error::{ProxyError, Result};
pub use orchestrator::{GenerateOutcome, Orchestrator};
pub use state::AppState;
