//! Client for the external image-generation backend (Draw Things /
//! AUTOMATIC1111-style `sdapi`).
//!
//! One attempt per request, bounded by the client timeout. Failures are
//! classified into unavailable / timeout / other so the HTTP layer can map
//! them to distinct status codes.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde_json::Value;
use std::time::{Duration, Instant};

use crate::error::{ProxyError, Result};
use crate::metrics::GENERATION_LATENCY;
use crate::models::{BackendResponse, GenerationRequest};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

// The backend rejects this field when it carries the sentinel below
pub const TEA_CACHE_END_FIELD: &str = "tea_cache_end";
const TEA_CACHE_END_SENTINEL: f64 = -1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendOperation {
    TextToImage,
    ImageToImage,
}

impl BackendOperation {
    pub fn for_request(request: &GenerationRequest) -> Self {
        if request.is_img2img() {
            Self::ImageToImage
        } else {
            Self::TextToImage
        }
    }

    pub fn path(self) -> &'static str {
        match self {
            Self::TextToImage => "/sdapi/v1/txt2img",
            Self::ImageToImage => "/sdapi/v1/img2img",
        }
    }
}

/// Payload as the backend should see it: `tea_cache_end: -1` is dropped,
/// any other value passes through untouched.
pub fn normalize(request: &GenerationRequest) -> GenerationRequest {
    let is_sentinel = request
        .get(TEA_CACHE_END_FIELD)
        .and_then(Value::as_f64)
        .is_some_and(|v| v == TEA_CACHE_END_SENTINEL);

    if is_sentinel {
        tracing::debug!("Filtered out tea_cache_end: -1 (not supported by backend)");
        request.without(TEA_CACHE_END_FIELD)
    } else {
        request.clone()
    }
}

#[derive(Clone)]
pub struct GenerationGateway {
    http: Client,
    base_url: String,
    timeout: Duration,
}

impl GenerationGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProxyError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Generate one image and return its raw bytes.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<Vec<u8>> {
        let payload = normalize(request);
        let operation = BackendOperation::for_request(&payload);
        let url = format!("{}{}", self.base_url, operation.path());

        tracing::info!(?operation, %url, "Calling generation backend");
        let start = Instant::now();
        let result = self.call(&url, &payload).await;
        GENERATION_LATENCY.observe(start.elapsed().as_secs_f64());

        if let Err(e) = &result {
            tracing::error!(?operation, error = %e, "Generation failed");
        }
        result
    }

    async fn call(&self, url: &str, payload: &GenerationRequest) -> Result<Vec<u8>> {
        let res = self
            .http
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(ProxyError::Backend(format!(
                "backend returned {}: {}",
                status,
                error_message(&body)
            )));
        }

        let body: BackendResponse = res.json().await.map_err(|e| {
            if e.is_timeout() {
                ProxyError::BackendTimeout(self.timeout)
            } else {
                ProxyError::Backend(format!("malformed backend response: {e}"))
            }
        })?;

        let first = body.images.into_iter().next().ok_or(ProxyError::EmptyResult)?;
        decode_image(&first)
    }

    fn classify(&self, err: reqwest::Error) -> ProxyError {
        if err.is_timeout() {
            ProxyError::BackendTimeout(self.timeout)
        } else if err.is_connect() {
            ProxyError::BackendUnavailable {
                url: self.base_url.clone(),
                message: err.to_string(),
            }
        } else {
            ProxyError::Backend(err.to_string())
        }
    }
}

// Prefer the backend's own error field over the raw body
fn error_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|v| ["error", "detail", "message"].iter().find_map(|k| v.get(*k)))
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_else(|| body.trim().to_string())
}

// Accepts bare base64 or a data URL
fn decode_image(encoded: &str) -> Result<Vec<u8>> {
    let data = match encoded.split_once(',') {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => encoded,
    };
    let bytes = STANDARD
        .decode(data.trim())
        .map_err(|e| ProxyError::Backend(format!("backend returned invalid base64 image: {e}")))?;
    if bytes.is_empty() {
        return Err(ProxyError::EmptyResult);
    }
    Ok(bytes)
}
