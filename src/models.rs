use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProxyError;

// Field that marks an img2img request
pub const INIT_IMAGES_FIELD: &str = "init_images";

// Shown in metadata when the request carries no prompt
pub const NO_PROMPT: &str = "No prompt provided";

// Generation request as sent by the UI. Opaque apart from a couple of fields,
// forwarded to the backend close to verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenerationRequest(Map<String, Value>);

impl GenerationRequest {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    // Copy of this request without `field`
    pub fn without(&self, field: &str) -> Self {
        let mut fields = self.0.clone();
        fields.remove(field);
        Self(fields)
    }

    // Non-empty prompt text, if any
    pub fn prompt(&self) -> Option<&str> {
        self.0
            .get("prompt")
            .and_then(Value::as_str)
            .filter(|p| !p.is_empty())
    }

    pub fn is_img2img(&self) -> bool {
        matches!(self.0.get(INIT_IMAGES_FIELD), Some(v) if !v.is_null())
    }
}

impl From<Map<String, Value>> for GenerationRequest {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

impl TryFrom<Value> for GenerationRequest {
    type Error = ProxyError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(fields) => Ok(Self(fields)),
            other => Err(ProxyError::InvalidRequest(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// Subset of generation parameters kept alongside a cached image
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cfg_scale: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampler_name: Option<Value>,
}

// Metadata snapshot stored with a cache entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetadata {
    pub prompt: String,
    pub generated_at: DateTime<Utc>,
    pub parameters: GenerationParameters,
}

impl CacheMetadata {
    pub fn from_request(request: &GenerationRequest) -> Self {
        let param = |name: &str| request.get(name).filter(|v| !v.is_null()).cloned();

        Self {
            prompt: request.prompt().unwrap_or(NO_PROMPT).to_string(),
            generated_at: Utc::now(),
            parameters: GenerationParameters {
                steps: param("steps"),
                cfg_scale: param("cfg_scale"),
                width: param("width"),
                height: param("height"),
                sampler_name: param("sampler_name"),
            },
        }
    }
}

// Backend txt2img / img2img response format
#[derive(Debug, Deserialize)]
pub struct BackendResponse {
    #[serde(default)]
    pub images: Vec<String>,
}

// POST /api/generate response format
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub success: bool,
    pub cached: bool,
    pub images: Vec<String>,
    pub metadata: CacheMetadata,
    pub cache_key: String,
}

// GET /api/cache/{key} response format
#[derive(Debug, Serialize, Deserialize)]
pub struct CachedImageResponse {
    pub success: bool,
    pub image: String,
    pub metadata: CacheMetadata,
}

// One row of GET /api/cache
#[derive(Debug, Serialize, Deserialize)]
pub struct CacheListItem {
    pub key: String,
    pub filename: String,
    pub timestamp: i64,
    pub metadata: CacheMetadata,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheListResponse {
    pub success: bool,
    pub cache: Vec<CacheListItem>,
    pub total_files: usize,
    pub max_size: usize,
}
