use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

use crate::models::GenerationRequest;

// Hex SHA-256 of a request's canonical JSON form
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Keys arriving over HTTP are looked up as-is
impl From<String> for Fingerprint {
    fn from(key: String) -> Self {
        Self(key)
    }
}

// Create a cache key (hash of every field, key order ignored)
pub fn fingerprint(request: &GenerationRequest) -> Fingerprint {
    let mut canonical = String::new();
    write_object(&mut canonical, request.fields());

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Fingerprint(format!("{:x}", hasher.finalize()))
}

// Objects are written with keys sorted at every depth, so the output does not
// depend on which map ordering serde_json was built with.
fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Object(map) => write_object(out, map),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        // scalars serialize infallibly
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn write_object(out: &mut String, map: &serde_json::Map<String, Value>) {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();

    out.push('{');
    for (i, key) in keys.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&Value::String(key.clone()).to_string());
        out.push(':');
        write_value(out, &map[key]);
    }
    out.push('}');
}
