//! Raw definition documents.
//!
//! A definition file is one YAML document describing a mod: variables,
//! credentials/connections, pipelines and triggers. The document skeleton is
//! typed here; pipeline, step and trigger bodies stay as raw JSON values and
//! are decoded attribute by attribute so one bad resource never takes its
//! siblings down.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::Result;

/// One parsed definition document, prior to decoding.
#[derive(Debug, Clone, Deserialize)]
pub struct RawDocument {
    /// Mod name.
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Mod-level variables, available to expressions as `var.*`.
    #[serde(default)]
    pub variables: Map<String, Value>,

    /// Direct mod dependencies.
    #[serde(default)]
    pub depends_on: Vec<String>,

    #[serde(default)]
    pub credentials: Vec<RawResourceDef>,

    #[serde(default)]
    pub connections: Vec<RawResourceDef>,

    #[serde(default)]
    pub pipelines: Vec<Value>,

    #[serde(default)]
    pub triggers: Vec<Value>,
}

/// A credential or connection registry entry.
#[derive(Debug, Clone, Deserialize)]
pub struct RawResourceDef {
    #[serde(rename = "type")]
    pub ty: String,
    pub name: String,
    #[serde(flatten)]
    pub attrs: Map<String, Value>,
}

impl RawDocument {
    /// Parse one YAML document. A syntactically broken document is a hard
    /// error; everything past this point degrades to per-resource
    /// diagnostics.
    pub fn parse(text: &str) -> Result<RawDocument> {
        Ok(serde_yaml::from_str(text)?)
    }
}

/// Fetch a required string field from a raw resource body.
pub fn require_str(body: &Value, key: &str) -> Option<String> {
    body.get(key).and_then(Value::as_str).map(str::to_string)
}
