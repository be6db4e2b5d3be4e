//! Pipeline and trigger parameters.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::definition::types::Type;

/// A typed, optionally-defaulted named input to a pipeline or trigger.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Type,
    pub optional: bool,
    /// Must satisfy the declared type; if an enum is present, must be a
    /// member.
    pub default: Option<Value>,
    /// Legal only for string/bool/number and their list forms.
    pub enum_values: Option<Vec<Value>>,
    pub description: Option<String>,
    pub tags: BTreeMap<String, String>,
    /// Display format hint, e.g. `multiline` or `password`.
    pub format: Option<String>,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Param {
            name: name.into(),
            ty,
            optional: false,
            default: None,
            enum_values: None,
            description: None,
            tags: BTreeMap::new(),
            format: None,
        }
    }

    /// A param lacking both a default and the optional flag must appear in
    /// every invocation's argument set.
    pub fn is_required(&self) -> bool {
        !self.optional && self.default.is_none()
    }

    /// Enum membership check. For list-typed params every element must be a
    /// member.
    pub fn satisfies_enum(&self, value: &Value) -> bool {
        let Some(allowed) = &self.enum_values else {
            return true;
        };
        match value {
            Value::Array(items) => items.iter().all(|v| allowed.contains(v)),
            other => allowed.contains(other),
        }
    }
}
