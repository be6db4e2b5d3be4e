//! The type grammar and the two-state attribute value.

use serde_json::Value;

use crate::error::{Error, Result};
use crate::expr::{evaluate, Expr, Scope};

/// Declared parameter/attribute types.
///
/// `Credential` and `Connection` are late-bound reference types: their
/// values are resolved at execution time, never at decode time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    String,
    Bool,
    Number,
    Any,
    List(Box<Type>),
    Map(Box<Type>),
    Credential(String),
    Connection(String),
}

impl Type {
    /// Parse the textual form used in `type:` attributes, e.g. `string`,
    /// `list(number)`, `credential(aws)`.
    pub fn parse(text: &str) -> Result<Type> {
        let text = text.trim();
        match text {
            "string" => return Ok(Type::String),
            "bool" => return Ok(Type::Bool),
            "number" => return Ok(Type::Number),
            "any" => return Ok(Type::Any),
            "list" => return Ok(Type::List(Box::new(Type::Any))),
            "map" => return Ok(Type::Map(Box::new(Type::Any))),
            _ => {}
        }
        if let Some(inner) = wrapped(text, "list") {
            return Ok(Type::List(Box::new(Type::parse(inner)?)));
        }
        if let Some(inner) = wrapped(text, "map") {
            return Ok(Type::Map(Box::new(Type::parse(inner)?)));
        }
        if let Some(inner) = wrapped(text, "credential") {
            return Ok(Type::Credential(inner.trim().to_string()));
        }
        if let Some(inner) = wrapped(text, "connection") {
            return Ok(Type::Connection(inner.trim().to_string()));
        }
        // dotted forms: credential.aws / connection.slack
        if let Some(rest) = text.strip_prefix("credential.") {
            return Ok(Type::Credential(rest.to_string()));
        }
        if let Some(rest) = text.strip_prefix("connection.") {
            return Ok(Type::Connection(rest.to_string()));
        }
        Err(Error::Parse(format!("unknown type '{}'", text)))
    }

    /// Whether a runtime value satisfies this type. Reference types are
    /// checked structurally by the parameter system, not here.
    pub fn matches_value(&self, value: &Value) -> bool {
        match self {
            Type::Any => true,
            Type::String => value.is_string(),
            Type::Bool => value.is_boolean(),
            Type::Number => value.is_number(),
            Type::List(elem) => match value {
                Value::Array(items) => items.iter().all(|v| elem.matches_value(v)),
                _ => false,
            },
            Type::Map(elem) => match value {
                Value::Object(map) => map.values().all(|v| elem.matches_value(v)),
                _ => false,
            },
            Type::Credential(_) | Type::Connection(_) => false,
        }
    }

    /// Enum constraints are legal only for string/bool/number and their
    /// one-level list forms.
    pub fn supports_enum(&self) -> bool {
        match self {
            Type::String | Type::Bool | Type::Number => true,
            Type::List(elem) => {
                matches!(**elem, Type::String | Type::Bool | Type::Number)
            }
            _ => false,
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Type::Credential(_) | Type::Connection(_))
    }
}

fn wrapped<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    text.strip_prefix(keyword)?
        .trim_start()
        .strip_prefix('(')?
        .strip_suffix(')')
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::String => write!(f, "string"),
            Type::Bool => write!(f, "bool"),
            Type::Number => write!(f, "number"),
            Type::Any => write!(f, "any"),
            Type::List(elem) => write!(f, "list of {}", elem),
            Type::Map(elem) => write!(f, "map of {}", elem),
            Type::Credential(_) => write!(f, "credential"),
            Type::Connection(_) => write!(f, "connection"),
        }
    }
}

/// An attribute value: either fully known at decode time or held as a
/// deferred expression for later evaluation against a runtime scope.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Resolved(Value),
    Deferred(Expr),
}

impl AttrValue {
    /// Evaluate against a scope. Resolved values are returned as-is.
    pub fn evaluate(&self, scope: &Scope) -> Result<Value> {
        match self {
            AttrValue::Resolved(value) => Ok(value.clone()),
            AttrValue::Deferred(expr) => evaluate(expr, scope),
        }
    }

    pub fn as_resolved(&self) -> Option<&Value> {
        match self {
            AttrValue::Resolved(value) => Some(value),
            AttrValue::Deferred(_) => None,
        }
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, AttrValue::Deferred(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_scalars() {
        assert_eq!(Type::parse("string").unwrap(), Type::String);
        assert_eq!(Type::parse("number").unwrap(), Type::Number);
        assert_eq!(Type::parse("any").unwrap(), Type::Any);
    }

    #[test]
    fn test_parse_composites() {
        assert_eq!(
            Type::parse("list(string)").unwrap(),
            Type::List(Box::new(Type::String))
        );
        assert_eq!(
            Type::parse("map(number)").unwrap(),
            Type::Map(Box::new(Type::Number))
        );
        assert_eq!(
            Type::parse("credential(aws)").unwrap(),
            Type::Credential("aws".into())
        );
        assert_eq!(
            Type::parse("connection.slack").unwrap(),
            Type::Connection("slack".into())
        );
    }

    #[test]
    fn test_parse_unknown_type() {
        assert!(Type::parse("widget").is_err());
    }

    #[test]
    fn test_matches_value() {
        assert!(Type::String.matches_value(&json!("x")));
        assert!(!Type::String.matches_value(&json!(1)));
        assert!(Type::List(Box::new(Type::Number)).matches_value(&json!([1, 2])));
        assert!(!Type::List(Box::new(Type::Number)).matches_value(&json!([1, "x"])));
        assert!(Type::Map(Box::new(Type::Any)).matches_value(&json!({"a": 1})));
    }

    #[test]
    fn test_supports_enum() {
        assert!(Type::String.supports_enum());
        assert!(Type::List(Box::new(Type::Number)).supports_enum());
        assert!(!Type::Map(Box::new(Type::String)).supports_enum());
        assert!(!Type::Credential("aws".into()).supports_enum());
        assert!(!Type::List(Box::new(Type::List(Box::new(Type::String)))).supports_enum());
    }

    #[test]
    fn test_display() {
        assert_eq!(Type::List(Box::new(Type::String)).to_string(), "list of string");
    }
}
