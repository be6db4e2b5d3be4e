//! Parameter validation and coercion.
//!
//! Two entry points: `validate_params` checks already-typed values (the
//! API/JSON path) and `coerce_params` parses untyped strings (the CLI path).
//! Both aggregate every error instead of failing fast, and both return them
//! in a stable order: type and shape errors first, then a single trailing
//! missing-parameter error naming every unsatisfied required param.

use std::collections::{BTreeMap, BTreeSet};

use regex_lite::Regex;
use serde_json::{Map, Value};

use crate::definition::{Param, Type};
use crate::error::{Error, Result};
use crate::expr::{evaluate, parse_expression, type_name, Scope};

/// Validate typed arguments against a parameter set.
///
/// A supplied argument satisfies its param's requiredness only when its type
/// checks out; a mismatched value still leaves the param missing.
pub fn validate_params(params: &[Param], args: &Map<String, Value>) -> Vec<Error> {
    let mut errors = Vec::new();
    let mut satisfied = BTreeSet::new();

    for (key, value) in args {
        let Some(param) = params.iter().find(|p| p.name == *key) else {
            errors.push(Error::Validation(format!(
                "unknown parameter specified '{}'",
                key
            )));
            continue;
        };

        let ok = match &param.ty {
            Type::Credential(_) => {
                if is_reference_value(value, "credential") {
                    true
                } else {
                    errors.push(Error::Validation(format!(
                        "invalid data type for parameter '{}' wanted credential but received {}",
                        key,
                        type_name(value)
                    )));
                    false
                }
            }
            Type::Connection(_) => {
                if is_reference_value(value, "connection") {
                    true
                } else {
                    errors.push(Error::Validation(format!(
                        "invalid data type for parameter '{}' wanted connection but received {}",
                        key,
                        type_name(value)
                    )));
                    false
                }
            }
            ty => {
                if ty.matches_value(value) {
                    true
                } else {
                    errors.push(Error::Validation(format!(
                        "invalid data type for parameter '{}' wanted {} but received {}",
                        key,
                        ty,
                        type_name(value)
                    )));
                    false
                }
            }
        };

        if ok {
            satisfied.insert(key.clone());
            if !param.satisfies_enum(value) {
                errors.push(Error::Validation(format!(
                    "invalid value for param {}",
                    param.name
                )));
            }
        }
    }

    push_missing(params, &satisfied, &mut errors);
    errors
}

/// Coerce string arguments (e.g. from CLI flags) into the declared types.
///
/// Reference params accept either the dotted shorthand
/// (`credential.<type>.<name>`; `<type>.<name>` for connections) or a full
/// expression evaluated with late-binding placeholders in scope. The
/// placeholders are removed again on every exit path.
pub fn coerce_params(
    params: &[Param],
    args: &BTreeMap<String, String>,
    scope: &mut Scope,
    credentials: &BTreeMap<String, BTreeSet<String>>,
    connections: &BTreeMap<String, BTreeSet<String>>,
) -> (Map<String, Value>, Vec<Error>) {
    let mut coerced = Map::new();
    let mut errors = Vec::new();
    let mut satisfied = BTreeSet::new();

    for (key, text) in args {
        let Some(param) = params.iter().find(|p| p.name == *key) else {
            errors.push(Error::Validation(format!(
                "unknown parameter specified '{}'",
                key
            )));
            continue;
        };

        let value = match &param.ty {
            Type::Credential(_) | Type::Connection(_) => {
                coerce_reference(&param.ty, text, scope, credentials, connections)
            }
            ty => coerce_value(ty, text),
        };

        match value {
            Ok(value) => {
                satisfied.insert(key.clone());
                if param.satisfies_enum(&value) {
                    coerced.insert(key.clone(), value);
                } else {
                    errors.push(Error::Validation(format!(
                        "invalid value for param {}",
                        param.name
                    )));
                }
            }
            Err(e) => errors.push(e),
        }
    }

    push_missing(params, &satisfied, &mut errors);
    (coerced, errors)
}

/// Split `key=value` CLI argument strings into a map.
pub fn parse_cli_args(args: &[String]) -> Result<BTreeMap<String, String>> {
    let shape = Regex::new(r"^[\w-]+=[\S\s]+$")
        .map_err(|e| Error::Internal(format!("bad argument pattern: {}", e)))?;
    let mut out = BTreeMap::new();
    for arg in args {
        if !shape.is_match(arg) {
            return Err(Error::Validation(format!(
                "invalid argument '{}', expected key=value",
                arg
            )));
        }
        // the regex guarantees the separator is present
        if let Some((key, value)) = arg.split_once('=') {
            out.insert(key.to_string(), value.to_string());
        }
    }
    Ok(out)
}

fn push_missing(params: &[Param], satisfied: &BTreeSet<String>, errors: &mut Vec<Error>) {
    let missing: Vec<&str> = params
        .iter()
        .filter(|p| p.is_required() && !satisfied.contains(&p.name))
        .map(|p| p.name.as_str())
        .collect();
    if !missing.is_empty() {
        let mut missing = missing;
        missing.sort_unstable();
        errors.push(Error::Validation(format!(
            "missing parameter: {}",
            missing.join(", ")
        )));
    }
}

/// A credential/connection argument on the typed path must be a
/// distinguishing map carrying a `resource_type` marker (connections also
/// carry their `type`).
fn is_reference_value(value: &Value, kind: &str) -> bool {
    let Some(map) = value.as_object() else {
        return false;
    };
    let marker_ok = map
        .get("resource_type")
        .and_then(Value::as_str)
        .is_some_and(|rt| rt == kind || rt.starts_with(&format!("{}.", kind)));
    if kind == "connection" {
        marker_ok && map.contains_key("type")
    } else {
        marker_ok
    }
}

fn coerce_reference(
    ty: &Type,
    text: &str,
    scope: &mut Scope,
    credentials: &BTreeMap<String, BTreeSet<String>>,
    connections: &BTreeMap<String, BTreeSet<String>>,
) -> std::result::Result<Value, Error> {
    let (kind, format_error) = match ty {
        Type::Credential(_) => ("credential", "invalid credential string format"),
        Type::Connection(_) => ("connection", "invalid connection string format"),
        _ => return Err(Error::Internal("not a reference type".to_string())),
    };

    let expr_text = reference_expression(kind, text)
        .ok_or_else(|| Error::Coercion(format_error.to_string()))?;
    let expr = parse_expression(&expr_text).map_err(|_| Error::Coercion(format_error.to_string()))?;

    let guard = scope.late_binding(registry_pairs(credentials), registry_pairs(connections));
    evaluate(&expr, guard.scope()).map_err(|_| Error::Coercion(format_error.to_string()))
}

/// Turn a shorthand into a reference expression, or pass a full expression
/// through. Credentials use three dotted parts (`credential.<type>.<name>`),
/// connections two (`<type>.<name>`).
fn reference_expression(kind: &str, text: &str) -> Option<String> {
    let parts: Vec<&str> = text.split('.').collect();
    let all_idents = parts
        .iter()
        .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'));
    if all_idents {
        return match (kind, parts.as_slice()) {
            ("credential", ["credential", ty, name]) => {
                Some(format!("credential.{}.{}", ty, name))
            }
            ("connection", [ty, name]) => Some(format!("connection.{}.{}", ty, name)),
            _ => None,
        };
    }
    // anything else is treated as a full expression
    Some(text.to_string())
}

fn registry_pairs(registry: &BTreeMap<String, BTreeSet<String>>) -> Vec<(String, String)> {
    registry
        .iter()
        .flat_map(|(ty, names)| names.iter().map(move |n| (ty.clone(), n.clone())))
        .collect()
}

fn coerce_value(ty: &Type, text: &str) -> std::result::Result<Value, Error> {
    match ty {
        Type::String => Ok(Value::String(text.to_string())),
        Type::Number => {
            if let Ok(n) = text.parse::<i64>() {
                return Ok(Value::from(n));
            }
            match text.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
                Some(n) => Ok(Value::Number(n)),
                None => Err(Error::Coercion(format!(
                    "unable to convert '{}' to a number",
                    text
                ))),
            }
        }
        Type::Bool => match text {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(Error::Coercion(format!(
                "unable to convert '{}' to a bool",
                text
            ))),
        },
        Type::Any => Ok(serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))),
        Type::List(elem) => {
            let parsed: Value = serde_json::from_str(text).map_err(|_| {
                Error::Coercion(format!("unable to convert '{}' to a list", text))
            })?;
            let Value::Array(items) = parsed else {
                return Err(Error::Coercion(format!(
                    "unable to convert '{}' to a list",
                    text
                )));
            };
            for item in &items {
                if !elem.matches_value(item) {
                    return Err(Error::Coercion(format!(
                        "expected {} type, but got {}",
                        elem,
                        type_name(item)
                    )));
                }
            }
            Ok(Value::Array(items))
        }
        Type::Map(elem) => {
            let parsed: Value = serde_json::from_str(text).map_err(|_| {
                Error::Coercion(format!("unable to convert '{}' to a map", text))
            })?;
            let Value::Object(map) = parsed else {
                return Err(Error::Coercion(format!(
                    "unable to convert '{}' to a map",
                    text
                )));
            };
            for value in map.values() {
                if !elem.matches_value(value) {
                    return Err(Error::Coercion(format!(
                        "expected {} type, but got {}",
                        elem,
                        type_name(value)
                    )));
                }
            }
            Ok(Value::Object(map))
        }
        Type::Credential(_) | Type::Connection(_) => {
            Err(Error::Internal("reference types take the reference path".to_string()))
        }
    }
}
