//! Expression evaluation.

use serde_json::Value;

use crate::error::{Error, Result};
use crate::expr::ast::{Accessor, BinaryOp, Expr, TemplatePart, UnaryOp};
use crate::expr::scope::Scope;

/// Evaluate an expression against a scope.
///
/// Every unresolvable reference, type mismatch or unknown function is an
/// `Error::Eval`.
pub fn evaluate(expr: &Expr, scope: &Scope) -> Result<Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Reference { root, path } => resolve_reference(root, path, scope),
        Expr::Template(parts) => {
            let mut out = String::new();
            for part in parts {
                match part {
                    TemplatePart::Lit(text) => out.push_str(text),
                    TemplatePart::Interp(inner) => {
                        out.push_str(&stringify(&evaluate(inner, scope)?));
                    }
                }
            }
            Ok(Value::String(out))
        }
        Expr::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(evaluate(item, scope)?);
            }
            Ok(Value::Array(out))
        }
        Expr::Map(entries) => {
            let mut out = serde_json::Map::new();
            for (key, value) in entries {
                out.insert(key.clone(), evaluate(value, scope)?);
            }
            Ok(Value::Object(out))
        }
        Expr::Unary { op, operand } => {
            let value = evaluate(operand, scope)?;
            match op {
                UnaryOp::Not => match value {
                    Value::Bool(b) => Ok(Value::Bool(!b)),
                    other => Err(Error::Eval(format!(
                        "operator '!' requires a bool, got {}",
                        type_name(&other)
                    ))),
                },
                UnaryOp::Neg => match value.as_f64() {
                    Some(n) => Ok(number(-n)),
                    None => Err(Error::Eval(format!(
                        "operator '-' requires a number, got {}",
                        type_name(&value)
                    ))),
                },
            }
        }
        Expr::Binary { op, left, right } => eval_binary(*op, left, right, scope),
        Expr::Conditional {
            cond,
            then,
            otherwise,
        } => match evaluate(cond, scope)? {
            Value::Bool(true) => evaluate(then, scope),
            Value::Bool(false) => evaluate(otherwise, scope),
            other => Err(Error::Eval(format!(
                "condition must be a bool, got {}",
                type_name(&other)
            ))),
        },
        Expr::Call { name, args } => eval_call(name, args, scope),
    }
}

fn eval_binary(op: BinaryOp, left: &Expr, right: &Expr, scope: &Scope) -> Result<Value> {
    // short-circuit for the logical operators
    if matches!(op, BinaryOp::And | BinaryOp::Or) {
        let lhs = as_bool(&evaluate(left, scope)?)?;
        return match (op, lhs) {
            (BinaryOp::And, false) => Ok(Value::Bool(false)),
            (BinaryOp::Or, true) => Ok(Value::Bool(true)),
            _ => Ok(Value::Bool(as_bool(&evaluate(right, scope)?)?)),
        };
    }

    let lhs = evaluate(left, scope)?;
    let rhs = evaluate(right, scope)?;
    match op {
        BinaryOp::Eq => Ok(Value::Bool(values_equal(&lhs, &rhs))),
        BinaryOp::NotEq => Ok(Value::Bool(!values_equal(&lhs, &rhs))),
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            let ordering = compare(&lhs, &rhs)?;
            let result = match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::LtEq => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                BinaryOp::GtEq => ordering.is_ge(),
                _ => unreachable!(),
            };
            Ok(Value::Bool(result))
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            let (a, b) = match (lhs.as_f64(), rhs.as_f64()) {
                (Some(a), Some(b)) => (a, b),
                _ => {
                    return Err(Error::Eval(format!(
                        "arithmetic requires numbers, got {} and {}",
                        type_name(&lhs),
                        type_name(&rhs)
                    )))
                }
            };
            let result = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => {
                    if b == 0.0 {
                        return Err(Error::Eval("division by zero".to_string()));
                    }
                    a / b
                }
                BinaryOp::Mod => {
                    if b == 0.0 {
                        return Err(Error::Eval("division by zero".to_string()));
                    }
                    a % b
                }
                _ => unreachable!(),
            };
            Ok(number(result))
        }
        BinaryOp::And | BinaryOp::Or => unreachable!(),
    }
}

fn eval_call(name: &str, args: &[Expr], scope: &Scope) -> Result<Value> {
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        values.push(evaluate(arg, scope)?);
    }
    match name {
        "length" => match values.as_slice() {
            [Value::String(s)] => Ok(Value::from(s.chars().count() as i64)),
            [Value::Array(items)] => Ok(Value::from(items.len() as i64)),
            [Value::Object(map)] => Ok(Value::from(map.len() as i64)),
            [other] => Err(Error::Eval(format!(
                "length() requires a string, list or map, got {}",
                type_name(other)
            ))),
            _ => Err(Error::Eval("length() takes one argument".to_string())),
        },
        "join" => match values.as_slice() {
            [Value::String(sep), Value::Array(items)] => {
                let parts: Vec<String> = items.iter().map(stringify).collect();
                Ok(Value::String(parts.join(sep)))
            }
            _ => Err(Error::Eval(
                "join() requires a separator string and a list".to_string(),
            )),
        },
        "upper" => match values.as_slice() {
            [Value::String(s)] => Ok(Value::String(s.to_uppercase())),
            _ => Err(Error::Eval("upper() requires a string".to_string())),
        },
        "lower" => match values.as_slice() {
            [Value::String(s)] => Ok(Value::String(s.to_lowercase())),
            _ => Err(Error::Eval("lower() requires a string".to_string())),
        },
        "coalesce" => Ok(values
            .into_iter()
            .find(|v| !v.is_null())
            .unwrap_or(Value::Null)),
        other => Err(Error::Eval(format!("unknown function '{}'", other))),
    }
}

fn resolve_reference(root: &str, path: &[Accessor], scope: &Scope) -> Result<Value> {
    let mut display = root.to_string();
    let mut current = scope
        .get(root)
        .ok_or_else(|| Error::Eval(format!("unknown value referenced: {}", root)))?
        .clone();

    for accessor in path {
        match accessor {
            Accessor::Attr(name) => {
                display.push('.');
                display.push_str(name);
                current = match current.get(name) {
                    Some(value) => value.clone(),
                    None => {
                        return Err(Error::Eval(format!(
                            "reference '{}' could not be resolved",
                            display
                        )))
                    }
                };
            }
            Accessor::Index(index_expr) => {
                let index = evaluate(index_expr, scope)?;
                current = match (&current, &index) {
                    (Value::Array(items), Value::Number(n)) => {
                        let i = n.as_u64().ok_or_else(|| {
                            Error::Eval(format!("invalid index for '{}'", display))
                        })? as usize;
                        items.get(i).cloned().ok_or_else(|| {
                            Error::Eval(format!("index {} out of bounds for '{}'", i, display))
                        })?
                    }
                    (Value::Object(map), Value::String(key)) => {
                        map.get(key).cloned().ok_or_else(|| {
                            Error::Eval(format!("no key '{}' in '{}'", key, display))
                        })?
                    }
                    _ => {
                        return Err(Error::Eval(format!(
                            "cannot index '{}' with {}",
                            display,
                            type_name(&index)
                        )))
                    }
                };
                display.push_str("[..]");
            }
        }
    }
    Ok(current)
}

fn as_bool(value: &Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        other => Err(Error::Eval(format!(
            "logical operator requires a bool, got {}",
            type_name(other)
        ))),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    // numbers compare by value so 1 == 1.0
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x == y;
    }
    a == b
}

fn compare(a: &Value, b: &Value) -> Result<std::cmp::Ordering> {
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x
            .partial_cmp(&y)
            .ok_or_else(|| Error::Eval("numbers are not comparable".to_string()));
    }
    if let (Value::String(x), Value::String(y)) = (a, b) {
        return Ok(x.cmp(y));
    }
    Err(Error::Eval(format!(
        "cannot compare {} with {}",
        type_name(a),
        type_name(b)
    )))
}

/// Render a value into template text.
pub(crate) fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parser::{parse_expression, parse_template};
    use serde_json::json;

    fn scope_with_params(params: Value) -> Scope {
        let mut scope = Scope::new();
        scope.set("param", params);
        scope
    }

    #[test]
    fn test_single_interpolation_keeps_type() {
        let scope = scope_with_params(json!({"count": 7}));
        let expr = parse_template("${param.count}").unwrap();
        assert_eq!(evaluate(&expr, &scope).unwrap(), json!(7));
    }

    #[test]
    fn test_mixed_template_stringifies() {
        let scope = scope_with_params(json!({"count": 7}));
        let expr = parse_template("found ${param.count} items").unwrap();
        assert_eq!(evaluate(&expr, &scope).unwrap(), json!("found 7 items"));
    }

    #[test]
    fn test_arithmetic_and_ternary() {
        let scope = scope_with_params(json!({"n": 5}));
        let expr = parse_expression("param.n * 2 > 9 ? \"big\" : \"small\"").unwrap();
        assert_eq!(evaluate(&expr, &scope).unwrap(), json!("big"));
    }

    #[test]
    fn test_unresolved_reference() {
        let scope = scope_with_params(json!({"city": "Boston"}));
        let expr = parse_expression("param.missing").unwrap();
        let err = evaluate(&expr, &scope).unwrap_err();
        assert!(err.to_string().contains("param.missing"));
    }

    #[test]
    fn test_unknown_root() {
        let scope = Scope::new();
        let expr = parse_expression("bogus.thing").unwrap();
        assert!(evaluate(&expr, &scope).is_err());
    }

    #[test]
    fn test_dynamic_index() {
        let mut scope = scope_with_params(json!({"env": "dev"}));
        scope.set(
            "credential",
            json!({"aws": {"dev": {"name": "dev"}, "prod": {"name": "prod"}}}),
        );
        let expr = parse_expression("credential.aws[param.env]").unwrap();
        assert_eq!(evaluate(&expr, &scope).unwrap(), json!({"name": "dev"}));
    }

    #[test]
    fn test_builtins() {
        let scope = scope_with_params(json!({"regions": ["us-east-1", "us-west-2"]}));
        let expr = parse_expression("join(\",\", param.regions)").unwrap();
        assert_eq!(
            evaluate(&expr, &scope).unwrap(),
            json!("us-east-1,us-west-2")
        );
        let expr = parse_expression("length(param.regions)").unwrap();
        assert_eq!(evaluate(&expr, &scope).unwrap(), json!(2));
        let expr = parse_expression("coalesce(null, \"x\")").unwrap();
        assert_eq!(evaluate(&expr, &scope).unwrap(), json!("x"));
    }

    #[test]
    fn test_short_circuit_and() {
        // right side would fail to resolve, but the left side decides
        let scope = scope_with_params(json!({"flag": false}));
        let expr = parse_expression("param.flag && bogus.thing").unwrap();
        assert_eq!(evaluate(&expr, &scope).unwrap(), json!(false));
    }

    #[test]
    fn test_division_by_zero() {
        let scope = Scope::new();
        let expr = parse_expression("1 / 0").unwrap();
        assert!(evaluate(&expr, &scope).is_err());
    }
}
