//! Block decoder and dependency extractor.
//!
//! Turns raw pipeline/trigger bodies into typed resources. Every attribute
//! is split into either a statically-known value (no variable references,
//! evaluated immediately) or a deferred expression carrying its extracted
//! reference set. Decoding is best-effort: a failure in one resource is
//! reported as diagnostics and never stops its siblings.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};
use tracing::debug;

use crate::definition::param::Param;
use crate::definition::pipeline::{Pipeline, PipelineOutput};
use crate::definition::raw::require_str;
use crate::definition::step::{ErrorConfig, Step, StepKind, ThrowConfig};
use crate::definition::trigger::{
    validate_schedule, ExecutionMode, MethodInfo, Trigger, TriggerConfig,
};
use crate::definition::types::{AttrValue, Type};
use crate::error::{DecodeDiagnostic, Diagnostics, Result, SourceRef};
use crate::expr::{evaluate, parse_template, Expr, RefPath, Scope, KNOWN_NAMESPACES};

/// Everything the decoder needs about the enclosing mod.
pub struct DecodeContext {
    pub mod_name: String,
    pub variables: Map<String, Value>,
    /// Credential registry: type -> names.
    pub credentials: BTreeMap<String, BTreeSet<String>>,
    /// Connection registry: type -> names.
    pub connections: BTreeMap<String, BTreeSet<String>>,
}

impl DecodeContext {
    fn credential_pairs(&self) -> Vec<(String, String)> {
        registry_pairs(&self.credentials)
    }

    fn connection_pairs(&self) -> Vec<(String, String)>  {
        registry_pairs(&self.connections)
    }
}

fn registry_pairs(registry: &BTreeMap<String, BTreeSet<String>>) -> Vec<(String, String)> {
    registry
        .iter()
        .flat_map(|(ty, names)| names.iter().map(move |n| (ty.clone(), n.clone())))
        .collect()
}

/// Dependency sets extracted from one resource's expressions.
#[derive(Debug, Default)]
struct DepSets {
    steps: BTreeSet<String>,
    credentials: BTreeSet<String>,
    connections: BTreeSet<String>,
}

/// Classify reference prefixes into dependency sets.
///
/// `step.<kind>.<name>` is a step dependency; `credential.<type>.<name>` a
/// credential dependency; `credential.<type>` alone (the static prefix of a
/// dynamic subscript) becomes the wildcard `type.<dynamic>`; `connection.*`
/// follows the same rules. A bare identifier outside the known scope
/// namespaces is the legacy connection shorthand; only the root is
/// recorded, and such deps are resolved at fire time rather than against
/// the registry.
fn classify_refs(refs: &[RefPath], deps: &mut DepSets) {
    for path in refs {
        let Some(root) = path.first() else { continue };
        match root.as_str() {
            "step" => {
                if path.len() >= 3 {
                    deps.steps.insert(format!("{}.{}", path[1], path[2]));
                }
            }
            "credential" => match path.len() {
                0 | 1 => {}
                2 => {
                    deps.credentials.insert(format!("{}.<dynamic>", path[1]));
                }
                _ => {
                    deps.credentials.insert(format!("{}.{}", path[1], path[2]));
                }
            },
            "connection" => match path.len() {
                0 | 1 => {}
                2 => {
                    deps.connections.insert(format!("{}.<dynamic>", path[1]));
                }
                _ => {
                    deps.connections.insert(format!("{}.{}", path[1], path[2]));
                }
            },
            r if KNOWN_NAMESPACES.contains(&r) => {}
            other => {
                deps.connections.insert(other.to_string());
            }
        }
    }
}

/// Build an expression tree from a raw attribute value. Strings go through
/// the template parser; lists and maps recurse.
fn value_to_expr(value: &Value) -> Result<Expr> {
    match value {
        Value::String(s) => parse_template(s),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(value_to_expr(item)?);
            }
            Ok(Expr::List(out))
        }
        Value::Object(map) => {
            let mut out = Vec::with_capacity(map.len());
            for (key, v) in map {
                out.push((key.clone(), value_to_expr(v)?));
            }
            Ok(Expr::Map(out))
        }
        other => Ok(Expr::Literal(other.clone())),
    }
}

/// Split one attribute into resolved-or-deferred, returning the extracted
/// references alongside.
fn decode_attr(value: &Value) -> Result<(AttrValue, Vec<RefPath>)> {
    let expr = value_to_expr(value)?;
    let refs = expr.references();
    if refs.is_empty() {
        let resolved = evaluate(&expr, &Scope::new())?;
        Ok((AttrValue::Resolved(resolved), refs))
    } else {
        Ok((AttrValue::Deferred(expr), refs))
    }
}

const COMMON_STEP_KEYS: &[&str] = &[
    "kind",
    "name",
    "description",
    "title",
    "depends_on",
    "for_each",
    "if",
    "retry",
    "error",
    "throw",
    "output",
    "max_concurrency",
];

/// Decode one pipeline body. Always returns the pipeline, possibly
/// incomplete, alongside whatever diagnostics its resources produced, so
/// dependent tooling can inspect partially-decoded state.
pub fn decode_pipeline(
    raw: &Value,
    ctx: &DecodeContext,
    diags: &mut Diagnostics,
) -> Option<Pipeline> {
    let Some(short_name) = require_str(raw, "name") else {
        diags.push(DecodeDiagnostic::error(
            "missing name for pipeline",
            SourceRef::resource("pipeline"),
        ));
        return None;
    };
    let mut pipeline = Pipeline::new(&ctx.mod_name, &short_name);
    let loc = SourceRef::resource(pipeline.name.clone());
    debug!(pipeline = %pipeline.name, "decoding pipeline");

    pipeline.description = require_str(raw, "description");
    pipeline.max_concurrency = raw.get("max_concurrency").and_then(Value::as_i64);

    if let Some(raw_params) = raw.get("params").and_then(Value::as_array) {
        let mut seen = BTreeSet::new();
        for raw_param in raw_params {
            if let Some(param) = decode_param(raw_param, ctx, &pipeline.name, diags) {
                if !seen.insert(param.name.clone()) {
                    diags.push(DecodeDiagnostic::error(
                        format!(
                            "duplicate param name '{}' in pipeline '{}'",
                            param.name, pipeline.name
                        ),
                        loc.clone(),
                    ));
                    continue;
                }
                pipeline.params.push(param);
            }
        }
    }

    if let Some(raw_steps) = raw.get("steps").and_then(Value::as_array) {
        let mut seen = BTreeSet::new();
        for (index, raw_step) in raw_steps.iter().enumerate() {
            if let Some(step) = decode_step(raw_step, &pipeline.name, index, diags) {
                let full_name = step.full_name();
                if !seen.insert(full_name.clone()) {
                    diags.push(DecodeDiagnostic::error(
                        format!(
                            "duplicate step name '{}' in pipeline '{}'",
                            full_name, pipeline.name
                        ),
                        SourceRef::attribute(pipeline.name.clone(), format!("steps[{}]", index)),
                    ));
                    continue;
                }
                pipeline.steps.push(step);
            }
        }
    }

    if let Some(raw_outputs) = raw.get("outputs").and_then(Value::as_array) {
        let mut seen = BTreeSet::new();
        for raw_output in raw_outputs {
            if let Some(output) = decode_output(raw_output, &pipeline.name, diags) {
                if !seen.insert(output.name.clone()) {
                    diags.push(DecodeDiagnostic::error(
                        format!(
                            "duplicate output name '{}' in pipeline '{}'",
                            output.name, pipeline.name
                        ),
                        loc.clone(),
                    ));
                    continue;
                }
                pipeline.outputs.push(output);
            }
        }
    }

    Some(pipeline)
}

fn decode_step(
    raw: &Value,
    pipeline_name: &str,
    index: usize,
    diags: &mut Diagnostics,
) -> Option<Step> {
    let loc = SourceRef::attribute(pipeline_name.to_string(), format!("steps[{}]", index));
    let Some(body) = raw.as_object() else {
        diags.push(DecodeDiagnostic::error("step must be a mapping", loc));
        return None;
    };

    let Some(name) = require_str(raw, "name") else {
        diags.push(DecodeDiagnostic::error("missing name for step", loc));
        return None;
    };
    let Some(kind_text) = require_str(raw, "kind") else {
        diags.push(DecodeDiagnostic::error(
            format!("missing kind for step '{}'", name),
            loc,
        ));
        return None;
    };
    let kind = match StepKind::parse(&kind_text) {
        Ok(kind) => kind,
        Err(e) => {
            diags.push(DecodeDiagnostic::error(e.to_string(), loc));
            return None;
        }
    };

    let mut step = Step::new(kind, name);
    let loc = SourceRef::attribute(pipeline_name.to_string(), step.full_name());
    let mut deps = DepSets::default();

    step.description = require_str(raw, "description");
    step.max_concurrency = body.get("max_concurrency").and_then(Value::as_i64);

    for (key, value) in body {
        if COMMON_STEP_KEYS.contains(&key.as_str()) {
            continue;
        }
        if !kind.allowed_attrs().contains(&key.as_str()) {
            diags.push(DecodeDiagnostic::error(
                format!(
                    "unsupported attribute '{}' in step '{}'",
                    key,
                    step.full_name()
                ),
                loc.clone(),
            ));
            continue;
        }
        match decode_attr(value) {
            Ok((attr, refs)) => {
                classify_refs(&refs, &mut deps);
                step.attrs.insert(key.clone(), attr);
            }
            Err(e) => {
                diags.push(
                    DecodeDiagnostic::error(
                        format!("invalid value for attribute '{}'", key),
                        loc.clone(),
                    )
                    .with_detail(e.to_string()),
                );
            }
        }
    }

    // for_each and if contribute dependencies like any other attribute
    for (key, slot) in [("for_each", 0usize), ("if", 1usize)] {
        if let Some(value) = body.get(key) {
            match decode_attr(value) {
                Ok((attr, refs)) => {
                    classify_refs(&refs, &mut deps);
                    if slot == 0 {
                        step.for_each = Some(attr);
                    } else {
                        step.if_cond = Some(attr);
                    }
                }
                Err(e) => {
                    diags.push(
                        DecodeDiagnostic::error(
                            format!("invalid value for attribute '{}'", key),
                            loc.clone(),
                        )
                        .with_detail(e.to_string()),
                    );
                }
            }
        }
    }

    if let Some(explicit) = body.get("depends_on").and_then(Value::as_array) {
        for entry in explicit {
            match entry.as_str() {
                Some(dep) => {
                    deps.steps.insert(dep.to_string());
                }
                None => {
                    diags.push(DecodeDiagnostic::error(
                        format!("depends_on entries must be strings in step '{}'", step.full_name()),
                        loc.clone(),
                    ));
                }
            }
        }
    }

    if let Some(raw_retry) = body.get("retry") {
        match serde_json::from_value::<crate::retry::RetryConfig>(raw_retry.clone()) {
            Ok(retry) => {
                for err in retry.validate() {
                    diags.push(
                        DecodeDiagnostic::error(
                            format!("invalid retry block in step '{}'", step.full_name()),
                            loc.clone(),
                        )
                        .with_detail(err.to_string()),
                    );
                }
                step.retry = Some(retry);
            }
            Err(e) => {
                diags.push(
                    DecodeDiagnostic::error(
                        format!("invalid retry block in step '{}'", step.full_name()),
                        loc.clone(),
                    )
                    .with_detail(e.to_string()),
                );
            }
        }
    }

    if let Some(raw_error) = body.get("error") {
        match serde_json::from_value::<ErrorConfig>(raw_error.clone()) {
            Ok(config) => step.error = Some(config),
            Err(e) => {
                diags.push(
                    DecodeDiagnostic::error(
                        format!("invalid error block in step '{}'", step.full_name()),
                        loc.clone(),
                    )
                    .with_detail(e.to_string()),
                );
            }
        }
    }

    if let Some(raw_throws) = body.get("throw").and_then(Value::as_array) {
        for raw_throw in raw_throws {
            let Some(condition) = raw_throw.get("if") else {
                diags.push(DecodeDiagnostic::error(
                    format!("throw block requires 'if' in step '{}'", step.full_name()),
                    loc.clone(),
                ));
                continue;
            };
            let condition = match decode_attr(condition) {
                Ok((attr, refs)) => {
                    classify_refs(&refs, &mut deps);
                    attr
                }
                Err(e) => {
                    diags.push(
                        DecodeDiagnostic::error(
                            format!("invalid throw condition in step '{}'", step.full_name()),
                            loc.clone(),
                        )
                        .with_detail(e.to_string()),
                    );
                    continue;
                }
            };
            let message = match raw_throw.get("message").map(decode_attr) {
                Some(Ok((attr, refs))) => {
                    classify_refs(&refs, &mut deps);
                    Some(attr)
                }
                Some(Err(e)) => {
                    diags.push(
                        DecodeDiagnostic::error(
                            format!("invalid throw message in step '{}'", step.full_name()),
                            loc.clone(),
                        )
                        .with_detail(e.to_string()),
                    );
                    None
                }
                None => None,
            };
            step.throw.push(ThrowConfig { condition, message });
        }
    }

    if let Some(raw_outputs) = body.get("output").and_then(Value::as_object) {
        for (out_name, out_value) in raw_outputs {
            match decode_attr(out_value) {
                Ok((attr, refs)) => {
                    classify_refs(&refs, &mut deps);
                    step.outputs.insert(out_name.clone(), attr);
                }
                Err(e) => {
                    diags.push(
                        DecodeDiagnostic::error(
                            format!(
                                "invalid output '{}' in step '{}'",
                                out_name,
                                step.full_name()
                            ),
                            loc.clone(),
                        )
                        .with_detail(e.to_string()),
                    );
                }
            }
        }
    }

    step.depends_on = deps.steps;
    step.credential_depends_on = deps.credentials;
    step.connection_depends_on = deps.connections;

    // the partially-decoded step is still returned when attributes failed,
    // so callers can inspect it; its diagnostics mark the pipeline invalid
    Some(step)
}

/// Decode a param block. The default value is evaluated at decode time under
/// the mod variables plus late-binding placeholders, so defaults may
/// reference credentials that are only resolved at execution time.
pub fn decode_param(
    raw: &Value,
    ctx: &DecodeContext,
    resource_name: &str,
    diags: &mut Diagnostics,
) -> Option<Param> {
    let Some(name) = require_str(raw, "name") else {
        diags.push(DecodeDiagnostic::error(
            "missing name for param",
            SourceRef::resource(resource_name.to_string()),
        ));
        return None;
    };
    let loc = SourceRef::attribute(resource_name.to_string(), format!("param '{}'", name));

    let type_text = require_str(raw, "type").unwrap_or_else(|| "any".to_string());
    let ty = match Type::parse(&type_text) {
        Ok(ty) => ty,
        Err(e) => {
            diags.push(
                DecodeDiagnostic::error(
                    format!("invalid type for param '{}'", name),
                    loc,
                )
                .with_detail(e.to_string()),
            );
            return None;
        }
    };

    let mut param = Param::new(name, ty);
    param.optional = raw
        .get("optional")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    param.description = require_str(raw, "description");
    param.format = require_str(raw, "format");
    if let Some(tags) = raw.get("tags").and_then(Value::as_object) {
        for (key, value) in tags {
            if let Some(text) = value.as_str() {
                param.tags.insert(key.clone(), text.to_string());
            }
        }
    }

    let mut valid = true;

    if let Some(enum_raw) = raw.get("enum").and_then(Value::as_array) {
        if !param.ty.supports_enum() {
            diags.push(DecodeDiagnostic::error(
                format!(
                    "enum is only supported for string, bool, number, list of string, list of number, and list of bool types, param '{}' is {}",
                    param.name, param.ty
                ),
                loc.clone(),
            ));
            valid = false;
        } else {
            let elem_ty = match &param.ty {
                Type::List(elem) => (**elem).clone(),
                other => other.clone(),
            };
            for member in enum_raw {
                if !elem_ty.matches_value(member) {
                    diags.push(DecodeDiagnostic::error(
                        format!(
                            "enum values for param '{}' must match type {}",
                            param.name, elem_ty
                        ),
                        loc.clone(),
                    ));
                    valid = false;
                    break;
                }
            }
            param.enum_values = Some(enum_raw.clone());
        }
    }

    if let Some(raw_default) = raw.get("default") {
        match decode_default(raw_default, ctx) {
            Ok(default) => {
                if !param.ty.is_reference() && !param.ty.matches_value(&default) {
                    diags.push(DecodeDiagnostic::error(
                        format!(
                            "default value for param '{}' does not match type declaration '{}'",
                            param.name, param.ty
                        ),
                        loc.clone(),
                    ));
                    valid = false;
                } else if !param.satisfies_enum(&default) {
                    diags.push(DecodeDiagnostic::error(
                        format!(
                            "default value for param '{}' must be one of the enum values",
                            param.name
                        ),
                        loc.clone(),
                    ));
                    valid = false;
                } else {
                    param.default = Some(default);
                }
            }
            Err(e) => {
                diags.push(
                    DecodeDiagnostic::error(
                        format!("invalid default value for param '{}'", param.name),
                        loc.clone(),
                    )
                    .with_detail(e.to_string()),
                );
                valid = false;
            }
        }
    }

    if valid {
        Some(param)
    } else {
        None
    }
}

/// Evaluate a default value expression. The late-binding guard restores the
/// scope on every exit path, including evaluation failure.
fn decode_default(raw: &Value, ctx: &DecodeContext) -> Result<Value> {
    let expr = value_to_expr(raw)?;
    if !expr.has_references() {
        return evaluate(&expr, &Scope::new());
    }
    let mut scope = Scope::new();
    scope.set_variables(ctx.variables.clone());
    let guard = scope.late_binding(ctx.credential_pairs(), ctx.connection_pairs());
    evaluate(&expr, guard.scope())
}

fn decode_output(
    raw: &Value,
    pipeline_name: &str,
    diags: &mut Diagnostics,
) -> Option<PipelineOutput> {
    let Some(name) = require_str(raw, "name") else {
        diags.push(DecodeDiagnostic::error(
            "missing name for output",
            SourceRef::resource(pipeline_name.to_string()),
        ));
        return None;
    };
    let loc = SourceRef::attribute(pipeline_name.to_string(), format!("output '{}'", name));
    let Some(raw_value) = raw.get("value") else {
        diags.push(DecodeDiagnostic::error(
            format!("missing value for output '{}'", name),
            loc,
        ));
        return None;
    };

    match decode_attr(raw_value) {
        Ok((value, refs)) => {
            let mut deps = DepSets::default();
            classify_refs(&refs, &mut deps);
            Some(PipelineOutput {
                name,
                value,
                description: require_str(raw, "description"),
                depends_on: deps.steps,
            })
        }
        Err(e) => {
            diags.push(
                DecodeDiagnostic::error(format!("invalid value for output '{}'", name), loc)
                    .with_detail(e.to_string()),
            );
            None
        }
    }
}

const TRIGGER_HTTP_METHODS: &[&str] = &["get", "post"];

/// Decode one trigger body.
pub fn decode_trigger(
    raw: &Value,
    ctx: &DecodeContext,
    diags: &mut Diagnostics,
) -> Option<Trigger> {
    let Some(name) = require_str(raw, "name") else {
        diags.push(DecodeDiagnostic::error(
            "missing name for trigger",
            SourceRef::resource("trigger"),
        ));
        return None;
    };
    let Some(kind) = require_str(raw, "kind") else {
        diags.push(DecodeDiagnostic::error(
            format!("missing kind for trigger '{}'", name),
            SourceRef::resource("trigger"),
        ));
        return None;
    };
    let full_name = Trigger::full_name(&ctx.mod_name, &kind, &name);
    let loc = SourceRef::resource(full_name.clone());
    debug!(trigger = %full_name, "decoding trigger");

    let config = match kind.as_str() {
        "schedule" => {
            let Some(schedule) = require_str(raw, "schedule") else {
                diags.push(DecodeDiagnostic::error(
                    format!("missing schedule for trigger '{}'", name),
                    loc,
                ));
                return None;
            };
            if let Err(e) = validate_schedule(&schedule) {
                diags.push(DecodeDiagnostic::error(e.to_string(), loc));
                return None;
            }
            TriggerConfig::Schedule { schedule }
        }
        "query" => {
            let Some(sql) = require_str(raw, "sql") else {
                diags.push(DecodeDiagnostic::error(
                    format!("missing sql for trigger '{}'", name),
                    loc,
                ));
                return None;
            };
            let Some(primary_key) = require_str(raw, "primary_key") else {
                diags.push(DecodeDiagnostic::error(
                    format!("missing primary_key for trigger '{}'", name),
                    loc,
                ));
                return None;
            };
            let schedule = require_str(raw, "schedule");
            if let Some(schedule) = &schedule {
                if let Err(e) = validate_schedule(schedule) {
                    diags.push(DecodeDiagnostic::error(e.to_string(), loc));
                    return None;
                }
            }
            TriggerConfig::Query {
                sql,
                primary_key,
                schedule,
            }
        }
        "http" => {
            let mut methods = BTreeMap::new();
            if let Some(raw_methods) = raw.get("methods").and_then(Value::as_object) {
                for (method, raw_method) in raw_methods {
                    let method = method.to_lowercase();
                    if !TRIGGER_HTTP_METHODS.contains(&method.as_str()) {
                        diags.push(DecodeDiagnostic::error(
                            format!("unsupported method '{}' in trigger '{}'", method, name),
                            loc.clone(),
                        ));
                        continue;
                    }
                    if let Some(info) =
                        decode_method_info(raw_method, ctx, &full_name, &method, diags)
                    {
                        methods.insert(method, info);
                    }
                }
            }
            TriggerConfig::Http { methods }
        }
        other => {
            diags.push(DecodeDiagnostic::error(
                format!("invalid trigger type '{}'", other),
                loc,
            ));
            return None;
        }
    };

    let mut trigger = Trigger {
        name: full_name.clone(),
        short_name: name,
        mod_name: ctx.mod_name.clone(),
        description: require_str(raw, "description"),
        enabled: raw.get("enabled").and_then(Value::as_bool).unwrap_or(true),
        pipeline: require_str(raw, "pipeline").map(|p| qualify_pipeline(&p, &ctx.mod_name)),
        args: BTreeMap::new(),
        params: Vec::new(),
        config,
    };

    if let Some(raw_args) = raw.get("args").and_then(Value::as_object) {
        trigger.args = decode_args(raw_args, &full_name, diags);
    }

    if let Some(raw_params) = raw.get("params").and_then(Value::as_array) {
        let mut seen = BTreeSet::new();
        for raw_param in raw_params {
            if let Some(param) = decode_param(raw_param, ctx, &full_name, diags) {
                if !seen.insert(param.name.clone()) {
                    diags.push(DecodeDiagnostic::error(
                        format!(
                            "duplicate param name '{}' in trigger '{}'",
                            param.name, full_name
                        ),
                        loc.clone(),
                    ));
                    continue;
                }
                trigger.params.push(param);
            }
        }
    }

    Some(trigger)
}

fn decode_method_info(
    raw: &Value,
    ctx: &DecodeContext,
    trigger_name: &str,
    method: &str,
    diags: &mut Diagnostics,
) -> Option<MethodInfo> {
    let loc = SourceRef::attribute(trigger_name.to_string(), format!("methods.{}", method));
    let Some(pipeline) = require_str(raw, "pipeline") else {
        diags.push(DecodeDiagnostic::error(
            format!("missing pipeline for method '{}'", method),
            loc,
        ));
        return None;
    };

    let execution_mode = match raw.get("execution_mode").and_then(Value::as_str) {
        None => ExecutionMode::default(),
        Some("synchronous") => ExecutionMode::Synchronous,
        Some("asynchronous") => ExecutionMode::Asynchronous,
        Some(other) => {
            diags.push(DecodeDiagnostic::error(
                format!(
                    "invalid execution_mode '{}', valid values are 'synchronous' or 'asynchronous'",
                    other
                ),
                loc,
            ));
            return None;
        }
    };

    let args = match raw.get("args").and_then(Value::as_object) {
        Some(raw_args) => decode_args(raw_args, trigger_name, diags),
        None => BTreeMap::new(),
    };

    Some(MethodInfo {
        pipeline: qualify_pipeline(&pipeline, &ctx.mod_name),
        args,
        execution_mode,
    })
}

fn decode_args(
    raw_args: &Map<String, Value>,
    resource_name: &str,
    diags: &mut Diagnostics,
) -> BTreeMap<String, AttrValue> {
    let mut args = BTreeMap::new();
    for (key, value) in raw_args {
        match decode_attr(value) {
            Ok((attr, _)) => {
                args.insert(key.clone(), attr);
            }
            Err(e) => {
                diags.push(
                    DecodeDiagnostic::error(
                        format!("invalid value for arg '{}'", key),
                        SourceRef::attribute(resource_name.to_string(), format!("args.{}", key)),
                    )
                    .with_detail(e.to_string()),
                );
            }
        }
    }
    args
}

/// Qualify a short pipeline reference against the enclosing mod.
fn qualify_pipeline(reference: &str, mod_name: &str) -> String {
    if reference.contains('.') {
        reference.to_string()
    } else {
        format!("{}.pipeline.{}", mod_name, reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::has_errors;
    use serde_json::json;

    fn test_ctx() -> DecodeContext {
        let mut credentials = BTreeMap::new();
        credentials.insert(
            "aws".to_string(),
            BTreeSet::from(["dev".to_string(), "prod".to_string()]),
        );
        DecodeContext {
            mod_name: "local".to_string(),
            variables: Map::new(),
            credentials,
            connections: BTreeMap::new(),
        }
    }

    fn pipeline_from_yaml(yaml: &str) -> (Option<Pipeline>, Diagnostics) {
        let raw: Value = serde_yaml::from_str(yaml).unwrap();
        let ctx = test_ctx();
        let mut diags = Vec::new();
        let pipeline = decode_pipeline(&raw, &ctx, &mut diags);
        (pipeline, diags)
    }

    #[test]
    fn test_static_attr_is_resolved() {
        let (pipeline, diags) = pipeline_from_yaml(
            r#"
name: fetch
steps:
  - kind: http
    name: get
    url: "https://example.com/users"
    method: get
"#,
        );
        assert!(!has_errors(&diags));
        let step = &pipeline.unwrap().steps[0];
        assert_eq!(
            step.attrs["url"],
            AttrValue::Resolved(json!("https://example.com/users"))
        );
    }

    #[test]
    fn test_referencing_attr_is_deferred_and_extracted() {
        let (pipeline, diags) = pipeline_from_yaml(
            r#"
name: fetch
steps:
  - kind: http
    name: first
    url: "https://example.com"
  - kind: transform
    name: shape
    value: "${step.http.first.response_body}"
"#,
        );
        assert!(!has_errors(&diags));
        let pipeline = pipeline.unwrap();
        let step = pipeline.step("transform.shape").unwrap();
        assert!(step.attrs["value"].is_deferred());
        assert!(step.depends_on.contains("http.first"));
    }

    #[test]
    fn test_credential_wildcard_from_dynamic_subscript() {
        let (pipeline, _) = pipeline_from_yaml(
            r#"
name: fetch
params:
  - name: env
    type: string
    default: dev
steps:
  - kind: http
    name: get
    url: "https://example.com"
    request_headers:
      token: "${credential.aws[param.env].token}"
"#,
        );
        let pipeline = pipeline.unwrap();
        let step = pipeline.step("http.get").unwrap();
        assert!(step.credential_depends_on.contains("aws.<dynamic>"));
    }

    #[test]
    fn test_legacy_bare_identifier_is_connection_dep() {
        let (pipeline, _) = pipeline_from_yaml(
            r#"
name: fetch
steps:
  - kind: query
    name: q
    sql: select 1
    database: "${steampipe.default}"
"#,
        );
        let pipeline = pipeline.unwrap();
        let step = pipeline.step("query.q").unwrap();
        // only the bare root is recorded, the instance binds at fire time
        assert!(step.connection_depends_on.contains("steampipe"));
    }

    #[test]
    fn test_for_each_contributes_dependencies() {
        let (pipeline, _) = pipeline_from_yaml(
            r#"
name: fanout
steps:
  - kind: transform
    name: list
    value: "[1, 2, 3]"
  - kind: sleep
    name: wait
    duration: 1s
    for_each: "${step.transform.list.value}"
"#,
        );
        let pipeline = pipeline.unwrap();
        let step = pipeline.step("sleep.wait").unwrap();
        assert!(step.depends_on.contains("transform.list"));
    }

    #[test]
    fn test_step_output_refs_contribute_depends_on() {
        let (pipeline, diags) = pipeline_from_yaml(
            r#"
name: fetch
steps:
  - kind: http
    name: first
    url: "https://example.com"
  - kind: transform
    name: second
    value: "done"
    output:
      body: "${step.http.first.response_body}"
"#,
        );
        assert!(!has_errors(&diags));
        let pipeline = pipeline.unwrap();
        let step = pipeline.step("transform.second").unwrap();
        assert!(step.outputs["body"].is_deferred());
        assert!(step.depends_on.contains("http.first"));
    }

    #[test]
    fn test_duplicate_step_names_are_decode_errors() {
        let (_, diags) = pipeline_from_yaml(
            r#"
name: fetch
steps:
  - kind: sleep
    name: wait
    duration: 1s
  - kind: sleep
    name: wait
    duration: 2s
"#,
        );
        assert!(has_errors(&diags));
        assert!(diags
            .iter()
            .any(|d| d.summary.contains("duplicate step name 'sleep.wait'")));
    }

    #[test]
    fn test_unsupported_attribute_is_a_decode_error() {
        let (_, diags) = pipeline_from_yaml(
            r#"
name: fetch
steps:
  - kind: sleep
    name: wait
    duration: 1s
    url: "https://nope"
"#,
        );
        assert!(has_errors(&diags));
        assert!(diags
            .iter()
            .any(|d| d.summary.contains("unsupported attribute 'url'")));
    }

    #[test]
    fn test_enum_on_map_type_is_decode_error() {
        let (_, diags) = pipeline_from_yaml(
            r#"
name: fetch
params:
  - name: settings
    type: map(string)
    enum: ["a", "b"]
"#,
        );
        assert!(has_errors(&diags));
    }

    #[test]
    fn test_default_must_be_enum_member() {
        let (pipeline, diags) = pipeline_from_yaml(
            r#"
name: fetch
params:
  - name: city
    type: string
    enum: ["New York", "Boston"]
    default: "Sydney"
"#,
        );
        assert!(has_errors(&diags));
        assert!(pipeline.unwrap().params.is_empty());
    }

    #[test]
    fn test_decoding_is_deterministic() {
        let yaml = r#"
name: fetch
steps:
  - kind: http
    name: get
    url: "https://example.com/${param.city}"
"#;
        let (a, _) = pipeline_from_yaml(yaml);
        let (b, _) = pipeline_from_yaml(yaml);
        assert_eq!(a, b);
    }

    #[test]
    fn test_output_depends_on_referenced_steps() {
        let (pipeline, diags) = pipeline_from_yaml(
            r#"
name: fetch
steps:
  - kind: http
    name: get
    url: "https://example.com"
outputs:
  - name: body
    value: "${step.http.get.response_body}"
"#,
        );
        assert!(!has_errors(&diags));
        let pipeline = pipeline.unwrap();
        assert!(pipeline.outputs[0].depends_on.contains("http.get"));
    }

    #[test]
    fn test_trigger_decode_with_methods() {
        let raw: Value = serde_yaml::from_str(
            r#"
kind: http
name: hook
pipeline: fetch
args:
  source: default
methods:
  get:
    pipeline: fetch
    execution_mode: synchronous
    args:
      source: explicit
"#,
        )
        .unwrap();
        let ctx = test_ctx();
        let mut diags = Vec::new();
        let trigger = decode_trigger(&raw, &ctx, &mut diags).unwrap();
        assert!(!has_errors(&diags));
        assert_eq!(trigger.name, "local.trigger.http.hook");
        let get = trigger.method("get").unwrap();
        assert_eq!(get.args["source"], AttrValue::Resolved(json!("explicit")));
        assert_eq!(get.execution_mode, ExecutionMode::Synchronous);
    }

    #[test]
    fn test_invalid_schedule_is_rejected() {
        let raw: Value = serde_yaml::from_str(
            r#"
kind: schedule
name: nightly
schedule: sometimes
pipeline: fetch
"#,
        )
        .unwrap();
        let ctx = test_ctx();
        let mut diags = Vec::new();
        assert!(decode_trigger(&raw, &ctx, &mut diags).is_none());
        assert!(has_errors(&diags));
    }

    #[test]
    fn test_retry_bounds_are_checked() {
        let (_, diags) = pipeline_from_yaml(
            r#"
name: fetch
steps:
  - kind: http
    name: get
    url: "https://example.com"
    retry:
      max_attempts: 500
"#,
        );
        assert!(has_errors(&diags));
    }
}
