//! Trigger argument resolution.
//!
//! When a trigger fires, the resolver re-reads the live definition, runs
//! parameter validation, builds the evaluation scope from mod variables and
//! bound params, and evaluates the pipeline-argument expressions into the
//! concrete argument map handed to the execution engine.

use std::collections::BTreeMap;
use std::sync::RwLock;

use serde_json::{Map, Value};
use tracing::debug;

use crate::config::ResolverConfig;
use crate::definition::{ExecutionMode, MethodInfo, Module, Trigger};
use crate::error::{Error, Result};
use crate::expr::Scope;
use crate::params::validate_params;

/// Live definition lookup. The resolver re-fetches through this interface
/// immediately before evaluating arguments, never reusing a stale handle;
/// the implementor owns reload semantics.
pub trait DefinitionStore {
    /// Current definition of a trigger, by fully-qualified name.
    fn get_trigger(&self, fq_name: &str) -> Option<Trigger>;
    /// Current definition of a mod.
    fn get_module(&self, name: &str) -> Option<Module>;
}

/// An in-memory store keyed by mod name. Reloads replace whole mods.
#[derive(Default)]
pub struct InMemoryStore {
    modules: RwLock<BTreeMap<String, Module>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a mod wholesale.
    pub fn put_module(&self, module: Module) {
        if let Ok(mut modules) = self.modules.write() {
            modules.insert(module.name.clone(), module);
        }
    }
}

impl DefinitionStore for InMemoryStore {
    fn get_trigger(&self, fq_name: &str) -> Option<Trigger> {
        let modules = self.modules.read().ok()?;
        modules
            .values()
            .find_map(|m| m.trigger(fq_name).cloned())
    }

    fn get_module(&self, name: &str) -> Option<Module> {
        self.modules.read().ok()?.get(name).cloned()
    }
}

/// Phases of one resolve pass, used for tracing and error context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvePhase {
    FetchLatest,
    ValidateArgs,
    BuildScope,
    EvaluateArgs,
}

/// The concrete invocation produced by a successful resolve.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedInvocation {
    /// Fully-qualified pipeline name.
    pub pipeline: String,
    /// Fully-evaluated pipeline arguments.
    pub args: Map<String, Value>,
    pub execution_mode: ExecutionMode,
}

/// Resolves trigger invocations against a definition store.
pub struct TriggerResolver<'a, S: DefinitionStore> {
    store: &'a S,
    config: &'a ResolverConfig,
}

impl<'a, S: DefinitionStore> TriggerResolver<'a, S> {
    pub fn new(store: &'a S, config: &'a ResolverConfig) -> Self {
        TriggerResolver { store, config }
    }

    /// Resolve a schedule/query trigger invocation.
    pub fn resolve(
        &self,
        trigger_name: &str,
        args: &Map<String, Value>,
    ) -> Result<ResolvedInvocation> {
        self.resolve_inner(trigger_name, args, None, Value::Null)
    }

    /// Resolve an HTTP trigger invocation. The request context is bound as
    /// `self.*` in the evaluation scope; an explicit method block takes
    /// precedence over the trigger's default pipeline/args.
    pub fn resolve_http(
        &self,
        trigger_name: &str,
        method: &str,
        args: &Map<String, Value>,
        request: Value,
    ) -> Result<ResolvedInvocation> {
        self.resolve_inner(trigger_name, args, Some(method), request)
    }

    fn resolve_inner(
        &self,
        trigger_name: &str,
        args: &Map<String, Value>,
        method: Option<&str>,
        request: Value,
    ) -> Result<ResolvedInvocation> {
        debug!(trigger = trigger_name, phase = ?ResolvePhase::FetchLatest, "resolving trigger");
        let trigger = self
            .store
            .get_trigger(trigger_name)
            .ok_or_else(|| Error::NotFound(format!("trigger '{}'", trigger_name)))?;
        if !trigger.enabled {
            return Err(Error::Validation(format!(
                "trigger '{}' is disabled",
                trigger.name
            )));
        }
        self.check_scope(&trigger)?;

        debug!(trigger = %trigger.name, phase = ?ResolvePhase::ValidateArgs, "validating arguments");
        let errors = validate_params(&trigger.params, args);
        if !errors.is_empty() {
            return Err(Error::Validation(join_messages(&errors)));
        }

        debug!(trigger = %trigger.name, phase = ?ResolvePhase::BuildScope, "building scope");
        let owning_mod = self.store.get_module(&trigger.mod_name).ok_or_else(|| {
            Error::Internal(format!("definition for mod '{}' missing", trigger.mod_name))
        })?;
        let mut scope = Scope::new();
        scope.set_variables(owning_mod.variables.clone());
        scope.set_params(bind_params(&trigger, args));
        if !request.is_null() {
            scope.set("self", request);
        }

        debug!(trigger = %trigger.name, phase = ?ResolvePhase::EvaluateArgs, "evaluating invocation arguments");
        let info = self.invocation_target(&trigger, method)?;
        let mut resolved_args = Map::new();
        for (key, attr) in &info.args {
            resolved_args.insert(key.clone(), attr.evaluate(&scope)?);
        }

        Ok(ResolvedInvocation {
            pipeline: info.pipeline,
            args: resolved_args,
            execution_mode: info.execution_mode,
        })
    }

    /// Only the root mod or one of its direct dependencies may fire a
    /// trigger. Rejection is a distinct error kind from validation failure.
    fn check_scope(&self, trigger: &Trigger) -> Result<()> {
        if trigger.mod_name == self.config.root_mod {
            return Ok(());
        }
        let in_scope = self
            .store
            .get_module(&self.config.root_mod)
            .is_some_and(|root| root.depends_on.contains(&trigger.mod_name));
        if in_scope {
            Ok(())
        } else {
            Err(Error::Scope(format!(
                "trigger '{}' belongs to mod '{}', which is neither the root mod '{}' nor one of its direct dependencies",
                trigger.name, trigger.mod_name, self.config.root_mod
            )))
        }
    }

    fn invocation_target(&self, trigger: &Trigger, method: Option<&str>) -> Result<MethodInfo> {
        let info = match method {
            Some(method) => trigger.method(method),
            None => trigger.pipeline.as_ref().map(|pipeline| MethodInfo {
                pipeline: pipeline.clone(),
                args: trigger.args.clone(),
                execution_mode: ExecutionMode::default(),
            }),
        };
        info.ok_or_else(|| {
            Error::Internal(format!("trigger '{}' has no target pipeline", trigger.name))
        })
    }
}

/// Bound parameter values: supplied arguments first, then defaults for
/// anything unsupplied.
fn bind_params(trigger: &Trigger, args: &Map<String, Value>) -> Map<String, Value> {
    let mut bound = Map::new();
    for param in &trigger.params {
        if let Some(value) = args.get(&param.name) {
            bound.insert(param.name.clone(), value.clone());
        } else if let Some(default) = &param.default {
            bound.insert(param.name.clone(), default.clone());
        }
    }
    bound
}

fn join_messages(errors: &[Error]) -> String {
    errors
        .iter()
        .map(|e| match e {
            Error::Validation(msg) | Error::Coercion(msg) => msg.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const FIXTURE: &str = r#"
name: my_mod
variables:
  region: us-east-1
pipelines:
  - name: fetch
    params:
      - name: city
        type: string
    steps:
      - kind: http
        name: get
        url: "https://example.com/${param.city}"
triggers:
  - kind: schedule
    name: nightly
    schedule: daily
    pipeline: fetch
    params:
      - name: city
        type: string
        default: Boston
    args:
      city: "${param.city}"
      region: "${var.region}"
  - kind: http
    name: hook
    pipeline: fetch
    args:
      city: "${self.body.city}"
    methods:
      get:
        pipeline: fetch
        execution_mode: synchronous
        args:
          city: "from-get"
"#;

    fn store_with_fixture() -> InMemoryStore {
        let config = ResolverConfig::default();
        let (module, diags) = Module::from_document(FIXTURE, &config).unwrap();
        assert!(!crate::error::has_errors(&diags), "{:?}", diags);
        let store = InMemoryStore::new();
        store.put_module(module);
        store
    }

    #[test]
    fn test_resolve_with_defaults_and_variables() {
        let store = store_with_fixture();
        let config = ResolverConfig::default().with_root_mod("my_mod");
        let resolver = TriggerResolver::new(&store, &config);

        let resolved = resolver
            .resolve("my_mod.trigger.schedule.nightly", &Map::new())
            .unwrap();
        assert_eq!(resolved.pipeline, "my_mod.pipeline.fetch");
        assert_eq!(resolved.args["city"], json!("Boston"));
        assert_eq!(resolved.args["region"], json!("us-east-1"));
    }

    #[test]
    fn test_resolve_with_supplied_args() {
        let store = store_with_fixture();
        let config = ResolverConfig::default().with_root_mod("my_mod");
        let resolver = TriggerResolver::new(&store, &config);

        let mut args = Map::new();
        args.insert("city".to_string(), json!("New York"));
        let resolved = resolver
            .resolve("my_mod.trigger.schedule.nightly", &args)
            .unwrap();
        assert_eq!(resolved.args["city"], json!("New York"));
    }

    #[test]
    fn test_invalid_args_are_rejected_together() {
        let store = store_with_fixture();
        let config = ResolverConfig::default().with_root_mod("my_mod");
        let resolver = TriggerResolver::new(&store, &config);

        let mut args = Map::new();
        args.insert("city".to_string(), json!(42));
        args.insert("bogus".to_string(), json!("x"));
        let err = resolver
            .resolve("my_mod.trigger.schedule.nightly", &args)
            .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("unknown parameter specified 'bogus'"));
        assert!(text.contains("invalid data type for parameter 'city'"));
    }

    #[test]
    fn test_out_of_scope_mod_is_rejected_distinctly() {
        let store = store_with_fixture();
        let config = ResolverConfig::default().with_root_mod("other_mod");
        let resolver = TriggerResolver::new(&store, &config);

        let err = resolver
            .resolve("my_mod.trigger.schedule.nightly", &Map::new())
            .unwrap_err();
        assert!(matches!(err, Error::Scope(_)));
    }

    #[test]
    fn test_direct_dependency_is_in_scope() {
        let store = store_with_fixture();
        let config = ResolverConfig::default();
        let (mut root, _) = Module::from_document("name: root_mod", &config).unwrap();
        root.depends_on.push("my_mod".to_string());
        store.put_module(root);

        let config = ResolverConfig::default().with_root_mod("root_mod");
        let resolver = TriggerResolver::new(&store, &config);
        assert!(resolver
            .resolve("my_mod.trigger.schedule.nightly", &Map::new())
            .is_ok());
    }

    #[test]
    fn test_http_method_resolution_binds_self() {
        let store = store_with_fixture();
        let config = ResolverConfig::default().with_root_mod("my_mod");
        let resolver = TriggerResolver::new(&store, &config);

        // explicit get block wins over the default
        let resolved = resolver
            .resolve_http(
                "my_mod.trigger.http.hook",
                "get",
                &Map::new(),
                json!({"body": {"city": "Lisbon"}}),
            )
            .unwrap();
        assert_eq!(resolved.args["city"], json!("from-get"));
        assert_eq!(resolved.execution_mode, ExecutionMode::Synchronous);

        // no post block, so the default args evaluate against self.*
        let resolved = resolver
            .resolve_http(
                "my_mod.trigger.http.hook",
                "post",
                &Map::new(),
                json!({"body": {"city": "Lisbon"}}),
            )
            .unwrap();
        assert_eq!(resolved.args["city"], json!("Lisbon"));
        assert_eq!(resolved.execution_mode, ExecutionMode::Asynchronous);
    }

    #[test]
    fn test_resolve_sees_reloaded_definition() {
        let store = store_with_fixture();
        let config = ResolverConfig::default().with_root_mod("my_mod");
        let resolver = TriggerResolver::new(&store, &config);

        // reload the mod with a changed default between fires
        let reloaded = FIXTURE.replace("default: Boston", "default: Chicago");
        let (module, _) = Module::from_document(&reloaded, &config).unwrap();
        store.put_module(module);

        let resolved = resolver
            .resolve("my_mod.trigger.schedule.nightly", &Map::new())
            .unwrap();
        assert_eq!(resolved.args["city"], json!("Chicago"));
    }

    #[test]
    fn test_unknown_trigger() {
        let store = store_with_fixture();
        let config = ResolverConfig::default().with_root_mod("my_mod");
        let resolver = TriggerResolver::new(&store, &config);
        let err = resolver
            .resolve("my_mod.trigger.schedule.missing", &Map::new())
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
