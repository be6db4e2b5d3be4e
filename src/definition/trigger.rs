//! Trigger resources.
//!
//! A trigger is a standing rule that invokes a pipeline with resolved
//! arguments. Three kinds exist: schedule, query and http.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::definition::param::Param;
use crate::definition::types::AttrValue;
use crate::error::{Error, Result};

/// Schedule strings accepted without cron parsing.
pub const VALID_INTERVALS: &[&str] = &[
    "hourly", "daily", "weekly", "5m", "10m", "15m", "30m", "60m", "1h", "2h", "4h", "6h", "12h",
    "24h",
];

/// Validate a schedule attribute: either a named interval or a cron
/// expression.
pub fn validate_schedule(schedule: &str) -> Result<()> {
    if VALID_INTERVALS.contains(&schedule.to_lowercase().as_str()) {
        return Ok(());
    }
    cron::Schedule::from_str(schedule).map_err(|e| {
        Error::Validation(format!("invalid schedule '{}': {}", schedule, e))
    })?;
    Ok(())
}

/// How an HTTP trigger invocation runs relative to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Asynchronous,
    Synchronous,
}

/// Per-method invocation target of an HTTP trigger.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodInfo {
    pub pipeline: String,
    pub args: BTreeMap<String, AttrValue>,
    pub execution_mode: ExecutionMode,
}

/// Kind-specific trigger configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerConfig {
    Schedule {
        schedule: String,
    },
    Query {
        sql: String,
        primary_key: String,
        schedule: Option<String>,
    },
    Http {
        /// Explicit method blocks, keyed by lowercase method name.
        methods: BTreeMap<String, MethodInfo>,
    },
}

impl TriggerConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            TriggerConfig::Schedule { .. } => "schedule",
            TriggerConfig::Query { .. } => "query",
            TriggerConfig::Http { .. } => "http",
        }
    }
}

/// A trigger definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    /// Fully-qualified name, `mod.trigger.kind.name`.
    pub name: String,
    pub short_name: String,
    pub mod_name: String,
    pub description: Option<String>,
    pub enabled: bool,
    /// Default target pipeline (fully-qualified). For HTTP triggers this,
    /// together with `args`, acts as the fallback when no explicit method
    /// block matches.
    pub pipeline: Option<String>,
    pub args: BTreeMap<String, AttrValue>,
    pub params: Vec<Param>,
    pub config: TriggerConfig,
}

impl Trigger {
    pub fn full_name(mod_name: &str, kind: &str, short_name: &str) -> String {
        format!("{}.trigger.{}.{}", mod_name, kind, short_name)
    }

    /// Resolve the invocation target for an HTTP method. An explicit method
    /// block wins over the default top-level pipeline/args fallback.
    pub fn method(&self, method: &str) -> Option<MethodInfo> {
        let method = method.to_lowercase();
        if let TriggerConfig::Http { methods } = &self.config {
            if let Some(info) = methods.get(&method) {
                return Some(info.clone());
            }
        }
        self.pipeline.as_ref().map(|pipeline| MethodInfo {
            pipeline: pipeline.clone(),
            args: self.args.clone(),
            execution_mode: ExecutionMode::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_named_intervals() {
        assert!(validate_schedule("daily").is_ok());
        assert!(validate_schedule("5m").is_ok());
        assert!(validate_schedule("Hourly").is_ok());
    }

    #[test]
    fn test_cron_schedule() {
        assert!(validate_schedule("0 0 * * * *").is_ok());
        assert!(validate_schedule("every other tuesday").is_err());
    }

    #[test]
    fn test_explicit_method_wins_over_default() {
        let mut methods = BTreeMap::new();
        methods.insert(
            "get".to_string(),
            MethodInfo {
                pipeline: "local.pipeline.fetch".to_string(),
                args: BTreeMap::from([(
                    "source".to_string(),
                    AttrValue::Resolved(json!("explicit")),
                )]),
                execution_mode: ExecutionMode::Synchronous,
            },
        );
        let trigger = Trigger {
            name: Trigger::full_name("local", "http", "hook"),
            short_name: "hook".to_string(),
            mod_name: "local".to_string(),
            description: None,
            enabled: true,
            pipeline: Some("local.pipeline.fetch".to_string()),
            args: BTreeMap::from([(
                "source".to_string(),
                AttrValue::Resolved(json!("default")),
            )]),
            params: Vec::new(),
            config: TriggerConfig::Http { methods },
        };

        let get = trigger.method("GET").unwrap();
        assert_eq!(get.args["source"], AttrValue::Resolved(json!("explicit")));
        assert_eq!(get.execution_mode, ExecutionMode::Synchronous);

        // no explicit post block, so the default fallback applies
        let post = trigger.method("post").unwrap();
        assert_eq!(post.args["source"], AttrValue::Resolved(json!("default")));
        assert_eq!(post.execution_mode, ExecutionMode::Asynchronous);
    }
}
