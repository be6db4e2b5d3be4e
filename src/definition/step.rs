//! Pipeline steps.
//!
//! Step kinds are a closed set; each kind carries its own attribute schema.
//! Unknown attributes on a step are decode errors.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::definition::types::AttrValue;
use crate::error::{Error, Result};
use crate::retry::RetryConfig;

/// The closed set of step kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Http,
    Sleep,
    Email,
    Transform,
    Query,
    Pipeline,
    Function,
    Container,
    Input,
    Message,
}

impl StepKind {
    pub fn parse(text: &str) -> Result<StepKind> {
        match text {
            "http" => Ok(StepKind::Http),
            "sleep" => Ok(StepKind::Sleep),
            "email" => Ok(StepKind::Email),
            "transform" => Ok(StepKind::Transform),
            "query" => Ok(StepKind::Query),
            "pipeline" => Ok(StepKind::Pipeline),
            "function" => Ok(StepKind::Function),
            "container" => Ok(StepKind::Container),
            "input" => Ok(StepKind::Input),
            "message" => Ok(StepKind::Message),
            other => Err(Error::Parse(format!("invalid step type '{}'", other))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Http => "http",
            StepKind::Sleep => "sleep",
            StepKind::Email => "email",
            StepKind::Transform => "transform",
            StepKind::Query => "query",
            StepKind::Pipeline => "pipeline",
            StepKind::Function => "function",
            StepKind::Container => "container",
            StepKind::Input => "input",
            StepKind::Message => "message",
        }
    }

    /// Attribute names legal for this kind, beyond the common step fields.
    pub fn allowed_attrs(&self) -> &'static [&'static str] {
        match self {
            StepKind::Http => &[
                "url",
                "method",
                "request_timeout_ms",
                "insecure",
                "request_body",
                "request_headers",
            ],
            StepKind::Sleep => &["duration"],
            StepKind::Email => &[
                "smtp_username",
                "smtp_password",
                "host",
                "port",
                "from",
                "sender_name",
                "to",
                "cc",
                "bcc",
                "subject",
                "body",
                "content_type",
            ],
            StepKind::Transform => &["value"],
            StepKind::Query => &["sql", "database", "timeout", "args"],
            StepKind::Pipeline => &["pipeline", "args"],
            StepKind::Function => &["source", "runtime", "handler", "timeout", "env"],
            StepKind::Container => &[
                "image",
                "cmd",
                "entrypoint",
                "memory",
                "memory_reservation",
                "memory_swap",
                "memory_swappiness",
                "cpu_shares",
                "read_only",
                "user",
                "workdir",
                "env",
                "timeout",
            ],
            StepKind::Input => &["prompt", "type", "options", "notifier"],
            StepKind::Message => &["text", "subject", "notifier"],
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error handling config on a step. Absence means fail-fast.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorConfig {
    #[serde(default)]
    pub ignore: bool,
}

/// A conditional failure raised by a step when its condition holds.
#[derive(Debug, Clone, PartialEq)]
pub struct ThrowConfig {
    pub condition: AttrValue,
    pub message: Option<AttrValue>,
}

/// One typed unit of work inside a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub kind: StepKind,
    pub name: String,
    pub description: Option<String>,

    /// Kind-specific attributes, resolved or deferred.
    pub attrs: BTreeMap<String, AttrValue>,

    /// Fan-out expression; the step runs once per element.
    pub for_each: Option<AttrValue>,
    /// Skip condition.
    pub if_cond: Option<AttrValue>,

    pub retry: Option<RetryConfig>,
    pub error: Option<ErrorConfig>,
    pub throw: Vec<ThrowConfig>,

    /// Named output expressions on the step itself.
    pub outputs: BTreeMap<String, AttrValue>,

    pub max_concurrency: Option<i64>,

    /// Step dependencies, `kind.name`, explicit plus extracted.
    pub depends_on: BTreeSet<String>,
    /// Credential dependencies, `type.name` or `type.<dynamic>`.
    pub credential_depends_on: BTreeSet<String>,
    /// Connection dependencies, same forms as credentials.
    pub connection_depends_on: BTreeSet<String>,
}

impl Step {
    pub fn new(kind: StepKind, name: impl Into<String>) -> Self {
        Step {
            kind,
            name: name.into(),
            description: None,
            attrs: BTreeMap::new(),
            for_each: None,
            if_cond: None,
            retry: None,
            error: None,
            throw: Vec::new(),
            outputs: BTreeMap::new(),
            max_concurrency: None,
            depends_on: BTreeSet::new(),
            credential_depends_on: BTreeSet::new(),
            connection_depends_on: BTreeSet::new(),
        }
    }

    /// Fully-qualified step name, `kind.name`, unique within a pipeline.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.kind, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kind() {
        assert_eq!(StepKind::parse("http").unwrap(), StepKind::Http);
        assert_eq!(StepKind::parse("transform").unwrap(), StepKind::Transform);
        assert!(StepKind::parse("webhook").is_err());
    }

    #[test]
    fn test_full_name() {
        let step = Step::new(StepKind::Http, "get_user");
        assert_eq!(step.full_name(), "http.get_user");
    }

    #[test]
    fn test_allowed_attrs() {
        assert!(StepKind::Http.allowed_attrs().contains(&"url"));
        assert!(!StepKind::Sleep.allowed_attrs().contains(&"url"));
    }
}
