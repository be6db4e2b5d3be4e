//! Error types for pipevine.
//!
//! Two failure families exist. Decode diagnostics (`DecodeDiagnostic`) are
//! collected per resource and never abort sibling resources. Runtime errors
//! (`Error`) cover validation, coercion, evaluation and internal faults; the
//! parameter system aggregates them and returns all of them together.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for pipevine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// pipevine error types.
///
/// Each variant includes a code that callers can match programmatically.
#[derive(Error, Debug)]
pub enum Error {
    /// Bad request: unknown parameter, type mismatch, missing required
    /// parameter, invalid enum value, unresolvable dependency reference.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A string argument could not be converted into the declared type, or a
    /// reference shorthand was malformed.
    #[error("Coercion error: {0}")]
    Coercion(String),

    /// A deferred expression failed to evaluate against the supplied scope.
    #[error("Evaluation error: {0}")]
    Eval(String),

    /// Malformed definition document or expression text.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A trigger was fired from outside the root mod or its direct
    /// dependencies. Distinct from validation failure.
    #[error("Trigger scope error: {0}")]
    Scope(String),

    /// Missing metadata or inconsistent state that should not occur; callers
    /// map this to a 5xx-equivalent outcome.
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get the error code for programmatic matching.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::Coercion(_) => "COERCION_ERROR",
            Error::Eval(_) => "EVAL_ERROR",
            Error::Parse(_) => "PARSE_ERROR",
            Error::Scope(_) => "SCOPE_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Yaml(_) => "YAML_ERROR",
            Error::Json(_) => "JSON_ERROR",
            Error::Io(_) => "IO_ERROR",
        }
    }

    /// Whether this error is a bad-request class failure (4xx equivalent).
    ///
    /// `Internal`, `Io` and the serialization wrappers are server-side
    /// faults and map to 5xx-equivalent outcomes.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::Validation(_)
                | Error::Coercion(_)
                | Error::Eval(_)
                | Error::Parse(_)
                | Error::Scope(_)
                | Error::NotFound(_)
        )
    }
}

/// Severity of a decode diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

/// Structural source location attached to a decode diagnostic.
///
/// YAML decoding through serde does not retain line numbers, so locations
/// are recorded as file / resource / attribute path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Fully-qualified or local name of the enclosing resource.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    /// Attribute path within the resource, e.g. `steps[2].url`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl SourceRef {
    pub fn resource(name: impl Into<String>) -> Self {
        SourceRef {
            file: None,
            resource: Some(name.into()),
            attribute: None,
        }
    }

    pub fn attribute(name: impl Into<String>, attr: impl Into<String>) -> Self {
        SourceRef {
            file: None,
            resource: Some(name.into()),
            attribute: Some(attr.into()),
        }
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }
}

impl std::fmt::Display for SourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts: Vec<&str> = Vec::new();
        if let Some(file) = &self.file {
            parts.push(file);
        }
        if let Some(resource) = &self.resource {
            parts.push(resource);
        }
        if let Some(attr) = &self.attribute {
            parts.push(attr);
        }
        write!(f, "{}", parts.join(": "))
    }
}

/// A single decode-time problem with its source location.
///
/// An error diagnostic aborts decoding of the enclosing resource only;
/// sibling resources still attempt to decode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodeDiagnostic {
    pub severity: Severity,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub location: SourceRef,
}

impl DecodeDiagnostic {
    pub fn error(summary: impl Into<String>, location: SourceRef) -> Self {
        DecodeDiagnostic {
            severity: Severity::Error,
            summary: summary.into(),
            detail: None,
            location,
        }
    }

    pub fn warning(summary: impl Into<String>, location: SourceRef) -> Self {
        DecodeDiagnostic {
            severity: Severity::Warning,
            summary: summary.into(),
            detail: None,
            location,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl std::fmt::Display for DecodeDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.summary)?;
        if let Some(detail) = &self.detail {
            write!(f, " ({})", detail)?;
        }
        let loc = self.location.to_string();
        if !loc.is_empty() {
            write!(f, " [{}]", loc)?;
        }
        Ok(())
    }
}

/// Diagnostics collected during one decode pass.
pub type Diagnostics = Vec<DecodeDiagnostic>;

/// True when any diagnostic in the list is an error.
pub fn has_errors(diags: &Diagnostics) -> bool {
    diags.iter().any(|d| d.severity == Severity::Error)
}

/// Upgrade every warning to an error. Strict decodes treat warnings as
/// blocking.
pub fn escalate_warnings(diags: &mut Diagnostics) {
    for diag in diags.iter_mut() {
        if diag.severity == Severity::Warning {
            diag.severity = Severity::Error;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_classification() {
        assert!(Error::Validation("bad".into()).is_client_error());
        assert!(Error::Scope("out of scope".into()).is_client_error());
        assert!(Error::Coercion("bad value".into()).is_client_error());
        assert!(!Error::Internal("boom".into()).is_client_error());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::Validation("x".into()).code(), "VALIDATION_ERROR");
        assert_eq!(Error::Scope("x".into()).code(), "SCOPE_ERROR");
    }

    #[test]
    fn test_diagnostic_display() {
        let diag = DecodeDiagnostic::error(
            "duplicate step name 'http.get'",
            SourceRef::attribute("pipeline.fetch", "steps[1]"),
        );
        let text = diag.to_string();
        assert!(text.contains("duplicate step name"));
        assert!(text.contains("pipeline.fetch"));
    }

    #[test]
    fn test_has_errors() {
        let diags = vec![DecodeDiagnostic::warning(
            "unused variable",
            SourceRef::default(),
        )];
        assert!(!has_errors(&diags));
    }

    #[test]
    fn test_escalate_warnings() {
        let mut diags = vec![DecodeDiagnostic::warning(
            "unused variable",
            SourceRef::default(),
        )];
        escalate_warnings(&mut diags);
        assert!(has_errors(&diags));
    }
}
