//! Pipelines and their outputs.

use std::collections::BTreeSet;

use crate::definition::param::Param;
use crate::definition::step::Step;
use crate::definition::types::AttrValue;

/// A named output computed from step results once a pipeline finishes.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    pub name: String,
    pub value: AttrValue,
    pub description: Option<String>,
    /// Steps referenced by the value expression, `kind.name`.
    pub depends_on: BTreeSet<String>,
}

/// A named, parameterized, ordered sequence of typed steps.
///
/// Immutable once successfully decoded; a reload replaces the whole value.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    /// Fully-qualified name, `mod.pipeline.name`.
    pub name: String,
    /// The short name from the definition.
    pub short_name: String,
    pub mod_name: String,
    pub description: Option<String>,
    pub params: Vec<Param>,
    pub steps: Vec<Step>,
    pub outputs: Vec<PipelineOutput>,
    pub max_concurrency: Option<i64>,
}

impl Pipeline {
    pub fn new(mod_name: &str, short_name: &str) -> Self {
        Pipeline {
            name: format!("{}.pipeline.{}", mod_name, short_name),
            short_name: short_name.to_string(),
            mod_name: mod_name.to_string(),
            description: None,
            params: Vec::new(),
            steps: Vec::new(),
            outputs: Vec::new(),
            max_concurrency: None,
        }
    }

    pub fn step(&self, full_name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.full_name() == full_name)
    }

    pub fn param(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name)
    }

    /// All step fully-qualified names, in declaration order.
    pub fn step_names(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.full_name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::step::StepKind;

    #[test]
    fn test_fully_qualified_name() {
        let pipeline = Pipeline::new("my_mod", "fetch_user");
        assert_eq!(pipeline.name, "my_mod.pipeline.fetch_user");
        assert_eq!(pipeline.short_name, "fetch_user");
    }

    #[test]
    fn test_step_lookup() {
        let mut pipeline = Pipeline::new("local", "p");
        pipeline.steps.push(Step::new(StepKind::Sleep, "wait"));
        assert!(pipeline.step("sleep.wait").is_some());
        assert!(pipeline.step("sleep.other").is_none());
    }
}
