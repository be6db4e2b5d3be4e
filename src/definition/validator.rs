//! Dependency graph validation.
//!
//! Runs after a pipeline is fully decoded: every recorded step, credential
//! and connection reference is checked against the registries available in
//! the enclosing pipeline/mod, and the step graph is checked for cycles.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::definition::pipeline::Pipeline;
use crate::error::{DecodeDiagnostic, Diagnostics, SourceRef};

/// Validate all dependencies of one pipeline. One diagnostic per offending
/// reference, each naming the valid alternatives.
pub fn validate_pipeline(
    pipeline: &Pipeline,
    credentials: &BTreeMap<String, BTreeSet<String>>,
    connections: &BTreeMap<String, BTreeSet<String>>,
    diags: &mut Diagnostics,
) {
    let step_names: BTreeSet<String> = pipeline.step_names().into_iter().collect();

    for step in &pipeline.steps {
        let loc = SourceRef::attribute(pipeline.name.clone(), step.full_name());

        for dep in &step.depends_on {
            if !step_names.contains(dep) {
                diags.push(DecodeDiagnostic::error(
                    format!(
                        "invalid depends_on '{}' in step '{}', step does not exist in pipeline {}, valid steps are: {}",
                        dep,
                        step.full_name(),
                        pipeline.name,
                        join(&step_names)
                    ),
                    loc.clone(),
                ));
            }
        }

        validate_references(
            &step.credential_depends_on,
            credentials,
            "credential",
            &loc,
            diags,
        );
        validate_references(
            &step.connection_depends_on,
            connections,
            "connection",
            &loc,
            diags,
        );
    }

    // outputs may only depend on steps
    for output in &pipeline.outputs {
        for dep in &output.depends_on {
            if !step_names.contains(dep) {
                diags.push(DecodeDiagnostic::error(
                    format!(
                        "invalid depends_on '{}' in output '{}', valid steps are: {}",
                        dep,
                        output.name,
                        join(&step_names)
                    ),
                    SourceRef::attribute(pipeline.name.clone(), format!("output '{}'", output.name)),
                ));
            }
        }
    }

    if let Some(cycle_member) = find_cycle(pipeline) {
        diags.push(DecodeDiagnostic::error(
            format!(
                "cyclic step dependency involving '{}' in pipeline {}",
                cycle_member, pipeline.name
            ),
            SourceRef::resource(pipeline.name.clone()),
        ));
    }
}

/// Check credential/connection dependencies. A wildcard `type.<dynamic>`
/// needs only the type to exist; a concrete `type.name` needs the instance.
/// A bare one-part dep is the legacy connection shorthand and binds at fire
/// time, so it is not checked against the registry.
fn validate_references(
    deps: &BTreeSet<String>,
    registry: &BTreeMap<String, BTreeSet<String>>,
    what: &str,
    loc: &SourceRef,
    diags: &mut Diagnostics,
) {
    for dep in deps {
        match dep.strip_suffix(".<dynamic>") {
            Some(dep_type) => {
                if !registry.contains_key(dep_type) {
                    let valid_types: BTreeSet<String> = registry.keys().cloned().collect();
                    diags.push(DecodeDiagnostic::error(
                        format!(
                            "invalid {} type '{}', valid {} types are: {}",
                            what,
                            dep_type,
                            what,
                            join(&valid_types)
                        ),
                        loc.clone(),
                    ));
                }
            }
            None => {
                let Some((ty, name)) = dep.split_once('.') else {
                    continue;
                };
                let exists = registry.get(ty).is_some_and(|names| names.contains(name));
                if !exists {
                    let valid: BTreeSet<String> = registry
                        .iter()
                        .flat_map(|(ty, names)| names.iter().map(move |n| format!("{}.{}", ty, n)))
                        .collect();
                    diags.push(DecodeDiagnostic::error(
                        format!(
                            "invalid {} reference '{}', valid {}s are: {}",
                            what,
                            dep,
                            what,
                            join(&valid)
                        ),
                        loc.clone(),
                    ));
                }
            }
        }
    }
}

/// DFS with a recursion stack over the step dependency graph. Returns a
/// member of the first cycle found, if any.
fn find_cycle(pipeline: &Pipeline) -> Option<String> {
    let graph: HashMap<String, &BTreeSet<String>> = pipeline
        .steps
        .iter()
        .map(|s| (s.full_name(), &s.depends_on))
        .collect();

    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();

    fn visit(
        node: &str,
        graph: &HashMap<String, &BTreeSet<String>>,
        visited: &mut HashSet<String>,
        rec_stack: &mut HashSet<String>,
    ) -> bool {
        if rec_stack.contains(node) {
            return true;
        }
        if visited.contains(node) {
            return false;
        }
        visited.insert(node.to_string());
        rec_stack.insert(node.to_string());
        if let Some(deps) = graph.get(node) {
            for dep in deps.iter() {
                if graph.contains_key(dep) && visit(dep, graph, visited, rec_stack) {
                    return true;
                }
            }
        }
        rec_stack.remove(node);
        false
    }

    for name in graph.keys() {
        if visit(name, &graph, &mut visited, &mut rec_stack) {
            return Some(name.clone());
        }
    }
    None
}

fn join(items: &BTreeSet<String>) -> String {
    items.iter().cloned().collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::step::{Step, StepKind};
    use crate::error::has_errors;

    fn registries() -> (
        BTreeMap<String, BTreeSet<String>>,
        BTreeMap<String, BTreeSet<String>>,
    ) {
        let mut credentials = BTreeMap::new();
        credentials.insert("aws".to_string(), BTreeSet::from(["dev".to_string()]));
        let mut connections = BTreeMap::new();
        connections.insert(
            "steampipe".to_string(),
            BTreeSet::from(["default".to_string()]),
        );
        (credentials, connections)
    }

    fn step_with_deps(kind: StepKind, name: &str, deps: &[&str]) -> Step {
        let mut step = Step::new(kind, name);
        step.depends_on = deps.iter().map(|d| d.to_string()).collect();
        step
    }

    #[test]
    fn test_unknown_step_dependency_names_valid_steps() {
        let mut pipeline = Pipeline::new("local", "p");
        pipeline.steps.push(Step::new(StepKind::Http, "get"));
        pipeline
            .steps
            .push(step_with_deps(StepKind::Transform, "shape", &["http.missing"]));

        let (credentials, connections) = registries();
        let mut diags = Vec::new();
        validate_pipeline(&pipeline, &credentials, &connections, &mut diags);
        assert!(has_errors(&diags));
        let text = diags[0].to_string();
        assert!(text.contains("http.missing"));
        assert!(text.contains("valid steps are"));
        assert!(text.contains("http.get"));
    }

    #[test]
    fn test_unknown_credential_reference() {
        let mut pipeline = Pipeline::new("local", "p");
        let mut step = Step::new(StepKind::Http, "get");
        step.credential_depends_on.insert("aws.staging".to_string());
        pipeline.steps.push(step);

        let (credentials, connections) = registries();
        let mut diags = Vec::new();
        validate_pipeline(&pipeline, &credentials, &connections, &mut diags);
        assert!(diags
            .iter()
            .any(|d| d.summary.contains("invalid credential reference 'aws.staging'")
                && d.summary.contains("valid credentials are: aws.dev")));
    }

    #[test]
    fn test_wildcard_checks_type_only() {
        let mut pipeline = Pipeline::new("local", "p");
        let mut step = Step::new(StepKind::Http, "get");
        step.credential_depends_on.insert("aws.<dynamic>".to_string());
        step.credential_depends_on.insert("gcp.<dynamic>".to_string());
        pipeline.steps.push(step);

        let (credentials, connections) = registries();
        let mut diags = Vec::new();
        validate_pipeline(&pipeline, &credentials, &connections, &mut diags);
        // aws exists as a type, gcp does not
        assert_eq!(diags.len(), 1);
        assert!(diags[0].summary.contains("invalid credential type 'gcp'"));
        assert!(diags[0].summary.contains("valid credential types are: aws"));
    }

    #[test]
    fn test_legacy_connection_shorthand_is_not_checked() {
        let mut pipeline = Pipeline::new("local", "p");
        let mut step = Step::new(StepKind::Query, "q");
        step.connection_depends_on.insert("steampipe".to_string());
        pipeline.steps.push(step);

        // empty connection registry: the bare root binds at fire time
        let mut diags = Vec::new();
        validate_pipeline(&pipeline, &BTreeMap::new(), &BTreeMap::new(), &mut diags);
        assert!(diags.is_empty());
    }

    #[test]
    fn test_cycle_detection() {
        let mut pipeline = Pipeline::new("local", "p");
        pipeline
            .steps
            .push(step_with_deps(StepKind::Sleep, "a", &["sleep.b"]));
        pipeline
            .steps
            .push(step_with_deps(StepKind::Sleep, "b", &["sleep.a"]));

        let (credentials, connections) = registries();
        let mut diags = Vec::new();
        validate_pipeline(&pipeline, &credentials, &connections, &mut diags);
        assert!(diags
            .iter()
            .any(|d| d.summary.contains("cyclic step dependency")));
    }

    #[test]
    fn test_valid_graph_passes() {
        let mut pipeline = Pipeline::new("local", "p");
        pipeline.steps.push(Step::new(StepKind::Http, "get"));
        pipeline
            .steps
            .push(step_with_deps(StepKind::Transform, "shape", &["http.get"]));

        let (credentials, connections) = registries();
        let mut diags = Vec::new();
        validate_pipeline(&pipeline, &credentials, &connections, &mut diags);
        assert!(diags.is_empty());
    }
}
