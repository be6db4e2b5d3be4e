//! Mods: loadable units of pipelines, triggers and registries.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::ResolverConfig;
use crate::definition::decoder::{decode_pipeline, decode_trigger, DecodeContext};
use crate::definition::pipeline::Pipeline;
use crate::definition::raw::{RawDocument, RawResourceDef};
use crate::definition::trigger::{Trigger, TriggerConfig};
use crate::definition::validator::validate_pipeline;
use crate::error::{escalate_warnings, DecodeDiagnostic, Diagnostics, Error, Result, SourceRef};

/// A named container of resources loaded from one directory. Read-only once
/// built; a reload replaces the whole value.
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub name: String,
    pub description: Option<String>,
    /// Mod-level variables, available to expressions as `var.*`.
    pub variables: Map<String, Value>,
    /// Direct mod dependencies.
    pub depends_on: Vec<String>,
    /// Pipelines keyed by fully-qualified name.
    pub pipelines: BTreeMap<String, Pipeline>,
    /// Triggers keyed by fully-qualified name.
    pub triggers: BTreeMap<String, Trigger>,
    /// Credential registry: type -> names.
    pub credentials: BTreeMap<String, BTreeSet<String>>,
    /// Connection registry: type -> names.
    pub connections: BTreeMap<String, BTreeSet<String>>,
}

impl Module {
    /// Decode one definition document into a mod. Decoding is best-effort:
    /// the returned diagnostics carry every per-resource failure, and
    /// resources that failed validation are still present so tooling can
    /// inspect partially-decoded state.
    pub fn from_document(text: &str, config: &ResolverConfig) -> Result<(Module, Diagnostics)> {
        let doc = RawDocument::parse(text)?;
        let mut diags = Vec::new();
        let mut module = Module {
            name: doc.name.clone(),
            description: doc.description.clone(),
            variables: doc.variables.clone(),
            depends_on: doc.depends_on.clone(),
            ..Default::default()
        };
        register(&doc.credentials, &mut module.credentials);
        register(&doc.connections, &mut module.connections);
        module.decode_resources(&doc, &mut diags);
        module.check_trigger_targets(&mut diags);
        if config.strict {
            escalate_warnings(&mut diags);
        }
        Ok((module, diags))
    }

    /// Load every `.yaml`/`.yml` file in a directory into one mod. All
    /// documents must declare the same mod name; a file that fails to parse
    /// is reported and skipped.
    pub fn load_dir(path: &Path, config: &ResolverConfig) -> Result<(Module, Diagnostics)> {
        let mut entries: Vec<_> = std::fs::read_dir(path)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("yaml") | Some("yml")
                )
            })
            .collect();
        entries.sort();
        if entries.is_empty() {
            return Err(Error::NotFound(format!(
                "no definition files in {}",
                path.display()
            )));
        }

        let mut diags = Vec::new();
        let mut module: Option<Module> = None;

        for file in entries {
            let file_name = file.display().to_string();
            let text = match std::fs::read_to_string(&file) {
                Ok(text) => text,
                Err(e) => {
                    warn!(file = %file_name, error = %e, "skipping unreadable definition file");
                    diags.push(
                        DecodeDiagnostic::error(
                            "unreadable definition file",
                            SourceRef::default().with_file(file_name),
                        )
                        .with_detail(e.to_string()),
                    );
                    continue;
                }
            };
            let doc = match RawDocument::parse(&text) {
                Ok(doc) => doc,
                Err(e) => {
                    diags.push(
                        DecodeDiagnostic::error(
                            "malformed definition file",
                            SourceRef::default().with_file(file_name),
                        )
                        .with_detail(e.to_string()),
                    );
                    continue;
                }
            };

            let target = module.get_or_insert_with(|| Module {
                name: doc.name.clone(),
                description: doc.description.clone(),
                ..Default::default()
            });
            if doc.name != target.name {
                diags.push(DecodeDiagnostic::error(
                    format!(
                        "definition file declares mod '{}' but the directory is mod '{}'",
                        doc.name, target.name
                    ),
                    SourceRef::default().with_file(file_name),
                ));
                continue;
            }
            target.variables.extend(doc.variables.clone());
            for dep in &doc.depends_on {
                if !target.depends_on.contains(dep) {
                    target.depends_on.push(dep.clone());
                }
            }
            register(&doc.credentials, &mut target.credentials);
            register(&doc.connections, &mut target.connections);
            target.decode_resources(&doc, &mut diags);
        }

        match module {
            Some(module) => {
                module.check_trigger_targets(&mut diags);
                if config.strict {
                    escalate_warnings(&mut diags);
                }
                debug!(
                    mod_name = %module.name,
                    pipelines = module.pipelines.len(),
                    triggers = module.triggers.len(),
                    "loaded mod"
                );
                Ok((module, diags))
            }
            None => Err(Error::NotFound(format!(
                "no usable definition files in {}",
                path.display()
            ))),
        }
    }

    fn decode_resources(&mut self, doc: &RawDocument, diags: &mut Diagnostics) {
        let ctx = DecodeContext {
            mod_name: self.name.clone(),
            variables: self.variables.clone(),
            credentials: self.credentials.clone(),
            connections: self.connections.clone(),
        };

        for raw in &doc.pipelines {
            if let Some(pipeline) = decode_pipeline(raw, &ctx, diags) {
                validate_pipeline(&pipeline, &self.credentials, &self.connections, diags);
                if self.pipelines.contains_key(&pipeline.name) {
                    diags.push(DecodeDiagnostic::error(
                        format!("duplicate pipeline '{}'", pipeline.name),
                        SourceRef::resource(pipeline.name.clone()),
                    ));
                    continue;
                }
                self.pipelines.insert(pipeline.name.clone(), pipeline);
            }
        }

        for raw in &doc.triggers {
            if let Some(trigger) = decode_trigger(raw, &ctx, diags) {
                if self.triggers.contains_key(&trigger.name) {
                    diags.push(DecodeDiagnostic::error(
                        format!("duplicate trigger '{}'", trigger.name),
                        SourceRef::resource(trigger.name.clone()),
                    ));
                    continue;
                }
                self.triggers.insert(trigger.name.clone(), trigger);
            }
        }
    }

    /// Warn about triggers whose target pipeline is not defined in this mod.
    /// Targets qualified into another mod cannot be checked here, so this is
    /// a warning; strict decodes escalate it.
    fn check_trigger_targets(&self, diags: &mut Diagnostics) {
        let prefix = format!("{}.pipeline.", self.name);
        for trigger in self.triggers.values() {
            let mut targets: Vec<&String> = trigger.pipeline.iter().collect();
            if let TriggerConfig::Http { methods } = &trigger.config {
                targets.extend(methods.values().map(|m| &m.pipeline));
            }
            for target in targets {
                if target.starts_with(&prefix) && !self.pipelines.contains_key(target) {
                    diags.push(DecodeDiagnostic::warning(
                        format!(
                            "trigger '{}' references unknown pipeline '{}'",
                            trigger.name, target
                        ),
                        SourceRef::resource(trigger.name.clone()),
                    ));
                }
            }
        }
    }

    pub fn pipeline(&self, fq_name: &str) -> Option<&Pipeline> {
        self.pipelines.get(fq_name)
    }

    pub fn trigger(&self, fq_name: &str) -> Option<&Trigger> {
        self.triggers.get(fq_name)
    }
}

fn register(defs: &[RawResourceDef], registry: &mut BTreeMap<String, BTreeSet<String>>) {
    for def in defs {
        registry
            .entry(def.ty.clone())
            .or_default()
            .insert(def.name.clone());
    }
}
