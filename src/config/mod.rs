//! Resolver configuration.
//!
//! All configuration is an explicit value threaded through the decode and
//! resolve call chains. There are no ambient globals: two resolvers with
//! different configs can run side by side in one process.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for a definition resolver instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Directory the mod definitions are loaded from.
    #[serde(default)]
    pub mod_location: Option<PathBuf>,

    /// Name of the root mod. Triggers may only be fired for the root mod
    /// or its direct dependencies.
    #[serde(default = "default_root_mod")]
    pub root_mod: String,

    /// Treat decode warnings as errors when a mod's diagnostics are
    /// finalized.
    #[serde(default)]
    pub strict: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            mod_location: None,
            root_mod: default_root_mod(),
            strict: false,
        }
    }
}

fn default_root_mod() -> String {
    "local".to_string()
}

impl ResolverConfig {
    pub fn with_root_mod(mut self, name: impl Into<String>) -> Self {
        self.root_mod = name.into();
        self
    }

    pub fn with_mod_location(mut self, path: impl Into<PathBuf>) -> Self {
        self.mod_location = Some(path.into());
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}
