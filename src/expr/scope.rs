//! Evaluation scope.
//!
//! A scope maps namespace roots (`param`, `each`, `var`, `self`, `step`,
//! `credential`, `connection`, ...) to JSON values. References resolve by
//! walking from the root through the value tree.

use serde_json::{json, Map, Value};
use std::collections::HashMap;

/// Namespace roots the dependency classifier recognizes. A bare identifier
/// outside this set is treated as a legacy connection reference.
pub const KNOWN_NAMESPACES: &[&str] = &[
    "param",
    "each",
    "var",
    "self",
    "loop",
    "result",
    "retry",
    "step",
    "credential",
    "connection",
];

/// An evaluation scope: namespace root -> value tree.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    roots: HashMap<String, Value>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a namespace root wholesale.
    pub fn set(&mut self, root: impl Into<String>, value: Value) {
        self.roots.insert(root.into(), value);
    }

    /// Set one entry under a namespace root, creating the root as an object
    /// if needed.
    pub fn set_entry(&mut self, root: &str, key: &str, value: Value) {
        let entry = self
            .roots
            .entry(root.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(map) = entry {
            map.insert(key.to_string(), value);
        }
    }

    pub fn get(&self, root: &str) -> Option<&Value> {
        self.roots.get(root)
    }

    /// Bind parameter values under `param.*`.
    pub fn set_params(&mut self, params: Map<String, Value>) {
        self.roots.insert("param".to_string(), Value::Object(params));
    }

    /// Bind mod variables under `var.*`.
    pub fn set_variables(&mut self, variables: Map<String, Value>) {
        self.roots.insert("var".to_string(), Value::Object(variables));
    }

    /// Temporarily add late-binding placeholders for every known credential
    /// and connection, so reference expressions resolve during decode without
    /// touching the real secrets. The returned guard restores the previous
    /// `credential`/`connection` roots when dropped, on every exit path.
    pub fn late_binding<'a, C, N>(&'a mut self, credentials: C, connections: N) -> LateBindingGuard<'a>
    where
        C: IntoIterator<Item = (String, String)>,
        N: IntoIterator<Item = (String, String)>,
    {
        let saved_credentials = self.roots.get("credential").cloned();
        let saved_connections = self.roots.get("connection").cloned();

        let mut cred_root = Map::new();
        for (cred_type, name) in credentials {
            let by_type = cred_root
                .entry(cred_type.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(map) = by_type {
                map.insert(name.clone(), placeholder("credential", &cred_type, &name));
            }
        }
        self.roots
            .insert("credential".to_string(), Value::Object(cred_root));

        let mut conn_root = Map::new();
        for (conn_type, name) in connections {
            let by_type = conn_root
                .entry(conn_type.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(map) = by_type {
                map.insert(name.clone(), placeholder("connection", &conn_type, &name));
            }
        }
        self.roots
            .insert("connection".to_string(), Value::Object(conn_root));

        LateBindingGuard {
            scope: self,
            saved_credentials,
            saved_connections,
        }
    }
}

/// Placeholder value standing in for a late-bound resource. Marked
/// `temporary` so downstream consumers know the real value is resolved at
/// execution time, not here.
fn placeholder(kind: &str, res_type: &str, name: &str) -> Value {
    json!({
        "name": name,
        "type": res_type,
        "resource_type": format!("{}.{}", kind, res_type),
        "temporary": true,
    })
}

/// Restores the scope's `credential`/`connection` roots on drop.
pub struct LateBindingGuard<'a> {
    scope: &'a mut Scope,
    saved_credentials: Option<Value>,
    saved_connections: Option<Value>,
}

impl<'a> LateBindingGuard<'a> {
    pub fn scope(&self) -> &Scope {
        self.scope
    }
}

impl<'a> Drop for LateBindingGuard<'a> {
    fn drop(&mut self) {
        match self.saved_credentials.take() {
            Some(value) => {
                self.scope.roots.insert("credential".to_string(), value);
            }
            None => {
                self.scope.roots.remove("credential");
            }
        }
        match self.saved_connections.take() {
            Some(value) => {
                self.scope.roots.insert("connection".to_string(), value);
            }
            None => {
                self.scope.roots.remove("connection");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_entry_creates_root() {
        let mut scope = Scope::new();
        scope.set_entry("param", "city", json!("Boston"));
        assert_eq!(scope.get("param").unwrap()["city"], json!("Boston"));
    }

    #[test]
    fn test_late_binding_guard_restores_on_drop() {
        let mut scope = Scope::new();
        scope.set("credential", json!({"existing": true}));
        {
            let guard = scope.late_binding(
                vec![("aws".to_string(), "dev".to_string())],
                Vec::new(),
            );
            let creds = guard.scope().get("credential").unwrap();
            assert_eq!(creds["aws"]["dev"]["temporary"], json!(true));
            assert_eq!(creds["aws"]["dev"]["resource_type"], json!("credential.aws"));
        }
        // previous root restored after the guard is gone
        assert_eq!(scope.get("credential").unwrap()["existing"], json!(true));
    }

    #[test]
    fn test_late_binding_guard_removes_added_root() {
        let mut scope = Scope::new();
        {
            let _guard = scope.late_binding(
                Vec::new(),
                vec![("slack".to_string(), "default".to_string())],
            );
        }
        assert!(scope.get("connection").is_none());
    }
}
