//! Script references: a script name plus an optional namespace.

use std::fmt;

/// Identifies one loadable fixture script.
///
/// A script without a namespace merges its outputs directly into the
/// accumulated variables; a namespaced script's outputs are nested under the
/// namespace label.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Script {
    name: String,
    namespace: Option<String>,
}

impl Script {
    /// References a script without a namespace.
    pub fn script(name: impl Into<String>) -> Self {
        Self { name: name.into(), namespace: None }
    }

    /// References a script whose outputs are nested under `namespace`.
    pub fn with(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self { name: name.into(), namespace: Some(namespace.into()) }
    }

    /// Returns the script name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the namespace label. An empty label counts as no namespace.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref().filter(|ns| !ns.is_empty())
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.namespace() {
            Some(ns) => write!(f, "{} as {}", self.name, ns),
            None => write!(f, "{}", self.name),
        }
    }
}

impl From<&str> for Script {
    fn from(name: &str) -> Self {
        Script::script(name)
    }
}

impl From<String> for Script {
    fn from(name: String) -> Self {
        Script::script(name)
    }
}

impl From<&String> for Script {
    fn from(name: &String) -> Self {
        Script::script(name.as_str())
    }
}

impl From<&Script> for Script {
    fn from(script: &Script) -> Self {
        script.clone()
    }
}
