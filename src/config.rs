//! Configuration options for the fixture loader.

use crate::value::{Value, Variables};
use std::path::{Path, PathBuf};

/// Configuration options for a [`ScriptExecutor`](crate::ScriptExecutor).
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    /// Directory script names are resolved against.
    /// Default: None (names are used as given)
    pub script_directory: Option<PathBuf>,

    /// Variables visible to every script of every batch.
    /// Default: empty
    pub inputs: Variables,

    /// Maximum nesting of `load()` calls made from scripts.
    /// Default: 32
    pub max_load_depth: usize,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self { script_directory: None, inputs: Variables::new(), max_load_depth: 32 }
    }
}

impl LoaderOptions {
    /// Creates a new LoaderOptions with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the directory script names are resolved against.
    ///
    /// # Example
    ///
    /// ```
    /// use fixture_loader::LoaderOptions;
    /// use std::path::Path;
    ///
    /// let opts = LoaderOptions::new().script_directory("fixtures");
    /// assert_eq!(opts.resolve("users.lua"), Path::new("fixtures/users.lua"));
    /// ```
    pub fn script_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.script_directory = Some(dir.into());
        self
    }

    /// Adds a single input variable.
    ///
    /// # Arguments
    ///
    /// * `name` - Global name the value is bound to in every script
    /// * `value` - The value, converted into a [`Value`]
    ///
    /// # Example
    ///
    /// ```
    /// use fixture_loader::{LoaderOptions, Value};
    ///
    /// let opts = LoaderOptions::new().input("env", "test").input("seed", 42);
    /// assert_eq!(opts.inputs["env"], Value::from("test"));
    /// assert_eq!(opts.inputs["seed"], Value::Integer(42));
    /// ```
    pub fn input(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inputs.insert(name.into(), value.into());
        self
    }

    /// Replaces all input variables.
    pub fn inputs(mut self, inputs: Variables) -> Self {
        self.inputs = inputs;
        self
    }

    /// Sets the maximum nesting of script-initiated loads.
    ///
    /// Must be greater than zero; see [`validate`](Self::validate).
    pub fn max_load_depth(mut self, depth: usize) -> Self {
        self.max_load_depth = depth;
        self
    }

    /// Resolves a script name to the location handed to the resource loader.
    pub fn resolve(&self, name: &str) -> PathBuf {
        match &self.script_directory {
            Some(dir) => dir.join(name),
            None => Path::new(name).to_path_buf(),
        }
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_load_depth == 0 {
            return Err(crate::Error::invalid_argument("max_load_depth must be > 0"));
        }
        if let Some(dir) = &self.script_directory {
            if dir.as_os_str().is_empty() {
                return Err(crate::Error::invalid_argument("script_directory must not be empty"));
            }
        }
        if self.inputs.keys().any(|name| name.is_empty()) {
            return Err(crate::Error::invalid_argument("input names must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = LoaderOptions::default();
        assert!(opts.script_directory.is_none());
        assert!(opts.inputs.is_empty());
        assert_eq!(opts.max_load_depth, 32);
    }

    #[test]
    fn test_options_builder() {
        let opts = LoaderOptions::new()
            .script_directory("fixtures")
            .input("env", "test")
            .max_load_depth(4);

        assert_eq!(opts.script_directory, Some(PathBuf::from("fixtures")));
        assert_eq!(opts.inputs["env"], Value::from("test"));
        assert_eq!(opts.max_load_depth, 4);
    }

    #[test]
    fn test_resolve() {
        assert_eq!(LoaderOptions::new().resolve("a.lua"), PathBuf::from("a.lua"));
        assert_eq!(
            LoaderOptions::new().script_directory("seed").resolve("a.lua"),
            Path::new("seed").join("a.lua")
        );
    }

    #[test]
    fn test_options_validation() {
        let mut opts = LoaderOptions::default();
        assert!(opts.validate().is_ok());

        opts.max_load_depth = 0;
        assert!(opts.validate().is_err());

        opts.max_load_depth = 8;
        opts.script_directory = Some(PathBuf::new());
        assert!(opts.validate().is_err());

        opts.script_directory = None;
        opts.inputs.insert(String::new(), Value::Nil);
        assert!(opts.validate().is_err());
    }
}
