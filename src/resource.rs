//! Script resource loading.
//!
//! The executor resolves a script name (optionally under the configured
//! script directory) to a location and asks a [`ResourceLoader`] for its
//! text. Failures surface as [`Error::Io`].

use crate::{Error, Result};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

/// Source of script text.
pub trait ResourceLoader: Send + Sync {
    /// Reads the script stored at `location`.
    fn load(&self, location: &Path) -> Result<String>;
}

/// Reads scripts from the filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileResourceLoader;

impl ResourceLoader for FileResourceLoader {
    fn load(&self, location: &Path) -> Result<String> {
        std::fs::read_to_string(location).map_err(|e| {
            Error::from(io::Error::new(
                e.kind(),
                format!("cannot read script {}: {}", location.display(), e),
            ))
        })
    }
}

/// Serves scripts from memory, keyed by location.
#[derive(Debug, Clone, Default)]
pub struct MemoryResourceLoader {
    scripts: HashMap<PathBuf, String>,
}

impl MemoryResourceLoader {
    /// Creates an empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a script.
    pub fn insert(&mut self, location: impl Into<PathBuf>, body: impl Into<String>) {
        self.scripts.insert(location.into(), body.into());
    }

    /// Builder-style variant of [`insert`](Self::insert).
    pub fn with_script(mut self, location: impl Into<PathBuf>, body: impl Into<String>) -> Self {
        self.insert(location, body);
        self
    }
}

impl ResourceLoader for MemoryResourceLoader {
    fn load(&self, location: &Path) -> Result<String> {
        self.scripts.get(location).cloned().ok_or_else(|| {
            Error::from(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no script at {}", location.display()),
            ))
        })
    }
}
