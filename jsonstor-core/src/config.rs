//! Storage settings shared by every persistence adapter.
//!
//! Settings can be built in code or deserialized from JSON. Missing keys take
//! their defaults, so `{}` is a valid settings object.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Settings for a storage instance and its adapter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "snake_case")]
pub struct StorageSettings {
    /// Flush to the adapter after every mutating call that changed the collection.
    pub auto_flush: bool,
    /// Location of the durable representation, for adapters that need one.
    pub path: Option<PathBuf>,
    /// Write human-readable output, for adapters that produce text.
    pub pretty: bool,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            auto_flush: true,
            path: None,
            pretty: true,
        }
    }
}

impl StorageSettings {
    /// Settings for the given path with every other option at its default.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Sets the auto-flush flag.
    pub fn auto_flush(mut self, auto_flush: bool) -> Self {
        self.auto_flush = auto_flush;
        self
    }

    /// Sets the pretty-printing flag.
    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// Reads settings from a JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Initialization`] if the value does not describe
    /// valid settings.
    pub fn from_value(value: Value) -> DocumentStoreResult<Self> {
        serde_json::from_value(value)
            .map_err(|e| DocumentStoreError::Initialization(format!("invalid settings: {e}")))
    }

    /// Returns the configured path or an initialization error naming the adapter.
    pub fn require_path(&self, adapter: &str) -> DocumentStoreResult<&PathBuf> {
        self.path.as_ref().ok_or_else(|| {
            DocumentStoreError::Initialization(format!("the {adapter} adapter requires a path setting"))
        })
    }
}
