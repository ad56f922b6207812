//! The JSON file adapter.

use async_trait::async_trait;
use serde_json::Value;
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::fs as tokio_fs;
use tracing::{debug, error, trace};

use jsonstor_core::{
    backend::{PersistenceAdapter, PersistenceAdapterBuilder},
    config::StorageSettings,
    document::{Document, type_name},
    error::{DocumentStoreError, DocumentStoreResult},
};

/// Name under which the adapter is registered.
pub const ADAPTER_NAME: &str = "json-file";

/// Persists a collection as a JSON array in a single file.
///
/// - A missing file loads as an empty collection.
/// - Flushing writes to a sibling temporary file and renames it over the
///   target, so readers never observe a half-written array.
/// - Parent directories are created on the first flush.
#[derive(Debug, Clone)]
pub struct JsonFileAdapter {
    path: PathBuf,
    pretty: bool,
}

impl JsonFileAdapter {
    /// Creates an adapter for `path` with pretty output.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pretty: true,
        }
    }

    pub fn builder(path: impl Into<PathBuf>) -> JsonFileAdapterBuilder {
        JsonFileAdapterBuilder::new(path)
    }

    /// Creates an adapter from storage settings.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Initialization`] if `settings.path` is not set.
    pub fn from_settings(settings: &StorageSettings) -> DocumentStoreResult<Self> {
        let path = settings.require_path(ADAPTER_NAME)?;

        Ok(Self {
            path: path.clone(),
            pretty: settings.pretty,
        })
    }

    /// The file backing this adapter.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn parse(&self, content: &str) -> DocumentStoreResult<Vec<Value>> {
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let parsed: Value = serde_json::from_str(content).inspect_err(|e| {
            error!("Failed to parse JSON in {:?}: {}", self.path, e);
        })?;

        let items = match parsed {
            Value::Array(items) => items,
            other => {
                return Err(DocumentStoreError::Serialization(format!(
                    "{:?} must hold an array of documents, found {}",
                    self.path,
                    type_name(&other)
                )));
            }
        };

        if let Some((index, item)) = items.iter().enumerate().find(|(_, item)| !item.is_object()) {
            return Err(DocumentStoreError::Serialization(format!(
                "entry {index} of {:?} is {}, not a document",
                self.path,
                type_name(item)
            )));
        }

        Ok(items)
    }
}

#[async_trait]
impl PersistenceAdapter for JsonFileAdapter {
    fn name(&self) -> &str {
        ADAPTER_NAME
    }

    async fn load_initial(&self) -> DocumentStoreResult<Vec<Value>> {
        trace!("Loading documents from {:?}", self.path);

        match tokio_fs::read_to_string(&self.path).await {
            Ok(content) => {
                let documents = self.parse(&content)?;
                debug!("Loaded {} documents from {:?}", documents.len(), self.path);
                Ok(documents)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("{:?} does not exist yet, starting empty", self.path);
                Ok(Vec::new())
            }
            Err(e) => {
                error!("IO error reading {:?}: {}", self.path, e);
                Err(e.into())
            }
        }
    }

    async fn flush(&self, documents: &[Document]) -> DocumentStoreResult<()> {
        let json = if self.pretty {
            serde_json::to_string_pretty(documents)
        } else {
            serde_json::to_string(documents)
        }
        .inspect_err(|e| error!("Failed to serialize documents for {:?}: {}", self.path, e))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio_fs::create_dir_all(parent).await.inspect_err(|e| {
                error!("Failed to create directory {:?}: {}", parent, e);
            })?;
        }

        let temp_path = self.temp_path();
        tokio_fs::write(&temp_path, json).await.inspect_err(|e| {
            error!("Failed to write {:?}: {}", temp_path, e);
        })?;
        tokio_fs::rename(&temp_path, &self.path).await.inspect_err(|e| {
            error!("Failed to move {:?} to {:?}: {}", temp_path, self.path, e);
        })?;

        debug!("Flushed {} documents to {:?}", documents.len(), self.path);

        Ok(())
    }

    async fn drop_storage(&self) -> DocumentStoreResult<()> {
        match tokio_fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!("Removed {:?}", self.path);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => {
                error!("Failed to remove {:?}: {}", self.path, e);
                Err(e.into())
            }
        }
    }
}

/// Builder for [`JsonFileAdapter`].
///
/// # Example
///
/// ```ignore
/// use jsonstor_file::JsonFileAdapter;
/// use jsonstor_core::backend::PersistenceAdapterBuilder;
///
/// let adapter = JsonFileAdapter::builder("users.json").pretty(false).build().await?;
/// ```
pub struct JsonFileAdapterBuilder {
    path: PathBuf,
    pretty: bool,
}

impl JsonFileAdapterBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pretty: true,
        }
    }

    /// Whether flushed files are indented.
    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }
}

#[async_trait]
impl PersistenceAdapterBuilder for JsonFileAdapterBuilder {
    type Adapter = JsonFileAdapter;

    async fn build(self) -> DocumentStoreResult<Self::Adapter> {
        if self.path.as_os_str().is_empty() {
            return Err(DocumentStoreError::Initialization(format!(
                "the {ADAPTER_NAME} adapter requires a non-empty path"
            )));
        }

        Ok(JsonFileAdapter {
            path: self.path,
            pretty: self.pretty,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_path_is_a_sibling() {
        let adapter = JsonFileAdapter::new("/data/users.json");
        assert_eq!(adapter.temp_path(), PathBuf::from("/data/users.json.tmp"));
    }

    #[test]
    fn test_from_settings_requires_path() {
        let err = JsonFileAdapter::from_settings(&StorageSettings::default()).unwrap_err();
        assert!(matches!(err, DocumentStoreError::Initialization(_)));

        let adapter = JsonFileAdapter::from_settings(&StorageSettings::with_path("x.json").pretty(false)).unwrap();
        assert_eq!(adapter.path(), Path::new("x.json"));
        assert!(!adapter.pretty);
    }

    #[test]
    fn test_parse_rejects_non_arrays() {
        let adapter = JsonFileAdapter::new("x.json");
        assert!(matches!(adapter.parse("{\"a\": 1}"), Err(DocumentStoreError::Serialization(_))));
        assert!(matches!(adapter.parse("[1, 2]"), Err(DocumentStoreError::Serialization(_))));
        assert!(matches!(adapter.parse("[{\"a\": 1"), Err(DocumentStoreError::Serialization(_))));
        assert_eq!(adapter.parse("  ").unwrap(), Vec::<Value>::new());
        assert_eq!(adapter.parse("[{\"a\": 1}]").unwrap().len(), 1);
    }
}
