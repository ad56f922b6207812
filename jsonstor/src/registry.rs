//! Runtime selection of persistence adapters by name.
//!
//! A registry maps adapter names to factories that build an adapter from
//! [`StorageSettings`]. [`AdapterRegistry::default`] knows the built-in
//! adapters; applications can register their own alongside them.
//!
//! # Example
//!
//! ```ignore
//! use jsonstor::{config::StorageSettings, registry::AdapterRegistry};
//!
//! let registry = AdapterRegistry::default();
//! let storage = registry.open("json-file", StorageSettings::with_path("users.json")).await?;
//! storage.insert_one(json!({ "name": "Alice" })).await?;
//! ```

use std::{collections::BTreeMap, fmt, sync::Arc};
use tracing::debug;

use jsonstor_core::{
    backend::DynPersistenceAdapter,
    config::StorageSettings,
    error::{DocumentStoreError, DocumentStoreResult},
};
use jsonstor_memory::{DynStorage, MemoryAdapter, Storage};

/// Builds a boxed adapter from settings.
pub type AdapterFactory =
    Arc<dyn Fn(&StorageSettings) -> DocumentStoreResult<Box<dyn DynPersistenceAdapter>> + Send + Sync>;

#[derive(Clone)]
struct AdapterEntry {
    description: String,
    factory: AdapterFactory,
}

/// Named adapter factories.
#[derive(Clone)]
pub struct AdapterRegistry {
    adapters: BTreeMap<String, AdapterEntry>,
}

impl AdapterRegistry {
    /// Creates a registry with no adapters.
    pub fn empty() -> Self {
        Self {
            adapters: BTreeMap::new(),
        }
    }

    /// Registers a factory under `name`, replacing any previous registration.
    ///
    /// # Arguments
    ///
    /// * `name` - The name used to select the adapter
    /// * `description` - A short human-readable description
    /// * `factory` - Builds the adapter from storage settings
    pub fn register<F>(&mut self, name: impl Into<String>, description: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&StorageSettings) -> DocumentStoreResult<Box<dyn DynPersistenceAdapter>> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(adapter = %name, "registering adapter");

        self.adapters.insert(
            name,
            AdapterEntry {
                description: description.into(),
                factory: Arc::new(factory),
            },
        );
        self
    }

    /// Registered adapter names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.adapters.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.adapters.contains_key(name)
    }

    /// The description an adapter was registered with.
    pub fn description(&self, name: &str) -> Option<&str> {
        self.adapters.get(name).map(|entry| entry.description.as_str())
    }

    /// Builds the named adapter.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Initialization`] for unknown names, or the
    /// factory's error.
    pub fn create(&self, name: &str, settings: &StorageSettings) -> DocumentStoreResult<Box<dyn DynPersistenceAdapter>> {
        let entry = self.adapters.get(name).ok_or_else(|| {
            DocumentStoreError::Initialization(format!(
                "unknown adapter '{name}' (available: {})",
                self.names().join(", ")
            ))
        })?;

        (entry.factory)(settings)
    }

    /// Builds the named adapter and opens a storage over it.
    ///
    /// # Errors
    ///
    /// Errors from [`create`](Self::create) and from [`Storage::open`].
    pub async fn open(&self, name: &str, settings: StorageSettings) -> DocumentStoreResult<DynStorage> {
        let adapter = self.create(name, &settings)?;
        Storage::open(adapter, settings).await
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();

        registry.register("memory", "Keeps documents in process memory", |_| {
            Ok(Box::new(MemoryAdapter::new()) as Box<dyn DynPersistenceAdapter>)
        });

        #[cfg(feature = "file")]
        registry.register(
            jsonstor_file::adapter::ADAPTER_NAME,
            "Stores documents as a JSON array in a single file",
            |settings| {
                Ok(Box::new(jsonstor_file::JsonFileAdapter::from_settings(settings)?) as Box<dyn DynPersistenceAdapter>)
            },
        );

        registry
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("adapters", &self.names())
            .finish()
    }
}
