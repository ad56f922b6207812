//! Storage: an engine paired with a persistence adapter.
//!
//! This module provides the primary API of the document store:
//!
//! - [`Storage`] - Typed storage bound to a specific adapter implementation
//! - [`DynStorage`] - Storage over a boxed adapter, for runtime adapter selection
//!
//! A storage loads the adapter's documents once when opened, serves every
//! operation from memory, and writes the full collection back through the
//! adapter after each mutation that changed something (when auto-flush is on)
//! or on an explicit [`Storage::flush`].
//!
//! # Example
//!
//! ```ignore
//! use jsonstor_memory::{MemoryAdapter, Storage};
//! use jsonstor_core::config::StorageSettings;
//!
//! let storage = Storage::open(MemoryAdapter::new(), StorageSettings::default()).await?;
//! storage.insert_one(json!({ "name": "Alice", "age": 30 })).await?;
//! let result = storage.update_many(json!({}), json!({ "$inc": { "age": 1 } })).await?;
//! ```

use mea::rwlock::RwLock;
use serde_json::Value;
use tracing::{debug, error};

use jsonstor_core::{
    backend::{DynPersistenceAdapter, PersistenceAdapter},
    config::StorageSettings,
    document::Document,
    error::DocumentStoreResult,
    projection::IntoProjection,
    query::{FindOptions, IntoCriteria},
    result::{DeleteResult, UpdateResult},
    update::IntoUpdate,
};

use crate::engine::MemoryEngine;

/// Storage over a boxed adapter chosen at runtime.
pub type DynStorage = Storage<Box<dyn DynPersistenceAdapter>>;

/// A document collection bound to a persistence adapter.
///
/// Operations are serialized through an async read-write lock: reads run
/// concurrently, mutations (and the flush that follows them) run one at a time.
///
/// # Type Parameters
///
/// * `A` - The persistence adapter implementation type
#[derive(Debug)]
pub struct Storage<A: PersistenceAdapter> {
    engine: RwLock<MemoryEngine>,
    adapter: A,
    settings: StorageSettings,
}

impl<A: PersistenceAdapter> Storage<A> {
    /// Opens a storage, loading the adapter's initial documents.
    ///
    /// # Arguments
    ///
    /// * `adapter` - The adapter providing and persisting the documents
    /// * `settings` - Storage settings; only `auto_flush` is read here
    ///
    /// # Errors
    ///
    /// Returns the adapter's error if loading fails, or an engine error if the
    /// loaded documents are invalid or share an identifier.
    pub async fn open(adapter: A, settings: StorageSettings) -> DocumentStoreResult<Self> {
        let initial = adapter.load_initial().await?;
        let mut engine = MemoryEngine::new();
        let count = engine.load(initial)?;

        debug!(adapter = adapter.name(), count, auto_flush = settings.auto_flush, "opened storage");

        Ok(Self {
            engine: RwLock::new(engine),
            adapter,
            settings,
        })
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn settings(&self) -> &StorageSettings {
        &self.settings
    }

    /// Number of stored documents.
    pub async fn len(&self) -> usize {
        self.engine.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.engine.read().await.is_empty()
    }

    /// Whether there are changes that have not been flushed.
    pub async fn is_dirty(&self) -> bool {
        self.engine.read().await.is_dirty()
    }

    /// A copy of every stored document in collection order.
    pub async fn documents(&self) -> Vec<Document> {
        self.engine.read().await.documents()
    }

    /// Counts documents matching `criteria`.
    pub async fn count(&self, criteria: impl IntoCriteria) -> DocumentStoreResult<usize> {
        let criteria = criteria.into_criteria()?;
        self.engine.read().await.count(criteria)
    }

    /// Inserts a document, returning it with its identifier.
    ///
    /// # Errors
    ///
    /// Engine errors, or the adapter's error if the automatic flush fails. In the
    /// latter case the document stays inserted and the storage stays dirty.
    pub async fn insert_one(&self, document: Value) -> DocumentStoreResult<Document> {
        let mut engine = self.engine.write().await;
        let inserted = engine.insert_one(document)?;
        self.auto_flush(&mut engine).await?;

        Ok(inserted)
    }

    /// Inserts all documents or none.
    pub async fn insert_many(&self, documents: Vec<Value>) -> DocumentStoreResult<Vec<Document>> {
        let mut engine = self.engine.write().await;
        let inserted = engine.insert_many(documents)?;
        self.auto_flush(&mut engine).await?;

        Ok(inserted)
    }

    /// Returns the first matching document, projected.
    pub async fn find_one(
        &self,
        criteria: impl IntoCriteria,
        projection: impl IntoProjection,
    ) -> DocumentStoreResult<Option<Document>> {
        let criteria = criteria.into_criteria()?;
        let projection = projection.into_projection()?;
        self.engine.read().await.find_one(criteria, projection)
    }

    /// Returns every matching document, projected.
    pub async fn find_many(
        &self,
        criteria: impl IntoCriteria,
        projection: impl IntoProjection,
    ) -> DocumentStoreResult<Vec<Document>> {
        let criteria = criteria.into_criteria()?;
        let projection = projection.into_projection()?;
        self.engine.read().await.find_many(criteria, projection)
    }

    /// Returns matching documents sorted and windowed by `options`, projected.
    pub async fn find_many_with(
        &self,
        criteria: impl IntoCriteria,
        projection: impl IntoProjection,
        options: &FindOptions,
    ) -> DocumentStoreResult<Vec<Document>> {
        let criteria = criteria.into_criteria()?;
        let projection = projection.into_projection()?;
        self.engine.read().await.find_many_with(criteria, projection, options)
    }

    /// Updates the first matching document.
    pub async fn update_one(
        &self,
        criteria: impl IntoCriteria,
        update: impl IntoUpdate,
    ) -> DocumentStoreResult<UpdateResult> {
        let criteria = criteria.into_criteria()?;
        let update = update.into_update()?;

        let mut engine = self.engine.write().await;
        let result = engine.update_one(criteria, update)?;
        self.auto_flush(&mut engine).await?;

        Ok(result)
    }

    /// Updates every matching document.
    pub async fn update_many(
        &self,
        criteria: impl IntoCriteria,
        update: impl IntoUpdate,
    ) -> DocumentStoreResult<UpdateResult> {
        let criteria = criteria.into_criteria()?;
        let update = update.into_update()?;

        let mut engine = self.engine.write().await;
        let result = engine.update_many(criteria, update)?;
        self.auto_flush(&mut engine).await?;

        Ok(result)
    }

    /// Replaces the first matching document, keeping its identifier.
    pub async fn replace_one(
        &self,
        criteria: impl IntoCriteria,
        replacement: Value,
    ) -> DocumentStoreResult<UpdateResult> {
        let criteria = criteria.into_criteria()?;

        let mut engine = self.engine.write().await;
        let result = engine.replace_one(criteria, replacement)?;
        self.auto_flush(&mut engine).await?;

        Ok(result)
    }

    /// Deletes the first matching document.
    pub async fn delete_one(&self, criteria: impl IntoCriteria) -> DocumentStoreResult<DeleteResult> {
        let criteria = criteria.into_criteria()?;

        let mut engine = self.engine.write().await;
        let result = engine.delete_one(criteria)?;
        self.auto_flush(&mut engine).await?;

        Ok(result)
    }

    /// Deletes every matching document.
    pub async fn delete_many(&self, criteria: impl IntoCriteria) -> DocumentStoreResult<DeleteResult> {
        let criteria = criteria.into_criteria()?;

        let mut engine = self.engine.write().await;
        let result = engine.delete_many(criteria)?;
        self.auto_flush(&mut engine).await?;

        Ok(result)
    }

    /// Writes the current collection through the adapter, whether or not it is dirty.
    ///
    /// # Errors
    ///
    /// Returns the adapter's error; the storage then stays dirty.
    pub async fn flush(&self) -> DocumentStoreResult<()> {
        let mut engine = self.engine.write().await;
        self.flush_engine(&mut engine).await
    }

    /// Removes every document and the adapter's durable representation.
    ///
    /// The storage stays usable afterwards, holding an empty collection.
    pub async fn drop_storage(&self) -> DocumentStoreResult<()> {
        let mut engine = self.engine.write().await;
        let count = engine.drop_documents();

        self.adapter.drop_storage().await.inspect_err(|e| {
            error!(adapter = self.adapter.name(), error = %e, "failed to drop storage");
        })?;
        engine.clear_dirty();

        debug!(adapter = self.adapter.name(), count, "dropped storage");

        Ok(())
    }

    /// Flushes pending changes and releases the adapter.
    pub async fn shutdown(self) -> DocumentStoreResult<()> {
        {
            let mut engine = self.engine.write().await;
            if engine.is_dirty() {
                self.flush_engine(&mut engine).await?;
            }
        }

        debug!(adapter = self.adapter.name(), "shutting down storage");

        self.adapter.shutdown().await
    }

    async fn auto_flush(&self, engine: &mut MemoryEngine) -> DocumentStoreResult<()> {
        if self.settings.auto_flush && engine.is_dirty() {
            self.flush_engine(engine).await?;
        }

        Ok(())
    }

    async fn flush_engine(&self, engine: &mut MemoryEngine) -> DocumentStoreResult<()> {
        let documents = engine.documents();

        self.adapter.flush(&documents).await.inspect_err(|e| {
            error!(adapter = self.adapter.name(), error = %e, "flush failed; changes remain pending");
        })?;
        engine.clear_dirty();

        debug!(adapter = self.adapter.name(), count = documents.len(), "flushed storage");

        Ok(())
    }
}
