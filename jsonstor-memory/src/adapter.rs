//! A persistence adapter whose durable medium is process memory.

use async_trait::async_trait;
use mea::rwlock::RwLock;
use serde_json::Value;
use std::sync::Arc;
use tracing::trace;

use jsonstor_core::{
    backend::{PersistenceAdapter, PersistenceAdapterBuilder},
    document::Document,
    error::DocumentStoreResult,
};

/// Keeps the last flushed snapshot in memory.
///
/// Useful for tests and for collections that only need to live as long as the
/// process. Clones share the same snapshot, so a storage reopened with a clone
/// sees what the previous one flushed.
///
/// # Example
///
/// ```ignore
/// use jsonstor_memory::{MemoryAdapter, Storage};
/// use jsonstor_core::config::StorageSettings;
///
/// let adapter = MemoryAdapter::new();
/// let storage = Storage::open(adapter.clone(), StorageSettings::default()).await?;
/// storage.insert_one(json!({ "name": "Alice" })).await?;
/// assert_eq!(adapter.snapshot().await.len(), 1);
/// ```
#[derive(Default, Clone, Debug)]
pub struct MemoryAdapter {
    snapshot: Arc<RwLock<Vec<Document>>>,
}

impl MemoryAdapter {
    /// Creates an adapter with nothing stored.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an adapter whose medium already holds `documents`.
    pub fn with_documents(documents: Vec<Document>) -> Self {
        Self {
            snapshot: Arc::new(RwLock::new(documents)),
        }
    }

    pub fn builder() -> MemoryAdapterBuilder {
        MemoryAdapterBuilder::default()
    }

    /// The documents written by the most recent flush.
    pub async fn snapshot(&self) -> Vec<Document> {
        self.snapshot.read().await.clone()
    }
}

#[async_trait]
impl PersistenceAdapter for MemoryAdapter {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load_initial(&self) -> DocumentStoreResult<Vec<Value>> {
        Ok(
            self.snapshot
                .read()
                .await
                .iter()
                .cloned()
                .map(Value::Object)
                .collect()
        )
    }

    async fn flush(&self, documents: &[Document]) -> DocumentStoreResult<()> {
        trace!(count = documents.len(), "flushing to memory");
        *self.snapshot.write().await = documents.to_vec();

        Ok(())
    }

    async fn drop_storage(&self) -> DocumentStoreResult<()> {
        self.snapshot.write().await.clear();

        Ok(())
    }
}

/// Builder for [`MemoryAdapter`].
#[derive(Default)]
pub struct MemoryAdapterBuilder {
    documents: Vec<Document>,
}

impl MemoryAdapterBuilder {
    /// Seeds the medium with documents, as if they had been flushed earlier.
    pub fn documents(mut self, documents: Vec<Document>) -> Self {
        self.documents = documents;
        self
    }
}

#[async_trait]
impl PersistenceAdapterBuilder for MemoryAdapterBuilder {
    type Adapter = MemoryAdapter;

    async fn build(self) -> DocumentStoreResult<Self::Adapter> {
        Ok(MemoryAdapter::with_documents(self.documents))
    }
}
