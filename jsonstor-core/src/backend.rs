//! Persistence adapter abstraction.
//!
//! The query engine keeps every document in memory. A persistence adapter moves that
//! document array between memory and a durable medium: it provides the initial
//! documents when a storage is opened, writes the current array back when asked to
//! flush, and removes the durable representation when the storage is dropped.
//!
//! # Traits
//!
//! - [`PersistenceAdapter`]: The core trait for adapters
//! - [`DynPersistenceAdapter`]: Object-safe mirror for dynamic dispatch
//! - [`PersistenceAdapterBuilder`]: Factory trait for creating adapter instances
//!
//! # Examples
//!
//! ```ignore
//! use jsonstor::backend::PersistenceAdapter;
//!
//! let adapter = MyAdapter::new();
//! let documents = adapter.load_initial().await?;
//! adapter.flush(&current_documents).await?;
//! ```

use async_trait::async_trait;
use serde_json::Value;
use std::{any::Any, fmt::Debug};

use crate::{document::Document, error::DocumentStoreResult};

/// Contract between the in-memory engine and a durable medium.
///
/// Implementations hold no documents themselves; the engine owns the collection
/// and hands adapters a snapshot on every flush.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` so storages can be shared across tasks.
#[async_trait]
pub trait PersistenceAdapter: Send + Sync + Debug {
    /// Short adapter name used in logs and the registry (e.g. `"json-file"`).
    fn name(&self) -> &str;

    /// Reads the initial document array.
    ///
    /// Called once when a storage is opened. A medium that does not exist yet
    /// yields an empty array. Documents without an identifier get one assigned
    /// by the engine.
    async fn load_initial(&self) -> DocumentStoreResult<Vec<Value>>;

    /// Writes the complete current document array to the medium.
    ///
    /// Must be idempotent: flushing the same array twice leaves the medium in the
    /// same state as flushing it once.
    async fn flush(&self, documents: &[Document]) -> DocumentStoreResult<()>;

    /// Removes the durable representation.
    ///
    /// Dropping a medium that does not exist is not an error.
    async fn drop_storage(&self) -> DocumentStoreResult<()>;

    /// Releases adapter resources.
    ///
    /// The default implementation is a no-op.
    async fn shutdown(self) -> DocumentStoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

#[async_trait]
pub trait DynPersistenceAdapter: Send + Sync + Debug {
    fn name(&self) -> &str;
    async fn load_initial(&self) -> DocumentStoreResult<Vec<Value>>;
    async fn flush(&self, documents: &[Document]) -> DocumentStoreResult<()>;
    async fn drop_storage(&self) -> DocumentStoreResult<()>;
    async fn shutdown_boxed(self: Box<Self>) -> DocumentStoreResult<()>;

    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

#[async_trait]
impl<A: PersistenceAdapter + 'static> DynPersistenceAdapter for A {
    fn name(&self) -> &str {
        PersistenceAdapter::name(self)
    }

    async fn load_initial(&self) -> DocumentStoreResult<Vec<Value>> {
        PersistenceAdapter::load_initial(self).await
    }

    async fn flush(&self, documents: &[Document]) -> DocumentStoreResult<()> {
        PersistenceAdapter::flush(self, documents).await
    }

    async fn drop_storage(&self) -> DocumentStoreResult<()> {
        PersistenceAdapter::drop_storage(self).await
    }

    async fn shutdown_boxed(self: Box<Self>) -> DocumentStoreResult<()> {
        PersistenceAdapter::shutdown(*self).await
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

#[async_trait]
impl PersistenceAdapter for Box<dyn DynPersistenceAdapter> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn load_initial(&self) -> DocumentStoreResult<Vec<Value>> {
        (**self).load_initial().await
    }

    async fn flush(&self, documents: &[Document]) -> DocumentStoreResult<()> {
        (**self).flush(documents).await
    }

    async fn drop_storage(&self) -> DocumentStoreResult<()> {
        (**self).drop_storage().await
    }

    async fn shutdown(self) -> DocumentStoreResult<()> {
        self.shutdown_boxed().await
    }
}

impl dyn DynPersistenceAdapter {
    /// Attempts to downcast to a concrete adapter type.
    pub fn downcast_ref<A: PersistenceAdapter + 'static>(&self) -> Option<&A> {
        self.as_any().downcast_ref::<A>()
    }
}

#[async_trait]
pub trait PersistenceAdapterBuilder {
    type Adapter: PersistenceAdapter;

    async fn build(self) -> DocumentStoreResult<Self::Adapter>;
}
