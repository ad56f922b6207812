//! Main jsonstor crate: an embeddable document store with Mongo-style queries.
//!
//! This crate is the primary entry point. It re-exports the core types and the
//! in-memory engine, and lets applications pick a persistence adapter by name
//! through the [`registry`].
//!
//! # Features
//!
//! - **Mongo-style criteria** - Comparison, membership, existence, regex and logical operators over dotted paths
//! - **Update operators** - `$set`, `$inc`, `$push`, `$pull` and friends, or whole-document replacement
//! - **Projections** - Inclusion or exclusion of fields in results
//! - **Pluggable persistence** - The collection lives in memory; adapters load and flush it
//!
//! # Quick Start
//!
//! ```ignore
//! use jsonstor::prelude::*;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> DocumentStoreResult<()> {
//!     let storage = AdapterRegistry::default()
//!         .open("json-file", StorageSettings::with_path("users.json"))
//!         .await?;
//!
//!     storage.insert_one(json!({ "name": "Alice", "age": 30, "tags": ["admin"] })).await?;
//!
//!     let admins = storage
//!         .find_many(json!({ "tags": "admin" }), json!({ "name": 1 }))
//!         .await?;
//!
//!     storage
//!         .update_many(json!({ "age": { "$lt": 40 } }), json!({ "$inc": { "age": 1 } }))
//!         .await?;
//!
//!     storage.shutdown().await
//! }
//! ```
//!
//! Criteria can also be built in code with [`query::Filter`]:
//!
//! ```ignore
//! let criteria = Filter::eq("name", "Alice").and(Filter::gte("age", 21));
//! let count = storage.count(criteria).await?;
//! ```
//!
//! # Adapters
//!
//! - [`memory`] - Keeps the collection in process memory
//! - [`file`] - Stores the collection as a JSON array in one file (requires the `file` feature, on by default)

pub mod prelude;
pub mod registry;

pub use jsonstor_core::{backend, config, document, error, projection, query, result, update};

/// The in-memory engine, storage and memory adapter.
pub mod memory {
    pub use jsonstor_memory::{
        DynStorage, EngineState, MemoryAdapter, MemoryAdapterBuilder, MemoryEngine, Storage,
        evaluator::matches, projector::project, updater::apply_update,
    };
}

/// JSON file persistence.
///
/// This module is only available when the `file` feature is enabled.
#[cfg(feature = "file")]
pub mod file {
    pub use jsonstor_file::{JsonFileAdapter, JsonFileAdapterBuilder, adapter::ADAPTER_NAME};
}
