//! In-memory query engine and storage for jsonstor.
//!
//! Every collection lives entirely in memory; persistence adapters only move the
//! whole document array to and from a durable medium. This crate provides:
//!
//! - **Matching** ([`evaluator`]) - Evaluates criteria against documents
//! - **Updates** ([`updater`]) - Applies operator and replacement updates
//! - **Projection** ([`projector`]) - Shapes result documents
//! - **Engine** ([`engine`]) - The collection itself, with atomic mutations and dirty tracking
//! - **Storage** ([`storage`]) - An engine paired with an adapter, flushing after changes
//! - **Memory adapter** ([`adapter`]) - An adapter whose medium is process memory
//!
//! # Quick Start
//!
//! ```ignore
//! use jsonstor_core::config::StorageSettings;
//! use jsonstor_memory::{MemoryAdapter, Storage};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let storage = Storage::open(MemoryAdapter::new(), StorageSettings::default()).await?;
//!
//!     storage.insert_one(json!({ "name": "Alice", "age": 30 })).await?;
//!     let alice = storage.find_one(json!({ "name": "Alice" }), None).await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as jsonstor_memory;

pub mod adapter;
pub mod engine;
pub mod evaluator;
pub mod projector;
pub mod storage;
pub mod updater;

pub use adapter::{MemoryAdapter, MemoryAdapterBuilder};
pub use engine::{EngineState, MemoryEngine};
pub use storage::{DynStorage, Storage};
