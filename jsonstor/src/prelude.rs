//! Convenient re-exports of commonly used types from jsonstor.
//!
//! ```ignore
//! use jsonstor::prelude::*;
//! ```
//!
//! This provides access to:
//! - Documents and identifiers
//! - Storage, the engine, and adapters
//! - Criteria, update, and projection construction
//! - Settings, results, and error types

pub use jsonstor_core::{
    backend::{PersistenceAdapter, DynPersistenceAdapter, PersistenceAdapterBuilder},
    config::StorageSettings,
    document::{Document, ID_FIELD},
    query::{Expr, Filter, FieldOp, FindOptions, IntoCriteria, QueryVisitor, Sort, SortDirection},
    update::{IntoUpdate, Update, UpdateOperator},
    projection::{IntoProjection, Projection},
    result::{DeleteResult, UpdateResult},
    error::{DocumentStoreError, DocumentStoreResult},
};
pub use jsonstor_memory::{DynStorage, EngineState, MemoryAdapter, MemoryEngine, Storage};

pub use crate::registry::AdapterRegistry;
