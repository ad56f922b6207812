//! Core types for the jsonstor document store.
//!
//! This crate defines the vocabulary shared by the engine and every persistence adapter:
//!
//! - **Documents** ([`document`]) - JSON object documents, identifiers, and dotted-path access
//! - **Criteria** ([`query`]) - Mongo-style criteria parsing, the [`query::Filter`] builder, and the evaluation visitor
//! - **Updates** ([`update`]) - Operator and replacement update specifications
//! - **Projections** ([`projection`]) - Inclusion and exclusion projections
//! - **Results** ([`result`]) - Matched/modified/deleted counts
//! - **Settings** ([`config`]) - Storage and adapter configuration
//! - **Persistence adapters** ([`backend`]) - The load/flush/drop contract
//! - **Error handling** ([`error`]) - The crate-wide error and result types
//!
//! # Example
//!
//! ```ignore
//! use jsonstor_core::query::Expr;
//! use serde_json::json;
//!
//! let criteria = Expr::parse(&json!({ "age": { "$gte": 21 } }))?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as jsonstor_core;

pub mod backend;
pub mod config;
pub mod document;
pub mod error;
pub mod projection;
pub mod query;
pub mod result;
pub mod update;
