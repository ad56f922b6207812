//! JSON file persistence for jsonstor.
//!
//! [`JsonFileAdapter`] keeps a collection in a single file holding a JSON array
//! of objects. The whole array is read when a storage opens and rewritten on
//! every flush.
//!
//! # Example
//!
//! ```ignore
//! use jsonstor_core::config::StorageSettings;
//! use jsonstor_file::JsonFileAdapter;
//! use jsonstor_memory::Storage;
//!
//! let settings = StorageSettings::with_path("data/users.json");
//! let adapter = JsonFileAdapter::from_settings(&settings)?;
//! let storage = Storage::open(adapter, settings).await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as jsonstor_file;

pub mod adapter;

pub use adapter::{JsonFileAdapter, JsonFileAdapterBuilder};
