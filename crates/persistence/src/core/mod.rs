//! Core storage traits and abstractions.
//!
//! - [`Backend`] - Engine abstraction (health, schema)
//! - [`RegistryRepository`], [`SchemeRepository`], [`CodeRepository`],
//!   [`ExtensionRepository`] - Record access
//! - [`ChangeSetWriter`] - Atomic multi-record writes
//! - [`CodeListStore`] - Everything the services need, in one bound
//!
//! # Example: Implementing a Store
//!
//! ```ignore
//! use async_trait::async_trait;
//! use codelist_persistence::core::{ChangeSet, ChangeSetWriter};
//! use codelist_persistence::error::StorageResult;
//!
//! struct MyStore;
//!
//! #[async_trait]
//! impl ChangeSetWriter for MyStore {
//!     async fn commit(&self, changes: &ChangeSet) -> StorageResult<()> {
//!         // begin; delete; save; commit
//!         todo!()
//!     }
//! }
//! ```

pub mod backend;
pub mod repository;

pub use backend::Backend;
pub use repository::{
    ChangeSet, ChangeSetWriter, CodeListStore, CodeRepository, ExtensionRepository,
    RegistryRepository, SchemeRepository,
};
