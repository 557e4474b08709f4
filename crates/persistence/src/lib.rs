//! Code List Persistence Layer
//!
//! This crate stores code registries, versioned code schemes, their codes and
//! extensions, keeps broader-code hierarchies consistent, and projects every
//! committed change into a search index.
//!
//! # Features
//!
//! - **Hierarchy integrity**: cycle, depth and cross-scheme checks with
//!   derived hierarchy levels
//! - **Order sequencing**: explicit orders with shifting, appended orders otherwise
//! - **Atomic batches**: a batch is validated as a whole and committed as one change set
//! - **Search index sync**: full rebuilds with paged, chunked bulk writes, plus
//!   best-effort post-commit synchronization
//!
//! # Backend Features
//!
//! Enable backends with feature flags in `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! codelist-persistence = { version = "0.1", features = ["sqlite", "elasticsearch"] }
//! ```
//!
//! - `sqlite` (default) - SQLite relational store with in-memory and file modes
//! - `elasticsearch` - Elasticsearch index client
//!
//! # Architecture
//!
//! - [`model`] - Registries, schemes, codes, extensions, members and upsert payloads
//! - [`error`] - Error types for all operations
//! - [`hierarchy`] - Broader-code graph validation and level derivation
//! - [`order`] - Order assignment within a scheme or extension
//! - [`core`] - Backend and repository traits
//! - [`search`] - Index documents, index clients and the reindex orchestrator
//! - [`service`] - Mutation services tying validation, persistence and sync together
//! - [`backends`] - SQLite and Elasticsearch implementations
//!
//! # Quick Start
//!
//! ```
//! use codelist_persistence::order::OrderSequencer;
//!
//! let mut orders = OrderSequencer::from_existing([("a", 1), ("b", 2)]);
//!
//! // Requesting a taken order moves its holder to the end
//! let assignment = orders.assign("c", Some(1)).unwrap();
//! assert_eq!(assignment.order, 1);
//! assert_eq!(assignment.shifted, Some(("a", 3)));
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backends;
pub mod core;
pub mod error;
pub mod hierarchy;
pub mod model;
pub mod order;
pub mod search;
pub mod service;

// Re-export commonly used types at crate root
pub use error::{StorageError, StorageResult};
pub use model::{Code, CodeRegistry, CodeScheme, Extension, Member, Status};

// Re-export core traits
pub use core::{Backend, ChangeSet, ChangeSetWriter, CodeListStore};

// Re-export services
pub use service::{
    AuthorizationPolicy, CodeListService, MutationResult, ReadOnly, RegistryEditor, ServiceConfig,
    Superuser,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
