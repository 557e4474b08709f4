//! Storage and search backend implementations.
//!
//! Each backend is gated behind a feature flag.
//!
//! # Available Backends
//!
//! | Backend | Feature | Role |
//! |---------|---------|------|
//! | SQLite | `sqlite` | Relational store of record |
//! | Elasticsearch | `elasticsearch` | Search index target |
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(feature = "sqlite")]
//! use codelist_persistence::backends::sqlite::SqliteBackend;
//!
//! # #[cfg(feature = "sqlite")]
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = SqliteBackend::in_memory()?;
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "elasticsearch")]
pub mod elasticsearch;
