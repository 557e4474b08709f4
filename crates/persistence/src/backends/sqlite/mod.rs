//! SQLite backend implementation.
//!
//! This module implements every repository trait, the atomic change set
//! writer and the reindex [`DocumentSource`](crate::search::DocumentSource)
//! on top of SQLite. It supports both in-memory databases (used by the test
//! suites) and file-based databases.
//!
//! # Example
//!
//! ```no_run
//! use codelist_persistence::backends::sqlite::SqliteBackend;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // In-memory databases come with the schema initialized
//! let backend = SqliteBackend::in_memory()?;
//!
//! // File databases initialize on demand
//! let backend = SqliteBackend::open("./data/codelist.db")?;
//! backend.init_schema()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Schema
//!
//! Each entity table carries its lookup columns next to the full record as
//! JSON:
//!
//! ```sql
//! CREATE TABLE codes (
//!     id TEXT PRIMARY KEY,
//!     scheme_id TEXT NOT NULL REFERENCES schemes(id) ON DELETE CASCADE,
//!     code_key TEXT NOT NULL,          -- lowercased code value
//!     broader_code_id TEXT,
//!     sort_order INTEGER NOT NULL,
//!     data TEXT NOT NULL,              -- JSON record
//!     UNIQUE (scheme_id, code_key)
//! );
//! ```

mod backend;
mod schema;
mod storage;

pub use backend::{SqliteBackend, SqliteBackendConfig};
pub use schema::SCHEMA_VERSION;
