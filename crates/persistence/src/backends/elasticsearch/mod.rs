//! Elasticsearch backend implementation.
//!
//! Implements [`SearchIndexClient`](crate::search::SearchIndexClient) over the
//! Elasticsearch REST API: index create/delete/exists, mappings, `_bulk`
//! writes and deletes, delete-by-query and refresh.
//!
//! # Index Structure
//!
//! - `{prefix}_registries` - registry documents
//! - `{prefix}_registry_{registry}` - scheme documents, one index per registry
//! - `{prefix}_codelist` - codes, extensions and members
//!
//! Localized fields are mapped as nested objects. Every index is created with
//! `max_result_window` raised to 500000.
//!
//! # Example
//!
//! ```ignore
//! use codelist_persistence::backends::elasticsearch::{ElasticsearchBackend, ElasticsearchConfig};
//!
//! let config = ElasticsearchConfig {
//!     nodes: vec!["http://localhost:9200".to_string()],
//!     ..Default::default()
//! };
//! let backend = ElasticsearchBackend::new(config)?;
//! backend.initialize().await?;
//! ```

mod backend;
mod client;

pub use backend::{ElasticsearchAuth, ElasticsearchBackend, ElasticsearchConfig};
