//! Search index synchronization.
//!
//! The relational store is the source of truth; the search index is an
//! eventually consistent projection of it. This module provides:
//!
//! - [`IndexDocument`] projections and index mappings
//! - [`SearchIndexClient`], the engine abstraction, with an in-memory implementation
//! - [`IndexBatcher`] page and chunk partitioning
//! - [`ReindexOrchestrator`], which sequences rebuilds and post-mutation sync

pub mod batcher;
pub mod client;
pub mod document;
pub mod memory;
pub mod reindex;
pub mod source;

pub use batcher::{DEFAULT_CHUNK_SIZE, DEFAULT_PAGE_SIZE, IndexBatcher};
pub use client::{BulkItemFailure, BulkResponse, SearchIndexClient};
pub use document::{DocumentType, IndexDocument, IndexSettings, MAX_RESULT_WINDOW, mapping_for};
pub use memory::InMemoryIndexClient;
pub use reindex::{
    IndexRun, IndexRunReport, ReindexConfig, ReindexOrchestrator, ReindexReport, ReindexStage,
    RunMode,
};
pub use source::{DocumentSource, RegistryKey, SchemeKey, SourceScope};
