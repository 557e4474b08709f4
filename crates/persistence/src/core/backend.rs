//! Backend abstraction for storage and search engines.
//!
//! This module defines the [`Backend`] trait implemented by every engine the
//! service talks to: the relational store and the search index. It covers
//! health checks and schema setup, independent of the repository and index
//! operations each engine also provides.

use std::fmt::Debug;

use async_trait::async_trait;

use crate::error::BackendError;

/// A backend the service depends on.
///
/// # Example
///
/// ```ignore
/// use codelist_persistence::core::Backend;
///
/// backend.initialize().await?;
/// backend.health_check().await?;
/// ```
#[async_trait]
pub trait Backend: Send + Sync + Debug {
    /// Returns a human-readable name for this backend.
    fn name(&self) -> &'static str;

    /// Checks if the backend is healthy and accepting connections.
    async fn health_check(&self) -> Result<(), BackendError>;

    /// Initializes the schema if needed.
    async fn initialize(&self) -> Result<(), BackendError>;
}
