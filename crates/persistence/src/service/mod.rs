//! Mutation services.
//!
//! [`CodeListService`] runs every write against registries, schemes, codes,
//! extensions and members:
//!
//! 1. Resolve the target and check the caller's capabilities.
//! 2. Take the per-scheme lock.
//! 3. Diff the input against persisted records and derive orders and
//!    hierarchy levels.
//! 4. Validate the resulting state and commit it as one change set.
//! 5. Project the changed entities into the search index. Index failures are
//!    returned as warnings and never undo the commit.

mod authorization;
mod code;
mod extension;
mod locks;
mod registry;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::CodeListStore;
use crate::error::{PermissionError, ResourceError, StorageResult};
use crate::hierarchy::{DEFAULT_MAX_HIERARCHY_LEVEL, HierarchyResolver};
use crate::model::{CodeRegistry, CodeScheme, Status, UriBuilder};
use crate::search::{ReindexConfig, ReindexOrchestrator, SearchIndexClient};

pub use authorization::{AuthorizationPolicy, ReadOnly, RegistryEditor, Superuser};
pub use locks::SchemeLocks;

/// Configuration of the mutation services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Deepest allowed broader-code chain.
    #[serde(default = "default_max_hierarchy_level")]
    pub max_hierarchy_level: u32,

    /// Base of every derived URI.
    #[serde(default = "default_uri_base")]
    pub uri_base: String,

    /// Index naming and batch sizes.
    #[serde(default)]
    pub reindex: ReindexConfig,
}

fn default_max_hierarchy_level() -> u32 {
    DEFAULT_MAX_HIERARCHY_LEVEL
}

fn default_uri_base() -> String {
    UriBuilder::default().base().to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_hierarchy_level: default_max_hierarchy_level(),
            uri_base: default_uri_base(),
            reindex: ReindexConfig::default(),
        }
    }
}

/// The outcome of a committed mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationResult<T> {
    /// The written records.
    pub value: T,
    /// Search index synchronization problems. The mutation itself succeeded.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl<T> MutationResult<T> {
    fn new(value: T, warnings: Vec<String>) -> Self {
        Self { value, warnings }
    }
}

/// Write side of the code list store.
pub struct CodeListService<S: CodeListStore> {
    store: Arc<S>,
    indexer: ReindexOrchestrator<S, dyn SearchIndexClient>,
    resolver: HierarchyResolver,
    uris: UriBuilder,
    locks: SchemeLocks,
}

impl<S: CodeListStore> std::fmt::Debug for CodeListService<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeListService")
            .field("indexer", &self.indexer)
            .field("resolver", &self.resolver)
            .field("uris", &self.uris)
            .finish_non_exhaustive()
    }
}

impl<S: CodeListStore> CodeListService<S> {
    /// Creates the service over a store and a search index client.
    pub fn new(store: Arc<S>, index_client: Arc<dyn SearchIndexClient>, config: ServiceConfig) -> Self {
        let indexer = ReindexOrchestrator::new(Arc::clone(&store), index_client, config.reindex);
        Self {
            store,
            indexer,
            resolver: HierarchyResolver::new(config.max_hierarchy_level),
            uris: UriBuilder::new(config.uri_base),
            locks: SchemeLocks::new(),
        }
    }

    /// Returns the store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Returns the reindex orchestrator used for post-commit synchronization.
    pub fn indexer(&self) -> &ReindexOrchestrator<S, dyn SearchIndexClient> {
        &self.indexer
    }

    /// Returns the URI builder.
    pub fn uris(&self) -> &UriBuilder {
        &self.uris
    }

    /// Finds a registry by code value or fails with not found.
    pub async fn registry(&self, registry: &str) -> StorageResult<CodeRegistry> {
        self.store
            .find_registry(registry)
            .await?
            .ok_or_else(|| ResourceError::not_found("code registry", registry).into())
    }

    /// Finds a scheme by registry and scheme code value or fails with not found.
    pub async fn scheme(&self, registry: &str, scheme: &str) -> StorageResult<(CodeRegistry, CodeScheme)> {
        let registry_entity = self.registry(registry).await?;
        let scheme_entity = self
            .store
            .find_scheme(registry_entity.id, scheme)
            .await?
            .ok_or_else(|| ResourceError::not_found("code scheme", format!("{}/{}", registry, scheme)))?;
        Ok((registry_entity, scheme_entity))
    }

    /// Rejects demotions of published content unless `privileged`.
    fn guard_status_change(from: Status, to: Status, privileged: bool) -> StorageResult<()> {
        if from.is_demotion_to(to) && !privileged {
            return Err(PermissionError::StatusChangeNotAllowed {
                from: from.to_string(),
                to: to.to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn require_registry_access(
        caller: &dyn AuthorizationPolicy,
        registry: &CodeRegistry,
        operation: &str,
    ) -> StorageResult<()> {
        if caller.is_superuser() || caller.can_modify_registry(registry) {
            Ok(())
        } else {
            Err(PermissionError::NotPermitted {
                operation: format!("{} in registry '{}'", operation, registry.code_value),
            }
            .into())
        }
    }
}
