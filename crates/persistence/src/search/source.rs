//! Read side of the reindex pipeline.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageResult;

use super::document::{DocumentType, IndexDocument};

/// Restricts which entities of a type are streamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceScope {
    /// Every entity of the type.
    All,
    /// Entities under one registry. For registries, the registry itself.
    Registry(Uuid),
    /// Entities under one scheme. For schemes, the scheme itself.
    Scheme(Uuid),
}

/// Identity of a registry, used to name its per-registry index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryKey {
    /// Registry id.
    pub id: Uuid,
    /// Registry code value.
    pub code_value: String,
}

/// Identity of a scheme and its registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemeKey {
    /// Scheme id.
    pub id: Uuid,
    /// Scheme code value.
    pub code_value: String,
    /// Owning registry.
    pub registry: RegistryKey,
}

/// Supplies entity ids and projected documents to the reindex pipeline.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Returns the ids of every entity of a type within the scope.
    async fn entity_ids(
        &self,
        document_type: DocumentType,
        scope: SourceScope,
    ) -> StorageResult<Vec<Uuid>>;

    /// Loads and projects the entities with the given ids.
    ///
    /// Ids that no longer resolve are skipped.
    async fn fetch_documents(
        &self,
        document_type: DocumentType,
        ids: &[Uuid],
    ) -> StorageResult<Vec<IndexDocument>>;

    /// Returns every registry.
    async fn registry_keys(&self) -> StorageResult<Vec<RegistryKey>>;

    /// Looks up a scheme by registry and scheme code value, case-insensitively.
    async fn scheme_key(&self, registry: &str, scheme: &str) -> StorageResult<Option<SchemeKey>>;
}
