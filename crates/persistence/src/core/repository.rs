//! Repository traits for the relational store.
//!
//! Reads return detached copies; writes replace whole records. Every write
//! that touches more than one record goes through [`ChangeSetWriter::commit`]
//! so that readers never observe a partially applied batch.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StorageResult;
use crate::model::{Code, CodeRegistry, CodeScheme, Extension, Member};
use crate::search::DocumentSource;

/// Durable store of registries.
#[async_trait]
pub trait RegistryRepository: Send + Sync {
    /// Returns every registry ordered by code value.
    async fn find_all_registries(&self) -> StorageResult<Vec<CodeRegistry>>;

    /// Finds a registry by code value, case-insensitively.
    async fn find_registry(&self, code_value: &str) -> StorageResult<Option<CodeRegistry>>;

    /// Finds a registry by id.
    async fn find_registry_by_id(&self, id: Uuid) -> StorageResult<Option<CodeRegistry>>;

    /// Inserts or replaces a registry.
    async fn save_registry(&self, registry: &CodeRegistry) -> StorageResult<()>;

    /// Deletes a registry and everything it owns.
    async fn delete_registry(&self, id: Uuid) -> StorageResult<()>;
}

/// Durable store of code schemes.
#[async_trait]
pub trait SchemeRepository: Send + Sync {
    /// Returns every scheme.
    async fn find_all_schemes(&self) -> StorageResult<Vec<CodeScheme>>;

    /// Returns the schemes of a registry ordered by code value.
    async fn find_schemes_by_registry(&self, registry_id: Uuid) -> StorageResult<Vec<CodeScheme>>;

    /// Finds a scheme by id.
    async fn find_scheme_by_id(&self, id: Uuid) -> StorageResult<Option<CodeScheme>>;

    /// Finds a scheme by registry and code value, case-insensitively.
    async fn find_scheme(
        &self,
        registry_id: Uuid,
        code_value: &str,
    ) -> StorageResult<Option<CodeScheme>>;

    /// Finds a scheme by URI.
    async fn find_scheme_by_uri(&self, uri: &str) -> StorageResult<Option<CodeScheme>>;

    /// Inserts or replaces a scheme.
    async fn save_scheme(&self, scheme: &CodeScheme) -> StorageResult<()>;

    /// Deletes a scheme and everything it owns.
    async fn delete_scheme(&self, id: Uuid) -> StorageResult<()>;
}

/// Durable store of codes, keyed by scheme and code value.
#[async_trait]
pub trait CodeRepository: Send + Sync {
    /// Returns every code.
    async fn find_all_codes(&self) -> StorageResult<Vec<Code>>;

    /// Finds a code by id.
    async fn find_code_by_id(&self, id: Uuid) -> StorageResult<Option<Code>>;

    /// Returns the codes of a scheme ordered by order.
    async fn find_codes_by_scheme(&self, scheme_id: Uuid) -> StorageResult<Vec<Code>>;

    /// Returns the direct children of a code.
    async fn find_codes_by_broader_code_id(&self, broader_code_id: Uuid) -> StorageResult<Vec<Code>>;

    /// Inserts or replaces codes atomically.
    async fn save_codes(&self, codes: &[Code]) -> StorageResult<()>;

    /// Deletes codes atomically.
    async fn delete_codes(&self, ids: &[Uuid]) -> StorageResult<()>;

    /// Highest order in a scheme, if it has codes.
    async fn max_code_order(&self, scheme_id: Uuid) -> StorageResult<Option<i32>>;
}

/// Durable store of extensions and members.
#[async_trait]
pub trait ExtensionRepository: Send + Sync {
    /// Returns the extensions of a scheme ordered by code value.
    async fn find_extensions_by_scheme(&self, scheme_id: Uuid) -> StorageResult<Vec<Extension>>;

    /// Finds an extension by id.
    async fn find_extension_by_id(&self, id: Uuid) -> StorageResult<Option<Extension>>;

    /// Finds an extension by parent scheme and code value, case-insensitively.
    async fn find_extension(
        &self,
        scheme_id: Uuid,
        code_value: &str,
    ) -> StorageResult<Option<Extension>>;

    /// Returns the members of an extension ordered by order.
    async fn find_members_by_extension(&self, extension_id: Uuid) -> StorageResult<Vec<Member>>;

    /// Finds a member by id.
    async fn find_member_by_id(&self, id: Uuid) -> StorageResult<Option<Member>>;

    /// Returns every member referencing a code.
    async fn find_members_by_code_id(&self, code_id: Uuid) -> StorageResult<Vec<Member>>;

    /// Returns every member whose related member is `member_id`.
    async fn find_members_by_related_member_id(&self, member_id: Uuid) -> StorageResult<Vec<Member>>;

    /// Highest member order in an extension, if it has members.
    async fn max_member_order(&self, extension_id: Uuid) -> StorageResult<Option<i32>>;
}

/// Records written or removed together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    /// Codes to insert or replace.
    pub codes: Vec<Code>,
    /// Codes to delete.
    pub deleted_codes: Vec<Uuid>,
    /// Extensions to insert or replace.
    pub extensions: Vec<Extension>,
    /// Members to insert or replace.
    pub members: Vec<Member>,
    /// Members to delete.
    pub deleted_members: Vec<Uuid>,
}

impl ChangeSet {
    /// Returns true if the change set writes nothing.
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
            && self.deleted_codes.is_empty()
            && self.extensions.is_empty()
            && self.members.is_empty()
            && self.deleted_members.is_empty()
    }
}

/// Applies a [`ChangeSet`] in one transaction.
///
/// Deletions run first, then saves: extensions, codes, members.
#[async_trait]
pub trait ChangeSetWriter: Send + Sync {
    /// Commits every change or none.
    async fn commit(&self, changes: &ChangeSet) -> StorageResult<()>;
}

/// Everything the services need from a store.
pub trait CodeListStore:
    RegistryRepository
    + SchemeRepository
    + CodeRepository
    + ExtensionRepository
    + ChangeSetWriter
    + DocumentSource
    + 'static
{
}

impl<T> CodeListStore for T where
    T: RegistryRepository
        + SchemeRepository
        + CodeRepository
        + ExtensionRepository
        + ChangeSetWriter
        + DocumentSource
        + 'static
{
}
