//! Registry and scheme upserts.

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::core::CodeListStore;
use crate::error::{PermissionError, ResourceError, StorageResult, ValidationError};
use crate::model::{
    CodeRegistry, CodeScheme, EntityRef, RegistryInput, SchemeInput, Status, natural_key,
    validate_code_value,
};
use crate::search::DocumentType;

use super::{AuthorizationPolicy, CodeListService, MutationResult};

impl<S: CodeListStore> CodeListService<S> {
    /// Creates or updates a registry, matched by code value. Superuser only.
    pub async fn upsert_registry(
        &self,
        caller: &dyn AuthorizationPolicy,
        input: RegistryInput,
    ) -> StorageResult<MutationResult<CodeRegistry>> {
        if !caller.is_superuser() {
            return Err(PermissionError::NotPermitted {
                operation: "upsert code registry".to_string(),
            }
            .into());
        }
        validate_code_value(&input.code_value)?;

        let now = Utc::now();
        let registry = match self.store.find_registry(&input.code_value).await? {
            Some(mut existing) => {
                existing.pref_label = input.pref_label;
                existing.description = input.description;
                existing.modified = now;
                existing
            }
            None => CodeRegistry {
                id: Uuid::new_v4(),
                uri: self.uris.registry(&input.code_value),
                code_value: input.code_value,
                pref_label: input.pref_label,
                description: input.description,
                created: now,
                modified: now,
            },
        };

        self.store.save_registry(&registry).await?;
        info!(registry = %registry.code_value, "Upserted code registry");

        let warnings = self
            .indexer
            .index_entities(DocumentType::Registry, &[registry.id])
            .await;
        Ok(MutationResult::new(registry, warnings))
    }

    /// Creates or updates a scheme in a registry.
    ///
    /// The scheme is matched by id when given, otherwise by code value. A
    /// default code can only name a code the scheme already holds.
    pub async fn upsert_scheme(
        &self,
        caller: &dyn AuthorizationPolicy,
        registry: &str,
        input: SchemeInput,
    ) -> StorageResult<MutationResult<CodeScheme>> {
        let registry = self.registry(registry).await?;
        Self::require_registry_access(caller, &registry, "upsert code scheme")?;
        validate_code_value(&input.code_value)?;

        let existing = match input.id {
            Some(id) => match self.store.find_scheme_by_id(id).await? {
                Some(scheme) => {
                    if scheme.code_registry_id != registry.id
                        || natural_key(&scheme.code_value) != natural_key(&input.code_value)
                    {
                        return Err(ValidationError::Mismatch {
                            entity: "code scheme",
                            message: format!(
                                "id {} belongs to code scheme '{}'",
                                id, scheme.code_value
                            ),
                        }
                        .into());
                    }
                    Some(scheme)
                }
                None => {
                    if self
                        .store
                        .find_scheme(registry.id, &input.code_value)
                        .await?
                        .is_some()
                    {
                        return Err(ValidationError::Mismatch {
                            entity: "code scheme",
                            message: format!(
                                "code scheme '{}' already exists with another id",
                                input.code_value
                            ),
                        }
                        .into());
                    }
                    None
                }
            },
            None => self.store.find_scheme(registry.id, &input.code_value).await?,
        };

        let _guard = match &existing {
            Some(scheme) => Some(self.locks.lock(scheme.id).await),
            None => None,
        };

        if let Some(prev_id) = input.prev_codescheme_id {
            if self.store.find_scheme_by_id(prev_id).await?.is_none() {
                return Err(ResourceError::not_found("code scheme", prev_id.to_string()).into());
            }
        }

        let now = Utc::now();
        let mut scheme = match existing {
            Some(mut scheme) => {
                scheme.code_value = input.code_value;
                if let Some(status) = input.status {
                    scheme.status = status;
                }
                scheme.modified = now;
                scheme
            }
            None => CodeScheme {
                id: input.id.unwrap_or_else(Uuid::new_v4),
                code_registry_id: registry.id,
                uri: self.uris.scheme(&registry.code_value, &input.code_value),
                code_value: input.code_value,
                status: input.status.unwrap_or(Status::Draft),
                pref_label: Default::default(),
                description: Default::default(),
                definition: Default::default(),
                prev_codescheme_id: None,
                cumulative: false,
                default_code_id: None,
                created: now,
                modified: now,
            },
        };
        scheme.pref_label = input.pref_label;
        scheme.description = input.description;
        scheme.definition = input.definition;
        scheme.prev_codescheme_id = input.prev_codescheme_id;
        scheme.cumulative = input.cumulative;
        scheme.default_code_id = match &input.default_code {
            Some(reference) => Some(self.resolve_default_code(&scheme, reference).await?),
            None => None,
        };

        self.store.save_scheme(&scheme).await?;
        info!(registry = %registry.code_value, scheme = %scheme.code_value, "Upserted code scheme");

        let warnings = self
            .indexer
            .index_entities(DocumentType::Scheme, &[scheme.id])
            .await;
        Ok(MutationResult::new(scheme, warnings))
    }

    async fn resolve_default_code(&self, scheme: &CodeScheme, reference: &EntityRef) -> StorageResult<Uuid> {
        let codes = self.store.find_codes_by_scheme(scheme.id).await?;
        codes
            .iter()
            .find(|code| match reference {
                EntityRef { id: Some(id), .. } => code.id == *id,
                EntityRef { code_value: Some(value), .. } => code.key() == natural_key(value),
                EntityRef { uri: Some(uri), .. } => code.uri == *uri,
                _ => false,
            })
            .map(|code| code.id)
            .ok_or_else(|| ResourceError::not_found("default code", reference.describe()).into())
    }
}
