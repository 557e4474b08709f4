//! Extension and member upserts and member deletion.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::{ChangeSet, CodeListStore};
use crate::error::{ResourceError, StorageResult, ValidationError};
use crate::model::{
    Code, CodeRegistry, CodeScheme, EntityRef, Extension, ExtensionInput, Member, MemberInput,
    Status, natural_key, validate_code_value,
};
use crate::order::{OrderSequencer, auto_member_codes, ensure_unique, validate_order};
use crate::search::DocumentType;

use super::{AuthorizationPolicy, CodeListService, MutationResult};

fn invalid_extension(message: impl Into<String>) -> ValidationError {
    ValidationError::InvalidExtension {
        message: message.into(),
    }
}

fn invalid_member(message: impl Into<String>) -> ValidationError {
    ValidationError::InvalidMember {
        message: message.into(),
    }
}

/// Codes a member may reference: the parent scheme's and every linked scheme's.
struct CodeCatalog {
    codes: Vec<Code>,
    by_scheme_key: HashMap<(Uuid, String), usize>,
    parent_id: Uuid,
}

impl CodeCatalog {
    fn new(parent_id: Uuid, codes: Vec<Code>) -> Self {
        let by_scheme_key = codes
            .iter()
            .enumerate()
            .map(|(i, c)| ((c.code_scheme_id, c.key()), i))
            .collect();
        Self {
            codes,
            by_scheme_key,
            parent_id,
        }
    }

    /// Resolves a code reference. Bare code values resolve in the parent scheme.
    fn find(&self, reference: &EntityRef) -> Option<&Code> {
        match reference {
            EntityRef { id: Some(id), .. } => self.codes.iter().find(|c| c.id == *id),
            EntityRef { uri: Some(uri), .. } => self.codes.iter().find(|c| c.uri == *uri),
            EntityRef { code_value: Some(value), .. } => self
                .by_scheme_key
                .get(&(self.parent_id, natural_key(value)))
                .map(|&i| &self.codes[i]),
            _ => None,
        }
    }
}

impl<S: CodeListStore> CodeListService<S> {
    /// Returns the extensions of a scheme.
    pub async fn list_extensions(&self, registry: &str, scheme: &str) -> StorageResult<Vec<Extension>> {
        let (_, scheme) = self.scheme(registry, scheme).await?;
        self.store.find_extensions_by_scheme(scheme.id).await
    }

    /// Finds an extension by code value or fails with not found.
    pub async fn extension(
        &self,
        registry: &str,
        scheme: &str,
        extension: &str,
    ) -> StorageResult<(CodeRegistry, CodeScheme, Extension)> {
        let (registry, scheme) = self.scheme(registry, scheme).await?;
        let extension_entity = self
            .store
            .find_extension(scheme.id, extension)
            .await?
            .ok_or_else(|| {
                ResourceError::not_found(
                    "extension",
                    format!("{}/{}/{}", registry.code_value, scheme.code_value, extension),
                )
            })?;
        Ok((registry, scheme, extension_entity))
    }

    /// Creates or updates an extension of a scheme.
    ///
    /// With `auto_create_members` every code of the parent and linked schemes
    /// that has no member yet gets one, parent codes first.
    pub async fn upsert_extension(
        &self,
        caller: &dyn AuthorizationPolicy,
        registry: &str,
        scheme: &str,
        input: ExtensionInput,
        auto_create_members: bool,
    ) -> StorageResult<MutationResult<Extension>> {
        let (registry, scheme) = self.scheme(registry, scheme).await?;
        Self::require_registry_access(caller, &registry, "upsert extension")?;
        validate_code_value(&input.code_value)?;

        let _guard = self.locks.lock(scheme.id).await;
        let existing = match input.id {
            Some(id) => match self.store.find_extension_by_id(id).await? {
                Some(extension) if extension.parent_code_scheme_id != scheme.id => {
                    return Err(invalid_extension(format!(
                        "id {} belongs to an extension of another code scheme",
                        id
                    ))
                    .into());
                }
                found => {
                    if let Some(other) =
                        self.store.find_extension(scheme.id, &input.code_value).await?
                    {
                        if other.id != id {
                            return Err(ValidationError::Mismatch {
                                entity: "extension",
                                message: format!(
                                    "extension '{}' already exists with another id",
                                    input.code_value
                                ),
                            }
                            .into());
                        }
                    }
                    found
                }
            },
            None => self.store.find_extension(scheme.id, &input.code_value).await?,
        };

        if let Some(extension) = &existing {
            if extension.property_type != input.property_type {
                return Err(invalid_extension(format!(
                    "property type of extension '{}' cannot change from {} to {}",
                    extension.code_value, extension.property_type, input.property_type
                ))
                .into());
            }
        }

        let linked = self.resolve_linked_schemes(&scheme, &input.code_schemes).await?;

        if input.property_type.is_code_context() {
            let clash = self
                .store
                .find_extensions_by_scheme(scheme.id)
                .await?
                .into_iter()
                .any(|other| {
                    other.property_type == input.property_type
                        && existing.as_ref().is_none_or(|e| e.id != other.id)
                });
            if clash {
                return Err(invalid_extension(format!(
                    "code scheme '{}' already has a {} extension",
                    scheme.code_value, input.property_type
                ))
                .into());
            }
        }

        let now = Utc::now();
        let uri = self
            .uris
            .extension(&registry.code_value, &scheme.code_value, &input.code_value);
        let extension = match existing {
            Some(mut extension) => {
                if let Some(status) = input.status {
                    let privileged = caller.is_superuser() || caller.can_modify_registry(&registry);
                    Self::guard_status_change(extension.status, status, privileged)?;
                    extension.status = status;
                }
                extension.code_value = input.code_value;
                extension.uri = uri;
                extension.pref_label = input.pref_label;
                extension.code_scheme_ids = linked.iter().map(|s| s.id).collect();
                extension.start_date = input.start_date;
                extension.end_date = input.end_date;
                extension.modified = now;
                extension
            }
            None => Extension {
                id: input.id.unwrap_or_else(Uuid::new_v4),
                parent_code_scheme_id: scheme.id,
                code_value: input.code_value,
                uri,
                property_type: input.property_type,
                status: input.status.unwrap_or(Status::Draft),
                pref_label: input.pref_label,
                code_scheme_ids: linked.iter().map(|s| s.id).collect(),
                start_date: input.start_date,
                end_date: input.end_date,
                created: now,
                modified: now,
            },
        };

        let members = if auto_create_members {
            self.auto_members(&registry, &scheme, &extension, linked).await?
        } else {
            Vec::new()
        };

        let changes = ChangeSet {
            extensions: vec![extension.clone()],
            members,
            ..Default::default()
        };
        self.store.commit(&changes).await?;
        info!(
            registry = %registry.code_value,
            scheme = %scheme.code_value,
            extension = %extension.code_value,
            members_created = changes.members.len(),
            "Upserted extension"
        );

        let mut warnings = self
            .indexer
            .index_entities(DocumentType::Extension, &[extension.id])
            .await;
        let member_ids: Vec<Uuid> = changes.members.iter().map(|m| m.id).collect();
        warnings.extend(self.indexer.index_entities(DocumentType::Member, &member_ids).await);
        Ok(MutationResult::new(extension, warnings))
    }

    /// Resolves linked scheme references, dropping duplicates.
    async fn resolve_linked_schemes(
        &self,
        parent: &CodeScheme,
        references: &[EntityRef],
    ) -> StorageResult<Vec<CodeScheme>> {
        let mut linked: Vec<CodeScheme> = Vec::new();
        for reference in references {
            let found = match reference {
                EntityRef { id: Some(id), .. } => self.store.find_scheme_by_id(*id).await?,
                EntityRef { uri: Some(uri), .. } => self.store.find_scheme_by_uri(uri).await?,
                EntityRef {
                    code_value: Some(value),
                    ..
                } => self.store.find_scheme(parent.code_registry_id, value).await?,
                _ => None,
            };
            let Some(scheme) = found else {
                return Err(invalid_extension(format!(
                    "linked code scheme '{}' does not exist",
                    reference.describe()
                ))
                .into());
            };
            if scheme.id == parent.id {
                return Err(invalid_extension("the parent code scheme cannot be linked to its own extension").into());
            }
            if linked.iter().all(|s| s.id != scheme.id) {
                linked.push(scheme);
            }
        }
        Ok(linked)
    }

    async fn auto_members(
        &self,
        registry: &CodeRegistry,
        scheme: &CodeScheme,
        extension: &Extension,
        linked: Vec<CodeScheme>,
    ) -> StorageResult<Vec<Member>> {
        let existing = self.store.find_members_by_extension(extension.id).await?;
        let covered: HashSet<Uuid> = existing.iter().map(|m| m.code_id).collect();
        let mut sequencer = OrderSequencer::from_existing(existing.iter().map(|m| (m.id, m.order)));
        let mut next_sequence = existing.iter().map(|m| m.sequence_id).max().unwrap_or(0) + 1;

        let parent_codes = self.store.find_codes_by_scheme(scheme.id).await?;
        let mut linked_codes = Vec::with_capacity(linked.len());
        for linked_scheme in linked {
            let codes = self.store.find_codes_by_scheme(linked_scheme.id).await?;
            linked_codes.push((linked_scheme, codes));
        }

        let now = Utc::now();
        let mut members = Vec::new();
        for code in auto_member_codes(&parent_codes, &linked_codes) {
            if covered.contains(&code.id) {
                continue;
            }
            let id = Uuid::new_v4();
            members.push(Member {
                id,
                extension_id: extension.id,
                code_id: code.id,
                related_member_id: None,
                order: sequencer.assign(id, None)?.order,
                sequence_id: next_sequence,
                member_values: Default::default(),
                pref_label: Default::default(),
                start_date: None,
                end_date: None,
                uri: self
                    .uris
                    .member(&registry.code_value, &scheme.code_value, &extension.code_value, id),
                created: now,
                modified: now,
            });
            next_sequence += 1;
        }
        debug!(extension = %extension.code_value, created = members.len(), "Generated members");
        Ok(members)
    }

    /// Returns the members of an extension ordered by order.
    pub async fn list_members(
        &self,
        registry: &str,
        scheme: &str,
        extension: &str,
    ) -> StorageResult<Vec<Member>> {
        let (_, _, extension) = self.extension(registry, scheme, extension).await?;
        self.store.find_members_by_extension(extension.id).await
    }

    /// Creates or updates a batch of members in one extension.
    ///
    /// Members are matched by id, then by sequence id. Each must reference a
    /// code of the parent scheme or a linked scheme. Related members are
    /// resolved after the whole batch is placed, so a batch may reference its
    /// own new members.
    pub async fn upsert_members(
        &self,
        caller: &dyn AuthorizationPolicy,
        registry: &str,
        scheme: &str,
        extension: &str,
        inputs: Vec<MemberInput>,
    ) -> StorageResult<MutationResult<Vec<Member>>> {
        let (registry, scheme, extension) = self.extension(registry, scheme, extension).await?;
        Self::require_registry_access(caller, &registry, "upsert members")?;
        for order in inputs.iter().filter_map(|input| input.order) {
            validate_order(order)?;
        }

        let _guard = self.locks.lock(scheme.id).await;
        let mut members = self.store.find_members_by_extension(extension.id).await?;
        let mut sequencer = OrderSequencer::from_existing(members.iter().map(|m| (m.id, m.order)));
        let mut next_sequence = members.iter().map(|m| m.sequence_id).max().unwrap_or(0) + 1;
        let catalog = self.code_catalog(&scheme, &extension).await?;

        let now = Utc::now();
        let mut touched: HashSet<Uuid> = HashSet::new();
        let mut upserted: Vec<Uuid> = Vec::with_capacity(inputs.len());
        let mut related_refs: Vec<(usize, Option<EntityRef>)> = Vec::with_capacity(inputs.len());

        for input in inputs {
            let code = catalog.find(&input.code).ok_or_else(|| {
                invalid_member(format!(
                    "code '{}' is not in the code scheme or its linked schemes",
                    input.code.describe()
                ))
            })?;

            let index = match self.match_member(&extension, &members, &input).await? {
                Some(index) => index,
                None => {
                    let id = input.id.unwrap_or_else(Uuid::new_v4);
                    let sequence_id = input.sequence_id.unwrap_or(next_sequence);
                    next_sequence = next_sequence.max(sequence_id + 1);
                    members.push(Member {
                        id,
                        extension_id: extension.id,
                        code_id: code.id,
                        related_member_id: None,
                        order: 0,
                        sequence_id,
                        member_values: Default::default(),
                        pref_label: Default::default(),
                        start_date: None,
                        end_date: None,
                        uri: self
                            .uris
                            .member(&registry.code_value, &scheme.code_value, &extension.code_value, id),
                        created: now,
                        modified: now,
                    });
                    members.len() - 1
                }
            };

            let member = &mut members[index];
            member.code_id = code.id;
            member.member_values = input.member_values;
            member.pref_label = input.pref_label;
            member.start_date = input.start_date;
            member.end_date = input.end_date;
            member.modified = now;

            let assignment = sequencer.assign(member.id, input.order)?;
            member.order = assignment.order;
            let id = member.id;
            if let Some((shifted_id, order)) = assignment.shifted {
                if let Some(shifted) = members.iter_mut().find(|m| m.id == shifted_id) {
                    shifted.order = order;
                    shifted.modified = now;
                    touched.insert(shifted_id);
                }
            }

            touched.insert(id);
            upserted.push(id);
            related_refs.push((index, input.related_member));
        }

        for (index, reference) in related_refs {
            members[index].related_member_id = match reference {
                Some(reference) => Some(resolve_related(&members, index, &reference)?),
                None => None,
            };
        }

        ensure_unique(
            &format!("extension '{}'", extension.code_value),
            members.iter().map(|m| m.order),
        )?;

        let changes = ChangeSet {
            members: members
                .iter()
                .filter(|m| touched.contains(&m.id))
                .cloned()
                .collect(),
            ..Default::default()
        };
        self.store.commit(&changes).await?;
        info!(
            scheme = %scheme.code_value,
            extension = %extension.code_value,
            upserted = upserted.len(),
            written = changes.members.len(),
            "Upserted members"
        );

        let written: Vec<Uuid> = changes.members.iter().map(|m| m.id).collect();
        let warnings = self.indexer.index_entities(DocumentType::Member, &written).await;
        let value = upserted
            .iter()
            .filter_map(|id| members.iter().find(|m| m.id == *id).cloned())
            .collect();
        Ok(MutationResult::new(value, warnings))
    }

    async fn match_member(
        &self,
        extension: &Extension,
        members: &[Member],
        input: &MemberInput,
    ) -> StorageResult<Option<usize>> {
        if let Some(id) = input.id {
            if let Some(index) = members.iter().position(|m| m.id == id) {
                return Ok(Some(index));
            }
            if self.store.find_member_by_id(id).await?.is_some() {
                return Err(invalid_member(format!(
                    "id {} belongs to a member of another extension than '{}'",
                    id, extension.code_value
                ))
                .into());
            }
            return Ok(None);
        }
        Ok(input
            .sequence_id
            .and_then(|sequence_id| members.iter().position(|m| m.sequence_id == sequence_id)))
    }

    async fn code_catalog(&self, scheme: &CodeScheme, extension: &Extension) -> StorageResult<CodeCatalog> {
        let mut codes = self.store.find_codes_by_scheme(scheme.id).await?;
        for linked_id in &extension.code_scheme_ids {
            codes.extend(self.store.find_codes_by_scheme(*linked_id).await?);
        }
        Ok(CodeCatalog::new(scheme.id, codes))
    }

    /// Deletes one member. Members that referenced it lose their relation.
    pub async fn delete_member(
        &self,
        caller: &dyn AuthorizationPolicy,
        registry: &str,
        scheme: &str,
        extension: &str,
        member_id: Uuid,
    ) -> StorageResult<MutationResult<Member>> {
        let (registry, scheme, extension) = self.extension(registry, scheme, extension).await?;
        Self::require_registry_access(caller, &registry, "delete member")?;

        let _guard = self.locks.lock(scheme.id).await;
        let member = self
            .store
            .find_member_by_id(member_id)
            .await?
            .filter(|m| m.extension_id == extension.id)
            .ok_or_else(|| ResourceError::not_found("member", member_id.to_string()))?;

        let now = Utc::now();
        let referrers: Vec<Member> = self
            .store
            .find_members_by_related_member_id(member.id)
            .await?
            .into_iter()
            .map(|mut referrer| {
                referrer.related_member_id = None;
                referrer.modified = now;
                referrer
            })
            .collect();

        let changes = ChangeSet {
            members: referrers,
            deleted_members: vec![member.id],
            ..Default::default()
        };
        self.store.commit(&changes).await?;
        info!(
            extension = %extension.code_value,
            member = %member.id,
            referrers = changes.members.len(),
            "Deleted member"
        );

        let mut warnings = self
            .indexer
            .remove_entities(DocumentType::Member, &[member.id], None)
            .await;
        let referrer_ids: Vec<Uuid> = changes.members.iter().map(|m| m.id).collect();
        warnings.extend(self.indexer.index_entities(DocumentType::Member, &referrer_ids).await);
        Ok(MutationResult::new(member, warnings))
    }
}

/// Resolves a related member reference within the extension's members.
fn resolve_related(members: &[Member], index: usize, reference: &EntityRef) -> Result<Uuid, ValidationError> {
    let found = match reference {
        EntityRef { id: Some(id), .. } => members.iter().position(|m| m.id == *id),
        EntityRef { uri: Some(uri), .. } => members.iter().position(|m| m.uri == *uri),
        _ => None,
    };
    match found {
        Some(target) if target == index => Err(invalid_member("a member cannot be related to itself")),
        Some(target) => Ok(members[target].id),
        None => Err(invalid_member(format!(
            "related member '{}' is not in the extension",
            reference.describe()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(sequence_id: i32) -> Member {
        let now = Utc::now();
        let id = Uuid::new_v4();
        Member {
            id,
            extension_id: Uuid::nil(),
            code_id: Uuid::new_v4(),
            related_member_id: None,
            order: sequence_id,
            sequence_id,
            member_values: Default::default(),
            pref_label: Default::default(),
            start_date: None,
            end_date: None,
            uri: format!("http://example.org/member/{id}"),
            created: now,
            modified: now,
        }
    }

    #[test]
    fn test_resolve_related_by_id_and_uri() {
        let members = vec![member(1), member(2)];
        assert_eq!(
            resolve_related(&members, 0, &EntityRef::id(members[1].id)),
            Ok(members[1].id)
        );
        assert_eq!(
            resolve_related(&members, 1, &EntityRef::uri(members[0].uri.clone())),
            Ok(members[0].id)
        );
    }

    #[test]
    fn test_resolve_related_rejects_self_and_unknown() {
        let members = vec![member(1)];
        assert!(matches!(
            resolve_related(&members, 0, &EntityRef::id(members[0].id)),
            Err(ValidationError::InvalidMember { .. })
        ));
        assert!(matches!(
            resolve_related(&members, 0, &EntityRef::id(Uuid::new_v4())),
            Err(ValidationError::InvalidMember { .. })
        ));
    }
}
