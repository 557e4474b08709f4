//! Code upserts, deletion and mass status changes.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::{ChangeSet, CodeListStore};
use crate::error::{ResourceError, StorageResult, ValidationError};
use crate::hierarchy::BroaderGraph;
use crate::model::{
    Code, CodeInput, CodeRegistry, CodeScheme, EntityRef, Extension, Status, natural_key,
    validate_code_value,
};
use crate::order::{OrderSequencer, ensure_unique, validate_order};
use crate::search::DocumentType;

use super::{AuthorizationPolicy, CodeListService, MutationResult};

/// A scheme's codes being edited, indexed by id and natural key.
struct WorkingSet {
    codes: Vec<Code>,
    by_id: HashMap<Uuid, usize>,
    by_key: HashMap<String, usize>,
}

impl WorkingSet {
    fn new(codes: Vec<Code>) -> Self {
        let by_id = codes.iter().enumerate().map(|(i, c)| (c.id, i)).collect();
        let by_key = codes.iter().enumerate().map(|(i, c)| (c.key(), i)).collect();
        Self { codes, by_id, by_key }
    }

    fn push(&mut self, code: Code) -> usize {
        let index = self.codes.len();
        self.by_id.insert(code.id, index);
        self.by_key.insert(code.key(), index);
        self.codes.push(code);
        index
    }

    fn find(&self, reference: &EntityRef) -> Option<usize> {
        match reference {
            EntityRef { id: Some(id), .. } => self.by_id.get(id).copied(),
            EntityRef { code_value: Some(value), .. } => self.by_key.get(&natural_key(value)).copied(),
            EntityRef { uri: Some(uri), .. } => self.codes.iter().position(|c| c.uri == *uri),
            _ => None,
        }
    }
}

impl<S: CodeListStore> CodeListService<S> {
    /// Returns a scheme's codes ordered by order.
    pub async fn list_codes(&self, registry: &str, scheme: &str) -> StorageResult<Vec<Code>> {
        let (_, scheme) = self.scheme(registry, scheme).await?;
        self.store.find_codes_by_scheme(scheme.id).await
    }

    /// Creates or updates a batch of codes in one scheme.
    ///
    /// Codes are matched by id, then by code value. Orders are assigned with
    /// shifting, broader codes are resolved within the scheme, and hierarchy
    /// levels are recomputed for the whole scheme. Any validation failure
    /// rejects the whole batch before anything is written.
    pub async fn upsert_codes(
        &self,
        caller: &dyn AuthorizationPolicy,
        registry: &str,
        scheme: &str,
        inputs: Vec<CodeInput>,
    ) -> StorageResult<MutationResult<Vec<Code>>> {
        let (registry, scheme) = self.scheme(registry, scheme).await?;
        Self::require_registry_access(caller, &registry, "upsert codes")?;

        let mut seen = HashSet::new();
        for input in &inputs {
            validate_code_value(&input.code_value)?;
            if let Some(order) = input.order {
                validate_order(order)?;
            }
            if !seen.insert(natural_key(&input.code_value)) {
                return Err(ValidationError::Mismatch {
                    entity: "code",
                    message: format!("code '{}' appears more than once in the batch", input.code_value),
                }
                .into());
            }
        }

        let _guard = self.locks.lock(scheme.id).await;
        let existing = self.store.find_codes_by_scheme(scheme.id).await?;
        let mut sequencer = OrderSequencer::from_existing(existing.iter().map(|c| (c.id, c.order)));
        let mut working = WorkingSet::new(existing);
        let mut touched: BTreeSet<Uuid> = BTreeSet::new();
        let mut upserted: Vec<Uuid> = Vec::with_capacity(inputs.len());
        let mut broader_refs: Vec<(usize, Option<EntityRef>)> = Vec::with_capacity(inputs.len());
        let now = Utc::now();

        for input in inputs {
            let index = self
                .place_code(caller, &registry, &scheme, &mut working, &input, now)
                .await?;
            let id = working.codes[index].id;

            let assignment = sequencer.assign(id, input.order)?;
            working.codes[index].order = assignment.order;
            if let Some((shifted_id, order)) = assignment.shifted {
                if let Some(&shifted) = working.by_id.get(&shifted_id) {
                    debug!(code = %working.codes[shifted].code_value, order, "Shifted code to a fresh order");
                    working.codes[shifted].order = order;
                    working.codes[shifted].modified = now;
                    touched.insert(shifted_id);
                }
            }

            touched.insert(id);
            upserted.push(id);
            broader_refs.push((index, input.broader_code));
        }

        for (index, reference) in broader_refs {
            let broader = match reference {
                Some(reference) => Some(self.resolve_broader(&scheme, &working, index, &reference).await?),
                None => None,
            };
            working.codes[index].broader_code_id = broader;
        }

        let graph = BroaderGraph::from_codes(&working.codes)?;
        let levels = self.resolver.validate(&graph)?;
        for code in &mut working.codes {
            let level = levels.get(&code.key()).copied().unwrap_or(1);
            if code.hierarchy_level != level {
                code.hierarchy_level = level;
                touched.insert(code.id);
            }
        }

        ensure_unique(
            &format!("code scheme '{}'", scheme.code_value),
            working.codes.iter().map(|c| c.order),
        )?;
        self.check_cumulative(&scheme, &working).await?;

        let changes = ChangeSet {
            codes: working
                .codes
                .iter()
                .filter(|c| touched.contains(&c.id))
                .cloned()
                .collect(),
            ..Default::default()
        };
        self.store.commit(&changes).await?;
        info!(
            registry = %registry.code_value,
            scheme = %scheme.code_value,
            upserted = upserted.len(),
            written = changes.codes.len(),
            "Upserted codes"
        );

        let written: Vec<Uuid> = touched.into_iter().collect();
        let warnings = self.indexer.index_entities(DocumentType::Code, &written).await;
        let value = upserted
            .iter()
            .filter_map(|id| working.by_id.get(id).map(|&i| working.codes[i].clone()))
            .collect();
        Ok(MutationResult::new(value, warnings))
    }

    /// Finds or creates the working copy of a code and patches it from input.
    async fn place_code(
        &self,
        caller: &dyn AuthorizationPolicy,
        registry: &CodeRegistry,
        scheme: &CodeScheme,
        working: &mut WorkingSet,
        input: &CodeInput,
        now: chrono::DateTime<Utc>,
    ) -> StorageResult<usize> {
        let key = natural_key(&input.code_value);
        let found = match input.id {
            Some(id) => match working.by_id.get(&id) {
                Some(&index) => {
                    if working.codes[index].key() != key {
                        return Err(ValidationError::Mismatch {
                            entity: "code",
                            message: format!(
                                "id {} belongs to code '{}', not '{}'",
                                id, working.codes[index].code_value, input.code_value
                            ),
                        }
                        .into());
                    }
                    Some(index)
                }
                None => {
                    if let Some(other) = self.store.find_code_by_id(id).await? {
                        return Err(ValidationError::Mismatch {
                            entity: "code",
                            message: format!(
                                "id {} belongs to code '{}' of another code scheme",
                                id, other.code_value
                            ),
                        }
                        .into());
                    }
                    if working.by_key.contains_key(&key) {
                        return Err(ValidationError::Mismatch {
                            entity: "code",
                            message: format!("code '{}' already exists with another id", input.code_value),
                        }
                        .into());
                    }
                    None
                }
            },
            None => working.by_key.get(&key).copied(),
        };

        let uri = self
            .uris
            .code(&registry.code_value, &scheme.code_value, &input.code_value);
        let index = match found {
            Some(index) => {
                let code = &mut working.codes[index];
                if let Some(status) = input.status {
                    Self::guard_status_change(code.status, status, caller.is_superuser())?;
                    code.status = status;
                }
                code.code_value = input.code_value.clone();
                code.uri = uri;
                code.modified = now;
                index
            }
            None => working.push(Code {
                id: input.id.unwrap_or_else(Uuid::new_v4),
                code_scheme_id: scheme.id,
                code_value: input.code_value.clone(),
                uri,
                order: 0,
                hierarchy_level: 1,
                broader_code_id: None,
                status: input.status.unwrap_or(Status::Draft),
                short_name: None,
                start_date: None,
                end_date: None,
                pref_label: Default::default(),
                description: Default::default(),
                definition: Default::default(),
                created: now,
                modified: now,
            }),
        };

        let code = &mut working.codes[index];
        code.short_name = input.short_name.clone();
        code.start_date = input.start_date;
        code.end_date = input.end_date;
        code.pref_label = input.pref_label.clone();
        code.description = input.description.clone();
        code.definition = input.definition.clone();
        Ok(index)
    }

    async fn resolve_broader(
        &self,
        scheme: &CodeScheme,
        working: &WorkingSet,
        index: usize,
        reference: &EntityRef,
    ) -> StorageResult<Uuid> {
        let code = &working.codes[index];
        if let Some(target) = working.find(reference) {
            if target == index {
                return Err(ValidationError::SelfReferencingBroaderCode {
                    code_value: code.code_value.clone(),
                }
                .into());
            }
            return Ok(working.codes[target].id);
        }

        let foreign = match reference.id {
            Some(id) => self
                .store
                .find_code_by_id(id)
                .await?
                .is_some_and(|other| other.code_scheme_id != scheme.id),
            None => reference
                .uri
                .as_deref()
                .is_some_and(|uri| !uri.starts_with(&format!("{}/", scheme.uri))),
        };
        if foreign {
            return Err(ValidationError::CrossSchemeBroaderCode {
                code_value: code.code_value.clone(),
            }
            .into());
        }
        Err(ValidationError::BroaderCodeNotFound {
            code_value: code.code_value.clone(),
            broader: reference.describe(),
        }
        .into())
    }

    /// Fails if the scheme and its previous version are cumulative and a code
    /// of the previous version is missing from the working set.
    async fn check_cumulative(&self, scheme: &CodeScheme, working: &WorkingSet) -> StorageResult<()> {
        let Some(previous) = self.cumulative_previous(scheme).await? else {
            return Ok(());
        };
        let mut missing: Vec<String> = self
            .store
            .find_codes_by_scheme(previous.id)
            .await?
            .into_iter()
            .filter(|code| !working.by_key.contains_key(&code.key()))
            .map(|code| code.code_value)
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        missing.sort();
        Err(ValidationError::MissingCumulativeCodes { code_values: missing }.into())
    }

    async fn cumulative_previous(&self, scheme: &CodeScheme) -> StorageResult<Option<CodeScheme>> {
        if !scheme.cumulative {
            return Ok(None);
        }
        let Some(prev_id) = scheme.prev_codescheme_id else {
            return Ok(None);
        };
        Ok(self
            .store
            .find_scheme_by_id(prev_id)
            .await?
            .filter(|previous| previous.cumulative))
    }

    /// Returns true if a code value exists in any previous version of a
    /// cumulative lineage.
    async fn exists_in_cumulative_lineage(&self, scheme: &CodeScheme, key: &str) -> StorageResult<bool> {
        if self.cumulative_previous(scheme).await?.is_none() {
            return Ok(false);
        }
        let mut visited = HashSet::from([scheme.id]);
        let mut next = scheme.prev_codescheme_id;
        while let Some(id) = next {
            if !visited.insert(id) {
                break;
            }
            let Some(previous) = self.store.find_scheme_by_id(id).await? else {
                break;
            };
            let codes = self.store.find_codes_by_scheme(previous.id).await?;
            if codes.iter().any(|code| code.key() == key) {
                return Ok(true);
            }
            next = previous.prev_codescheme_id;
        }
        Ok(false)
    }

    /// Deletes one code.
    ///
    /// Refused for codes of a cumulative lineage, for the scheme's default
    /// code and for codes used by members of other schemes' extensions.
    /// Members of the scheme's own extensions go with the code, and every
    /// descendant loses its broader code and becomes a root.
    pub async fn delete_code(
        &self,
        caller: &dyn AuthorizationPolicy,
        registry: &str,
        scheme: &str,
        code: &str,
    ) -> StorageResult<MutationResult<Code>> {
        let (registry, scheme) = self.scheme(registry, scheme).await?;
        Self::require_registry_access(caller, &registry, "delete code")?;

        let _guard = self.locks.lock(scheme.id).await;
        let codes = self.store.find_codes_by_scheme(scheme.id).await?;
        let key = natural_key(code);
        let target = codes
            .iter()
            .find(|c| c.key() == key)
            .cloned()
            .ok_or_else(|| ResourceError::not_found("code", format!("{}/{}/{}", registry.code_value, scheme.code_value, code)))?;

        if self.exists_in_cumulative_lineage(&scheme, &key).await? {
            return Err(ValidationError::UndeletableCode {
                code_value: target.code_value.clone(),
                reason: "it exists in a previous version of a cumulative code scheme".to_string(),
            }
            .into());
        }
        if scheme.default_code_id == Some(target.id) {
            return Err(ValidationError::UndeletableCode {
                code_value: target.code_value.clone(),
                reason: "it is the default code of the code scheme".to_string(),
            }
            .into());
        }

        let members = self.store.find_members_by_code_id(target.id).await?;
        let mut extensions: HashMap<Uuid, Option<Extension>> = HashMap::new();
        let mut own_members = Vec::new();
        let mut foreign_uris = Vec::new();
        for member in members {
            if !extensions.contains_key(&member.extension_id) {
                let extension = self.store.find_extension_by_id(member.extension_id).await?;
                extensions.insert(member.extension_id, extension);
            }
            match extensions.get(&member.extension_id).and_then(Option::as_ref) {
                Some(extension) if extension.parent_code_scheme_id == scheme.id => own_members.push(member.id),
                _ => foreign_uris.push(member.uri),
            }
        }
        if !foreign_uris.is_empty() {
            foreign_uris.sort();
            return Err(ValidationError::UndeletableCode {
                code_value: target.code_value.clone(),
                reason: format!("it is in use by members {}", foreign_uris.join(", ")),
            }
            .into());
        }

        let now = Utc::now();
        let flattened = flatten_descendants(&codes, target.id, now);

        let deleted: HashSet<Uuid> = own_members.iter().copied().collect();
        let mut referrers = Vec::new();
        for member_id in &own_members {
            for mut referrer in self.store.find_members_by_related_member_id(*member_id).await? {
                if !deleted.contains(&referrer.id) {
                    referrer.related_member_id = None;
                    referrer.modified = now;
                    referrers.push(referrer);
                }
            }
        }

        let changes = ChangeSet {
            codes: flattened,
            deleted_codes: vec![target.id],
            members: referrers,
            deleted_members: own_members,
            ..Default::default()
        };
        self.store.commit(&changes).await?;
        info!(
            registry = %registry.code_value,
            scheme = %scheme.code_value,
            code = %target.code_value,
            flattened = changes.codes.len(),
            members = changes.deleted_members.len(),
            "Deleted code"
        );

        let mut warnings = self
            .indexer
            .remove_entities(DocumentType::Code, &[target.id], None)
            .await;
        warnings.extend(
            self.indexer
                .remove_entities(DocumentType::Member, &changes.deleted_members, None)
                .await,
        );
        let flattened_ids: Vec<Uuid> = changes.codes.iter().map(|c| c.id).collect();
        warnings.extend(self.indexer.index_entities(DocumentType::Code, &flattened_ids).await);
        let referrer_ids: Vec<Uuid> = changes.members.iter().map(|m| m.id).collect();
        warnings.extend(self.indexer.index_entities(DocumentType::Member, &referrer_ids).await);

        Ok(MutationResult::new(target, warnings))
    }

    /// Moves every code of a scheme in status `from` to status `to`.
    pub async fn mass_change_statuses(
        &self,
        caller: &dyn AuthorizationPolicy,
        registry: &str,
        scheme: &str,
        from: Status,
        to: Status,
    ) -> StorageResult<MutationResult<Vec<Code>>> {
        let (registry, scheme) = self.scheme(registry, scheme).await?;
        Self::require_registry_access(caller, &registry, "change code statuses")?;
        Self::guard_status_change(from, to, caller.is_superuser())?;

        let _guard = self.locks.lock(scheme.id).await;
        let now = Utc::now();
        let changed: Vec<Code> = self
            .store
            .find_codes_by_scheme(scheme.id)
            .await?
            .into_iter()
            .filter(|code| code.status == from)
            .map(|mut code| {
                code.status = to;
                code.modified = now;
                code
            })
            .collect();

        let changes = ChangeSet {
            codes: changed,
            ..Default::default()
        };
        self.store.commit(&changes).await?;
        info!(
            scheme = %scheme.code_value,
            from = %from,
            to = %to,
            codes = changes.codes.len(),
            "Changed code statuses"
        );

        let ids: Vec<Uuid> = changes.codes.iter().map(|c| c.id).collect();
        let warnings = self.indexer.index_entities(DocumentType::Code, &ids).await;
        Ok(MutationResult::new(changes.codes, warnings))
    }
}

/// Clears the broader code of every descendant of `root` and resets it to
/// level 1. Returns the changed codes.
fn flatten_descendants(codes: &[Code], root: Uuid, now: chrono::DateTime<Utc>) -> Vec<Code> {
    let mut children: HashMap<Uuid, Vec<&Code>> = HashMap::new();
    for code in codes {
        if let Some(parent) = code.broader_code_id {
            children.entry(parent).or_default().push(code);
        }
    }

    let mut flattened = Vec::new();
    let mut visited = HashSet::from([root]);
    let mut queue = VecDeque::from([root]);
    while let Some(parent) = queue.pop_front() {
        for child in children.get(&parent).map(Vec::as_slice).unwrap_or(&[]) {
            if !visited.insert(child.id) {
                continue;
            }
            queue.push_back(child.id);
            let mut code = (*child).clone();
            code.broader_code_id = None;
            code.hierarchy_level = 1;
            code.modified = now;
            flattened.push(code);
        }
    }
    flattened
}
