//! Repository, change set and document source implementations for SQLite.

use std::collections::HashMap;

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::core::{
    ChangeSet, ChangeSetWriter, CodeRepository, ExtensionRepository, RegistryRepository,
    SchemeRepository,
};
use crate::error::{BackendError, StorageError, StorageResult};
use crate::model::{Code, CodeRegistry, CodeScheme, Extension, Member, natural_key};
use crate::search::{DocumentSource, DocumentType, IndexDocument, RegistryKey, SchemeKey, SourceScope};

use super::SqliteBackend;

fn decode<T: DeserializeOwned>(data: &str) -> StorageResult<T> {
    Ok(serde_json::from_str(data)?)
}

fn parse_id(value: &str) -> StorageResult<Uuid> {
    Uuid::parse_str(value).map_err(|e| {
        StorageError::Backend(BackendError::SerializationError {
            message: format!("invalid id '{}': {}", value, e),
        })
    })
}

fn query_all<T: DeserializeOwned, P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> StorageResult<Vec<T>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let rows = stmt.query_map(params, |row| row.get::<_, String>(0))?;
    let mut records = Vec::new();
    for row in rows {
        records.push(decode(&row?)?);
    }
    Ok(records)
}

fn query_one<T: DeserializeOwned, P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> StorageResult<Option<T>> {
    let data: Option<String> = conn
        .prepare_cached(sql)?
        .query_row(params, |row| row.get(0))
        .optional()?;
    data.as_deref().map(decode).transpose()
}

fn query_ids<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> StorageResult<Vec<Uuid>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let rows = stmt.query_map(params, |row| row.get::<_, String>(0))?;
    let mut ids = Vec::new();
    for row in rows {
        ids.push(parse_id(&row?)?);
    }
    Ok(ids)
}

fn load_by_id<T: DeserializeOwned>(conn: &Connection, table: &str, id: Uuid) -> StorageResult<Option<T>> {
    query_one(
        conn,
        &format!("SELECT data FROM {} WHERE id = ?1", table),
        [id.to_string()],
    )
}

fn delete_by_ids(conn: &Connection, table: &str, ids: &[Uuid]) -> StorageResult<()> {
    let mut stmt = conn.prepare_cached(&format!("DELETE FROM {} WHERE id = ?1", table))?;
    for id in ids {
        stmt.execute([id.to_string()])?;
    }
    Ok(())
}

fn write_code(conn: &Connection, code: &Code) -> StorageResult<()> {
    conn.prepare_cached(
        "INSERT INTO codes (id, scheme_id, code_key, broader_code_id, sort_order, data)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(id) DO UPDATE SET
            scheme_id = excluded.scheme_id,
            code_key = excluded.code_key,
            broader_code_id = excluded.broader_code_id,
            sort_order = excluded.sort_order,
            data = excluded.data",
    )?
    .execute(params![
        code.id.to_string(),
        code.code_scheme_id.to_string(),
        code.key(),
        code.broader_code_id.map(|id| id.to_string()),
        code.order,
        serde_json::to_string(code)?,
    ])?;
    Ok(())
}

fn write_extension(conn: &Connection, extension: &Extension) -> StorageResult<()> {
    conn.prepare_cached(
        "INSERT INTO extensions (id, scheme_id, code_key, data)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET
            scheme_id = excluded.scheme_id,
            code_key = excluded.code_key,
            data = excluded.data",
    )?
    .execute(params![
        extension.id.to_string(),
        extension.parent_code_scheme_id.to_string(),
        natural_key(&extension.code_value),
        serde_json::to_string(extension)?,
    ])?;
    Ok(())
}

fn write_member(conn: &Connection, member: &Member) -> StorageResult<()> {
    conn.prepare_cached(
        "INSERT INTO members (id, extension_id, code_id, related_member_id, sort_order, data)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(id) DO UPDATE SET
            extension_id = excluded.extension_id,
            code_id = excluded.code_id,
            related_member_id = excluded.related_member_id,
            sort_order = excluded.sort_order,
            data = excluded.data",
    )?
    .execute(params![
        member.id.to_string(),
        member.extension_id.to_string(),
        member.code_id.to_string(),
        member.related_member_id.map(|id| id.to_string()),
        member.order,
        serde_json::to_string(member)?,
    ])?;
    Ok(())
}

#[async_trait]
impl RegistryRepository for SqliteBackend {
    async fn find_all_registries(&self) -> StorageResult<Vec<CodeRegistry>> {
        let conn = self.get_connection()?;
        query_all(&conn, "SELECT data FROM registries ORDER BY code_key", [])
    }

    async fn find_registry(&self, code_value: &str) -> StorageResult<Option<CodeRegistry>> {
        let conn = self.get_connection()?;
        query_one(
            &conn,
            "SELECT data FROM registries WHERE code_key = ?1",
            [natural_key(code_value)],
        )
    }

    async fn find_registry_by_id(&self, id: Uuid) -> StorageResult<Option<CodeRegistry>> {
        let conn = self.get_connection()?;
        load_by_id(&conn, "registries", id)
    }

    async fn save_registry(&self, registry: &CodeRegistry) -> StorageResult<()> {
        let conn = self.get_connection()?;
        conn.execute(
            "INSERT INTO registries (id, code_key, data) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET code_key = excluded.code_key, data = excluded.data",
            params![
                registry.id.to_string(),
                natural_key(&registry.code_value),
                serde_json::to_string(registry)?,
            ],
        )?;
        tracing::debug!(registry = %registry.code_value, "Saved code registry");
        Ok(())
    }

    async fn delete_registry(&self, id: Uuid) -> StorageResult<()> {
        let conn = self.get_connection()?;
        conn.execute("DELETE FROM registries WHERE id = ?1", [id.to_string()])?;
        Ok(())
    }
}

#[async_trait]
impl SchemeRepository for SqliteBackend {
    async fn find_all_schemes(&self) -> StorageResult<Vec<CodeScheme>> {
        let conn = self.get_connection()?;
        query_all(&conn, "SELECT data FROM schemes ORDER BY registry_id, code_key", [])
    }

    async fn find_schemes_by_registry(&self, registry_id: Uuid) -> StorageResult<Vec<CodeScheme>> {
        let conn = self.get_connection()?;
        query_all(
            &conn,
            "SELECT data FROM schemes WHERE registry_id = ?1 ORDER BY code_key",
            [registry_id.to_string()],
        )
    }

    async fn find_scheme_by_id(&self, id: Uuid) -> StorageResult<Option<CodeScheme>> {
        let conn = self.get_connection()?;
        load_by_id(&conn, "schemes", id)
    }

    async fn find_scheme(
        &self,
        registry_id: Uuid,
        code_value: &str,
    ) -> StorageResult<Option<CodeScheme>> {
        let conn = self.get_connection()?;
        query_one(
            &conn,
            "SELECT data FROM schemes WHERE registry_id = ?1 AND code_key = ?2",
            params![registry_id.to_string(), natural_key(code_value)],
        )
    }

    async fn find_scheme_by_uri(&self, uri: &str) -> StorageResult<Option<CodeScheme>> {
        let conn = self.get_connection()?;
        query_one(&conn, "SELECT data FROM schemes WHERE uri = ?1", [uri])
    }

    async fn save_scheme(&self, scheme: &CodeScheme) -> StorageResult<()> {
        let conn = self.get_connection()?;
        conn.execute(
            "INSERT INTO schemes (id, registry_id, code_key, uri, data) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                registry_id = excluded.registry_id,
                code_key = excluded.code_key,
                uri = excluded.uri,
                data = excluded.data",
            params![
                scheme.id.to_string(),
                scheme.code_registry_id.to_string(),
                natural_key(&scheme.code_value),
                scheme.uri,
                serde_json::to_string(scheme)?,
            ],
        )?;
        tracing::debug!(scheme = %scheme.code_value, "Saved code scheme");
        Ok(())
    }

    async fn delete_scheme(&self, id: Uuid) -> StorageResult<()> {
        let conn = self.get_connection()?;
        conn.execute("DELETE FROM schemes WHERE id = ?1", [id.to_string()])?;
        Ok(())
    }
}

#[async_trait]
impl CodeRepository for SqliteBackend {
    async fn find_all_codes(&self) -> StorageResult<Vec<Code>> {
        let conn = self.get_connection()?;
        query_all(&conn, "SELECT data FROM codes ORDER BY scheme_id, sort_order", [])
    }

    async fn find_code_by_id(&self, id: Uuid) -> StorageResult<Option<Code>> {
        let conn = self.get_connection()?;
        load_by_id(&conn, "codes", id)
    }

    async fn find_codes_by_scheme(&self, scheme_id: Uuid) -> StorageResult<Vec<Code>> {
        let conn = self.get_connection()?;
        query_all(
            &conn,
            "SELECT data FROM codes WHERE scheme_id = ?1 ORDER BY sort_order",
            [scheme_id.to_string()],
        )
    }

    async fn find_codes_by_broader_code_id(&self, broader_code_id: Uuid) -> StorageResult<Vec<Code>> {
        let conn = self.get_connection()?;
        query_all(
            &conn,
            "SELECT data FROM codes WHERE broader_code_id = ?1 ORDER BY sort_order",
            [broader_code_id.to_string()],
        )
    }

    async fn save_codes(&self, codes: &[Code]) -> StorageResult<()> {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        for code in codes {
            write_code(&tx, code)?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn delete_codes(&self, ids: &[Uuid]) -> StorageResult<()> {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        delete_by_ids(&tx, "codes", ids)?;
        tx.commit()?;
        Ok(())
    }

    async fn max_code_order(&self, scheme_id: Uuid) -> StorageResult<Option<i32>> {
        let conn = self.get_connection()?;
        let max = conn.query_row(
            "SELECT MAX(sort_order) FROM codes WHERE scheme_id = ?1",
            [scheme_id.to_string()],
            |row| row.get::<_, Option<i32>>(0),
        )?;
        Ok(max)
    }
}

#[async_trait]
impl ExtensionRepository for SqliteBackend {
    async fn find_extensions_by_scheme(&self, scheme_id: Uuid) -> StorageResult<Vec<Extension>> {
        let conn = self.get_connection()?;
        query_all(
            &conn,
            "SELECT data FROM extensions WHERE scheme_id = ?1 ORDER BY code_key",
            [scheme_id.to_string()],
        )
    }

    async fn find_extension_by_id(&self, id: Uuid) -> StorageResult<Option<Extension>> {
        let conn = self.get_connection()?;
        load_by_id(&conn, "extensions", id)
    }

    async fn find_extension(
        &self,
        scheme_id: Uuid,
        code_value: &str,
    ) -> StorageResult<Option<Extension>> {
        let conn = self.get_connection()?;
        query_one(
            &conn,
            "SELECT data FROM extensions WHERE scheme_id = ?1 AND code_key = ?2",
            params![scheme_id.to_string(), natural_key(code_value)],
        )
    }

    async fn find_members_by_extension(&self, extension_id: Uuid) -> StorageResult<Vec<Member>> {
        let conn = self.get_connection()?;
        query_all(
            &conn,
            "SELECT data FROM members WHERE extension_id = ?1 ORDER BY sort_order",
            [extension_id.to_string()],
        )
    }

    async fn find_member_by_id(&self, id: Uuid) -> StorageResult<Option<Member>> {
        let conn = self.get_connection()?;
        load_by_id(&conn, "members", id)
    }

    async fn find_members_by_code_id(&self, code_id: Uuid) -> StorageResult<Vec<Member>> {
        let conn = self.get_connection()?;
        query_all(
            &conn,
            "SELECT data FROM members WHERE code_id = ?1 ORDER BY extension_id, sort_order",
            [code_id.to_string()],
        )
    }

    async fn find_members_by_related_member_id(&self, member_id: Uuid) -> StorageResult<Vec<Member>> {
        let conn = self.get_connection()?;
        query_all(
            &conn,
            "SELECT data FROM members WHERE related_member_id = ?1",
            [member_id.to_string()],
        )
    }

    async fn max_member_order(&self, extension_id: Uuid) -> StorageResult<Option<i32>> {
        let conn = self.get_connection()?;
        let max = conn.query_row(
            "SELECT MAX(sort_order) FROM members WHERE extension_id = ?1",
            [extension_id.to_string()],
            |row| row.get::<_, Option<i32>>(0),
        )?;
        Ok(max)
    }
}

#[async_trait]
impl ChangeSetWriter for SqliteBackend {
    async fn commit(&self, changes: &ChangeSet) -> StorageResult<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let mut conn = self.get_connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        delete_by_ids(&tx, "members", &changes.deleted_members)?;
        delete_by_ids(&tx, "codes", &changes.deleted_codes)?;
        for extension in &changes.extensions {
            write_extension(&tx, extension)?;
        }
        for code in &changes.codes {
            write_code(&tx, code)?;
        }
        for member in &changes.members {
            write_member(&tx, member)?;
        }

        tx.commit()?;
        tracing::debug!(
            codes = changes.codes.len(),
            deleted_codes = changes.deleted_codes.len(),
            extensions = changes.extensions.len(),
            members = changes.members.len(),
            deleted_members = changes.deleted_members.len(),
            "Committed change set"
        );
        Ok(())
    }
}

/// Id query for a document type within a scope, plus its optional parameter.
fn id_query(document_type: DocumentType, scope: SourceScope) -> (&'static str, Option<Uuid>) {
    use DocumentType as T;
    use SourceScope as S;

    match (document_type, scope) {
        (T::Registry, S::All) => ("SELECT id FROM registries ORDER BY code_key", None),
        (T::Registry, S::Registry(id)) => ("SELECT id FROM registries WHERE id = ?1", Some(id)),
        (T::Registry, S::Scheme(id)) => ("SELECT registry_id FROM schemes WHERE id = ?1", Some(id)),

        (T::Scheme, S::All) => ("SELECT id FROM schemes ORDER BY registry_id, code_key", None),
        (T::Scheme, S::Registry(id)) => (
            "SELECT id FROM schemes WHERE registry_id = ?1 ORDER BY code_key",
            Some(id),
        ),
        (T::Scheme, S::Scheme(id)) => ("SELECT id FROM schemes WHERE id = ?1", Some(id)),

        (T::Code, S::All) => ("SELECT id FROM codes ORDER BY scheme_id, sort_order", None),
        (T::Code, S::Registry(id)) => (
            "SELECT c.id FROM codes c JOIN schemes s ON c.scheme_id = s.id
             WHERE s.registry_id = ?1 ORDER BY c.scheme_id, c.sort_order",
            Some(id),
        ),
        (T::Code, S::Scheme(id)) => (
            "SELECT id FROM codes WHERE scheme_id = ?1 ORDER BY sort_order",
            Some(id),
        ),

        (T::Extension, S::All) => ("SELECT id FROM extensions ORDER BY scheme_id, code_key", None),
        (T::Extension, S::Registry(id)) => (
            "SELECT e.id FROM extensions e JOIN schemes s ON e.scheme_id = s.id
             WHERE s.registry_id = ?1 ORDER BY e.scheme_id, e.code_key",
            Some(id),
        ),
        (T::Extension, S::Scheme(id)) => (
            "SELECT id FROM extensions WHERE scheme_id = ?1 ORDER BY code_key",
            Some(id),
        ),

        (T::Member, S::All) => ("SELECT id FROM members ORDER BY extension_id, sort_order", None),
        (T::Member, S::Registry(id)) => (
            "SELECT m.id FROM members m
             JOIN extensions e ON m.extension_id = e.id
             JOIN schemes s ON e.scheme_id = s.id
             WHERE s.registry_id = ?1 ORDER BY m.extension_id, m.sort_order",
            Some(id),
        ),
        (T::Member, S::Scheme(id)) => (
            "SELECT m.id FROM members m JOIN extensions e ON m.extension_id = e.id
             WHERE e.scheme_id = ?1 ORDER BY m.extension_id, m.sort_order",
            Some(id),
        ),
    }
}

/// Loads every record of `table` whose id is in `ids` with a single query.
fn load_many<T: DeserializeOwned>(
    conn: &Connection,
    table: &str,
    ids: impl IntoIterator<Item = Uuid>,
) -> StorageResult<HashMap<Uuid, T>> {
    let ids: Vec<String> = ids.into_iter().map(|id| id.to_string()).collect();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT id, data FROM {} WHERE id IN (SELECT value FROM json_each(?1))",
        table
    ))?;
    let rows = stmt.query_map([serde_json::to_string(&ids)?], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    let mut records = HashMap::with_capacity(ids.len());
    for row in rows {
        let (id, data) = row?;
        records.insert(parse_id(&id)?, decode(&data)?);
    }
    Ok(records)
}

/// Projects loaded records into documents in the order of `ids`, skipping
/// entities that vanished or lost their parent.
fn project<T>(
    document_type: DocumentType,
    ids: &[Uuid],
    records: &HashMap<Uuid, T>,
    to_document: impl Fn(&T) -> Option<IndexDocument>,
) -> Vec<IndexDocument> {
    let mut documents = Vec::with_capacity(ids.len());
    for id in ids {
        match records.get(id).and_then(&to_document) {
            Some(document) => documents.push(document),
            None => tracing::debug!(document_type = %document_type, %id, "Skipping unresolved entity"),
        }
    }
    documents
}

/// Loads one page of documents: one query for the entities and one per
/// parent table.
fn load_documents(
    conn: &Connection,
    document_type: DocumentType,
    ids: &[Uuid],
) -> StorageResult<Vec<IndexDocument>> {
    let ids_iter = ids.iter().copied();
    let documents = match document_type {
        DocumentType::Registry => {
            let registries: HashMap<Uuid, CodeRegistry> = load_many(conn, "registries", ids_iter)?;
            project(document_type, ids, &registries, |registry| {
                Some(IndexDocument::registry(registry))
            })
        }
        DocumentType::Scheme => {
            let schemes: HashMap<Uuid, CodeScheme> = load_many(conn, "schemes", ids_iter)?;
            let registries: HashMap<Uuid, CodeRegistry> = load_many(
                conn,
                "registries",
                schemes.values().map(|s| s.code_registry_id),
            )?;
            project(document_type, ids, &schemes, |scheme| {
                registries
                    .get(&scheme.code_registry_id)
                    .map(|registry| IndexDocument::scheme(scheme, registry))
            })
        }
        DocumentType::Code => {
            let codes: HashMap<Uuid, Code> = load_many(conn, "codes", ids_iter)?;
            let schemes: HashMap<Uuid, CodeScheme> =
                load_many(conn, "schemes", codes.values().map(|c| c.code_scheme_id))?;
            project(document_type, ids, &codes, |code| {
                schemes
                    .get(&code.code_scheme_id)
                    .map(|scheme| IndexDocument::code(code, scheme))
            })
        }
        DocumentType::Extension => {
            let extensions: HashMap<Uuid, Extension> = load_many(conn, "extensions", ids_iter)?;
            let schemes: HashMap<Uuid, CodeScheme> = load_many(
                conn,
                "schemes",
                extensions.values().map(|e| e.parent_code_scheme_id),
            )?;
            project(document_type, ids, &extensions, |extension| {
                schemes
                    .get(&extension.parent_code_scheme_id)
                    .map(|scheme| IndexDocument::extension(extension, scheme))
            })
        }
        DocumentType::Member => {
            let members: HashMap<Uuid, Member> = load_many(conn, "members", ids_iter)?;
            let extensions: HashMap<Uuid, Extension> =
                load_many(conn, "extensions", members.values().map(|m| m.extension_id))?;
            let codes: HashMap<Uuid, Code> =
                load_many(conn, "codes", members.values().map(|m| m.code_id))?;
            project(document_type, ids, &members, |member| {
                let extension = extensions.get(&member.extension_id)?;
                let code = codes.get(&member.code_id)?;
                Some(IndexDocument::member(member, extension, code))
            })
        }
    };
    Ok(documents)
}

#[async_trait]
impl DocumentSource for SqliteBackend {
    async fn entity_ids(
        &self,
        document_type: DocumentType,
        scope: SourceScope,
    ) -> StorageResult<Vec<Uuid>> {
        let conn = self.get_connection()?;
        let (sql, param) = id_query(document_type, scope);
        match param {
            Some(id) => query_ids(&conn, sql, [id.to_string()]),
            None => query_ids(&conn, sql, []),
        }
    }

    async fn fetch_documents(
        &self,
        document_type: DocumentType,
        ids: &[Uuid],
    ) -> StorageResult<Vec<IndexDocument>> {
        let conn = self.get_connection()?;
        load_documents(&conn, document_type, ids)
    }

    async fn registry_keys(&self) -> StorageResult<Vec<RegistryKey>> {
        let registries = self.find_all_registries().await?;
        Ok(registries
            .into_iter()
            .map(|registry| RegistryKey {
                id: registry.id,
                code_value: registry.code_value,
            })
            .collect())
    }

    async fn scheme_key(&self, registry: &str, scheme: &str) -> StorageResult<Option<SchemeKey>> {
        let Some(registry) = self.find_registry(registry).await? else {
            return Ok(None);
        };
        let scheme = self.find_scheme(registry.id, scheme).await?;
        Ok(scheme.map(|scheme| SchemeKey {
            id: scheme.id,
            code_value: scheme.code_value,
            registry: RegistryKey {
                id: registry.id,
                code_value: registry.code_value,
            },
        }))
    }
}
