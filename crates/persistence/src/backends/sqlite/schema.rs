//! SQLite schema definitions and migrations.

use rusqlite::Connection;

use crate::error::{BackendError, StorageError, StorageResult};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema.
pub fn initialize_schema(conn: &Connection) -> StorageResult<()> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        create_schema_v1(conn)?;
        set_schema_version(conn, 1)?;
        migrate_schema(conn, 1)?;
    } else if current_version < SCHEMA_VERSION {
        migrate_schema(conn, current_version)?;
    } else if current_version > SCHEMA_VERSION {
        return Err(StorageError::Backend(BackendError::MigrationError {
            message: format!(
                "database schema version {} is newer than supported version {}",
                current_version, SCHEMA_VERSION
            ),
        }));
    }

    Ok(())
}

fn internal(message: String) -> StorageError {
    StorageError::Backend(BackendError::Internal {
        backend_name: "sqlite".to_string(),
        message,
        source: None,
    })
}

/// Get the current schema version.
fn get_schema_version(conn: &Connection) -> StorageResult<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER NOT NULL
        )",
        [],
    )
    .map_err(|e| internal(format!("Failed to create schema_version table: {}", e)))?;

    let version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .ok();

    Ok(version.unwrap_or(0))
}

/// Set the schema version.
fn set_schema_version(conn: &Connection, version: i32) -> StorageResult<()> {
    conn.execute("DELETE FROM schema_version", [])
        .map_err(|e| internal(format!("Failed to clear schema_version: {}", e)))?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])
        .map_err(|e| internal(format!("Failed to set schema_version: {}", e)))?;
    Ok(())
}

/// Create the version 1 schema.
///
/// Every table keeps its lookup columns next to the full record as JSON.
/// `*_key` columns hold lowercased code values for case-insensitive lookups.
fn create_schema_v1(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS registries (
            id TEXT PRIMARY KEY,
            code_key TEXT NOT NULL UNIQUE,
            data TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS schemes (
            id TEXT PRIMARY KEY,
            registry_id TEXT NOT NULL REFERENCES registries(id) ON DELETE CASCADE,
            code_key TEXT NOT NULL,
            uri TEXT NOT NULL,
            data TEXT NOT NULL,
            UNIQUE (registry_id, code_key)
        );
        CREATE INDEX IF NOT EXISTS idx_schemes_uri ON schemes(uri);

        CREATE TABLE IF NOT EXISTS codes (
            id TEXT PRIMARY KEY,
            scheme_id TEXT NOT NULL REFERENCES schemes(id) ON DELETE CASCADE,
            code_key TEXT NOT NULL,
            broader_code_id TEXT,
            sort_order INTEGER NOT NULL,
            data TEXT NOT NULL,
            UNIQUE (scheme_id, code_key)
        );
        CREATE INDEX IF NOT EXISTS idx_codes_broader ON codes(broader_code_id);
        CREATE INDEX IF NOT EXISTS idx_codes_order ON codes(scheme_id, sort_order);

        CREATE TABLE IF NOT EXISTS extensions (
            id TEXT PRIMARY KEY,
            scheme_id TEXT NOT NULL REFERENCES schemes(id) ON DELETE CASCADE,
            code_key TEXT NOT NULL,
            data TEXT NOT NULL,
            UNIQUE (scheme_id, code_key)
        );

        CREATE TABLE IF NOT EXISTS members (
            id TEXT PRIMARY KEY,
            extension_id TEXT NOT NULL REFERENCES extensions(id) ON DELETE CASCADE,
            code_id TEXT NOT NULL,
            related_member_id TEXT,
            sort_order INTEGER NOT NULL,
            data TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_members_extension ON members(extension_id, sort_order);
        CREATE INDEX IF NOT EXISTS idx_members_code ON members(code_id);
        CREATE INDEX IF NOT EXISTS idx_members_related ON members(related_member_id);
        "#,
    )
    .map_err(|e| internal(format!("Failed to create schema: {}", e)))?;

    Ok(())
}

/// Run migrations from `from_version` to the current version.
fn migrate_schema(conn: &Connection, from_version: i32) -> StorageResult<()> {
    let mut version = from_version;
    while version < SCHEMA_VERSION {
        // No migrations past version 1 yet.
        version += 1;
        set_schema_version(conn, version)?;
        tracing::info!("Migrated SQLite schema to version {}", version);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_schema() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        for table in ["codes", "extensions", "members", "registries", "schemes"] {
            assert!(tables.contains(&table.to_string()), "missing {}", table);
        }
    }

    #[test]
    fn test_initialize_schema_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        initialize_schema(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_newer_schema_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        set_schema_version(&conn, SCHEMA_VERSION + 1).unwrap();
        assert!(initialize_schema(&conn).is_err());
    }
}
