//! HTTP request handlers.
//!
//! - [`health`] - Health, liveness and readiness probes
//! - [`admin`] - Search index rebuilds (superuser only)
//! - [`registry`] - Registry and scheme upserts
//! - [`codes`] - Code batch upserts, deletion and status changes
//! - [`extensions`] - Extension and member upserts and deletion

pub mod admin;
pub mod codes;
pub mod extensions;
pub mod health;
pub mod registry;

// Re-export handlers for convenience
pub use admin::{reindex_all_handler, reindex_scheme_handler, reindex_type_handler};
pub use codes::{
    change_code_statuses_handler, delete_code_handler, list_codes_handler, upsert_codes_handler,
};
pub use extensions::{
    delete_member_handler, list_extensions_handler, list_members_handler,
    upsert_extension_handler, upsert_members_handler,
};
pub use health::health_handler;
pub use registry::{upsert_registry_handler, upsert_scheme_handler};

use crate::error::{RestError, RestResult};

/// Fills an omitted body code value from the path, or rejects a body that
/// names another record.
fn bind_code_value(body: &mut String, path: &str, entity: &str) -> RestResult<()> {
    if body.trim().is_empty() {
        *body = path.to_string();
        return Ok(());
    }
    if !body.eq_ignore_ascii_case(path) {
        return Err(RestError::bad_request(format!(
            "{} code value '{}' in the body does not match '{}' in the path",
            entity, body, path
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_code_value() {
        let mut empty = String::new();
        bind_code_value(&mut empty, "jhs", "code registry").unwrap();
        assert_eq!(empty, "jhs");

        let mut same = "JHS".to_string();
        bind_code_value(&mut same, "jhs", "code registry").unwrap();
        assert_eq!(same, "JHS");

        let mut other = "other".to_string();
        assert!(bind_code_value(&mut other, "jhs", "code registry").is_err());
    }
}
