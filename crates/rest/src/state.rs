//! Application state for the code list API.
//!
//! Handlers share the mutation service, the server configuration, the
//! resolved credentials and the flag that keeps admin reindexing single-flight.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use codelist_persistence::{CodeListService, CodeListStore};

use crate::config::ServerConfig;
use crate::extractors::Credentials;

/// Shared application state for the REST API.
///
/// # Example
///
/// ```rust,ignore
/// use codelist_rest::{AppState, ServerConfig};
/// use codelist_persistence::backends::sqlite::SqliteBackend;
/// use codelist_persistence::search::InMemoryIndexClient;
/// use codelist_persistence::{CodeListService, ServiceConfig};
/// use std::sync::Arc;
///
/// let store = Arc::new(SqliteBackend::in_memory()?);
/// let service = CodeListService::new(store, Arc::new(InMemoryIndexClient::new()), ServiceConfig::default());
/// let state = AppState::new(Arc::new(service), ServerConfig::default());
/// ```
pub struct AppState<S: CodeListStore> {
    service: Arc<CodeListService<S>>,
    config: Arc<ServerConfig>,
    credentials: Arc<Credentials>,
    reindex_running: Arc<AtomicBool>,
}

// S sits behind an Arc and doesn't need to be Clone
impl<S: CodeListStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            config: Arc::clone(&self.config),
            credentials: Arc::clone(&self.credentials),
            reindex_running: Arc::clone(&self.reindex_running),
        }
    }
}

impl<S: CodeListStore> AppState<S> {
    /// Creates the state. Credentials are resolved from the configuration.
    pub fn new(service: Arc<CodeListService<S>>, config: ServerConfig) -> Self {
        let credentials = Credentials::from_config(&config);
        Self {
            service,
            config: Arc::new(config),
            credentials: Arc::new(credentials),
            reindex_running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns the mutation service.
    pub fn service(&self) -> &CodeListService<S> {
        &self.service
    }

    /// Returns a clone of the service Arc.
    pub fn service_arc(&self) -> Arc<CodeListService<S>> {
        Arc::clone(&self.service)
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the token table.
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Claims the admin reindex slot. Returns `None` while another reindex runs.
    pub fn try_begin_reindex(&self) -> Option<ReindexPermit> {
        self.reindex_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ReindexPermit {
                flag: Arc::clone(&self.reindex_running),
            })
    }

    /// Returns true while an admin reindex runs.
    pub fn is_reindexing(&self) -> bool {
        self.reindex_running.load(Ordering::Acquire)
    }
}

/// Held for the duration of an admin reindex. Releases the slot on drop.
#[derive(Debug)]
pub struct ReindexPermit {
    flag: Arc<AtomicBool>,
}

impl Drop for ReindexPermit {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codelist_persistence::ServiceConfig;
    use codelist_persistence::backends::sqlite::SqliteBackend;
    use codelist_persistence::search::InMemoryIndexClient;

    fn create_state() -> AppState<SqliteBackend> {
        let store = Arc::new(SqliteBackend::in_memory().expect("in-memory sqlite"));
        let service = CodeListService::new(
            store,
            Arc::new(InMemoryIndexClient::new()),
            ServiceConfig::default(),
        );
        AppState::new(Arc::new(service), ServerConfig::for_testing())
    }

    #[test]
    fn test_app_state_config_access() {
        let state = create_state();
        assert_eq!(state.config().database_path, ":memory:");
        assert!(
            state
                .credentials()
                .resolve(Some("test-admin-token"))
                .policy()
                .is_superuser()
        );
    }

    #[test]
    fn test_reindex_permit_is_single_flight() {
        let state = create_state();
        let cloned = state.clone();

        let permit = state.try_begin_reindex().expect("first permit");
        assert!(cloned.is_reindexing());
        assert!(cloned.try_begin_reindex().is_none());

        drop(permit);
        assert!(!state.is_reindexing());
        assert!(cloned.try_begin_reindex().is_some());
    }
}
