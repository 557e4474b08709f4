//! Caller extractor.
//!
//! Resolves the `Authorization: Bearer <token>` header against the configured
//! admin and editor tokens. Requests without a known token are read-only.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};
use codelist_persistence::{AuthorizationPolicy, CodeListStore, ReadOnly, RegistryEditor, Superuser};

use crate::config::ServerConfig;
use crate::error::RestError;
use crate::state::AppState;

/// Token table built from the server configuration.
#[derive(Clone, Default)]
pub struct Credentials {
    admin_token: Option<String>,
    editors: HashMap<String, Vec<String>>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("admin_configured", &self.admin_token.is_some())
            .field("editors", &self.editors.len())
            .finish()
    }
}

impl Credentials {
    /// Builds the table from `admin_token` and `editor_tokens`.
    ///
    /// Malformed editor entries (no `=`, or an empty side) are skipped.
    pub fn from_config(config: &ServerConfig) -> Self {
        let mut editors: HashMap<String, Vec<String>> = HashMap::new();
        for entry in config.editor_tokens.as_deref().unwrap_or_default().split(',') {
            let Some((token, registry)) = entry.split_once('=') else {
                continue;
            };
            let (token, registry) = (token.trim(), registry.trim());
            if token.is_empty() || registry.is_empty() {
                continue;
            }
            editors
                .entry(token.to_string())
                .or_default()
                .push(registry.to_string());
        }

        Self {
            admin_token: config
                .admin_token
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from),
            editors,
        }
    }

    /// Resolves a bearer token to a caller.
    pub fn resolve(&self, token: Option<&str>) -> Caller {
        let Some(token) = token else {
            return Caller::anonymous();
        };
        if self.admin_token.as_deref() == Some(token) {
            return Caller::new(Arc::new(Superuser));
        }
        match self.editors.get(token) {
            Some(registries) => Caller::new(Arc::new(RegistryEditor::new(registries))),
            None => Caller::anonymous(),
        }
    }
}

/// The capabilities of the current request's caller.
#[derive(Debug, Clone)]
pub struct Caller {
    policy: Arc<dyn AuthorizationPolicy>,
    authenticated: bool,
}

impl Caller {
    fn new(policy: Arc<dyn AuthorizationPolicy>) -> Self {
        Self {
            policy,
            authenticated: true,
        }
    }

    /// A caller without credentials.
    pub fn anonymous() -> Self {
        Self {
            policy: Arc::new(ReadOnly),
            authenticated: false,
        }
    }

    /// The policy passed to the mutation services.
    pub fn policy(&self) -> &dyn AuthorizationPolicy {
        self.policy.as_ref()
    }

    /// Returns true if the request carried a known token.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Fails with 401 unless the caller is a superuser.
    pub fn require_superuser(&self) -> Result<(), RestError> {
        if self.policy.is_superuser() {
            Ok(())
        } else {
            Err(RestError::unauthorized("superuser credentials required"))
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            v.strip_prefix("Bearer ")
                .or_else(|| v.strip_prefix("bearer "))
        })
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

impl<S> FromRequestParts<AppState<S>> for Caller
where
    S: CodeListStore,
{
    type Rejection = RestError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState<S>,
    ) -> Result<Self, Self::Rejection> {
        Ok(state.credentials().resolve(bearer_token(&parts.headers)))
    }
}
