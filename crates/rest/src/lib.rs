//! # codelist-rest - HTTP API for code list maintenance
//!
//! This crate exposes the mutation services of `codelist-persistence` over
//! HTTP, together with the admin endpoints that rebuild the search index.
//!
//! ## Features
//!
//! - **Batch upserts**: codes and members are validated as a whole batch
//!   before anything is written
//! - **Hierarchy integrity**: cyclic, cross-scheme and over-deep broader-code
//!   chains are rejected with 406
//! - **Search index administration**: full, per-scheme and per-type rebuilds,
//!   one at a time
//! - **Bearer token callers**: superusers and per-registry editors
//!
//! ## Backend Support
//!
//! - `sqlite` - SQLite relational store (default)
//! - `elasticsearch` - Elasticsearch search index
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use codelist_rest::{create_app_with_config, ServerConfig};
//! use codelist_persistence::backends::sqlite::SqliteBackend;
//! use codelist_persistence::search::InMemoryIndexClient;
//! use codelist_persistence::CodeListService;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::default();
//!     let store = Arc::new(SqliteBackend::in_memory()?);
//!     let service = CodeListService::new(
//!         store,
//!         Arc::new(InMemoryIndexClient::new()),
//!         config.service_config(),
//!     );
//!
//!     let app = create_app_with_config(Arc::new(service), config);
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## API Endpoints
//!
//! | Operation | HTTP Method | URL Pattern |
//! |-----------|-------------|-------------|
//! | upsert registry | PUT | `/coderegistries/{registry}` |
//! | upsert scheme | PUT | `/coderegistries/{registry}/codeschemes/{scheme}` |
//! | list / upsert codes | GET / POST | `.../codeschemes/{scheme}/codes` |
//! | mass status change | POST | `.../codeschemes/{scheme}/codes/status` |
//! | delete code | DELETE | `.../codeschemes/{scheme}/codes/{code}` |
//! | list / upsert extensions | GET / POST | `.../codeschemes/{scheme}/extensions` |
//! | list / upsert members | GET / POST | `.../extensions/{extension}/members` |
//! | delete member | DELETE | `.../extensions/{extension}/members/{member_id}` |
//! | reindex everything | POST | `/admin/reindex` |
//! | reindex scheme | POST | `/admin/reindex/coderegistries/{registry}/codeschemes/{scheme}` |
//! | reindex entity type | POST | `/admin/reindex/types/{entity_type}` |
//!
//! Successful mutations answer `{"value": ..., "warnings": [...]}`. Warnings
//! report search index synchronization problems; the mutation itself was
//! committed.
//!
//! ## Architecture
//!
//! - [`error`] - Error types and status mapping
//! - [`config`] - Server configuration
//! - [`state`] - Application state (service, configuration, reindex slot)
//! - [`extractors`] - Bearer token caller resolution
//! - [`handlers`] - HTTP request handlers
//! - [`routing`] - Route configuration

// Enforce documentation
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod routing;
pub mod state;

// Re-export commonly used types
pub use config::{IndexBackendMode, ServerConfig};
pub use error::{RestError, RestResult};
pub use extractors::Caller;
pub use state::AppState;

use std::sync::Arc;

use axum::Router;
use codelist_persistence::{Backend, CodeListService, CodeListStore};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

/// Creates the Axum application with default configuration.
///
/// For more control, use [`create_app_with_config`].
pub fn create_app<S>(service: Arc<CodeListService<S>>) -> Router
where
    S: CodeListStore + Backend,
{
    create_app_with_config(service, ServerConfig::default())
}

/// Creates the Axum application with custom configuration.
pub fn create_app_with_config<S>(service: Arc<CodeListService<S>>, config: ServerConfig) -> Router
where
    S: CodeListStore + Backend,
{
    info!(
        backend = service.store().name(),
        index = service.indexer().client().client_name(),
        "Creating code list API server"
    );

    let state = AppState::new(service, config.clone());
    let router = routing::create_routes(state);

    let service_builder = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(
            axum::http::StatusCode::REQUEST_TIMEOUT,
            std::time::Duration::from_secs(config.request_timeout),
        ));

    let router = if config.enable_cors {
        router.layer(build_cors_layer(&config))
    } else {
        router
    };

    router.layer(service_builder)
}

/// Builds the CORS layer based on configuration.
fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let mut cors = CorsLayer::new();

    if config.cors_origins == "*" {
        cors = cors.allow_origin(Any);
    } else {
        let origins: Vec<_> = config
            .cors_origins
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        cors = cors.allow_origin(origins);
    }

    if config.cors_methods == "*" {
        cors = cors.allow_methods(Any);
    } else {
        let methods: Vec<_> = config
            .cors_methods
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        cors = cors.allow_methods(methods);
    }

    if config.cors_headers == "*" {
        cors = cors.allow_headers(Any);
    } else {
        let headers: Vec<_> = config
            .cors_headers
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        cors = cors.allow_headers(headers);
    }

    cors
}

/// Initializes the tracing subscriber for logging.
///
/// Call once at startup. `RUST_LOG` overrides `level` when set.
pub fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "codelist_rest={level},codelist_persistence={level},tower_http=debug"
        ))
    });

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}
