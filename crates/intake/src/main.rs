//! Code list intake server.
//!
//! Serves hierarchy-checked code list mutations over HTTP and keeps the
//! search index in step with the relational store.

use std::sync::Arc;

use clap::Parser;
use codelist_persistence::CodeListService;
use codelist_persistence::search::{InMemoryIndexClient, SearchIndexClient};
use codelist_rest::{IndexBackendMode, ServerConfig, create_app_with_config, init_logging};
use tracing::{info, warn};

#[cfg(feature = "sqlite")]
use codelist_persistence::backends::sqlite::SqliteBackend;

/// Opens the SQLite database and brings its schema up to date.
#[cfg(feature = "sqlite")]
fn create_sqlite_backend(config: &ServerConfig) -> anyhow::Result<SqliteBackend> {
    info!(database = %config.database_path, "Initializing SQLite backend");
    let backend = SqliteBackend::open(&config.database_path)?;
    backend.init_schema()?;
    Ok(backend)
}

/// Creates the search index client selected by the configuration.
async fn create_index_client(
    config: &ServerConfig,
    mode: IndexBackendMode,
) -> anyhow::Result<Arc<dyn SearchIndexClient>> {
    match mode {
        IndexBackendMode::Memory => {
            warn!("Using the in-memory search index; documents do not survive a restart");
            Ok(Arc::new(InMemoryIndexClient::new()))
        }
        IndexBackendMode::Elasticsearch => create_elasticsearch_client(config).await,
    }
}

#[cfg(feature = "elasticsearch")]
async fn create_elasticsearch_client(
    config: &ServerConfig,
) -> anyhow::Result<Arc<dyn SearchIndexClient>> {
    use codelist_persistence::Backend;
    use codelist_persistence::backends::elasticsearch::{
        ElasticsearchAuth, ElasticsearchBackend, ElasticsearchConfig,
    };

    let auth = match (
        &config.elasticsearch_username,
        &config.elasticsearch_password,
    ) {
        (Some(username), Some(password)) => Some(ElasticsearchAuth::Basic {
            username: username.clone(),
            password: password.clone(),
        }),
        _ => None,
    };

    let es_config = ElasticsearchConfig {
        nodes: config.elasticsearch_node_list(),
        index_prefix: config.index_prefix.clone(),
        auth,
        ..Default::default()
    };

    info!(
        nodes = ?es_config.nodes,
        index_prefix = %es_config.index_prefix,
        "Initializing Elasticsearch index client"
    );

    let backend = ElasticsearchBackend::new(es_config)?;
    backend.initialize().await?;
    Ok(Arc::new(backend))
}

#[cfg(not(feature = "elasticsearch"))]
async fn create_elasticsearch_client(
    _config: &ServerConfig,
) -> anyhow::Result<Arc<dyn SearchIndexClient>> {
    anyhow::bail!(
        "The elasticsearch index backend requires the 'elasticsearch' feature. \
         Build with: cargo build -p codelist-intake --features elasticsearch"
    )
}

/// Starts the Axum HTTP server.
async fn serve(app: axum::Router, config: &ServerConfig) -> anyhow::Result<()> {
    let addr = config.socket_addr();
    info!(address = %addr, "Server listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::parse();
    init_logging(&config.log_level);

    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("Configuration error: {}", error);
        }
        std::process::exit(1);
    }

    let index_mode = config
        .index_backend_mode()
        .map_err(|e| anyhow::anyhow!("Invalid index backend configuration: {}", e))?;

    info!(
        port = config.port,
        host = %config.host,
        index_backend = %index_mode,
        max_hierarchy_level = config.max_hierarchy_level,
        "Starting code list intake server"
    );
    if config.admin_token.is_none() {
        warn!("No admin token configured; admin endpoints will reject every request");
    }

    let store = Arc::new(create_sqlite_backend(&config)?);
    let index_client = create_index_client(&config, index_mode).await?;
    let service = Arc::new(CodeListService::new(
        store,
        index_client,
        config.service_config(),
    ));

    if config.reindex_on_startup {
        let report = service.indexer().reindex_everything().await?;
        if report.is_success() {
            info!(documents = report.documents_written(), "Startup reindex finished");
        } else {
            for run in report.failed_runs() {
                warn!(
                    index = %run.index,
                    error = run.error.as_deref().unwrap_or_default(),
                    "Startup reindex run failed"
                );
            }
        }
    }

    let app = create_app_with_config(service, config.clone());
    serve(app, &config).await
}

#[cfg(not(feature = "sqlite"))]
compile_error!("The sqlite feature must be enabled");
