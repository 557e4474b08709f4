//! Server configuration for the code list API.
//!
//! Every option can be given on the command line or through a `CODELIST_*`
//! environment variable.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `CODELIST_SERVER_PORT` | 8080 | Server port |
//! | `CODELIST_SERVER_HOST` | 127.0.0.1 | Host to bind |
//! | `CODELIST_LOG_LEVEL` | info | Log level |
//! | `CODELIST_REQUEST_TIMEOUT` | 30 | Request timeout (seconds) |
//! | `CODELIST_ENABLE_CORS` | true | Enable CORS |
//! | `CODELIST_CORS_ORIGINS` | * | Allowed origins |
//! | `CODELIST_DATABASE_PATH` | codelist.db | SQLite file, or `:memory:` |
//! | `CODELIST_INDEX_BACKEND` | memory | `memory` or `elasticsearch` |
//! | `CODELIST_ELASTICSEARCH_NODES` | http://localhost:9200 | Comma-separated node URLs |
//! | `CODELIST_INDEX_PREFIX` | codelist | Prefix of every index name |
//! | `CODELIST_REINDEX_PAGE_SIZE` | 10000 | Ids fetched per page during reindex |
//! | `CODELIST_REINDEX_CHUNK_SIZE` | 1000 | Documents per bulk request |
//! | `CODELIST_REINDEX_ON_STARTUP` | false | Rebuild every index before serving |
//! | `CODELIST_MAX_HIERARCHY_LEVEL` | 10 | Deepest broader-code chain |
//! | `CODELIST_URI_BASE` | http://uri.suomi.fi/codelist | Base of derived URIs |
//! | `CODELIST_ADMIN_TOKEN` | (none) | Bearer token of superusers |
//! | `CODELIST_EDITOR_TOKENS` | (none) | `token=registry` pairs of registry editors |
//!
//! # Example
//!
//! ```rust
//! use codelist_rest::ServerConfig;
//!
//! let config = ServerConfig {
//!     port: 3000,
//!     admin_token: Some("secret".to_string()),
//!     ..Default::default()
//! };
//! assert_eq!(config.socket_addr(), "127.0.0.1:3000");
//! ```

use std::fmt;
use std::str::FromStr;

use clap::Parser;
use codelist_persistence::ServiceConfig;
use codelist_persistence::hierarchy::DEFAULT_MAX_HIERARCHY_LEVEL;
use codelist_persistence::search::{DEFAULT_CHUNK_SIZE, DEFAULT_PAGE_SIZE, ReindexConfig};

/// Search index engine selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexBackendMode {
    /// Process-local index. Nothing survives a restart.
    Memory,
    /// Elasticsearch cluster.
    Elasticsearch,
}

impl fmt::Display for IndexBackendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexBackendMode::Memory => write!(f, "memory"),
            IndexBackendMode::Elasticsearch => write!(f, "elasticsearch"),
        }
    }
}

impl FromStr for IndexBackendMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "in-memory" => Ok(IndexBackendMode::Memory),
            "elasticsearch" | "es" => Ok(IndexBackendMode::Elasticsearch),
            other => Err(format!(
                "unknown index backend '{}' (expected 'memory' or 'elasticsearch')",
                other
            )),
        }
    }
}

/// Server configuration for the code list API.
///
/// This struct can be constructed from environment variables using [`ServerConfig::from_env`],
/// from command line arguments using [`ServerConfig::parse`], or programmatically.
#[derive(Debug, Clone, Parser)]
#[command(name = "codelist-intake")]
#[command(about = "Code list intake and search index synchronization server")]
pub struct ServerConfig {
    /// Port to listen on.
    #[arg(short, long, env = "CODELIST_SERVER_PORT", default_value = "8080")]
    pub port: u16,

    /// Host address to bind to.
    #[arg(long, env = "CODELIST_SERVER_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, env = "CODELIST_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Request timeout in seconds.
    #[arg(long, env = "CODELIST_REQUEST_TIMEOUT", default_value = "30")]
    pub request_timeout: u64,

    /// Enable CORS.
    #[arg(long, env = "CODELIST_ENABLE_CORS", default_value = "true")]
    pub enable_cors: bool,

    /// Allowed CORS origins (comma-separated, or * for all).
    #[arg(long, env = "CODELIST_CORS_ORIGINS", default_value = "*")]
    pub cors_origins: String,

    /// Allowed CORS methods (comma-separated, or * for all).
    #[arg(
        long,
        env = "CODELIST_CORS_METHODS",
        default_value = "GET,POST,PUT,DELETE,OPTIONS"
    )]
    pub cors_methods: String,

    /// Allowed CORS headers (comma-separated, or * for all).
    #[arg(
        long,
        env = "CODELIST_CORS_HEADERS",
        default_value = "Content-Type,Authorization,Accept"
    )]
    pub cors_headers: String,

    /// SQLite database file, or `:memory:`.
    #[arg(long, env = "CODELIST_DATABASE_PATH", default_value = "codelist.db")]
    pub database_path: String,

    /// Search index engine (memory, elasticsearch).
    #[arg(long, env = "CODELIST_INDEX_BACKEND", default_value = "memory")]
    pub index_backend: String,

    /// Elasticsearch node URLs (comma-separated).
    #[arg(
        long,
        env = "CODELIST_ELASTICSEARCH_NODES",
        default_value = "http://localhost:9200"
    )]
    pub elasticsearch_nodes: String,

    /// Elasticsearch username for basic authentication.
    #[arg(long, env = "CODELIST_ELASTICSEARCH_USERNAME")]
    pub elasticsearch_username: Option<String>,

    /// Elasticsearch password for basic authentication.
    #[arg(long, env = "CODELIST_ELASTICSEARCH_PASSWORD")]
    pub elasticsearch_password: Option<String>,

    /// Prefix of every index name.
    #[arg(long, env = "CODELIST_INDEX_PREFIX", default_value = "codelist")]
    pub index_prefix: String,

    /// Ids fetched from the database per page during reindex.
    #[arg(long, env = "CODELIST_REINDEX_PAGE_SIZE", default_value_t = DEFAULT_PAGE_SIZE)]
    pub reindex_page_size: usize,

    /// Documents per bulk request.
    #[arg(long, env = "CODELIST_REINDEX_CHUNK_SIZE", default_value_t = DEFAULT_CHUNK_SIZE)]
    pub reindex_chunk_size: usize,

    /// Rebuild every index before accepting requests.
    #[arg(long, env = "CODELIST_REINDEX_ON_STARTUP", default_value = "false")]
    pub reindex_on_startup: bool,

    /// Deepest allowed broader-code chain.
    #[arg(long, env = "CODELIST_MAX_HIERARCHY_LEVEL", default_value_t = DEFAULT_MAX_HIERARCHY_LEVEL)]
    pub max_hierarchy_level: u32,

    /// Base of every derived URI.
    #[arg(
        long,
        env = "CODELIST_URI_BASE",
        default_value = "http://uri.suomi.fi/codelist"
    )]
    pub uri_base: String,

    /// Bearer token identifying superusers. Admin endpoints are closed without it.
    #[arg(long, env = "CODELIST_ADMIN_TOKEN")]
    pub admin_token: Option<String>,

    /// Registry editor tokens as comma-separated `token=registry` pairs.
    /// A token listed more than once may edit every registry it is paired with.
    #[arg(long, env = "CODELIST_EDITOR_TOKENS")]
    pub editor_tokens: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "127.0.0.1".to_string(),
            log_level: "info".to_string(),
            request_timeout: 30,
            enable_cors: true,
            cors_origins: "*".to_string(),
            cors_methods: "GET,POST,PUT,DELETE,OPTIONS".to_string(),
            cors_headers: "Content-Type,Authorization,Accept".to_string(),
            database_path: "codelist.db".to_string(),
            index_backend: "memory".to_string(),
            elasticsearch_nodes: "http://localhost:9200".to_string(),
            elasticsearch_username: None,
            elasticsearch_password: None,
            index_prefix: "codelist".to_string(),
            reindex_page_size: DEFAULT_PAGE_SIZE,
            reindex_chunk_size: DEFAULT_CHUNK_SIZE,
            reindex_on_startup: false,
            max_hierarchy_level: DEFAULT_MAX_HIERARCHY_LEVEL,
            uri_base: "http://uri.suomi.fi/codelist".to_string(),
            admin_token: None,
            editor_tokens: None,
        }
    }
}

impl ServerConfig {
    /// Creates a new ServerConfig from environment variables.
    pub fn from_env() -> Self {
        Self::try_parse().unwrap_or_default()
    }

    /// Returns the socket address to bind to.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Parses the configured index backend.
    pub fn index_backend_mode(&self) -> Result<IndexBackendMode, String> {
        self.index_backend.parse()
    }

    /// Returns the Elasticsearch node URLs.
    pub fn elasticsearch_node_list(&self) -> Vec<String> {
        self.elasticsearch_nodes
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Configuration of the mutation services and reindex pipeline.
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            max_hierarchy_level: self.max_hierarchy_level,
            uri_base: self.uri_base.clone(),
            reindex: ReindexConfig::default()
                .with_prefix(self.index_prefix.clone())
                .with_batch_sizes(self.reindex_page_size, self.reindex_chunk_size),
        }
    }

    /// Validates the configuration and returns errors if any.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.port == 0 {
            errors.push("Port cannot be 0".to_string());
        }

        if self.request_timeout == 0 {
            errors.push("Request timeout cannot be 0".to_string());
        }

        if self.reindex_page_size == 0 {
            errors.push("Reindex page size cannot be 0".to_string());
        }

        if self.reindex_chunk_size == 0 {
            errors.push("Reindex chunk size cannot be 0".to_string());
        }

        if self.max_hierarchy_level == 0 {
            errors.push("Max hierarchy level cannot be 0".to_string());
        }

        if self.index_prefix.trim().is_empty() {
            errors.push("Index prefix cannot be empty".to_string());
        }

        if let Err(e) = self.index_backend_mode() {
            errors.push(e);
        } else if self.index_backend_mode() == Ok(IndexBackendMode::Elasticsearch)
            && self.elasticsearch_node_list().is_empty()
        {
            errors.push("Elasticsearch index backend needs at least one node".to_string());
        }

        if self.admin_token.as_deref().is_some_and(|t| t.trim().is_empty()) {
            errors.push("Admin token cannot be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Creates a configuration suitable for testing.
    ///
    /// Uses an ephemeral port, an in-memory database and index, and a fixed
    /// admin token `test-admin-token`.
    pub fn for_testing() -> Self {
        Self {
            port: 0,
            host: "127.0.0.1".to_string(),
            log_level: "debug".to_string(),
            request_timeout: 5,
            enable_cors: false,
            cors_origins: "*".to_string(),
            cors_methods: "*".to_string(),
            cors_headers: "*".to_string(),
            database_path: ":memory:".to_string(),
            index_backend: "memory".to_string(),
            admin_token: Some("test-admin-token".to_string()),
            editor_tokens: Some("test-editor-token=jhs".to_string()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.host, "127.0.0.1");
        assert!(config.enable_cors);
        assert!(config.admin_token.is_none());
        assert_eq!(config.index_backend_mode(), Ok(IndexBackendMode::Memory));
    }

    #[test]
    fn test_socket_addr() {
        let config = ServerConfig {
            port: 3000,
            host: "0.0.0.0".to_string(),
            ..Default::default()
        };
        assert_eq!(config.socket_addr(), "0.0.0.0:3000");
    }

    #[test]
    fn test_validate_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_invalid_port() {
        let config = ServerConfig {
            port: 0,
            ..Default::default()
        };
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().iter().any(|e| e.contains("Port")));
    }

    #[test]
    fn test_validate_unknown_index_backend() {
        let config = ServerConfig {
            index_backend: "solr".to_string(),
            ..Default::default()
        };
        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("solr")));
    }

    #[test]
    fn test_validate_zero_batch_sizes() {
        let config = ServerConfig {
            reindex_page_size: 0,
            reindex_chunk_size: 0,
            ..Default::default()
        };
        assert_eq!(config.validate().unwrap_err().len(), 2);
    }

    #[test]
    fn test_index_backend_mode_parse() {
        assert_eq!("ES".parse(), Ok(IndexBackendMode::Elasticsearch));
        assert_eq!("memory".parse(), Ok(IndexBackendMode::Memory));
        assert!("".parse::<IndexBackendMode>().is_err());
    }

    #[test]
    fn test_elasticsearch_node_list() {
        let config = ServerConfig {
            elasticsearch_nodes: "http://a:9200, ,http://b:9200".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.elasticsearch_node_list(),
            vec!["http://a:9200", "http://b:9200"]
        );
    }

    #[test]
    fn test_service_config() {
        let config = ServerConfig {
            index_prefix: "test".to_string(),
            reindex_page_size: 50,
            reindex_chunk_size: 5,
            max_hierarchy_level: 3,
            ..Default::default()
        };
        let service = config.service_config();
        assert_eq!(service.max_hierarchy_level, 3);
        assert_eq!(service.reindex.main_index(), "test_codelist");
        assert_eq!(service.reindex.page_size, 50);
        assert_eq!(service.reindex.chunk_size, 5);
    }

    #[test]
    fn test_for_testing() {
        let config = ServerConfig::for_testing();
        assert_eq!(config.port, 0);
        assert!(!config.enable_cors);
        assert_eq!(config.database_path, ":memory:");
        assert_eq!(config.admin_token.as_deref(), Some("test-admin-token"));
    }
}
