//! Elasticsearch backend implementation.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use elasticsearch::Elasticsearch;
use elasticsearch::auth::Credentials;
use elasticsearch::cert::CertificateValidation;
use elasticsearch::http::transport::{SingleNodeConnectionPool, TransportBuilder};
use elasticsearch::indices::IndicesPutTemplateParts;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::core::Backend;
use crate::error::{BackendError, StorageError, StorageResult};
use crate::search::{IndexSettings, MAX_RESULT_WINDOW};

/// Authentication configuration for Elasticsearch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ElasticsearchAuth {
    /// Basic username/password authentication.
    Basic {
        /// The username for basic auth.
        username: String,
        /// The password for basic auth.
        password: String,
    },
    /// Bearer token authentication.
    Bearer {
        /// The bearer token.
        token: String,
    },
}

/// Configuration for the Elasticsearch backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElasticsearchConfig {
    /// Elasticsearch node URLs (e.g., `["http://localhost:9200"]`).
    /// Currently uses the first node (single-node connection pool).
    pub nodes: Vec<String>,

    /// Index name prefix (default: `"codelist"`).
    #[serde(default = "default_index_prefix")]
    pub index_prefix: String,

    /// Number of primary shards per index (default: 1).
    #[serde(default = "default_shards")]
    pub number_of_shards: u32,

    /// Number of replica shards per index (default: 0).
    #[serde(default = "default_replicas")]
    pub number_of_replicas: u32,

    /// Refresh interval (default: "1s").
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: String,

    /// Maximum result window size (default: 500000).
    #[serde(default = "default_max_result_window")]
    pub max_result_window: u64,

    /// Request timeout in milliseconds (default: 30000).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Optional authentication.
    #[serde(default)]
    pub auth: Option<ElasticsearchAuth>,

    /// Whether to disable certificate validation (default: false).
    /// Only use for development/testing.
    #[serde(default)]
    pub disable_certificate_validation: bool,
}

fn default_index_prefix() -> String {
    "codelist".to_string()
}

fn default_shards() -> u32 {
    1
}

fn default_replicas() -> u32 {
    0
}

fn default_refresh_interval() -> String {
    "1s".to_string()
}

fn default_max_result_window() -> u64 {
    MAX_RESULT_WINDOW
}

fn default_request_timeout_ms() -> u64 {
    30000
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            nodes: vec!["http://localhost:9200".to_string()],
            index_prefix: default_index_prefix(),
            number_of_shards: default_shards(),
            number_of_replicas: default_replicas(),
            refresh_interval: default_refresh_interval(),
            max_result_window: default_max_result_window(),
            request_timeout_ms: default_request_timeout_ms(),
            auth: None,
            disable_certificate_validation: false,
        }
    }
}

impl ElasticsearchConfig {
    /// Index settings applied when the reindex pipeline creates an index.
    pub fn index_settings(&self) -> IndexSettings {
        IndexSettings {
            number_of_shards: self.number_of_shards,
            number_of_replicas: self.number_of_replicas,
            refresh_interval: self.refresh_interval.clone(),
            max_result_window: self.max_result_window,
        }
    }
}

/// Elasticsearch backend holding the search indices of code list content.
pub struct ElasticsearchBackend {
    /// The Elasticsearch client.
    client: Elasticsearch,
    /// Configuration.
    config: ElasticsearchConfig,
}

impl Debug for ElasticsearchBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElasticsearchBackend")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ElasticsearchBackend {
    /// Creates a new Elasticsearch backend with the given configuration.
    pub fn new(config: ElasticsearchConfig) -> StorageResult<Self> {
        let client = Self::build_client(&config)?;
        tracing::info!(
            nodes = ?config.nodes,
            prefix = %config.index_prefix,
            "Elasticsearch index client configured"
        );
        Ok(Self { client, config })
    }

    /// Builds the Elasticsearch client from configuration.
    fn build_client(config: &ElasticsearchConfig) -> StorageResult<Elasticsearch> {
        let url = config
            .nodes
            .first()
            .cloned()
            .unwrap_or_else(|| "http://localhost:9200".to_string());

        let parsed_url: elasticsearch::http::Url = url.parse().map_err(|e| {
            StorageError::Backend(BackendError::ConnectionFailed {
                backend_name: "elasticsearch".to_string(),
                message: format!("Invalid URL: {}", e),
            })
        })?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);

        let mut builder = TransportBuilder::new(conn_pool)
            .timeout(Duration::from_millis(config.request_timeout_ms));

        if config.disable_certificate_validation {
            builder = builder.cert_validation(CertificateValidation::None);
        }

        if let Some(ref auth) = config.auth {
            builder = match auth {
                ElasticsearchAuth::Basic { username, password } => {
                    builder.auth(Credentials::Basic(username.clone(), password.clone()))
                }
                ElasticsearchAuth::Bearer { token } => {
                    builder.auth(Credentials::Bearer(token.clone()))
                }
            };
        }

        let transport = builder.build().map_err(|e| {
            StorageError::Backend(BackendError::ConnectionFailed {
                backend_name: "elasticsearch".to_string(),
                message: format!("Failed to build transport: {}", e),
            })
        })?;

        Ok(Elasticsearch::new(transport))
    }

    /// Returns the Elasticsearch client.
    pub(crate) fn client(&self) -> &Elasticsearch {
        &self.client
    }

    /// Returns the backend configuration.
    pub fn config(&self) -> &ElasticsearchConfig {
        &self.config
    }

    /// Body of the index template covering every index under the prefix.
    pub(crate) fn template_body(&self) -> Value {
        json!({
            "index_patterns": [format!("{}_*", self.config.index_prefix)],
            "settings": self.config.index_settings().to_json(),
        })
    }

    /// Installs an index template so indices created outside the reindex
    /// pipeline still get the raised result window.
    async fn put_index_template(&self) -> Result<(), BackendError> {
        let template_name = format!("{}_template", self.config.index_prefix);
        let response = self
            .client
            .indices()
            .put_template(IndicesPutTemplateParts::Name(&template_name))
            .body(self.template_body())
            .send()
            .await
            .map_err(|e| BackendError::Internal {
                backend_name: "elasticsearch".to_string(),
                message: format!("Failed to create index template: {}", e),
                source: None,
            })?;

        let status = response.status_code();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Internal {
                backend_name: "elasticsearch".to_string(),
                message: format!(
                    "Failed to create index template (status {}): {}",
                    status, body
                ),
                source: None,
            });
        }

        tracing::info!("Created Elasticsearch index template '{}'", template_name);
        Ok(())
    }
}

#[async_trait]
impl Backend for ElasticsearchBackend {
    fn name(&self) -> &'static str {
        "elasticsearch"
    }

    async fn health_check(&self) -> Result<(), BackendError> {
        let response = self
            .client
            .cluster()
            .health(elasticsearch::cluster::ClusterHealthParts::None)
            .send()
            .await
            .map_err(|e| BackendError::Unavailable {
                backend_name: "elasticsearch".to_string(),
                message: format!("Health check failed: {}", e),
            })?;

        let status = response.status_code();
        if !status.is_success() {
            return Err(BackendError::Unavailable {
                backend_name: "elasticsearch".to_string(),
                message: format!("Cluster health returned status {}", status),
            });
        }

        let body = response
            .json::<Value>()
            .await
            .map_err(|e| BackendError::Internal {
                backend_name: "elasticsearch".to_string(),
                message: format!("Failed to parse health response: {}", e),
                source: None,
            })?;

        let cluster_status = body
            .get("status")
            .and_then(|s| s.as_str())
            .unwrap_or("unknown");

        if cluster_status == "red" {
            return Err(BackendError::Unavailable {
                backend_name: "elasticsearch".to_string(),
                message: format!("Cluster status is red: {:?}", body),
            });
        }

        Ok(())
    }

    async fn initialize(&self) -> Result<(), BackendError> {
        self.put_index_template().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ElasticsearchConfig::default();
        assert_eq!(config.index_prefix, "codelist");
        assert_eq!(config.max_result_window, 500_000);
        assert_eq!(config.number_of_replicas, 0);
    }

    #[test]
    fn test_config_from_partial_json() {
        let config: ElasticsearchConfig =
            serde_json::from_str(r#"{"nodes": ["http://es:9200"], "index_prefix": "test"}"#)
                .unwrap();
        assert_eq!(config.nodes, vec!["http://es:9200".to_string()]);
        assert_eq!(config.index_prefix, "test");
        assert_eq!(config.request_timeout_ms, 30000);
        assert_eq!(config.index_settings().max_result_window, 500_000);
    }

    #[test]
    fn test_invalid_url_rejected() {
        let config = ElasticsearchConfig {
            nodes: vec!["not a url".to_string()],
            ..Default::default()
        };
        assert!(ElasticsearchBackend::new(config).is_err());
    }

    #[test]
    fn test_template_body() {
        let backend = ElasticsearchBackend::new(ElasticsearchConfig::default()).unwrap();
        let body = backend.template_body();
        assert_eq!(body["index_patterns"][0], "codelist_*");
        assert_eq!(body["settings"]["index"]["max_result_window"], 500_000);
        assert_eq!(backend.name(), "elasticsearch");
    }
}
