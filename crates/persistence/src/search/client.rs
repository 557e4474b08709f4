//! Search index client trait.
//!
//! Defines the operations the reindex pipeline needs from a search engine.
//! Each engine implements this trait according to its own API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StorageResult;

use super::document::{DocumentType, IndexDocument, IndexSettings};

/// A failed item of a bulk request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkItemFailure {
    /// Id of the failed document.
    pub id: String,
    /// Engine-reported reason.
    pub reason: String,
}

/// Outcome of one bulk request that reached the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkResponse {
    /// Number of items in the request.
    pub items: usize,
    /// Items the engine rejected.
    pub failures: Vec<BulkItemFailure>,
    /// Engine-reported processing time.
    pub took_ms: u64,
}

impl BulkResponse {
    /// Returns true if any item failed.
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Number of items written successfully.
    pub fn succeeded(&self) -> usize {
        self.items.saturating_sub(self.failures.len())
    }

    /// Short description: failure count and the first failure.
    pub fn failure_summary(&self) -> String {
        match self.failures.first() {
            Some(first) => format!(
                "{} of {} items failed, first failure: [{}] {}",
                self.failures.len(),
                self.items,
                first.id,
                first.reason
            ),
            None => format!("0 of {} items failed", self.items),
        }
    }
}

/// Bulk write, mapping, flush and delete operations against a search engine.
///
/// Index names are passed fully qualified. Implementations must treat deleting
/// a missing index as success.
#[async_trait]
pub trait SearchIndexClient: Send + Sync {
    /// Returns a human-readable name for this client.
    fn client_name(&self) -> &'static str;

    /// Fails unless the engine answers and can serve requests.
    async fn health_check(&self) -> StorageResult<()>;

    /// Returns true if the index exists.
    async fn exists(&self, index: &str) -> StorageResult<bool>;

    /// Creates an index with settings and a mapping covering `types`.
    async fn create(
        &self,
        index: &str,
        settings: &IndexSettings,
        types: &[DocumentType],
    ) -> StorageResult<()>;

    /// Deletes an index. Missing indices are not an error.
    async fn delete(&self, index: &str) -> StorageResult<()>;

    /// Adds the mapping of `types` to an existing index.
    async fn put_mapping(&self, index: &str, types: &[DocumentType]) -> StorageResult<()>;

    /// Writes documents of one type in a single bulk request.
    ///
    /// Item-level rejections are reported in the response; an `Err` means
    /// the request as a whole failed.
    async fn bulk_write(
        &self,
        index: &str,
        document_type: DocumentType,
        documents: Vec<IndexDocument>,
    ) -> StorageResult<BulkResponse>;

    /// Deletes documents by id in a single bulk request.
    async fn delete_documents(
        &self,
        index: &str,
        document_type: DocumentType,
        ids: &[String],
    ) -> StorageResult<BulkResponse>;

    /// Deletes every document of a type. Returns the number deleted.
    async fn delete_documents_of_type(
        &self,
        index: &str,
        document_type: DocumentType,
    ) -> StorageResult<u64>;

    /// Makes written documents visible to queries.
    async fn flush(&self, index: &str) -> StorageResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_summary() {
        let response = BulkResponse {
            items: 1000,
            failures: vec![
                BulkItemFailure {
                    id: "a".to_string(),
                    reason: "mapper_parsing_exception".to_string(),
                },
                BulkItemFailure {
                    id: "b".to_string(),
                    reason: "mapper_parsing_exception".to_string(),
                },
            ],
            took_ms: 12,
        };
        assert!(response.has_failures());
        assert_eq!(response.succeeded(), 998);
        assert_eq!(
            response.failure_summary(),
            "2 of 1000 items failed, first failure: [a] mapper_parsing_exception"
        );
    }
}
