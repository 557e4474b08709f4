//! In-memory search index client.
//!
//! Keeps documents in process. Used by tests and by deployments that run
//! without a search engine.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{IndexError, StorageResult};

use super::client::{BulkItemFailure, BulkResponse, SearchIndexClient};
use super::document::{DocumentType, IndexDocument, IndexSettings};

#[derive(Debug, Default)]
struct MemoryIndex {
    settings: Option<IndexSettings>,
    mapped_types: BTreeSet<DocumentType>,
    documents: BTreeMap<String, IndexDocument>,
    flushes: u64,
}

/// Search index client backed by process memory.
#[derive(Debug, Default)]
pub struct InMemoryIndexClient {
    indices: RwLock<BTreeMap<String, MemoryIndex>>,
    unavailable: RwLock<HashSet<String>>,
    rejected_ids: RwLock<HashSet<String>>,
    bulk_requests: AtomicU64,
    down: AtomicBool,
}

impl InMemoryIndexClient {
    /// Creates an empty client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every request against `index` fail until cleared.
    pub fn set_unavailable(&self, index: &str, unavailable: bool) {
        let mut set = self.unavailable.write();
        if unavailable {
            set.insert(index.to_string());
        } else {
            set.remove(index);
        }
    }

    /// Makes health checks fail until cleared.
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::Relaxed);
    }

    /// Makes bulk writes reject the document with this id.
    pub fn reject_document(&self, id: &str) {
        self.rejected_ids.write().insert(id.to_string());
    }

    /// Names of existing indices.
    pub fn index_names(&self) -> Vec<String> {
        self.indices.read().keys().cloned().collect()
    }

    /// Number of documents in an index.
    pub fn document_count(&self, index: &str) -> usize {
        self.indices
            .read()
            .get(index)
            .map(|i| i.documents.len())
            .unwrap_or(0)
    }

    /// Number of documents of a type in an index.
    pub fn document_count_of_type(&self, index: &str, document_type: DocumentType) -> usize {
        self.indices
            .read()
            .get(index)
            .map(|i| {
                i.documents
                    .values()
                    .filter(|d| d.document_type == document_type)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Returns a stored document.
    pub fn document(&self, index: &str, id: &str) -> Option<IndexDocument> {
        self.indices
            .read()
            .get(index)
            .and_then(|i| i.documents.get(id).cloned())
    }

    /// Returns the settings an index was created with.
    pub fn settings(&self, index: &str) -> Option<IndexSettings> {
        self.indices
            .read()
            .get(index)
            .and_then(|i| i.settings.clone())
    }

    /// Returns the document types mapped on an index.
    pub fn mapped_types(&self, index: &str) -> Vec<DocumentType> {
        self.indices
            .read()
            .get(index)
            .map(|i| i.mapped_types.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of flushes of an index since it was created.
    pub fn flush_count(&self, index: &str) -> u64 {
        self.indices
            .read()
            .get(index)
            .map(|i| i.flushes)
            .unwrap_or(0)
    }

    /// Total bulk requests received.
    pub fn bulk_request_count(&self) -> u64 {
        self.bulk_requests.load(Ordering::Relaxed)
    }

    fn check_available(&self, index: &str) -> StorageResult<()> {
        if self.unavailable.read().contains(index) {
            return Err(request_error(format!("index '{}' is unavailable", index)));
        }
        Ok(())
    }
}

fn request_error(message: String) -> crate::error::StorageError {
    IndexError::Request {
        client: "memory".to_string(),
        message,
    }
    .into()
}

fn missing_index(index: &str) -> crate::error::StorageError {
    request_error(format!("no such index [{}]", index))
}

#[async_trait]
impl SearchIndexClient for InMemoryIndexClient {
    fn client_name(&self) -> &'static str {
        "memory"
    }

    async fn health_check(&self) -> StorageResult<()> {
        if self.down.load(Ordering::Relaxed) {
            return Err(request_error("engine is down".to_string()));
        }
        Ok(())
    }

    async fn exists(&self, index: &str) -> StorageResult<bool> {
        self.check_available(index)?;
        Ok(self.indices.read().contains_key(index))
    }

    async fn create(
        &self,
        index: &str,
        settings: &IndexSettings,
        types: &[DocumentType],
    ) -> StorageResult<()> {
        self.check_available(index)?;
        let mut indices = self.indices.write();
        if indices.contains_key(index) {
            return Err(request_error(format!(
                "resource_already_exists_exception: index [{}] already exists",
                index
            )));
        }
        indices.insert(
            index.to_string(),
            MemoryIndex {
                settings: Some(settings.clone()),
                mapped_types: types.iter().copied().collect(),
                ..Default::default()
            },
        );
        Ok(())
    }

    async fn delete(&self, index: &str) -> StorageResult<()> {
        self.check_available(index)?;
        self.indices.write().remove(index);
        Ok(())
    }

    async fn put_mapping(&self, index: &str, types: &[DocumentType]) -> StorageResult<()> {
        self.check_available(index)?;
        let mut indices = self.indices.write();
        let target = indices.get_mut(index).ok_or_else(|| missing_index(index))?;
        target.mapped_types.extend(types.iter().copied());
        Ok(())
    }

    async fn bulk_write(
        &self,
        index: &str,
        _document_type: DocumentType,
        documents: Vec<IndexDocument>,
    ) -> StorageResult<BulkResponse> {
        self.check_available(index)?;
        self.bulk_requests.fetch_add(1, Ordering::Relaxed);

        let rejected = self.rejected_ids.read().clone();
        let mut indices = self.indices.write();
        let target = indices.get_mut(index).ok_or_else(|| missing_index(index))?;

        let items = documents.len();
        let mut failures = Vec::new();
        for document in documents {
            if rejected.contains(&document.id) {
                failures.push(BulkItemFailure {
                    id: document.id,
                    reason: "document rejected".to_string(),
                });
            } else {
                target.documents.insert(document.id.clone(), document);
            }
        }
        Ok(BulkResponse {
            items,
            failures,
            took_ms: 0,
        })
    }

    async fn delete_documents(
        &self,
        index: &str,
        _document_type: DocumentType,
        ids: &[String],
    ) -> StorageResult<BulkResponse> {
        self.check_available(index)?;
        self.bulk_requests.fetch_add(1, Ordering::Relaxed);
        let mut indices = self.indices.write();
        if let Some(target) = indices.get_mut(index) {
            for id in ids {
                target.documents.remove(id);
            }
        }
        Ok(BulkResponse {
            items: ids.len(),
            failures: Vec::new(),
            took_ms: 0,
        })
    }

    async fn delete_documents_of_type(
        &self,
        index: &str,
        document_type: DocumentType,
    ) -> StorageResult<u64> {
        self.check_available(index)?;
        let mut indices = self.indices.write();
        let Some(target) = indices.get_mut(index) else {
            return Ok(0);
        };
        let before = target.documents.len();
        target
            .documents
            .retain(|_, d| d.document_type != document_type);
        Ok((before - target.documents.len()) as u64)
    }

    async fn flush(&self, index: &str) -> StorageResult<()> {
        self.check_available(index)?;
        let mut indices = self.indices.write();
        let target = indices.get_mut(index).ok_or_else(|| missing_index(index))?;
        target.flushes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, document_type: DocumentType) -> IndexDocument {
        IndexDocument::new(id, document_type, json!({ "id": id }))
    }

    #[tokio::test]
    async fn test_health_check_follows_down_flag() {
        let client = InMemoryIndexClient::new();
        assert!(client.health_check().await.is_ok());
        client.set_down(true);
        assert!(client.health_check().await.is_err());
        client.set_down(false);
        assert!(client.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn test_create_write_flush() {
        let client = InMemoryIndexClient::new();
        client
            .create("idx", &IndexSettings::default(), &[DocumentType::Code])
            .await
            .unwrap();
        assert!(client.exists("idx").await.unwrap());

        let response = client
            .bulk_write(
                "idx",
                DocumentType::Code,
                vec![doc("a", DocumentType::Code), doc("b", DocumentType::Code)],
            )
            .await
            .unwrap();
        assert_eq!(response.items, 2);
        assert!(!response.has_failures());

        client.flush("idx").await.unwrap();
        assert_eq!(client.document_count("idx"), 2);
        assert_eq!(client.flush_count("idx"), 1);
        assert_eq!(
            client.document("idx", "a").unwrap().body["documentType"],
            "code"
        );
    }

    #[tokio::test]
    async fn test_delete_missing_index_is_ok() {
        let client = InMemoryIndexClient::new();
        client.delete("missing").await.unwrap();
        assert!(!client.exists("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_create_existing_index_fails() {
        let client = InMemoryIndexClient::new();
        let settings = IndexSettings::default();
        client.create("idx", &settings, &[]).await.unwrap();
        assert!(client.create("idx", &settings, &[]).await.is_err());
    }

    #[tokio::test]
    async fn test_rejected_document_is_item_failure() {
        let client = InMemoryIndexClient::new();
        client
            .create("idx", &IndexSettings::default(), &[DocumentType::Code])
            .await
            .unwrap();
        client.reject_document("bad");

        let response = client
            .bulk_write(
                "idx",
                DocumentType::Code,
                vec![doc("good", DocumentType::Code), doc("bad", DocumentType::Code)],
            )
            .await
            .unwrap();
        assert_eq!(response.failures.len(), 1);
        assert_eq!(response.failures[0].id, "bad");
        assert_eq!(client.document_count("idx"), 1);
    }

    #[tokio::test]
    async fn test_delete_documents_of_type() {
        let client = InMemoryIndexClient::new();
        client
            .create("idx", &IndexSettings::default(), &DocumentType::MAIN)
            .await
            .unwrap();
        client
            .bulk_write(
                "idx",
                DocumentType::Code,
                vec![doc("c1", DocumentType::Code), doc("m1", DocumentType::Member)],
            )
            .await
            .unwrap();

        let removed = client
            .delete_documents_of_type("idx", DocumentType::Member)
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(client.document_count_of_type("idx", DocumentType::Code), 1);
    }

    #[tokio::test]
    async fn test_unavailable_index() {
        let client = InMemoryIndexClient::new();
        client.set_unavailable("idx", true);
        assert!(client.exists("idx").await.is_err());
        client.set_unavailable("idx", false);
        assert!(!client.exists("idx").await.unwrap());
    }
}
