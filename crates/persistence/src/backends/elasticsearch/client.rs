//! [`SearchIndexClient`] over the Elasticsearch REST API.

use async_trait::async_trait;
use elasticsearch::http::response::Response;
use elasticsearch::indices::{
    IndicesCreateParts, IndicesDeleteParts, IndicesExistsParts, IndicesPutMappingParts,
    IndicesRefreshParts,
};
use elasticsearch::{BulkOperation, BulkParts, DeleteByQueryParts};
use serde_json::{Value, json};

use crate::core::Backend;
use crate::error::{IndexError, StorageError, StorageResult};
use crate::search::{
    BulkItemFailure, BulkResponse, DocumentType, IndexDocument, IndexSettings, SearchIndexClient,
    mapping_for,
};

use super::backend::ElasticsearchBackend;

fn request_error(message: String) -> StorageError {
    StorageError::Index(IndexError::Request {
        client: "elasticsearch".to_string(),
        message,
    })
}

/// Index existence from the HEAD status. Only 404 means absent.
fn exists_from_status(index: &str, status: u16) -> StorageResult<bool> {
    match status {
        200..=299 => Ok(true),
        404 => Ok(false),
        other => Err(request_error(format!(
            "Existence check of '{}' returned status {}",
            index, other
        ))),
    }
}

/// Fails with the response body unless the status is a success.
async fn expect_success(response: Response, action: &str, index: &str) -> StorageResult<Value> {
    let status = response.status_code();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(request_error(format!(
            "{} '{}' returned status {}: {}",
            action, index, status, body
        )));
    }
    response
        .json::<Value>()
        .await
        .map_err(|e| request_error(format!("Failed to parse {} response: {}", action, e)))
}

/// Extracts item-level failures from a `_bulk` response body.
pub(crate) fn parse_bulk_response(items: usize, body: &Value) -> BulkResponse {
    let took_ms = body.get("took").and_then(Value::as_u64).unwrap_or(0);
    let mut failures = Vec::new();

    if body.get("errors").and_then(Value::as_bool).unwrap_or(false) {
        for item in body["items"].as_array().map(Vec::as_slice).unwrap_or(&[]) {
            let Some(result) = item.as_object().and_then(|o| o.values().next()) else {
                continue;
            };
            let Some(error) = result.get("error") else {
                continue;
            };
            let reason = match (error.get("type"), error.get("reason")) {
                (Some(kind), Some(reason)) => format!(
                    "{}: {}",
                    kind.as_str().unwrap_or_default(),
                    reason.as_str().unwrap_or_default()
                ),
                _ => error.to_string(),
            };
            failures.push(BulkItemFailure {
                id: result
                    .get("_id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                reason,
            });
        }
    }

    BulkResponse {
        items,
        failures,
        took_ms,
    }
}

impl ElasticsearchBackend {
    async fn send_bulk(&self, index: &str, operations: Vec<BulkOperation<Value>>) -> StorageResult<BulkResponse> {
        let items = operations.len();
        let response = self
            .client()
            .bulk(BulkParts::Index(index))
            .body(operations)
            .send()
            .await
            .map_err(|e| request_error(format!("Bulk request to '{}' failed: {}", index, e)))?;
        let body = expect_success(response, "bulk request to", index).await?;
        Ok(parse_bulk_response(items, &body))
    }
}

#[async_trait]
impl SearchIndexClient for ElasticsearchBackend {
    fn client_name(&self) -> &'static str {
        "elasticsearch"
    }

    async fn health_check(&self) -> StorageResult<()> {
        Backend::health_check(self).await.map_err(StorageError::from)
    }

    async fn exists(&self, index: &str) -> StorageResult<bool> {
        let response = self
            .client()
            .indices()
            .exists(IndicesExistsParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| request_error(format!("Failed to check index existence: {}", e)))?;
        exists_from_status(index, response.status_code().as_u16())
    }

    async fn create(
        &self,
        index: &str,
        settings: &IndexSettings,
        types: &[DocumentType],
    ) -> StorageResult<()> {
        let body = json!({
            "settings": settings.to_json(),
            "mappings": mapping_for(types),
        });
        let response = self
            .client()
            .indices()
            .create(IndicesCreateParts::Index(index))
            .body(body)
            .send()
            .await
            .map_err(|e| request_error(format!("Failed to create index {}: {}", index, e)))?;

        let status = response.status_code();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // 400 with "resource_already_exists_exception" is OK (race condition)
            if body.contains("resource_already_exists_exception") {
                return Ok(());
            }
            return Err(request_error(format!(
                "Failed to create index {} (status {}): {}",
                index, status, body
            )));
        }

        tracing::debug!("Created Elasticsearch index '{}'", index);
        Ok(())
    }

    async fn delete(&self, index: &str) -> StorageResult<()> {
        let response = self
            .client()
            .indices()
            .delete(IndicesDeleteParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| request_error(format!("Failed to delete index {}: {}", index, e)))?;

        let status = response.status_code();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // 404 is OK (index doesn't exist)
            if !body.contains("index_not_found_exception") {
                return Err(request_error(format!(
                    "Failed to delete index {}: {}",
                    index, body
                )));
            }
        }

        tracing::debug!("Deleted Elasticsearch index '{}'", index);
        Ok(())
    }

    async fn put_mapping(&self, index: &str, types: &[DocumentType]) -> StorageResult<()> {
        let response = self
            .client()
            .indices()
            .put_mapping(IndicesPutMappingParts::Index(&[index]))
            .body(mapping_for(types))
            .send()
            .await
            .map_err(|e| request_error(format!("Failed to put mapping on {}: {}", index, e)))?;
        expect_success(response, "put mapping on", index).await?;
        Ok(())
    }

    async fn bulk_write(
        &self,
        index: &str,
        _document_type: DocumentType,
        documents: Vec<IndexDocument>,
    ) -> StorageResult<BulkResponse> {
        let operations: Vec<BulkOperation<Value>> = documents
            .into_iter()
            .map(|document| BulkOperation::index(document.body).id(document.id).into())
            .collect();
        self.send_bulk(index, operations).await
    }

    async fn delete_documents(
        &self,
        index: &str,
        _document_type: DocumentType,
        ids: &[String],
    ) -> StorageResult<BulkResponse> {
        let operations: Vec<BulkOperation<Value>> = ids
            .iter()
            .map(|id| BulkOperation::<Value>::delete(id.as_str()).into())
            .collect();
        self.send_bulk(index, operations).await
    }

    async fn delete_documents_of_type(
        &self,
        index: &str,
        document_type: DocumentType,
    ) -> StorageResult<u64> {
        let response = self
            .client()
            .delete_by_query(DeleteByQueryParts::Index(&[index]))
            .body(json!({
                "query": { "term": { "documentType": document_type.as_str() } }
            }))
            .send()
            .await
            .map_err(|e| request_error(format!("Delete by query on {} failed: {}", index, e)))?;
        let body = expect_success(response, "delete by query on", index).await?;
        Ok(body.get("deleted").and_then(Value::as_u64).unwrap_or(0))
    }

    async fn flush(&self, index: &str) -> StorageResult<()> {
        let response = self
            .client()
            .indices()
            .refresh(IndicesRefreshParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| request_error(format!("Failed to refresh index {}: {}", index, e)))?;
        expect_success(response, "refresh of", index).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bulk_response_without_errors() {
        let body = json!({ "took": 30, "errors": false, "items": [] });
        let response = parse_bulk_response(3, &body);
        assert_eq!(response.items, 3);
        assert_eq!(response.took_ms, 30);
        assert!(!response.has_failures());
    }

    #[test]
    fn test_parse_bulk_response_with_item_errors() {
        let body = json!({
            "took": 12,
            "errors": true,
            "items": [
                { "index": { "_id": "a", "status": 201 } },
                { "index": {
                    "_id": "b",
                    "status": 400,
                    "error": { "type": "mapper_parsing_exception", "reason": "failed to parse field [order]" }
                } },
                { "delete": { "_id": "c", "status": 500, "error": "boom" } }
            ]
        });
        let response = parse_bulk_response(3, &body);
        assert_eq!(response.failures.len(), 2);
        assert_eq!(response.failures[0].id, "b");
        assert_eq!(
            response.failures[0].reason,
            "mapper_parsing_exception: failed to parse field [order]"
        );
        assert_eq!(response.failures[1].id, "c");
        assert_eq!(response.succeeded(), 1);
    }

    #[test]
    fn test_exists_only_absent_on_not_found() {
        assert!(exists_from_status("idx", 200).unwrap());
        assert!(!exists_from_status("idx", 404).unwrap());

        for status in [401, 403, 500, 503] {
            let err = exists_from_status("idx", status).unwrap_err();
            assert!(matches!(err, StorageError::Index(IndexError::Request { .. })));
            assert!(err.to_string().contains(&status.to_string()));
        }
    }
}
