//! Reindex orchestration integration tests.
//!
//! The store is populated through the mutation services; each test then
//! rebuilds a separate in-memory index from it.

use std::sync::Arc;

use codelist_persistence::backends::sqlite::SqliteBackend;
use codelist_persistence::core::CodeRepository;
use codelist_persistence::model::{
    CodeInput, ExtensionInput, PropertyType, RegistryInput, SchemeInput,
};
use codelist_persistence::search::{
    DocumentType, InMemoryIndexClient, ReindexConfig, ReindexOrchestrator, ReindexStage,
};
use codelist_persistence::{CodeListService, ServiceConfig, Superuser};

const REGISTRIES_INDEX: &str = "codelist_registries";
const JHS_INDEX: &str = "codelist_registry_jhs";
const MAIN_INDEX: &str = "codelist_codelist";

type Orchestrator = ReindexOrchestrator<SqliteBackend, InMemoryIndexClient>;

fn create_service() -> CodeListService<SqliteBackend> {
    let backend = SqliteBackend::in_memory().expect("Failed to create SQLite backend");
    CodeListService::new(
        Arc::new(backend),
        Arc::new(InMemoryIndexClient::new()),
        ServiceConfig::default(),
    )
}

fn create_orchestrator(
    service: &CodeListService<SqliteBackend>,
) -> (Orchestrator, Arc<InMemoryIndexClient>) {
    let client = Arc::new(InMemoryIndexClient::new());
    let orchestrator = ReindexOrchestrator::new(
        Arc::clone(service.store()),
        Arc::clone(&client),
        ReindexConfig::default(),
    );
    (orchestrator, client)
}

/// Registry `jhs` with `colors` {red, green, blue} plus a three-member
/// extension, and `shapes` {circle}.
async fn seed(service: &CodeListService<SqliteBackend>) {
    service
        .upsert_registry(
            &Superuser,
            RegistryInput {
                code_value: "jhs".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    for (scheme, codes) in [("colors", vec!["red", "green", "blue"]), ("shapes", vec!["circle"])] {
        service
            .upsert_scheme(
                &Superuser,
                "jhs",
                SchemeInput {
                    code_value: scheme.to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        service
            .upsert_codes(
                &Superuser,
                "jhs",
                scheme,
                codes.into_iter().map(CodeInput::new).collect(),
            )
            .await
            .unwrap();
    }
    service
        .upsert_extension(
            &Superuser,
            "jhs",
            "colors",
            ExtensionInput::new("groups", PropertyType::extension("definitionHierarchy")),
            true,
        )
        .await
        .unwrap();
}

// ============================================================================
// Full Reindex Tests
// ============================================================================

#[tokio::test]
async fn test_reindex_empty_store() {
    let service = create_service();
    let (orchestrator, client) = create_orchestrator(&service);

    let report = orchestrator.reindex_everything().await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.runs.len(), 2);
    assert_eq!(report.documents_written(), 0);
    assert!(report.completed_at.is_some());
    assert_eq!(client.index_names(), vec![MAIN_INDEX, REGISTRIES_INDEX]);
    assert_eq!(client.document_count(MAIN_INDEX), 0);
}

#[tokio::test]
async fn test_reindex_everything_in_order() {
    let service = create_service();
    seed(&service).await;
    let (orchestrator, client) = create_orchestrator(&service);

    let report = orchestrator.reindex_everything().await.unwrap();

    assert!(report.is_success());
    let indices: Vec<&str> = report.runs.iter().map(|r| r.index.as_str()).collect();
    assert_eq!(indices, vec![REGISTRIES_INDEX, JHS_INDEX, MAIN_INDEX]);
    assert_eq!(report.documents_written(), 1 + 2 + 8);

    assert_eq!(client.document_count(REGISTRIES_INDEX), 1);
    assert_eq!(client.document_count(JHS_INDEX), 2);
    assert_eq!(client.document_count_of_type(MAIN_INDEX, DocumentType::Code), 4);
    assert_eq!(client.document_count_of_type(MAIN_INDEX, DocumentType::Extension), 1);
    assert_eq!(client.document_count_of_type(MAIN_INDEX, DocumentType::Member), 3);
    assert_eq!(
        client.mapped_types(MAIN_INDEX),
        vec![DocumentType::Code, DocumentType::Extension, DocumentType::Member]
    );
    assert_eq!(
        client.settings(MAIN_INDEX).unwrap().max_result_window,
        500_000
    );
}

#[tokio::test]
async fn test_rebuild_drops_stale_documents() {
    let service = create_service();
    seed(&service).await;
    let (orchestrator, client) = create_orchestrator(&service);
    orchestrator.reindex_everything().await.unwrap();

    let circle = service.list_codes("jhs", "shapes").await.unwrap().remove(0);
    service.store().delete_codes(&[circle.id]).await.unwrap();

    orchestrator.reindex_everything().await.unwrap();
    assert_eq!(client.document_count_of_type(MAIN_INDEX, DocumentType::Code), 3);
    assert!(client.document(MAIN_INDEX, &circle.id.to_string()).is_none());
}

#[tokio::test]
async fn test_failed_run_does_not_stop_later_runs() {
    let service = create_service();
    seed(&service).await;
    let (orchestrator, client) = create_orchestrator(&service);
    client.set_unavailable(REGISTRIES_INDEX, true);

    let report = orchestrator.reindex_everything().await.unwrap();

    assert!(!report.is_success());
    let failed: Vec<&str> = report.failed_runs().map(|r| r.index.as_str()).collect();
    assert_eq!(failed, vec![REGISTRIES_INDEX]);
    assert_eq!(report.runs[0].failed_stage, Some(ReindexStage::Drop));
    assert_eq!(client.document_count(MAIN_INDEX), 8);
}

#[tokio::test]
async fn test_rejected_document_is_counted() {
    let service = create_service();
    seed(&service).await;
    let (orchestrator, client) = create_orchestrator(&service);
    let circle = service.list_codes("jhs", "shapes").await.unwrap().remove(0);
    client.reject_document(&circle.id.to_string());

    let report = orchestrator.reindex_everything().await.unwrap();

    assert!(report.is_success());
    let main = report.runs.last().unwrap();
    assert_eq!(main.item_failures, 1);
    assert!(!main.is_clean());
    assert_eq!(client.document_count(MAIN_INDEX), 7);
}

#[tokio::test]
async fn test_registry_index_names_are_literal() {
    let service = create_service();
    seed(&service).await;
    service
        .upsert_registry(
            &Superuser,
            RegistryInput {
                code_value: "*".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    service
        .upsert_scheme(
            &Superuser,
            "*",
            SchemeInput {
                code_value: "stars".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let (orchestrator, client) = create_orchestrator(&service);

    let report = orchestrator.reindex_everything().await.unwrap();
    assert!(report.is_success());
    assert!(client.index_names().iter().all(|name| !name.contains('*')));
    assert_eq!(client.document_count("codelist_registry_%2a"), 1);
    assert_eq!(client.document_count(JHS_INDEX), 2);

    let report = orchestrator
        .reindex_entity_type(DocumentType::Scheme)
        .await
        .unwrap();
    assert_eq!(report.runs.len(), 2);
    assert_eq!(client.document_count("codelist_registry_%2a"), 1);
    assert_eq!(client.document_count(JHS_INDEX), 2);
}

// ============================================================================
// Scoped Reindex Tests
// ============================================================================

#[tokio::test]
async fn test_reindex_scheme() {
    let service = create_service();
    seed(&service).await;
    let (orchestrator, client) = create_orchestrator(&service);

    let report = orchestrator.reindex_scheme("jhs", "colors").await.unwrap();

    assert!(report.is_success());
    assert_eq!(client.document_count(JHS_INDEX), 1);
    assert_eq!(client.document_count_of_type(MAIN_INDEX, DocumentType::Code), 3);
    assert_eq!(client.document_count_of_type(MAIN_INDEX, DocumentType::Member), 3);
    assert!(client.index_names().iter().all(|name| name != REGISTRIES_INDEX));
}

#[tokio::test]
async fn test_reindex_missing_scheme() {
    let service = create_service();
    seed(&service).await;
    let (orchestrator, _client) = create_orchestrator(&service);

    let err = orchestrator.reindex_scheme("jhs", "missing").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_reindex_entity_type_replaces_only_that_type() {
    let service = create_service();
    seed(&service).await;
    let (orchestrator, client) = create_orchestrator(&service);
    orchestrator.reindex_everything().await.unwrap();

    let circle = service.list_codes("jhs", "shapes").await.unwrap().remove(0);
    service.store().delete_codes(&[circle.id]).await.unwrap();

    let report = orchestrator
        .reindex_entity_type(DocumentType::Code)
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.runs.len(), 1);
    assert_eq!(client.document_count_of_type(MAIN_INDEX, DocumentType::Code), 3);
    assert_eq!(client.document_count_of_type(MAIN_INDEX, DocumentType::Member), 3);
}
