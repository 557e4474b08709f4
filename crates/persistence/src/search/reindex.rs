//! Reindex pipeline.
//!
//! A run projects entities from a [`DocumentSource`] into one named index.
//! Runs are sequences of [`ReindexStage`]s; the first failing stage aborts the
//! run and is recorded in its [`IndexRunReport`]. Bulk writes within a page
//! are submitted concurrently, one task per chunk.
//!
//! Index layout for a prefix `p`:
//!
//! - `p_registries` holds registry documents
//! - `p_registry_{registry}` holds the schemes of one registry
//! - `p_codelist` holds codes, extensions and members

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{IndexError, ResourceError, StorageError, StorageResult};

use super::batcher::{DEFAULT_CHUNK_SIZE, DEFAULT_PAGE_SIZE, IndexBatcher};
use super::client::{BulkResponse, SearchIndexClient};
use super::document::{DocumentType, IndexDocument, IndexSettings};
use super::source::{DocumentSource, SourceScope};

/// Number of failure messages kept per run report.
const MAX_FAILURE_SAMPLES: usize = 10;

/// Reindex configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReindexConfig {
    /// Prefix of every index name.
    #[serde(default = "default_index_prefix")]
    pub index_prefix: String,

    /// Ids fetched per page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Documents per bulk write.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Settings applied to created indices.
    #[serde(default)]
    pub settings: IndexSettings,
}

fn default_index_prefix() -> String {
    "codelist".to_string()
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl Default for ReindexConfig {
    fn default() -> Self {
        Self {
            index_prefix: default_index_prefix(),
            page_size: default_page_size(),
            chunk_size: default_chunk_size(),
            settings: IndexSettings::default(),
        }
    }
}

impl ReindexConfig {
    /// Sets the index prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.index_prefix = prefix.into();
        self
    }

    /// Sets page and chunk sizes.
    pub fn with_batch_sizes(mut self, page_size: usize, chunk_size: usize) -> Self {
        self.page_size = page_size;
        self.chunk_size = chunk_size;
        self
    }

    /// Index holding registry documents.
    pub fn registries_index(&self) -> String {
        format!("{}_registries", self.index_prefix)
    }

    /// Index holding the schemes of one registry.
    ///
    /// The registry segment is lower-cased and characters that index names
    /// may not contain are percent-encoded, so distinct registries never share
    /// an index and no name acts as a wildcard.
    pub fn registry_index(&self, registry: &str) -> String {
        format!("{}_registry_{}", self.index_prefix, index_name_segment(registry))
    }

    /// Index holding codes, extensions and members.
    pub fn main_index(&self) -> String {
        format!("{}_codelist", self.index_prefix)
    }
}

/// Encodes a code value for use inside an index name.
fn index_name_segment(value: &str) -> String {
    let mut segment = String::with_capacity(value.len());
    for c in value.to_lowercase().chars() {
        match c {
            '*' | '#' | '%' | '?' | ',' | ':' | '|' | '<' | '>' | '"' | '\\' | '/' | ' ' => {
                segment.push_str(&format!("%{:02x}", u32::from(c)));
            }
            c => segment.push(c),
        }
    }
    segment
}

/// A stage of an index run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReindexStage {
    /// Remove the index, or the run's documents from it.
    Drop,
    /// Create the index, or re-apply the mapping to an existing one.
    Create,
    /// Page through entities and bulk write them.
    Stream,
    /// Refresh the index.
    Flush,
}

impl fmt::Display for ReindexStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReindexStage::Drop => "drop",
            ReindexStage::Create => "create",
            ReindexStage::Stream => "stream",
            ReindexStage::Flush => "flush",
        };
        f.write_str(name)
    }
}

/// How a run treats its target index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunMode {
    /// Drop and recreate the index, then stream.
    Rebuild,
    /// Ensure the index and mapping exist, then stream over live data.
    Refresh,
    /// Ensure the index exists, remove the streamed types' documents, then stream.
    ReplaceType,
}

impl RunMode {
    /// Stages executed for this mode, in order.
    pub fn stages(&self) -> &'static [ReindexStage] {
        match self {
            RunMode::Rebuild => &[
                ReindexStage::Drop,
                ReindexStage::Create,
                ReindexStage::Stream,
                ReindexStage::Flush,
            ],
            RunMode::Refresh => &[
                ReindexStage::Create,
                ReindexStage::Stream,
                ReindexStage::Flush,
            ],
            RunMode::ReplaceType => &[
                ReindexStage::Create,
                ReindexStage::Drop,
                ReindexStage::Stream,
                ReindexStage::Flush,
            ],
        }
    }
}

/// Description of one run against one index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRun {
    /// Target index name.
    pub index: String,
    /// Stage selection.
    pub mode: RunMode,
    /// Types whose mapping the index carries.
    pub mapped_types: Vec<DocumentType>,
    /// Entity streams written by the run, in order.
    pub streams: Vec<(DocumentType, SourceScope)>,
}

impl IndexRun {
    /// Creates a run.
    pub fn new(
        index: impl Into<String>,
        mode: RunMode,
        mapped_types: &[DocumentType],
        streams: Vec<(DocumentType, SourceScope)>,
    ) -> Self {
        Self {
            index: index.into(),
            mode,
            mapped_types: mapped_types.to_vec(),
            streams,
        }
    }

    fn stream_types(&self) -> Vec<DocumentType> {
        let mut types: Vec<DocumentType> = self.streams.iter().map(|(t, _)| *t).collect();
        types.dedup();
        types
    }
}

/// Outcome of one index run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexRunReport {
    /// Target index.
    pub index: String,
    /// Types streamed into the index.
    pub document_types: Vec<DocumentType>,
    /// Stages that finished.
    pub stages_completed: Vec<ReindexStage>,
    /// Stage that aborted the run.
    pub failed_stage: Option<ReindexStage>,
    /// Error of the failed stage.
    pub error: Option<String>,
    /// Page fetches from the source.
    pub page_fetches: usize,
    /// Bulk requests submitted.
    pub chunks_submitted: usize,
    /// Bulk requests that failed outright.
    pub chunk_failures: usize,
    /// Documents written successfully.
    pub documents_written: usize,
    /// Documents rejected by the engine.
    pub item_failures: usize,
    /// First failure messages.
    pub failure_samples: Vec<String>,
}

impl IndexRunReport {
    fn new(run: &IndexRun) -> Self {
        Self {
            index: run.index.clone(),
            document_types: run.stream_types(),
            ..Default::default()
        }
    }

    /// Returns true if every stage finished.
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    /// Returns true if the run finished without any chunk or item failure.
    pub fn is_clean(&self) -> bool {
        self.succeeded() && self.chunk_failures == 0 && self.item_failures == 0
    }

    fn sample(&mut self, message: String) {
        if self.failure_samples.len() < MAX_FAILURE_SAMPLES {
            self.failure_samples.push(message);
        }
    }

    fn record(&mut self, outcome: ChunkOutcome) {
        self.chunks_submitted += 1;
        match outcome.result {
            Ok(response) => {
                self.documents_written += response.succeeded();
                self.item_failures += response.failures.len();
                if response.has_failures() {
                    self.sample(response.failure_summary());
                }
            }
            Err(message) => {
                self.chunk_failures += 1;
                self.sample(format!("chunk of {} documents failed: {}", outcome.documents, message));
            }
        }
    }
}

/// Outcome of a reindex operation made of one or more runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReindexReport {
    /// Every run, in execution order.
    pub runs: Vec<IndexRunReport>,
    /// When the operation started.
    pub started_at: String,
    /// When the operation completed.
    pub completed_at: Option<String>,
}

impl ReindexReport {
    fn start() -> Self {
        Self {
            runs: Vec::new(),
            started_at: chrono::Utc::now().to_rfc3339(),
            completed_at: None,
        }
    }

    fn finish(mut self) -> Self {
        self.completed_at = Some(chrono::Utc::now().to_rfc3339());
        self
    }

    /// Returns true if every run finished all its stages.
    pub fn is_success(&self) -> bool {
        self.runs.iter().all(IndexRunReport::succeeded)
    }

    /// Total documents written across runs.
    pub fn documents_written(&self) -> usize {
        self.runs.iter().map(|r| r.documents_written).sum()
    }

    /// Runs that aborted.
    pub fn failed_runs(&self) -> impl Iterator<Item = &IndexRunReport> {
        self.runs.iter().filter(|r| !r.succeeded())
    }
}

/// Result of one bulk chunk task.
#[derive(Debug)]
struct ChunkOutcome {
    documents: usize,
    result: Result<BulkResponse, String>,
}

/// Sequences whole-corpus, single-scheme and single-type reindex operations,
/// and post-mutation index synchronization.
///
/// The orchestrator holds no run state and may be shared between tasks.
/// Concurrent rebuilds of the same index are not serialized here.
pub struct ReindexOrchestrator<S: DocumentSource + ?Sized, C: SearchIndexClient + ?Sized> {
    source: Arc<S>,
    client: Arc<C>,
    config: ReindexConfig,
    batcher: IndexBatcher,
}

impl<S, C> Clone for ReindexOrchestrator<S, C>
where
    S: DocumentSource + ?Sized,
    C: SearchIndexClient + ?Sized,
{
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            client: Arc::clone(&self.client),
            config: self.config.clone(),
            batcher: self.batcher,
        }
    }
}

impl<S, C> fmt::Debug for ReindexOrchestrator<S, C>
where
    S: DocumentSource + ?Sized,
    C: SearchIndexClient + ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReindexOrchestrator")
            .field("client", &self.client.client_name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S, C> ReindexOrchestrator<S, C>
where
    S: DocumentSource + ?Sized,
    C: SearchIndexClient + ?Sized + 'static,
{
    /// Creates an orchestrator.
    pub fn new(source: Arc<S>, client: Arc<C>, config: ReindexConfig) -> Self {
        let batcher = IndexBatcher::new(config.page_size, config.chunk_size);
        Self {
            source,
            client,
            config,
            batcher,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ReindexConfig {
        &self.config
    }

    /// Returns the search index client.
    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    /// Rebuilds every index: registries, then each registry's schemes, then
    /// the main index. Later runs execute even if an earlier one failed.
    pub async fn reindex_everything(&self) -> StorageResult<ReindexReport> {
        info!(prefix = %self.config.index_prefix, "Reindexing everything");
        let mut report = ReindexReport::start();

        report
            .runs
            .push(self.execute(self.registries_run(RunMode::Rebuild)).await);

        match self.source.registry_keys().await {
            Ok(registries) => {
                for registry in registries {
                    let run = IndexRun::new(
                        self.config.registry_index(&registry.code_value),
                        RunMode::Rebuild,
                        &[DocumentType::Scheme],
                        vec![(DocumentType::Scheme, SourceScope::Registry(registry.id))],
                    );
                    report.runs.push(self.execute(run).await);
                }
            }
            Err(e) => {
                error!(error = %e, "Listing registries for register item reindex failed");
                report.runs.push(IndexRunReport {
                    index: format!("{}_registry_*", self.config.index_prefix),
                    document_types: vec![DocumentType::Scheme],
                    failed_stage: Some(ReindexStage::Stream),
                    error: Some(e.to_string()),
                    ..Default::default()
                });
            }
        }

        report
            .runs
            .push(self.execute(self.main_run(RunMode::Rebuild, SourceScope::All)).await);

        let report = report.finish();
        info!(
            runs = report.runs.len(),
            failed = report.failed_runs().count(),
            documents = report.documents_written(),
            "Reindex of everything finished"
        );
        Ok(report)
    }

    /// Reindexes one scheme without dropping any index: the scheme document
    /// into its registry's index, its codes, extensions and members into the
    /// main index.
    pub async fn reindex_scheme(&self, registry: &str, scheme: &str) -> StorageResult<ReindexReport> {
        let key = self.source.scheme_key(registry, scheme).await?.ok_or_else(|| {
            ResourceError::not_found("code scheme", format!("{}/{}", registry, scheme))
        })?;
        info!(registry = %key.registry.code_value, scheme = %key.code_value, "Reindexing code scheme");

        let mut report = ReindexReport::start();
        let scheme_run = IndexRun::new(
            self.config.registry_index(&key.registry.code_value),
            RunMode::Refresh,
            &[DocumentType::Scheme],
            vec![(DocumentType::Scheme, SourceScope::Scheme(key.id))],
        );
        report.runs.push(self.execute(scheme_run).await);
        report.runs.push(
            self.execute(self.main_run(RunMode::Refresh, SourceScope::Scheme(key.id)))
                .await,
        );
        Ok(report.finish())
    }

    /// Replaces every document of one type.
    pub async fn reindex_entity_type(&self, document_type: DocumentType) -> StorageResult<ReindexReport> {
        info!(document_type = %document_type, "Reindexing entity type");
        let mut report = ReindexReport::start();

        match document_type {
            DocumentType::Registry => {
                report
                    .runs
                    .push(self.execute(self.registries_run(RunMode::ReplaceType)).await);
            }
            DocumentType::Scheme => {
                for registry in self.source.registry_keys().await? {
                    let run = IndexRun::new(
                        self.config.registry_index(&registry.code_value),
                        RunMode::ReplaceType,
                        &[DocumentType::Scheme],
                        vec![(DocumentType::Scheme, SourceScope::Registry(registry.id))],
                    );
                    report.runs.push(self.execute(run).await);
                }
            }
            DocumentType::Code | DocumentType::Extension | DocumentType::Member => {
                let run = IndexRun::new(
                    self.config.main_index(),
                    RunMode::ReplaceType,
                    &DocumentType::MAIN,
                    vec![(document_type, SourceScope::All)],
                );
                report.runs.push(self.execute(run).await);
            }
        }
        Ok(report.finish())
    }

    /// Executes one run stage by stage.
    pub async fn execute(&self, run: IndexRun) -> IndexRunReport {
        let mut report = IndexRunReport::new(&run);
        for &stage in run.mode.stages() {
            match self.run_stage(stage, &run, &mut report).await {
                Ok(()) => report.stages_completed.push(stage),
                Err(e) => {
                    let failure = IndexError::StageFailed {
                        index: run.index.clone(),
                        stage,
                        message: e.to_string(),
                    };
                    error!(index = %run.index, stage = %stage, error = %e, "Index run aborted");
                    report.failed_stage = Some(stage);
                    report.error = Some(failure.to_string());
                    return report;
                }
            }
        }
        info!(
            index = %run.index,
            documents = report.documents_written,
            chunks = report.chunks_submitted,
            chunk_failures = report.chunk_failures,
            item_failures = report.item_failures,
            "Index run finished"
        );
        report
    }

    async fn run_stage(
        &self,
        stage: ReindexStage,
        run: &IndexRun,
        report: &mut IndexRunReport,
    ) -> StorageResult<()> {
        match stage {
            ReindexStage::Drop => self.drop_stage(run).await,
            ReindexStage::Create => self.create_stage(run).await,
            ReindexStage::Stream => self.stream_stage(run, report).await,
            ReindexStage::Flush => self.client.flush(&run.index).await,
        }
    }

    async fn drop_stage(&self, run: &IndexRun) -> StorageResult<()> {
        match run.mode {
            RunMode::ReplaceType => {
                for document_type in run.stream_types() {
                    let removed = self
                        .client
                        .delete_documents_of_type(&run.index, document_type)
                        .await?;
                    info!(index = %run.index, document_type = %document_type, removed, "Removed documents of type");
                }
                Ok(())
            }
            _ => {
                if self.client.exists(&run.index).await? {
                    self.client.delete(&run.index).await?;
                    info!(index = %run.index, "Deleted index");
                } else {
                    debug!(index = %run.index, "Index not present, nothing to delete");
                }
                Ok(())
            }
        }
    }

    async fn create_stage(&self, run: &IndexRun) -> StorageResult<()> {
        if run.mode != RunMode::Rebuild && self.client.exists(&run.index).await? {
            self.client.put_mapping(&run.index, &run.mapped_types).await?;
            debug!(index = %run.index, "Re-applied mapping to existing index");
            return Ok(());
        }
        self.client
            .create(&run.index, &self.config.settings, &run.mapped_types)
            .await?;
        info!(index = %run.index, "Created index");
        Ok(())
    }

    async fn stream_stage(&self, run: &IndexRun, report: &mut IndexRunReport) -> StorageResult<()> {
        for &(document_type, scope) in &run.streams {
            let ids = self.source.entity_ids(document_type, scope).await?;
            if ids.is_empty() {
                info!(index = %run.index, document_type = %document_type, "No content to be indexed");
                continue;
            }
            debug!(
                index = %run.index,
                document_type = %document_type,
                ids = ids.len(),
                pages = self.batcher.page_count(ids.len()),
                "Streaming entities"
            );
            for page in self.batcher.pages(&ids) {
                let documents = self.source.fetch_documents(document_type, page).await?;
                report.page_fetches += 1;
                let chunks = self.batcher.chunks(documents);
                for outcome in self.submit_chunks(&run.index, document_type, chunks).await {
                    report.record(outcome);
                }
            }
        }
        Ok(())
    }

    /// Submits each chunk as its own bulk request and waits for all of them.
    async fn submit_chunks(
        &self,
        index: &str,
        document_type: DocumentType,
        chunks: Vec<Vec<IndexDocument>>,
    ) -> Vec<ChunkOutcome> {
        let mut tasks: JoinSet<ChunkOutcome> = JoinSet::new();

        for chunk in chunks {
            let client = Arc::clone(&self.client);
            let index = index.to_string();
            tasks.spawn(async move {
                let documents = chunk.len();
                let result = match client.bulk_write(&index, document_type, chunk).await {
                    Ok(response) => {
                        if response.has_failures() {
                            warn!(index = %index, summary = %response.failure_summary(), "Bulk request had failures");
                        } else {
                            debug!(
                                index = %index,
                                "Bulk request persisted {} items in {} ms",
                                response.items,
                                response.took_ms
                            );
                        }
                        Ok(response)
                    }
                    Err(e) => {
                        error!(index = %index, documents, error = %e, "Bulk request failed");
                        Err(e.to_string())
                    }
                };
                ChunkOutcome { documents, result }
            });
        }

        let mut outcomes = Vec::new();
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    warn!(error = %e, "Bulk chunk task failed");
                    outcomes.push(ChunkOutcome {
                        documents: 0,
                        result: Err(e.to_string()),
                    });
                }
            }
        }
        outcomes
    }

    /// Writes the current state of entities into their indices.
    ///
    /// Returns warnings for anything that failed. Never returns an error:
    /// relational state is authoritative once committed.
    pub async fn index_entities(&self, document_type: DocumentType, ids: &[Uuid]) -> Vec<String> {
        if ids.is_empty() {
            return Vec::new();
        }
        let mut warnings = Vec::new();
        let documents = match self.source.fetch_documents(document_type, ids).await {
            Ok(documents) => documents,
            Err(e) => {
                warnings.push(sync_warning(document_type, "source", &e));
                return warnings;
            }
        };

        let mut by_index: BTreeMap<String, Vec<IndexDocument>> = BTreeMap::new();
        for document in documents {
            match self.index_for(document_type, document.partition.as_deref()) {
                Some(index) => by_index.entry(index).or_default().push(document),
                None => warnings.push(format!(
                    "{} document {} has no registry partition",
                    document_type, document.id
                )),
            }
        }

        for (index, documents) in by_index {
            if let Err(e) = self.ensure_index(&index, document_type).await {
                warnings.push(sync_warning(document_type, &index, &e));
                continue;
            }
            let chunks = self.batcher.chunks(documents);
            for outcome in self.submit_chunks(&index, document_type, chunks).await {
                match outcome.result {
                    Ok(response) if response.has_failures() => warnings.push(format!(
                        "search index sync of {} into '{}': {}",
                        document_type,
                        index,
                        response.failure_summary()
                    )),
                    Ok(_) => {}
                    Err(message) => warnings.push(format!(
                        "search index sync of {} into '{}' failed: {}",
                        document_type, index, message
                    )),
                }
            }
            if let Err(e) = self.client.flush(&index).await {
                warnings.push(sync_warning(document_type, &index, &e));
            }
        }
        warnings
    }

    /// Removes documents of deleted entities. `partition` names the registry
    /// for scheme documents.
    pub async fn remove_entities(
        &self,
        document_type: DocumentType,
        ids: &[Uuid],
        partition: Option<&str>,
    ) -> Vec<String> {
        if ids.is_empty() {
            return Vec::new();
        }
        let Some(index) = self.index_for(document_type, partition) else {
            return vec![format!("{} documents have no registry partition", document_type)];
        };
        let ids: Vec<String> = ids.iter().map(Uuid::to_string).collect();

        let mut warnings = Vec::new();
        match self.client.delete_documents(&index, document_type, &ids).await {
            Ok(response) if response.has_failures() => {
                warn!(index = %index, summary = %response.failure_summary(), "Bulk delete had failures");
                warnings.push(format!(
                    "search index removal of {} from '{}': {}",
                    document_type,
                    index,
                    response.failure_summary()
                ));
            }
            Ok(_) => {}
            Err(e) => warnings.push(sync_warning(document_type, &index, &e)),
        }
        if let Err(e) = self.client.flush(&index).await {
            warnings.push(sync_warning(document_type, &index, &e));
        }
        warnings
    }

    fn index_for(&self, document_type: DocumentType, partition: Option<&str>) -> Option<String> {
        match document_type {
            DocumentType::Registry => Some(self.config.registries_index()),
            DocumentType::Scheme => partition.map(|registry| self.config.registry_index(registry)),
            DocumentType::Code | DocumentType::Extension | DocumentType::Member => {
                Some(self.config.main_index())
            }
        }
    }

    async fn ensure_index(&self, index: &str, document_type: DocumentType) -> StorageResult<()> {
        if self.client.exists(index).await? {
            return Ok(());
        }
        let types: &[DocumentType] = match document_type {
            DocumentType::Registry => &[DocumentType::Registry],
            DocumentType::Scheme => &[DocumentType::Scheme],
            _ => &DocumentType::MAIN,
        };
        self.client.create(index, &self.config.settings, types).await
    }

    fn registries_run(&self, mode: RunMode) -> IndexRun {
        IndexRun::new(
            self.config.registries_index(),
            mode,
            &[DocumentType::Registry],
            vec![(DocumentType::Registry, SourceScope::All)],
        )
    }

    fn main_run(&self, mode: RunMode, scope: SourceScope) -> IndexRun {
        IndexRun::new(
            self.config.main_index(),
            mode,
            &DocumentType::MAIN,
            DocumentType::MAIN.iter().map(|t| (*t, scope)).collect(),
        )
    }
}

fn sync_warning(document_type: DocumentType, target: &str, error: &StorageError) -> String {
    warn!(document_type = %document_type, target = %target, error = %error, "Search index sync failed");
    format!(
        "search index sync of {} into '{}' failed: {}",
        document_type, target, error
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::search::InMemoryIndexClient;
    use crate::search::source::{RegistryKey, SchemeKey};

    /// Source with a fixed number of code ids and nothing else.
    struct CodeSource {
        ids: Vec<Uuid>,
        page_fetches: AtomicUsize,
    }

    impl CodeSource {
        fn with_codes(count: usize) -> Self {
            Self {
                ids: (0..count).map(|_| Uuid::new_v4()).collect(),
                page_fetches: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DocumentSource for CodeSource {
        async fn entity_ids(
            &self,
            document_type: DocumentType,
            _scope: SourceScope,
        ) -> StorageResult<Vec<Uuid>> {
            Ok(match document_type {
                DocumentType::Code => self.ids.clone(),
                _ => Vec::new(),
            })
        }

        async fn fetch_documents(
            &self,
            document_type: DocumentType,
            ids: &[Uuid],
        ) -> StorageResult<Vec<IndexDocument>> {
            self.page_fetches.fetch_add(1, Ordering::SeqCst);
            Ok(ids
                .iter()
                .map(|id| IndexDocument::new(id.to_string(), document_type, json!({ "id": id })))
                .collect())
        }

        async fn registry_keys(&self) -> StorageResult<Vec<RegistryKey>> {
            Ok(Vec::new())
        }

        async fn scheme_key(&self, _registry: &str, _scheme: &str) -> StorageResult<Option<SchemeKey>> {
            Ok(None)
        }
    }

    /// Client that fails the bulk request containing a marked document, and
    /// optionally every create or flush.
    #[derive(Default)]
    struct FlakyClient {
        inner: InMemoryIndexClient,
        failing_document: Option<String>,
        fail_create: bool,
        fail_flush: bool,
        bulk_calls: AtomicUsize,
    }

    fn refused() -> StorageError {
        IndexError::Request {
            client: "flaky".to_string(),
            message: "connection refused".to_string(),
        }
        .into()
    }

    #[async_trait]
    impl SearchIndexClient for FlakyClient {
        fn client_name(&self) -> &'static str {
            "flaky"
        }

        async fn health_check(&self) -> StorageResult<()> {
            self.inner.health_check().await
        }

        async fn exists(&self, index: &str) -> StorageResult<bool> {
            self.inner.exists(index).await
        }

        async fn create(
            &self,
            index: &str,
            settings: &IndexSettings,
            types: &[DocumentType],
        ) -> StorageResult<()> {
            if self.fail_create {
                return Err(refused());
            }
            self.inner.create(index, settings, types).await
        }

        async fn delete(&self, index: &str) -> StorageResult<()> {
            self.inner.delete(index).await
        }

        async fn put_mapping(&self, index: &str, types: &[DocumentType]) -> StorageResult<()> {
            self.inner.put_mapping(index, types).await
        }

        async fn bulk_write(
            &self,
            index: &str,
            document_type: DocumentType,
            documents: Vec<IndexDocument>,
        ) -> StorageResult<BulkResponse> {
            self.bulk_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(marked) = &self.failing_document {
                if documents.iter().any(|d| &d.id == marked) {
                    return Err(refused());
                }
            }
            self.inner.bulk_write(index, document_type, documents).await
        }

        async fn delete_documents(
            &self,
            index: &str,
            document_type: DocumentType,
            ids: &[String],
        ) -> StorageResult<BulkResponse> {
            self.inner.delete_documents(index, document_type, ids).await
        }

        async fn delete_documents_of_type(
            &self,
            index: &str,
            document_type: DocumentType,
        ) -> StorageResult<u64> {
            self.inner.delete_documents_of_type(index, document_type).await
        }

        async fn flush(&self, index: &str) -> StorageResult<()> {
            if self.fail_flush {
                return Err(refused());
            }
            self.inner.flush(index).await
        }
    }

    fn code_run(config: &ReindexConfig) -> IndexRun {
        IndexRun::new(
            config.main_index(),
            RunMode::Rebuild,
            &DocumentType::MAIN,
            vec![(DocumentType::Code, SourceScope::All)],
        )
    }

    #[test]
    fn test_index_names() {
        let config = ReindexConfig::default().with_prefix("yti");
        assert_eq!(config.registries_index(), "yti_registries");
        assert_eq!(config.registry_index("JHS"), "yti_registry_jhs");
        assert_eq!(config.main_index(), "yti_codelist");
    }

    #[test]
    fn test_registry_index_encodes_reserved_characters() {
        let config = ReindexConfig::default();
        assert_eq!(config.registry_index("*"), "codelist_registry_%2a");
        assert_eq!(config.registry_index("A#b"), "codelist_registry_a%23b");
        assert_eq!(config.registry_index("a.b+c&d-e_f"), "codelist_registry_a.b+c&d-e_f");
        assert_ne!(config.registry_index("x*"), config.registry_index("x%2a"));
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(ReindexStage::Drop.to_string(), "drop");
        assert_eq!(ReindexStage::Flush.to_string(), "flush");
    }

    #[tokio::test]
    async fn test_partitioned_run_with_failed_chunk() {
        let source = Arc::new(CodeSource::with_codes(12_345));
        // Documents are chunked in source order; id 5_500 lands in the sixth chunk.
        let client = Arc::new(FlakyClient {
            failing_document: Some(source.ids[5_500].to_string()),
            ..Default::default()
        });
        let config = ReindexConfig::default();
        let orchestrator = ReindexOrchestrator::new(source.clone(), client.clone(), config.clone());

        let report = orchestrator.execute(code_run(&config)).await;

        assert!(report.succeeded());
        assert_eq!(report.page_fetches, 2);
        assert_eq!(source.page_fetches.load(Ordering::SeqCst), 2);
        assert_eq!(report.chunks_submitted, 13);
        assert_eq!(client.bulk_calls.load(Ordering::SeqCst), 13);
        assert_eq!(report.chunk_failures, 1);
        assert_eq!(report.documents_written, 12_345 - 1_000);
        assert_eq!(client.inner.document_count(&config.main_index()), 11_345);
        assert_eq!(
            report.stages_completed,
            vec![
                ReindexStage::Drop,
                ReindexStage::Create,
                ReindexStage::Stream,
                ReindexStage::Flush
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_run_creates_index() {
        let source = Arc::new(CodeSource::with_codes(0));
        let client = Arc::new(FlakyClient::default());
        let config = ReindexConfig::default();
        let orchestrator = ReindexOrchestrator::new(source, client.clone(), config.clone());

        let report = orchestrator.execute(code_run(&config)).await;

        assert!(report.is_clean());
        assert_eq!(report.documents_written, 0);
        assert_eq!(report.chunks_submitted, 0);
        assert!(client.inner.exists(&config.main_index()).await.unwrap());
        assert_eq!(
            client.inner.settings(&config.main_index()).unwrap().max_result_window,
            500_000
        );
    }

    #[tokio::test]
    async fn test_create_failure_aborts_run() {
        let source = Arc::new(CodeSource::with_codes(10));
        let client = Arc::new(FlakyClient {
            fail_create: true,
            ..Default::default()
        });
        let config = ReindexConfig::default();
        let orchestrator = ReindexOrchestrator::new(source, client.clone(), config.clone());

        let report = orchestrator.execute(code_run(&config)).await;

        assert!(!report.succeeded());
        assert_eq!(report.failed_stage, Some(ReindexStage::Create));
        assert_eq!(report.stages_completed, vec![ReindexStage::Drop]);
        let error = report.error.unwrap();
        assert!(error.contains("codelist_codelist"));
        assert!(error.contains("create"));
        assert_eq!(client.bulk_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_flush_failure_is_reported() {
        let source = Arc::new(CodeSource::with_codes(3));
        let client = Arc::new(FlakyClient {
            fail_flush: true,
            ..Default::default()
        });
        let config = ReindexConfig::default();
        let orchestrator = ReindexOrchestrator::new(source, client, config.clone());

        let report = orchestrator.execute(code_run(&config)).await;

        assert_eq!(report.failed_stage, Some(ReindexStage::Flush));
        assert_eq!(report.documents_written, 3);
    }

    #[tokio::test]
    async fn test_index_entities_reports_failures_as_warnings() {
        let source = Arc::new(CodeSource::with_codes(2));
        let client = Arc::new(FlakyClient {
            failing_document: Some(source.ids[0].to_string()),
            ..Default::default()
        });
        let orchestrator =
            ReindexOrchestrator::new(source.clone(), client.clone(), ReindexConfig::default());

        let warnings = orchestrator
            .index_entities(DocumentType::Code, &source.ids)
            .await;

        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("connection refused"));
    }

    #[tokio::test]
    async fn test_remove_entities() {
        let source = Arc::new(CodeSource::with_codes(2));
        let client = Arc::new(FlakyClient::default());
        let config = ReindexConfig::default();
        let orchestrator = ReindexOrchestrator::new(source.clone(), client.clone(), config.clone());

        assert!(orchestrator.index_entities(DocumentType::Code, &source.ids).await.is_empty());
        assert_eq!(client.inner.document_count(&config.main_index()), 2);

        let warnings = orchestrator
            .remove_entities(DocumentType::Code, &source.ids[..1], None)
            .await;
        assert!(warnings.is_empty());
        assert_eq!(client.inner.document_count(&config.main_index()), 1);
    }

    #[tokio::test]
    async fn test_unknown_scheme_is_not_found() {
        let orchestrator = ReindexOrchestrator::new(
            Arc::new(CodeSource::with_codes(0)),
            Arc::new(InMemoryIndexClient::new()),
            ReindexConfig::default(),
        );
        let err = orchestrator.reindex_scheme("jhs", "nope").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
