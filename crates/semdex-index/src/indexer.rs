//! Indexing orchestrator: workspace → chunk → summarize → embed → store.
//!
//! One [`CodeIndexer`] owns the pipeline for a workspace. Full scans and
//! incremental batches share a single-flight guard, so at most one pass is
//! ever writing. Change notifications accumulate in a pending set that a
//! debounce timer drains through the same guard.

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use lru::LruCache;
use semdex_llm::{EmbeddingProvider, SummaryProvider};
use serde::Serialize;
use tokio::sync::watch;

use crate::chunker::{Chunk, ChunkKind, Chunker};
use crate::debounce::Debouncer;
use crate::error::{IndexError, Result};
use crate::progress::{IndexProgress, IndexState};
use crate::store::{ChunkRecord, EmbeddingStore, IndexedFileInfo, StoreStats};
use crate::summarizer::{self, Summarizer, SummarizerConfig};
use crate::workspace::WorkspaceSource;

#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// When false, every control call is a no-op and search returns nothing.
    pub enabled: bool,
    /// Generate summaries and embed them instead of raw chunk text.
    pub summarize: bool,
    pub summarizer: SummarizerConfig,
    /// Files larger than this are skipped.
    pub max_file_bytes: u64,
    pub debounce: Duration,
    /// Texts per embedding call.
    pub embed_batch_size: usize,
    pub embed_timeout: Duration,
    pub query_cache_size: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            summarize: false,
            summarizer: SummarizerConfig::default(),
            max_file_bytes: 1024 * 1024,
            debounce: Duration::from_millis(1500),
            embed_batch_size: 32,
            embed_timeout: Duration::from_secs(60),
            query_cache_size: 64,
        }
    }
}

/// Summary of one indexing pass.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub files_scanned: usize,
    pub files_indexed: usize,
    pub files_unchanged: usize,
    pub files_skipped: usize,
    pub files_removed: usize,
    pub chunks_created: usize,
    pub cancelled: bool,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub uri: String,
    pub text: String,
    /// `1 - cosine distance`.
    pub score: f32,
    pub line_start: usize,
    pub line_end: usize,
    pub chunk_kind: ChunkKind,
    pub symbol_name: Option<String>,
    pub language_id: String,
    pub summary: Option<String>,
}

/// What happened to a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    Indexed { chunks: usize },
    Unchanged,
    Removed,
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Empty,
    TooLarge,
    NoChunks,
    NoEmbeddings,
    Provider,
    Unreadable,
}

impl SkipReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::TooLarge => "too large",
            Self::NoChunks => "no chunks",
            Self::NoEmbeddings => "no embeddings",
            Self::Provider => "provider error",
            Self::Unreadable => "unreadable",
        }
    }
}

struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct CodeIndexer<P> {
    store: EmbeddingStore,
    provider: Arc<P>,
    chunker: Chunker,
    summarizer: Option<Summarizer<P>>,
    workspace: Arc<dyn WorkspaceSource>,
    config: IndexerConfig,
    progress: watch::Sender<IndexProgress>,
    running: AtomicBool,
    cancel: AtomicBool,
    pending: Mutex<HashSet<String>>,
    debouncer: Debouncer,
    query_cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl<P> CodeIndexer<P>
where
    P: EmbeddingProvider + SummaryProvider + 'static,
{
    #[must_use]
    pub fn new(
        store: EmbeddingStore,
        provider: Arc<P>,
        workspace: Arc<dyn WorkspaceSource>,
        chunker: Chunker,
        config: IndexerConfig,
    ) -> Self {
        let summarizer = config.summarize.then(|| {
            Summarizer::new(
                Arc::clone(&provider),
                store.clone(),
                config.summarizer.clone(),
            )
        });
        let cache_size = NonZeroUsize::new(config.query_cache_size).unwrap_or(NonZeroUsize::MIN);
        let (progress, _) = watch::channel(IndexProgress::default());
        Self {
            store,
            provider,
            chunker,
            summarizer,
            workspace,
            debouncer: Debouncer::new(config.debounce),
            config,
            progress,
            running: AtomicBool::new(false),
            cancel: AtomicBool::new(false),
            pending: Mutex::new(HashSet::new()),
            query_cache: Mutex::new(LruCache::new(cache_size)),
        }
    }

    #[must_use]
    pub fn store(&self) -> &EmbeddingStore {
        &self.store
    }

    #[must_use]
    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    #[must_use]
    pub fn progress(&self) -> IndexProgress {
        self.progress.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<IndexProgress> {
        self.progress.subscribe()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn state(&self) -> IndexState {
        self.progress.borrow().state
    }

    fn set_state(&self, state: IndexState) {
        self.progress.send_modify(|p| {
            p.state = state;
            p.current_file = None;
            if state != IndexState::Error {
                p.error_message = None;
            }
        });
    }

    fn fail(&self, message: String) {
        tracing::error!("indexer entered error state: {message}");
        self.progress.send_modify(|p| {
            p.state = IndexState::Error;
            p.current_file = None;
            p.error_message = Some(message);
        });
    }

    fn try_begin(&self) -> Option<PassGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| PassGuard(&self.running))
    }

    /// Bring the indexer to `Ready`, discarding summary jobs an earlier run left behind.
    ///
    /// Also the only way out of the `Error` state.
    ///
    /// # Errors
    ///
    /// Returns an error if the job ledger cannot be read; the indexer is then in `Error`.
    pub async fn initialize(&self) -> Result<()> {
        if !self.config.enabled {
            self.set_state(IndexState::Disabled);
            return Ok(());
        }
        if self.is_running() {
            return Ok(());
        }
        self.set_state(IndexState::Initializing);
        match summarizer::recover_jobs(&self.store).await {
            Ok(0) => {}
            Ok(n) => tracing::info!(discarded = n, "recovered summary job ledger"),
            Err(e) => {
                self.fail(format!("job recovery failed: {e}"));
                return Err(e);
            }
        }
        self.set_state(IndexState::Ready);
        Ok(())
    }

    /// Scan the whole workspace.
    ///
    /// Returns `Ok(None)` when indexing is disabled or another pass is already
    /// running.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::NeedsReinit`] in the `Error` state, or the error
    /// that aborted the scan (store failures also move the indexer to `Error`).
    pub async fn start_indexing(&self) -> Result<Option<IndexReport>> {
        if !self.config.enabled {
            self.set_state(IndexState::Disabled);
            return Ok(None);
        }
        match self.state() {
            IndexState::Disabled => return Ok(None),
            IndexState::Error => return Err(self.needs_reinit()),
            IndexState::Idle => self.initialize().await?,
            _ => {}
        }
        let Some(_guard) = self.try_begin() else {
            tracing::debug!("indexing already in progress");
            return Ok(None);
        };
        self.cancel.store(false, Ordering::Release);

        let result = self.full_scan().await;
        self.finish_pass(result).map(Some)
    }

    /// Ask the running pass to stop before its next file.
    pub fn stop_indexing(&self) {
        if self.is_running() {
            tracing::info!("indexing cancellation requested");
            self.cancel.store(true, Ordering::Release);
        }
    }

    fn needs_reinit(&self) -> IndexError {
        let msg = self
            .progress
            .borrow()
            .error_message
            .clone()
            .unwrap_or_default();
        IndexError::NeedsReinit(msg)
    }

    fn finish_pass(&self, result: Result<IndexReport>) -> Result<IndexReport> {
        match result {
            Ok(report) => {
                self.set_state(IndexState::Ready);
                tracing::info!(
                    indexed = report.files_indexed,
                    unchanged = report.files_unchanged,
                    skipped = report.files_skipped,
                    removed = report.files_removed,
                    chunks = report.chunks_created,
                    cancelled = report.cancelled,
                    duration_ms = report.duration_ms,
                    "indexing pass finished"
                );
                Ok(report)
            }
            Err(e @ IndexError::Store(_)) => {
                self.fail(e.to_string());
                Err(e)
            }
            Err(e) => {
                tracing::warn!("indexing pass aborted: {e:#}");
                self.set_state(IndexState::Ready);
                Err(e)
            }
        }
    }

    async fn full_scan(&self) -> Result<IndexReport> {
        let start = Instant::now();
        let uris = self.workspace.list_files().await?;
        tracing::info!(total = uris.len(), "indexing started");

        let mut report = IndexReport::default();
        let processed = self.process_files(&uris, &mut report).await?;

        if processed == uris.len() {
            let current: HashSet<&str> = uris.iter().map(String::as_str).collect();
            for uri in self.store.indexed_uris().await? {
                if !current.contains(uri.as_str()) && self.store.remove_file(&uri).await? {
                    tracing::debug!(file = %uri, "removed file no longer in workspace");
                    report.files_removed += 1;
                }
            }
        }

        report.duration_ms = start.elapsed().as_millis().try_into().unwrap_or(u64::MAX);
        Ok(report)
    }

    /// Process `uris` in order, returning how many were handled before a cancellation.
    async fn process_files(&self, uris: &[String], report: &mut IndexReport) -> Result<usize> {
        let total = uris.len();
        self.progress.send_modify(|p| {
            p.state = IndexState::Indexing;
            p.total_files = total;
            p.indexed_files = 0;
            p.current_file = None;
            p.error_message = None;
        });

        for (i, uri) in uris.iter().enumerate() {
            if self.cancel.load(Ordering::Acquire) {
                tracing::info!(processed = i, total, "indexing cancelled");
                report.cancelled = true;
                return Ok(i);
            }
            report.files_scanned += 1;
            self.progress
                .send_modify(|p| p.current_file = Some(uri.clone()));

            match self.index_file(uri).await {
                Ok(FileOutcome::Indexed { chunks }) => {
                    report.files_indexed += 1;
                    report.chunks_created += chunks;
                    tracing::info!(
                        file = %uri,
                        progress = format_args!("{}/{total}", i + 1),
                        chunks,
                    );
                }
                Ok(FileOutcome::Unchanged) => report.files_unchanged += 1,
                Ok(FileOutcome::Removed) => report.files_removed += 1,
                Ok(FileOutcome::Skipped(reason)) => {
                    tracing::debug!(file = %uri, reason = reason.as_str(), "skipped");
                    report.files_skipped += 1;
                }
                Err(e @ IndexError::Store(_)) => return Err(e),
                Err(e) => {
                    tracing::warn!(file = %uri, "indexing failed: {e:#}");
                    report.errors.push(format!("{uri}: {e:#}"));
                    report.files_skipped += 1;
                }
            }
            self.progress.send_modify(|p| p.indexed_files = i + 1);
        }
        Ok(total)
    }

    /// Skip `uri` and drop whatever an earlier version of it left in the store.
    ///
    /// Provider errors do not come through here: the old entry stays until the
    /// provider recovers.
    async fn skip_and_drop(&self, uri: &str, reason: SkipReason) -> Result<FileOutcome> {
        if self.store.remove_file(uri).await? {
            tracing::debug!(file = %uri, reason = reason.as_str(), "dropped stale entry");
        }
        Ok(FileOutcome::Skipped(reason))
    }

    /// Bring one file's store record up to date with the workspace.
    async fn index_file(&self, uri: &str) -> Result<FileOutcome> {
        if let Some(size) = self.workspace.file_size(uri).await?
            && size > self.config.max_file_bytes
        {
            return self.skip_and_drop(uri, SkipReason::TooLarge).await;
        }
        let Some(file) = self.workspace.read_file(uri).await? else {
            if self.store.remove_file(uri).await? {
                return Ok(FileOutcome::Removed);
            }
            return Ok(FileOutcome::Skipped(SkipReason::Unreadable));
        };
        if file.text.trim().is_empty() {
            return self.skip_and_drop(uri, SkipReason::Empty).await;
        }
        if file.size > self.config.max_file_bytes {
            return self.skip_and_drop(uri, SkipReason::TooLarge).await;
        }

        let hash = blake3::hash(file.text.as_bytes()).to_hex().to_string();
        if self.store.is_indexed(uri, &hash).await? {
            return Ok(FileOutcome::Unchanged);
        }

        let chunks = self.chunker.chunk(&file.text, &file.language_id);
        if chunks.is_empty() {
            return self.skip_and_drop(uri, SkipReason::NoChunks).await;
        }

        let summaries = self.summaries_for(&chunks, &file.language_id, uri).await;
        let texts: Vec<String> = chunks
            .iter()
            .zip(&summaries)
            .map(|(chunk, summary)| {
                summary
                    .as_deref()
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or(&chunk.text)
                    .to_owned()
            })
            .collect();

        let embeddings = match self.embed_texts(&texts).await {
            Ok(embeddings) => embeddings,
            Err(e) => {
                tracing::warn!(file = %uri, "embedding failed, skipping file: {e:#}");
                return Ok(FileOutcome::Skipped(SkipReason::Provider));
            }
        };

        let records: Vec<ChunkRecord> = chunks
            .into_iter()
            .zip(summaries)
            .zip(embeddings)
            .filter_map(|((chunk, summary), embedding)| {
                let embedding = embedding?;
                Some(ChunkRecord {
                    text: chunk.text,
                    line_start: chunk.line_start,
                    line_end: chunk.line_end,
                    kind: chunk.kind,
                    symbol_name: chunk.symbol_name,
                    summary,
                    embedding,
                })
            })
            .collect();
        if records.is_empty() {
            return self.skip_and_drop(uri, SkipReason::NoEmbeddings).await;
        }
        if records.len() < texts.len() {
            tracing::warn!(
                file = %uri,
                dropped = texts.len() - records.len(),
                "some chunks failed to embed"
            );
        }

        let chunks = self
            .store
            .store_file(uri, &hash, &file.language_id, &records)
            .await?;
        Ok(FileOutcome::Indexed { chunks })
    }

    async fn summaries_for(&self, chunks: &[Chunk], language_id: &str, uri: &str) -> Vec<Option<String>> {
        let Some(ref summarizer) = self.summarizer else {
            return vec![None; chunks.len()];
        };
        match summarizer.summarize(chunks, language_id, Some(uri)).await {
            Ok(summaries) => summaries.into_iter().map(Some).collect(),
            Err(e) => {
                tracing::warn!(file = %uri, "summarization unavailable, embedding raw text: {e:#}");
                vec![None; chunks.len()]
            }
        }
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.embed_batch_size.max(1)) {
            let embeddings = tokio::time::timeout(
                self.config.embed_timeout,
                self.provider.embed_batch(batch),
            )
            .await
            .map_err(|_| IndexError::Timeout(self.config.embed_timeout))??;
            if embeddings.len() != batch.len() {
                return Err(IndexError::Other(format!(
                    "{} returned {} embeddings for {} texts",
                    self.provider.name(),
                    embeddings.len(),
                    batch.len()
                )));
            }
            out.extend(embeddings);
        }
        Ok(out)
    }

    /// Queue `uri` for re-indexing after the debounce window.
    pub fn notify_changed(self: &Arc<Self>, uri: impl Into<String>) {
        if !self.config.enabled {
            return;
        }
        let uri = uri.into();
        if !self.workspace.accepts(&uri) {
            return;
        }
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(uri);
        self.schedule_flush();
    }

    /// Remove `uri` from the store immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the store delete fails; the indexer is then in `Error`.
    pub async fn notify_deleted(&self, uri: &str) -> Result<bool> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(uri);
        if !self.config.enabled {
            return Ok(false);
        }
        match self.store.remove_file(uri).await {
            Ok(removed) => {
                if removed {
                    tracing::debug!(file = %uri, "removed deleted file");
                }
                Ok(removed)
            }
            Err(e) => {
                self.fail(e.to_string());
                Err(e)
            }
        }
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn schedule_flush(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.debouncer.arm(async move {
            if let Some(this) = weak.upgrade() {
                // detached so a later re-arm cannot abort a pass mid-file
                tokio::spawn(async move {
                    this.flush_pending().await;
                });
            }
        });
    }

    /// Index every pending URI now.
    ///
    /// If a pass is already running the timer is re-armed and the pending set
    /// kept. Returns `None` when nothing ran.
    pub async fn flush_pending(self: &Arc<Self>) -> Option<IndexReport> {
        match self.state() {
            IndexState::Disabled | IndexState::Error => return None,
            _ => {}
        }
        let Some(_guard) = self.try_begin() else {
            self.schedule_flush();
            return None;
        };

        let mut uris: Vec<String> = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();
        if uris.is_empty() {
            return None;
        }
        uris.sort();
        self.cancel.store(false, Ordering::Release);

        let start = Instant::now();
        let mut report = IndexReport::default();
        let result = match self.process_files(&uris, &mut report).await {
            Ok(processed) => {
                if processed < uris.len() {
                    self.pending
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .extend(uris.drain(processed..));
                }
                report.duration_ms = start.elapsed().as_millis().try_into().unwrap_or(u64::MAX);
                Ok(report)
            }
            Err(e) => Err(e),
        };
        self.finish_pass(result).ok()
    }

    /// Top `limit` chunks most similar to `query`, optionally within one language.
    ///
    /// Empty when indexing is disabled, the store is empty, or the query cannot be embedded.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        language_id: Option<&str>,
    ) -> Result<Vec<SearchResult>> {
        if !self.config.enabled || limit == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let Some(embedding) = self.query_embedding(query).await else {
            return Ok(Vec::new());
        };
        let hits = self
            .store
            .search_knn_filtered(&embedding, limit, language_id)
            .await?;
        Ok(hits
            .into_iter()
            .map(|hit| SearchResult {
                score: 1.0 - hit.distance,
                uri: hit.chunk.uri,
                text: hit.chunk.text,
                line_start: hit.chunk.line_start,
                line_end: hit.chunk.line_end,
                chunk_kind: hit.chunk.kind,
                symbol_name: hit.chunk.symbol_name,
                language_id: hit.chunk.language_id,
                summary: hit.chunk.summary,
            })
            .collect())
    }

    async fn query_embedding(&self, query: &str) -> Option<Vec<f32>> {
        if let Some(cached) = self
            .query_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(query)
        {
            return Some(cached.clone());
        }

        let embedding = match self.embed_texts(&[query.to_owned()]).await {
            Ok(mut v) => v.pop().flatten()?,
            Err(e) => {
                tracing::warn!("query embedding failed: {e:#}");
                return None;
            }
        };
        self.query_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .put(query.to_owned(), embedding.clone());
        Some(embedding)
    }

    /// # Errors
    ///
    /// Returns an error if the store query fails.
    pub async fn indexed_files(&self) -> Result<Vec<IndexedFileInfo>> {
        self.store.indexed_files().await
    }

    /// # Errors
    ///
    /// Returns an error if the store query fails.
    pub async fn stats(&self) -> Result<StoreStats> {
        self.store.stats().await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use semdex_llm::mock::MockProvider;

    use super::*;
    use crate::chunker::ChunkerConfig;
    use crate::store::StoreConfig;
    use crate::syntax::NoParseTrees;
    use crate::workspace::{BoxFuture, SourceFile};

    /// In-memory workspace with mutable contents.
    #[derive(Default)]
    struct MapWorkspace {
        files: Mutex<HashMap<String, String>>,
    }

    impl MapWorkspace {
        fn set(&self, uri: &str, text: &str) {
            self.files.lock().unwrap().insert(uri.into(), text.into());
        }

        fn remove(&self, uri: &str) {
            self.files.lock().unwrap().remove(uri);
        }
    }

    impl WorkspaceSource for MapWorkspace {
        fn list_files(&self) -> BoxFuture<'_, Result<Vec<String>>> {
            let mut uris: Vec<String> = self.files.lock().unwrap().keys().cloned().collect();
            uris.sort();
            Box::pin(async move { Ok(uris) })
        }

        fn read_file<'a>(&'a self, uri: &'a str) -> BoxFuture<'a, Result<Option<SourceFile>>> {
            let file = self.files.lock().unwrap().get(uri).map(|text| SourceFile {
                size: text.len() as u64,
                text: text.clone(),
                language_id: "plaintext".into(),
            });
            Box::pin(async move { Ok(file) })
        }

        fn accepts(&self, _uri: &str) -> bool {
            true
        }
    }

    fn body(word: &str) -> String {
        (0..12)
            .map(|i| format!("{word} line number {i} with enough text\n"))
            .collect()
    }

    async fn indexer(
        provider: MockProvider,
        config: IndexerConfig,
    ) -> (Arc<CodeIndexer<MockProvider>>, Arc<MapWorkspace>) {
        let store = EmbeddingStore::open(&StoreConfig::in_memory(
            provider.model_id.clone(),
            provider.dimensions,
        ))
        .await
        .unwrap();
        let ws = Arc::new(MapWorkspace::default());
        let chunker = Chunker::new(Arc::new(NoParseTrees), ChunkerConfig::default());
        let indexer = CodeIndexer::new(
            store,
            Arc::new(provider),
            Arc::clone(&ws) as Arc<dyn WorkspaceSource>,
            chunker,
            config,
        );
        (Arc::new(indexer), ws)
    }

    #[tokio::test]
    async fn initialize_reaches_ready() {
        let (idx, _) = indexer(MockProvider::default(), IndexerConfig::default()).await;
        assert_eq!(idx.progress().state, IndexState::Idle);
        idx.initialize().await.unwrap();
        assert_eq!(idx.progress().state, IndexState::Ready);
    }

    #[tokio::test]
    async fn disabled_indexer_is_inert() {
        let config = IndexerConfig {
            enabled: false,
            ..IndexerConfig::default()
        };
        let (idx, ws) = indexer(MockProvider::default(), config).await;
        ws.set("a.txt", &body("alpha"));
        idx.initialize().await.unwrap();
        assert_eq!(idx.progress().state, IndexState::Disabled);
        assert!(idx.start_indexing().await.unwrap().is_none());
        assert!(idx.search("alpha", 5, None).await.unwrap().is_empty());
        idx.notify_changed("a.txt");
        assert_eq!(idx.pending_count(), 0);
    }

    #[tokio::test]
    async fn full_scan_indexes_and_skips_unchanged() {
        let provider = MockProvider::default();
        let (idx, ws) = indexer(provider.clone(), IndexerConfig::default()).await;
        ws.set("a.txt", &body("alpha"));
        ws.set("b.txt", &body("beta"));
        ws.set("empty.txt", "   \n");

        let report = idx.start_indexing().await.unwrap().unwrap();
        assert_eq!(report.files_scanned, 3);
        assert_eq!(report.files_indexed, 2);
        assert_eq!(report.files_skipped, 1);
        assert!(report.chunks_created >= 2);
        assert_eq!(idx.progress().state, IndexState::Ready);
        assert_eq!(idx.progress().indexed_files, 3);

        let calls = provider.embed_calls();
        let again = idx.start_indexing().await.unwrap().unwrap();
        assert_eq!(again.files_unchanged, 2);
        assert_eq!(again.files_indexed, 0);
        assert_eq!(provider.embed_calls(), calls);
    }

    #[tokio::test]
    async fn oversized_file_is_skipped() {
        let config = IndexerConfig {
            max_file_bytes: 64,
            ..IndexerConfig::default()
        };
        let (idx, ws) = indexer(MockProvider::default(), config).await;
        ws.set("big.txt", &body("big"));
        let report = idx.start_indexing().await.unwrap().unwrap();
        assert_eq!(report.files_skipped, 1);
        assert_eq!(idx.stats().await.unwrap().file_count, 0);
    }

    #[tokio::test]
    async fn emptied_file_drops_stale_chunks() {
        let (idx, ws) = indexer(MockProvider::default(), IndexerConfig::default()).await;
        ws.set("a.txt", &body("forgotten_helper"));
        idx.start_indexing().await.unwrap();
        assert!(!idx.store().get_chunks_for_file("a.txt").await.unwrap().is_empty());

        ws.set("a.txt", "\n");
        let report = idx.start_indexing().await.unwrap().unwrap();
        assert_eq!(report.files_skipped, 1);
        assert!(idx.store().get_chunks_for_file("a.txt").await.unwrap().is_empty());
        assert_eq!(idx.stats().await.unwrap().file_count, 0);
        assert!(
            idx.search("forgotten_helper line number", 5, None)
                .await
                .unwrap()
                .is_empty()
        );

        let again = idx.start_indexing().await.unwrap().unwrap();
        assert_eq!(again.files_skipped, 1);
        assert_eq!(again.files_removed, 0);
    }

    #[tokio::test]
    async fn file_grown_past_limit_drops_stale_chunks() {
        let config = IndexerConfig {
            max_file_bytes: 1024,
            ..IndexerConfig::default()
        };
        let (idx, ws) = indexer(MockProvider::default(), config).await;
        ws.set("a.txt", &body("alpha"));
        idx.start_indexing().await.unwrap();
        assert_eq!(idx.stats().await.unwrap().file_count, 1);

        ws.set("a.txt", &body("alpha").repeat(4));
        let report = idx.start_indexing().await.unwrap().unwrap();
        assert_eq!(report.files_skipped, 1);
        assert!(idx.store().get_chunks_for_file("a.txt").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn file_with_only_null_embeddings_drops_stale_chunks() {
        let provider = MockProvider::default().with_null_embeddings("gamma");
        let (idx, ws) = indexer(provider, IndexerConfig::default()).await;
        ws.set("a.txt", &body("alpha"));
        idx.start_indexing().await.unwrap();

        ws.set("a.txt", &body("gamma"));
        let report = idx.start_indexing().await.unwrap().unwrap();
        assert_eq!(report.files_skipped, 1);
        assert!(idx.store().get_chunks_for_file("a.txt").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn provider_failure_skips_file_and_continues() {
        let (idx, ws) = indexer(MockProvider::failing_embeddings(), IndexerConfig::default()).await;
        ws.set("a.txt", &body("alpha"));
        let report = idx.start_indexing().await.unwrap().unwrap();
        assert_eq!(report.files_skipped, 1);
        assert_eq!(idx.progress().state, IndexState::Ready);
    }

    #[tokio::test]
    async fn null_embeddings_drop_chunks() {
        let provider = MockProvider::default().with_null_embeddings("gamma");
        let (idx, ws) = indexer(provider, IndexerConfig::default()).await;
        ws.set("g.txt", &body("gamma"));
        ws.set("a.txt", &body("alpha"));
        let report = idx.start_indexing().await.unwrap().unwrap();
        assert_eq!(report.files_indexed, 1);
        assert_eq!(report.files_skipped, 1);
        assert!(idx.store().get_chunks_for_file("g.txt").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn scan_prunes_vanished_files() {
        let (idx, ws) = indexer(MockProvider::default(), IndexerConfig::default()).await;
        ws.set("a.txt", &body("alpha"));
        ws.set("b.txt", &body("beta"));
        idx.start_indexing().await.unwrap();

        ws.remove("b.txt");
        let report = idx.start_indexing().await.unwrap().unwrap();
        assert_eq!(report.files_removed, 1);
        assert_eq!(idx.store().indexed_uris().await.unwrap(), vec!["a.txt"]);
    }

    #[tokio::test]
    async fn store_failure_requires_reinitialize() {
        let (idx, ws) = indexer(MockProvider::default(), IndexerConfig::default()).await;
        ws.set("a.txt", &body("alpha"));
        sqlx::query("DROP TABLE chunks")
            .execute(idx.store().pool())
            .await
            .unwrap();

        assert!(idx.start_indexing().await.is_err());
        let progress = idx.progress();
        assert_eq!(progress.state, IndexState::Error);
        assert!(progress.error_message.is_some());
        assert!(matches!(
            idx.start_indexing().await,
            Err(IndexError::NeedsReinit(_))
        ));

        idx.initialize().await.unwrap();
        assert_eq!(idx.progress().state, IndexState::Ready);
    }

    #[tokio::test]
    async fn search_ranks_matching_file_first() {
        let (idx, ws) = indexer(MockProvider::default(), IndexerConfig::default()).await;
        ws.set("parser.txt", &body("tokenizer grammar"));
        ws.set("network.txt", &body("socket retry"));
        idx.start_indexing().await.unwrap();

        let results = idx.search("socket retry", 3, None).await.unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].uri, "network.txt");
        assert!(results[0].score > 0.0);
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));

        assert!(idx.search("socket", 0, None).await.unwrap().is_empty());
        assert!(idx.search("socket", 3, Some("rust")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn query_embeddings_are_cached() {
        let provider = MockProvider::default();
        let (idx, ws) = indexer(provider.clone(), IndexerConfig::default()).await;
        ws.set("a.txt", &body("alpha"));
        idx.start_indexing().await.unwrap();

        let before = provider.embed_calls();
        idx.search("alpha", 1, None).await.unwrap();
        idx.search("alpha", 1, None).await.unwrap();
        assert_eq!(provider.embed_calls(), before + 1);
    }

    #[tokio::test]
    async fn search_on_empty_store_is_empty() {
        let (idx, _) = indexer(MockProvider::default(), IndexerConfig::default()).await;
        assert!(idx.search("anything", 5, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn summaries_are_embedded_and_stored() {
        let provider = MockProvider::default();
        let config = IndexerConfig {
            summarize: true,
            ..IndexerConfig::default()
        };
        let (idx, ws) = indexer(provider.clone(), config).await;
        ws.set("a.txt", &body("alpha"));
        idx.start_indexing().await.unwrap();

        let chunks = idx.store().get_chunks_for_file("a.txt").await.unwrap();
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| c.summary.as_deref().is_some_and(|s| s.starts_with("plaintext block"))));
        assert!(provider.summary_calls() >= 1);
        assert!(idx.store().jobs_for_file("a.txt").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn notify_deleted_removes_immediately() {
        let (idx, ws) = indexer(MockProvider::default(), IndexerConfig::default()).await;
        ws.set("a.txt", &body("alpha"));
        idx.start_indexing().await.unwrap();

        idx.notify_changed("a.txt");
        assert_eq!(idx.pending_count(), 1);
        assert!(idx.notify_deleted("a.txt").await.unwrap());
        assert_eq!(idx.pending_count(), 0);
        assert!(idx.store().indexed_uris().await.unwrap().is_empty());
        assert!(!idx.notify_deleted("a.txt").await.unwrap());
    }

    #[tokio::test]
    async fn flush_pending_indexes_changed_files() {
        let (idx, ws) = indexer(MockProvider::default(), IndexerConfig::default()).await;
        idx.initialize().await.unwrap();
        ws.set("a.txt", &body("alpha"));
        idx.notify_changed("a.txt");

        let report = idx.flush_pending().await.unwrap();
        assert_eq!(report.files_indexed, 1);
        assert_eq!(idx.pending_count(), 0);
        assert!(idx.flush_pending().await.is_none());
    }
}
