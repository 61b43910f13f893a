//! Best-effort chunk summarization with a durable job ledger.
//!
//! Chunks are sent to the provider in batches. When a file id is supplied the
//! batches are grouped into jobs that are persisted before any network call,
//! so a crash leaves a ledger that [`Summarizer::recover_jobs`] can clean up.
//! A batch that fails for any reason gets local fallback summaries; it never
//! aborts the rest of the file.

use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use semdex_llm::{SummaryInput, SummaryProvider};

use crate::chunker::Chunk;
use crate::error::Result;
use crate::store::{EmbeddingStore, JobStatus};

const FALLBACK_LINE_CHARS: usize = 120;

#[derive(Debug, Clone)]
pub struct SummarizerConfig {
    /// Chunks per provider call.
    pub batch_size: usize,
    /// Chunks per durable job.
    pub job_size: usize,
    pub max_concurrent_jobs: usize,
    /// Deadline for a single batch call.
    pub timeout: Duration,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            batch_size: 8,
            job_size: 32,
            max_concurrent_jobs: 4,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Result of one provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Summarized(Vec<String>),
    Fallback { summaries: Vec<String>, reason: String },
}

impl BatchOutcome {
    #[must_use]
    pub fn into_summaries(self) -> Vec<String> {
        match self {
            Self::Summarized(s) | Self::Fallback { summaries: s, .. } => s,
        }
    }

    #[must_use]
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

pub struct Summarizer<P> {
    provider: Arc<P>,
    store: EmbeddingStore,
    config: SummarizerConfig,
}

impl<P: SummaryProvider> Summarizer<P> {
    #[must_use]
    pub fn new(provider: Arc<P>, store: EmbeddingStore, config: SummarizerConfig) -> Self {
        Self {
            provider,
            store,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &SummarizerConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &EmbeddingStore {
        &self.store
    }

    /// One summary per chunk, in input order.
    ///
    /// With `file_id` the work runs as concurrent ledger-tracked jobs, and the
    /// ledger entries for that file are deleted once every job has finished.
    ///
    /// # Errors
    ///
    /// Returns an error only if the job ledger cannot be written. Provider
    /// failures never surface here.
    pub async fn summarize(
        &self,
        chunks: &[Chunk],
        language_id: &str,
        file_id: Option<&str>,
    ) -> Result<Vec<String>> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }
        match file_id {
            Some(file_id) => self.summarize_jobs(chunks, language_id, file_id).await,
            None => {
                let mut out = Vec::with_capacity(chunks.len());
                for batch in chunks.chunks(self.config.batch_size.max(1)) {
                    out.extend(self.summarize_batch(batch, language_id).await.into_summaries());
                }
                Ok(out)
            }
        }
    }

    async fn summarize_jobs(
        &self,
        chunks: &[Chunk],
        language_id: &str,
        file_id: &str,
    ) -> Result<Vec<String>> {
        let ranges = job_ranges(chunks.len(), self.config.job_size);
        let ids = self.store.create_summary_jobs(file_id, &ranges).await?;

        let results: Vec<Result<(usize, Vec<String>)>> = futures::stream::iter(
            ids.into_iter().zip(ranges),
        )
        .map(|(id, range)| async move {
            let start = range.start;
            let summaries = self.run_job(id, &chunks[range], language_id).await?;
            Ok((start, summaries))
        })
        .buffer_unordered(self.config.max_concurrent_jobs.max(1))
        .collect()
        .await;

        let mut out = vec![String::new(); chunks.len()];
        for result in results {
            let (start, summaries) = result?;
            for (slot, summary) in out[start..].iter_mut().zip(summaries) {
                *slot = summary;
            }
        }

        self.store.delete_jobs_for_file(file_id).await?;
        Ok(out)
    }

    async fn run_job(&self, id: i64, chunks: &[Chunk], language_id: &str) -> Result<Vec<String>> {
        self.store.mark_job_running(id).await?;

        let mut summaries = Vec::with_capacity(chunks.len());
        let mut last_error = None;
        for batch in chunks.chunks(self.config.batch_size.max(1)) {
            match self.summarize_batch(batch, language_id).await {
                BatchOutcome::Summarized(s) => summaries.extend(s),
                BatchOutcome::Fallback {
                    summaries: s,
                    reason,
                } => {
                    summaries.extend(s);
                    last_error = Some(reason);
                }
            }
        }

        let status = if last_error.is_some() {
            JobStatus::Failed
        } else {
            JobStatus::Done
        };
        self.store
            .finish_job(id, status, &summaries, last_error.as_deref())
            .await?;
        Ok(summaries)
    }

    /// Summarize one batch, substituting local summaries on any failure.
    pub async fn summarize_batch(&self, batch: &[Chunk], language_id: &str) -> BatchOutcome {
        let inputs: Vec<SummaryInput<'_>> = batch
            .iter()
            .map(|c| SummaryInput {
                text: &c.text,
                kind: c.kind.as_str(),
                symbol_name: c.symbol_name.as_deref(),
            })
            .collect();

        let reason = match tokio::time::timeout(
            self.config.timeout,
            self.provider.summarize_batch(&inputs, language_id),
        )
        .await
        {
            Ok(Ok(summaries)) if summaries.len() == batch.len() => {
                return BatchOutcome::Summarized(summaries);
            }
            Ok(Ok(summaries)) => format!(
                "expected {} summaries, got {}",
                batch.len(),
                summaries.len()
            ),
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("timed out after {:?}", self.config.timeout),
        };

        tracing::warn!(
            language_id,
            chunks = batch.len(),
            "summary batch failed, using fallback: {reason}"
        );
        BatchOutcome::Fallback {
            summaries: batch.iter().map(fallback_summary).collect(),
            reason,
        }
    }

    /// Discard jobs a previous run left `pending` or `running`.
    ///
    /// Files whose jobs were interrupted were never stored with their new hash,
    /// so the next scan re-indexes them from scratch.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be read or updated.
    pub async fn recover_jobs(&self) -> Result<usize> {
        recover_jobs(&self.store).await
    }
}

/// Ledger cleanup usable without a configured summarizer.
///
/// # Errors
///
/// Returns an error if the ledger cannot be read or updated.
pub async fn recover_jobs(store: &EmbeddingStore) -> Result<usize> {
    let stale = store.unfinished_jobs().await?;
    for job in &stale {
        tracing::debug!(
            file = %job.file_id,
            status = job.status.as_str(),
            range = ?job.chunk_range,
            "discarding interrupted summary job"
        );
        store.delete_job(job.id).await?;
    }
    if !stale.is_empty() {
        tracing::warn!(count = stale.len(), "discarded interrupted summary jobs");
    }
    Ok(stale.len())
}

fn job_ranges(len: usize, job_size: usize) -> Vec<Range<usize>> {
    let step = job_size.max(1);
    (0..len)
        .step_by(step)
        .map(|start| start..(start + step).min(len))
        .collect()
}

/// Deterministic local summary used when the provider cannot produce one.
#[must_use]
pub fn fallback_summary(chunk: &Chunk) -> String {
    if let Some(ref symbol) = chunk.symbol_name {
        return format!("{} {symbol}", chunk.kind);
    }
    if let Some(line) = chunk
        .text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !is_comment(l))
    {
        return line.chars().take(FALLBACK_LINE_CHARS).collect();
    }
    format!(
        "{} at lines {}-{}",
        chunk.kind, chunk.line_start, chunk.line_end
    )
}

fn is_comment(line: &str) -> bool {
    const PREFIXES: &[&str] = &["//", "/*", "*", "--", "\"\"\"", "'''", "<!--"];
    PREFIXES.iter().any(|p| line.starts_with(p))
        || (line.starts_with('#') && !line.starts_with("#[") && !line.starts_with("#!"))
}
