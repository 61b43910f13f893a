//! Test-only deterministic provider.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::LlmError;
use crate::provider::{EmbeddingProvider, SummaryInput, SummaryProvider};

/// Bag-of-words embeddings and echo summaries, with call counters and failure injection.
#[derive(Debug, Clone)]
pub struct MockProvider {
    pub dimensions: usize,
    pub model_id: String,
    pub fail_embed: bool,
    /// Batches containing a chunk with this substring fail to summarize.
    pub fail_summary_marker: Option<String>,
    /// Texts containing this substring embed to `None`.
    pub null_embedding_marker: Option<String>,
    /// Milliseconds to sleep before returning a response.
    pub delay_ms: u64,
    embed_calls: Arc<AtomicUsize>,
    embedded_texts: Arc<AtomicUsize>,
    summary_calls: Arc<AtomicUsize>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            dimensions: 64,
            model_id: "mock-embedding".into(),
            fail_embed: false,
            fail_summary_marker: None,
            null_embedding_marker: None,
            delay_ms: 0,
            embed_calls: Arc::new(AtomicUsize::new(0)),
            embedded_texts: Arc::new(AtomicUsize::new(0)),
            summary_calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl MockProvider {
    #[must_use]
    pub fn with_dimensions(dimensions: usize) -> Self {
        Self {
            dimensions,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing_embeddings() -> Self {
        Self {
            fail_embed: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_summary_failure(mut self, marker: impl Into<String>) -> Self {
        self.fail_summary_marker = Some(marker.into());
        self
    }

    #[must_use]
    pub fn with_null_embeddings(mut self, marker: impl Into<String>) -> Self {
        self.null_embedding_marker = Some(marker.into());
        self
    }

    #[must_use]
    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    #[must_use]
    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn embedded_texts(&self) -> usize {
        self.embedded_texts.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn summary_calls(&self) -> usize {
        self.summary_calls.load(Ordering::SeqCst)
    }

    /// Deterministic unit vector from hashed lowercase word tokens.
    #[must_use]
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimensions.max(1)];
        let len = v.len();
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let bucket = fnv1a(&token.to_lowercase()) % len as u64;
            #[allow(clippy::cast_possible_truncation)]
            {
                v[bucket as usize] += 1.0;
            }
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }

    async fn pause(&self) {
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
    }
}

fn fnv1a(s: &str) -> u64 {
    s.bytes().fold(0xcbf2_9ce4_8422_2325, |h, b| {
        (h ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
    })
}

impl EmbeddingProvider for MockProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>, LlmError> {
        self.pause().await;
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_embed {
            return Err(LlmError::Other("mock embedding error".into()));
        }
        self.embedded_texts.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|t| match self.null_embedding_marker {
                Some(ref marker) if t.contains(marker.as_str()) => None,
                _ => Some(self.embed_text(t)),
            })
            .collect())
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

impl SummaryProvider for MockProvider {
    async fn summarize_batch(
        &self,
        chunks: &[SummaryInput<'_>],
        language_id: &str,
    ) -> Result<Vec<String>, LlmError> {
        self.pause().await;
        self.summary_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(ref marker) = self.fail_summary_marker
            && chunks.iter().any(|c| c.text.contains(marker.as_str()))
        {
            return Err(LlmError::Other("mock summary error".into()));
        }
        Ok(chunks
            .iter()
            .map(|c| {
                let subject = c.symbol_name.unwrap_or(c.kind);
                let first = c.text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
                format!("{language_id} {subject}: {}", first.trim())
            })
            .collect())
    }
}
