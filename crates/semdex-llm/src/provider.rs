use std::future::Future;

use crate::error::LlmError;

/// One chunk handed to a summarization backend.
#[derive(Debug, Clone, Copy)]
pub struct SummaryInput<'a> {
    pub text: &'a str,
    pub kind: &'a str,
    pub symbol_name: Option<&'a str>,
}

pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts.
    ///
    /// The returned vector has the same length and order as `texts`. A `None`
    /// entry marks a single text the backend could not embed.
    ///
    /// # Errors
    ///
    /// Returns an error if the whole batch failed.
    fn embed_batch(
        &self,
        texts: &[String],
    ) -> impl Future<Output = Result<Vec<Option<Vec<f32>>>, LlmError>> + Send;

    /// Identifier of the embedding model, persisted alongside stored vectors.
    fn model_id(&self) -> &str;

    fn name(&self) -> &'static str;
}

pub trait SummaryProvider: Send + Sync {
    /// Produce one short description per chunk, same length and order as input.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a malformed response.
    fn summarize_batch(
        &self,
        chunks: &[SummaryInput<'_>],
        language_id: &str,
    ) -> impl Future<Output = Result<Vec<String>, LlmError>> + Send;
}
