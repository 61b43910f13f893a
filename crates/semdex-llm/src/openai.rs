use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::provider::{EmbeddingProvider, SummaryInput, SummaryProvider};
use crate::retry::send_with_retry;

const PROVIDER: &str = "openai";
const SUMMARY_MAX_TOKENS: u32 = 1024;

const SUMMARY_SYSTEM_PROMPT: &str = "You describe source code for a semantic search index. \
For every numbered chunk, write one sentence saying what the code does. \
Reply with a JSON array of strings only, one entry per chunk, in the same order.";

/// Provider speaking the OpenAI-compatible `/embeddings` and `/chat/completions` APIs.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    embedding_model: String,
    summary_model: Option<String>,
    max_retries: u32,
}

impl fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("embedding_model", &self.embedding_model)
            .field("summary_model", &self.summary_model)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl Clone for OpenAiProvider {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
            embedding_model: self.embedding_model.clone(),
            summary_model: self.summary_model.clone(),
            max_retries: self.max_retries,
        }
    }
}

impl OpenAiProvider {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        mut base_url: String,
        api_key: Option<String>,
        embedding_model: String,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Ok(Self {
            client: crate::http::build_client(timeout)?,
            api_key,
            base_url,
            embedding_model,
            summary_model: None,
            max_retries: 3,
        })
    }

    #[must_use]
    pub fn with_summary_model(mut self, model: impl Into<String>) -> Self {
        self.summary_model = Some(model.into());
        self
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn supports_summaries(&self) -> bool {
        self.summary_model.is_some()
    }

    async fn post_json<B: Serialize + Sync>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<String, LlmError> {
        let url = format!("{}/{endpoint}", self.base_url);
        let response = send_with_retry(PROVIDER, self.max_retries, || {
            let mut req = self
                .client
                .post(&url)
                .header("Content-Type", "application/json")
                .json(body);
            if let Some(ref key) = self.api_key {
                req = req.bearer_auth(key);
            }
            req.send()
        })
        .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            tracing::error!(endpoint, %status, body = %text, "provider request failed");
            return Err(LlmError::Status {
                provider: PROVIDER,
                status: status.as_u16(),
            });
        }
        Ok(text)
    }
}

impl EmbeddingProvider for OpenAiProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>, LlmError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = EmbeddingRequest {
            input: texts,
            model: &self.embedding_model,
        };
        let text = self.post_json("embeddings", &body).await?;
        let resp: EmbeddingResponse = serde_json::from_str(&text)?;
        Ok(align_embeddings(resp.data, texts.len()))
    }

    fn model_id(&self) -> &str {
        &self.embedding_model
    }

    fn name(&self) -> &'static str {
        PROVIDER
    }
}

impl SummaryProvider for OpenAiProvider {
    async fn summarize_batch(
        &self,
        chunks: &[SummaryInput<'_>],
        language_id: &str,
    ) -> Result<Vec<String>, LlmError> {
        let model = self
            .summary_model
            .as_deref()
            .ok_or(LlmError::NotConfigured("summary model"))?;
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let prompt = build_summary_prompt(chunks, language_id);
        let messages = [
            ApiMessage {
                role: "system",
                content: SUMMARY_SYSTEM_PROMPT,
            },
            ApiMessage {
                role: "user",
                content: &prompt,
            },
        ];
        let body = ChatRequest {
            model,
            messages: &messages,
            max_tokens: SUMMARY_MAX_TOKENS,
            temperature: 0.0,
        };

        let text = self.post_json("chat/completions", &body).await?;
        let resp: ChatResponse = serde_json::from_str(&text)?;
        let content = resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(LlmError::EmptyResponse { provider: PROVIDER })?;

        let summaries = parse_summary_array(&content)?;
        if summaries.len() != chunks.len() {
            return Err(LlmError::CountMismatch {
                expected: chunks.len(),
                actual: summaries.len(),
            });
        }
        Ok(summaries)
    }
}

/// Place each returned vector at its declared index; gaps and empty vectors become `None`.
fn align_embeddings(data: Vec<EmbeddingData>, expected: usize) -> Vec<Option<Vec<f32>>> {
    let mut out = vec![None; expected];
    for (pos, item) in data.into_iter().enumerate() {
        let idx = item.index.unwrap_or(pos);
        if idx < expected && !item.embedding.is_empty() {
            out[idx] = Some(item.embedding);
        }
    }
    out
}

fn build_summary_prompt(chunks: &[SummaryInput<'_>], language_id: &str) -> String {
    use std::fmt::Write;

    let mut prompt = format!("Language: {language_id}\n");
    for (i, chunk) in chunks.iter().enumerate() {
        let _ = write!(prompt, "\n### Chunk {} ({}", i + 1, chunk.kind);
        if let Some(name) = chunk.symbol_name {
            let _ = write!(prompt, " {name}");
        }
        let _ = writeln!(prompt, ")\n{}", chunk.text);
    }
    prompt
}

/// Models sometimes wrap the array in a markdown fence.
fn parse_summary_array(content: &str) -> Result<Vec<String>, LlmError> {
    let trimmed = content.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .unwrap_or(trimmed);
    Ok(serde_json::from_str(body.trim())?)
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ApiMessage<'a>],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}
