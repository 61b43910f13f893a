//! Embedding and summarization providers consumed by the semdex indexer.

pub mod error;
pub mod http;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod openai;
pub mod provider;
pub(crate) mod retry;

pub use error::LlmError;
pub use provider::{EmbeddingProvider, SummaryInput, SummaryProvider};
