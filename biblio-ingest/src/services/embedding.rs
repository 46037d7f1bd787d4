//! Record embeddings
//!
//! The embedding function is an external service. A record is flattened to
//! text ([`ImportRecord::flatten_for_embedding`]) and posted to the
//! configured endpoint; the returned vector is only ever used for cosine
//! similarity against stored records.
//!
//! [`ImportRecord::flatten_for_embedding`]: crate::models::ImportRecord::flatten_for_embedding

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const EMBEDDING_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Embedding service returned {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Vector for `text`, or `None` when embeddings are switched off
    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>, EmbeddingError>;
}

/// Used when no embedding endpoint is configured
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    async fn embed(&self, _text: &str) -> Result<Option<Vec<f32>>, EmbeddingError> {
        Ok(None)
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    text: &'a str,
}

/// Services answer either `{"embedding": [...]}` or a bare array
#[derive(Deserialize)]
#[serde(untagged)]
enum EmbeddingResponse {
    Wrapped { embedding: Vec<f32> },
    Bare(Vec<f32>),
}

pub struct HttpEmbedder {
    http_client: reqwest::Client,
    endpoint: String,
}

impl HttpEmbedder {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, EmbeddingError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(EMBEDDING_TIMEOUT_SECS))
            .build()
            .map_err(|e| EmbeddingError::NetworkError(e.to_string()))?;
        Ok(Self {
            http_client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>, EmbeddingError> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&EmbeddingRequest { text })
            .send()
            .await
            .map_err(|e| EmbeddingError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ApiError(status.as_u16(), body));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::ParseError(e.to_string()))?;
        let vector = match parsed {
            EmbeddingResponse::Wrapped { embedding } => embedding,
            EmbeddingResponse::Bare(embedding) => embedding,
        };
        if vector.is_empty() {
            return Err(EmbeddingError::ParseError("empty embedding vector".to_string()));
        }
        Ok(Some(vector))
    }
}

/// Cosine similarity; `None` for vectors of different length or zero norm
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some((dot / (norm_a.sqrt() * norm_b.sqrt())) as f32)
}
