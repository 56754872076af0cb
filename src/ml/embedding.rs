//! Embedding generation via an external feature-extraction endpoint
//!
//! Texts are sent one at a time to a HuggingFace-style feature-extraction
//! API (with `wait_for_model` so cold models spin up instead of erroring).
//! Returned vectors are padded to the storage schema dimension before any
//! caller persists or compares them.

use crate::config::EmbeddingConfig;
use crate::error::{BotError, Result};
use async_trait::async_trait;
use serde_json::json;

/// Embedding vector type
pub type Embedding = Vec<f32>;

/// How a model vector is widened to the schema dimension.
///
/// Cosine similarity over zero-padded vectors equals similarity over the
/// unpadded vectors (the padding cancels in the dot product), so padding is
/// safe as long as stored and query vectors use the same strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaddingStrategy {
    /// Append zeros up to `dimension`
    Trailing { dimension: usize },
    /// Prepend zeros up to `dimension`
    Leading { dimension: usize },
}

impl PaddingStrategy {
    /// Pad a vector to the target dimension.
    ///
    /// A vector already longer than the target is a configuration error:
    /// truncating would silently corrupt every similarity score, so this
    /// fails loudly instead.
    pub fn pad(&self, mut vector: Embedding) -> Result<Embedding> {
        let dimension = match self {
            PaddingStrategy::Trailing { dimension } | PaddingStrategy::Leading { dimension } => {
                *dimension
            }
        };

        if vector.len() > dimension {
            return Err(BotError::Config(format!(
                "Embedding dimension {} exceeds schema dimension {}",
                vector.len(),
                dimension
            )));
        }

        let missing = dimension - vector.len();
        match self {
            PaddingStrategy::Trailing { .. } => {
                vector.extend(std::iter::repeat(0.0).take(missing));
                Ok(vector)
            }
            PaddingStrategy::Leading { .. } => {
                let mut padded = vec![0.0; missing];
                padded.extend(vector);
                Ok(padded)
            }
        }
    }
}

/// Seam over the embedding backend so retrieval and ingestion can be tested
/// without network access
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts; every vector is padded to the schema dimension
    async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>>;

    /// Embed a single query text, padded identically to stored vectors
    async fn embed_query(&self, text: &str) -> Result<Embedding>;
}

/// HTTP client for a feature-extraction endpoint
pub struct HttpEmbedder {
    client: reqwest::Client,
    config: EmbeddingConfig,
    padding: PaddingStrategy,
}

impl HttpEmbedder {
    /// Create a new embedding client from configuration
    pub fn new(config: EmbeddingConfig) -> Self {
        let padding = PaddingStrategy::Trailing {
            dimension: config.schema_dimension,
        };
        Self {
            client: reqwest::Client::new(),
            config,
            padding,
        }
    }

    /// Call the endpoint for one text and return the raw model vector
    async fn fetch_embedding(&self, text: &str) -> Result<Embedding> {
        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&json!({
                "inputs": text,
                "options": { "wait_for_model": true }
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BotError::EmbeddingService(format!(
                "Endpoint returned {}",
                response.status()
            )));
        }

        let embedding: Embedding = response.json().await.map_err(|e| {
            BotError::EmbeddingService(format!("Malformed embedding response: {}", e))
        })?;

        if embedding.is_empty() {
            return Err(BotError::EmbeddingService(
                "Endpoint returned an empty vector".to_string(),
            ));
        }

        Ok(embedding)
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        // One request per text; the endpoint offers no batching guarantee.
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            let vector = self.fetch_embedding(text).await?;
            embeddings.push(self.padding.pad(vector)?);
        }
        log::debug!("Embedded {} texts", embeddings.len());
        Ok(embeddings)
    }

    async fn embed_query(&self, text: &str) -> Result<Embedding> {
        let vector = self.fetch_embedding(text).await?;
        self.padding.pad(vector)
    }
}
