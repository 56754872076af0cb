//! Configuration for the bot pipeline
//!
//! Tunables for chunking, embedding, retrieval, conversation memory, response
//! generation, and the dispatch-side config cache. Every section has sensible
//! defaults; credentials and endpoints can be overridden from environment
//! variables via [`Config::from_env`].

use serde::{Deserialize, Serialize};

/// Embedding dimensionality the storage schema expects. Model vectors shorter
/// than this are zero-padded before persistence and comparison.
pub const SCHEMA_DIMENSION: usize = 1536;

/// Dimensionality produced by the default embedding model
/// (sentence-transformers/all-MiniLM-L6-v2).
pub const MODEL_DIMENSION: usize = 384;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub knowledge: KnowledgeConfig,
    pub conversation: ConversationConfig,
    pub completion: CompletionConfig,
    pub cache: CacheConfig,
}

/// Document chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters (soft bound; a single oversized
    /// paragraph still becomes one chunk)
    pub max_chunk_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 1000,
        }
    }
}

/// Embedding endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Feature-extraction endpoint URL
    pub api_url: String,
    /// Bearer token for the endpoint
    pub api_key: String,
    /// Dimensionality the model produces
    pub model_dimension: usize,
    /// Dimensionality the storage schema expects (vectors are padded up)
    pub schema_dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api-inference.huggingface.co/pipeline/feature-extraction/sentence-transformers/all-MiniLM-L6-v2".to_string(),
            api_key: String::new(),
            model_dimension: MODEL_DIMENSION,
            schema_dimension: SCHEMA_DIMENSION,
        }
    }
}

/// Knowledge retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// Number of chunks returned per query
    pub top_k: usize,
    /// Minimum cosine similarity for a chunk to be returned (0-1 scale)
    pub similarity_threshold: f32,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            similarity_threshold: 0.7,
        }
    }
}

/// Conversation memory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Number of recent messages included in prompt context
    pub context_window: usize,
    /// Recompute the running summary every N messages
    pub summary_interval: usize,
    /// Per-message content truncation inside the summary
    pub summary_content_limit: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            context_window: 20,
            summary_interval: 10,
            summary_content_limit: 100,
        }
    }
}

/// Completion endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// Base URL of an OpenAI-compatible chat-completion API
    pub api_base: String,
    /// API key for the completion endpoint
    pub api_key: String,
    /// Model name
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Maximum tokens to generate
    pub max_tokens: u16,
    /// Nucleus sampling parameter
    pub top_p: f32,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.groq.com/openai/v1".to_string(),
            api_key: String::new(),
            model: "llama-3.3-70b-versatile".to_string(),
            temperature: 0.7,
            max_tokens: 1000,
            top_p: 1.0,
        }
    }
}

/// Administratively managed bot behavior, as opposed to the static [`Config`]
/// tree: which channels the bot answers in, what its system prompt is, and
/// whether it is switched on at all. Persisted by the admin surface and
/// consumed by dispatch through a TTL cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BotConfig {
    pub system_instructions: String,
    pub allowed_channels: Vec<String>,
    pub is_active: bool,
}

impl BotConfig {
    /// Fallback served when no configuration was ever saved and none is
    /// cached: an inactive bot with a neutral prompt.
    pub fn inactive_default() -> Self {
        Self {
            system_instructions: "You are a helpful assistant.".to_string(),
            allowed_channels: Vec::new(),
            is_active: false,
        }
    }
}

/// Bot configuration cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Config cache time-to-live in seconds
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 30 }
    }
}

impl Config {
    /// Build a configuration from defaults plus environment overrides
    ///
    /// Recognized variables: `EMBEDDING_API_URL`, `HUGGINGFACE_API_KEY`,
    /// `COMPLETION_API_BASE`, `GROQ_API_KEY`, `COMPLETION_MODEL`.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("EMBEDDING_API_URL") {
            config.embedding.api_url = url;
        }
        if let Ok(key) = std::env::var("HUGGINGFACE_API_KEY") {
            config.embedding.api_key = key;
        }
        if let Ok(base) = std::env::var("COMPLETION_API_BASE") {
            config.completion.api_base = base;
        }
        if let Ok(key) = std::env::var("GROQ_API_KEY") {
            config.completion.api_key = key;
        }
        if let Ok(model) = std::env::var("COMPLETION_MODEL") {
            config.completion.model = model;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.chunking.max_chunk_size, 1000);
        assert_eq!(config.knowledge.top_k, 3);
        assert_eq!(config.conversation.summary_interval, 10);
        assert_eq!(config.embedding.schema_dimension, SCHEMA_DIMENSION);
        assert_eq!(config.cache.ttl_secs, 30);
    }

    #[test]
    fn test_serde_round_trip() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.completion.model, config.completion.model);
        assert_eq!(parsed.knowledge.similarity_threshold, 0.7);
    }
}
