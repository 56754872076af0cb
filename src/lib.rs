//! # ragcord
//!
//! The core of a retrieval-augmented Discord assistant: PDF knowledge
//! ingestion with embedding-backed similarity search, per-channel rolling
//! conversation memory, bounded prompt assembly, and gated dispatch to an
//! OpenAI-compatible completion endpoint.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::{Arc, Mutex};
//! use ragcord::{Config, Database, HttpEmbedder, KnowledgeStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env();
//!     let db = Arc::new(Mutex::new(Database::new("ragcord.db")?));
//!     let embedder = Arc::new(HttpEmbedder::new(config.embedding.clone()));
//!
//!     let knowledge = KnowledgeStore::new(
//!         db,
//!         embedder,
//!         config.knowledge.clone(),
//!         config.chunking.clone(),
//!     );
//!
//!     let bytes = std::fs::read("manual.pdf")?;
//!     let document = knowledge.process_pdf("manual.pdf", &bytes).await?;
//!     println!("Ingested {} chunks", document.chunk_count);
//!
//!     for result in knowledge.search("how do I reset the widget?").await {
//!         println!("{:.3} [{}] {}", result.score, result.filename, result.text);
//!     }
//!
//!     Ok(())
//! }
//! ```

// Core modules
pub mod completion;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod knowledge;
pub mod memory;
pub mod ml;
pub mod prompt;
pub mod storage;
pub mod text;

// Re-export main API types
pub use completion::{CompletionBackend, OpenAiBackend, ResponseGenerator, FALLBACK_REPLY};
pub use config::{BotConfig, Config};
pub use dispatch::{
    ChatTransport, Clock, ConfigCache, ConfigProvider, Dispatcher, FilterReason, Incoming,
    Outcome, SqliteConfigProvider, SystemClock, APOLOGY_REPLY,
};
pub use error::{BotError, Result};
pub use knowledge::{Document, KnowledgeResult, KnowledgeStore};
pub use memory::{ConversationContext, ConversationStore, Message, Role};
pub use ml::{Embedder, Embedding, HttpEmbedder, PaddingStrategy};
pub use prompt::{PromptSegment, SegmentRole};
pub use storage::Database;
