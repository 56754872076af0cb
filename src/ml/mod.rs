//! Embedding generation and vector similarity

pub mod embedding;
pub mod similarity;

pub use embedding::{Embedder, Embedding, HttpEmbedder, PaddingStrategy};
pub use similarity::cosine_similarity;
