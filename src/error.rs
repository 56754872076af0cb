//! Error types for ragcord
//!
//! This module provides error handling for all bot operations, including
//! document ingestion, embedding calls, retrieval, conversation storage,
//! and response generation.

use thiserror::Error;

/// Main error type for bot operations
#[derive(Error, Debug)]
pub enum BotError {
    /// Embedding service errors (non-success response, malformed vector)
    #[error("Embedding service error: {0}")]
    EmbeddingService(String),

    /// Completion endpoint errors
    #[error("Completion error: {0}")]
    Completion(String),

    /// Database/storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// PDF processing errors
    #[error("PDF processing error: {0}")]
    Pdf(String),

    /// Rejected administrative input (e.g. non-PDF upload)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Requested entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration errors (bad dimensions, missing credentials)
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// SQLite database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for bot operations
pub type Result<T> = std::result::Result<T, BotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = BotError::EmbeddingService("model is cold".to_string());
        assert_eq!(error.to_string(), "Embedding service error: model is cold");
    }

    #[test]
    fn test_error_chain() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let bot_error = BotError::from(io_error);

        match bot_error {
            BotError::Io(_) => (),
            _ => panic!("Expected Io error"),
        }
    }
}
