//! SQLite database operations for ragcord
//!
//! Single embedded database holding the knowledge base (documents + chunk
//! vectors), conversation memory, and the bot configuration row. Embedding
//! vectors are stored as little-endian f32 BLOBs.

use crate::config::BotConfig;
use crate::error::{BotError, Result};
use crate::knowledge::{Chunk, Document, SearchableChunk};
use crate::memory::{Conversation, Message, Role};
use crate::ml::Embedding;
use crate::storage::schema::*;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

/// Database connection and operations
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Create a new database connection
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| BotError::Storage(format!("Failed to open database: {}", e)))?;

        let mut db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Create an in-memory database (for testing)
    pub fn memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| BotError::Storage(format!("Failed to create in-memory database: {}", e)))?;

        let mut db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Initialize database schema
    fn initialize(&mut self) -> Result<()> {
        // Enable WAL mode for better concurrency
        let _: String = self
            .conn
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
            .map_err(|e| BotError::Storage(format!("Failed to enable WAL mode: {}", e)))?;

        // Cascading deletes rely on foreign key enforcement
        self.conn
            .execute_batch("PRAGMA foreign_keys=ON")
            .map_err(|e| BotError::Storage(format!("Failed to enable foreign keys: {}", e)))?;

        for (name, sql) in [
            ("documents", CREATE_DOCUMENTS_TABLE),
            ("chunks", CREATE_CHUNKS_TABLE),
            ("conversations", CREATE_CONVERSATIONS_TABLE),
            ("messages", CREATE_MESSAGES_TABLE),
            ("bot_config", CREATE_BOT_CONFIG_TABLE),
            ("metadata", CREATE_METADATA_TABLE),
        ] {
            self.conn
                .execute(sql, [])
                .map_err(|e| BotError::Storage(format!("Failed to create {} table: {}", name, e)))?;
        }

        self.conn
            .execute_batch(CREATE_INDEXES)
            .map_err(|e| BotError::Storage(format!("Failed to create indexes: {}", e)))?;

        self.conn
            .execute(
                "INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?)",
                params![SCHEMA_VERSION.to_string()],
            )
            .map_err(|e| BotError::Storage(format!("Failed to set schema version: {}", e)))?;

        log::info!("Database initialized with schema version {}", SCHEMA_VERSION);
        Ok(())
    }

    // ---- knowledge base ----

    /// Insert a document and all its chunks in one transaction
    ///
    /// The document's chunk count and its chunk rows commit together or not
    /// at all.
    pub fn insert_document_with_chunks(
        &mut self,
        document: &Document,
        chunks: &[Chunk],
    ) -> Result<()> {
        let tx = self
            .conn
            .transaction()
            .map_err(|e| BotError::Storage(format!("Failed to start transaction: {}", e)))?;

        tx.execute(
            "INSERT INTO documents (id, filename, chunk_count, uploaded_at) VALUES (?, ?, ?, ?)",
            params![
                document.id,
                document.filename,
                document.chunk_count as i64,
                document.uploaded_at.to_rfc3339(),
            ],
        )
        .map_err(|e| BotError::Storage(format!("Failed to insert document: {}", e)))?;

        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO chunks (id, document_id, content, embedding, chunk_index)
                     VALUES (?, ?, ?, ?, ?)",
                )
                .map_err(|e| BotError::Storage(format!("Failed to prepare statement: {}", e)))?;

            for chunk in chunks {
                stmt.execute(params![
                    chunk.id,
                    chunk.document_id,
                    chunk.content,
                    embedding_to_blob(&chunk.embedding),
                    chunk.chunk_index as i64,
                ])
                .map_err(|e| {
                    BotError::Storage(format!("Failed to insert chunk {}: {}", chunk.chunk_index, e))
                })?;
            }
        }

        tx.commit()
            .map_err(|e| BotError::Storage(format!("Failed to commit transaction: {}", e)))?;

        log::info!(
            "Stored document {} with {} chunks",
            document.filename,
            chunks.len()
        );
        Ok(())
    }

    /// List all documents, most recently uploaded first
    pub fn list_documents(&self) -> Result<Vec<Document>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, filename, chunk_count, uploaded_at FROM documents ORDER BY uploaded_at DESC")
            .map_err(|e| BotError::Storage(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], row_to_document)
            .map_err(|e| BotError::Storage(format!("Failed to query documents: {}", e)))?;

        collect_rows(rows)
    }

    /// Delete a document (its chunks cascade); true if it existed
    pub fn delete_document(&self, document_id: &str) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM documents WHERE id = ?", params![document_id])
            .map_err(|e| BotError::Storage(format!("Failed to delete document: {}", e)))?;
        Ok(affected > 0)
    }

    /// All stored chunks with their parent document's filename, in insertion
    /// order (the tie-break order for equal similarity scores)
    pub fn searchable_chunks(&self) -> Result<Vec<SearchableChunk>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT c.content, c.embedding, d.filename
                 FROM chunks c JOIN documents d ON c.document_id = d.id
                 ORDER BY c.rowid",
            )
            .map_err(|e| BotError::Storage(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], |row| {
                Ok(SearchableChunk {
                    content: row.get(0)?,
                    embedding: blob_to_embedding(&row.get::<_, Vec<u8>>(1)?),
                    filename: row.get(2)?,
                })
            })
            .map_err(|e| BotError::Storage(format!("Failed to query chunks: {}", e)))?;

        collect_rows(rows)
    }

    /// Total chunk count across all documents
    pub fn chunk_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
            .map_err(|e| BotError::Storage(format!("Failed to count chunks: {}", e)))?;
        Ok(count as usize)
    }

    // ---- conversation memory ----

    /// Find the conversation for a channel
    pub fn find_conversation(&self, channel_id: &str) -> Result<Option<Conversation>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, channel_id, running_summary, updated_at
                 FROM conversations WHERE channel_id = ?",
            )
            .map_err(|e| BotError::Storage(format!("Failed to prepare query: {}", e)))?;

        stmt.query_row(params![channel_id], row_to_conversation)
            .optional()
            .map_err(|e| BotError::Storage(format!("Failed to query conversation: {}", e)))
    }

    /// Insert a new conversation row
    pub fn insert_conversation(&self, conversation: &Conversation) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO conversations (id, channel_id, running_summary, updated_at)
                 VALUES (?, ?, ?, ?)",
                params![
                    conversation.id,
                    conversation.channel_id,
                    conversation.running_summary,
                    conversation.updated_at.to_rfc3339(),
                ],
            )
            .map_err(|e| BotError::Storage(format!("Failed to insert conversation: {}", e)))?;
        Ok(())
    }

    /// Append a message row
    pub fn insert_message(&self, message: &Message) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO messages (id, conversation_id, role, content, author_id, author_name, timestamp)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                params![
                    message.id,
                    message.conversation_id,
                    message.role.as_str(),
                    message.content,
                    message.author_id,
                    message.author_name,
                    message.timestamp.to_rfc3339(),
                ],
            )
            .map_err(|e| BotError::Storage(format!("Failed to insert message: {}", e)))?;
        Ok(())
    }

    /// Number of messages in a conversation
    pub fn message_count(&self, conversation_id: &str) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM messages WHERE conversation_id = ?",
                params![conversation_id],
                |row| row.get(0),
            )
            .map_err(|e| BotError::Storage(format!("Failed to count messages: {}", e)))?;
        Ok(count as usize)
    }

    /// The most recent `limit` messages of a conversation, oldest-first
    pub fn recent_messages(&self, conversation_id: &str, limit: usize) -> Result<Vec<Message>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, conversation_id, role, content, author_id, author_name, timestamp
                 FROM messages WHERE conversation_id = ?
                 ORDER BY timestamp DESC, rowid DESC LIMIT ?",
            )
            .map_err(|e| BotError::Storage(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params![conversation_id, limit as i64], row_to_message)
            .map_err(|e| BotError::Storage(format!("Failed to query messages: {}", e)))?;

        let mut messages = collect_rows(rows)?;
        messages.reverse();
        Ok(messages)
    }

    /// Replace the running summary of a conversation
    pub fn update_summary(&self, conversation_id: &str, summary: &str) -> Result<()> {
        self.conn
            .execute(
                "UPDATE conversations SET running_summary = ?, updated_at = ? WHERE id = ?",
                params![summary, Utc::now().to_rfc3339(), conversation_id],
            )
            .map_err(|e| BotError::Storage(format!("Failed to update summary: {}", e)))?;
        Ok(())
    }

    /// Delete the conversation for a channel (messages cascade); true if it
    /// existed
    pub fn delete_conversation(&self, channel_id: &str) -> Result<bool> {
        let affected = self
            .conn
            .execute(
                "DELETE FROM conversations WHERE channel_id = ?",
                params![channel_id],
            )
            .map_err(|e| BotError::Storage(format!("Failed to delete conversation: {}", e)))?;
        Ok(affected > 0)
    }

    /// All conversations with their message counts, most recently updated
    /// first
    pub fn list_conversations(&self) -> Result<Vec<(Conversation, usize)>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT c.id, c.channel_id, c.running_summary, c.updated_at,
                        (SELECT COUNT(*) FROM messages m WHERE m.conversation_id = c.id)
                 FROM conversations c ORDER BY c.updated_at DESC",
            )
            .map_err(|e| BotError::Storage(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], |row| {
                let conversation = row_to_conversation(row)?;
                let count: i64 = row.get(4)?;
                Ok((conversation, count as usize))
            })
            .map_err(|e| BotError::Storage(format!("Failed to query conversations: {}", e)))?;

        collect_rows(rows)
    }

    // ---- bot configuration ----

    /// Load the bot configuration row, if one has been saved
    pub fn get_bot_config(&self) -> Result<Option<BotConfig>> {
        let mut stmt = self
            .conn
            .prepare("SELECT system_instructions, allowed_channels, is_active FROM bot_config WHERE id = 1")
            .map_err(|e| BotError::Storage(format!("Failed to prepare query: {}", e)))?;

        let config = stmt
            .query_row([], |row| {
                let channels_json: String = row.get(1)?;
                let allowed_channels = serde_json::from_str(&channels_json).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        1,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?;
                Ok(BotConfig {
                    system_instructions: row.get(0)?,
                    allowed_channels,
                    is_active: row.get::<_, i64>(2)? != 0,
                })
            })
            .optional()
            .map_err(|e| BotError::Storage(format!("Failed to query bot config: {}", e)))?;

        Ok(config)
    }

    /// Save the bot configuration (single row, replaced in place)
    pub fn set_bot_config(&self, config: &BotConfig) -> Result<()> {
        let channels_json = serde_json::to_string(&config.allowed_channels)?;
        self.conn
            .execute(
                "INSERT OR REPLACE INTO bot_config (id, system_instructions, allowed_channels, is_active)
                 VALUES (1, ?, ?, ?)",
                params![
                    config.system_instructions,
                    channels_json,
                    config.is_active as i64,
                ],
            )
            .map_err(|e| BotError::Storage(format!("Failed to save bot config: {}", e)))?;
        Ok(())
    }
}

/// Serialize an embedding as a little-endian f32 BLOB
fn embedding_to_blob(embedding: &Embedding) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for &val in embedding {
        bytes.extend_from_slice(&val.to_le_bytes());
    }
    bytes
}

/// Deserialize a little-endian f32 BLOB back into an embedding
fn blob_to_embedding(blob: &[u8]) -> Embedding {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn parse_timestamp(index: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                index,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

fn row_to_document(row: &Row) -> rusqlite::Result<Document> {
    Ok(Document {
        id: row.get(0)?,
        filename: row.get(1)?,
        chunk_count: row.get::<_, i64>(2)? as usize,
        uploaded_at: parse_timestamp(3, &row.get::<_, String>(3)?)?,
    })
}

fn row_to_conversation(row: &Row) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        channel_id: row.get(1)?,
        running_summary: row.get(2)?,
        updated_at: parse_timestamp(3, &row.get::<_, String>(3)?)?,
    })
}

fn row_to_message(row: &Row) -> rusqlite::Result<Message> {
    let role_str: String = row.get(2)?;
    let role = Role::parse(&role_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown role: {}", role_str).into(),
        )
    })?;

    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        role,
        content: row.get(3)?,
        author_id: row.get(4)?,
        author_name: row.get(5)?,
        timestamp: parse_timestamp(6, &row.get::<_, String>(6)?)?,
    })
}

fn collect_rows<T>(
    rows: impl Iterator<Item = rusqlite::Result<T>>,
) -> Result<Vec<T>> {
    let mut result = Vec::new();
    for row in rows {
        result.push(row.map_err(|e| BotError::Storage(format!("Failed to read row: {}", e)))?);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_document(id: &str, filename: &str) -> Document {
        Document {
            id: id.to_string(),
            filename: filename.to_string(),
            chunk_count: 2,
            uploaded_at: Utc::now(),
        }
    }

    fn sample_chunks(document_id: &str) -> Vec<Chunk> {
        (0..2)
            .map(|i| Chunk {
                id: format!("chunk-{}", i),
                document_id: document_id.to_string(),
                content: format!("chunk content {}", i),
                embedding: vec![i as f32, 1.0, 0.0],
                chunk_index: i,
            })
            .collect()
    }

    #[test]
    fn test_embedding_blob_round_trip() {
        let embedding = vec![0.25, -1.5, 3.75, 0.0];
        let blob = embedding_to_blob(&embedding);
        assert_eq!(blob.len(), 16);
        assert_eq!(blob_to_embedding(&blob), embedding);
    }

    #[test]
    fn test_document_with_chunks_round_trip() {
        let mut db = Database::memory().unwrap();
        let document = sample_document("doc-1", "manual.pdf");
        db.insert_document_with_chunks(&document, &sample_chunks("doc-1"))
            .unwrap();

        let documents = db.list_documents().unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].filename, "manual.pdf");
        assert_eq!(documents[0].chunk_count, 2);

        let chunks = db.searchable_chunks().unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content, "chunk content 0");
        assert_eq!(chunks[0].filename, "manual.pdf");
        assert_eq!(chunks[0].embedding, vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_delete_document_cascades_chunks() {
        let mut db = Database::memory().unwrap();
        let document = sample_document("doc-1", "manual.pdf");
        db.insert_document_with_chunks(&document, &sample_chunks("doc-1"))
            .unwrap();

        assert!(db.delete_document("doc-1").unwrap());
        assert_eq!(db.chunk_count().unwrap(), 0);
        assert!(!db.delete_document("doc-1").unwrap());
    }

    #[test]
    fn test_conversation_and_messages() {
        let db = Database::memory().unwrap();
        let conversation = Conversation {
            id: "conv-1".to_string(),
            channel_id: "123".to_string(),
            running_summary: None,
            updated_at: Utc::now(),
        };
        db.insert_conversation(&conversation).unwrap();
        assert!(db.find_conversation("123").unwrap().is_some());
        assert!(db.find_conversation("456").unwrap().is_none());

        for i in 0..3 {
            db.insert_message(&Message {
                id: format!("msg-{}", i),
                conversation_id: "conv-1".to_string(),
                role: if i % 2 == 0 { Role::User } else { Role::Assistant },
                content: format!("message {}", i),
                author_id: "u1".to_string(),
                author_name: "alice".to_string(),
                timestamp: Utc::now(),
            })
            .unwrap();
        }

        assert_eq!(db.message_count("conv-1").unwrap(), 3);

        let recent = db.recent_messages("conv-1", 2).unwrap();
        assert_eq!(recent.len(), 2);
        // Oldest-first within the window
        assert_eq!(recent[0].content, "message 1");
        assert_eq!(recent[1].content, "message 2");
    }

    #[test]
    fn test_summary_update_and_reset() {
        let db = Database::memory().unwrap();
        let conversation = Conversation {
            id: "conv-1".to_string(),
            channel_id: "123".to_string(),
            running_summary: None,
            updated_at: Utc::now(),
        };
        db.insert_conversation(&conversation).unwrap();

        db.update_summary("conv-1", "Recent conversation: user: hi").unwrap();
        let loaded = db.find_conversation("123").unwrap().unwrap();
        assert_eq!(
            loaded.running_summary.as_deref(),
            Some("Recent conversation: user: hi")
        );

        assert!(db.delete_conversation("123").unwrap());
        assert!(db.find_conversation("123").unwrap().is_none());
        // Resetting a channel with no conversation is a no-op
        assert!(!db.delete_conversation("123").unwrap());
    }

    #[test]
    fn test_reopen_preserves_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bot.db");

        {
            let mut db = Database::new(&path).unwrap();
            let document = sample_document("doc-1", "manual.pdf");
            db.insert_document_with_chunks(&document, &sample_chunks("doc-1"))
                .unwrap();
        }

        let db = Database::new(&path).unwrap();
        let documents = db.list_documents().unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(db.chunk_count().unwrap(), 2);
    }

    #[test]
    fn test_bot_config_round_trip() {
        let db = Database::memory().unwrap();
        assert!(db.get_bot_config().unwrap().is_none());

        let config = BotConfig {
            system_instructions: "Be terse.".to_string(),
            allowed_channels: vec!["123".to_string(), "456".to_string()],
            is_active: true,
        };
        db.set_bot_config(&config).unwrap();

        let loaded = db.get_bot_config().unwrap().unwrap();
        assert_eq!(loaded, config);

        // Replaced in place, never duplicated
        let updated = BotConfig {
            is_active: false,
            ..config
        };
        db.set_bot_config(&updated).unwrap();
        assert_eq!(db.get_bot_config().unwrap().unwrap(), updated);
    }
}
