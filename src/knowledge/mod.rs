//! Knowledge base: document ingestion and similarity search
//!
//! Uploaded PDFs are chunked, embedded, and persisted; at query time the
//! store embeds the query with the identical padding convention and ranks
//! every stored chunk by cosine similarity. Retrieval is best-effort: the
//! fallible [`KnowledgeStore::try_search`] carries the real error, and the
//! public [`KnowledgeStore::search`] degrades to an empty result set so a
//! retrieval outage can never block a reply.

use crate::config::{ChunkingConfig, KnowledgeConfig};
use crate::error::{BotError, Result};
use crate::ml::similarity::rank;
use crate::ml::{Embedder, Embedding};
use crate::storage::Database;
use crate::text::{chunk_text, extract_pdf_text};
use crate::text::extract::validate_pdf_filename;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// An ingested knowledge document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub filename: String,
    pub chunk_count: usize,
    pub uploaded_at: DateTime<Utc>,
}

/// A stored chunk of a document with its embedding vector
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub content: String,
    pub embedding: Embedding,
    /// 0-based position within the source document, stored verbatim
    pub chunk_index: usize,
}

/// A chunk row as loaded for similarity search
#[derive(Debug, Clone)]
pub struct SearchableChunk {
    pub content: String,
    pub embedding: Embedding,
    pub filename: String,
}

/// A single knowledge search hit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeResult {
    pub text: String,
    pub score: f32,
    pub filename: String,
}

/// Persistent knowledge base with embedding-backed retrieval
pub struct KnowledgeStore {
    db: Arc<Mutex<Database>>,
    embedder: Arc<dyn Embedder>,
    config: KnowledgeConfig,
    chunking: ChunkingConfig,
}

impl KnowledgeStore {
    pub fn new(
        db: Arc<Mutex<Database>>,
        embedder: Arc<dyn Embedder>,
        config: KnowledgeConfig,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            db,
            embedder,
            config,
            chunking,
        }
    }

    /// Ingest a pre-chunked document: embed every chunk and persist the
    /// document together with its chunk rows in one transaction.
    ///
    /// Chunk indexes are assigned from input order, 0-based. An embedding
    /// failure aborts the whole ingestion; nothing is persisted.
    pub async fn ingest(&self, filename: &str, chunks: Vec<String>) -> Result<Document> {
        let embeddings = self.embedder.embed(&chunks).await?;

        let document = Document {
            id: Uuid::new_v4().to_string(),
            filename: filename.to_string(),
            chunk_count: chunks.len(),
            uploaded_at: Utc::now(),
        };

        let rows: Vec<Chunk> = chunks
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(chunk_index, (content, embedding))| Chunk {
                id: Uuid::new_v4().to_string(),
                document_id: document.id.clone(),
                content,
                embedding,
                chunk_index,
            })
            .collect();

        self.db
            .lock()
            .expect("database mutex poisoned")
            .insert_document_with_chunks(&document, &rows)?;

        Ok(document)
    }

    /// Process an uploaded PDF: validate, extract text, chunk, and ingest
    pub async fn process_pdf(&self, filename: &str, bytes: &[u8]) -> Result<Document> {
        validate_pdf_filename(filename)?;
        let text = extract_pdf_text(bytes)?;
        let chunks = chunk_text(&text, self.chunking.max_chunk_size);

        if chunks.is_empty() {
            return Err(BotError::Validation(format!(
                "No extractable text in {}",
                filename
            )));
        }

        self.ingest(filename, chunks).await
    }

    /// Similarity search that propagates failures to the caller
    pub async fn try_search(&self, query: &str, top_k: usize) -> Result<Vec<KnowledgeResult>> {
        let query_embedding = self.embedder.embed_query(query).await?;

        let chunks = self
            .db
            .lock()
            .expect("database mutex poisoned")
            .searchable_chunks()?;

        let vectors: Vec<Embedding> = chunks.iter().map(|c| c.embedding.clone()).collect();
        let ranked = rank(
            &query_embedding,
            &vectors,
            top_k,
            self.config.similarity_threshold,
        );

        Ok(ranked
            .into_iter()
            .map(|r| KnowledgeResult {
                text: chunks[r.index].content.clone(),
                score: r.score,
                filename: chunks[r.index].filename.clone(),
            })
            .collect())
    }

    /// Best-effort similarity search: any failure degrades to no results
    pub async fn search(&self, query: &str) -> Vec<KnowledgeResult> {
        match self.try_search(query, self.config.top_k).await {
            Ok(results) => results,
            Err(e) => {
                log::error!("Knowledge search failed, returning no results: {}", e);
                Vec::new()
            }
        }
    }

    /// List all ingested documents
    pub fn list_documents(&self) -> Result<Vec<Document>> {
        self.db
            .lock()
            .expect("database mutex poisoned")
            .list_documents()
    }

    /// Delete a document and its chunks; unknown ids are an error
    pub fn delete_document(&self, document_id: &str) -> Result<()> {
        let existed = self
            .db
            .lock()
            .expect("database mutex poisoned")
            .delete_document(document_id)?;

        if existed {
            Ok(())
        } else {
            Err(BotError::NotFound(format!("document {}", document_id)))
        }
    }
}
