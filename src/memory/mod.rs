//! Conversation memory: per-channel message history and rolling summaries
//!
//! Each channel owns at most one conversation, created lazily on its first
//! message. History is append-only; every time the message count reaches a
//! multiple of the summary interval the running summary is recomputed from
//! the most recent window. The summary is derived data and can always be
//! regenerated from history.
//!
//! Appends for the same channel are serialized by an explicit per-channel
//! lock; without it two concurrent appends could both observe a count that
//! skips the summary trigger.

use crate::config::ConversationConfig;
use crate::error::Result;
use crate::storage::Database;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// A stored conversation message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    pub author_id: String,
    pub author_name: String,
    pub timestamp: DateTime<Utc>,
}

/// A per-channel conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub channel_id: String,
    pub running_summary: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Context handed to the prompt assembler: the recent message window
/// (oldest-first) plus the current running summary, if any
#[derive(Debug, Clone, Default)]
pub struct ConversationContext {
    pub messages: Vec<Message>,
    pub summary: Option<String>,
}

/// Persistent per-channel conversation store
pub struct ConversationStore {
    db: Arc<Mutex<Database>>,
    config: ConversationConfig,
    channel_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ConversationStore {
    pub fn new(db: Arc<Mutex<Database>>, config: ConversationConfig) -> Self {
        Self {
            db,
            config,
            channel_locks: Mutex::new(HashMap::new()),
        }
    }

    /// The serialization lock for one channel, created on first use
    fn channel_lock(&self, channel_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.channel_locks.lock().expect("lock map poisoned");
        locks
            .entry(channel_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Append a message to a channel's conversation, creating the
    /// conversation on first use.
    ///
    /// Whenever the post-append message count is an exact multiple of the
    /// summary interval, the running summary is recomputed from the most
    /// recent window. Summary recomputation is best-effort: it is derived
    /// data, so a failure there is logged without failing the append.
    pub async fn append(
        &self,
        channel_id: &str,
        role: Role,
        content: &str,
        author_id: &str,
        author_name: &str,
    ) -> Result<Message> {
        let lock = self.channel_lock(channel_id);
        let _guard = lock.lock().await;

        let conversation = self.find_or_create(channel_id)?;

        let message = Message {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation.id.clone(),
            role,
            content: content.to_string(),
            author_id: author_id.to_string(),
            author_name: author_name.to_string(),
            timestamp: Utc::now(),
        };

        let count = {
            let db = self.db.lock().expect("database mutex poisoned");
            db.insert_message(&message)?;
            db.message_count(&conversation.id)?
        };

        if count % self.config.summary_interval == 0 {
            if let Err(e) = self.recompute_summary(&conversation.id) {
                log::error!(
                    "Failed to update running summary for channel {}: {}",
                    channel_id,
                    e
                );
            }
        }

        Ok(message)
    }

    /// The prompt context for a channel: up to `context_window` most recent
    /// messages (oldest-first) and the running summary
    pub fn context(&self, channel_id: &str) -> Result<ConversationContext> {
        let db = self.db.lock().expect("database mutex poisoned");

        let conversation = match db.find_conversation(channel_id)? {
            Some(conversation) => conversation,
            None => return Ok(ConversationContext::default()),
        };

        let messages = db.recent_messages(&conversation.id, self.config.context_window)?;
        Ok(ConversationContext {
            messages,
            summary: conversation.running_summary,
        })
    }

    /// Delete a channel's conversation and all its messages.
    /// Resetting a channel that has no conversation is a no-op.
    pub fn reset(&self, channel_id: &str) -> Result<()> {
        let existed = self
            .db
            .lock()
            .expect("database mutex poisoned")
            .delete_conversation(channel_id)?;

        if existed {
            log::info!("Reset conversation for channel {}", channel_id);
        }
        Ok(())
    }

    /// All conversations with message counts, for the admin surface
    pub fn list(&self) -> Result<Vec<(Conversation, usize)>> {
        self.db
            .lock()
            .expect("database mutex poisoned")
            .list_conversations()
    }

    fn find_or_create(&self, channel_id: &str) -> Result<Conversation> {
        let db = self.db.lock().expect("database mutex poisoned");

        if let Some(conversation) = db.find_conversation(channel_id)? {
            return Ok(conversation);
        }

        let conversation = Conversation {
            id: Uuid::new_v4().to_string(),
            channel_id: channel_id.to_string(),
            running_summary: None,
            updated_at: Utc::now(),
        };
        db.insert_conversation(&conversation)?;
        log::info!("Created conversation for channel {}", channel_id);
        Ok(conversation)
    }

    fn recompute_summary(&self, conversation_id: &str) -> Result<()> {
        let db = self.db.lock().expect("database mutex poisoned");

        let window = db.recent_messages(conversation_id, self.config.summary_interval)?;
        let summary = format!(
            "Recent conversation: {}",
            window
                .iter()
                .map(|m| format!(
                    "{}: {}",
                    m.role.as_str(),
                    truncate_chars(&m.content, self.config.summary_content_limit)
                ))
                .collect::<Vec<_>>()
                .join("; ")
        );

        db.update_summary(conversation_id, &summary)
    }
}

fn truncate_chars(s: &str, limit: usize) -> String {
    s.chars().take(limit).collect()
}
