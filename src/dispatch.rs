//! Message gating and dispatch
//!
//! Every inbound message passes the gate first: own/bot messages, an
//! inactive bot, and non-allowed channels without a mention are all filtered
//! before any processing happens. Accepted messages run the full pipeline:
//! store, retrieve, assemble, generate, reply, store. The dispatch loop never
//! crashes on a message; an unexpected failure produces a fixed apology
//! reply.
//!
//! The bot configuration is consulted through a TTL cache owned by the
//! dispatcher. The clock is injected so expiry is deterministic in tests.

use crate::completion::{ResponseGenerator, FALLBACK_REPLY};
use crate::config::BotConfig;
use crate::error::Result;
use crate::knowledge::KnowledgeStore;
use crate::memory::{ConversationStore, Role};
use crate::prompt;
use crate::storage::Database;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Fixed reply sent when processing an accepted message fails unexpectedly
pub const APOLOGY_REPLY: &str =
    "I apologize, but I encountered an error while processing your message. Please try again later.";

/// Monotonic time source, injectable for deterministic TTL tests
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock used in production
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Source of the current administratively managed bot configuration
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    async fn fetch(&self) -> Result<BotConfig>;
}

/// Reads the bot configuration from the shared database
pub struct SqliteConfigProvider {
    db: Arc<Mutex<Database>>,
}

impl SqliteConfigProvider {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ConfigProvider for SqliteConfigProvider {
    async fn fetch(&self) -> Result<BotConfig> {
        let config = self
            .db
            .lock()
            .expect("database mutex poisoned")
            .get_bot_config()?;
        // No saved row means the bot was never configured: inactive default
        Ok(config.unwrap_or_else(BotConfig::inactive_default))
    }
}

/// TTL cache in front of a [`ConfigProvider`]
///
/// Values younger than the TTL are served without a fetch. On fetch failure
/// the stale value (if any) is served, else the hardcoded inactive default,
/// so a config outage degrades dispatch instead of failing it. Consumers see
/// admin updates after at most one TTL (eventual consistency).
pub struct ConfigCache {
    provider: Arc<dyn ConfigProvider>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    cached: tokio::sync::Mutex<Option<(BotConfig, Instant)>>,
}

impl ConfigCache {
    pub fn new(provider: Arc<dyn ConfigProvider>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            provider,
            clock,
            ttl,
            cached: tokio::sync::Mutex::new(None),
        }
    }

    /// The current configuration, served from cache when fresh
    pub async fn get(&self) -> BotConfig {
        let mut cached = self.cached.lock().await;

        if let Some((config, fetched_at)) = cached.as_ref() {
            if self.clock.now().duration_since(*fetched_at) < self.ttl {
                return config.clone();
            }
        }

        match self.provider.fetch().await {
            Ok(config) => {
                *cached = Some((config.clone(), self.clock.now()));
                log::debug!("Fetched bot configuration (active: {})", config.is_active);
                config
            }
            Err(e) => {
                log::error!("Failed to fetch bot config: {}", e);
                match cached.as_ref() {
                    Some((stale, _)) => stale.clone(),
                    None => BotConfig::inactive_default(),
                }
            }
        }
    }

    /// Drop the cached value; the next `get` fetches fresh
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}

/// Outbound side of the messaging transport (Discord gateway in production,
/// a local loop in the CLI, a recorder in tests)
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Signal typing presence in a channel; failures are non-fatal
    async fn send_typing(&self, channel_id: &str) -> Result<()>;

    /// Send reply text to a channel
    async fn reply(&self, channel_id: &str, text: &str) -> Result<()>;
}

/// An inbound message as delivered by the transport
#[derive(Debug, Clone)]
pub struct Incoming {
    pub channel_id: String,
    pub author_id: String,
    pub author_name: String,
    pub content: String,
    /// True when the sender is this bot or any other bot
    pub author_is_bot: bool,
    /// True when the message @-mentions this bot
    pub mentions_bot: bool,
}

/// Why the gate dropped a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterReason {
    /// Sender is a bot (including this one)
    BotAuthor,
    /// The bot is switched off
    Inactive,
    /// Channel not allow-listed and the bot was not mentioned
    ChannelNotAllowed,
}

/// Terminal state of handling one inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    FilteredOut(FilterReason),
    Responded,
    Failed,
}

/// Orchestrates the gate and the processing pipeline for inbound messages
pub struct Dispatcher {
    config_cache: ConfigCache,
    conversations: Arc<ConversationStore>,
    knowledge: Arc<KnowledgeStore>,
    generator: ResponseGenerator,
    transport: Arc<dyn ChatTransport>,
    bot_author_name: String,
}

impl Dispatcher {
    pub fn new(
        config_cache: ConfigCache,
        conversations: Arc<ConversationStore>,
        knowledge: Arc<KnowledgeStore>,
        generator: ResponseGenerator,
        transport: Arc<dyn ChatTransport>,
        bot_author_name: String,
    ) -> Self {
        Self {
            config_cache,
            conversations,
            knowledge,
            generator,
            transport,
            bot_author_name,
        }
    }

    /// Access to the config cache (for admin-triggered invalidation)
    pub fn config_cache(&self) -> &ConfigCache {
        &self.config_cache
    }

    /// Handle one inbound message to a terminal [`Outcome`].
    ///
    /// Gate rules are evaluated in order, first match wins. This method never
    /// returns an error: an accepted message that fails mid-pipeline produces
    /// an apology reply and `Outcome::Failed`.
    pub async fn handle(&self, incoming: &Incoming) -> Outcome {
        if incoming.author_is_bot {
            return Outcome::FilteredOut(FilterReason::BotAuthor);
        }

        let config = self.config_cache.get().await;

        if !config.is_active {
            log::info!("Bot is not active, ignoring message");
            return Outcome::FilteredOut(FilterReason::Inactive);
        }

        let channel_allowed = config
            .allowed_channels
            .iter()
            .any(|c| c == &incoming.channel_id);
        if !channel_allowed && !incoming.mentions_bot {
            return Outcome::FilteredOut(FilterReason::ChannelNotAllowed);
        }

        log::info!(
            "Processing message in channel {} from {}",
            incoming.channel_id,
            incoming.author_name
        );

        match self.respond(incoming, &config).await {
            Ok(()) => Outcome::Responded,
            Err(e) => {
                log::error!("Error handling message: {}", e);
                if let Err(reply_err) = self
                    .transport
                    .reply(&incoming.channel_id, APOLOGY_REPLY)
                    .await
                {
                    log::error!("Failed to send apology reply: {}", reply_err);
                }
                Outcome::Failed
            }
        }
    }

    /// The accepted-message pipeline: store, retrieve, assemble, generate,
    /// reply, store
    async fn respond(&self, incoming: &Incoming, config: &BotConfig) -> Result<()> {
        // Memory is best-effort: a storage outage must not silence the bot
        if let Err(e) = self
            .conversations
            .append(
                &incoming.channel_id,
                Role::User,
                &incoming.content,
                &incoming.author_id,
                &incoming.author_name,
            )
            .await
        {
            log::error!("Failed to store user message: {}", e);
        }

        if let Err(e) = self.transport.send_typing(&incoming.channel_id).await {
            log::debug!("Failed to send typing signal: {}", e);
        }

        let context = self
            .conversations
            .context(&incoming.channel_id)
            .unwrap_or_else(|e| {
                log::error!("Failed to load conversation context: {}", e);
                Default::default()
            });

        // Retrieval and generation each degrade internally; the reply itself
        // is the one step that must succeed for this message to count as
        // responded.
        let knowledge = self.knowledge.search(&incoming.content).await;
        let segments = prompt::assemble(
            &config.system_instructions,
            &knowledge,
            &context,
            &incoming.content,
        );

        let response = match self.generator.try_generate(&segments).await {
            Ok(text) => text,
            Err(e) => {
                log::error!("Response generation failed, using fallback: {}", e);
                FALLBACK_REPLY.to_string()
            }
        };

        self.transport.reply(&incoming.channel_id, &response).await?;

        if let Err(e) = self
            .conversations
            .append(
                &incoming.channel_id,
                Role::Assistant,
                &response,
                "bot",
                &self.bot_author_name,
            )
            .await
        {
            log::error!("Failed to store assistant message: {}", e);
        }

        log::info!(
            "Response sent in channel {} ({} chars)",
            incoming.channel_id,
            response.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeClock {
        base: Instant,
        offset: Mutex<Duration>,
    }

    impl FakeClock {
        fn new() -> Self {
            Self {
                base: Instant::now(),
                offset: Mutex::new(Duration::ZERO),
            }
        }

        fn advance(&self, by: Duration) {
            *self.offset.lock().unwrap() += by;
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> Instant {
            self.base + *self.offset.lock().unwrap()
        }
    }

    struct CountingProvider {
        fetches: AtomicUsize,
        fail: Mutex<bool>,
        config: BotConfig,
    }

    impl CountingProvider {
        fn new(config: BotConfig) -> Self {
            Self {
                fetches: AtomicUsize::new(0),
                fail: Mutex::new(false),
                config,
            }
        }
    }

    #[async_trait]
    impl ConfigProvider for CountingProvider {
        async fn fetch(&self) -> Result<BotConfig> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if *self.fail.lock().unwrap() {
                Err(crate::error::BotError::Storage("db down".to_string()))
            } else {
                Ok(self.config.clone())
            }
        }
    }

    fn active_config() -> BotConfig {
        BotConfig {
            system_instructions: "Be helpful.".to_string(),
            allowed_channels: vec!["123".to_string()],
            is_active: true,
        }
    }

    #[tokio::test]
    async fn test_cache_serves_fresh_value_without_fetch() {
        let clock = Arc::new(FakeClock::new());
        let provider = Arc::new(CountingProvider::new(active_config()));
        let cache = ConfigCache::new(provider.clone(), clock.clone(), Duration::from_secs(30));

        cache.get().await;
        clock.advance(Duration::from_secs(10));
        cache.get().await;

        assert_eq!(provider.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cache_refetches_after_ttl() {
        let clock = Arc::new(FakeClock::new());
        let provider = Arc::new(CountingProvider::new(active_config()));
        let cache = ConfigCache::new(provider.clone(), clock.clone(), Duration::from_secs(30));

        cache.get().await;
        clock.advance(Duration::from_secs(31));
        cache.get().await;

        assert_eq!(provider.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cache_serves_stale_on_fetch_failure() {
        let clock = Arc::new(FakeClock::new());
        let provider = Arc::new(CountingProvider::new(active_config()));
        let cache = ConfigCache::new(provider.clone(), clock.clone(), Duration::from_secs(30));

        let first = cache.get().await;
        assert!(first.is_active);

        *provider.fail.lock().unwrap() = true;
        clock.advance(Duration::from_secs(31));

        let stale = cache.get().await;
        assert_eq!(stale, first);
    }

    #[tokio::test]
    async fn test_cache_defaults_inactive_when_nothing_cached() {
        let clock = Arc::new(FakeClock::new());
        let provider = Arc::new(CountingProvider::new(active_config()));
        *provider.fail.lock().unwrap() = true;
        let cache = ConfigCache::new(provider, clock, Duration::from_secs(30));

        let config = cache.get().await;
        assert!(!config.is_active);
        assert_eq!(config.system_instructions, "You are a helpful assistant.");
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let clock = Arc::new(FakeClock::new());
        let provider = Arc::new(CountingProvider::new(active_config()));
        let cache = ConfigCache::new(provider.clone(), clock, Duration::from_secs(30));

        cache.get().await;
        cache.invalidate().await;
        cache.get().await;

        assert_eq!(provider.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_sqlite_provider_defaults_inactive_without_row() {
        let db = Arc::new(Mutex::new(Database::memory().unwrap()));
        let provider = SqliteConfigProvider::new(db);
        let config = provider.fetch().await.unwrap();
        assert!(!config.is_active);
    }
}
