//! ragcord CLI application
//!
//! Administrative and local-testing front-end for the bot core: ingest PDFs
//! into the knowledge base, inspect documents and conversation memory,
//! manage the bot configuration, and talk to the full pipeline from a
//! terminal instead of a Discord gateway.

use anyhow::Context;
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use ragcord::{
    ChatTransport, Config, ConfigCache, ConversationStore, Database, Dispatcher, HttpEmbedder,
    Incoming, KnowledgeStore, OpenAiBackend, Outcome, ResponseGenerator, SqliteConfigProvider,
    SystemClock,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "ragcord")]
#[command(about = "Retrieval-augmented assistant: PDF knowledge base, conversation memory, gated dispatch")]
#[command(version)]
struct Cli {
    /// Path to the SQLite database
    #[arg(long, default_value = "ragcord.db", global = true)]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a PDF into the knowledge base
    Ingest {
        /// PDF file to ingest
        file: PathBuf,
    },

    /// List ingested documents
    Docs,

    /// Remove a document and its chunks
    RemoveDoc {
        /// Document id
        id: String,
    },

    /// Search the knowledge base directly
    Search {
        /// Search query
        query: String,

        /// Number of results to return
        #[arg(short = 'k', long, default_value = "3")]
        top_k: usize,
    },

    /// Send one message through the full pipeline
    Ask {
        /// The message
        message: String,

        /// Channel id to converse under
        #[arg(long, default_value = "cli")]
        channel: String,
    },

    /// Interactive chat session through the full pipeline
    Chat {
        /// Channel id to converse under
        #[arg(long, default_value = "cli")]
        channel: String,
    },

    /// List conversations and their running summaries
    Memory,

    /// Delete a channel's conversation history
    Reset {
        /// Channel id
        channel: String,
    },

    /// Show the stored bot configuration
    ConfigShow,

    /// Update the stored bot configuration
    ConfigSet {
        /// System instructions for the bot
        #[arg(long)]
        instructions: Option<String>,

        /// Comma-separated allow-listed channel ids
        #[arg(long)]
        channels: Option<String>,

        /// Whether the bot answers messages at all
        #[arg(long)]
        active: Option<bool>,
    },
}

/// Transport that prints replies to stdout
struct StdoutTransport;

#[async_trait]
impl ChatTransport for StdoutTransport {
    async fn send_typing(&self, _channel_id: &str) -> ragcord::Result<()> {
        Ok(())
    }

    async fn reply(&self, _channel_id: &str, text: &str) -> ragcord::Result<()> {
        println!("\nAssistant: {}", text);
        Ok(())
    }
}

fn open_database(path: &PathBuf) -> anyhow::Result<Arc<Mutex<Database>>> {
    let db = Database::new(path)
        .with_context(|| format!("Failed to open database at {}", path.display()))?;
    Ok(Arc::new(Mutex::new(db)))
}

fn build_knowledge(db: Arc<Mutex<Database>>, config: &Config) -> KnowledgeStore {
    let embedder = Arc::new(HttpEmbedder::new(config.embedding.clone()));
    KnowledgeStore::new(
        db,
        embedder,
        config.knowledge.clone(),
        config.chunking.clone(),
    )
}

fn build_dispatcher(db: Arc<Mutex<Database>>, config: &Config) -> Dispatcher {
    let cache = ConfigCache::new(
        Arc::new(SqliteConfigProvider::new(db.clone())),
        Arc::new(SystemClock),
        Duration::from_secs(config.cache.ttl_secs),
    );
    let conversations = Arc::new(ConversationStore::new(
        db.clone(),
        config.conversation.clone(),
    ));
    let knowledge = Arc::new(build_knowledge(db, config));
    let generator = ResponseGenerator::new(Arc::new(OpenAiBackend::new(config.completion.clone())));

    Dispatcher::new(
        cache,
        conversations,
        knowledge,
        generator,
        Arc::new(StdoutTransport),
        "Assistant".to_string(),
    )
}

fn incoming(channel: &str, content: &str) -> Incoming {
    Incoming {
        channel_id: channel.to_string(),
        author_id: "cli-user".to_string(),
        author_name: whoami(),
        content: content.to_string(),
        author_is_bot: false,
        // The CLI always addresses the bot directly
        mentions_bot: true,
    }
}

fn whoami() -> String {
    std::env::var("USER").unwrap_or_else(|_| "operator".to_string())
}

fn report_outcome(outcome: &Outcome) {
    match outcome {
        Outcome::Responded => {}
        Outcome::FilteredOut(reason) => {
            println!("(message filtered: {:?} - check `ragcord config-show`)", reason)
        }
        Outcome::Failed => println!("(processing failed; see logs)"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = Config::from_env();
    let db = open_database(&cli.db)?;

    match cli.command {
        Commands::Ingest { file } => {
            let filename = file
                .file_name()
                .and_then(|n| n.to_str())
                .context("Invalid file name")?
                .to_string();
            let bytes = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;

            let spinner = ProgressBar::new_spinner();
            spinner.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
            spinner.set_message(format!("Embedding and storing {}", filename));
            spinner.enable_steady_tick(Duration::from_millis(100));

            let knowledge = build_knowledge(db, &config);
            let document = knowledge.process_pdf(&filename, &bytes).await?;

            spinner.finish_and_clear();
            println!(
                "Ingested {} as {} ({} chunks)",
                filename, document.id, document.chunk_count
            );
        }

        Commands::Docs => {
            let knowledge = build_knowledge(db, &config);
            let documents = knowledge.list_documents()?;
            if documents.is_empty() {
                println!("No documents ingested.");
            }
            for doc in documents {
                println!(
                    "{}  {}  {} chunks  {}",
                    doc.id,
                    doc.filename,
                    doc.chunk_count,
                    doc.uploaded_at.format("%Y-%m-%d %H:%M")
                );
            }
        }

        Commands::RemoveDoc { id } => {
            let knowledge = build_knowledge(db, &config);
            knowledge.delete_document(&id)?;
            println!("Removed document {}", id);
        }

        Commands::Search { query, top_k } => {
            let knowledge = build_knowledge(db, &config);
            let results = knowledge.try_search(&query, top_k).await?;
            if results.is_empty() {
                println!("No results above the similarity threshold.");
            }
            for (i, result) in results.iter().enumerate() {
                println!(
                    "{}. [{:.1}%] {} - {}",
                    i + 1,
                    result.score * 100.0,
                    result.filename,
                    result.text
                );
            }
        }

        Commands::Ask { message, channel } => {
            let dispatcher = build_dispatcher(db, &config);
            let outcome = dispatcher.handle(&incoming(&channel, &message)).await;
            report_outcome(&outcome);
        }

        Commands::Chat { channel } => {
            let dispatcher = build_dispatcher(db, &config);
            println!("Chatting as channel '{}'. Type 'exit' to quit.", channel);

            loop {
                print!("\nYou: ");
                io::stdout().flush()?;

                let mut input = String::new();
                if io::stdin().read_line(&mut input)? == 0 {
                    break;
                }
                let input = input.trim();

                if input.is_empty() {
                    continue;
                }
                if matches!(input.to_lowercase().as_str(), "exit" | "quit" | "q") {
                    println!("Goodbye!");
                    break;
                }

                let outcome = dispatcher.handle(&incoming(&channel, input)).await;
                report_outcome(&outcome);
            }
        }

        Commands::Memory => {
            let store = ConversationStore::new(db, config.conversation.clone());
            let conversations = store.list()?;
            if conversations.is_empty() {
                println!("No conversations stored.");
            }
            for (conversation, count) in conversations {
                println!(
                    "channel {}  {} messages  updated {}",
                    conversation.channel_id,
                    count,
                    conversation.updated_at.format("%Y-%m-%d %H:%M")
                );
                if let Some(summary) = conversation.running_summary {
                    println!("  summary: {}", summary);
                }
            }
        }

        Commands::Reset { channel } => {
            let store = ConversationStore::new(db, config.conversation.clone());
            store.reset(&channel)?;
            println!("Reset conversation for channel {}", channel);
        }

        Commands::ConfigShow => {
            let stored = db
                .lock()
                .expect("database mutex poisoned")
                .get_bot_config()?;
            match stored {
                Some(bot_config) => {
                    println!("active: {}", bot_config.is_active);
                    println!("channels: {}", bot_config.allowed_channels.join(", "));
                    println!("instructions: {}", bot_config.system_instructions);
                }
                None => println!("No configuration stored (bot defaults to inactive)."),
            }
        }

        Commands::ConfigSet {
            instructions,
            channels,
            active,
        } => {
            let guard = db.lock().expect("database mutex poisoned");
            let mut bot_config = guard
                .get_bot_config()?
                .unwrap_or_else(ragcord::BotConfig::inactive_default);

            if let Some(instructions) = instructions {
                bot_config.system_instructions = instructions;
            }
            if let Some(channels) = channels {
                bot_config.allowed_channels = channels
                    .split(',')
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .collect();
            }
            if let Some(active) = active {
                bot_config.is_active = active;
            }

            guard.set_bot_config(&bot_config)?;
            println!("Configuration saved.");
        }
    }

    Ok(())
}
