//! Response generation via an OpenAI-compatible chat-completion endpoint
//!
//! The assembled prompt segments are dispatched as a role-tagged message
//! list. Generation is the last stage before the user sees anything, so the
//! public [`ResponseGenerator::generate`] never errors: any failure yields
//! the fixed fallback reply. The fallible [`ResponseGenerator::try_generate`]
//! exists so failure paths stay observable in tests and logs.

use crate::config::CompletionConfig;
use crate::error::{BotError, Result};
use crate::prompt::{PromptSegment, SegmentRole};
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
    ChatCompletionRequestUserMessageContent, CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use std::sync::Arc;

/// Fixed reply when response generation fails for any reason
pub const FALLBACK_REPLY: &str =
    "I apologize, but I encountered an error while processing your request. Please try again later.";

/// Reply used when the endpoint succeeds but returns no content
pub const EMPTY_COMPLETION_REPLY: &str = "I apologize, but I could not generate a response.";

/// Seam over the chat-completion endpoint
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Send the ordered segment list and return the generated text
    async fn complete(&self, segments: &[PromptSegment]) -> Result<String>;
}

/// Chat-completion client for OpenAI-compatible APIs
pub struct OpenAiBackend {
    client: Client<OpenAIConfig>,
    config: CompletionConfig,
}

impl OpenAiBackend {
    pub fn new(config: CompletionConfig) -> Self {
        let api_config = OpenAIConfig::new()
            .with_api_key(&config.api_key)
            .with_api_base(&config.api_base);

        Self {
            client: Client::with_config(api_config),
            config,
        }
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    async fn complete(&self, segments: &[PromptSegment]) -> Result<String> {
        let messages: Vec<ChatCompletionRequestMessage> = segments
            .iter()
            .map(|segment| match segment.role {
                SegmentRole::System => {
                    ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                        content: ChatCompletionRequestSystemMessageContent::Text(
                            segment.content.clone(),
                        ),
                        name: None,
                    })
                }
                SegmentRole::User => {
                    ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                        content: ChatCompletionRequestUserMessageContent::Text(
                            segment.content.clone(),
                        ),
                        name: None,
                    })
                }
            })
            .collect();

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.config.model)
            .messages(messages)
            .temperature(self.config.temperature)
            .max_tokens(self.config.max_tokens)
            .top_p(self.config.top_p)
            .build()
            .map_err(|e| BotError::Completion(format!("Failed to build request: {}", e)))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| BotError::Completion(format!("Completion request failed: {}", e)))?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .unwrap_or_else(|| EMPTY_COMPLETION_REPLY.to_string());

        Ok(content)
    }
}

/// Produces the bot's reply text from an assembled prompt
pub struct ResponseGenerator {
    backend: Arc<dyn CompletionBackend>,
}

impl ResponseGenerator {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }

    /// Generate a reply, propagating failures to the caller
    pub async fn try_generate(&self, segments: &[PromptSegment]) -> Result<String> {
        self.backend.complete(segments).await
    }

    /// Generate a reply; any failure degrades to the fixed fallback so the
    /// bot never goes silent on a user-facing error
    pub async fn generate(&self, segments: &[PromptSegment]) -> String {
        match self.try_generate(segments).await {
            Ok(text) => text,
            Err(e) => {
                log::error!("Response generation failed, using fallback: {}", e);
                FALLBACK_REPLY.to_string()
            }
        }
    }
}
