//! Prompt assembly
//!
//! Combines system instructions, knowledge search results, and conversation
//! context into the ordered, role-tagged segment list consumed by the
//! response generator. Segment order is fixed: system instructions (with the
//! knowledge block appended when there are results), an optional second
//! system segment carrying conversation context, then the user message
//! verbatim.

use crate::knowledge::KnowledgeResult;
use crate::memory::{ConversationContext, Role};

/// Role tag of a prompt segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentRole {
    System,
    User,
}

/// One role-tagged piece of the assembled prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSegment {
    pub role: SegmentRole,
    pub content: String,
}

/// Assemble the ordered prompt for one incoming user message
pub fn assemble(
    system_instructions: &str,
    knowledge: &[KnowledgeResult],
    context: &ConversationContext,
    user_message: &str,
) -> Vec<PromptSegment> {
    let mut segments = Vec::with_capacity(3);

    segments.push(PromptSegment {
        role: SegmentRole::System,
        content: format!(
            "{}{}",
            system_instructions,
            format_knowledge(knowledge)
        ),
    });

    let history = format_context(context);
    if !history.is_empty() {
        segments.push(PromptSegment {
            role: SegmentRole::System,
            content: format!("Context from previous conversation:\n{}", history),
        });
    }

    segments.push(PromptSegment {
        role: SegmentRole::User,
        content: user_message.to_string(),
    });

    segments
}

/// Render knowledge results as a block appended to the system instructions.
/// Empty results render as an empty string (no block at all).
fn format_knowledge(results: &[KnowledgeResult]) -> String {
    if results.is_empty() {
        return String::new();
    }

    let mut formatted = String::from("\n\nRelevant knowledge from uploaded documents:\n");
    for (index, result) in results.iter().enumerate() {
        formatted.push_str(&format!(
            "\n[{}] From \"{}\" (relevance: {:.1}%):\n{}\n",
            index + 1,
            result.filename,
            result.score * 100.0,
            result.text
        ));
    }
    formatted
}

/// Render conversation context: the summary (when present) followed by the
/// recent message window, one line per message. Empty history renders empty.
fn format_context(context: &ConversationContext) -> String {
    if context.messages.is_empty() {
        return String::new();
    }

    let mut formatted = String::new();
    if let Some(summary) = &context.summary {
        formatted.push_str(&format!("Previous conversation summary: {}\n\n", summary));
    }

    formatted.push_str("Recent messages:\n");
    for message in &context.messages {
        let speaker = match message.role {
            Role::User => message.author_name.as_str(),
            Role::Assistant => "Assistant",
        };
        formatted.push_str(&format!("{}: {}\n", speaker, message.content));
    }
    formatted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Message;
    use chrono::Utc;

    fn message(role: Role, author: &str, content: &str) -> Message {
        Message {
            id: "m".to_string(),
            conversation_id: "c".to_string(),
            role,
            content: content.to_string(),
            author_id: "a".to_string(),
            author_name: author.to_string(),
            timestamp: Utc::now(),
        }
    }

    fn knowledge(filename: &str, score: f32, text: &str) -> KnowledgeResult {
        KnowledgeResult {
            text: text.to_string(),
            score,
            filename: filename.to_string(),
        }
    }

    #[test]
    fn test_minimal_prompt_is_system_then_user() {
        let segments = assemble(
            "Be helpful.",
            &[],
            &ConversationContext::default(),
            "hello",
        );

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].role, SegmentRole::System);
        assert_eq!(segments[0].content, "Be helpful.");
        assert_eq!(segments[1].role, SegmentRole::User);
        assert_eq!(segments[1].content, "hello");
    }

    #[test]
    fn test_knowledge_block_appended_to_instructions() {
        let results = vec![
            knowledge("manual.pdf", 0.923, "Widgets have flanges."),
            knowledge("faq.pdf", 0.85, "Flanges are blue."),
        ];
        let segments = assemble("Be helpful.", &results, &ConversationContext::default(), "q");

        let system = &segments[0].content;
        assert!(system.starts_with("Be helpful."));
        assert!(system.contains("Relevant knowledge from uploaded documents:"));
        assert!(system.contains("[1] From \"manual.pdf\" (relevance: 92.3%):\nWidgets have flanges."));
        assert!(system.contains("[2] From \"faq.pdf\" (relevance: 85.0%):\nFlanges are blue."));
    }

    #[test]
    fn test_history_segment_with_summary() {
        let context = ConversationContext {
            messages: vec![
                message(Role::User, "alice", "what are widgets?"),
                message(Role::Assistant, "Bot", "Widgets are devices."),
            ],
            summary: Some("Recent conversation: user: hi".to_string()),
        };
        let segments = assemble("Be helpful.", &[], &context, "and flanges?");

        assert_eq!(segments.len(), 3);
        assert_eq!(segments[1].role, SegmentRole::System);
        let history = &segments[1].content;
        assert!(history.starts_with("Context from previous conversation:\n"));
        assert!(history.contains(
            "Previous conversation summary: Recent conversation: user: hi\n\n"
        ));
        assert!(history.contains("Recent messages:\nalice: what are widgets?\nAssistant: Widgets are devices.\n"));
        assert_eq!(segments[2].content, "and flanges?");
    }

    #[test]
    fn test_history_segment_without_summary() {
        let context = ConversationContext {
            messages: vec![message(Role::User, "alice", "hi")],
            summary: None,
        };
        let segments = assemble("x", &[], &context, "y");
        assert_eq!(segments.len(), 3);
        assert!(!segments[1].content.contains("Previous conversation summary"));
        assert!(segments[1].content.contains("Recent messages:\nalice: hi\n"));
    }

    #[test]
    fn test_no_history_segment_without_messages() {
        // A summary with no messages still omits the history segment
        let context = ConversationContext {
            messages: vec![],
            summary: Some("stale".to_string()),
        };
        let segments = assemble("x", &[], &context, "y");
        assert_eq!(segments.len(), 2);
    }

    #[test]
    fn test_user_message_verbatim() {
        let segments = assemble("x", &[], &ConversationContext::default(), "  spaced  \n");
        assert_eq!(segments.last().unwrap().content, "  spaced  \n");
    }
}
