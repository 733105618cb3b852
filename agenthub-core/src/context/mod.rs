//! Conversation context handed to the text generator
//!
//! A [`ConversationContext`] is the request's role-tagged messages plus an
//! optional [`EvidenceSection`] built from tool results. The context is built
//! once per request and treated as immutable after augmentation.
//!
//! # Example
//!
//! ```rust
//! use agenthub_core::context::{ConversationContext, MessageRole};
//!
//! let context = ConversationContext::new()
//!     .with_system("You are a helpful assistant.")
//!     .with_user("What's the weather in Oslo?");
//!
//! assert_eq!(context.messages().len(), 2);
//! assert_eq!(context.last_user_message(), Some("What's the weather in Oslo?"));
//! assert_eq!(context.render_messages()[0].role, MessageRole::System);
//! ```

mod augmenter;

pub use augmenter::{
    AugmenterConfig, ContextAugmenter, DiagnosticNote, EvidenceEntry, EvidenceSection,
    NO_EVIDENCE_NOTE,
};

use serde::{Deserialize, Serialize};

/// Message role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

/// A message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

/// Messages of one request plus tool evidence
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationContext {
    messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    evidence: Option<EvidenceSection>,
}

impl ConversationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_messages(messages: impl IntoIterator<Item = Message>) -> Self {
        Self {
            messages: messages.into_iter().collect(),
            evidence: None,
        }
    }

    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_system(self, content: impl Into<String>) -> Self {
        self.with_message(Message::system(content))
    }

    pub fn with_user(self, content: impl Into<String>) -> Self {
        self.with_message(Message::user(content))
    }

    pub fn with_assistant(self, content: impl Into<String>) -> Self {
        self.with_message(Message::assistant(content))
    }

    /// Attach the evidence section, replacing any previous one
    pub fn with_evidence(mut self, evidence: EvidenceSection) -> Self {
        self.evidence = Some(evidence);
        self
    }

    /// Conversation messages, without evidence
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn evidence(&self) -> Option<&EvidenceSection> {
        self.evidence.as_ref()
    }

    /// Content of the most recent user message
    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.content.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Messages as the generator sees them
    ///
    /// The evidence section becomes a system message placed immediately
    /// before the last user message, or appended when there is none.
    pub fn render_messages(&self) -> Vec<Message> {
        let mut rendered = self.messages.clone();
        let Some(evidence) = &self.evidence else {
            return rendered;
        };
        if evidence.is_empty() {
            return rendered;
        }

        let message = Message::system(evidence.render());
        match rendered.iter().rposition(|m| m.role == MessageRole::User) {
            Some(position) => rendered.insert(position, message),
            None => rendered.push(message),
        }
        rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::CallId;
    use crate::tools::ToolStatus;

    #[test]
    fn test_render_without_evidence() {
        let context = ConversationContext::new().with_user("hi");
        assert_eq!(context.render_messages(), vec![Message::user("hi")]);
    }

    #[test]
    fn test_evidence_inserted_before_last_user_message() {
        let mut evidence = EvidenceSection::default();
        evidence.entries.push(EvidenceEntry {
            call_id: CallId::new(0),
            tool_id: "clock".into(),
            status: ToolStatus::Success,
            content: "\"12:00\"".into(),
        });

        let context = ConversationContext::new()
            .with_system("Be brief.")
            .with_user("hello")
            .with_assistant("Hi!")
            .with_user("what time is it?")
            .with_evidence(evidence);

        let rendered = context.render_messages();
        assert_eq!(rendered.len(), 5);
        assert_eq!(rendered[3].role, MessageRole::System);
        assert!(rendered[3].content.contains("clock"));
        assert_eq!(rendered[4], Message::user("what time is it?"));
    }

    #[test]
    fn test_evidence_appended_without_user_message() {
        let context = ConversationContext::new()
            .with_system("Be brief.")
            .with_evidence(EvidenceSection::fallback());

        let rendered = context.render_messages();
        assert_eq!(rendered.len(), 2);
        assert!(rendered[1].content.contains(NO_EVIDENCE_NOTE));
    }

    #[test]
    fn test_message_role_serialization() {
        let json = serde_json::to_string(&Message::assistant("ok")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"ok"}"#);
    }
}
