//! Session chat log
//!
//! User messages accumulate; system status lines are transient and replace
//! each other so the log always ends with the latest status.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Welcome line shown for a fresh or reset session
pub const WELCOME_MESSAGE: &str =
    "Enter a website URL above and I'll help test it with our personas.";

/// Who wrote a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    System,
    User,
    Persona,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub content: String,
    pub sender: Sender,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona_id: Option<String>,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl ChatMessage {
    pub fn new(sender: Sender, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            sender,
            persona_id: None,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Sender::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Sender::User, content)
    }

    pub fn from_persona(persona_id: &str, content: impl Into<String>) -> Self {
        Self {
            persona_id: Some(persona_id.to_string()),
            ..Self::new(Sender::Persona, content)
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatLog {
    messages: Vec<ChatMessage>,
}

impl ChatLog {
    pub fn new() -> Self {
        let mut log = Self::default();
        log.reset();
        log
    }

    /// Drop everything and show the welcome line.
    pub fn reset(&mut self) {
        self.messages.clear();
        self.messages.push(ChatMessage::system(WELCOME_MESSAGE));
    }

    /// Replace any previous system status with `content`.
    pub fn post_status(&mut self, content: impl Into<String>) {
        self.messages.retain(|m| m.sender != Sender::System);
        self.messages.push(ChatMessage::system(content));
    }

    /// Append a system message without clearing earlier ones.
    pub fn append_system(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::system(content));
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_log_has_welcome() {
        let log = ChatLog::new();
        assert_eq!(log.messages().len(), 1);
        assert_eq!(log.messages()[0].content, WELCOME_MESSAGE);
    }

    #[test]
    fn test_status_replaces_previous_status_but_keeps_user_messages() {
        let mut log = ChatLog::new();
        log.push(ChatMessage::user("hello"));
        log.post_status("Generating personas...");
        log.post_status("All personas are ready!");

        let contents: Vec<&str> = log.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["hello", "All personas are ready!"]);
    }

    #[test]
    fn test_persona_message_carries_persona_id() {
        let msg = ChatMessage::from_persona("p-1", "As a Power User, I think so");
        assert_eq!(msg.sender, Sender::Persona);
        assert_eq!(msg.persona_id.as_deref(), Some("p-1"));
    }
}
