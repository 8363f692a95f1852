//! Shared chat state: the message log plus the user's input box.
//!
//! The generation collaborator writes into it, the completion detector reads
//! from it. Every mutation bumps a `watch` channel so readers can await
//! changes instead of polling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub name: String,
    #[serde(default)]
    pub is_user: bool,
    #[serde(default)]
    pub is_system: bool,
    pub text: String,
    /// Id of the character that wrote the message. Older chats lack it.
    #[serde(default)]
    pub original_avatar: Option<String>,
    #[serde(default = "Utc::now")]
    pub send_date: DateTime<Utc>,
}

impl ChatMessage {
    pub fn from_user(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_user: true,
            is_system: false,
            text: text.into(),
            original_avatar: None,
            send_date: Utc::now(),
        }
    }

    pub fn from_character(
        character_id: impl Into<String>,
        name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            is_user: false,
            is_system: false,
            text: text.into(),
            original_avatar: Some(character_id.into()),
            send_date: Utc::now(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            name: "System".to_string(),
            is_user: false,
            is_system: true,
            text: text.into(),
            original_avatar: None,
            send_date: Utc::now(),
        }
    }

    /// Written by a character rather than the user or the system.
    pub fn is_character(&self) -> bool {
        !self.is_user && !self.is_system
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatState {
    pub messages: Vec<ChatMessage>,
    pub input: String,
}

pub struct ChatLog {
    state: watch::Sender<ChatState>,
}

impl Default for ChatLog {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl ChatLog {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        let (state, _) = watch::channel(ChatState {
            messages,
            input: String::new(),
        });
        Self { state }
    }

    pub fn subscribe(&self) -> watch::Receiver<ChatState> {
        self.state.subscribe()
    }

    pub fn push(&self, message: ChatMessage) {
        self.state.send_modify(|state| state.messages.push(message));
    }

    /// Replace the text of the last message (swipes, continues). Returns `false` on an empty chat.
    pub fn edit_last_text(&self, text: impl Into<String>) -> bool {
        let text = text.into();
        let mut edited = false;
        self.state.send_if_modified(|state| match state.messages.last_mut() {
            Some(last) => {
                last.text = text;
                edited = true;
                true
            }
            None => false,
        });
        edited
    }

    pub fn set_input(&self, text: impl Into<String>) {
        let text = text.into();
        self.state.send_modify(|state| state.input = text);
    }

    pub fn clear(&self) {
        self.state.send_modify(|state| {
            state.messages.clear();
            state.input.clear();
        });
    }

    pub fn len(&self) -> usize {
        self.state.borrow().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last(&self) -> Option<ChatMessage> {
        self.state.borrow().messages.last().cloned()
    }

    pub fn input(&self) -> String {
        self.state.borrow().input.clone()
    }

    pub fn snapshot(&self) -> ChatState {
        self.state.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_edit_last() {
        let chat = ChatLog::default();
        assert!(!chat.edit_last_text("nothing to edit"));

        chat.push(ChatMessage::from_user("You", "hello"));
        chat.push(ChatMessage::from_character("a.png", "Alice", "hi"));
        assert_eq!(chat.len(), 2);

        assert!(chat.edit_last_text("hi there"));
        let last = chat.last().unwrap();
        assert_eq!(last.text, "hi there");
        assert_eq!(last.original_avatar.as_deref(), Some("a.png"));
        assert!(last.is_character());
    }

    #[tokio::test]
    async fn subscribers_wake_on_mutation() {
        let chat = ChatLog::default();
        let mut rx = chat.subscribe();

        chat.set_input("typing...");
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().input, "typing...");

        chat.push(ChatMessage::system("joined"));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().messages.len(), 1);
    }

    #[test]
    fn legacy_message_deserializes_without_tag() {
        let json = r#"{ "name": "Alice", "text": "hello" }"#;
        let message: ChatMessage = serde_json::from_str(json).unwrap();
        assert!(message.original_avatar.is_none());
        assert!(message.is_character());
    }
}
