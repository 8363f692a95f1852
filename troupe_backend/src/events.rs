//! Signals the engine produces for whatever front end is listening.
//!
//! The engine never touches UI state directly; it pushes these events down a
//! `flume` channel and lets the receiver decide how to render them.

use flume::Sender;

use crate::{CharacterId, GroupId};

#[derive(Debug, Clone, PartialEq)]
pub enum GroupEvent {
    /// Send button and input affordances should be disabled.
    InputLocked,
    /// Send button and input affordances may be used again.
    InputUnlocked,
    /// The engine switched focus to this group.
    GroupOpened(GroupId),
    /// Character currently generating, or `None` once the cycle is over.
    ActiveCharacter(Option<CharacterId>),
    /// Show the typing indicator for a display name, or hide it.
    TypingIndicator(Option<String>),
    /// A user-facing warning (toast).
    Warning(String),
    /// Input was delivered as a plain user message because nobody could answer.
    UserMessageForwarded(String),
    AutoModeChanged(bool),
}

/// Thin wrapper over the channel so that a closed receiver never becomes an error.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Option<Sender<GroupEvent>>,
}

impl EventSink {
    pub fn new(tx: Sender<GroupEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink that drops every event.
    pub fn disconnected() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: GroupEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }

    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}", message);
        self.emit(GroupEvent::Warning(message));
    }
}
