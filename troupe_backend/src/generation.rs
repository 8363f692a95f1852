//! The seam to whatever actually produces text (an LLM backend, a script, a test double).
//!
//! `Generator::generate` returns as soon as the work is dispatched. Completion
//! is reported later through the [`GenerationTicket`], which carries a oneshot
//! channel the generator resolves exactly once, and optionally a
//! [`StreamingProcessor`] watch for streamed replies.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::{CharacterId, GroupId};

/// What kind of turn triggered a generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnKind {
    /// The user sent a message (or pressed send on an empty box).
    #[default]
    Normal,
    /// Fired by the auto-mode timer.
    AutoTrigger,
    /// Regenerate the last message.
    Swipe,
    /// Extend the last message.
    Continue,
    /// A character ghost-writes the user's next message.
    Impersonate,
    /// Background generation that is not shown as a new turn.
    Quiet,
}

impl TurnKind {
    /// Turns that produce a new chat message in the usual way.
    pub fn is_plain_turn(self) -> bool {
        matches!(self, TurnKind::Normal | TurnKind::AutoTrigger)
    }
}

/// Everything a generator needs to produce one character's reply.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub kind: TurnKind,
    pub group_id: GroupId,
    pub character_id: CharacterId,
    /// Registry index of `character_id` at dispatch time.
    pub character_index: usize,
    pub forced_member: Option<CharacterId>,
    pub automatic_trigger: bool,
    pub quiet_prompt: Option<String>,
    pub abort: CancellationToken,
}

/// Final result of a single generation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationOutcome {
    /// Generated text when the generator does not write it into the chat itself
    /// (impersonation, quiet prompts).
    pub text: Option<String>,
}

/// Generator-side half of the completion channel.
#[derive(Debug)]
pub struct CompletionHandle {
    tx: oneshot::Sender<Result<GenerationOutcome, String>>,
}

impl CompletionHandle {
    pub fn finish(self, outcome: GenerationOutcome) {
        let _ = self.tx.send(Ok(outcome));
    }

    pub fn fail(self, error: impl Into<String>) {
        let _ = self.tx.send(Err(error.into()));
    }
}

/// Engine-side half: resolved once the generation is done or failed.
#[derive(Debug)]
pub struct GenerationTicket {
    pub(crate) done: oneshot::Receiver<Result<GenerationOutcome, String>>,
    pub(crate) streaming: Option<watch::Receiver<bool>>,
}

impl GenerationTicket {
    pub fn channel() -> (CompletionHandle, GenerationTicket) {
        let (tx, rx) = oneshot::channel();
        (
            CompletionHandle { tx },
            GenerationTicket {
                done: rx,
                streaming: None,
            },
        )
    }

    /// A ticket that is already resolved, for generators that finish synchronously.
    pub fn ready(outcome: GenerationOutcome) -> GenerationTicket {
        let (handle, ticket) = Self::channel();
        handle.finish(outcome);
        ticket
    }

    pub fn with_streaming(mut self, processor: &StreamingProcessor) -> Self {
        self.streaming = Some(processor.subscribe());
        self
    }

    pub fn is_streamed(&self) -> bool {
        self.streaming.is_some()
    }

    /// Wait for the generator's verdict alone, ignoring chat state.
    pub async fn outcome(self) -> Result<GenerationOutcome, String> {
        self.done
            .await
            .unwrap_or_else(|_| Err("generator dropped the completion handle".to_string()))
    }
}

/// Tracks a streamed reply. `is_finished` flips once and stays set.
#[derive(Debug)]
pub struct StreamingProcessor {
    finished: watch::Sender<bool>,
}

impl Default for StreamingProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamingProcessor {
    pub fn new() -> Self {
        let (finished, _) = watch::channel(false);
        Self { finished }
    }

    pub fn finish(&self) {
        self.finished.send_replace(true);
    }

    pub fn is_finished(&self) -> bool {
        *self.finished.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.finished.subscribe()
    }
}

#[async_trait]
pub trait Generator: Send + Sync {
    /// Start generating for one character. Returns once dispatched, not once done.
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationTicket>;

    /// Whether the backend is reachable. Auto mode stays quiet while offline.
    fn is_online(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ready_ticket_is_resolved() {
        let ticket = GenerationTicket::ready(GenerationOutcome {
            text: Some("done".to_string()),
        });
        let outcome = ticket.done.await.unwrap().unwrap();
        assert_eq!(outcome.text.as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn dropped_handle_fails_the_outcome() {
        let (handle, ticket) = GenerationTicket::channel();
        assert!(!ticket.is_streamed());
        drop(handle);
        let err = ticket.outcome().await.unwrap_err();
        assert!(err.contains("dropped"));
    }

    #[test]
    fn streaming_processor_flag_sticks() {
        let processor = StreamingProcessor::new();
        let rx = processor.subscribe();
        assert!(!processor.is_finished());
        processor.finish();
        assert!(processor.is_finished());
        assert!(*rx.borrow());
    }
}
