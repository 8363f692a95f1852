//! Offline stand-in for a model backend: replies come from canned lines.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use troupe_backend::chat::{ChatLog, ChatMessage};
use troupe_backend::completion::DeliveryFlags;
use troupe_backend::generation::{
    CompletionHandle, GenerationOutcome, GenerationRequest, GenerationTicket, Generator,
    StreamingProcessor, TurnKind,
};
use troupe_backend::registry::{CharacterBook, CharacterRegistry};
use troupe_backend::CharacterId;

const FALLBACK_LINES: &[&str] = &[
    "I have a thought on that.",
    "Let me add something.",
    "That reminds me of a story.",
];

pub struct ScriptedGenerator {
    chat: Arc<ChatLog>,
    book: Arc<CharacterBook>,
    lines: HashMap<CharacterId, Vec<String>>,
    delay: Duration,
    delivery: DeliveryFlags,
    counter: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new(
        chat: Arc<ChatLog>,
        book: Arc<CharacterBook>,
        lines: HashMap<CharacterId, Vec<String>>,
        delay: Duration,
        delivery: DeliveryFlags,
    ) -> Self {
        Self {
            chat,
            book,
            lines,
            delay,
            delivery,
            counter: AtomicUsize::new(0),
        }
    }

    fn next_line(&self, character_id: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        match self.lines.get(character_id) {
            Some(lines) if !lines.is_empty() => lines[n % lines.len()].clone(),
            _ => FALLBACK_LINES[n % FALLBACK_LINES.len()].to_string(),
        }
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationTicket> {
        let name = self
            .book
            .display_name(&request.character_id)
            .unwrap_or_else(|| request.character_id.clone());
        let text = match &request.quiet_prompt {
            Some(prompt) if request.kind == TurnKind::Quiet => {
                format!("({} quietly considers: {})", name, prompt)
            }
            _ => self.next_line(&request.character_id),
        };
        tracing::debug!("Scripted {:?} reply for {}: {}", request.kind, name, text);

        let (handle, ticket) = GenerationTicket::channel();
        let streaming = self.delivery.streaming.then(StreamingProcessor::new);
        let ticket = match &streaming {
            Some(processor) => ticket.with_streaming(processor),
            None => ticket,
        };

        let reply = Reply {
            chat: self.chat.clone(),
            request,
            name,
            text,
            delay: self.delay,
        };
        tokio::spawn(reply.deliver(handle, streaming));
        Ok(ticket)
    }
}

struct Reply {
    chat: Arc<ChatLog>,
    request: GenerationRequest,
    name: String,
    text: String,
    delay: Duration,
}

impl Reply {
    async fn deliver(self, handle: CompletionHandle, streaming: Option<StreamingProcessor>) {
        tokio::select! {
            _ = self.request.abort.cancelled() => {
                handle.fail("generation stopped");
                return;
            }
            _ = tokio::time::sleep(self.delay) => {}
        }

        let outcome = match self.request.kind {
            TurnKind::Normal | TurnKind::AutoTrigger => {
                let first = if streaming.is_some() {
                    String::new()
                } else {
                    self.text.clone()
                };
                self.chat.push(ChatMessage::from_character(
                    self.request.character_id.clone(),
                    self.name.clone(),
                    first,
                ));
                if streaming.is_some() {
                    self.write_last(&self.text, true).await;
                }
                GenerationOutcome::default()
            }
            TurnKind::Swipe => {
                self.write_last(&self.text, streaming.is_some()).await;
                GenerationOutcome::default()
            }
            TurnKind::Continue => {
                let existing = self.chat.last().map(|m| m.text).unwrap_or_default();
                let continued = format!("{} {}", existing, self.text);
                self.write_last(continued.trim(), streaming.is_some()).await;
                GenerationOutcome::default()
            }
            TurnKind::Impersonate | TurnKind::Quiet => GenerationOutcome {
                text: Some(self.text.clone()),
            },
        };

        if let Some(processor) = &streaming {
            processor.finish();
        }
        handle.finish(outcome);
    }

    /// Replace the last message's text, word by word when streaming.
    async fn write_last(&self, text: &str, streamed: bool) {
        if !streamed {
            self.chat.edit_last_text(text);
            return;
        }
        let mut partial = String::new();
        for word in text.split_whitespace() {
            if !partial.is_empty() {
                partial.push(' ');
            }
            partial.push_str(word);
            self.chat.edit_last_text(partial.clone());
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
