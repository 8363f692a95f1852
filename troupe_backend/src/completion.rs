//! Decides when one member's generation is finished.
//!
//! Which signal counts as "finished" depends on the turn kind and on how the
//! reply is delivered (plain, streamed, multigen). The detector captures a
//! baseline before dispatch and then wakes on chat mutations, streaming
//! progress, the ticket, or the abort token, re-checking after each wake.

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::chat::{ChatLog, ChatState};
use crate::error::GroupError;
use crate::generation::{GenerationOutcome, GenerationTicket, TurnKind};

/// Delivery modes that change how completion is observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryFlags {
    pub streaming: bool,
    pub multigen: bool,
}

/// Chat state captured just before a generation is dispatched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Baseline {
    pub message_count: usize,
    pub last_text: Option<String>,
    pub input: String,
}

impl Baseline {
    pub fn capture(state: &ChatState) -> Self {
        Self {
            message_count: state.messages.len(),
            last_text: state.messages.last().map(|m| m.text.clone()),
            input: state.input.clone(),
        }
    }
}

/// Completion-relevant signals at one instant.
#[derive(Debug, Clone, Copy)]
struct Signals {
    /// The generator resolved its ticket successfully.
    done: bool,
    /// Streaming processor finished, or there is none.
    streaming_finished: bool,
}

#[derive(Debug, Clone)]
pub struct CompletionDetector {
    kind: TurnKind,
    flags: DeliveryFlags,
    baseline: Baseline,
}

impl CompletionDetector {
    pub fn new(kind: TurnKind, flags: DeliveryFlags, baseline: Baseline) -> Self {
        Self {
            kind,
            flags,
            baseline,
        }
    }

    fn is_complete(&self, state: &ChatState, signals: Signals) -> bool {
        match self.kind {
            TurnKind::Normal | TurnKind::AutoTrigger => {
                if !self.flags.multigen && state.messages.len() <= self.baseline.message_count {
                    return false;
                }
                if self.flags.multigen {
                    signals.done
                } else if self.flags.streaming {
                    signals.streaming_finished
                } else {
                    true
                }
            }
            TurnKind::Swipe => {
                if self.flags.multigen {
                    signals.done
                } else if self.flags.streaming {
                    signals.streaming_finished
                } else {
                    state.messages.last().map(|m| m.text.as_str()) != self.baseline.last_text.as_deref()
                }
            }
            TurnKind::Impersonate => {
                if self.flags.multigen {
                    signals.done
                } else if self.flags.streaming {
                    signals.streaming_finished
                } else {
                    !state.input.is_empty() && state.input != self.baseline.input
                }
            }
            TurnKind::Continue => {
                if self.flags.streaming && !self.flags.multigen {
                    signals.streaming_finished
                } else {
                    signals.done
                }
            }
            TurnKind::Quiet => signals.done,
        }
    }

    /// Wait until the generation behind `ticket` is finished.
    ///
    /// Returns the generator's outcome if the ticket resolved before the
    /// observable state did; `GenerationOutcome::default()` otherwise.
    pub async fn wait(
        &self,
        chat: &ChatLog,
        mut ticket: GenerationTicket,
        abort: &CancellationToken,
    ) -> Result<GenerationOutcome, GroupError> {
        let mut chat_rx = chat.subscribe();
        let mut streaming_rx = ticket.streaming.take();
        let mut outcome: Option<GenerationOutcome> = None;

        loop {
            if abort.is_cancelled() {
                return Err(GroupError::GenerationAborted);
            }

            let signals = Signals {
                done: outcome.is_some(),
                streaming_finished: streaming_finished(streaming_rx.as_ref()),
            };
            let complete = {
                let state = chat_rx.borrow_and_update();
                self.is_complete(&state, signals)
            };
            if complete {
                // Pick up text the generator handed back alongside the chat signal.
                if outcome.is_none() {
                    if let Ok(result) = ticket.done.try_recv() {
                        outcome = Some(result.map_err(GroupError::GenerationFailed)?);
                    }
                }
                return Ok(outcome.unwrap_or_default());
            }
            // A resolved ticket is the authoritative signal even if the chat never changed.
            if let Some(outcome) = outcome.take() {
                tracing::debug!(
                    "Generation for {:?} turn reported done before its chat signal",
                    self.kind
                );
                return Ok(outcome);
            }

            tokio::select! {
                biased;
                _ = abort.cancelled() => return Err(GroupError::GenerationAborted),
                result = &mut ticket.done => {
                    match result {
                        Ok(Ok(resolved)) => outcome = Some(resolved),
                        Ok(Err(error)) => return Err(GroupError::GenerationFailed(error)),
                        Err(_) => {
                            return Err(GroupError::GenerationFailed(
                                "generator dropped the completion handle".to_string(),
                            ))
                        }
                    }
                }
                _ = chat_rx.changed() => {}
                _ = wait_streaming(&mut streaming_rx) => {}
            }
        }
    }
}

fn streaming_finished(rx: Option<&watch::Receiver<bool>>) -> bool {
    match rx {
        None => true,
        Some(rx) => *rx.borrow() || rx.has_changed().is_err(),
    }
}

/// Resolves on the next streaming change; never resolves without a live processor.
async fn wait_streaming(rx: &mut Option<watch::Receiver<bool>>) {
    let closed = match rx.as_mut() {
        Some(inner) => inner.changed().await.is_err(),
        None => return std::future::pending().await,
    };
    if closed {
        // Processor gone: counts as finished from now on.
        *rx = None;
    }
}
