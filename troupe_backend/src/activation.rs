//! Who speaks next.
//!
//! Resolution is a pure function of the group, the request, the last chat
//! message, the character registry and a random source. Special turn kinds
//! (forced speaker, quiet, swipe/continue, impersonate) are handled before
//! the group's activation strategy is consulted.

use rand::seq::SliceRandom;
use rand::Rng;
use regex_lite::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;
use tokio_util::sync::CancellationToken;

use crate::chat::ChatMessage;
use crate::error::GroupError;
use crate::generation::TurnKind;
use crate::group::{ActivationStrategy, Group};
use crate::registry::CharacterRegistry;
use crate::CharacterId;

/// Talkativeness used when a character card does not carry a usable value.
pub const DEFAULT_TALKATIVENESS: f32 = 0.5;

#[derive(Debug, Clone, Default)]
pub struct ActivationRequest {
    pub kind: TurnKind,
    /// "Speak" action: this member answers regardless of strategy or disabled status.
    pub forced_member: Option<CharacterId>,
    pub abort: Option<CancellationToken>,
    /// Text the user typed, if this turn came from the send button.
    pub input: Option<String>,
    pub quiet_prompt: Option<String>,
}

impl ActivationRequest {
    pub fn new(kind: TurnKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    pub fn with_forced_member(mut self, id: impl Into<CharacterId>) -> Self {
        self.forced_member = Some(id.into());
        self
    }

    pub fn with_abort(mut self, abort: CancellationToken) -> Self {
        self.abort = Some(abort);
        self
    }

    pub fn with_quiet_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.quiet_prompt = Some(prompt.into());
        self
    }

    /// Non-empty user input on a user-initiated turn.
    pub fn user_input(&self) -> Option<&str> {
        if self.kind != TurnKind::Normal {
            return None;
        }
        self.input
            .as_deref()
            .filter(|input| !input.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivatedMember {
    pub id: CharacterId,
    pub index: usize,
}

/// Members to generate for, in invocation order. Empty means nobody qualifies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationResult {
    pub members: Vec<ActivatedMember>,
}

impl ActivationResult {
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn ids(&self) -> Vec<CharacterId> {
        self.members.iter().map(|m| m.id.clone()).collect()
    }
}

pub struct ActivationResolver<'a> {
    registry: &'a dyn CharacterRegistry,
    default_talkativeness: f32,
}

impl<'a> ActivationResolver<'a> {
    pub fn new(registry: &'a dyn CharacterRegistry) -> Self {
        Self {
            registry,
            default_talkativeness: DEFAULT_TALKATIVENESS,
        }
    }

    pub fn with_default_talkativeness(mut self, talkativeness: f32) -> Self {
        if talkativeness.is_finite() {
            self.default_talkativeness = talkativeness.clamp(0.0, 1.0);
        }
        self
    }

    pub fn resolve<R: Rng + ?Sized>(
        &self,
        group: &Group,
        request: &ActivationRequest,
        last_message: Option<&ChatMessage>,
        rng: &mut R,
    ) -> Result<ActivationResult, GroupError> {
        if let Some(forced) = &request.forced_member {
            tracing::debug!("Forced speaker {} in group {}", forced, group.id);
            return Ok(self.finalize(vec![forced.clone()]));
        }

        let enabled = group.enabled_members();

        let picked = match request.kind {
            TurnKind::Quiet => {
                // Author first, else the first enabled member the registry still knows.
                let author = self.finalize(
                    self.swipe_author(group, &enabled, last_message)
                        .into_iter()
                        .collect(),
                );
                if !author.is_empty() {
                    return Ok(author);
                }
                enabled
                    .iter()
                    .find(|id| self.registry.resolve_member_index(id).is_some())
                    .cloned()
                    .into_iter()
                    .collect()
            }
            TurnKind::Swipe | TurnKind::Continue => {
                let author = self
                    .swipe_author(group, &enabled, last_message)
                    .ok_or(GroupError::NoMemberFound)?;
                let result = self.finalize(vec![author]);
                if result.is_empty() {
                    return Err(GroupError::NoMemberFound);
                }
                return Ok(result);
            }
            TurnKind::Impersonate => group.members.choose(rng).cloned().into_iter().collect(),
            TurnKind::Normal | TurnKind::AutoTrigger => match group.activation_strategy {
                ActivationStrategy::List => enabled,
                ActivationStrategy::Natural => {
                    self.natural_order(group, &enabled, request, last_message, rng)
                }
            },
        };

        let result = self.finalize(picked);
        tracing::debug!(
            "Activated {:?} for {:?} turn in group {}",
            result.ids(),
            request.kind,
            group.id
        );
        Ok(result)
    }

    /// Author of the last message among the enabled members.
    ///
    /// A tagged message names its author exactly. Untagged (older) messages
    /// fall back to matching the display name; with duplicate names the first
    /// enabled member wins.
    fn swipe_author(
        &self,
        group: &Group,
        enabled: &[CharacterId],
        last_message: Option<&ChatMessage>,
    ) -> Option<CharacterId> {
        let last = last_message?;
        match &last.original_avatar {
            Some(tag) => group.is_enabled(tag).then(|| tag.clone()),
            None => self.member_named(enabled, &last.name),
        }
    }

    fn member_named(&self, candidates: &[CharacterId], name: &str) -> Option<CharacterId> {
        candidates
            .iter()
            .find(|id| self.registry.display_name(id).as_deref() == Some(name))
            .cloned()
    }

    fn natural_order<R: Rng + ?Sized>(
        &self,
        group: &Group,
        enabled: &[CharacterId],
        request: &ActivationRequest,
        last_message: Option<&ChatMessage>,
        rng: &mut R,
    ) -> Vec<CharacterId> {
        let user_input = request.user_input();
        let is_user_input = user_input.is_some();
        let activation_text = match user_input {
            Some(input) => input.to_string(),
            None => last_message
                .filter(|m| !m.is_system)
                .map(|m| m.text.clone())
                .unwrap_or_default(),
        };

        let banned = match last_message {
            Some(last) if !is_user_input && !group.allow_self_responses && last.is_character() => {
                match &last.original_avatar {
                    Some(tag) => Some(tag.clone()),
                    None => self.member_named(enabled, &last.name),
                }
            }
            _ => None,
        };

        let eligible: Vec<CharacterId> = enabled
            .iter()
            .filter(|id| Some(*id) != banned.as_ref())
            .cloned()
            .collect();

        let mut activated = Vec::new();

        // Mentions: the first member whose name contains each word, in word order.
        for word in extract_words(&activation_text) {
            let mentioned = eligible.iter().find(|id| {
                self.registry
                    .display_name(id)
                    .map(|name| extract_words(&name).contains(&word))
                    .unwrap_or(false)
            });
            if let Some(id) = mentioned {
                if !activated.contains(id) {
                    activated.push(id.clone());
                }
            }
        }

        // Talkativeness roll, in random order.
        let mut shuffled = eligible.clone();
        shuffled.shuffle(rng);
        for id in shuffled {
            let talkativeness = self
                .registry
                .talkativeness(&id)
                .unwrap_or(self.default_talkativeness);
            let roll: f32 = rng.gen();
            if talkativeness >= roll {
                activated.push(id);
            }
        }

        // Nobody volunteered: pick someone so the group never goes silent.
        if activated.is_empty() {
            let candidates = if eligible.is_empty() { enabled } else { &eligible[..] };
            for _ in 0..candidates.len() {
                let Some(id) = candidates.choose(rng) else {
                    break;
                };
                if self.registry.resolve_member_index(id).is_some() {
                    activated.push(id.clone());
                    break;
                }
            }
        }

        if let Some(banned) = &banned {
            tracing::debug!("Member {} may not answer itself this turn", banned);
        }
        activated
    }

    /// De-duplicate (first occurrence wins) and drop ids missing from the registry.
    fn finalize(&self, ids: Vec<CharacterId>) -> ActivationResult {
        let mut seen = HashSet::new();
        let members = ids
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .filter_map(|id| {
                let index = self.registry.resolve_member_index(&id);
                if index.is_none() {
                    tracing::debug!("Dropping member {} missing from the registry", id);
                }
                index.map(|index| ActivatedMember { id, index })
            })
            .collect();
        ActivationResult { members }
    }
}

fn word_regex() -> &'static Regex {
    static WORDS: OnceLock<Regex> = OnceLock::new();
    WORDS.get_or_init(|| Regex::new(r"\w+").expect("static word regex"))
}

/// Lower-cased word tokens, in order of appearance.
pub fn extract_words(text: &str) -> Vec<String> {
    word_regex()
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}
