//! Drives one group reply cycle.
//!
//! A cycle resolves the speakers, then generates for each of them strictly
//! one after another, waiting for every generation to finish before
//! dispatching the next. Only one cycle runs at a time across all groups; a
//! trigger that arrives while a cycle is running is dropped. Whatever happens
//! inside a cycle, the sequencer ends up Idle with input unlocked.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::activation::{ActivationRequest, ActivationResolver, ActivationResult};
use crate::chat::{ChatLog, ChatMessage};
use crate::completion::{Baseline, CompletionDetector, DeliveryFlags};
use crate::config::EngineConfig;
use crate::error::GroupError;
use crate::events::{EventSink, GroupEvent};
use crate::generation::{GenerationRequest, Generator, TurnKind};
use crate::group::{Group, GroupStore};
use crate::registry::CharacterRegistry;
use crate::{CharacterId, GroupId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    Idle,
    Generating,
    Aborting,
}

/// Why a cycle ended without generating anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoGroupMembers,
    AllMembersDisabled,
    NobodyActivated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberReply {
    pub character_id: CharacterId,
    /// Text handed back by the generator instead of being written into the chat.
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Another cycle was already running; nothing happened.
    Busy,
    Skipped(SkipReason),
    Completed(Vec<MemberReply>),
}

struct Session {
    state: SequencerState,
    selected_group: Option<GroupId>,
    active_character: Option<CharacterId>,
    abort: Option<CancellationToken>,
}

pub struct TurnSequencer {
    groups: Arc<GroupStore>,
    registry: Arc<dyn CharacterRegistry>,
    generator: Arc<dyn Generator>,
    chat: Arc<ChatLog>,
    events: EventSink,
    session: Mutex<Session>,
    delivery: RwLock<DeliveryFlags>,
    user_name: String,
    default_talkativeness: f32,
    rng: StdMutex<StdRng>,
}

impl TurnSequencer {
    pub fn new(
        groups: Arc<GroupStore>,
        registry: Arc<dyn CharacterRegistry>,
        generator: Arc<dyn Generator>,
        chat: Arc<ChatLog>,
        events: EventSink,
        config: &EngineConfig,
    ) -> Self {
        Self {
            groups,
            registry,
            generator,
            chat,
            events,
            session: Mutex::new(Session {
                state: SequencerState::Idle,
                selected_group: None,
                active_character: None,
                abort: None,
            }),
            delivery: RwLock::new(config.delivery()),
            user_name: config.user_name.clone(),
            default_talkativeness: config.default_talkativeness,
            rng: StdMutex::new(StdRng::from_entropy()),
        }
    }

    /// Make activation rolls reproducible.
    pub fn with_seed(self, seed: u64) -> Self {
        *self.rng.lock().unwrap_or_else(PoisonError::into_inner) = StdRng::seed_from_u64(seed);
        self
    }

    pub async fn state(&self) -> SequencerState {
        self.session.lock().await.state
    }

    pub async fn is_idle(&self) -> bool {
        self.state().await == SequencerState::Idle
    }

    pub async fn selected_group(&self) -> Option<GroupId> {
        self.session.lock().await.selected_group.clone()
    }

    /// Focus a group. Emits `GroupOpened` when the focus actually changes.
    pub async fn select_group(&self, group_id: &str) {
        let mut session = self.session.lock().await;
        if session.selected_group.as_deref() == Some(group_id) {
            return;
        }
        session.selected_group = Some(group_id.to_string());
        drop(session);

        self.events.emit(GroupEvent::GroupOpened(group_id.to_string()));
    }

    pub async fn active_character(&self) -> Option<CharacterId> {
        self.session.lock().await.active_character.clone()
    }

    pub async fn delivery(&self) -> DeliveryFlags {
        *self.delivery.read().await
    }

    pub async fn set_delivery(&self, flags: DeliveryFlags) {
        *self.delivery.write().await = flags;
    }

    pub fn chat(&self) -> &Arc<ChatLog> {
        &self.chat
    }

    pub fn generator(&self) -> &Arc<dyn Generator> {
        &self.generator
    }

    /// Cancel the running cycle. Returns `false` if there was nothing to stop.
    pub async fn stop(&self) -> bool {
        let mut session = self.session.lock().await;
        if session.state != SequencerState::Generating {
            return false;
        }
        session.state = SequencerState::Aborting;
        if let Some(abort) = &session.abort {
            abort.cancel();
        }
        tracing::info!("Stopping group generation");
        true
    }

    /// Run one reply cycle for a group.
    pub async fn run(
        &self,
        group_id: &str,
        request: ActivationRequest,
    ) -> Result<RunOutcome, GroupError> {
        self.run_with_start(group_id, request, || {}).await
    }

    /// Like [`run`](Self::run), calling `on_start` only once this cycle owns the
    /// sequencer. A busy sequencer never calls it.
    pub async fn run_with_start<F>(
        &self,
        group_id: &str,
        request: ActivationRequest,
        on_start: F,
    ) -> Result<RunOutcome, GroupError>
    where
        F: FnOnce(),
    {
        let abort = request.abort.clone().unwrap_or_default();
        {
            let mut session = self.session.lock().await;
            if session.state != SequencerState::Idle {
                tracing::debug!(
                    "Group generation already running; ignoring {:?} trigger",
                    request.kind
                );
                return Ok(RunOutcome::Busy);
            }
            session.state = SequencerState::Generating;
            session.abort = Some(abort.clone());
        }
        on_start();

        tracing::info!("Group cycle started ({:?}) for group {}", request.kind, group_id);
        let result = self.run_cycle(group_id, &request, &abort).await;
        self.cleanup().await;

        match &result {
            Ok(RunOutcome::Completed(replies)) => {
                tracing::info!("Group cycle finished with {} reply(ies)", replies.len())
            }
            Ok(outcome) => tracing::info!("Group cycle ended early: {:?}", outcome),
            Err(GroupError::GenerationAborted) => tracing::warn!("Group cycle aborted"),
            Err(e) => tracing::error!("Group cycle failed: {}", e),
        }
        result
    }

    async fn run_cycle(
        &self,
        group_id: &str,
        request: &ActivationRequest,
        abort: &CancellationToken,
    ) -> Result<RunOutcome, GroupError> {
        self.events.emit(GroupEvent::InputLocked);

        let group = self
            .groups
            .get(group_id)
            .await
            .ok_or_else(|| GroupError::GroupNotFound(group_id.to_string()))?;
        self.select_group(&group.id).await;

        let activated = match self.resolve(&group, request) {
            Ok(activated) => activated,
            Err(GroupError::NoMemberFound) => {
                self.events.warn(
                    "Could not find the author of the last message. Add them back to the group to regenerate it.",
                );
                return Err(GroupError::NoMemberFound);
            }
            Err(e) => return Err(e),
        };

        if activated.is_empty() {
            return Ok(RunOutcome::Skipped(self.skip(&group, request)));
        }

        let delivery = self.delivery().await;
        let mut replies = Vec::with_capacity(activated.len());

        for member in activated.members {
            if abort.is_cancelled() {
                return Err(GroupError::GenerationAborted);
            }

            self.session.lock().await.active_character = Some(member.id.clone());
            self.events
                .emit(GroupEvent::ActiveCharacter(Some(member.id.clone())));

            let display_name = self
                .registry
                .display_name(&member.id)
                .unwrap_or_else(|| member.id.clone());
            if request.kind.is_plain_turn() && !delivery.streaming && !delivery.multigen {
                self.events
                    .emit(GroupEvent::TypingIndicator(Some(display_name.clone())));
            }

            tracing::debug!("Generating for {} ({})", display_name, member.id);
            let baseline = Baseline::capture(&self.chat.snapshot());
            let ticket = self
                .generator
                .generate(GenerationRequest {
                    kind: request.kind,
                    group_id: group.id.clone(),
                    character_id: member.id.clone(),
                    character_index: member.index,
                    forced_member: request.forced_member.clone(),
                    automatic_trigger: request.kind == TurnKind::AutoTrigger,
                    quiet_prompt: request.quiet_prompt.clone(),
                    abort: abort.clone(),
                })
                .await?;

            let outcome = CompletionDetector::new(request.kind, delivery, baseline)
                .wait(&self.chat, ticket, abort)
                .await?;

            if request.kind == TurnKind::Impersonate {
                if let Some(text) = &outcome.text {
                    self.chat.set_input(text.clone());
                }
            }

            replies.push(MemberReply {
                character_id: member.id,
                text: outcome.text,
            });
        }

        Ok(RunOutcome::Completed(replies))
    }

    fn resolve(
        &self,
        group: &Group,
        request: &ActivationRequest,
    ) -> Result<ActivationResult, GroupError> {
        let last_message = self.chat.last();
        let resolver = ActivationResolver::new(self.registry.as_ref())
            .with_default_talkativeness(self.default_talkativeness);
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        resolver.resolve(group, request, last_message.as_ref(), &mut *rng)
    }

    /// Report an empty activation and pick the matching reason.
    fn skip(&self, group: &Group, request: &ActivationRequest) -> SkipReason {
        if group.members.is_empty() {
            self.events
                .warn("This group has no members. Add a character to get replies.");
            return SkipReason::NoGroupMembers;
        }

        if group.enabled_members().is_empty() {
            self.events
                .warn("All group members are disabled. Enable at least one to get replies.");
            if let Some(input) = request.user_input() {
                self.chat
                    .push(ChatMessage::from_user(self.user_name.clone(), input));
                self.chat.set_input("");
                self.events
                    .emit(GroupEvent::UserMessageForwarded(input.to_string()));
            }
            return SkipReason::AllMembersDisabled;
        }

        tracing::info!("No member of group {} qualified to reply", group.id);
        SkipReason::NobodyActivated
    }

    async fn cleanup(&self) {
        self.events.emit(GroupEvent::TypingIndicator(None));
        {
            let mut session = self.session.lock().await;
            session.state = SequencerState::Idle;
            session.active_character = None;
            session.abort = None;
        }
        self.events.emit(GroupEvent::InputUnlocked);
        self.events.emit(GroupEvent::ActiveCharacter(None));
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::generation::{GenerationOutcome, GenerationTicket};
    use crate::registry::{test_character, CharacterBook};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    /// Generator double that writes canned replies into the chat after a delay.
    pub struct ScriptedGenerator {
        pub chat: Arc<ChatLog>,
        pub registry: Arc<CharacterBook>,
        pub delay: Duration,
        pub fail_for: Option<CharacterId>,
        pub online: AtomicBool,
        pub calls: StdMutex<Vec<GenerationRequest>>,
    }

    impl ScriptedGenerator {
        pub fn new(chat: Arc<ChatLog>, registry: Arc<CharacterBook>, delay: Duration) -> Self {
            Self {
                chat,
                registry,
                delay,
                fail_for: None,
                online: AtomicBool::new(true),
                calls: StdMutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> Vec<GenerationRequest> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Generator for ScriptedGenerator {
        async fn generate(&self, request: GenerationRequest) -> Result<GenerationTicket> {
            self.calls.lock().unwrap().push(request.clone());
            let (handle, ticket) = GenerationTicket::channel();

            let chat = self.chat.clone();
            let name = self
                .registry
                .display_name(&request.character_id)
                .unwrap_or_default();
            let delay = self.delay;
            let fail = self.fail_for.as_deref() == Some(request.character_id.as_str());

            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if fail {
                    handle.fail("backend unavailable");
                    return;
                }
                let text = format!("{} says hi", name);
                match request.kind {
                    TurnKind::Normal | TurnKind::AutoTrigger => {
                        chat.push(ChatMessage::from_character(
                            request.character_id.clone(),
                            name,
                            text,
                        ));
                        handle.finish(GenerationOutcome::default());
                    }
                    TurnKind::Swipe | TurnKind::Continue => {
                        chat.edit_last_text(text);
                        handle.finish(GenerationOutcome::default());
                    }
                    TurnKind::Impersonate | TurnKind::Quiet => {
                        handle.finish(GenerationOutcome { text: Some(text) });
                    }
                }
            });

            Ok(ticket)
        }

        fn is_online(&self) -> bool {
            self.online.load(Ordering::SeqCst)
        }
    }

    pub fn book() -> Arc<CharacterBook> {
        Arc::new(CharacterBook::from_cards(vec![
            test_character("alice.png", "Alice", Some(1.0)),
            test_character("bob.png", "Bob", Some(1.0)),
            test_character("carol.png", "Carol", Some(1.0)),
        ]))
    }

    pub struct Harness {
        pub sequencer: Arc<TurnSequencer>,
        pub generator: Arc<ScriptedGenerator>,
        pub groups: Arc<GroupStore>,
        pub chat: Arc<ChatLog>,
        pub events: flume::Receiver<GroupEvent>,
    }

    pub fn harness(delay: Duration, fail_for: Option<&str>) -> Harness {
        let chat = Arc::new(ChatLog::default());
        let registry = book();
        let mut generator = ScriptedGenerator::new(chat.clone(), registry.clone(), delay);
        generator.fail_for = fail_for.map(str::to_string);
        let generator = Arc::new(generator);
        let groups = Arc::new(GroupStore::new());
        let (tx, rx) = flume::unbounded();

        let sequencer = TurnSequencer::new(
            groups.clone(),
            registry,
            generator.clone(),
            chat.clone(),
            EventSink::new(tx),
            &EngineConfig::default(),
        )
        .with_seed(7);

        Harness {
            sequencer: Arc::new(sequencer),
            generator,
            groups,
            chat,
            events: rx,
        }
    }

    pub async fn wait_until_generating(sequencer: &TurnSequencer) {
        for _ in 0..200 {
            if sequencer.state().await == SequencerState::Generating {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("sequencer never started generating");
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::group::ActivationStrategy;
    use std::time::Duration;

    fn ids(names: &[&str]) -> Vec<CharacterId> {
        names.iter().map(|n| n.to_string()).collect()
    }

    async fn list_group(h: &Harness, members: &[&str]) -> Group {
        let group = h.groups.create_group("Tavern", ids(members)).await;
        h.groups
            .update(&group.id, |g| g.activation_strategy = ActivationStrategy::List)
            .await
            .unwrap()
    }

    fn drain(events: &flume::Receiver<GroupEvent>) -> Vec<GroupEvent> {
        events.try_iter().collect()
    }

    #[tokio::test]
    async fn list_cycle_generates_members_in_order() {
        let h = harness(Duration::from_millis(5), None);
        let group = list_group(&h, &["bob.png", "alice.png", "carol.png"]).await;
        h.chat.push(ChatMessage::from_user("You", "Hello all"));

        let outcome = h
            .sequencer
            .run(&group.id, ActivationRequest::new(TurnKind::Normal).with_input("Hello all"))
            .await
            .unwrap();

        let RunOutcome::Completed(replies) = outcome else {
            panic!("expected a completed cycle");
        };
        let order: Vec<_> = replies.iter().map(|r| r.character_id.as_str()).collect();
        assert_eq!(order, vec!["bob.png", "alice.png", "carol.png"]);

        let authors: Vec<_> = h
            .chat
            .snapshot()
            .messages
            .iter()
            .skip(1)
            .map(|m| m.name.clone())
            .collect();
        assert_eq!(authors, vec!["Bob", "Alice", "Carol"]);

        assert!(h.sequencer.is_idle().await);
        assert_eq!(h.sequencer.active_character().await, None);
        assert_eq!(h.sequencer.selected_group().await, Some(group.id.clone()));

        let events = drain(&h.events);
        assert_eq!(events.first(), Some(&GroupEvent::InputLocked));
        assert!(events.contains(&GroupEvent::GroupOpened(group.id.clone())));
        assert!(events.contains(&GroupEvent::TypingIndicator(Some("Bob".to_string()))));
        assert_eq!(events.last(), Some(&GroupEvent::ActiveCharacter(None)));
        assert!(events.contains(&GroupEvent::InputUnlocked));
    }

    #[tokio::test]
    async fn second_run_while_generating_is_a_no_op() {
        let h = harness(Duration::from_millis(100), None);
        let group = list_group(&h, &["alice.png"]).await;

        let sequencer = h.sequencer.clone();
        let group_id = group.id.clone();
        let first = tokio::spawn(async move {
            sequencer
                .run(&group_id, ActivationRequest::new(TurnKind::Normal))
                .await
        });

        wait_until_generating(&h.sequencer).await;
        let before = h.chat.len();
        let second = h
            .sequencer
            .run(&group.id, ActivationRequest::new(TurnKind::Normal))
            .await
            .unwrap();
        assert_eq!(second, RunOutcome::Busy);
        assert_eq!(h.chat.len(), before);
        assert_eq!(h.sequencer.state().await, SequencerState::Generating);

        let first = first.await.unwrap().unwrap();
        assert!(matches!(first, RunOutcome::Completed(ref r) if r.len() == 1));
        assert_eq!(h.generator.calls().len(), 1);
        assert!(h.sequencer.is_idle().await);
    }

    #[tokio::test]
    async fn start_hook_only_fires_for_the_cycle_that_runs() {
        let h = harness(Duration::from_millis(100), None);
        let group = list_group(&h, &["alice.png"]).await;

        let sequencer = h.sequencer.clone();
        let group_id = group.id.clone();
        let first = tokio::spawn(async move {
            let mut started = false;
            let outcome = sequencer
                .run_with_start(&group_id, ActivationRequest::new(TurnKind::Normal), || {
                    started = true
                })
                .await;
            (started, outcome)
        });

        wait_until_generating(&h.sequencer).await;
        let mut started = false;
        let second = h
            .sequencer
            .run_with_start(&group.id, ActivationRequest::new(TurnKind::Normal), || {
                started = true
            })
            .await
            .unwrap();
        assert_eq!(second, RunOutcome::Busy);
        assert!(!started);

        let (started, outcome) = first.await.unwrap();
        assert!(started);
        assert!(matches!(outcome, Ok(RunOutcome::Completed(_))));
    }

    #[tokio::test]
    async fn stop_aborts_and_skips_remaining_members() {
        let h = harness(Duration::from_millis(200), None);
        let group = list_group(&h, &["alice.png", "bob.png", "carol.png"]).await;

        let sequencer = h.sequencer.clone();
        let group_id = group.id.clone();
        let run = tokio::spawn(async move {
            sequencer
                .run(&group_id, ActivationRequest::new(TurnKind::Normal))
                .await
        });

        wait_until_generating(&h.sequencer).await;
        assert!(h.sequencer.stop().await);

        let err = run.await.unwrap().unwrap_err();
        assert!(err.is_abort());
        assert_eq!(h.generator.calls().len(), 1);
        assert!(h.sequencer.is_idle().await);
        assert!(!h.sequencer.stop().await);
        assert!(drain(&h.events).contains(&GroupEvent::InputUnlocked));
    }

    #[tokio::test]
    async fn pre_cancelled_request_generates_nothing() {
        let h = harness(Duration::from_millis(5), None);
        let group = list_group(&h, &["alice.png", "bob.png"]).await;
        let abort = CancellationToken::new();
        abort.cancel();

        let err = h
            .sequencer
            .run(&group.id, ActivationRequest::new(TurnKind::Normal).with_abort(abort))
            .await
            .unwrap_err();
        assert!(err.is_abort());
        assert!(h.generator.calls().is_empty());
        assert!(h.sequencer.is_idle().await);
    }

    #[tokio::test]
    async fn swipe_without_author_warns_and_generates_nothing() {
        let h = harness(Duration::from_millis(5), None);
        let group = list_group(&h, &["alice.png", "bob.png"]).await;
        h.chat.push(ChatMessage::from_character("ghost.png", "Ghost", "boo"));

        let err = h
            .sequencer
            .run(&group.id, ActivationRequest::new(TurnKind::Swipe))
            .await
            .unwrap_err();
        assert!(matches!(err, GroupError::NoMemberFound));
        assert!(h.generator.calls().is_empty());
        assert!(h.sequencer.is_idle().await);

        let events = drain(&h.events);
        assert!(events.iter().any(|e| matches!(e, GroupEvent::Warning(_))));
        assert!(events.contains(&GroupEvent::InputUnlocked));
    }

    #[tokio::test]
    async fn swipe_regenerates_last_message() {
        let h = harness(Duration::from_millis(5), None);
        let group = list_group(&h, &["alice.png", "bob.png"]).await;
        h.chat
            .push(ChatMessage::from_character("bob.png", "Bob", "first try"));

        let outcome = h
            .sequencer
            .run(&group.id, ActivationRequest::new(TurnKind::Swipe))
            .await
            .unwrap();
        assert!(matches!(outcome, RunOutcome::Completed(ref r) if r[0].character_id == "bob.png"));
        assert_eq!(h.chat.len(), 1);
        assert_eq!(h.chat.last().unwrap().text, "Bob says hi");
    }

    #[tokio::test]
    async fn all_disabled_forwards_user_message() {
        let h = harness(Duration::from_millis(5), None);
        let group = h.groups.create_group("Tavern", ids(&["alice.png", "bob.png"])).await;
        h.groups
            .update(&group.id, |g| {
                g.set_member_enabled("alice.png", false);
                g.set_member_enabled("bob.png", false);
            })
            .await
            .unwrap();
        h.chat.set_input("anyone there?");

        let outcome = h
            .sequencer
            .run(
                &group.id,
                ActivationRequest::new(TurnKind::Normal).with_input("anyone there?"),
            )
            .await
            .unwrap();
        assert_eq!(outcome, RunOutcome::Skipped(SkipReason::AllMembersDisabled));

        let last = h.chat.last().unwrap();
        assert!(last.is_user);
        assert_eq!(last.text, "anyone there?");
        assert_eq!(h.chat.input(), "");
        assert!(h.generator.calls().is_empty());
        assert!(drain(&h.events)
            .contains(&GroupEvent::UserMessageForwarded("anyone there?".to_string())));
    }

    #[tokio::test]
    async fn empty_group_is_skipped() {
        let h = harness(Duration::from_millis(5), None);
        let group = h.groups.create_group("Empty", Vec::new()).await;

        let outcome = h
            .sequencer
            .run(&group.id, ActivationRequest::new(TurnKind::Normal).with_input("hi"))
            .await
            .unwrap();
        assert_eq!(outcome, RunOutcome::Skipped(SkipReason::NoGroupMembers));
        assert!(h.chat.is_empty());
        assert!(h.sequencer.is_idle().await);
    }

    #[tokio::test]
    async fn generator_failure_still_cleans_up() {
        let h = harness(Duration::from_millis(5), Some("bob.png"));
        let group = list_group(&h, &["alice.png", "bob.png", "carol.png"]).await;

        let err = h
            .sequencer
            .run(&group.id, ActivationRequest::new(TurnKind::Normal))
            .await
            .unwrap_err();
        assert!(matches!(err, GroupError::GenerationFailed(_)));
        assert_eq!(h.generator.calls().len(), 2);
        assert_eq!(h.chat.len(), 1);
        assert!(h.sequencer.is_idle().await);
        assert!(drain(&h.events).contains(&GroupEvent::InputUnlocked));
    }

    #[tokio::test]
    async fn impersonation_fills_the_input_box() {
        let h = harness(Duration::from_millis(5), None);
        let group = list_group(&h, &["carol.png"]).await;

        let outcome = h
            .sequencer
            .run(&group.id, ActivationRequest::new(TurnKind::Impersonate))
            .await
            .unwrap();
        assert!(matches!(outcome, RunOutcome::Completed(_)));
        assert_eq!(h.chat.input(), "Carol says hi");
        assert!(h.chat.is_empty());
    }

    #[tokio::test]
    async fn forced_speaker_is_tagged_on_the_request() {
        let h = harness(Duration::from_millis(5), None);
        let group = list_group(&h, &["alice.png", "bob.png"]).await;

        h.sequencer
            .run(
                &group.id,
                ActivationRequest::new(TurnKind::Normal).with_forced_member("bob.png"),
            )
            .await
            .unwrap();
        let calls = h.generator.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].character_id, "bob.png");
        assert_eq!(calls[0].forced_member.as_deref(), Some("bob.png"));
        assert!(!calls[0].automatic_trigger);
    }

    #[tokio::test]
    async fn unknown_group_is_an_error() {
        let h = harness(Duration::from_millis(5), None);
        let err = h
            .sequencer
            .run("missing", ActivationRequest::new(TurnKind::Normal))
            .await
            .unwrap_err();
        assert!(matches!(err, GroupError::GroupNotFound(_)));
        assert!(h.sequencer.is_idle().await);
    }
}
