use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use flume::Sender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::auto_mode::AutoModeScheduler;
use crate::chat::ChatLog;
use crate::config::EngineConfig;
use crate::events::{EventSink, GroupEvent};
use crate::generation::Generator;
use crate::group::GroupStore;
use crate::registry::CharacterRegistry;
use crate::sequencer::TurnSequencer;

pub struct EngineRuntime {
    pub config: EngineConfig,
    pub groups: Arc<GroupStore>,
    pub chat: Arc<ChatLog>,
    pub sequencer: Arc<TurnSequencer>,
    pub auto_mode: Arc<AutoModeScheduler>,
    shutdown: CancellationToken,
}

pub struct EngineRuntimeBuilder {
    config: EngineConfig,
    event_tx: Option<Sender<GroupEvent>>,
    registry: Option<Arc<dyn CharacterRegistry>>,
    generator: Option<Arc<dyn Generator>>,
    chat: Option<Arc<ChatLog>>,
    groups: Option<Arc<GroupStore>>,
    seed: Option<u64>,
}

impl EngineRuntimeBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            event_tx: None,
            registry: None,
            generator: None,
            chat: None,
            groups: None,
            seed: None,
        }
    }

    pub fn with_events(mut self, event_tx: Sender<GroupEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    pub fn with_registry(mut self, registry: Arc<dyn CharacterRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Share an existing chat log, e.g. one the generator also writes into.
    pub fn with_chat(mut self, chat: Arc<ChatLog>) -> Self {
        self.chat = Some(chat);
        self
    }

    pub fn with_groups(mut self, groups: Arc<GroupStore>) -> Self {
        self.groups = Some(groups);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<EngineRuntime> {
        let config = self.config;
        let registry = self
            .registry
            .context("EngineRuntime needs a character registry")?;
        let generator = self.generator.context("EngineRuntime needs a generator")?;
        let chat = self.chat.unwrap_or_default();
        let groups = self.groups.unwrap_or_default();
        let events = match self.event_tx {
            Some(tx) => EventSink::new(tx),
            None => EventSink::disconnected(),
        };

        let mut sequencer = TurnSequencer::new(
            groups.clone(),
            registry,
            generator,
            chat.clone(),
            events.clone(),
            &config,
        );
        if let Some(seed) = self.seed {
            sequencer = sequencer.with_seed(seed);
        }
        let sequencer = Arc::new(sequencer);

        let period = Duration::from_secs(config.auto_mode_interval_secs.max(1));
        let auto_mode = Arc::new(AutoModeScheduler::new(sequencer.clone(), events, period));
        auto_mode.set_enabled(config.auto_mode_enabled);

        tracing::info!(
            "Engine runtime ready (auto mode: {}, streaming: {}, multigen: {})",
            config.auto_mode_enabled,
            config.streaming_enabled,
            config.multigen_enabled
        );

        Ok(EngineRuntime {
            config,
            groups,
            chat,
            sequencer,
            auto_mode,
            shutdown: CancellationToken::new(),
        })
    }
}

impl EngineRuntime {
    pub fn builder(config: EngineConfig) -> EngineRuntimeBuilder {
        EngineRuntimeBuilder::new(config)
    }

    /// Spawn the auto-mode timer on the current tokio runtime.
    pub fn spawn_auto_mode_loop(&self) -> JoinHandle<()> {
        let auto_mode = self.auto_mode.clone();
        tokio::spawn(auto_mode.run_loop(self.shutdown.child_token()))
    }

    /// Stop background loops and cancel whatever cycle is running.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.auto_mode.stop().await;
        self.sequencer.stop().await;
    }
}
