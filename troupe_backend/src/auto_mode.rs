//! Auto mode: keep the group talking on its own.
//!
//! Every period the scheduler checks whether a new cycle may start (enabled,
//! a group is selected, backend online, sequencer idle) and, if so, starts
//! one with a fresh cancellation handle.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::activation::ActivationRequest;
use crate::error::GroupError;
use crate::events::{EventSink, GroupEvent};
use crate::generation::TurnKind;
use crate::sequencer::{RunOutcome, TurnSequencer};

#[derive(Debug, PartialEq)]
pub enum TickOutcome {
    Disabled,
    NoGroupSelected,
    Offline,
    Busy,
    Ran(RunOutcome),
}

pub struct AutoModeScheduler {
    sequencer: Arc<TurnSequencer>,
    events: EventSink,
    period: Duration,
    enabled: AtomicBool,
    /// Abort handle of the auto cycle in flight, keyed by the tick that started it.
    handle: Mutex<Option<(u64, CancellationToken)>>,
    ticks: AtomicU64,
}

impl AutoModeScheduler {
    pub fn new(sequencer: Arc<TurnSequencer>, events: EventSink, period: Duration) -> Self {
        Self {
            sequencer,
            events,
            period,
            enabled: AtomicBool::new(false),
            handle: Mutex::new(None),
            ticks: AtomicU64::new(0),
        }
    }

    fn lock_handle(&self) -> MutexGuard<'_, Option<(u64, CancellationToken)>> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        let previous = self.enabled.swap(enabled, Ordering::SeqCst);
        if previous != enabled {
            tracing::info!("Auto mode {}", if enabled { "enabled" } else { "disabled" });
            self.events.emit(GroupEvent::AutoModeChanged(enabled));
        }
    }

    /// The user started typing: no new auto cycles, but a running one finishes.
    pub fn on_user_typing(&self) {
        self.set_enabled(false);
    }

    /// Explicit stop: disable and cancel the auto cycle in flight, if any.
    pub async fn stop(&self) {
        self.set_enabled(false);
        let running = self.lock_handle().take();
        if let Some((_, abort)) = running {
            abort.cancel();
        }
    }

    /// One scheduler step. Never changes the enabled flag.
    pub async fn tick(&self) -> Result<TickOutcome, GroupError> {
        if !self.is_enabled() {
            return Ok(TickOutcome::Disabled);
        }
        let Some(group_id) = self.sequencer.selected_group().await else {
            return Ok(TickOutcome::NoGroupSelected);
        };
        if !self.sequencer.generator().is_online() {
            return Ok(TickOutcome::Offline);
        }
        if !self.sequencer.is_idle().await {
            return Ok(TickOutcome::Busy);
        }

        let tick = self.ticks.fetch_add(1, Ordering::SeqCst);
        let abort = CancellationToken::new();
        let request = ActivationRequest::new(TurnKind::AutoTrigger).with_abort(abort.clone());

        tracing::debug!("Auto mode triggering a cycle for group {}", group_id);
        let outcome = self
            .sequencer
            .run_with_start(&group_id, request, || {
                *self.lock_handle() = Some((tick, abort));
            })
            .await;

        {
            let mut handle = self.lock_handle();
            if matches!(*handle, Some((owner, _)) if owner == tick) {
                *handle = None;
            }
        }
        let outcome = outcome?;

        Ok(match outcome {
            RunOutcome::Busy => TickOutcome::Busy,
            other => TickOutcome::Ran(other),
        })
    }

    /// Tick every period until `shutdown` fires.
    pub async fn run_loop(self: Arc<Self>, shutdown: CancellationToken) {
        tracing::info!("Auto mode loop starting (every {:?})", self.period);
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of a tokio interval fires immediately.
        interval.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            match self.tick().await {
                Ok(TickOutcome::Ran(outcome)) => tracing::debug!("Auto cycle done: {:?}", outcome),
                Ok(_) => {}
                Err(e) if e.is_abort() => tracing::info!("Auto cycle stopped"),
                Err(e) => tracing::warn!("Auto cycle failed: {}", e),
            }
        }
        tracing::info!("Auto mode loop stopped");
    }
}
