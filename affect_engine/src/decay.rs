/* affect:meta
id: AFF-20261005-decay-scheduler
intent: code
summary: |-
  Single cancelable decay timer. Every effective mutation re-arms it; value 0
  leaves it idle. Each arming gets a generation so a tick that lost a race
  with a newer mutation is discarded.
*/
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::DecayConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecayState {
    Idle,
    Armed,
}

impl DecayState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Armed => "armed",
        }
    }
}

#[derive(Default)]
struct TimerSlot {
    generation: u64,
    armed: Option<CancellationToken>,
    stopped: bool,
}

pub struct DecayScheduler {
    config: DecayConfig,
    runtime: Handle,
    slot: Mutex<TimerSlot>,
}

impl DecayScheduler {
    pub fn new(config: DecayConfig, runtime: Handle) -> Self {
        Self {
            config,
            runtime,
            slot: Mutex::new(TimerSlot::default()),
        }
    }

    pub fn config(&self) -> &DecayConfig {
        &self.config
    }

    pub fn interval(&self) -> Duration {
        self.config.interval()
    }

    pub fn state(&self) -> DecayState {
        if self.slot.lock().armed.is_some() {
            DecayState::Armed
        } else {
            DecayState::Idle
        }
    }

    /// Cancels the pending timer and, for a non-zero `value`, arms a new one.
    /// `on_fire` receives the generation it was armed with.
    pub fn rearm<F>(&self, value: i32, on_fire: F)
    where
        F: FnOnce(u64) + Send + 'static,
    {
        let mut slot = self.slot.lock();
        if let Some(token) = slot.armed.take() {
            token.cancel();
        }
        slot.generation += 1;
        if value == 0 || slot.stopped || !self.config.enabled {
            debug!(value, "decay idle");
            return;
        }
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let generation = slot.generation;
        let interval = self.config.interval();
        self.runtime.spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = sleep(interval) => on_fire(generation),
            }
        });
        slot.armed = Some(token);
        debug!(value, generation, ?interval, "decay armed");
    }

    /// Whether `generation` is still the most recent arming.
    pub fn is_current(&self, generation: u64) -> bool {
        let slot = self.slot.lock();
        slot.armed.is_some() && slot.generation == generation
    }

    /// Drops back to idle without touching the generation counter.
    pub fn disarm(&self) {
        if let Some(token) = self.slot.lock().armed.take() {
            token.cancel();
        }
    }

    /// Cancels the timer for good; later `rearm` calls stay idle.
    pub fn stop(&self) {
        let mut slot = self.slot.lock();
        slot.stopped = true;
        if let Some(token) = slot.armed.take() {
            token.cancel();
        }
    }

    /// Signed delta for one tick at `value`: toward zero, never past it.
    pub fn step_for(&self, value: i32) -> i32 {
        let magnitude = self.config.magnitude_for(value);
        if value > 0 {
            -magnitude
        } else {
            magnitude
        }
    }
}
