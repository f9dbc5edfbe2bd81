/* affect:meta
id: AFF-20261007-affect-engine
intent: code
summary: |-
  The single affect value with its bounded history. Every change goes
  through one critical section; side effects (persistence, decay re-arm,
  broadcast) are triggered from there in a fixed order and never block.
*/
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::broadcast::{BroadcastHub, BroadcastMessage, Observer, ObserverId};
use crate::config::AffectConfig;
use crate::decay::{DecayScheduler, DecayState};
use crate::emotion::{classify, EmotionReading};
use crate::error::AffectError;
use crate::persistence::{
    load_or_default, rounded_i32, rounded_i64, PersistedState, PersistenceWorker, StateStore,
};
use crate::statistics::AffectStatistics;

pub const MIN_VALUE: i32 = -100;
pub const MAX_VALUE: i32 = 100;

/// Open key/value map attached to every change.
pub type Metadata = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Sentiment,
    Manual,
    Decay,
    Reset,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sentiment => "sentiment",
            Self::Manual => "manual",
            Self::Decay => "decay",
            Self::Reset => "reset",
        }
    }
}

/// One effective change of the affect value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "oldProgress", deserialize_with = "rounded_i32")]
    pub value_before: i32,
    #[serde(rename = "newProgress", deserialize_with = "rounded_i32")]
    pub value_after: i32,
    #[serde(rename = "change", deserialize_with = "rounded_i32")]
    pub applied_delta: i32,
    #[serde(rename = "requestedChange", default, deserialize_with = "rounded_i64")]
    pub requested_delta: i64,
    #[serde(default)]
    pub metadata: Metadata,
}

impl ChangeRecord {
    pub fn trigger(&self) -> Option<&str> {
        self.metadata.get("trigger").and_then(Value::as_str)
    }
}

/// Result of a mutation request. `record` is `None` for a no-op.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationOutcome {
    pub old_value: i32,
    pub new_value: i32,
    pub applied_delta: i32,
    pub record: Option<ChangeRecord>,
}

impl MutationOutcome {
    pub fn is_noop(&self) -> bool {
        self.record.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectSnapshot {
    pub progress: i32,
    pub last_updated: DateTime<Utc>,
    pub emotion: EmotionReading,
    pub decay: DecayState,
    pub observers: usize,
}

/// Extra metadata merged into every broadcast, such as per-source activity.
/// Called with the engine state lock held; implementations must not call
/// back into the engine.
pub trait BroadcastContext: Send + Sync {
    fn broadcast_metadata(&self) -> Metadata;
}

struct AffectInner {
    value: i32,
    last_updated: DateTime<Utc>,
    history: Vec<ChangeRecord>,
}

impl AffectInner {
    fn persisted(&self, keep: usize) -> PersistedState {
        let start = self.history.len().saturating_sub(keep);
        PersistedState {
            current_progress: self.value,
            last_updated: Some(self.last_updated),
            history: self.history[start..].to_vec(),
        }
    }
}

pub struct AffectEngine {
    me: Weak<AffectEngine>,
    config: AffectConfig,
    state: Mutex<AffectInner>,
    hub: BroadcastHub,
    decay: DecayScheduler,
    persistence: PersistenceWorker,
    context: RwLock<Option<Arc<dyn BroadcastContext>>>,
}

impl AffectEngine {
    /// Loads the stored state and arms decay if the value is not neutral.
    /// Must be called from within a tokio runtime.
    pub fn new(config: AffectConfig, store: Arc<dyn StateStore>) -> Result<Arc<Self>, AffectError> {
        let runtime = Handle::try_current().map_err(|_| AffectError::RuntimeUnavailable)?;
        let mut config = config;
        config.normalize();

        let loaded = load_or_default(store.as_ref());
        let mut history = loaded.history;
        history.sort_by_key(|r| r.timestamp);
        let excess = history.len().saturating_sub(config.history.ceiling);
        history.drain(..excess);
        // a stamp from a skewed clock must not pin future records
        let now = Utc::now();
        let inner = AffectInner {
            value: loaded.current_progress.clamp(MIN_VALUE, MAX_VALUE),
            last_updated: loaded.last_updated.map_or(now, |ts| ts.min(now)),
            history,
        };
        let value = inner.value;

        let engine = Arc::new_cyclic(|me| Self {
            me: me.clone(),
            hub: BroadcastHub::new(config.observer_buffer),
            decay: DecayScheduler::new(config.decay.clone(), runtime.clone()),
            persistence: PersistenceWorker::spawn(store, &runtime),
            state: Mutex::new(inner),
            context: RwLock::new(None),
            config,
        });
        {
            let _guard = engine.state.lock();
            engine.rearm_decay(value);
        }
        metrics::gauge!("affect_value").set(f64::from(value));
        info!(progress = value, "affect engine started");
        Ok(engine)
    }

    pub fn config(&self) -> &AffectConfig {
        &self.config
    }

    /// Replaces the broadcast context. Its keys never override the engine's own.
    pub fn attach_context(&self, context: Arc<dyn BroadcastContext>) {
        *self.context.write() = Some(context);
    }

    /// Applies `requested_delta`, clamped into bounds.
    pub fn mutate(&self, requested_delta: i64, metadata: Metadata, trigger: Trigger) -> MutationOutcome {
        let mut state = self.state.lock();
        self.mutate_locked(&mut state, requested_delta, metadata, trigger)
    }

    /// Moves the value to `target`; the delta is computed inside the same
    /// critical section as the write.
    pub fn set_absolute(&self, target: i64, mut metadata: Metadata, trigger: Trigger) -> MutationOutcome {
        let mut state = self.state.lock();
        let target = target.clamp(i64::from(MIN_VALUE), i64::from(MAX_VALUE));
        metadata
            .entry("targetValue")
            .or_insert_with(|| json!(target));
        let requested = target - i64::from(state.value);
        self.mutate_locked(&mut state, requested, metadata, trigger)
    }

    pub fn reset(&self) -> MutationOutcome {
        self.set_absolute(0, Metadata::new(), Trigger::Reset)
    }

    pub fn value(&self) -> i32 {
        self.state.lock().value
    }

    pub fn emotion(&self) -> EmotionReading {
        classify(self.value())
    }

    pub fn snapshot(&self) -> AffectSnapshot {
        let (progress, last_updated) = {
            let state = self.state.lock();
            (state.value, state.last_updated)
        };
        AffectSnapshot {
            progress,
            last_updated,
            emotion: classify(progress),
            decay: self.decay.state(),
            observers: self.hub.len(),
        }
    }

    /// Most recent `limit` records, oldest first.
    pub fn history(&self, limit: usize) -> Vec<ChangeRecord> {
        let state = self.state.lock();
        let start = state.history.len().saturating_sub(limit);
        state.history[start..].to_vec()
    }

    pub fn history_len(&self) -> usize {
        self.state.lock().history.len()
    }

    pub fn statistics(&self) -> AffectStatistics {
        let state = self.state.lock();
        AffectStatistics::from_history(state.value, &state.history)
    }

    pub fn decay_state(&self) -> DecayState {
        self.decay.state()
    }

    /// Registers an observer. The snapshot is taken under the state lock, so
    /// no delta can slip in between it and the registration.
    pub fn subscribe(&self) -> Observer {
        let state = self.state.lock();
        let mut metadata = Metadata::new();
        metadata.insert("trigger".into(), json!("snapshot"));
        metadata.insert("currentEmotion".into(), json!(classify(state.value)));
        self.decorate(&mut metadata);
        let initial = BroadcastMessage::progress_update(state.value, metadata, Utc::now());
        self.hub.subscribe(initial)
    }

    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        self.hub.unsubscribe(id)
    }

    pub fn observer_count(&self) -> usize {
        self.hub.len()
    }

    /// Cancels the decay timer, closes every observer and flushes the last
    /// snapshot to the store.
    pub async fn shutdown(&self) {
        self.decay.stop();
        self.hub.close_all();
        self.persistence.close().await;
        info!("affect engine stopped");
    }

    fn mutate_locked(
        &self,
        state: &mut AffectInner,
        requested_delta: i64,
        mut metadata: Metadata,
        trigger: Trigger,
    ) -> MutationOutcome {
        let before = state.value;
        let after = i64::from(before)
            .saturating_add(requested_delta)
            .clamp(i64::from(MIN_VALUE), i64::from(MAX_VALUE)) as i32;
        let applied = after - before;
        if applied == 0 {
            metrics::counter!("affect_noop_mutations_total", "trigger" => trigger.as_str())
                .increment(1);
            debug!(progress = before, requested_delta, trigger = trigger.as_str(), "no-op mutation");
            return MutationOutcome {
                old_value: before,
                new_value: before,
                applied_delta: 0,
                record: None,
            };
        }

        // history stays ordered even if the wall clock steps back
        let now = Utc::now().max(state.last_updated);
        metadata.insert("trigger".into(), json!(trigger.as_str()));
        let record = ChangeRecord {
            timestamp: now,
            value_before: before,
            value_after: after,
            applied_delta: applied,
            requested_delta,
            metadata,
        };
        state.value = after;
        state.last_updated = now;
        state.history.push(record.clone());
        let history = &self.config.history;
        if state.history.len() > history.ceiling {
            let drop = state.history.len() - history.retain;
            state.history.drain(..drop);
            metrics::counter!("affect_history_trims_total").increment(1);
        }

        self.persistence
            .submit(state.persisted(self.config.history.persisted));
        self.rearm_decay(after);
        let mut message = delta_message(&record);
        self.decorate(&mut message.metadata);
        self.hub.publish(message);

        metrics::gauge!("affect_value").set(f64::from(after));
        metrics::counter!("affect_mutations_total", "trigger" => trigger.as_str()).increment(1);
        let emotion = classify(after);
        info!(
            from = before,
            to = after,
            change = applied,
            trigger = trigger.as_str(),
            emotion = emotion.band.as_str(),
            intensity = emotion.intensity,
            "affect changed"
        );

        MutationOutcome {
            old_value: before,
            new_value: after,
            applied_delta: applied,
            record: Some(record),
        }
    }

    fn decorate(&self, metadata: &mut Metadata) {
        if let Some(context) = self.context.read().as_ref() {
            for (key, value) in context.broadcast_metadata() {
                metadata.entry(key).or_insert(value);
            }
        }
    }

    /// Callers hold the state lock.
    fn rearm_decay(&self, value: i32) {
        let me = self.me.clone();
        self.decay.rearm(value, move |generation| {
            if let Some(engine) = me.upgrade() {
                engine.decay_tick(generation);
            }
        });
    }

    fn decay_tick(&self, generation: u64) {
        let mut state = self.state.lock();
        if !self.decay.is_current(generation) {
            debug!(generation, "stale decay tick ignored");
            return;
        }
        let value = state.value;
        if value == 0 {
            self.decay.disarm();
            return;
        }
        let step = self.decay.step_for(value);
        metrics::counter!("affect_decay_ticks_total").increment(1);
        let mut metadata = Metadata::new();
        metadata.insert("source".into(), json!("timer"));
        metadata.insert("absProgress".into(), json!(value.abs()));
        metadata.insert("decayAmount".into(), json!(step.abs()));
        self.mutate_locked(&mut state, i64::from(step), metadata, Trigger::Decay);
    }
}

fn delta_message(record: &ChangeRecord) -> BroadcastMessage {
    let current = classify(record.value_after);
    let previous = classify(record.value_before);
    let mut metadata = record.metadata.clone();
    metadata.insert("change".into(), json!(record.applied_delta));
    metadata.insert("oldProgress".into(), json!(record.value_before));
    metadata.insert("requestedChange".into(), json!(record.requested_delta));
    metadata.insert("currentEmotion".into(), json!(current));
    metadata.insert("oldEmotion".into(), json!(previous));
    metadata.insert("emotionChanged".into(), json!(current.band != previous.band));
    BroadcastMessage::progress_update(record.value_after, metadata, record.timestamp)
}
