/* affect:meta
id: AFF-20261013-test-support
intent: test
summary: |-
  Shared helpers: in-memory engines with a quiet config, metadata builder and
  a recorder that captures counters and gauges.
*/
#![allow(dead_code, clippy::type_complexity)]
use std::sync::{Arc, Mutex, OnceLock};

use affect_engine::config::AffectConfig;
use affect_engine::persistence::{MemoryStore, PersistedState};
use affect_engine::state::{AffectEngine, Metadata};
use metrics::{Counter, Gauge, Histogram, Key, KeyName, Recorder, SharedString, Unit};

pub fn test_config() -> AffectConfig {
    AffectConfig {
        metrics_enabled: false,
        ..AffectConfig::default()
    }
}

pub fn memory_engine(config: AffectConfig) -> (Arc<AffectEngine>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let engine = AffectEngine::new(config, store.clone()).expect("engine");
    (engine, store)
}

pub fn engine_at(config: AffectConfig, progress: i32) -> (Arc<AffectEngine>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::with_state(PersistedState {
        current_progress: progress,
        ..PersistedState::default()
    }));
    let engine = AffectEngine::new(config, store.clone()).expect("engine");
    (engine, store)
}

pub fn meta(pairs: &[(&str, serde_json::Value)]) -> Metadata {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

struct TestRecorder {
    data: Arc<Mutex<Vec<(String, f64)>>>,
}

impl Recorder for TestRecorder {
    fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &metrics::Metadata<'_>) -> Counter {
        let name = key.name().to_string();
        let data = self.data.clone();
        Counter::from_arc(Arc::new(TestCounter { name, data }))
    }
    fn register_gauge(&self, key: &Key, _metadata: &metrics::Metadata<'_>) -> Gauge {
        let name = key.name().to_string();
        let data = self.data.clone();
        Gauge::from_arc(Arc::new(TestGauge { name, data }))
    }
    fn register_histogram(&self, _key: &Key, _metadata: &metrics::Metadata<'_>) -> Histogram {
        Histogram::noop()
    }
}

struct TestCounter {
    name: String,
    data: Arc<Mutex<Vec<(String, f64)>>>,
}

impl metrics::CounterFn for TestCounter {
    fn increment(&self, value: u64) {
        self.data
            .lock()
            .unwrap()
            .push((self.name.clone(), value as f64));
    }
    fn absolute(&self, value: u64) {
        self.data
            .lock()
            .unwrap()
            .push((self.name.clone(), value as f64));
    }
}

struct TestGauge {
    name: String,
    data: Arc<Mutex<Vec<(String, f64)>>>,
}

impl metrics::GaugeFn for TestGauge {
    fn increment(&self, value: f64) {
        self.data.lock().unwrap().push((self.name.clone(), value));
    }
    fn decrement(&self, value: f64) {
        self.data.lock().unwrap().push((self.name.clone(), -value));
    }
    fn set(&self, value: f64) {
        self.data.lock().unwrap().push((self.name.clone(), value));
    }
}

static RECORDER: OnceLock<Arc<Mutex<Vec<(String, f64)>>>> = OnceLock::new();

pub fn init_recorder() -> Arc<Mutex<Vec<(String, f64)>>> {
    let data = RECORDER
        .get_or_init(|| {
            let data = Arc::new(Mutex::new(Vec::new()));
            let recorder = TestRecorder { data: data.clone() };
            let _ = metrics::set_global_recorder(recorder);
            data
        })
        .clone();
    data.lock().unwrap().clear();
    data
}
