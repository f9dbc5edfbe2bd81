/* affect:meta
id: AFF-20261004-persistence
intent: code
summary: |-
  Snapshot of value + recent history in a JSON file. Loaded once at startup,
  rewritten after every effective mutation by a background writer that
  coalesces bursts. Failures are logged and never reach the caller.
*/
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::{spawn_blocking, JoinHandle};
use tracing::{debug, info, warn};

use crate::config::AffectConfig;
use crate::error::AffectError;
use crate::state::ChangeRecord;

/// On-disk shape of the engine state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    #[serde(default, deserialize_with = "rounded_i32")]
    pub current_progress: i32,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_history")]
    pub history: Vec<ChangeRecord>,
}

impl PersistedState {
    /// Zero value, empty history, stamped now.
    pub fn empty() -> Self {
        Self {
            current_progress: 0,
            last_updated: Some(Utc::now()),
            history: Vec::new(),
        }
    }
}

/// Any JSON number, rounded half away from zero and saturated.
pub(crate) fn rounded_i64<'de, D: Deserializer<'de>>(de: D) -> Result<i64, D::Error> {
    let n = f64::deserialize(de)?;
    Ok(n.round() as i64)
}

pub(crate) fn rounded_i32<'de, D: Deserializer<'de>>(de: D) -> Result<i32, D::Error> {
    let n = rounded_i64(de)?;
    Ok(n.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32)
}

/// Entries that do not parse are skipped instead of failing the whole file.
fn lenient_history<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<ChangeRecord>, D::Error> {
    let raw = Option::<Vec<Value>>::deserialize(de)?.unwrap_or_default();
    let total = raw.len();
    let history: Vec<ChangeRecord> = raw
        .into_iter()
        .enumerate()
        .filter_map(|(idx, entry)| match serde_json::from_value(entry) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(index = idx, %err, "skipping unreadable history entry");
                None
            }
        })
        .collect();
    if history.len() < total {
        metrics::counter!("affect_persist_failures_total", "op" => "history_entry")
            .increment((total - history.len()) as u64);
    }
    Ok(history)
}

/// Durable home of the snapshot.
pub trait StateStore: Send + Sync {
    /// `Ok(None)` when nothing has been stored yet.
    fn load(&self) -> Result<Option<PersistedState>, AffectError>;
    fn save(&self, state: &PersistedState) -> Result<(), AffectError>;
}

/// Pretty-printed JSON file, replaced atomically on save.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> Result<Option<PersistedState>, AffectError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)?;
        let state = serde_json::from_str(&raw)?;
        Ok(Some(state))
    }

    fn save(&self, state: &PersistedState) -> Result<(), AffectError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_string_pretty(state)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(body.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// In-process store for tests and for running without a state file.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<Option<PersistedState>>,
    saves: AtomicU64,
    fail_saves: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: PersistedState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
            ..Self::default()
        }
    }

    /// Makes every following `save` fail with an I/O error.
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn saved(&self) -> Option<PersistedState> {
        self.state.lock().clone()
    }

    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::SeqCst)
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> Result<Option<PersistedState>, AffectError> {
        Ok(self.state.lock().clone())
    }

    fn save(&self, state: &PersistedState) -> Result<(), AffectError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(AffectError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "memory store configured to fail",
            )));
        }
        *self.state.lock() = Some(state.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Reads the stored snapshot, falling back to defaults on any failure.
pub fn load_or_default(store: &dyn StateStore) -> PersistedState {
    match store.load() {
        Ok(Some(state)) => {
            info!(progress = state.current_progress, "loaded affect state");
            state
        }
        Ok(None) => {
            info!("no stored affect state, starting from 0");
            PersistedState::default()
        }
        Err(err) => {
            metrics::counter!("affect_persist_failures_total", "op" => "load").increment(1);
            warn!(%err, "failed to load affect state, starting from 0");
            PersistedState::default()
        }
    }
}

/// Offline wipe used by the `full_reset` tool: value 0, empty history.
/// `target` overrides the configured state file.
pub fn full_reset(
    config: &AffectConfig,
    target: Option<PathBuf>,
) -> Result<(PathBuf, PersistedState), AffectError> {
    let path = target.unwrap_or_else(|| config.state_file.clone());
    let state = PersistedState::empty();
    JsonFileStore::new(&path).save(&state)?;
    info!(path = %path.display(), "affect state fully reset");
    Ok((path, state))
}

/// Background writer. Snapshots are handed over through an unbounded channel
/// so the mutation path never waits on disk.
pub(crate) struct PersistenceWorker {
    tx: Mutex<Option<UnboundedSender<PersistedState>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PersistenceWorker {
    pub(crate) fn spawn(store: Arc<dyn StateStore>, runtime: &Handle) -> Self {
        let (tx, rx) = unbounded_channel();
        let handle = runtime.spawn(run_writer(store, rx));
        Self {
            tx: Mutex::new(Some(tx)),
            handle: Mutex::new(Some(handle)),
        }
    }

    pub(crate) fn submit(&self, state: PersistedState) {
        match &*self.tx.lock() {
            Some(tx) => {
                if tx.send(state).is_err() {
                    metrics::counter!("affect_persist_failures_total", "op" => "queue")
                        .increment(1);
                    warn!("persistence writer is gone, snapshot dropped");
                }
            }
            None => debug!("persistence closed, snapshot dropped"),
        }
    }

    /// Stops accepting snapshots and waits until the last one is written.
    pub(crate) async fn close(&self) {
        drop(self.tx.lock().take());
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                warn!(%err, "persistence writer terminated abnormally");
            }
        }
    }
}

async fn run_writer(store: Arc<dyn StateStore>, mut rx: UnboundedReceiver<PersistedState>) {
    while let Some(mut state) = rx.recv().await {
        // only the newest snapshot matters
        while let Ok(next) = rx.try_recv() {
            state = next;
        }
        let store = Arc::clone(&store);
        let progress = state.current_progress;
        match spawn_blocking(move || store.save(&state)).await {
            Ok(Ok(())) => {
                metrics::counter!("affect_persist_total").increment(1);
                debug!(progress, "affect state saved");
            }
            Ok(Err(err)) => {
                metrics::counter!("affect_persist_failures_total", "op" => "save").increment(1);
                warn!(%err, progress, "failed to save affect state");
            }
            Err(err) => {
                metrics::counter!("affect_persist_failures_total", "op" => "save").increment(1);
                warn!(%err, "state save task panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_roundtrip_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("state.json"));
        assert!(store.load().unwrap().is_none());
        let state = PersistedState {
            current_progress: -12,
            last_updated: Some(Utc::now()),
            history: Vec::new(),
        };
        store.save(&state).unwrap();
        assert_eq!(store.load().unwrap(), Some(state));
    }

    #[test]
    fn partial_file_uses_field_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, r#"{"currentProgress": 55, "history": []}"#).unwrap();
        let loaded = JsonFileStore::new(&path).load().unwrap().unwrap();
        assert_eq!(loaded.current_progress, 55);
        assert!(loaded.last_updated.is_none());
    }

    #[test]
    fn garbage_file_falls_back_to_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{ not json").unwrap();
        let store = JsonFileStore::new(&path);
        assert!(store.load().unwrap_err().is_persistence());
        assert_eq!(load_or_default(&store), PersistedState::default());
    }
}
