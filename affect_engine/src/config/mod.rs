/* affect:meta
id: AFF-20261002-env-config
intent: code
summary: |-
  Engine configuration: decay tiers and interval, history limits, observer
  buffer, state file and bind address. Read from environment or a JSON file.
*/
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::error::AffectError;

/// Reads a boolean flag from the environment.
/// Returns `default` when the variable is not set.
pub fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                warn!(key, value = %raw, "ignoring unparsable configuration value");
                default
            }
        },
        Err(_) => default,
    }
}

/// Top-level configuration of the affect service.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AffectConfig {
    pub bind_addr: String,
    pub state_file: PathBuf,
    /// Enables the Prometheus recorder and the /metrics endpoint.
    pub metrics_enabled: bool,
    pub decay: DecayConfig,
    pub history: HistoryConfig,
    /// Messages buffered per observer before it is considered stalled.
    pub observer_buffer: usize,
    /// Sources registered at startup, `platform:channel`.
    pub sources: Vec<String>,
}

impl Default for AffectConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".into(),
            state_file: PathBuf::from("progress-data.json"),
            metrics_enabled: true,
            decay: DecayConfig::default(),
            history: HistoryConfig::default(),
            observer_buffer: 64,
            sources: Vec::new(),
        }
    }
}

/// One decay step: values at or beyond `threshold` move `magnitude` toward zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct DecayTier {
    pub threshold: i32,
    pub magnitude: i32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DecayConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    /// Kept sorted by threshold, highest first.
    pub tiers: Vec<DecayTier>,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 180,
            tiers: default_tiers(),
        }
    }
}

fn default_tiers() -> Vec<DecayTier> {
    vec![
        DecayTier {
            threshold: 50,
            magnitude: 3,
        },
        DecayTier {
            threshold: 20,
            magnitude: 2,
        },
        DecayTier {
            threshold: 0,
            magnitude: 1,
        },
    ]
}

impl DecayConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    /// Parses `"50:3,20:2,0:1"` into tiers ordered by descending threshold.
    pub fn parse_tiers(raw: &str) -> Result<Vec<DecayTier>, AffectError> {
        let mut tiers = Vec::new();
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (threshold, magnitude) = part
                .split_once(':')
                .ok_or_else(|| AffectError::Config(format!("decay tier `{part}`")))?;
            let threshold: i32 = threshold
                .trim()
                .parse()
                .map_err(|_| AffectError::Config(format!("decay threshold `{threshold}`")))?;
            let magnitude: i32 = magnitude
                .trim()
                .parse()
                .map_err(|_| AffectError::Config(format!("decay magnitude `{magnitude}`")))?;
            if magnitude < 1 || threshold < 0 {
                return Err(AffectError::Config(format!(
                    "decay tier `{part}` needs threshold >= 0 and magnitude >= 1"
                )));
            }
            tiers.push(DecayTier {
                threshold,
                magnitude,
            });
        }
        if tiers.is_empty() {
            return Err(AffectError::Config("no decay tiers given".into()));
        }
        tiers.sort_by(|a, b| b.threshold.cmp(&a.threshold));
        Ok(tiers)
    }

    /// Decay step for `value`, never larger than the distance to zero.
    pub fn magnitude_for(&self, value: i32) -> i32 {
        let distance = value.abs();
        if distance == 0 {
            return 0;
        }
        let magnitude = self
            .tiers
            .iter()
            .find(|tier| distance >= tier.threshold)
            .or_else(|| self.tiers.last())
            .map(|tier| tier.magnitude.max(1))
            .unwrap_or(1);
        magnitude.min(distance)
    }

    fn normalize(&mut self) {
        self.tiers.retain(|t| t.magnitude >= 1 && t.threshold >= 0);
        if self.tiers.is_empty() {
            warn!("decay tiers empty after validation, using defaults");
            self.tiers = default_tiers();
        }
        self.tiers.sort_by(|a, b| b.threshold.cmp(&a.threshold));
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Hard ceiling; exceeding it triggers a batch trim.
    pub ceiling: usize,
    /// Entries kept after a trim.
    pub retain: usize,
    /// Entries written to the state file.
    pub persisted: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            ceiling: 100,
            retain: 50,
            persisted: 20,
        }
    }
}

impl HistoryConfig {
    fn normalize(&mut self) {
        self.ceiling = self.ceiling.max(1);
        self.retain = self.retain.clamp(1, self.ceiling);
        self.persisted = self.persisted.min(self.ceiling);
    }
}

impl AffectConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(addr) = std::env::var("AFFECT_BIND_ADDR") {
            cfg.bind_addr = addr;
        }
        if let Ok(path) = std::env::var("AFFECT_STATE_FILE") {
            cfg.state_file = PathBuf::from(path);
        }
        cfg.apply_env_overrides();
        cfg
    }

    /// Load from a JSON file, then let environment variables override it.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AffectError> {
        let raw = std::fs::read_to_string(path)?;
        let mut cfg: Self = serde_json::from_str(&raw)?;
        if let Ok(addr) = std::env::var("AFFECT_BIND_ADDR") {
            cfg.bind_addr = addr;
        }
        if let Ok(path) = std::env::var("AFFECT_STATE_FILE") {
            cfg.state_file = PathBuf::from(path);
        }
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        self.metrics_enabled = env_flag("AFFECT_METRICS_ENABLED", self.metrics_enabled);
        self.decay.enabled = env_flag("AFFECT_DECAY_ENABLED", self.decay.enabled);
        self.decay.interval_secs = env_parse("AFFECT_DECAY_INTERVAL_SECS", self.decay.interval_secs);
        if let Ok(raw) = std::env::var("AFFECT_DECAY_TIERS") {
            match DecayConfig::parse_tiers(&raw) {
                Ok(tiers) => self.decay.tiers = tiers,
                Err(err) => warn!(%err, "keeping previous decay tiers"),
            }
        }
        self.history.ceiling = env_parse("AFFECT_HISTORY_MAX", self.history.ceiling);
        self.history.retain = env_parse("AFFECT_HISTORY_KEEP", self.history.retain);
        self.history.persisted = env_parse("AFFECT_HISTORY_PERSIST", self.history.persisted);
        self.observer_buffer = env_parse("AFFECT_OBSERVER_BUFFER", self.observer_buffer);
        if let Ok(raw) = std::env::var("AFFECT_SOURCES") {
            self.sources = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        self.normalize();
    }

    /// Clamp limits into a usable shape. Called by the engine as well.
    pub fn normalize(&mut self) {
        self.decay.normalize();
        self.history.normalize();
        self.observer_buffer = self.observer_buffer.max(1);
    }
}
