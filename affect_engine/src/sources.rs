/* affect:meta
id: AFF-20261009-source-aggregator
intent: code
summary: |-
  Registry of chat sources (platform:channel). Every registered source moves
  the one shared value with equal weight; per-source counters are
  statistics only.
*/
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use crate::error::AffectError;
use crate::sentiment::SentimentReading;
use crate::state::{AffectEngine, BroadcastContext, Metadata, MutationOutcome, Trigger};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId {
    platform: String,
    channel: String,
}

impl SourceId {
    pub fn new(platform: impl AsRef<str>, channel: impl Into<String>) -> Self {
        Self {
            platform: platform.as_ref().to_lowercase(),
            channel: channel.into(),
        }
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.platform, self.channel)
    }
}

impl FromStr for SourceId {
    type Err = AffectError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().split_once(':') {
            Some((platform, channel)) if !platform.is_empty() && !channel.is_empty() => {
                Ok(Self::new(platform, channel))
            }
            _ => Err(AffectError::InvalidSourceId(raw.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceStats {
    pub platform: String,
    pub channel: String,
    pub message_count: u64,
    pub last_activity: DateTime<Utc>,
    pub registered_at: DateTime<Utc>,
}

type SourceTable = RwLock<HashMap<SourceId, SourceStats>>;

/// Per-source activity attached to every broadcast as `platformStats`.
struct PlatformStats(Arc<SourceTable>);

impl BroadcastContext for PlatformStats {
    fn broadcast_metadata(&self) -> Metadata {
        let stats: serde_json::Map<String, serde_json::Value> = self
            .0
            .read()
            .iter()
            .map(|(id, stats)| {
                let entry = json!({
                    "platform": stats.platform,
                    "channel": stats.channel,
                    "messageCount": stats.message_count,
                    "lastUpdate": stats.last_activity,
                });
                (id.to_string(), entry)
            })
            .collect();
        let mut metadata = Metadata::new();
        metadata.insert("platformStats".into(), serde_json::Value::Object(stats));
        metadata
    }
}

pub struct SourceAggregator {
    engine: Arc<AffectEngine>,
    sources: Arc<SourceTable>,
}

impl SourceAggregator {
    /// Also makes the engine report per-source activity to observers.
    pub fn new(engine: Arc<AffectEngine>) -> Self {
        let sources: Arc<SourceTable> = Arc::new(RwLock::new(HashMap::new()));
        engine.attach_context(Arc::new(PlatformStats(Arc::clone(&sources))));
        Self { engine, sources }
    }

    pub fn engine(&self) -> &Arc<AffectEngine> {
        &self.engine
    }

    /// Returns `false` if the source was already registered.
    pub fn register(&self, id: SourceId) -> bool {
        let now = Utc::now();
        let (inserted, count) = {
            let mut sources = self.sources.write();
            if sources.contains_key(&id) {
                (false, sources.len())
            } else {
                sources.insert(
                    id.clone(),
                    SourceStats {
                        platform: id.platform.clone(),
                        channel: id.channel.clone(),
                        message_count: 0,
                        last_activity: now,
                        registered_at: now,
                    },
                );
                (true, sources.len())
            }
        };
        if inserted {
            metrics::gauge!("affect_sources").set(count as f64);
            info!(source = %id, "source registered");
        } else {
            debug!(source = %id, "source already registered");
        }
        inserted
    }

    /// History entries that mention the source are left untouched.
    pub fn unregister(&self, id: &SourceId) -> Option<SourceStats> {
        let (removed, count) = {
            let mut sources = self.sources.write();
            let removed = sources.remove(id);
            (removed, sources.len())
        };
        if removed.is_some() {
            metrics::gauge!("affect_sources").set(count as f64);
            info!(source = %id, "source unregistered");
        }
        removed
    }

    pub fn is_registered(&self, id: &SourceId) -> bool {
        self.sources.read().contains_key(id)
    }

    /// Counts one accepted message. Returns the new message count.
    pub fn record_activity(&self, id: &SourceId) -> Result<u64, AffectError> {
        let mut sources = self.sources.write();
        let stats = sources
            .get_mut(id)
            .ok_or_else(|| AffectError::UnknownSource(id.to_string()))?;
        stats.message_count += 1;
        stats.last_activity = Utc::now();
        metrics::counter!("affect_source_messages_total", "platform" => id.platform.clone())
            .increment(1);
        Ok(stats.message_count)
    }

    /// Forwards a raw delta to the shared value, tagged with the source.
    pub fn submit(
        &self,
        id: &SourceId,
        raw_delta: i64,
        metadata: Metadata,
    ) -> Result<MutationOutcome, AffectError> {
        if !self.is_registered(id) {
            return Err(AffectError::UnknownSource(id.to_string()));
        }
        let mut metadata = metadata;
        metadata.insert("sourceId".into(), json!(id.to_string()));
        metadata.insert("platform".into(), json!(id.platform));
        metadata.insert("channel".into(), json!(id.channel));
        Ok(self.engine.mutate(raw_delta, metadata, Trigger::Sentiment))
    }

    pub fn submit_sentiment(
        &self,
        id: &SourceId,
        reading: &SentimentReading,
    ) -> Result<MutationOutcome, AffectError> {
        self.submit(id, reading.adjustment(), reading.metadata())
    }

    pub fn get(&self, id: &SourceId) -> Option<SourceStats> {
        self.sources.read().get(id).cloned()
    }

    /// All sources keyed by `platform:channel`.
    pub fn sources(&self) -> BTreeMap<String, SourceStats> {
        self.sources
            .read()
            .iter()
            .map(|(id, stats)| (id.to_string(), stats.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sources.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
