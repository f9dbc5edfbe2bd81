/* affect:meta
id: AFF-20261001-affect-engine-lib
intent: code
summary: |-
  Affect engine: one bounded affect value fed by many chat sources, relaxed
  toward zero while idle, classified into emotion bands and streamed to
  observers.
*/
pub mod broadcast;
pub mod config;
pub mod control;
pub mod decay;
pub mod emotion;
pub mod error;
pub mod http;
pub mod persistence;
pub mod sentiment;
pub mod sources;
pub mod state;
pub mod statistics;

pub use broadcast::{BroadcastHub, BroadcastMessage, Observer, ObserverId};
pub use config::AffectConfig;
pub use control::{ControlOutcome, ControlSurface};
pub use decay::DecayState;
pub use emotion::{classify, EmotionBand, EmotionReading};
pub use error::AffectError;
pub use persistence::{JsonFileStore, MemoryStore, PersistedState, StateStore};
pub use sentiment::{SentimentCategory, SentimentReading};
pub use sources::{SourceAggregator, SourceId, SourceStats};
pub use state::{AffectEngine, BroadcastContext, ChangeRecord, Metadata, MutationOutcome, Trigger};
