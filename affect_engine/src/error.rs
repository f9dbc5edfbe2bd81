/* affect:meta
id: AFF-20261002-affect-error
intent: code
summary: |-
  Unified engine error: persistence I/O and JSON failures, unknown control
  verbs, source registry misses and configuration problems.
*/

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AffectError {
    #[error("persistence I/O failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("persisted state is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown operation `{action}`, expected one of: {}", valid.join(", "))]
    InvalidOperation {
        action: String,
        valid: &'static [&'static str],
    },
    #[error("missing numeric argument `{0}`")]
    MissingArgument(&'static str),
    #[error("source `{0}` is not registered")]
    UnknownSource(String),
    #[error("invalid source id `{0}`, expected platform:channel")]
    InvalidSourceId(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("tokio runtime is not available")]
    RuntimeUnavailable,
}

impl AffectError {
    /// True for failures that come from the state file rather than the caller.
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Json(_))
    }
}
