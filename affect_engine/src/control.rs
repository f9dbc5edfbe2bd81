/* affect:meta
id: AFF-20261010-control-surface
intent: code
summary: |-
  Manual adjust / set / reset. Only the verb is validated here; numbers are
  clamped by the engine.
*/
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

use crate::error::AffectError;
use crate::state::{AffectEngine, Metadata, MutationOutcome, Trigger};

pub const VALID_ACTIONS: &[&str] = &["adjust", "set", "reset"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlOutcome {
    pub old_value: i32,
    pub new_value: i32,
    pub applied_delta: i32,
}

impl From<MutationOutcome> for ControlOutcome {
    fn from(outcome: MutationOutcome) -> Self {
        Self {
            old_value: outcome.old_value,
            new_value: outcome.new_value,
            applied_delta: outcome.applied_delta,
        }
    }
}

#[derive(Clone)]
pub struct ControlSurface {
    engine: Arc<AffectEngine>,
}

impl ControlSurface {
    pub fn new(engine: Arc<AffectEngine>) -> Self {
        Self { engine }
    }

    pub fn adjust(&self, amount: f64) -> ControlOutcome {
        let outcome = self
            .engine
            .mutate(to_integer(amount), manual_metadata("adjust"), Trigger::Manual);
        info!(amount, to = outcome.new_value, "manual adjust");
        outcome.into()
    }

    pub fn set(&self, value: f64) -> ControlOutcome {
        let target = to_integer(value);
        let outcome = self
            .engine
            .set_absolute(target, manual_metadata("set"), Trigger::Manual);
        info!(target, to = outcome.new_value, "manual set");
        outcome.into()
    }

    pub fn reset(&self) -> ControlOutcome {
        let outcome = self
            .engine
            .set_absolute(0, manual_metadata("reset"), Trigger::Manual);
        info!(from = outcome.old_value, "manual reset");
        outcome.into()
    }

    /// Dispatches `{"action": ..., "amount" | "value": ...}`.
    pub fn execute(&self, request: &Value) -> Result<ControlOutcome, AffectError> {
        let action = request.get("action").and_then(Value::as_str).unwrap_or("");
        match action {
            "adjust" => Ok(self.adjust(number_arg(request, "amount")?)),
            "set" => Ok(self.set(number_arg(request, "value")?)),
            "reset" => Ok(self.reset()),
            other => Err(AffectError::InvalidOperation {
                action: other.to_string(),
                valid: VALID_ACTIONS,
            }),
        }
    }
}

fn manual_metadata(action: &str) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("action".into(), json!(action));
    metadata.insert("origin".into(), json!("control"));
    metadata
}

fn number_arg(request: &Value, key: &'static str) -> Result<f64, AffectError> {
    request
        .get(key)
        .and_then(Value::as_f64)
        .ok_or(AffectError::MissingArgument(key))
}

/// Nearest integer; out-of-range and non-finite inputs saturate.
fn to_integer(n: f64) -> i64 {
    if n.is_nan() {
        0
    } else {
        n.round() as i64
    }
}
