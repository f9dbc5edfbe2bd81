use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use super::AppState;
use crate::error::AffectError;
use crate::sentiment::SentimentReading;
use crate::sources::SourceId;
use crate::state::{AffectSnapshot, ChangeRecord, Metadata, MutationOutcome};
use crate::statistics::AffectStatistics;

pub async fn get_progress(State(state): State<AppState>) -> Json<AffectSnapshot> {
    Json(state.engine.snapshot())
}

pub async fn control_progress(
    State(state): State<AppState>,
    Json(req): Json<Value>,
) -> Result<Json<Value>, AffectError> {
    let outcome = state.control.execute(&req)?;
    Ok(Json(json!({
        "success": true,
        "oldValue": outcome.old_value,
        "newValue": outcome.new_value,
        "appliedDelta": outcome.applied_delta,
        "timestamp": Utc::now(),
    })))
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    limit: Option<usize>,
}

pub async fn get_history(
    State(state): State<AppState>,
    Query(q): Query<HistoryQuery>,
) -> Json<Vec<ChangeRecord>> {
    Json(state.engine.history(q.limit.unwrap_or(10)))
}

pub async fn get_statistics(State(state): State<AppState>) -> Json<AffectStatistics> {
    Json(state.engine.statistics())
}

pub async fn list_sources(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.sources.sources()))
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    id: String,
}

pub async fn register_source(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Value>), AffectError> {
    let id: SourceId = req.id.parse()?;
    let created = state.sources.register(id.clone());
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(json!({ "id": id.to_string(), "created": created }))))
}

pub async fn unregister_source(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AffectError> {
    let id: SourceId = id.parse()?;
    state
        .sources
        .unregister(&id)
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or_else(|| AffectError::UnknownSource(id.to_string()))
}

pub async fn record_activity(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AffectError> {
    let id: SourceId = id.parse()?;
    let count = state.sources.record_activity(&id)?;
    Ok(Json(json!({ "id": id.to_string(), "messageCount": count })))
}

#[derive(Deserialize)]
pub struct SubmitRequest {
    delta: i64,
    #[serde(default)]
    metadata: Metadata,
}

pub async fn submit_delta(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<Value>, AffectError> {
    let id: SourceId = id.parse()?;
    let outcome = state.sources.submit(&id, req.delta, req.metadata)?;
    Ok(Json(outcome_json(&outcome)))
}

pub async fn submit_sentiment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(reading): Json<SentimentReading>,
) -> Result<Json<Value>, AffectError> {
    let id: SourceId = id.parse()?;
    let outcome = state.sources.submit_sentiment(&id, &reading)?;
    Ok(Json(outcome_json(&outcome)))
}

fn outcome_json(outcome: &MutationOutcome) -> Value {
    json!({
        "oldValue": outcome.old_value,
        "newValue": outcome.new_value,
        "appliedDelta": outcome.applied_delta,
        "recorded": outcome.record.is_some(),
    })
}
