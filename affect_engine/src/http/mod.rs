/* affect:meta
id: AFF-20261011-http-router
intent: code
summary: |-
  Thin axum transport over the engine: progress control, history,
  statistics, source ingestion and the live WebSocket feed.
*/
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::json;

use crate::control::ControlSurface;
use crate::error::AffectError;
use crate::sources::SourceAggregator;
use crate::state::AffectEngine;

pub mod routes;
pub mod ws;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AffectEngine>,
    pub sources: Arc<SourceAggregator>,
    pub control: ControlSurface,
}

impl AppState {
    pub fn new(engine: Arc<AffectEngine>, sources: Arc<SourceAggregator>) -> Self {
        Self {
            control: ControlSurface::new(engine.clone()),
            engine,
            sources,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "ok" }))
        .route(
            "/api/progress",
            get(routes::get_progress).post(routes::control_progress),
        )
        .route("/api/history", get(routes::get_history))
        .route("/api/statistics", get(routes::get_statistics))
        .route(
            "/api/sources",
            get(routes::list_sources).post(routes::register_source),
        )
        .route("/api/sources/:id", delete(routes::unregister_source))
        .route("/api/sources/:id/activity", post(routes::record_activity))
        .route("/api/sources/:id/submit", post(routes::submit_delta))
        .route("/api/sources/:id/sentiment", post(routes::submit_sentiment))
        .route("/ws", get(ws::observe))
        .with_state(state)
}

impl IntoResponse for AffectError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AffectError::InvalidOperation { valid, .. } => (
                StatusCode::BAD_REQUEST,
                json!({ "error": self.to_string(), "validActions": valid }),
            ),
            AffectError::MissingArgument(_) | AffectError::InvalidSourceId(_) => {
                (StatusCode::BAD_REQUEST, json!({ "error": self.to_string() }))
            }
            AffectError::UnknownSource(_) => {
                (StatusCode::NOT_FOUND, json!({ "error": self.to_string() }))
            }
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": self.to_string() }),
            ),
        };
        (status, Json(body)).into_response()
    }
}
