use std::sync::Arc;

use axum::routing::get;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use affect_engine::config::AffectConfig;
use affect_engine::http::{self, AppState};
use affect_engine::persistence::JsonFileStore;
use affect_engine::sources::{SourceAggregator, SourceId};
use affect_engine::state::AffectEngine;

fn load_config() -> AffectConfig {
    match std::env::var("AFFECT_CONFIG_FILE") {
        Ok(path) => match AffectConfig::from_file(&path) {
            Ok(cfg) => cfg,
            Err(err) => {
                warn!(%err, path = %path, "config file unusable, using environment");
                AffectConfig::from_env()
            }
        },
        Err(_) => AffectConfig::from_env(),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = load_config();
    // installed first so startup gauges (loaded value, sources) are kept
    let prometheus = if config.metrics_enabled {
        match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => Some(handle),
            Err(err) => {
                warn!("metrics recorder unavailable: {err}");
                None
            }
        }
    } else {
        None
    };

    let store = Arc::new(JsonFileStore::new(&config.state_file));
    let engine = match AffectEngine::new(config.clone(), store) {
        Ok(engine) => engine,
        Err(err) => {
            error!("failed to start affect engine: {err}");
            return;
        }
    };

    let sources = Arc::new(SourceAggregator::new(engine.clone()));
    for raw in &config.sources {
        match raw.parse::<SourceId>() {
            Ok(id) => {
                sources.register(id);
            }
            Err(err) => warn!(%err, "skipping configured source"),
        }
    }

    let mut app = http::router(AppState::new(engine.clone(), sources));
    if let Some(handle) = prometheus {
        app = app.route("/metrics", get(move || async move { handle.render() }));
    }

    let listener = match TcpListener::bind(&config.bind_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(addr = %config.bind_addr, "failed to bind: {err}");
            engine.shutdown().await;
            return;
        }
    };
    match listener.local_addr() {
        Ok(addr) => info!("Listening on http://{addr} (observers at ws://{addr}/ws)"),
        Err(err) => warn!("local address unknown: {err}"),
    }

    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("server error: {err}");
    }
    engine.shutdown().await;
}
