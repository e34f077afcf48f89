//! Insight aggregation service: binary entrypoint.
//! Boots the engine over the configured adapters, then serves the read API
//! with Axum until Ctrl-C.

use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use insight_aggregator::config::Settings;
use insight_aggregator::ingest::providers::{simulated_suite, SimulationParams};
use insight_aggregator::metrics::Metrics;
use insight_aggregator::notify::WebhookNotifier;
use insight_aggregator::storage::JsonFileStorage;
use insight_aggregator::{api, InsightEngine};

/// Compact logs by default, JSON lines when `LOG_FORMAT=json`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("insight_aggregator=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "ctrl-c handler failed; shutting down");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let settings = Settings::load_default().context("load settings")?;

    // Installed before the engine exists so series descriptions reach the recorder.
    let metrics = if settings.server.enable_metrics {
        Metrics::init()
            .map_err(|e| tracing::warn!(error = %format!("{e:#}"), "metrics disabled"))
            .ok()
    } else {
        None
    };

    let mut builder = InsightEngine::builder(settings.engine.clone());
    if settings.simulation.enabled {
        builder = builder.adapters(simulated_suite(&SimulationParams::from(&settings.simulation)));
    } else {
        tracing::warn!("simulation disabled and no other adapters registered");
    }
    if let Some(path) = &settings.storage.snapshot_path {
        builder = builder.storage(Arc::new(JsonFileStorage::new(path)));
    }
    let engine = builder.build().context("build engine")?;

    if let Some(notifier) = WebhookNotifier::from_config(&settings.notify) {
        engine.subscribe(Arc::new(notifier));
    }

    match engine.restore().await {
        Ok(0) => {}
        Ok(n) => tracing::info!(samples = n, "state restored"),
        Err(e) => tracing::warn!(error = %e, "restore failed; starting empty"),
    }
    engine.start();

    let mut app = api::router(engine.clone());
    if let Some(m) = &metrics {
        app = app.merge(m.router());
    }

    let listener = tokio::net::TcpListener::bind(&settings.server.bind_addr)
        .await
        .with_context(|| format!("bind {}", settings.server.bind_addr))?;
    tracing::info!(addr = %settings.server.bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")?;

    engine.dispose().await;
    Ok(())
}
