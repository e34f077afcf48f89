use anyhow::Context;
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static DESCRIBED: OnceCell<()> = OnceCell::new();

/// Register help text for every engine series. Safe to call repeatedly; only
/// the first call does anything.
pub fn ensure_described() {
    DESCRIBED.get_or_init(|| {
        describe_counter!("engine_cycles_total", "Completed collection cycles.");
        describe_counter!(
            "engine_cycles_skipped_total",
            "Ticks or forced refreshes skipped because a cycle was in flight."
        );
        describe_histogram!("engine_cycle_ms", "Wall time of one full cycle in milliseconds.");
        describe_histogram!("engine_fetch_ms", "Adapter fetch time in milliseconds.");
        describe_counter!(
            "engine_source_failures_total",
            "Adapter failures by source and kind (unavailable|timeout)."
        );
        describe_counter!("engine_samples_admitted_total", "Samples admitted into the store.");
        describe_counter!(
            "engine_samples_evicted_total",
            "Samples evicted by the per-topic cap or the retention window."
        );
        describe_counter!(
            "engine_subscriber_errors_total",
            "Subscriber handlers that failed or panicked."
        );
        describe_counter!(
            "engine_subscriber_lagged_total",
            "Updates a lagging subscriber skipped because the bus buffer was full."
        );
        describe_gauge!(
            "engine_last_update_ts",
            "Unix timestamp (seconds) of the last published snapshot."
        );
        describe_gauge!("engine_store_samples", "Samples currently retained.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder. Fails if one is already installed.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        ensure_described();
        Ok(Self { handle })
    }

    /// Router exposing `/metrics` in the Prometheus text format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
