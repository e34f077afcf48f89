use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::engine::{CycleOutcome, InsightEngine};
use crate::model::{EngineStatus, Insight, Trend};
use crate::query::{KeywordCount, SourceActivity};

const DEFAULT_COUNT: usize = 10;
const MAX_COUNT: usize = 500;

/// Read API plus lifecycle commands over one engine handle.
pub fn router(engine: InsightEngine) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/status", get(status))
        .route("/insights", get(insights))
        .route("/trends", get(trends))
        .route("/keywords", get(keywords))
        .route("/sources", get(sources))
        .route("/refresh", post(refresh))
        .route("/start", post(start))
        .route("/stop", post(stop))
        .layer(CorsLayer::very_permissive())
        .with_state(engine)
}

#[derive(Debug, Default, Deserialize)]
struct InsightsParams {
    topic: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct TopicParams {
    topic: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CountParams {
    count: Option<usize>,
}

impl CountParams {
    fn resolved(&self) -> usize {
        self.count.unwrap_or(DEFAULT_COUNT).min(MAX_COUNT)
    }
}

/// Empty `?topic=` means no filter.
fn topic_filter(topic: &Option<String>) -> Option<&str> {
    topic.as_deref().map(str::trim).filter(|t| !t.is_empty())
}

async fn status(State(engine): State<InsightEngine>) -> Json<EngineStatus> {
    Json(engine.query().status())
}

async fn insights(
    State(engine): State<InsightEngine>,
    Query(p): Query<InsightsParams>,
) -> Json<Vec<Insight>> {
    let limit = p.limit.map(|l| l.min(MAX_COUNT));
    Json(engine.query().insights(topic_filter(&p.topic), limit))
}

async fn trends(State(engine): State<InsightEngine>, Query(p): Query<TopicParams>) -> Json<Vec<Trend>> {
    Json(engine.query().trends(topic_filter(&p.topic)))
}

async fn keywords(
    State(engine): State<InsightEngine>,
    Query(p): Query<CountParams>,
) -> Json<Vec<KeywordCount>> {
    Json(engine.query().top_keywords(p.resolved()))
}

async fn sources(
    State(engine): State<InsightEngine>,
    Query(p): Query<CountParams>,
) -> Json<Vec<SourceActivity>> {
    Json(engine.query().top_sources(p.resolved()))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResp {
    skipped: bool,
    published: bool,
    generation: u64,
    admitted: usize,
    failed: usize,
}

async fn refresh(State(engine): State<InsightEngine>) -> Json<RefreshResp> {
    let resp = match engine.force_refresh().await {
        CycleOutcome::Skipped => RefreshResp {
            skipped: true,
            published: false,
            generation: engine.query().status().generation,
            admitted: 0,
            failed: 0,
        },
        CycleOutcome::Completed(r) => RefreshResp {
            skipped: false,
            published: r.published,
            generation: r.generation,
            admitted: r.admitted,
            failed: r.failed,
        },
    };
    Json(resp)
}

async fn start(State(engine): State<InsightEngine>) -> Json<EngineStatus> {
    engine.start();
    Json(engine.query().status())
}

async fn stop(State(engine): State<InsightEngine>) -> Json<EngineStatus> {
    engine.stop().await;
    Json(engine.query().status())
}
