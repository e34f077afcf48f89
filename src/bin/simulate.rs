//! Offline demo: runs a few forced cycles over the seeded simulated adapters
//! and prints the resulting trends and insights. No HTTP server.
//!
//! `cargo run --bin simulate -- 5` runs five cycles (default 3).

use insight_aggregator::config::SimulationConfig;
use insight_aggregator::ingest::providers::{simulated_suite, SimulationParams};
use insight_aggregator::{EngineConfig, InsightEngine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let cycles: usize = std::env::args()
        .nth(1)
        .and_then(|a| a.parse().ok())
        .unwrap_or(3);

    let sim = SimulationConfig {
        seed: Some(2024),
        ..SimulationConfig::default()
    };
    let engine = InsightEngine::builder(EngineConfig::default())
        .adapters(simulated_suite(&SimulationParams::from(&sim)))
        .build()?;

    for _ in 0..cycles {
        engine.force_refresh().await;
    }

    let q = engine.query();
    println!("== trends ==");
    for t in q.trends(None) {
        println!(
            "{:<10} sentiment {:+.3}  volume {:>9}  change {:+.1}%  sources {}",
            t.topic,
            t.sentiment,
            t.volume,
            t.change_24h,
            t.sources.len()
        );
    }
    println!("== insights ==");
    for i in q.latest_insights().iter() {
        println!("[{:>3}] {}", i.confidence, i.text);
    }
    println!("== keywords ==");
    for k in q.top_keywords(8) {
        println!("{:<14} {}", k.keyword, k.count);
    }

    engine.dispose().await;
    Ok(())
}
