use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use reqwest::Client;
use std::time::Duration;

use super::cooldown::Cooldown;
use super::UpdateSummary;
use crate::bus::{EngineUpdate, Subscriber};
use crate::config::NotifyConfig;

/// POSTs an `UpdateSummary` to a webhook URL after each published generation,
/// at most once per cooldown window.
pub struct WebhookNotifier {
    url: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
    top_insights: usize,
    gate: Mutex<Cooldown>,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
            top_insights: 3,
            gate: Mutex::new(Cooldown::new(300)),
        }
    }

    /// `None` when no webhook URL is configured.
    pub fn from_config(cfg: &NotifyConfig) -> Option<Self> {
        let url = cfg.webhook_url.as_deref().map(str::trim).filter(|u| !u.is_empty())?;
        Some(
            Self::new(url)
                .with_timeout(cfg.timeout_secs)
                .with_retries(cfg.max_retries)
                .with_cooldown(cfg.cooldown_secs)
                .with_top_insights(cfg.top_insights),
        )
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    /// Total attempts per post; 0 behaves like 1.
    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_cooldown(mut self, secs: i64) -> Self {
        self.gate = Mutex::new(Cooldown::new(secs));
        self
    }

    pub fn with_top_insights(mut self, n: usize) -> Self {
        self.top_insights = n;
        self
    }

    /// Send one summary, retrying with exponential backoff (500ms, 1s, 2s, ...).
    pub async fn post(&self, summary: &UpdateSummary) -> Result<()> {
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.url)
                .timeout(self.timeout)
                .json(summary)
                .send()
                .await;

            let err = match res {
                Ok(rsp) => match rsp.error_for_status_ref() {
                    Ok(_) => return Ok(()),
                    Err(e) => anyhow!("webhook HTTP error: {e}"),
                },
                Err(e) => anyhow!("webhook request failed: {e}"),
            };
            if attempt >= self.max_retries {
                return Err(err);
            }
            tracing::debug!(target: "notify", attempt, error = %err, "webhook attempt failed; retrying");
            tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1).min(6))).await;
        }
    }
}

#[async_trait]
impl Subscriber for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn on_update(&self, update: &EngineUpdate) -> Result<()> {
        let now = Utc::now();
        if !self.gate.lock().allows(now) {
            tracing::debug!(target: "notify", generation = update.generation, "webhook suppressed by cooldown");
            return Ok(());
        }
        let summary = UpdateSummary::from_update(update, self.top_insights);
        self.post(&summary).await?;
        self.gate.lock().record(now);
        tracing::info!(
            target: "notify",
            generation = update.generation,
            insights = summary.top_insights.len(),
            "webhook sent"
        );
        Ok(())
    }
}
