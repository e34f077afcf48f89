//! # Insight Generator
//! Turns the current trend set plus the samples behind it into short,
//! attributed, confidence-scored statements.
//!
//! Confidence (0..=100):
//! `50 + min(30, 5 × distinct_sources) + min(20, 20 × (1 − sentiment_variance))`
//!
//! Generation is a pure function of `(trends, store snapshot, limit, now)`;
//! only the insight ids are fresh on every call.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use crate::model::{clamp_confidence, clamp_sentiment, Insight, InsightKind, Sample, Trend};
use crate::store::SampleStore;
use crate::text::{cashtag_symbol, is_keyword};

const KEYWORDS_PER_INSIGHT: usize = 3;

#[derive(Debug, Clone)]
pub struct InsightGenerator {
    /// |change24h| (percent) at which a momentum insight is emitted.
    pub momentum_threshold: f64,
    /// Minimum spread between two sources' mean sentiments (with opposite signs)
    /// for a divergence insight.
    pub divergence_gap: f64,
}

impl Default for InsightGenerator {
    fn default() -> Self {
        Self {
            momentum_threshold: 25.0,
            divergence_gap: 0.5,
        }
    }
}

/// Candidate plus the keys it is ranked by.
struct Ranked {
    insight: Insight,
    trend_rank: usize,
}

impl InsightGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ranked insights for `trends`, truncated to `limit`.
    pub fn generate(
        &self,
        trends: &[Trend],
        store: &SampleStore,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Vec<Insight> {
        let mut out: Vec<Ranked> = Vec::new();

        for (trend_rank, trend) in trends.iter().enumerate() {
            // Never talk about topics the snapshot cannot back up.
            if !store.contains_topic(&trend.topic) {
                continue;
            }
            let samples = store.chronological(&trend.topic);
            if samples.is_empty() {
                continue;
            }
            let ctx = TopicContext::new(trend, &samples);

            out.push(Ranked {
                insight: ctx.insight(InsightKind::Sentiment, sentiment_text(&ctx), now),
                trend_rank,
            });

            if trend.change_24h.abs() >= self.momentum_threshold {
                out.push(Ranked {
                    insight: ctx.insight(InsightKind::Momentum, momentum_text(trend), now),
                    trend_rank,
                });
            }

            if let Some(text) = divergence_text(trend, &samples, self.divergence_gap) {
                out.push(Ranked {
                    insight: ctx.insight(InsightKind::Divergence, text, now),
                    trend_rank,
                });
            }
        }

        out.sort_by(|a, b| {
            b.insight
                .confidence
                .cmp(&a.insight.confidence)
                .then_with(|| b.insight.created_at.cmp(&a.insight.created_at))
                .then_with(|| a.trend_rank.cmp(&b.trend_rank))
                .then_with(|| a.insight.kind.cmp(&b.insight.kind))
        });
        out.truncate(limit);
        out.into_iter().map(|r| r.insight).collect()
    }
}

/// `50 + min(30, 5 × sources) + min(20, 20 × (1 − variance))`, clamped to 0..=100.
pub fn confidence_score(distinct_sources: usize, sentiment_variance: f64) -> u8 {
    let variance = if sentiment_variance.is_finite() {
        sentiment_variance.clamp(0.0, 1.0)
    } else {
        1.0
    };
    let corroboration = (5.0 * distinct_sources as f64).min(30.0);
    let agreement = (20.0 * (1.0 - variance)).min(20.0);
    clamp_confidence(50.0 + corroboration + agreement)
}

/// Population variance of sample sentiments.
pub fn sentiment_variance(samples: &[&Sample]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let n = samples.len() as f64;
    let mean = samples.iter().map(|s| s.sentiment).sum::<f64>() / n;
    samples
        .iter()
        .map(|s| (s.sentiment - mean).powi(2))
        .sum::<f64>()
        / n
}

/// Most frequent plain keyword tags, ties broken lexically.
pub fn top_keywords<'a>(samples: impl IntoIterator<Item = &'a Sample>, count: usize) -> Vec<(String, usize)> {
    let mut freq: BTreeMap<&str, usize> = BTreeMap::new();
    for s in samples {
        for t in s.tags.iter().filter(|t| is_keyword(t)) {
            *freq.entry(t.as_str()).or_default() += 1;
        }
    }
    let mut ranked: Vec<(String, usize)> = freq.into_iter().map(|(k, n)| (k.to_string(), n)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(count);
    ranked
}

/// Everything the text builders need about one topic.
struct TopicContext<'a> {
    trend: &'a Trend,
    confidence: u8,
    keywords: Vec<String>,
    assets: BTreeSet<String>,
    attribution: String,
}

impl<'a> TopicContext<'a> {
    fn new(trend: &'a Trend, samples: &[&Sample]) -> Self {
        let confidence = confidence_score(trend.sources.len(), sentiment_variance(samples));
        let keywords = top_keywords(samples.iter().copied(), KEYWORDS_PER_INSIGHT)
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        let assets = samples
            .iter()
            .flat_map(|s| s.tags.iter())
            .filter_map(|t| cashtag_symbol(t))
            .collect();
        let attribution = trend.sources.iter().cloned().collect::<Vec<_>>().join(", ");
        Self {
            trend,
            confidence,
            keywords,
            assets,
            attribution,
        }
    }

    fn insight(&self, kind: InsightKind, text: String, now: DateTime<Utc>) -> Insight {
        Insight {
            id: Uuid::new_v4(),
            created_at: now,
            kind,
            source_attribution: self.attribution.clone(),
            text,
            sentiment: clamp_sentiment(self.trend.sentiment),
            confidence: self.confidence,
            topics: BTreeSet::from([self.trend.topic.clone()]),
            related_assets: self.assets.clone(),
        }
    }
}

fn stance(sentiment: f64) -> &'static str {
    match sentiment {
        s if s >= 0.5 => "Strongly bullish",
        s if s >= 0.15 => "Bullish",
        s if s <= -0.5 => "Strongly bearish",
        s if s <= -0.15 => "Bearish",
        _ => "Neutral",
    }
}

fn sentiment_text(ctx: &TopicContext<'_>) -> String {
    let t = ctx.trend;
    let n = t.sources.len();
    let mut text = format!(
        "{} sentiment on {} ({:+.2}) across {} source{}, volume {}",
        stance(t.sentiment),
        t.topic,
        t.sentiment,
        n,
        if n == 1 { "" } else { "s" },
        t.volume
    );
    if !ctx.keywords.is_empty() {
        let tags: Vec<String> = ctx.keywords.iter().map(|k| format!("#{k}")).collect();
        text.push_str(&format!("; chatter led by {}", tags.join(", ")));
    }
    text
}

fn momentum_text(t: &Trend) -> String {
    let direction = if t.change_24h >= 0.0 {
        "improving"
    } else {
        "deteriorating"
    };
    format!(
        "{} sentiment is {}: {:+.1}% between the oldest and newest third of the window",
        t.topic, direction, t.change_24h
    )
}

fn divergence_text(t: &Trend, samples: &[&Sample], gap: f64) -> Option<String> {
    let mut per_source: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for s in samples {
        let e = per_source.entry(s.source.as_str()).or_default();
        e.0 += s.sentiment;
        e.1 += 1;
    }
    if per_source.len() < 2 {
        return None;
    }
    let means: Vec<(&str, f64)> = per_source
        .into_iter()
        .map(|(src, (sum, n))| (src, sum / n as f64))
        .collect();

    // First max / first min in lexical source order keeps this deterministic.
    let (mut hi_src, mut hi) = means[0];
    let (mut lo_src, mut lo) = means[0];
    for &(src, m) in &means[1..] {
        if m > hi {
            (hi_src, hi) = (src, m);
        }
        if m < lo {
            (lo_src, lo) = (src, m);
        }
    }

    if hi > 0.0 && lo < 0.0 && hi - lo >= gap {
        Some(format!(
            "Sources disagree on {}: {} leans bullish ({:+.2}) while {} leans bearish ({:+.2})",
            t.topic, hi_src, hi, lo_src, lo
        ))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trend::TrendSynthesizer;
    use std::time::Duration;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn store_with(samples: Vec<Sample>) -> SampleStore {
        let mut s = SampleStore::new(Duration::from_secs(86_400), 5_000);
        s.extend(samples);
        s
    }

    /// Strip ids so two generations can be compared by content.
    fn content(v: &[Insight]) -> Vec<(InsightKind, String, u8, DateTime<Utc>)> {
        v.iter()
            .map(|i| (i.kind, i.text.clone(), i.confidence, i.created_at))
            .collect()
    }

    #[test]
    fn confidence_formula_matches_reference() {
        assert_eq!(confidence_score(0, 1.0), 50);
        assert_eq!(confidence_score(3, 0.0), 85);
        assert_eq!(confidence_score(10, 0.0), 100);
        assert_eq!(confidence_score(2, 0.5), 70);
        assert_eq!(confidence_score(1, f64::NAN), 55);
    }

    #[test]
    fn variance_of_identical_values_is_zero() {
        let a = Sample::new("T", "x", at(0), 0.3, 1);
        let b = Sample::new("T", "y", at(1), 0.3, 1);
        assert_eq!(sentiment_variance(&[&a, &b]), 0.0);
    }

    #[test]
    fn sentiment_insight_mentions_topic_sources_and_keywords() {
        let store = store_with(vec![
            Sample::new("Ordinals", "social", at(0), 0.7, 10).with_tags(["inscriptions", "$ORDI"]),
            Sample::new("Ordinals", "activity", at(1), 0.6, 20).with_tags(["inscriptions", "mints"]),
        ]);
        let trends = TrendSynthesizer::default().compute(&store, at(5));
        let out = InsightGenerator::new().generate(&trends, &store, 10, at(5));

        let first = &out[0];
        assert_eq!(first.kind, InsightKind::Sentiment);
        assert!(first.text.starts_with("Strongly bullish sentiment on Ordinals"), "{}", first.text);
        assert!(first.text.contains("#inscriptions"));
        assert_eq!(first.source_attribution, "activity, social");
        assert!(first.related_assets.contains("ORDI"));
        assert!(first.mentions("ordinals"));
    }

    #[test]
    fn momentum_and_divergence_are_emitted_when_warranted() {
        let store = store_with(vec![
            Sample::new("Runes", "bears", at(0), -0.8, 1),
            Sample::new("Runes", "bears", at(1), -0.8, 1),
            Sample::new("Runes", "bulls", at(2), 0.1, 1),
            Sample::new("Runes", "bulls", at(3), 0.1, 1),
            Sample::new("Runes", "bulls", at(4), 0.9, 1),
            Sample::new("Runes", "bulls", at(5), 0.9, 1),
        ]);
        let trends = TrendSynthesizer::default().compute(&store, at(9));
        let out = InsightGenerator::new().generate(&trends, &store, 10, at(9));
        let kinds: Vec<InsightKind> = out.iter().map(|i| i.kind).collect();
        assert_eq!(
            kinds,
            vec![InsightKind::Sentiment, InsightKind::Momentum, InsightKind::Divergence]
        );
        assert!(out[1].text.contains("improving"));
        assert!(out[2].text.contains("bulls leans bullish"));
    }

    #[test]
    fn ranked_by_confidence_and_truncated() {
        let store = store_with(vec![
            // one source → lower confidence
            Sample::new("Lonely", "a", at(0), 0.2, 500),
            // three agreeing sources → higher confidence
            Sample::new("Busy", "a", at(0), 0.2, 1),
            Sample::new("Busy", "b", at(0), 0.2, 1),
            Sample::new("Busy", "c", at(0), 0.2, 1),
        ]);
        let trends = TrendSynthesizer::default().compute(&store, at(1));
        let out = InsightGenerator::new().generate(&trends, &store, 1, at(1));
        assert_eq!(out.len(), 1);
        assert!(out[0].mentions("Busy"));
        assert_eq!(out[0].confidence, 85);
    }

    #[test]
    fn never_references_topics_outside_the_trend_set() {
        let store = store_with(vec![
            Sample::new("Bitcoin", "a", at(0), 0.2, 5),
            Sample::new("Stacks", "a", at(0), -0.2, 5),
        ]);
        let trends: Vec<Trend> = TrendSynthesizer::default()
            .compute(&store, at(1))
            .into_iter()
            .filter(|t| t.topic == "Bitcoin")
            .collect();
        let out = InsightGenerator::new().generate(&trends, &store, 10, at(1));
        assert!(!out.is_empty());
        assert!(out.iter().all(|i| i.topics == BTreeSet::from(["Bitcoin".to_string()])));
    }

    #[test]
    fn generation_is_deterministic_modulo_ids() {
        let store = store_with(vec![
            Sample::new("Bitcoin", "a", at(0), 0.6, 100),
            Sample::new("Bitcoin", "b", at(1), 0.4, 50),
            Sample::new("Ordinals", "a", at(2), -0.3, 70),
        ]);
        let synth = TrendSynthesizer::default();
        let gen = InsightGenerator::new();
        let t1 = synth.compute(&store, at(3));
        let t2 = synth.compute(&store, at(3));
        assert_eq!(t1, t2);
        let a = gen.generate(&t1, &store, 10, at(3));
        let b = gen.generate(&t2, &store, 10, at(3));
        assert_eq!(content(&a), content(&b));
        assert_ne!(a[0].id, b[0].id);
    }

    #[test]
    fn top_keywords_breaks_ties_lexically() {
        let a = Sample::new("T", "x", at(0), 0.0, 1).with_tags(["fees", "mempool", "$btc", "@whale"]);
        let b = Sample::new("T", "x", at(1), 0.0, 1).with_tags(["mempool", "fees", "blocks"]);
        let kw = top_keywords([&a, &b], 2);
        assert_eq!(kw, vec![("fees".to_string(), 2), ("mempool".to_string(), 2)]);
    }
}
