// src/ingest/providers/social_chatter.rs
use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use std::time::Duration;

use super::{ticker_for, SimCore, SimulationParams};
use crate::error::SourceError;
use crate::ingest::types::{SourceAdapter, TopicQuery};
use crate::model::{Sample, SourceCategory};
use crate::sentiment::SentimentAnalyzer;
use crate::text::{parse_cashtags, parse_hashtags, parse_mentions};

pub const NAME: &str = "social_chatter";

/// `{topic}`, `{tag}` and `{ticker}` are substituted per post.
const TEMPLATES: &[&str] = &[
    "{topic} looking bullish today, breakout incoming #{tag} ${ticker}",
    "Huge rally on ${ticker}, #{tag} holders are pumped",
    "Not bullish on {topic} anymore, volume is weak #{tag}",
    "{topic} dump continues, lots of panic selling ${ticker} #{tag}",
    "Steady accumulation on ${ticker}, long term hodl #{tag} #onchain",
    "Is #{tag} a scam or just a slow week? ${ticker}",
    "New ATH incoming for ${ticker}? #{tag} #moon",
    "{topic} fees are brutal again, rekt by the mempool #{tag} #fees",
    "Quiet day for #{tag}, nothing new on ${ticker}",
    "Devs shipped a great upgrade for {topic} #{tag} #adoption",
];

const HANDLES: &[&str] = &[
    "@satoshi_fan",
    "@ord_collector",
    "@runestone",
    "@stxbuilder",
    "@mempoolwatch",
    "@degen_dan",
];

/// Synthetic social posts. Each post becomes one sample whose sentiment comes
/// from the lexicon scorer and whose tags are the post's hashtags, cash-tags
/// and author handle.
pub struct SocialChatterAdapter {
    core: SimCore<()>,
    analyzer: SentimentAnalyzer,
}

impl SocialChatterAdapter {
    pub fn new(params: &SimulationParams) -> Self {
        Self {
            core: SimCore::new(NAME, SourceCategory::Social, 0x22, params, ()),
            analyzer: SentimentAnalyzer::new(),
        }
    }

    pub fn with_refresh_every(mut self, every: Option<Duration>) -> Self {
        self.core.set_refresh(every);
        self
    }
}

fn render(template: &str, topic: &str, ticker: &str) -> String {
    let tag: String = topic
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    template
        .replace("{topic}", topic)
        .replace("{tag}", &tag)
        .replace("{ticker}", ticker)
}

#[async_trait]
impl SourceAdapter for SocialChatterAdapter {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn category(&self) -> SourceCategory {
        SourceCategory::Social
    }

    fn refresh_every(&self) -> Option<Duration> {
        self.core.refresh()
    }

    async fn fetch(&self, topic: &TopicQuery) -> Result<Vec<Sample>, SourceError> {
        let topics = self.core.topics_for(topic);
        let now = Utc::now();
        self.core.with_state(|rng, _| {
            let mut out = Vec::new();
            for topic in topics {
                let ticker = ticker_for(&topic);
                let posts = rng.random_range(3..=8);
                for _ in 0..posts {
                    let template = TEMPLATES[rng.random_range(0..TEMPLATES.len())];
                    let author = HANDLES[rng.random_range(0..HANDLES.len())];
                    let text = render(template, &topic, &ticker);
                    let sentiment = self.analyzer.normalized(&text);
                    let engagement = rng.random_range(5..=5_000u64);

                    let tags = parse_hashtags(&text)
                        .into_iter()
                        .chain(parse_cashtags(&text))
                        .chain(parse_mentions(author));
                    out.push(Sample::new(topic.clone(), NAME, now, sentiment, engagement).with_tags(tags));
                }
            }
            out
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_fills_placeholders() {
        let s = render(TEMPLATES[0], "Bitcoin", "BTC");
        assert_eq!(s, "Bitcoin looking bullish today, breakout incoming #bitcoin $BTC");
    }

    #[tokio::test]
    async fn posts_carry_tags_and_author() {
        let a = SocialChatterAdapter::new(&SimulationParams {
            topics: vec!["Ordinals".into()],
            seed: Some(9),
            failure_rate: 0.0,
        });
        let out = a.fetch(&TopicQuery::All).await.unwrap();
        assert!((3..=8).contains(&out.len()));
        for s in &out {
            assert!(s.tags.contains("ordinals"), "{:?}", s.tags);
            assert!(s.tags.iter().any(|t| t.starts_with('@')));
        }
    }
}
