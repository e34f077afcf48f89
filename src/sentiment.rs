//! Small lexicon scorer used to turn chatter text into a bounded sentiment.

use once_cell::sync::Lazy;
use std::collections::HashMap;

static LEXICON: Lazy<HashMap<&'static str, i32>> = Lazy::new(|| {
    [
        ("bullish", 2),
        ("moon", 2),
        ("pump", 1),
        ("rally", 2),
        ("breakout", 2),
        ("strong", 1),
        ("growth", 1),
        ("adoption", 1),
        ("record", 1),
        ("surge", 2),
        ("upgrade", 1),
        ("healthy", 1),
        ("accumulating", 1),
        ("love", 1),
        ("gm", 1),
        ("bearish", -2),
        ("dump", -2),
        ("crash", -3),
        ("rekt", -2),
        ("weak", -1),
        ("scam", -3),
        ("congested", -1),
        ("fud", -1),
        ("selloff", -2),
        ("fear", -1),
        ("exploit", -3),
        ("outage", -2),
        ("stalled", -1),
        ("overpriced", -1),
        ("dead", -2),
    ]
    .into_iter()
    .collect()
});

#[derive(Debug, Clone, Default)]
pub struct SentimentAnalyzer;

impl SentimentAnalyzer {
    pub fn new() -> Self {
        Self
    }

    #[inline]
    fn word_score(&self, w: &str) -> i32 {
        LEXICON.get(w).copied().unwrap_or(0)
    }

    /// Returns `(score, token_count)`.
    /// A negator in the previous 1..=3 tokens flips the sign of a lexicon hit.
    pub fn score_text(&self, text: &str) -> (i32, usize) {
        let tokens: Vec<String> = tokenize(text).collect();
        let mut score: i32 = 0;

        for i in 0..tokens.len() {
            let base = self.word_score(tokens[i].as_str());
            if base == 0 {
                continue;
            }
            let negated = (1..=3).any(|k| i >= k && is_negator(tokens[i - k].as_str()));
            score += if negated { -base } else { base };
        }

        (score, tokens.len())
    }

    /// Raw score squashed into [-1, 1].
    pub fn normalized(&self, text: &str) -> f64 {
        let (score, _) = self.score_text(text);
        (f64::from(score) / 3.0).tanh()
    }
}

fn tokenize(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|t| !t.is_empty())
        .map(|t| t.to_ascii_lowercase())
}

fn is_negator(tok: &str) -> bool {
    matches!(
        tok,
        "not" | "no" | "never" | "isn't" | "wasn't" | "aren't" | "won't" | "can't" | "cannot"
    )
}
