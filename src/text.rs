//! Tag and keyword helpers shared by adapters, the store and the generator.

use once_cell::sync::Lazy;
use regex::Regex;

static RE_HASHTAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?P<tag>#[a-z0-9_]+)\b").expect("hashtag regex"));
static RE_CASHTAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?P<tag>\$[a-z]{1,6})\b").expect("cashtag regex"));
static RE_MENTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?P<tag>@[a-z0-9_]{2,32})\b").expect("mention regex"));

/// Normalize a tag: trim, lowercase, strip a leading `#`, collapse inner
/// whitespace to `_`. Cash-tags (`$btc`) and handles (`@name`) keep their sigil.
/// Returns `None` for tags that end up empty.
pub fn normalize_tag(raw: &str) -> Option<String> {
    let t = raw.trim().trim_start_matches('#').to_lowercase();
    let t = t.split_whitespace().collect::<Vec<_>>().join("_");
    if t.is_empty() || t == "$" || t == "@" {
        None
    } else {
        Some(t)
    }
}

/// Plain keyword tags are everything that is not a cash-tag or a handle.
pub fn is_keyword(tag: &str) -> bool {
    !tag.starts_with('$') && !tag.starts_with('@')
}

/// `$btc` → `BTC`; `None` for anything that is not a cash-tag.
pub fn cashtag_symbol(tag: &str) -> Option<String> {
    tag.strip_prefix('$')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_ascii_uppercase())
}

/// Extract hashtags like `#Ordinals`. Distinct, lowercased, without `#`.
pub fn parse_hashtags(input: &str) -> Vec<String> {
    collect_tags(&RE_HASHTAG, input, |s| s[1..].to_ascii_lowercase())
}

/// Extract cash-tags like `$BTC`. Distinct, lowercased, `$` kept.
pub fn parse_cashtags(input: &str) -> Vec<String> {
    collect_tags(&RE_CASHTAG, input, |s| s.to_ascii_lowercase())
}

/// Extract handles like `@satoshi`. Distinct, lowercased, `@` kept.
pub fn parse_mentions(input: &str) -> Vec<String> {
    collect_tags(&RE_MENTION, input, |s| s.to_ascii_lowercase())
}

fn collect_tags(re: &Regex, input: &str, f: impl Fn(&str) -> String) -> Vec<String> {
    let mut tags: Vec<String> = re
        .captures_iter(input)
        .filter_map(|caps| caps.name("tag").map(|m| f(m.as_str())))
        .collect();
    tags.sort();
    tags.dedup();
    tags
}
