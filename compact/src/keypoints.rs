//! Key points and important quotes, with key-block citations.

use std::collections::HashSet;
use std::sync::LazyLock;

use quarry_normalize::outline::FenceTracker;
use quarry_types::{BlockKind, CitedPoint, KeyBlock};
use regex::Regex;

use crate::score::{PreserveClass, salience};
use crate::sentences::{SentenceKind, split_sentences};

const MAX_KEY_POINTS: usize = 10;
const MAX_QUOTES: usize = 5;

/// Minimum salience for a summary sentence to count as a key point.
const KEY_POINT_FLOOR: f64 = 2.0;

static QUOTED_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]{20,200})""#).expect("static regex"));
static INLINE_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`[^`]*`").expect("static regex"));

/// Pull up to ten high-salience sentences out of the summary.
#[must_use]
pub fn key_points(
    summary: &str,
    preserve: &HashSet<PreserveClass>,
    key_blocks: &[KeyBlock],
) -> Vec<CitedPoint> {
    let mut seen: HashSet<String> = HashSet::new();
    split_sentences(summary)
        .into_iter()
        .filter(|s| s.kind != SentenceKind::Code)
        .filter(|s| salience(s, preserve) >= KEY_POINT_FLOOR)
        .filter(|s| seen.insert(normalized(&s.text)))
        .take(MAX_KEY_POINTS)
        .map(|s| CitedPoint {
            citation: citation_for(&s.text, key_blocks),
            text: s.text,
        })
        .collect()
}

/// Scan the original content for natural-language quotes.
///
/// Code, tables, and meta blocks are skipped, as are JSON-looking lines;
/// candidate `"…"` spans must read as prose: enough words and letters, low
/// symbol density, no escape sequences, no URLs.
#[must_use]
pub fn important_quotes(content: &str, key_blocks: &[KeyBlock]) -> Vec<CitedPoint> {
    let source = if key_blocks.is_empty() {
        strip_code(content)
    } else {
        key_blocks
            .iter()
            .filter(|b| {
                !matches!(b.kind, BlockKind::Code | BlockKind::Table | BlockKind::Meta)
            })
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    };
    let source = INLINE_CODE.replace_all(&source, " ");

    let mut quotes: Vec<CitedPoint> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for line in source.lines() {
        if looks_like_json(line) {
            continue;
        }
        for capture in QUOTED_SPAN.captures_iter(line) {
            let Some(span) = capture.get(1) else { continue };
            let text = span.as_str().trim();
            if !reads_as_prose(text) {
                continue;
            }
            if !seen.insert(normalized(text)) {
                continue;
            }
            quotes.push(CitedPoint {
                citation: citation_for(text, key_blocks),
                text: text.to_string(),
            });
            if quotes.len() == MAX_QUOTES {
                return quotes;
            }
        }
    }

    quotes
}

/// Strip fenced code blocks from markdown.
fn strip_code(markdown: &str) -> String {
    let mut fences = FenceTracker::new();
    markdown
        .lines()
        .filter(|line| {
            let was = fences.in_fence();
            let delim = fences.observe(line);
            !(was || delim)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn looks_like_json(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with('{')
        || trimmed.starts_with('[')
        || trimmed.starts_with("\"")
            && trimmed.contains("\":")
}

/// A quote worth surfacing: at least four words and ten letters, under 20%
/// symbol density, no literal escapes, no URLs.
fn reads_as_prose(text: &str) -> bool {
    if text.split_whitespace().count() < 4 {
        return false;
    }
    let letters = text.chars().filter(|c| c.is_alphabetic()).count();
    if letters < 10 {
        return false;
    }
    let symbols = text
        .chars()
        .filter(|c| !c.is_alphanumeric() && !c.is_whitespace() && !".,'!?;:-".contains(*c))
        .count();
    if symbols * 5 >= text.chars().count() {
        return false;
    }
    if text.contains("\\n") || text.contains("\\t") {
        return false;
    }
    if text.contains("http://") || text.contains("https://") {
        return false;
    }
    true
}

/// The `block_id` of the first key block containing `text`, matching
/// exactly first, then on normalized forms. Empty when nothing matches.
#[must_use]
pub fn citation_for(text: &str, key_blocks: &[KeyBlock]) -> String {
    for block in key_blocks {
        if block.text.contains(text) {
            return block.block_id.clone();
        }
    }
    let needle = normalized(text);
    if needle.is_empty() {
        return String::new();
    }
    for block in key_blocks {
        if normalized(&block.text).contains(&needle) {
            return block.block_id.clone();
        }
    }
    String::new()
}

fn normalized(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
