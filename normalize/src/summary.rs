//! Source summary: a handful of human-readable facts about the document.

use std::sync::LazyLock;

use quarry_types::OutlineEntry;
use regex::Regex;

const MAX_TOPICS: usize = 5;
const MAX_NUMBERS: usize = 5;
const MAX_DATES: usize = 3;

/// Numeric-token scanning is limited to the document head.
const NUMBER_SCAN_CHARS: usize = 2048;

static NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[$€£]?\d+(?:,\d{3})*(?:\.\d+)?%?").expect("static regex")
});

static DATE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(
            r"(?i)\b(?:january|february|march|april|may|june|july|august|september|october|november|december)\s+\d{1,2}(?:,)?\s+\d{4}\b",
        )
        .expect("static regex"),
        Regex::new(r"\b\d{4}-\d{2}-\d{2}\b").expect("static regex"),
        Regex::new(r"\b\d{1,2}/\d{1,2}/\d{2,4}\b").expect("static regex"),
    ]
});

/// Build the `source_summary` facts: topics from H1/H2 headings, distinct
/// numeric tokens from the head of the text, date mentions, word count.
#[must_use]
pub fn build(outline: &[OutlineEntry], text: &str) -> Vec<String> {
    let mut facts = Vec::new();

    let topics: Vec<&str> = outline
        .iter()
        .filter(|e| e.level <= 2)
        .map(|e| e.text.as_str())
        .take(MAX_TOPICS)
        .collect();
    if !topics.is_empty() {
        facts.push(format!("Topics: {}", topics.join("; ")));
    }

    let head: String = text.chars().take(NUMBER_SCAN_CHARS).collect();
    let mut numbers: Vec<String> = Vec::new();
    for m in NUMBER.find_iter(&head) {
        let token = m.as_str().to_string();
        // Bare single digits are noise, not key figures
        if token.len() < 2 && token.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        if !numbers.contains(&token) {
            numbers.push(token);
        }
        if numbers.len() == MAX_NUMBERS {
            break;
        }
    }
    if !numbers.is_empty() {
        facts.push(format!("Key numbers: {}", numbers.join(", ")));
    }

    let mut dates: Vec<String> = Vec::new();
    'outer: for pattern in DATE_PATTERNS.iter() {
        for m in pattern.find_iter(text) {
            let hit = m.as_str().to_string();
            if !dates.contains(&hit) {
                dates.push(hit);
            }
            if dates.len() == MAX_DATES {
                break 'outer;
            }
        }
    }
    if !dates.is_empty() {
        facts.push(format!("Dates mentioned: {}", dates.join(", ")));
    }

    let words = text.split_whitespace().count();
    facts.push(format!("Word count: {words}"));

    facts
}

/// `ceil(words / 225)`, floored at one minute.
#[must_use]
pub fn reading_time_minutes(words: usize) -> u32 {
    (words.div_ceil(225)).max(1) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heading(level: u8, text: &str) -> OutlineEntry {
        OutlineEntry {
            level,
            text: text.to_string(),
            path: text.to_string(),
        }
    }

    #[test]
    fn topics_from_h1_h2_only() {
        let outline = vec![
            heading(1, "Main"),
            heading(2, "First"),
            heading(3, "TooDeep"),
            heading(2, "Second"),
        ];
        let facts = build(&outline, "body");
        assert_eq!(facts[0], "Topics: Main; First; Second");
    }

    #[test]
    fn numbers_deduped_and_capped() {
        let text = "Revenue grew 12% to $4,500 in 2026, up from $3,200. \
                    Also 12% again, plus 99.5 and 800 and 900 and 1000.";
        let facts = build(&[], text);
        let numbers = facts.iter().find(|f| f.starts_with("Key numbers:")).unwrap();
        assert!(numbers.contains("12%"));
        assert!(numbers.contains("$4,500"));
        // capped at five distinct tokens
        assert_eq!(numbers.matches(", ").count(), 4);
    }

    #[test]
    fn dates_in_three_forms() {
        let text = "Published March 5, 2026, updated 2026-04-01, originally 3/15/24.";
        let facts = build(&[], text);
        let dates = facts.iter().find(|f| f.starts_with("Dates mentioned:")).unwrap();
        assert!(dates.contains("March 5, 2026"));
        assert!(dates.contains("2026-04-01"));
    }

    #[test]
    fn word_count_always_last() {
        let facts = build(&[], "one two three");
        assert_eq!(facts.last().unwrap(), "Word count: 3");
    }

    #[test]
    fn reading_time_floors_at_one() {
        assert_eq!(reading_time_minutes(0), 1);
        assert_eq!(reading_time_minutes(100), 1);
        assert_eq!(reading_time_minutes(225), 1);
        assert_eq!(reading_time_minutes(226), 2);
        assert_eq!(reading_time_minutes(2250), 10);
    }
}
