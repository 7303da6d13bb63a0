//! Sentence salience scoring and query-term extraction.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::sentences::{Sentence, SentenceKind};

/// Content classes the compactor favors keeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreserveClass {
    Numbers,
    Dates,
    Names,
    Definitions,
    Procedures,
}

impl PreserveClass {
    fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "numbers" => Some(PreserveClass::Numbers),
            "dates" => Some(PreserveClass::Dates),
            "names" => Some(PreserveClass::Names),
            "definitions" => Some(PreserveClass::Definitions),
            "procedures" => Some(PreserveClass::Procedures),
            _ => None,
        }
    }
}

/// Parse preserve-class names; unrecognized values are dropped, an empty
/// result falls back to the default set.
#[must_use]
pub fn parse_preserve(names: &[String]) -> HashSet<PreserveClass> {
    let parsed: HashSet<PreserveClass> = names
        .iter()
        .filter_map(|n| PreserveClass::from_name(n))
        .collect();
    if parsed.is_empty() {
        HashSet::from([
            PreserveClass::Numbers,
            PreserveClass::Dates,
            PreserveClass::Names,
        ])
    } else {
        parsed
    }
}

static DATE_HINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b\d{4}-\d{2}-\d{2}\b|\b\d{1,2}/\d{1,2}/\d{2,4}\b|\b(?:january|february|march|april|may|june|july|august|september|october|november|december)\b",
    )
    .expect("static regex")
});

static CURRENCY_OR_PERCENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[$€£]\s?\d|\d\s?%").expect("static regex"));

static DEFINITION_HINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(is defined as|refers to|means|is a type of|is the process)\b")
        .expect("static regex")
});

static PROCEDURE_HINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(step \d|first,|then,?\s|next,?\s|finally,|must be|should be)\b")
        .expect("static regex")
});

/// Salience of one sentence.
#[must_use]
pub fn salience(sentence: &Sentence, preserve: &HashSet<PreserveClass>) -> f64 {
    let text = &sentence.text;
    let mut score = 1.0;

    // Length shape: fragments and walls of text both read poorly
    let chars = text.chars().count();
    if chars < 20 {
        score -= 1.0;
    }
    if chars > 400 {
        score -= 1.0;
    }

    if preserve.contains(&PreserveClass::Numbers) && text.chars().any(|c| c.is_ascii_digit()) {
        score += 1.0;
    }
    if preserve.contains(&PreserveClass::Dates) && DATE_HINT.is_match(text) {
        score += 1.0;
    }
    if preserve.contains(&PreserveClass::Names) && has_proper_name(text) {
        score += 1.0;
    }
    if preserve.contains(&PreserveClass::Definitions) && DEFINITION_HINT.is_match(text) {
        score += 1.0;
    }
    if preserve.contains(&PreserveClass::Procedures) && PROCEDURE_HINT.is_match(text) {
        score += 1.0;
    }

    if text.to_ascii_lowercase().contains("according to") {
        score += 1.0;
    }
    if CURRENCY_OR_PERCENT.is_match(text) {
        score += 1.0;
    }

    match sentence.kind {
        SentenceKind::Heading => score += 2.0,
        SentenceKind::ListItem => score += 1.0,
        SentenceKind::Prose | SentenceKind::Code => {}
    }

    score
}

/// A capitalized word after the first, not following sentence punctuation.
fn has_proper_name(text: &str) -> bool {
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut after_punct = true;
    for (i, word) in words.iter().enumerate() {
        let capitalized = word.chars().next().is_some_and(char::is_uppercase)
            && word.chars().any(char::is_lowercase);
        if i > 0 && !after_punct && capitalized {
            return true;
        }
        after_punct = word.ends_with('.') || word.ends_with('!') || word.ends_with('?');
    }
    false
}

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "can", "her", "was", "one", "our",
    "out", "day", "get", "has", "him", "his", "how", "man", "new", "now", "old", "see", "two",
    "way", "who", "did", "its", "let", "say", "she", "too", "use", "that", "this", "with",
    "from", "have", "what", "when", "where", "which", "does", "about", "into", "than", "them",
    "then", "they", "were", "will", "would", "could", "should", "there", "their", "been",
    "being", "over", "under", "very", "just", "also", "only", "some", "such", "most", "more",
    "other", "between", "because", "through", "during", "before", "after", "above", "below",
];

/// Suffixes stripped by the light stemmer, longest-match first.
const SUFFIXES: &[&str] = &[
    "ments", "ment", "ations", "ation", "tions", "tion", "ings", "ing", "ers", "er", "ed", "es",
    "s",
];

/// Reduce a word to a rough stem.
#[must_use]
pub fn stem(word: &str) -> String {
    let lower = word.to_ascii_lowercase();
    if let Some(base) = lower.strip_suffix("ies")
        && base.len() >= 3
    {
        return format!("{base}y");
    }
    for suffix in SUFFIXES {
        if let Some(base) = lower.strip_suffix(suffix)
            && base.len() >= 3
        {
            return base.to_string();
        }
    }
    lower
}

/// Extract stemmed query terms from a question.
#[must_use]
pub fn build_query_terms(question: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for raw in question.split(|c: char| !c.is_alphanumeric()) {
        let word = raw.to_ascii_lowercase();
        if word.len() < 3 || STOP_WORDS.contains(&word.as_str()) {
            continue;
        }
        let stemmed = stem(&word);
        if stemmed.len() >= 3 && !terms.contains(&stemmed) {
            terms.push(stemmed);
        }
    }
    terms
}

/// How many query terms a sentence matches (stem-to-stem).
#[must_use]
pub fn term_matches(sentence: &str, terms: &[String]) -> usize {
    let stems: HashSet<String> = sentence
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 3)
        .map(stem)
        .collect();
    terms.iter().filter(|t| stems.contains(*t)).count()
}
