//! Main-content selection.
//!
//! A lightweight readability pass scores container elements by the prose
//! they hold, penalized by link density. The caller compares the winner
//! against a structural fallback (`main`, `article`, `[role=main]`, or
//! `body`) using a word-count decision rule, so a readability pass that
//! finds only a fragment of a long page loses to the fallback.

use scraper::{ElementRef, Html, Selector};

/// Candidate container tags worth scoring.
const CANDIDATE_TAGS: &[&str] = &["article", "main", "section", "div", "td"];

/// Minimum text length before an element is worth scoring at all.
const MIN_CANDIDATE_CHARS: usize = 140;

/// Pick the best readability candidate in the document, if any.
#[must_use]
pub fn select_candidate(doc: &Html) -> Option<ElementRef<'_>> {
    let mut best: Option<(f64, ElementRef<'_>)> = None;

    for el in doc.root_element().descendent_elements() {
        if !CANDIDATE_TAGS.contains(&el.value().name()) {
            continue;
        }
        if super::sanitize::is_boilerplate(&el) || super::sanitize::is_hidden(&el) {
            continue;
        }
        let score = score_element(el);
        if score <= 0.0 {
            continue;
        }
        let better = match &best {
            None => true,
            Some((best_score, best_el)) => {
                // Prefer the tighter container when an ancestor and its
                // child score the same prose; the child wins only when it
                // holds materially more of the score.
                if is_ancestor_of(el, *best_el) {
                    score > best_score * 1.25
                } else {
                    score > *best_score
                }
            }
        };
        if better {
            best = Some((score, el));
        }
    }

    best.map(|(_, el)| el)
}

/// Score an element by paragraph prose, penalized by link density.
fn score_element(el: ElementRef<'_>) -> f64 {
    let mut prose_chars = 0usize;
    let mut comma_bonus = 0usize;

    for p in el.descendent_elements() {
        if !matches!(p.value().name(), "p" | "pre" | "blockquote" | "li") {
            continue;
        }
        let text: String = p.text().collect();
        let text = text.trim();
        prose_chars += text.len();
        comma_bonus += text.matches(',').count();
    }

    if prose_chars < MIN_CANDIDATE_CHARS {
        return 0.0;
    }

    let total_text: usize = el.text().map(str::len).sum();
    let link_text: usize = el
        .descendent_elements()
        .filter(|d| d.value().name() == "a")
        .map(|a| a.text().map(str::len).sum::<usize>())
        .sum();
    let link_density = if total_text == 0 {
        0.0
    } else {
        link_text as f64 / total_text as f64
    };

    (prose_chars + comma_bonus * 10) as f64 * (1.0 - link_density)
}

fn is_ancestor_of(candidate: ElementRef<'_>, other: ElementRef<'_>) -> bool {
    other.ancestors().any(|a| a.id() == candidate.id())
}

/// The structural fallback: `main`, `article`, `[role=main]`, else `body`.
#[must_use]
pub fn select_fallback(doc: &Html) -> Option<ElementRef<'_>> {
    for selector in ["main", "article", "[role=\"main\"]", "body"] {
        let parsed = Selector::parse(selector).ok()?;
        if let Some(el) = doc.select(&parsed).next() {
            return Some(el);
        }
    }
    None
}

/// Words in an element's visible text.
#[must_use]
pub fn word_count(el: ElementRef<'_>) -> usize {
    el.text()
        .flat_map(str::split_whitespace)
        .count()
}

/// The decision rule: readability wins only when it found real prose and
/// did not discard the bulk of a long page.
#[must_use]
pub fn use_readability(readability_words: usize, fallback_words: usize) -> bool {
    if readability_words == 0 {
        return false;
    }
    if fallback_words >= 600 {
        let ratio = readability_words as f64 / fallback_words as f64;
        if ratio < 0.35 {
            return false;
        }
    }
    if fallback_words >= 300 && readability_words < 120 {
        return false;
    }
    true
}
