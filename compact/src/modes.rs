//! The four compaction strategies.

use std::collections::HashSet;

use quarry_chunk::estimate_tokens;
use quarry_normalize::outline::{FenceTracker, parse_heading};
use quarry_types::{Warning, WarningKind};

use crate::score::{PreserveClass, build_query_terms, salience, term_matches};
use crate::sentences::{Sentence, format_sentences, split_sentences};

/// Compaction strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompactMode {
    /// Keep the highest-value sections whole, summarizing the oversized.
    #[default]
    Structural,
    /// Keep the highest-salience sentences document-wide.
    Salience,
    /// Summarize each chunk under a shared budget, then squeeze the
    /// concatenation.
    MapReduce,
    /// Favor sentences matching the caller's question.
    QuestionFocused,
}

impl CompactMode {
    /// Parse the wire name; unknown names fall back to structural.
    #[must_use]
    pub fn from_name(name: Option<&str>) -> Self {
        match name.map(str::trim) {
            Some("salience") => CompactMode::Salience,
            Some("map_reduce") => CompactMode::MapReduce,
            Some("question_focused") => CompactMode::QuestionFocused,
            _ => CompactMode::Structural,
        }
    }
}

/// Output of one mode run.
#[derive(Debug, Default)]
pub struct ModeOutput {
    pub summary: String,
    pub omissions: Vec<String>,
    pub warnings: Vec<Warning>,
}

/// Minimum budget left over before a too-large section is worth
/// summarizing instead of omitting.
const SUMMARIZE_FLOOR_TOKENS: usize = 40;

/// Share of the budget the question-focused pass must fill before the
/// salience fallback tops it up.
const QUESTION_FILL_RATIO: f64 = 0.7;

struct Section {
    heading: Option<String>,
    text: String,
    index: usize,
}

fn split_sections(markdown: &str) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();
    let mut fences = FenceTracker::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_heading: Option<String> = None;

    let close = |lines: &mut Vec<&str>, heading: &mut Option<String>, sections: &mut Vec<Section>| {
        let text = lines.join("\n").trim().to_string();
        if !text.is_empty() {
            sections.push(Section {
                heading: heading.clone(),
                text,
                index: sections.len(),
            });
        }
        lines.clear();
    };

    for line in markdown.lines() {
        let was_in_fence = fences.in_fence();
        let in_code = fences.observe(line) || was_in_fence;
        if !in_code && let Some((_, heading_text)) = parse_heading(line) {
            close(&mut current, &mut current_heading, &mut sections);
            current_heading = Some(heading_text.to_string());
        }
        current.push(line);
    }
    close(&mut current, &mut current_heading, &mut sections);

    sections
}

fn score_section(section: &Section, preserve: &HashSet<PreserveClass>) -> f64 {
    let mut score = 0.0;
    if section.heading.is_some() {
        score += 2.0;
    }
    let chars = section.text.chars().count();
    if (100..=2000).contains(&chars) {
        score += 1.0;
    }
    if preserve.contains(&PreserveClass::Numbers)
        && section.text.chars().any(|c| c.is_ascii_digit())
    {
        score += 1.0;
    }
    if section.text.contains("```") || section.text.contains("~~~") {
        score += 1.0;
    }
    if section
        .text
        .lines()
        .any(|l| l.trim_start().starts_with("- ") || l.trim_start().starts_with("* "))
    {
        score += 1.0;
    }
    score
}

/// Structural compaction: greedy inclusion of scored sections, summarizing
/// the ones that cannot fit whole.
#[must_use]
pub fn structural(markdown: &str, budget: usize, preserve: &HashSet<PreserveClass>) -> ModeOutput {
    let sections = split_sections(markdown);
    let mut order: Vec<usize> = (0..sections.len()).collect();
    order.sort_by(|&a, &b| {
        score_section(&sections[b], preserve)
            .partial_cmp(&score_section(&sections[a], preserve))
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });

    let mut remaining = budget;
    let mut included: Vec<(usize, String)> = Vec::new();
    let mut omissions: Vec<String> = Vec::new();

    for &idx in &order {
        let section = &sections[idx];
        let tokens = estimate_tokens(&section.text);
        if tokens <= remaining {
            included.push((idx, section.text.clone()));
            remaining -= tokens;
            continue;
        }
        if remaining >= SUMMARIZE_FLOOR_TOKENS {
            let summarized = summarize_section(section, remaining, preserve);
            let used = estimate_tokens(&summarized);
            if used <= remaining && !summarized.is_empty() {
                included.push((idx, summarized));
                remaining -= used;
                continue;
            }
        }
        omissions.push(format!(
            "section {} omitted ({tokens} tokens over budget)",
            section
                .heading
                .as_deref()
                .map_or_else(|| format!("#{}", section.index + 1), |h| format!("\"{h}\"")),
        ));
    }

    included.sort_by_key(|(idx, _)| *idx);
    ModeOutput {
        summary: included
            .into_iter()
            .map(|(_, text)| text)
            .collect::<Vec<_>>()
            .join("\n\n"),
        omissions,
        warnings: Vec::new(),
    }
}

/// Summarize one section by sentence scoring, keeping its heading line.
fn summarize_section(
    section: &Section,
    budget: usize,
    preserve: &HashSet<PreserveClass>,
) -> String {
    let sentences = split_sentences(&section.text);
    let mut kept = select_by_salience(&sentences, budget, preserve);

    // The heading line survives even if scoring dropped it
    if let Some(heading) = &section.heading
        && !kept.iter().any(|s| s.text.contains(heading.as_str()))
        && let Some(heading_sentence) = sentences.iter().find(|s| s.text.contains(heading.as_str()))
    {
        kept.insert(0, heading_sentence.clone());
        kept.sort_by_key(|s| s.index);
    }

    format_sentences(&kept)
}

/// Greedy top-salience selection within a budget, returned in document
/// order and deduped.
fn select_by_salience(
    sentences: &[Sentence],
    budget: usize,
    preserve: &HashSet<PreserveClass>,
) -> Vec<Sentence> {
    let mut order: Vec<usize> = (0..sentences.len()).collect();
    order.sort_by(|&a, &b| {
        salience(&sentences[b], preserve)
            .partial_cmp(&salience(&sentences[a], preserve))
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });

    let mut remaining = budget;
    let mut picked: Vec<usize> = Vec::new();
    for &idx in &order {
        let tokens = estimate_tokens(&sentences[idx].text) + 1;
        if tokens <= remaining {
            picked.push(idx);
            remaining -= tokens;
        }
    }
    picked.sort_unstable();

    let mut seen: HashSet<String> = HashSet::new();
    picked
        .into_iter()
        .map(|i| sentences[i].clone())
        .filter(|s| seen.insert(normalized(&s.text)))
        .collect()
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

/// Salience compaction over the whole document.
#[must_use]
pub fn by_salience(markdown: &str, budget: usize, preserve: &HashSet<PreserveClass>) -> ModeOutput {
    let sentences = split_sentences(markdown);
    let kept = select_by_salience(&sentences, budget, preserve);
    let dropped = sentences.len().saturating_sub(kept.len());
    let mut omissions = Vec::new();
    if dropped > 0 {
        omissions.push(format!("{dropped} lower-salience sentences dropped"));
    }
    ModeOutput {
        summary: format_sentences(&kept),
        omissions,
        warnings: Vec::new(),
    }
}

/// Map-reduce compaction over a chunk set.
#[must_use]
pub fn map_reduce(chunks: &[String], budget: usize, preserve: &HashSet<PreserveClass>) -> ModeOutput {
    if chunks.is_empty() {
        return ModeOutput::default();
    }
    let per_chunk = (budget / chunks.len()).max(1);

    let partials: Vec<String> = chunks
        .iter()
        .map(|chunk| {
            let sentences = split_sentences(chunk);
            format_sentences(&select_by_salience(&sentences, per_chunk, preserve))
        })
        .filter(|s| !s.is_empty())
        .collect();

    let mut combined = partials.join("\n\n");

    // Reduce: drop the weakest fifth until the concatenation fits.
    while estimate_tokens(&combined) > budget {
        let sentences = split_sentences(&combined);
        if sentences.len() <= 5 {
            break;
        }
        let mut order: Vec<usize> = (0..sentences.len()).collect();
        order.sort_by(|&a, &b| {
            salience(&sentences[a], preserve)
                .partial_cmp(&salience(&sentences[b], preserve))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let drop_count = (sentences.len() / 5).max(1);
        let dropped: HashSet<usize> = order.into_iter().take(drop_count).collect();
        let kept: Vec<Sentence> = sentences
            .into_iter()
            .enumerate()
            .filter(|(i, _)| !dropped.contains(i))
            .map(|(_, s)| s)
            .collect();
        combined = format_sentences(&kept);
    }

    ModeOutput {
        summary: combined,
        omissions: Vec::new(),
        warnings: Vec::new(),
    }
}

/// Question-focused compaction; falls back to salience when the question
/// yields no usable signal.
#[must_use]
pub fn question_focused(
    markdown: &str,
    budget: usize,
    question: Option<&str>,
    preserve: &HashSet<PreserveClass>,
) -> ModeOutput {
    let fallback = |reason: &str| {
        let mut output = by_salience(markdown, budget, preserve);
        output.warnings.push(Warning::new(
            WarningKind::ExtractionFallback,
            format!("question-focused compaction fell back to salience: {reason}"),
        ));
        output
    };

    let Some(question) = question.filter(|q| !q.trim().is_empty()) else {
        return fallback("no question provided");
    };
    let terms = build_query_terms(question);
    if terms.is_empty() {
        return fallback("question has no meaningful terms");
    }

    let sentences = split_sentences(markdown);
    let matches: Vec<usize> = sentences
        .iter()
        .map(|s| term_matches(&s.text, &terms))
        .collect();
    if matches.iter().all(|&m| m == 0) {
        return fallback("no sentence matches the question terms");
    }

    let scored: Vec<(f64, usize)> = sentences
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let neighbors = matches.get(i.wrapping_sub(1)).copied().unwrap_or(0)
                + matches.get(i + 1).copied().unwrap_or(0);
            let score = salience(s, preserve) + 3.0 * matches[i] as f64 + (neighbors.min(2)) as f64;
            (score, i)
        })
        .collect();

    let mut order: Vec<usize> = (0..sentences.len()).collect();
    order.sort_by(|&a, &b| {
        scored[b]
            .0
            .partial_cmp(&scored[a].0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(matches[b].cmp(&matches[a]))
            .then(a.cmp(&b))
    });

    let mut remaining = budget;
    let mut picked: Vec<usize> = Vec::new();
    for &idx in &order {
        let tokens = estimate_tokens(&sentences[idx].text) + 1;
        if tokens <= remaining {
            picked.push(idx);
            remaining -= tokens;
        }
    }

    // Top up from pure salience when the matches left the budget mostly
    // unused.
    let used = budget - remaining;
    if (used as f64) < (budget as f64) * QUESTION_FILL_RATIO {
        let chosen: HashSet<usize> = picked.iter().copied().collect();
        let mut filler: Vec<usize> = (0..sentences.len()).filter(|i| !chosen.contains(i)).collect();
        filler.sort_by(|&a, &b| {
            salience(&sentences[b], preserve)
                .partial_cmp(&salience(&sentences[a], preserve))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(&b))
        });
        for idx in filler {
            let tokens = estimate_tokens(&sentences[idx].text) + 1;
            if tokens <= remaining {
                picked.push(idx);
                remaining -= tokens;
            }
        }
    }

    picked.sort_unstable();
    let mut seen: HashSet<String> = HashSet::new();
    let kept: Vec<Sentence> = picked
        .into_iter()
        .map(|i| sentences[i].clone())
        .filter(|s| seen.insert(normalized(&s.text)))
        .collect();

    ModeOutput {
        summary: format_sentences(&kept),
        omissions: Vec::new(),
        warnings: Vec::new(),
    }
}
