//! Fence-aware sentence segmentation.
//!
//! Headings, list items, and table rows are preserved as single
//! "sentences"; fenced code blocks become one opaque unit; prose
//! paragraphs split on Unicode sentence boundaries.

use quarry_normalize::outline::{FenceTracker, parse_heading};
use unicode_segmentation::UnicodeSegmentation;

/// What a segmentation unit is, for scoring and formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentenceKind {
    Prose,
    Heading,
    ListItem,
    Code,
}

#[derive(Debug, Clone)]
pub struct Sentence {
    pub text: String,
    pub index: usize,
    pub kind: SentenceKind,
}

/// Split markdown into scored units in document order.
#[must_use]
pub fn split_sentences(markdown: &str) -> Vec<Sentence> {
    let mut out: Vec<Sentence> = Vec::new();
    let mut fences = FenceTracker::new();
    let mut paragraph: Vec<&str> = Vec::new();
    let mut code: Vec<&str> = Vec::new();

    let flush_paragraph = |buffer: &mut Vec<&str>, out: &mut Vec<Sentence>| {
        if buffer.is_empty() {
            return;
        }
        let text = buffer.join(" ");
        buffer.clear();
        for raw in text.split_sentence_bounds() {
            let sentence = raw.trim();
            if !sentence.is_empty() {
                out.push(Sentence {
                    text: sentence.to_string(),
                    index: out.len(),
                    kind: SentenceKind::Prose,
                });
            }
        }
    };

    for line in markdown.lines() {
        let was_in_fence = fences.in_fence();
        let is_delimiter = fences.observe(line);

        if was_in_fence || is_delimiter {
            flush_paragraph(&mut paragraph, &mut out);
            code.push(line);
            if was_in_fence && is_delimiter {
                out.push(Sentence {
                    text: code.join("\n"),
                    index: out.len(),
                    kind: SentenceKind::Code,
                });
                code.clear();
            }
            continue;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            flush_paragraph(&mut paragraph, &mut out);
            continue;
        }

        if parse_heading(line).is_some() {
            flush_paragraph(&mut paragraph, &mut out);
            out.push(Sentence {
                text: trimmed.to_string(),
                index: out.len(),
                kind: SentenceKind::Heading,
            });
            continue;
        }

        if is_list_or_table_line(trimmed) {
            flush_paragraph(&mut paragraph, &mut out);
            out.push(Sentence {
                text: trimmed.to_string(),
                index: out.len(),
                kind: SentenceKind::ListItem,
            });
            continue;
        }

        paragraph.push(trimmed);
    }
    flush_paragraph(&mut paragraph, &mut out);
    if !code.is_empty() {
        // Unterminated fence at EOF
        out.push(Sentence {
            text: code.join("\n"),
            index: out.len(),
            kind: SentenceKind::Code,
        });
    }

    out
}

fn is_list_or_table_line(trimmed: &str) -> bool {
    if trimmed.starts_with("- ")
        || trimmed.starts_with("* ")
        || trimmed.starts_with("+ ")
        || trimmed.starts_with('|')
        || trimmed.starts_with("> ")
    {
        return true;
    }
    let digits: String = trimmed.chars().take_while(char::is_ascii_digit).collect();
    !digits.is_empty() && {
        let rest = &trimmed[digits.len()..];
        rest.starts_with(". ") || rest.starts_with(") ")
    }
}

/// Rebuild readable text from selected sentences: block units on their own
/// lines, consecutive prose joined with spaces.
#[must_use]
pub fn format_sentences(sentences: &[Sentence]) -> String {
    let mut blocks: Vec<String> = Vec::new();
    let mut prose_run: Vec<&str> = Vec::new();

    for sentence in sentences {
        match sentence.kind {
            SentenceKind::Prose => prose_run.push(&sentence.text),
            _ => {
                if !prose_run.is_empty() {
                    blocks.push(prose_run.join(" "));
                    prose_run.clear();
                }
                blocks.push(sentence.text.clone());
            }
        }
    }
    if !prose_run.is_empty() {
        blocks.push(prose_run.join(" "));
    }

    blocks.join("\n\n")
}
