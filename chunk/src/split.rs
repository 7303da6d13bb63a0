//! Kind-aware splitting of a single oversized block.
//!
//! Code keeps its fences on every part, lists split at item boundaries,
//! tables carry their header and separator into every part; anything else
//! falls back to text splitting at paragraph, sentence, or line boundaries.

use quarry_types::BlockKind;

use crate::tokens::{CODE_CHARS_PER_TOKEN, PROSE_CHARS_PER_TOKEN, estimate_tokens};

/// Conservative per-line token cost for packing decisions: the code rate
/// plus the newline, so an assembled part never outgrows its budget even
/// when the whole part scores as code.
fn line_cost(line: &str) -> usize {
    (line.chars().count() as f64 / CODE_CHARS_PER_TOKEN).ceil() as usize + 1
}

/// Split one block's text into pieces that each fit `budget` tokens.
#[must_use]
pub fn split_block(kind: BlockKind, text: &str, budget: usize) -> Vec<String> {
    match kind {
        BlockKind::Code => split_code(text, budget),
        BlockKind::List => split_list(text, budget),
        BlockKind::Table => split_table(text, budget),
        _ => split_text(text, budget),
    }
}

/// Split a fenced code block, preserving the opening and closing fence on
/// every part.
fn split_code(text: &str, budget: usize) -> Vec<String> {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() < 2 {
        return split_text(text, budget);
    }

    let opening = lines[0];
    let closing = lines[lines.len() - 1];
    let inner = &lines[1..lines.len() - 1];
    let overhead = line_cost(opening) + line_cost(closing);

    let mut parts: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_tokens = 0usize;

    let flush = |current: &mut Vec<&str>, parts: &mut Vec<String>| {
        if !current.is_empty() {
            parts.push(format!("{opening}\n{}\n{closing}", current.join("\n")));
            current.clear();
        }
    };

    for line in inner {
        let line_tokens = line_cost(line);
        if line_tokens + overhead > budget {
            // A single line that cannot fit even alone: text-split it.
            flush(&mut current, &mut parts);
            for piece in split_text(line, budget.saturating_sub(overhead).max(1)) {
                parts.push(format!("{opening}\n{piece}\n{closing}"));
            }
            current_tokens = 0;
            continue;
        }
        if current_tokens + line_tokens + overhead > budget && !current.is_empty() {
            flush(&mut current, &mut parts);
            current_tokens = 0;
        }
        current.push(line);
        current_tokens += line_tokens;
    }
    flush(&mut current, &mut parts);

    if parts.is_empty() {
        vec![text.to_string()]
    } else {
        parts
    }
}

/// Split a list at item boundaries; items carry their indented
/// continuation lines.
fn split_list(text: &str, budget: usize) -> Vec<String> {
    let mut items: Vec<String> = Vec::new();
    for line in text.lines() {
        let is_continuation = (line.starts_with("  ") || line.starts_with('\t'))
            && !items.is_empty();
        if is_continuation {
            if let Some(last) = items.last_mut() {
                last.push('\n');
                last.push_str(line);
            }
        } else {
            items.push(line.to_string());
        }
    }

    let mut parts: Vec<String> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_tokens = 0usize;

    for item in items {
        let item_tokens = item.lines().map(line_cost).sum::<usize>();
        if item_tokens > budget {
            if !current.is_empty() {
                parts.push(current.join("\n"));
                current.clear();
                current_tokens = 0;
            }
            parts.extend(split_text(&item, budget));
            continue;
        }
        if current_tokens + item_tokens > budget && !current.is_empty() {
            parts.push(current.join("\n"));
            current.clear();
            current_tokens = 0;
        }
        current_tokens += item_tokens;
        current.push(item);
    }
    if !current.is_empty() {
        parts.push(current.join("\n"));
    }

    if parts.is_empty() {
        vec![text.to_string()]
    } else {
        parts
    }
}

/// Split a table by rows, carrying the header and separator into every
/// part. Falls back to text splitting when even one row cannot fit.
fn split_table(text: &str, budget: usize) -> Vec<String> {
    let lines: Vec<&str> = text.lines().collect();
    let has_separator = lines.len() >= 2 && lines[1].contains("---");
    if !has_separator {
        return split_text(text, budget);
    }

    let header = format!("{}\n{}", lines[0], lines[1]);
    let header_tokens = header.lines().map(line_cost).sum::<usize>();
    let rows = &lines[2..];

    if rows
        .iter()
        .any(|row| header_tokens + line_cost(row) > budget)
    {
        return split_text(text, budget);
    }

    let mut parts: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_tokens = header_tokens;

    for row in rows {
        let row_tokens = line_cost(row);
        if current_tokens + row_tokens > budget && !current.is_empty() {
            parts.push(format!("{header}\n{}", current.join("\n")));
            current.clear();
            current_tokens = header_tokens;
        }
        current.push(row);
        current_tokens += row_tokens;
    }
    if !current.is_empty() {
        parts.push(format!("{header}\n{}", current.join("\n")));
    }

    if parts.is_empty() {
        vec![text.to_string()]
    } else {
        parts
    }
}

/// Split prose at the best available boundary near the character target.
#[must_use]
pub fn split_text(text: &str, budget: usize) -> Vec<String> {
    let target_chars = ((budget as f64) * PROSE_CHARS_PER_TOKEN) as usize;
    if target_chars == 0 {
        return vec![text.to_string()];
    }

    let mut parts = Vec::new();
    let mut rest = text;
    while estimate_tokens(rest) > budget {
        let cut = find_cut(rest, target_chars);
        if cut == 0 || cut >= rest.len() {
            break;
        }
        parts.push(rest[..cut].trim_end().to_string());
        rest = rest[cut..].trim_start();
    }
    if !rest.is_empty() {
        parts.push(rest.to_string());
    }
    if parts.is_empty() {
        vec![text.to_string()]
    } else {
        parts
    }
}

/// Best boundary at or before `target_chars`: paragraph, then sentence,
/// then line, then a hard cut.
fn find_cut(text: &str, target_chars: usize) -> usize {
    let limit = byte_at_char(text, target_chars);
    if limit >= text.len() {
        return text.len();
    }
    // Search back through the latter half of the window only, so a
    // boundary near the start does not produce a sliver.
    let floor = byte_at_char(text, target_chars / 2);
    let window = &text[floor..limit];

    if let Some(p) = window.rfind("\n\n") {
        return floor + p;
    }
    let bytes = window.as_bytes();
    if let Some(i) = (1..bytes.len())
        .rev()
        .find(|&i| matches!(bytes[i - 1], b'.' | b'!' | b'?') && bytes[i] == b' ')
    {
        return floor + i;
    }
    if let Some(p) = window.rfind('\n') {
        return floor + p;
    }
    // Hard cut on a char boundary
    let mut cut = limit;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    cut
}

fn byte_at_char(text: &str, char_pos: usize) -> usize {
    text.char_indices()
        .nth(char_pos)
        .map_or(text.len(), |(b, _)| b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_parts_keep_fences() {
        let body: Vec<String> = (0..40).map(|i| format!("let value_{i} = compute({i});")).collect();
        let block = format!("```rust\n{}\n```", body.join("\n"));
        let parts = split_block(BlockKind::Code, &block, 40);
        assert!(parts.len() > 1);
        for part in &parts {
            assert!(part.starts_with("```rust\n"), "part: {part}");
            assert!(part.ends_with("\n```"), "part: {part}");
            assert!(estimate_tokens(part) <= 40 + 4, "part too big");
        }
        // No inner line lost
        let joined = parts.join("\n");
        for i in 0..40 {
            assert!(joined.contains(&format!("let value_{i}")));
        }
    }

    #[test]
    fn oversized_single_code_line_text_split() {
        let line = "x".repeat(600);
        let block = format!("```\n{line}\n```");
        let parts = split_block(BlockKind::Code, &block, 50);
        assert!(parts.len() > 1);
        for part in &parts {
            assert!(part.starts_with("```\n"));
            assert!(part.ends_with("\n```"));
        }
    }

    #[test]
    fn list_splits_at_item_boundaries() {
        let items: Vec<String> = (0..30)
            .map(|i| format!("- item number {i} with a bit of text"))
            .collect();
        let block = items.join("\n");
        let parts = split_block(BlockKind::List, &block, 60);
        assert!(parts.len() > 1);
        for part in &parts {
            // Every line in every part is a complete item
            for line in part.lines() {
                assert!(line.starts_with("- "), "line: {line}");
            }
        }
    }

    #[test]
    fn list_continuations_stay_with_items() {
        let block = "- first item\n  continuation of first\n- second item";
        let parts = split_block(BlockKind::List, block, 8);
        assert!(parts.iter().any(|p| p.contains("first item\n  continuation")));
    }

    #[test]
    fn table_parts_repeat_header() {
        let mut lines = vec!["| id | name |".to_string(), "| --- | --- |".to_string()];
        for i in 0..25 {
            lines.push(format!("| {i} | row number {i} |"));
        }
        let block = lines.join("\n");
        let parts = split_block(BlockKind::Table, &block, 50);
        assert!(parts.len() > 1);
        for part in &parts {
            assert!(part.starts_with("| id | name |\n| --- | --- |"));
        }
    }

    #[test]
    fn text_split_prefers_sentences() {
        let text = "A complete sentence here. Another follows it. ".repeat(30);
        let parts = split_block(BlockKind::Paragraph, &text, 50);
        assert!(parts.len() > 1);
        for part in &parts[..parts.len() - 1] {
            assert!(part.ends_with('.'), "part: {part:?}");
        }
    }

    #[test]
    fn split_parts_fit_budget() {
        let text = "word ".repeat(2000);
        let parts = split_text(&text, 100);
        for part in &parts {
            assert!(estimate_tokens(part) <= 110, "part of {} tokens", estimate_tokens(part));
        }
    }
}
