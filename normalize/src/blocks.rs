//! Key-block segmentation: typed contiguous ranges of the Markdown body.
//!
//! One fence-aware pass. Headings flush eagerly as single-line blocks; code
//! spans fence to matching fence inclusive; lists, quotes, and tables
//! accumulate while their line shape continues; blank lines flush whatever
//! non-code block is open.

use quarry_types::{BlockKind, KeyBlock};

use crate::outline::{FenceTracker, parse_heading};

/// Split normalized Markdown into key blocks.
#[must_use]
pub fn split_blocks(markdown: &str) -> Vec<KeyBlock> {
    let mut builder = Builder::default();
    let mut fences = FenceTracker::new();

    for line in markdown.lines() {
        let was_in_fence = fences.in_fence();
        let is_delimiter = fences.observe(line);

        if was_in_fence {
            builder.push_line(BlockKind::Code, line);
            if is_delimiter {
                // Closing fence ends the code block inclusively.
                builder.flush();
            }
            continue;
        }
        if is_delimiter {
            // Opening fence starts a code block.
            builder.flush();
            builder.push_line(BlockKind::Code, line);
            continue;
        }

        if line.trim().is_empty() {
            builder.flush();
            continue;
        }

        if parse_heading(line).is_some() {
            builder.flush();
            builder.push_line(BlockKind::Heading, line);
            builder.flush();
            continue;
        }

        let kind = classify_line(line, builder.open_kind());
        builder.push_line(kind, line);
    }
    builder.flush();

    builder.finish()
}

/// Kind of a single non-heading, non-code line.
fn classify_line(line: &str, open: Option<BlockKind>) -> BlockKind {
    let trimmed = line.trim_start();

    if trimmed.starts_with('>') {
        return BlockKind::Quote;
    }
    if trimmed.starts_with('|') && trimmed.contains('|') {
        return BlockKind::Table;
    }
    if is_list_line(trimmed) {
        return BlockKind::List;
    }
    // Indented continuation lines stay with an open list item.
    if open == Some(BlockKind::List) && line.starts_with("  ") {
        return BlockKind::List;
    }
    if is_meta_line(trimmed) {
        return BlockKind::Meta;
    }
    BlockKind::Paragraph
}

fn is_list_line(trimmed: &str) -> bool {
    if trimmed.starts_with("- ")
        || trimmed.starts_with("* ")
        || trimmed.starts_with("+ ")
    {
        return true;
    }
    let digits: String = trimmed.chars().take_while(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return false;
    }
    let rest = &trimmed[digits.len()..];
    rest.starts_with(". ") || rest.starts_with(") ")
}

/// Document furniture rather than prose: thematic breaks and standalone
/// emphasis lines (dates, attributions).
fn is_meta_line(trimmed: &str) -> bool {
    if trimmed.len() >= 3 && trimmed.chars().all(|c| c == '-' || c == '*' || c == '_') {
        return true;
    }
    trimmed.len() > 2
        && trimmed.starts_with('*')
        && trimmed.ends_with('*')
        && !trimmed.starts_with("**")
        && !trimmed[1..trimmed.len() - 1].contains('*')
}

#[derive(Default)]
struct Builder {
    blocks: Vec<KeyBlock>,
    open: Option<(BlockKind, Vec<String>)>,
}

impl Builder {
    fn open_kind(&self) -> Option<BlockKind> {
        self.open.as_ref().map(|(k, _)| *k)
    }

    fn push_line(&mut self, kind: BlockKind, line: &str) {
        match &mut self.open {
            Some((open_kind, lines)) if *open_kind == kind => lines.push(line.to_string()),
            Some(_) => {
                self.flush();
                self.open = Some((kind, vec![line.to_string()]));
            }
            None => self.open = Some((kind, vec![line.to_string()])),
        }
    }

    fn flush(&mut self) {
        let Some((kind, lines)) = self.open.take() else {
            return;
        };
        let text = lines.join("\n");
        if text.trim().is_empty() {
            return;
        }
        let block_id = format!("b{}", self.blocks.len());
        self.blocks.push(KeyBlock {
            block_id,
            kind,
            char_len: text.chars().count(),
            text,
        });
    }

    fn finish(self) -> Vec<KeyBlock> {
        self.blocks
    }
}
