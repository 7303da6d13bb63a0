//! Outline generation: a code-fence-aware scan for ATX headings.

use quarry_types::OutlineEntry;

/// Code-fence state shared by every line-oriented scanner.
///
/// A fence opens on three or more backticks or tildes and closes only on a
/// run of the *same* character at *equal or greater* length with nothing
/// else on the line. Everything between is opaque.
#[derive(Debug, Default, Clone)]
pub struct FenceTracker {
    open: Option<(char, usize)>,
}

impl FenceTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the scanner is currently inside a fence.
    #[must_use]
    pub fn in_fence(&self) -> bool {
        self.open.is_some()
    }

    /// Feed one line. Returns `true` when the line itself is a fence
    /// delimiter (opening or closing).
    pub fn observe(&mut self, line: &str) -> bool {
        let trimmed = line.trim_start();
        let indent = line.len() - trimmed.len();
        if indent > 3 {
            return false;
        }

        let Some(first) = trimmed.chars().next() else {
            return false;
        };
        if first != '`' && first != '~' {
            return false;
        }
        let run = trimmed.chars().take_while(|c| *c == first).count();
        if run < 3 {
            return false;
        }

        match self.open {
            None => {
                self.open = Some((first, run));
                true
            }
            Some((open_char, open_len)) => {
                let rest = trimmed[run..].trim();
                if first == open_char && run >= open_len && rest.is_empty() {
                    self.open = None;
                    true
                } else {
                    // Inside the fence this is content, not a delimiter.
                    false
                }
            }
        }
    }
}

/// Parse an ATX heading line into `(level, text)`.
#[must_use]
pub fn parse_heading(line: &str) -> Option<(u8, &str)> {
    let trimmed = line.trim_start();
    if line.len() - trimmed.len() > 3 {
        return None;
    }
    let hashes = trimmed.chars().take_while(|c| *c == '#').count();
    if !(1..=6).contains(&hashes) {
        return None;
    }
    let rest = &trimmed[hashes..];
    if !rest.starts_with(' ') && !rest.starts_with('\t') {
        return None;
    }
    let text = rest.trim().trim_end_matches('#').trim_end();
    if text.is_empty() {
        None
    } else {
        Some((hashes as u8, text))
    }
}

/// Generate the outline of a Markdown document.
///
/// The `path` of each entry is the chain of open ancestors (strictly lower
/// level numbers) ending with the entry itself, joined by `" > "`.
#[must_use]
pub fn generate(markdown: &str) -> Vec<OutlineEntry> {
    let mut entries = Vec::new();
    let mut fences = FenceTracker::new();
    let mut stack: Vec<(u8, String)> = Vec::new();

    for line in markdown.lines() {
        if fences.observe(line) || fences.in_fence() {
            continue;
        }
        let Some((level, text)) = parse_heading(line) else {
            continue;
        };
        stack.retain(|(l, _)| *l < level);
        stack.push((level, text.to_string()));
        entries.push(OutlineEntry {
            level,
            text: text.to_string(),
            path: stack
                .iter()
                .map(|(_, t)| t.as_str())
                .collect::<Vec<_>>()
                .join(" > "),
        });
    }

    entries
}

/// Replay the scan and return the heading path active at `char_pos`.
///
/// The path reflects the last heading whose starting position is at or
/// before `char_pos`; positions are counted in characters, matching the
/// chunker's spans.
#[must_use]
pub fn find_heading_path(markdown: &str, char_pos: usize) -> String {
    let mut fences = FenceTracker::new();
    let mut stack: Vec<(u8, String)> = Vec::new();
    let mut offset = 0usize;

    for line in markdown.split_inclusive('\n') {
        if offset > char_pos {
            break;
        }
        let line_body = line.strip_suffix('\n').unwrap_or(line);
        if !fences.observe(line_body) && !fences.in_fence()
            && let Some((level, text)) = parse_heading(line_body)
        {
            stack.retain(|(l, _)| *l < level);
            stack.push((level, text.to_string()));
        }
        offset += line.chars().count();
    }

    stack
        .iter()
        .map(|(_, t)| t.as_str())
        .collect::<Vec<_>>()
        .join(" > ")
}
