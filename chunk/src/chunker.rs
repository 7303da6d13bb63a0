//! The chunker: key-block-aware packing of a packet into token-bounded
//! chunks.
//!
//! When a packet carries key blocks they are the unit of packing; without
//! them the Markdown is walked line-by-line with the same fence semantics.
//! Oversized blocks split by kind, small neighbors under one heading merge
//! back together, and chunk ids stay dense through every step.

use quarry_normalize::outline::{FenceTracker, parse_heading};
use quarry_types::{BlockKind, Chunk, ChunkSet, Citation, CharSpan, Packet};

use crate::split::{split_block, split_text};
use crate::tokens::estimate_tokens;

/// Packing strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChunkStrategy {
    /// Flush at headings of level ≤ 3; paragraphs flow freely.
    #[default]
    HeadingsFirst,
    /// Paragraph boundaries also qualify as flush points.
    Balanced,
}

impl ChunkStrategy {
    /// Parse the wire name, defaulting to headings-first.
    #[must_use]
    pub fn from_name(name: Option<&str>) -> Self {
        match name.map(str::trim) {
            Some("balanced") => ChunkStrategy::Balanced,
            _ => ChunkStrategy::HeadingsFirst,
        }
    }
}

/// Chunking options.
#[derive(Debug, Clone)]
pub struct ChunkOptions {
    pub max_tokens: usize,

    /// Fraction of `max_tokens` held back as headroom.
    pub margin_ratio: f64,

    pub strategy: ChunkStrategy,
}

impl ChunkOptions {
    #[must_use]
    pub fn new(max_tokens: usize) -> Self {
        Self {
            max_tokens,
            margin_ratio: 0.10,
            strategy: ChunkStrategy::default(),
        }
    }

    /// Effective per-chunk budget after the margin.
    #[must_use]
    pub fn budget(&self) -> usize {
        let ratio = self.margin_ratio.clamp(0.0, 0.5);
        ((self.max_tokens as f64) * (1.0 - ratio)).floor() as usize
    }
}

/// Heading levels at or above this force a flush under `headings_first`.
const FLUSH_HEADING_LEVEL: u8 = 3;

/// Merge thresholds, relative to `max_tokens` (not the margined budget).
const MERGE_SMALL_RATIO: f64 = 0.3;
const MERGE_COMBINED_RATIO: f64 = 0.8;

/// Chunk a packet.
#[must_use]
pub fn chunk(packet: &Packet, opts: &ChunkOptions) -> ChunkSet {
    let budget = opts.budget().max(1);

    let pieces = if packet.key_blocks.is_empty() {
        pack_lines(&packet.content, budget, opts.strategy)
    } else {
        pack_blocks(packet, budget, opts.strategy)
    };

    let merged = merge_small(pieces, opts.max_tokens);

    let chunks: Vec<Chunk> = merged
        .into_iter()
        .enumerate()
        .map(|(index, piece)| Chunk {
            chunk_id: format!("{}:c{}", packet.source_id, index),
            chunk_index: index,
            headings_path: piece.headings_path,
            est_tokens: estimate_tokens(&piece.text),
            char_len: piece.text.chars().count(),
            text: piece.text,
        })
        .collect();

    ChunkSet::new(packet.source_id.clone(), opts.max_tokens, chunks)
}

/// A new packet value with `citations` filled in: one entry per key block,
/// spanning the block's text within `content` (char offsets).
#[must_use]
pub fn with_citations(packet: &Packet) -> Packet {
    let mut citations = Vec::new();
    let mut cursor_chars = 0usize;
    let mut searched: &str = &packet.content;
    let mut consumed_bytes = 0usize;

    for block in &packet.key_blocks {
        let Some(found) = searched.find(&block.text) else {
            continue;
        };
        let start_char = cursor_chars + searched[..found].chars().count();
        let end_char = start_char + block.char_len;
        citations.push(Citation {
            block_id: block.block_id.clone(),
            loc: CharSpan {
                start_char,
                end_char,
            },
        });

        let advance = found + block.text.len();
        cursor_chars = start_char + block.char_len;
        consumed_bytes += advance;
        searched = &packet.content[consumed_bytes..];
    }

    let mut out = packet.clone();
    out.citations = citations;
    out
}

#[derive(Debug, Clone)]
struct Piece {
    text: String,
    headings_path: String,
}

/// Running heading state shared by both packing paths.
#[derive(Default)]
struct HeadingTrail {
    stack: Vec<(u8, String)>,
}

impl HeadingTrail {
    fn observe(&mut self, level: u8, text: &str) {
        self.stack.retain(|(l, _)| *l < level);
        self.stack.push((level, text.to_string()));
    }

    fn path(&self) -> String {
        self.stack
            .iter()
            .map(|(_, t)| t.as_str())
            .collect::<Vec<_>>()
            .join(" > ")
    }
}

struct Packer {
    budget: usize,
    pieces: Vec<Piece>,
    current: Vec<String>,
    current_tokens: usize,
    current_path: String,
}

impl Packer {
    fn new(budget: usize) -> Self {
        Self {
            budget,
            pieces: Vec::new(),
            current: Vec::new(),
            current_tokens: 0,
            current_path: String::new(),
        }
    }

    fn flush(&mut self) {
        if self.current.is_empty() {
            return;
        }
        let text = self.current.join("\n\n");
        self.pieces.push(Piece {
            text,
            headings_path: std::mem::take(&mut self.current_path),
        });
        self.current.clear();
        self.current_tokens = 0;
    }

    /// Add one already-fitting unit of text under the given heading path.
    fn add(&mut self, text: &str, tokens: usize, path: &str) {
        if !self.current.is_empty() && self.current_tokens + tokens > self.budget {
            self.flush();
        }
        if self.current.is_empty() {
            self.current_path = path.to_string();
        }
        self.current.push(text.to_string());
        self.current_tokens += tokens + 1;
    }

    /// Emit an oversized unit as standalone pieces split by kind.
    fn add_split(&mut self, kind: BlockKind, text: &str, path: &str) {
        self.flush();
        for part in split_block(kind, text, self.budget) {
            self.pieces.push(Piece {
                text: part,
                headings_path: path.to_string(),
            });
        }
    }

    fn finish(mut self) -> Vec<Piece> {
        self.flush();
        self.pieces
    }
}

fn pack_blocks(packet: &Packet, budget: usize, strategy: ChunkStrategy) -> Vec<Piece> {
    let mut packer = Packer::new(budget);
    let mut trail = HeadingTrail::default();

    for block in &packet.key_blocks {
        if block.kind == BlockKind::Heading {
            if let Some((level, text)) = parse_heading(&block.text) {
                if strategy == ChunkStrategy::HeadingsFirst && level <= FLUSH_HEADING_LEVEL {
                    packer.flush();
                }
                trail.observe(level, text);
            }
            packer.add(&block.text, estimate_tokens(&block.text), &trail.path());
            continue;
        }

        let tokens = estimate_tokens(&block.text);
        if tokens > budget {
            packer.add_split(block.kind, &block.text, &trail.path());
        } else {
            packer.add(&block.text, tokens, &trail.path());
        }
    }

    packer.finish()
}

/// Line-driven fallback for packets without key blocks: discover section
/// boundaries (headings, paragraph breaks) with the same fence semantics,
/// then pack sections.
fn pack_lines(markdown: &str, budget: usize, strategy: ChunkStrategy) -> Vec<Piece> {
    struct Section {
        text: String,
        path: String,
        flush_before: bool,
    }

    let mut sections: Vec<Section> = Vec::new();
    let mut fences = FenceTracker::new();
    let mut trail = HeadingTrail::default();
    let mut current: Vec<&str> = Vec::new();
    let mut current_path = String::new();
    let mut flush_before = false;

    let close_section =
        |lines: &mut Vec<&str>, path: &str, flush: bool, sections: &mut Vec<Section>| {
            let text = lines.join("\n").trim().to_string();
            if !text.is_empty() {
                sections.push(Section {
                    text,
                    path: path.to_string(),
                    flush_before: flush,
                });
            }
            lines.clear();
        };

    for line in markdown.lines() {
        let was_in_fence = fences.in_fence();
        let is_delimiter = fences.observe(line);
        let in_code = was_in_fence || is_delimiter;

        if !in_code && let Some((level, text)) = parse_heading(line) {
            close_section(&mut current, &current_path, flush_before, &mut sections);
            let forces_flush = match strategy {
                ChunkStrategy::HeadingsFirst => level <= FLUSH_HEADING_LEVEL,
                ChunkStrategy::Balanced => true,
            };
            trail.observe(level, text);
            current_path = trail.path();
            flush_before = forces_flush;
            current.push(line);
            continue;
        }

        if !in_code && line.trim().is_empty() {
            if strategy == ChunkStrategy::Balanced {
                close_section(&mut current, &current_path, flush_before, &mut sections);
                flush_before = false;
            } else {
                current.push(line);
            }
            continue;
        }

        current.push(line);
    }
    close_section(&mut current, &current_path, flush_before, &mut sections);

    let mut packer = Packer::new(budget);
    for section in sections {
        if section.flush_before {
            packer.flush();
        }
        let tokens = estimate_tokens(&section.text);
        if tokens > budget {
            let kind = if section.text.starts_with("```") || section.text.starts_with("~~~") {
                BlockKind::Code
            } else {
                BlockKind::Paragraph
            };
            packer.add_split(kind, &section.text, &section.path);
        } else {
            packer.add(&section.text, tokens, &section.path);
        }
    }
    packer.finish()
}

/// Merge adjacent small chunks that share a heading path.
fn merge_small(pieces: Vec<Piece>, max_tokens: usize) -> Vec<Piece> {
    let small_limit = (max_tokens as f64 * MERGE_SMALL_RATIO) as usize;
    let combined_limit = (max_tokens as f64 * MERGE_COMBINED_RATIO) as usize;

    let mut merged: Vec<Piece> = Vec::new();
    for piece in pieces {
        if let Some(last) = merged.last_mut()
            && last.headings_path == piece.headings_path
            && estimate_tokens(&last.text) < small_limit
            && estimate_tokens(&last.text) + estimate_tokens(&piece.text) < combined_limit
        {
            last.text.push_str("\n\n");
            last.text.push_str(&piece.text);
            continue;
        }
        merged.push(piece);
    }
    merged
}
