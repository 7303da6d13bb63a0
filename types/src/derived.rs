//! Views derived from a packet: chunk sets and compactions.
//!
//! Neither is persisted; both are pure functions of a packet (plus options)
//! and can be recomputed at will.

use serde::{Deserialize, Serialize};

/// A token-bounded slice of a packet's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// `"<source_id>:c<index>"`. Dense and contiguous after any merge.
    pub chunk_id: String,

    pub chunk_index: usize,

    /// Heading path active at the start of the chunk (`"A > B"`), empty when
    /// the chunk precedes any heading.
    pub headings_path: String,

    pub est_tokens: usize,

    pub text: String,

    pub char_len: usize,
}

/// The full chunking of one packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSet {
    pub source_id: String,

    /// The caller's budget, before the margin ratio is applied.
    pub max_tokens: usize,

    pub total_chunks: usize,

    pub total_est_tokens: usize,

    pub chunks: Vec<Chunk>,
}

impl ChunkSet {
    /// Build a set from finished chunks, computing the totals.
    pub fn new(source_id: impl Into<String>, max_tokens: usize, chunks: Vec<Chunk>) -> Self {
        let total_est_tokens = chunks.iter().map(|c| c.est_tokens).sum();
        Self {
            source_id: source_id.into(),
            max_tokens,
            total_chunks: chunks.len(),
            total_est_tokens,
            chunks,
        }
    }
}

/// A packet (or chunk set) reduced to a token budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactedPacket {
    pub source_id: String,
    pub original_url: String,
    pub compacted: CompactedBody,
    pub est_tokens: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactedBody {
    pub summary: String,

    pub key_points: Vec<CitedPoint>,

    pub important_quotes: Vec<CitedPoint>,

    /// Human-readable notes about content dropped to meet the budget.
    pub omissions: Vec<String>,

    pub warnings: Vec<super::Warning>,
}

/// A sentence or quote with its key-block citation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitedPoint {
    pub text: String,

    /// `block_id` of the first key block containing the text, or empty when
    /// no block matches.
    pub citation: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_set_totals() {
        let chunks = vec![
            Chunk {
                chunk_id: "abc:c0".into(),
                chunk_index: 0,
                headings_path: String::new(),
                est_tokens: 10,
                text: "one".into(),
                char_len: 3,
            },
            Chunk {
                chunk_id: "abc:c1".into(),
                chunk_index: 1,
                headings_path: "Intro".into(),
                est_tokens: 25,
                text: "two".into(),
                char_len: 3,
            },
        ];
        let set = ChunkSet::new("abc", 100, chunks);
        assert_eq!(set.total_chunks, 2);
        assert_eq!(set.total_est_tokens, 35);
    }
}
