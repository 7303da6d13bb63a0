//! The content packet and its constituent parts.

use serde::{Deserialize, Serialize};

/// Normalized, fully-annotated content produced by the normalizer.
///
/// Packets are immutable after creation: the chunker and compactor read them
/// and produce new values, never mutate in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    /// Stable 16-hex-char identifier: first 16 hex digits of
    /// `SHA-256(canonical_url | YYYY-MM-DD | content_hash)`.
    pub source_id: String,

    /// URL exactly as the caller supplied it.
    pub original_url: String,

    /// Tracking-stripped, sorted-query, lowercased-host form of the final URL.
    pub canonical_url: String,

    /// Fetch time, RFC 3339 UTC.
    pub retrieved_at: String,

    /// HTTP status of the final response (0 for raw-bytes extraction).
    pub status: u16,

    /// MIME type without parameters, e.g. `text/html`.
    pub content_type: String,

    pub metadata: PacketMetadata,

    /// Heading tree in document order.
    pub outline: Vec<OutlineEntry>,

    /// Semantically typed blocks, the unit of chunking and citation.
    pub key_blocks: Vec<KeyBlock>,

    /// Normalized Markdown body.
    pub content: String,

    /// Short human-readable facts: topics, key numbers, dates, word count.
    pub source_summary: Vec<String>,

    /// Populated by chunking; empty at packet creation.
    pub citations: Vec<Citation>,

    /// Prompt-injection hits with surrounding context. Never removed from
    /// `content`; surfaced here for the caller to judge.
    pub unsafe_instructions_detected: Vec<InjectionHit>,

    pub warnings: Vec<Warning>,

    pub hashes: Hashes,

    /// First ≤1000 bytes of the decoded body, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_excerpt: Option<String>,

    /// PNG screenshot from a rendering fetcher, when one supplied it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot_base64: Option<String>,
}

/// Document metadata harvested during extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PacketMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,

    /// BCP-47 language tag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// `ceil(words / 225)`, minimum 1.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_reading_time_min: Option<u32>,
}

/// One heading in the document outline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineEntry {
    /// ATX level, 1..=6.
    pub level: u8,

    /// Heading text without the `#` markers.
    pub text: String,

    /// Ancestor headings joined by `" > "`, ending with this heading.
    pub path: String,
}

/// A semantically typed contiguous range of the normalized Markdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyBlock {
    /// `"b"` + zero-based index; unique within a packet.
    pub block_id: String,

    pub kind: BlockKind,

    pub text: String,

    pub char_len: usize,
}

/// Kind of a [`KeyBlock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Heading,
    Paragraph,
    List,
    Code,
    Table,
    Quote,
    Meta,
}

/// Character span within the normalized Markdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharSpan {
    pub start_char: usize,
    pub end_char: usize,
}

/// Citation anchor mapping a derived view back to a key block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub block_id: String,
    pub loc: CharSpan,
}

/// A prompt-injection pattern match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectionHit {
    /// Matched text with a ±50-char context window, `"..."`-marked when cut.
    pub text: String,

    /// Why the pattern is considered an injection attempt.
    pub reason: String,
}

/// Non-fatal condition attached to a packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    #[serde(rename = "type")]
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Closed set of warning types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    Truncated,
    Paywalled,
    LowConfidenceDate,
    ScannedPdf,
    RenderTimeout,
    ExtractionFallback,
    RateLimited,
    RobotsBlocked,
    InjectionDetected,
}

/// Content fingerprints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hashes {
    /// SHA-256 hex of the normalized Markdown.
    pub content_hash: String,

    /// SHA-256 hex of the raw response bytes.
    pub raw_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn warning_serializes_with_type_key() {
        let w = Warning::new(WarningKind::ScannedPdf, "avg 12 chars/page");
        let json = serde_json::to_value(&w).unwrap();
        assert_eq!(json["type"], "scanned_pdf");
        assert_eq!(json["message"], "avg 12 chars/page");
    }

    #[test]
    fn block_kind_snake_case() {
        let json = serde_json::to_value(BlockKind::Code).unwrap();
        assert_eq!(json, "code");
    }

    #[test]
    fn optional_fields_omitted() {
        let meta = PacketMetadata::default();
        let json = serde_json::to_string(&meta).unwrap();
        assert_eq!(json, "{}");
    }
}
