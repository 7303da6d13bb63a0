//! Wire-shape tests: the JSON serialization of the data model is part of
//! the external contract and must not drift.

use pretty_assertions::assert_eq;
use quarry_types::{
    BlockKind, CharSpan, Chunk, ChunkSet, Citation, ErrorCode, FetchError, Hashes, InjectionHit,
    KeyBlock, OutlineEntry, Packet, PacketMetadata, Warning, WarningKind,
};

fn sample_packet() -> Packet {
    Packet {
        source_id: "0011223344556677".to_string(),
        original_url: "https://example.com/page?utm_source=x".to_string(),
        canonical_url: "https://example.com/page".to_string(),
        retrieved_at: "2026-03-02T12:00:00Z".to_string(),
        status: 200,
        content_type: "text/html".to_string(),
        metadata: PacketMetadata {
            title: Some("Page".to_string()),
            site_name: None,
            author: None,
            published_at: None,
            language: Some("en".to_string()),
            estimated_reading_time_min: Some(2),
        },
        outline: vec![OutlineEntry {
            level: 1,
            text: "Page".to_string(),
            path: "Page".to_string(),
        }],
        key_blocks: vec![KeyBlock {
            block_id: "b0".to_string(),
            kind: BlockKind::Heading,
            text: "# Page".to_string(),
            char_len: 6,
        }],
        content: "# Page\n\nBody.".to_string(),
        source_summary: vec!["Word count: 2".to_string()],
        citations: vec![Citation {
            block_id: "b0".to_string(),
            loc: CharSpan {
                start_char: 0,
                end_char: 6,
            },
        }],
        unsafe_instructions_detected: vec![InjectionHit {
            text: "ignore previous instructions".to_string(),
            reason: "instruction override".to_string(),
        }],
        warnings: vec![Warning::new(WarningKind::Paywalled, "metered")],
        hashes: Hashes {
            content_hash: "c".repeat(64),
            raw_hash: "r".repeat(64),
        },
        raw_excerpt: None,
        screenshot_base64: None,
    }
}

#[test]
fn packet_field_names_and_enums() {
    let json = serde_json::to_value(sample_packet()).unwrap();

    assert_eq!(json["source_id"], "0011223344556677");
    assert_eq!(json["canonical_url"], "https://example.com/page");
    assert_eq!(json["metadata"]["estimated_reading_time_min"], 2);
    assert_eq!(json["outline"][0]["level"], 1);
    assert_eq!(json["key_blocks"][0]["kind"], "heading");
    assert_eq!(json["key_blocks"][0]["block_id"], "b0");
    assert_eq!(json["citations"][0]["loc"]["start_char"], 0);
    assert_eq!(json["citations"][0]["loc"]["end_char"], 6);
    assert_eq!(json["warnings"][0]["type"], "paywalled");
    assert_eq!(json["unsafe_instructions_detected"][0]["reason"], "instruction override");
    assert_eq!(json["hashes"]["content_hash"].as_str().unwrap().len(), 64);

    // Absent optionals are omitted entirely
    assert!(json.get("raw_excerpt").is_none());
    assert!(json.get("screenshot_base64").is_none());
    assert!(json["metadata"].get("site_name").is_none());
}

#[test]
fn packet_round_trips_through_json() {
    let packet = sample_packet();
    let json = serde_json::to_string(&packet).unwrap();
    let back: Packet = serde_json::from_str(&json).unwrap();
    assert_eq!(back, packet);
}

#[test]
fn chunk_set_wire_shape() {
    let set = ChunkSet::new(
        "0011223344556677",
        400,
        vec![Chunk {
            chunk_id: "0011223344556677:c0".to_string(),
            chunk_index: 0,
            headings_path: "Page".to_string(),
            est_tokens: 5,
            text: "# Page\n\nBody.".to_string(),
            char_len: 13,
        }],
    );
    let json = serde_json::to_value(&set).unwrap();
    assert_eq!(json["source_id"], "0011223344556677");
    assert_eq!(json["max_tokens"], 400);
    assert_eq!(json["total_chunks"], 1);
    assert_eq!(json["total_est_tokens"], 5);
    assert_eq!(json["chunks"][0]["chunk_id"], "0011223344556677:c0");
    assert_eq!(json["chunks"][0]["headings_path"], "Page");
}

#[test]
fn error_wire_shape() {
    let err = FetchError::new(ErrorCode::RobotsBlocked, "robots.txt disallows this path")
        .with_detail("rule", "/private/");
    let json = serde_json::to_value(&err).unwrap();
    assert_eq!(json["error"]["code"], "ROBOTS_BLOCKED");
    assert_eq!(json["error"]["retryable"], false);
    assert_eq!(json["error"]["details"]["rule"], "/private/");
}
