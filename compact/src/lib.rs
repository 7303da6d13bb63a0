//! Compaction: reduce a packet or chunk set to a token budget.
//!
//! Four strategies ([`CompactMode`]) produce the summary; key points and
//! quotes are layered on top with key-block citations. The summary is
//! hard-capped at the budget: if assembly overshoots, it is truncated at a
//! clean boundary and the compaction carries a warning.

pub mod keypoints;
pub mod modes;
pub mod score;
pub mod sentences;

pub use modes::CompactMode;
pub use score::PreserveClass;

use quarry_chunk::{estimate_tokens, truncate_to_tokens};
use quarry_types::{ChunkSet, CompactedBody, CompactedPacket, Packet, Warning, WarningKind};

/// Compaction options.
#[derive(Debug, Clone, Default)]
pub struct CompactOptions {
    pub max_tokens: usize,

    /// Strategy; `None` picks structural for packets and map-reduce for
    /// chunk sets, or question-focused whenever a question is present.
    pub mode: Option<CompactMode>,

    pub question: Option<String>,

    /// Preserve-class names (`numbers`, `dates`, `names`, `definitions`,
    /// `procedures`); empty means the default set.
    pub preserve: Vec<String>,
}

impl CompactOptions {
    #[must_use]
    pub fn new(max_tokens: usize) -> Self {
        Self {
            max_tokens,
            ..Default::default()
        }
    }

    fn effective_mode(&self, default: CompactMode) -> CompactMode {
        match self.mode {
            Some(mode) => mode,
            None if self.question.is_some() => CompactMode::QuestionFocused,
            None => default,
        }
    }
}

/// Compact a packet.
#[must_use]
pub fn compact_packet(packet: &Packet, opts: &CompactOptions) -> CompactedPacket {
    let preserve = score::parse_preserve(&opts.preserve);
    let budget = opts.max_tokens.max(1);
    let mode = opts.effective_mode(CompactMode::Structural);

    let output = match mode {
        CompactMode::Structural => modes::structural(&packet.content, budget, &preserve),
        CompactMode::Salience => modes::by_salience(&packet.content, budget, &preserve),
        CompactMode::MapReduce => {
            // Without a chunk set, the packet itself is one chunk.
            modes::map_reduce(std::slice::from_ref(&packet.content), budget, &preserve)
        }
        CompactMode::QuestionFocused => modes::question_focused(
            &packet.content,
            budget,
            opts.question.as_deref(),
            &preserve,
        ),
    };

    assemble(
        packet.source_id.clone(),
        packet.original_url.clone(),
        output,
        budget,
        &preserve,
        &packet.content,
        &packet.key_blocks,
    )
}

/// Compact a chunk set. The packet it derived from is optional; when
/// present its key blocks drive citations and quote extraction.
#[must_use]
pub fn compact_chunks(
    chunks: &ChunkSet,
    packet: Option<&Packet>,
    opts: &CompactOptions,
) -> CompactedPacket {
    let preserve = score::parse_preserve(&opts.preserve);
    let budget = opts.max_tokens.max(1);
    let mode = opts.effective_mode(CompactMode::MapReduce);

    let texts: Vec<String> = chunks.chunks.iter().map(|c| c.text.clone()).collect();
    let joined = texts.join("\n\n");

    let output = match mode {
        CompactMode::MapReduce => modes::map_reduce(&texts, budget, &preserve),
        CompactMode::Structural => modes::structural(&joined, budget, &preserve),
        CompactMode::Salience => modes::by_salience(&joined, budget, &preserve),
        CompactMode::QuestionFocused => {
            modes::question_focused(&joined, budget, opts.question.as_deref(), &preserve)
        }
    };

    let (content, key_blocks): (&str, &[quarry_types::KeyBlock]) = match packet {
        Some(p) => (p.content.as_str(), p.key_blocks.as_slice()),
        None => (joined.as_str(), &[]),
    };
    let original_url = packet.map(|p| p.original_url.clone()).unwrap_or_default();

    assemble(
        chunks.source_id.clone(),
        original_url,
        output,
        budget,
        &preserve,
        content,
        key_blocks,
    )
}

fn assemble(
    source_id: String,
    original_url: String,
    output: modes::ModeOutput,
    budget: usize,
    preserve: &std::collections::HashSet<PreserveClass>,
    content: &str,
    key_blocks: &[quarry_types::KeyBlock],
) -> CompactedPacket {
    let mut warnings = output.warnings;
    let mut summary = output.summary;

    if estimate_tokens(&summary) > budget {
        let cut = truncate_to_tokens(&summary, budget);
        summary = cut.text;
        warnings.push(Warning::new(
            WarningKind::Truncated,
            "summary exceeded the token budget and was truncated",
        ));
    }

    let key_points = keypoints::key_points(&summary, preserve, key_blocks);
    let important_quotes = keypoints::important_quotes(content, key_blocks);
    let est_tokens = estimate_tokens(&summary);

    CompactedPacket {
        source_id,
        original_url,
        compacted: CompactedBody {
            summary,
            key_points,
            important_quotes,
            omissions: output.omissions,
            warnings,
        },
        est_tokens,
    }
}
