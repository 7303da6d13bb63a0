//! Shared data model for Quarry.
//!
//! A [`Packet`] is the canonical output of normalization: cleaned Markdown
//! plus outline, typed key blocks, injection annotations, and hashes.
//! [`ChunkSet`] and [`CompactedPacket`] are derived views. Everything here is
//! plain data with serde derives; behavior lives in the pipeline crates.

mod derived;
mod error;
mod packet;

pub use derived::{Chunk, ChunkSet, CitedPoint, CompactedBody, CompactedPacket};
pub use error::{ErrorCode, ErrorDetails, FetchError};
pub use packet::{
    BlockKind, CharSpan, Citation, Hashes, InjectionHit, KeyBlock, OutlineEntry, Packet,
    PacketMetadata, Warning, WarningKind,
};
