//! Token-bounded chunking of content packets.
//!
//! [`chunk`] splits a packet into chunks that respect key-block boundaries
//! and the effective budget `max_tokens · (1 − margin_ratio)`. Token counts
//! come from the character-based estimator in [`tokens`]; no tokenizer is
//! involved.

pub mod chunker;
pub mod split;
pub mod tokens;

pub use chunker::{ChunkOptions, ChunkStrategy, chunk, with_citations};
pub use tokens::{Truncated, estimate_tokens, truncate_to_tokens};
