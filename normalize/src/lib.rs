//! Normalization: turn a fetched response into a content packet.
//!
//! The packet is assembled from the extractors' Markdown plus the
//! annotations computed here: outline, key blocks, injection detections,
//! source summary, hashes, and the stable source id.

pub mod blocks;
pub mod injection;
pub mod normalizer;
pub mod outline;
pub mod summary;

pub use normalizer::{NormalizeOptions, normalize, normalize_raw};
