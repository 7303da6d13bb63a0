//! Safe HTTP fetching for Quarry.
//!
//! [`Fetcher`] is the single entry point: protocol gate, SSRF guard, robots
//! policy, per-host rate admission, manual redirect handling, bounded body
//! streaming, and manual content decoding. Everything above it (extraction,
//! normalization) consumes the [`FetchResponse`] it returns.

pub mod cache;
pub mod http;
pub mod ratelimit;
pub mod render;
pub mod robots;
pub mod ssrf;
pub mod urls;

pub use http::{FetchOptions, FetchResponse, Fetcher, OversizePolicy};
pub use ratelimit::RateLimiter;
pub use render::{FetchMode, RenderBackend, RenderedPage};
pub use robots::{CrawlClock, RobotsCache, RobotsDecision};
