//! Configuration for the Quarry pipeline.
//!
//! [`QuarryConfig`] is the boundary form: every knob optional, populated from
//! the environment or by a caller. [`ResolvedConfig`] is the invariant-safe
//! form handed to the pipeline: no `Option`s, every value clamped to its
//! documented bounds.

mod resolved;

pub use resolved::ResolvedConfig;

use serde::Deserialize;

/// Boundary configuration. Unset fields fall back to the `DEFAULT_*` consts;
/// out-of-bounds values are clamped at resolution time.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuarryConfig {
    /// Decoded-body size cap in bytes.
    pub max_bytes: Option<u64>,

    /// Per-request deadline in milliseconds.
    pub timeout_ms: Option<u64>,

    /// Redirect hops to follow (initial URL is hop 0).
    pub max_redirects: Option<u32>,

    /// Sliding-window admission limit per host per minute.
    pub rate_limit_per_host: Option<u32>,

    /// Reject private/reserved IP destinations. Default: true.
    pub block_private_ip: Option<bool>,

    /// When non-empty, only these domains (and their subdomains) are fetchable.
    pub allowlist_domains: Option<Vec<String>>,

    /// Consult robots.txt before fetching. Default: true.
    pub respect_robots: Option<bool>,

    /// User-Agent header for all outbound requests.
    pub user_agent: Option<String>,

    /// Default token budget for chunking and compaction.
    pub default_max_tokens: Option<usize>,

    /// Fraction of the chunk budget reserved as headroom.
    pub chunk_margin_ratio: Option<f64>,

    /// TTL for the fetch cache and resource store, in seconds. 0 disables
    /// the fetch cache.
    pub cache_ttl_s: Option<u64>,

    /// Whether the PDF extractor is available. Default: true.
    pub pdf_enabled: Option<bool>,
}

impl QuarryConfig {
    pub const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024;
    pub const MIN_MAX_BYTES: u64 = 1024;
    pub const MAX_MAX_BYTES: u64 = 100 * 1024 * 1024;

    pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
    pub const MIN_TIMEOUT_MS: u64 = 1_000;
    pub const MAX_TIMEOUT_MS: u64 = 300_000;

    pub const DEFAULT_MAX_REDIRECTS: u32 = 5;
    pub const MAX_MAX_REDIRECTS: u32 = 20;

    pub const DEFAULT_RATE_LIMIT_PER_HOST: u32 = 60;
    pub const MIN_RATE_LIMIT_PER_HOST: u32 = 1;
    pub const MAX_RATE_LIMIT_PER_HOST: u32 = 1000;

    pub const DEFAULT_USER_AGENT: &'static str = "quarry-fetch/1.0 (+https://quarry.dev/bot)";

    pub const DEFAULT_MAX_TOKENS: usize = 4000;
    pub const MIN_MAX_TOKENS: usize = 100;

    pub const DEFAULT_CHUNK_MARGIN_RATIO: f64 = 0.10;
    pub const MAX_CHUNK_MARGIN_RATIO: f64 = 0.5;

    pub const DEFAULT_CACHE_TTL_S: u64 = 300;

    /// Read configuration from `QUARRY_*` environment variables.
    ///
    /// Unparsable values are ignored with a warning rather than failing
    /// startup; resolution falls back to the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            max_bytes: env_parse("QUARRY_MAX_BYTES"),
            timeout_ms: env_parse("QUARRY_TIMEOUT_MS"),
            max_redirects: env_parse("QUARRY_MAX_REDIRECTS"),
            rate_limit_per_host: env_parse("QUARRY_RATE_LIMIT_PER_HOST"),
            block_private_ip: env_bool("QUARRY_BLOCK_PRIVATE_IP"),
            allowlist_domains: env_list("QUARRY_ALLOWLIST_DOMAINS"),
            respect_robots: env_bool("QUARRY_RESPECT_ROBOTS"),
            user_agent: env_string("QUARRY_USER_AGENT"),
            default_max_tokens: env_parse("QUARRY_DEFAULT_MAX_TOKENS"),
            chunk_margin_ratio: env_parse("QUARRY_CHUNK_MARGIN_RATIO"),
            cache_ttl_s: env_parse("QUARRY_CACHE_TTL_S"),
            pdf_enabled: env_bool("QUARRY_PDF_ENABLED"),
        }
    }

    #[must_use]
    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
            .unwrap_or(Self::DEFAULT_MAX_BYTES)
            .clamp(Self::MIN_MAX_BYTES, Self::MAX_MAX_BYTES)
    }

    #[must_use]
    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
            .unwrap_or(Self::DEFAULT_TIMEOUT_MS)
            .clamp(Self::MIN_TIMEOUT_MS, Self::MAX_TIMEOUT_MS)
    }

    #[must_use]
    pub fn max_redirects(&self) -> u32 {
        self.max_redirects
            .unwrap_or(Self::DEFAULT_MAX_REDIRECTS)
            .min(Self::MAX_MAX_REDIRECTS)
    }

    #[must_use]
    pub fn rate_limit_per_host(&self) -> u32 {
        self.rate_limit_per_host
            .unwrap_or(Self::DEFAULT_RATE_LIMIT_PER_HOST)
            .clamp(Self::MIN_RATE_LIMIT_PER_HOST, Self::MAX_RATE_LIMIT_PER_HOST)
    }

    #[must_use]
    pub fn block_private_ip(&self) -> bool {
        self.block_private_ip.unwrap_or(true)
    }

    #[must_use]
    pub fn respect_robots(&self) -> bool {
        self.respect_robots.unwrap_or(true)
    }

    #[must_use]
    pub fn user_agent(&self) -> String {
        self.user_agent
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| Self::DEFAULT_USER_AGENT.to_string())
    }

    #[must_use]
    pub fn default_max_tokens(&self) -> usize {
        self.default_max_tokens
            .unwrap_or(Self::DEFAULT_MAX_TOKENS)
            .max(Self::MIN_MAX_TOKENS)
    }

    #[must_use]
    pub fn chunk_margin_ratio(&self) -> f64 {
        self.chunk_margin_ratio
            .unwrap_or(Self::DEFAULT_CHUNK_MARGIN_RATIO)
            .clamp(0.0, Self::MAX_CHUNK_MARGIN_RATIO)
    }

    #[must_use]
    pub fn cache_ttl_s(&self) -> u64 {
        self.cache_ttl_s.unwrap_or(Self::DEFAULT_CACHE_TTL_S)
    }

    #[must_use]
    pub fn pdf_enabled(&self) -> bool {
        self.pdf_enabled.unwrap_or(true)
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env_string(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable configuration value");
            None
        }
    }
}

fn env_bool(key: &str) -> Option<bool> {
    let raw = env_string(key)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            tracing::warn!(key, value = %raw, "ignoring unparsable boolean");
            None
        }
    }
}

fn env_list(key: &str) -> Option<Vec<String>> {
    let raw = env_string(key)?;
    let items: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect();
    if items.is_empty() { None } else { Some(items) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_apply() {
        let config = QuarryConfig::default();
        assert_eq!(config.max_bytes(), 10 * 1024 * 1024);
        assert_eq!(config.timeout_ms(), 30_000);
        assert_eq!(config.max_redirects(), 5);
        assert_eq!(config.rate_limit_per_host(), 60);
        assert!(config.block_private_ip());
        assert!(config.respect_robots());
        assert_eq!(config.default_max_tokens(), 4000);
        assert!((config.chunk_margin_ratio() - 0.10).abs() < f64::EPSILON);
        assert!(config.pdf_enabled());
    }

    #[test]
    fn bounds_clamp() {
        let config = QuarryConfig {
            max_bytes: Some(1),
            timeout_ms: Some(10_000_000),
            max_redirects: Some(99),
            rate_limit_per_host: Some(0),
            default_max_tokens: Some(10),
            chunk_margin_ratio: Some(0.9),
            ..Default::default()
        };
        assert_eq!(config.max_bytes(), QuarryConfig::MIN_MAX_BYTES);
        assert_eq!(config.timeout_ms(), QuarryConfig::MAX_TIMEOUT_MS);
        assert_eq!(config.max_redirects(), QuarryConfig::MAX_MAX_REDIRECTS);
        assert_eq!(config.rate_limit_per_host(), 1);
        assert_eq!(config.default_max_tokens(), 100);
        assert!((config.chunk_margin_ratio() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn blank_user_agent_falls_back() {
        let config = QuarryConfig {
            user_agent: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(config.user_agent(), QuarryConfig::DEFAULT_USER_AGENT);
    }
}
