//! Invariant-safe resolved configuration.
//!
//! Converts the optional, boundary-level [`QuarryConfig`] into the concrete
//! representation the pipeline consumes: no `Option`s, bounds already
//! applied, durations as `Duration`.

use std::time::Duration;

use crate::QuarryConfig;

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub max_bytes: u64,
    pub timeout: Duration,
    pub max_redirects: u32,
    pub rate_limit_per_host: u32,
    pub block_private_ip: bool,
    /// Lowercased allowlist entries; empty means every public host is allowed.
    pub allowlist_domains: Vec<String>,
    pub respect_robots: bool,
    pub user_agent: String,
    pub default_max_tokens: usize,
    pub chunk_margin_ratio: f64,
    pub cache_ttl: Duration,
    pub pdf_enabled: bool,
}

impl ResolvedConfig {
    #[must_use]
    pub fn from_config(config: &QuarryConfig) -> Self {
        let allowlist_domains = config
            .allowlist_domains
            .clone()
            .unwrap_or_default()
            .into_iter()
            .map(|d| d.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|d| !d.is_empty())
            .collect();

        Self {
            max_bytes: config.max_bytes(),
            timeout: Duration::from_millis(config.timeout_ms()),
            max_redirects: config.max_redirects(),
            rate_limit_per_host: config.rate_limit_per_host(),
            block_private_ip: config.block_private_ip(),
            allowlist_domains,
            respect_robots: config.respect_robots(),
            user_agent: config.user_agent(),
            default_max_tokens: config.default_max_tokens(),
            chunk_margin_ratio: config.chunk_margin_ratio(),
            cache_ttl: Duration::from_secs(config.cache_ttl_s()),
            pdf_enabled: config.pdf_enabled(),
        }
    }

    /// The robots.txt matching token: the product segment of the UA string,
    /// filtered to the characters robots.txt groups actually use.
    #[must_use]
    pub fn robots_token(&self) -> String {
        let token = self.user_agent.split('/').next().unwrap_or("");
        let filtered: String = token
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .collect();
        if filtered.is_empty() {
            "quarry-fetch".to_string()
        } else {
            filtered
        }
    }
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self::from_config(&QuarryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowlist_normalized() {
        let config = QuarryConfig {
            allowlist_domains: Some(vec![
                " Example.COM ".to_string(),
                ".docs.rs".to_string(),
                String::new(),
            ]),
            ..Default::default()
        };
        let resolved = ResolvedConfig::from_config(&config);
        assert_eq!(resolved.allowlist_domains, vec!["example.com", "docs.rs"]);
    }

    #[test]
    fn robots_token_from_user_agent() {
        let config = QuarryConfig {
            user_agent: Some("SpecialBot/2.0 (contact@example.com)".to_string()),
            ..Default::default()
        };
        let resolved = ResolvedConfig::from_config(&config);
        assert_eq!(resolved.robots_token(), "SpecialBot");
    }

    #[test]
    fn robots_token_fallback() {
        let config = QuarryConfig {
            user_agent: Some("///".to_string()),
            ..Default::default()
        };
        // "///" is non-blank so it survives as the UA, but yields no token chars
        let resolved = ResolvedConfig::from_config(&config);
        assert_eq!(resolved.robots_token(), "quarry-fetch");
    }
}
