//! robots.txt policy: fetch, parse, cache, and enforce.
//!
//! Parsing is line-oriented and permissive. Directive support covers
//! `Allow`, `Disallow`, and `Crawl-delay`, with `*` wildcards and `$` end
//! anchors in path patterns. A path's verdict is decided by the longest
//! matching pattern; ties prefer `Allow`. Unreachable robots.txt (non-200,
//! network error, timeout) permits everything with no crawl delay.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use quarry_config::ResolvedConfig;
use url::Url;

use crate::cache::TtlCache;
use crate::urls;

/// Parsed robots.txt files are reused for 15 minutes per `(origin, UA)`.
pub const ROBOTS_CACHE_TTL: Duration = Duration::from_secs(15 * 60);

const ROBOTS_CACHE_CAPACITY: usize = 512;

/// robots.txt responses larger than this are cut at the last full line.
const MAX_ROBOTS_BYTES: usize = 512 * 1024;

/// Ceiling for the robots.txt fetch itself; a slow robots server must not
/// consume the whole request deadline.
const ROBOTS_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Verdict for one URL path.
#[derive(Debug, Clone, PartialEq)]
pub enum RobotsDecision {
    Allowed { crawl_delay: Option<Duration> },
    Denied { rule: String },
}

impl RobotsDecision {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, RobotsDecision::Allowed { .. })
    }
}

/// One `User-agent` group with its rules.
#[derive(Debug, Clone, Default)]
struct Group {
    /// Lowercased agent tokens naming this group.
    agents: Vec<String>,
    rules: Vec<Rule>,
    crawl_delay: Option<Duration>,
}

#[derive(Debug, Clone)]
struct Rule {
    allow: bool,
    pattern: String,
}

/// A parsed robots.txt file.
#[derive(Debug, Clone, Default)]
pub struct RobotsPolicy {
    groups: Vec<Group>,
}

impl RobotsPolicy {
    /// Parse robots.txt content. Never fails: unparsable lines are skipped.
    ///
    /// # Examples
    ///
    /// ```
    /// use quarry_fetch::robots::RobotsPolicy;
    ///
    /// let policy = RobotsPolicy::parse("User-agent: *\nDisallow: /private/\n");
    /// assert!(!policy.check("/private/x", "anybot", "anybot/1.0").is_allowed());
    /// assert!(policy.check("/public", "anybot", "anybot/1.0").is_allowed());
    /// ```
    #[must_use]
    pub fn parse(content: &str) -> Self {
        let content = content.strip_prefix('\u{FEFF}').unwrap_or(content);

        let mut groups: Vec<Group> = Vec::new();
        let mut current: Option<Group> = None;
        // Consecutive User-agent lines extend the upcoming group until a
        // rule directive closes the agent list.
        let mut agents_open = false;

        for line in content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            let directive = directive.trim().to_ascii_lowercase();
            let value = value.trim();

            match directive.as_str() {
                "user-agent" => {
                    if agents_open {
                        if let Some(group) = current.as_mut() {
                            group.agents.push(value.to_ascii_lowercase());
                        }
                    } else {
                        if let Some(group) = current.take() {
                            groups.push(group);
                        }
                        current = Some(Group {
                            agents: vec![value.to_ascii_lowercase()],
                            ..Default::default()
                        });
                        agents_open = true;
                    }
                }
                "allow" | "disallow" => {
                    agents_open = false;
                    if let Some(group) = current.as_mut() {
                        // An empty pattern matches nothing; "Disallow:" on
                        // its own line means allow-all.
                        if !value.is_empty() {
                            group.rules.push(Rule {
                                allow: directive == "allow",
                                pattern: value.to_string(),
                            });
                        }
                    }
                }
                "crawl-delay" => {
                    agents_open = false;
                    if let Some(group) = current.as_mut()
                        && let Ok(secs) = value.parse::<f64>()
                        && secs >= 0.0
                    {
                        group.crawl_delay = Some(Duration::from_secs_f64(secs));
                    }
                }
                _ => {}
            }
        }
        if let Some(group) = current.take() {
            groups.push(group);
        }

        Self { groups }
    }

    /// Decide whether `path` may be fetched by the given client.
    ///
    /// Group selection: blocks whose agent equals the normalized token or
    /// the full UA (case-insensitive) win over `*` blocks; with no matching
    /// block at all, everything is permitted.
    #[must_use]
    pub fn check(&self, path: &str, token: &str, full_ua: &str) -> RobotsDecision {
        let token = token.to_ascii_lowercase();
        let full_ua = full_ua.to_ascii_lowercase();

        let specific: Vec<&Group> = self
            .groups
            .iter()
            .filter(|g| g.agents.iter().any(|a| *a == token || *a == full_ua))
            .collect();
        let selected: Vec<&Group> = if specific.is_empty() {
            self.groups
                .iter()
                .filter(|g| g.agents.iter().any(|a| a == "*"))
                .collect()
        } else {
            specific
        };

        if selected.is_empty() {
            return RobotsDecision::Allowed { crawl_delay: None };
        }

        let crawl_delay = selected.iter().find_map(|g| g.crawl_delay);

        // Longest matching pattern wins; ties prefer Allow.
        let mut best: Option<(&Rule, usize)> = None;
        for rule in selected.iter().flat_map(|g| &g.rules) {
            if !path_matches(path, &rule.pattern) {
                continue;
            }
            let len = effective_length(&rule.pattern);
            let better = match best {
                None => true,
                Some((current, current_len)) => {
                    len > current_len || (len == current_len && rule.allow && !current.allow)
                }
            };
            if better {
                best = Some((rule, len));
            }
        }

        match best {
            Some((rule, _)) if !rule.allow => RobotsDecision::Denied {
                rule: rule.pattern.clone(),
            },
            _ => RobotsDecision::Allowed { crawl_delay },
        }
    }
}

/// Pattern length for precedence, ignoring `*` and `$`.
fn effective_length(pattern: &str) -> usize {
    pattern.chars().filter(|&c| c != '*' && c != '$').count()
}

/// Match a path against a robots pattern: prefix by default, `*` matches any
/// run of characters, `$` anchors the end.
fn path_matches(path: &str, pattern: &str) -> bool {
    let (pattern, anchored) = match pattern.strip_suffix('$') {
        Some(p) => (p, true),
        None => (pattern, false),
    };

    if !pattern.contains('*') {
        return if anchored {
            path == pattern
        } else {
            path.starts_with(pattern)
        };
    }

    let parts: Vec<&str> = pattern.split('*').collect();
    let mut pos = 0;

    if !parts[0].is_empty() {
        if !path.starts_with(parts[0]) {
            return false;
        }
        pos = parts[0].len();
    }

    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        match path[pos..].find(part) {
            Some(found) => pos += found + part.len(),
            None => return false,
        }
    }

    let last = parts[parts.len() - 1];
    if last.is_empty() {
        // Pattern ends with '*': anything (including nothing) matches.
        return true;
    }
    if anchored {
        path.ends_with(last) && path.len() - last.len() >= pos
    } else {
        path[pos..].contains(last)
    }
}

#[derive(Debug, Clone)]
enum CachedRobots {
    Policy(RobotsPolicy),
    /// Unreachable or malformed robots.txt.
    AllowAll,
}

/// Cache of parsed robots files keyed by `(origin, normalized UA token)`.
#[derive(Debug)]
pub struct RobotsCache {
    entries: TtlCache<(String, String), CachedRobots>,
}

impl Default for RobotsCache {
    fn default() -> Self {
        Self::new()
    }
}

impl RobotsCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: TtlCache::new(ROBOTS_CACHE_CAPACITY),
        }
    }

    /// Check a URL against its origin's robots.txt, fetching and caching
    /// the file as needed.
    pub async fn check(
        &self,
        client: &reqwest::Client,
        url: &Url,
        config: &ResolvedConfig,
    ) -> RobotsDecision {
        let origin = urls::origin_of(url);
        let token = config.robots_token();
        let key = (origin.clone(), token.clone());

        let cached = match self.entries.get(&key) {
            Some(entry) => entry,
            None => {
                let fetched = fetch_robots(client, &origin, config).await;
                self.entries.insert(key, fetched.clone(), ROBOTS_CACHE_TTL);
                fetched
            }
        };

        match cached {
            CachedRobots::AllowAll => RobotsDecision::Allowed { crawl_delay: None },
            CachedRobots::Policy(policy) => {
                let path = if url.path().is_empty() { "/" } else { url.path() };
                policy.check(path, &token, &config.user_agent)
            }
        }
    }

    /// Drop every cached robots file (test lifecycle).
    pub fn clear(&self) {
        self.entries.clear();
    }
}

/// Fetch and parse an origin's robots.txt. Every failure mode degrades to
/// allow-all; robots availability must never fail a fetch.
async fn fetch_robots(
    client: &reqwest::Client,
    origin: &str,
    config: &ResolvedConfig,
) -> CachedRobots {
    let robots_url = format!("{origin}/robots.txt");
    let timeout = config.timeout.min(ROBOTS_FETCH_TIMEOUT);

    let response = match client
        .get(&robots_url)
        .header(reqwest::header::USER_AGENT, config.user_agent.as_str())
        .timeout(timeout)
        .send()
        .await
    {
        Ok(resp) => resp,
        Err(e) => {
            tracing::debug!(origin, error = %e, "robots.txt unreachable, permitting");
            return CachedRobots::AllowAll;
        }
    };

    if response.status().as_u16() != 200 {
        return CachedRobots::AllowAll;
    }

    let body = match response.bytes().await {
        Ok(bytes) => bytes,
        Err(_) => return CachedRobots::AllowAll,
    };

    let mut body = body.to_vec();
    if body.len() > MAX_ROBOTS_BYTES {
        body.truncate(MAX_ROBOTS_BYTES);
        // Cut at the last complete line so a split directive cannot
        // misparse.
        if let Some(pos) = body.iter().rposition(|&b| b == b'\n') {
            body.truncate(pos + 1);
        }
    }

    let text = String::from_utf8_lossy(&body);
    CachedRobots::Policy(RobotsPolicy::parse(&text))
}

/// Per-(origin, UA) monotonic clock enforcing crawl delay.
///
/// Concurrent callers observe the same earliest-next instant; the clock
/// enforces a minimum inter-arrival time without serializing callers.
#[derive(Debug, Default)]
pub struct CrawlClock {
    last_request: RwLock<HashMap<(String, String), Instant>>,
}

impl CrawlClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep until the origin's crawl delay has elapsed since the last
    /// recorded request.
    pub async fn apply_crawl_delay(&self, origin: &str, ua: &str, delay: Duration) {
        if delay.is_zero() {
            return;
        }
        let wait = {
            let last = self
                .last_request
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            last.get(&(origin.to_string(), ua.to_string()))
                .and_then(|t| (*t + delay).checked_duration_since(Instant::now()))
        };
        if let Some(wait) = wait {
            tracing::debug!(origin, ua, wait_ms = wait.as_millis() as u64, "crawl delay");
            tokio::time::sleep(wait).await;
        }
    }

    /// Record that a request to the origin was just issued.
    pub fn mark_request(&self, origin: &str, ua: &str) {
        let mut last = self
            .last_request
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        last.insert((origin.to_string(), ua.to_string()), Instant::now());
    }
}
