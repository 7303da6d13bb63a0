//! The bounded HTTP fetcher.
//!
//! Redirects are followed manually so each hop re-runs the SSRF and robots
//! checks; the body is streamed against `max_bytes`; `Content-Encoding` is
//! decoded manually (reqwest's transparent decompression is off) so a
//! truncated compressed stream is detected instead of silently corrupting.

use std::collections::{BTreeMap, HashSet};
use std::io::Read;
use std::time::Duration;

use futures_util::StreamExt;
use quarry_config::ResolvedConfig;
use quarry_types::{ErrorCode, FetchError};
use sha2::{Digest, Sha256};
use url::Url;

use crate::cache::TtlCache;
use crate::ratelimit::RateLimiter;
use crate::robots::{CrawlClock, RobotsCache, RobotsDecision};
use crate::{ssrf, urls};

const FETCH_CACHE_CAPACITY: usize = 256;
const MAX_RETRIES: u32 = 3;
const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(10);

/// What to do when the decoded body would exceed `max_bytes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OversizePolicy {
    /// Fail the fetch with `CONTENT_TOO_LARGE`.
    #[default]
    Fail,
    /// Keep the first `max_bytes` bytes and mark the response truncated.
    /// Only possible for identity-encoded bodies; a truncated compressed
    /// stream always fails.
    Truncate,
}

/// Per-call options layered over the resolved configuration.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Extra request headers; these win over the built-in defaults.
    pub headers: Vec<(String, String)>,

    pub max_bytes: Option<u64>,

    pub max_redirects: Option<u32>,

    pub oversize: OversizePolicy,

    /// Bypass the fetch cache for this call.
    pub no_cache: bool,
}

/// The final response of a fetch, after redirects and decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,

    /// Response headers, keys lowercased, first value wins. When the body
    /// was decoded, `content-encoding` and `content-length` are removed
    /// since they no longer describe it.
    pub headers: BTreeMap<String, String>,

    pub body: Vec<u8>,

    /// URL of the final hop.
    pub final_url: String,

    /// Raw `Content-Type` header value, if present.
    pub content_type: Option<String>,

    /// Body was cut at `max_bytes` (identity encoding, truncate policy).
    pub truncated: bool,
}

/// The safe fetcher: one instance owns the HTTP client, rate limiter,
/// robots cache, crawl clock, and fetch cache.
pub struct Fetcher {
    client: reqwest::Client,
    config: ResolvedConfig,
    limiter: RateLimiter,
    robots: RobotsCache,
    crawl_clock: CrawlClock,
    cache: TtlCache<String, FetchResponse>,
}

impl Fetcher {
    pub fn new(config: ResolvedConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| {
                FetchError::new(
                    ErrorCode::UnexpectedError,
                    format!("failed to build HTTP client: {e}"),
                )
            })?;

        Ok(Self {
            client,
            limiter: RateLimiter::new(config.rate_limit_per_host),
            robots: RobotsCache::new(),
            crawl_clock: CrawlClock::new(),
            cache: TtlCache::new(FETCH_CACHE_CAPACITY),
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// Fetch a URL under the full safety contract.
    pub async fn fetch(&self, raw_url: &str, opts: &FetchOptions) -> Result<FetchResponse, FetchError> {
        let url = Url::parse(raw_url).map_err(|e| {
            FetchError::new(ErrorCode::InvalidUrl, format!("failed to parse URL: {e}"))
                .with_detail("url", raw_url.to_string())
        })?;
        if !urls::is_allowed_protocol(&url) {
            return Err(FetchError::new(
                ErrorCode::InvalidProtocol,
                format!("protocol {} is not fetchable, only http and https", url.scheme()),
            )
            .with_detail("url", raw_url.to_string()));
        }

        let cache_key = self.cache_key(raw_url, opts);
        let cache_enabled = !self.config.cache_ttl.is_zero() && !opts.no_cache;
        if cache_enabled
            && let Some(hit) = self.cache.get(&cache_key)
        {
            tracing::debug!(url = raw_url, "fetch cache hit");
            return Ok(hit);
        }

        let response = self.fetch_uncached(url, opts).await?;

        if cache_enabled {
            self.cache
                .insert(cache_key, response.clone(), self.config.cache_ttl);
        }
        Ok(response)
    }

    /// Fetch with retries for transient failures only: capped exponential
    /// backoff, same call re-issued unchanged.
    pub async fn fetch_with_retry(
        &self,
        raw_url: &str,
        opts: &FetchOptions,
    ) -> Result<FetchResponse, FetchError> {
        let mut attempt = 0u32;
        loop {
            match self.fetch(raw_url, opts).await {
                Ok(response) => return Ok(response),
                Err(err) if err.retryable && attempt < MAX_RETRIES => {
                    let backoff = MAX_RETRY_BACKOFF.min(Duration::from_secs(1u64 << attempt));
                    tracing::debug!(
                        url = raw_url,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        code = %err.code,
                        "retrying fetch"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Run the policy gates for a URL without issuing the request:
    /// protocol, SSRF, robots (with crawl delay), and rate admission.
    /// Rendering backends go through this before being handed a URL.
    pub async fn preflight(&self, raw_url: &str) -> Result<(), FetchError> {
        let url = Url::parse(raw_url).map_err(|e| {
            FetchError::new(ErrorCode::InvalidUrl, format!("failed to parse URL: {e}"))
                .with_detail("url", raw_url.to_string())
        })?;
        if !urls::is_allowed_protocol(&url) {
            return Err(FetchError::new(
                ErrorCode::InvalidProtocol,
                format!("protocol {} is not fetchable, only http and https", url.scheme()),
            )
            .with_detail("url", raw_url.to_string()));
        }

        ssrf::check_url(&url, &self.config).await?;

        let token = self.config.robots_token();
        if self.config.respect_robots {
            match self.robots.check(&self.client, &url, &self.config).await {
                RobotsDecision::Denied { rule } => {
                    return Err(FetchError::new(
                        ErrorCode::RobotsBlocked,
                        format!("robots.txt disallows this path: {rule}"),
                    )
                    .with_detail("url", url.to_string())
                    .with_detail("rule", rule));
                }
                RobotsDecision::Allowed { crawl_delay } => {
                    if let Some(delay) = crawl_delay {
                        self.crawl_clock
                            .apply_crawl_delay(&urls::origin_of(&url), &token, delay)
                            .await;
                    }
                }
            }
        }

        let host = url.host_str().unwrap_or_default().to_string();
        self.limiter.wait_for(&host, self.config.timeout).await?;
        self.limiter.record_request(&host);
        self.crawl_clock.mark_request(&urls::origin_of(&url), &token);
        Ok(())
    }

    async fn fetch_uncached(
        &self,
        mut url: Url,
        opts: &FetchOptions,
    ) -> Result<FetchResponse, FetchError> {
        let max_bytes = opts.max_bytes.unwrap_or(self.config.max_bytes) as usize;
        let max_redirects = opts.max_redirects.unwrap_or(self.config.max_redirects);
        let token = self.config.robots_token();

        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(url.to_string());
        let mut redirects = 0u32;

        loop {
            ssrf::check_url(&url, &self.config).await?;

            if self.config.respect_robots {
                match self.robots.check(&self.client, &url, &self.config).await {
                    RobotsDecision::Denied { rule } => {
                        return Err(FetchError::new(
                            ErrorCode::RobotsBlocked,
                            format!("robots.txt disallows this path: {rule}"),
                        )
                        .with_detail("url", url.to_string())
                        .with_detail("rule", rule));
                    }
                    RobotsDecision::Allowed { crawl_delay } => {
                        if let Some(delay) = crawl_delay {
                            self.crawl_clock
                                .apply_crawl_delay(&urls::origin_of(&url), &token, delay)
                                .await;
                        }
                    }
                }
            }

            let host = url.host_str().unwrap_or_default().to_string();
            self.limiter.wait_for(&host, self.config.timeout).await?;
            self.limiter.record_request(&host);
            self.crawl_clock.mark_request(&urls::origin_of(&url), &token);

            let response = self.send(&url, opts).await?;
            let status = response.status().as_u16();

            if (300..400).contains(&status) {
                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                drop(response);

                if location.is_empty() {
                    return Err(FetchError::new(
                        ErrorCode::InvalidRedirect,
                        format!("redirect from {url} carries no Location header"),
                    )
                    .with_detail("url", url.to_string()));
                }
                let next = url.join(&location).map_err(|e| {
                    FetchError::new(
                        ErrorCode::InvalidRedirect,
                        format!("unresolvable redirect target {location}: {e}"),
                    )
                    .with_detail("location", location.clone())
                })?;
                if !urls::is_allowed_protocol(&next) {
                    return Err(FetchError::new(
                        ErrorCode::InvalidRedirect,
                        format!("redirect to non-http(s) URL {next}"),
                    )
                    .with_detail("location", next.to_string()));
                }
                if !visited.insert(next.to_string()) {
                    return Err(FetchError::new(
                        ErrorCode::RedirectLoop,
                        format!("redirect loop through {next}"),
                    )
                    .with_detail("url", next.to_string()));
                }
                if redirects >= max_redirects {
                    return Err(FetchError::new(
                        ErrorCode::TooManyRedirects,
                        format!("more than {max_redirects} redirects"),
                    )
                    .with_detail("last_url", next.to_string()));
                }
                redirects += 1;
                url = next;
                continue;
            }

            if status >= 400 {
                let retry_after = parse_retry_after(response.headers());
                // Drain so the connection can be reused.
                let _ = response.bytes().await;

                if status == 429 {
                    self.limiter.record_error(&host, retry_after);
                } else if status >= 500 {
                    self.limiter.record_error(&host, None);
                }

                return Err(FetchError::new(
                    ErrorCode::Http(status),
                    format!("upstream returned HTTP {status} for {url}"),
                )
                .with_detail("url", url.to_string()));
            }

            return finish_response(response, url, max_bytes, opts.oversize).await;
        }
    }

    async fn send(&self, url: &Url, opts: &FetchOptions) -> Result<reqwest::Response, FetchError> {
        let mut request = self
            .client
            .get(url.clone())
            .timeout(self.config.timeout)
            .header(reqwest::header::USER_AGENT, self.config.user_agent.as_str())
            .header(
                reqwest::header::ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .header(reqwest::header::ACCEPT_ENCODING, "gzip, deflate");

        for (name, value) in &opts.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        request.send().await.map_err(|e| {
            FetchError::new(ErrorCode::FetchError, format!("request to {url} failed: {e}"))
                .with_detail("url", url.to_string())
        })
    }

    fn cache_key(&self, raw_url: &str, opts: &FetchOptions) -> String {
        let mut headers: Vec<String> = opts
            .headers
            .iter()
            .map(|(k, v)| format!("{}:{}", k.to_ascii_lowercase(), v))
            .collect();
        headers.sort();

        let mut hasher = Sha256::new();
        hasher.update(urls::normalize(raw_url));
        hasher.update(b"|");
        hasher.update(&self.config.user_agent);
        hasher.update(b"|");
        hasher.update(headers.join("\n"));
        hasher.update(b"|");
        hasher.update(
            opts.max_bytes
                .unwrap_or(self.config.max_bytes)
                .to_be_bytes(),
        );
        hasher.update(
            opts.max_redirects
                .unwrap_or(self.config.max_redirects)
                .to_be_bytes(),
        );
        format!("{:x}", hasher.finalize())
    }

    /// Drop all cached fetch responses and robots files (test lifecycle).
    pub fn reset_caches(&self) {
        self.cache.clear();
        self.robots.clear();
    }
}

/// Stream the body, decode it, and scrub headers that no longer apply.
async fn finish_response(
    response: reqwest::Response,
    url: Url,
    max_bytes: usize,
    oversize: OversizePolicy,
) -> Result<FetchResponse, FetchError> {
    let status = response.status().as_u16();
    let mut headers: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in response.headers() {
        if let Ok(text) = value.to_str() {
            headers
                .entry(name.as_str().to_ascii_lowercase())
                .or_insert_with(|| text.to_string());
        }
    }

    let codecs = parse_encodings(headers.get("content-encoding").map(String::as_str))?;

    let mut body: Vec<u8> = Vec::new();
    let mut truncated = false;
    let mut stream = response.bytes_stream();
    while let Some(piece) = stream.next().await {
        let piece = piece.map_err(|e| {
            FetchError::new(ErrorCode::FetchError, format!("body stream failed: {e}"))
                .with_detail("url", url.to_string())
        })?;
        if body.len() + piece.len() > max_bytes {
            let keep = max_bytes.saturating_sub(body.len());
            body.extend_from_slice(&piece[..keep]);
            truncated = true;
            break;
        }
        body.extend_from_slice(&piece);
    }

    if truncated {
        if !codecs.is_empty() {
            // A partial compressed stream cannot be decoded safely.
            return Err(content_too_large(&url, max_bytes)
                .with_detail("content_encoding", codecs.join(",")));
        }
        if oversize == OversizePolicy::Fail {
            return Err(content_too_large(&url, max_bytes));
        }
    }

    let decoded = !codecs.is_empty();
    for codec in codecs.iter().rev() {
        let (out, cut) = decode_bounded(codec, &body, max_bytes, &url)?;
        if cut {
            if oversize == OversizePolicy::Fail {
                return Err(content_too_large(&url, max_bytes)
                    .with_detail("content_encoding", codec.to_string()));
            }
            truncated = true;
        }
        body = out;
    }

    if decoded {
        headers.remove("content-encoding");
        headers.remove("content-length");
    }

    let content_type = headers.get("content-type").cloned();

    Ok(FetchResponse {
        status,
        headers,
        body,
        final_url: url.to_string(),
        content_type,
        truncated,
    })
}

fn content_too_large(url: &Url, max_bytes: usize) -> FetchError {
    FetchError::new(
        ErrorCode::ContentTooLarge,
        format!("response body exceeds {max_bytes} bytes"),
    )
    .with_detail("url", url.to_string())
    .with_detail("max_bytes", max_bytes.to_string())
}

/// Parse `Content-Encoding` into the codec list to apply. `identity` and
/// blanks are skipped; anything unrecognized is an error before any bytes
/// are interpreted.
fn parse_encodings(header: Option<&str>) -> Result<Vec<String>, FetchError> {
    let Some(header) = header else {
        return Ok(Vec::new());
    };
    let mut codecs = Vec::new();
    for raw in header.split(',') {
        let codec = raw.trim().to_ascii_lowercase();
        match codec.as_str() {
            "" | "identity" => {}
            "gzip" | "x-gzip" | "deflate" | "x-deflate" | "br" => codecs.push(codec),
            other => {
                return Err(FetchError::new(
                    ErrorCode::UnsupportedEncoding,
                    format!("unsupported Content-Encoding: {other}"),
                )
                .with_detail("encoding", other.to_string()));
            }
        }
    }
    Ok(codecs)
}

/// Decode one codec with the output bounded to `max_bytes`. Returns the
/// decoded bytes and whether the bound cut the output short.
fn decode_bounded(
    codec: &str,
    data: &[u8],
    max_bytes: usize,
    url: &Url,
) -> Result<(Vec<u8>, bool), FetchError> {
    let reader: Box<dyn Read> = match codec {
        "gzip" | "x-gzip" => Box::new(flate2::read::GzDecoder::new(data)),
        "deflate" | "x-deflate" => {
            // HTTP deflate is zlib-wrapped in practice, but raw streams
            // exist in the wild; sniff the zlib header.
            if data.len() >= 2 && data[0] == 0x78 {
                Box::new(flate2::read::ZlibDecoder::new(data))
            } else {
                Box::new(flate2::read::DeflateDecoder::new(data))
            }
        }
        "br" => Box::new(brotli::Decompressor::new(data, 4096)),
        other => {
            return Err(FetchError::new(
                ErrorCode::UnsupportedEncoding,
                format!("unsupported Content-Encoding: {other}"),
            ));
        }
    };

    let mut out = Vec::new();
    let mut limited = reader.take(max_bytes as u64 + 1);
    limited.read_to_end(&mut out).map_err(|e| {
        FetchError::new(
            ErrorCode::DecompressionFailed,
            format!("failed to decode {codec} body: {e}"),
        )
        .with_detail("url", url.to_string())
        .with_detail("encoding", codec.to_string())
    })?;

    if out.len() > max_bytes {
        out.truncate(max_bytes);
        return Ok((out, true));
    }
    Ok((out, false))
}

/// `Retry-After` in whole seconds; HTTP-date forms are ignored.
fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}
