//! URL normalization and parsed views.
//!
//! Canonical form: tracking parameters stripped, remaining query keys
//! sorted, host lowercased, default port dropped, trailing slash trimmed
//! unless the path is `/`, fragment removed. `normalize` is idempotent.

use url::Url;

/// Exact tracking-parameter names, matched case-insensitively.
const TRACKING_PARAMS: &[&str] = &[
    "fbclid",
    "gclid",
    "dclid",
    "msclkid",
    "yclid",
    "twclid",
    "igshid",
    "_ga",
    "_gl",
    "ref",
    "ref_src",
    "click_id",
    "clickid",
    "mkt_tok",
    "s_kwcid",
    "wickedid",
    "mibextid",
];

/// Tracking-parameter prefixes, matched case-insensitively.
const TRACKING_PREFIXES: &[&str] = &["utm_", "mc_"];

fn is_tracking_param(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    TRACKING_PARAMS.contains(&lower.as_str())
        || TRACKING_PREFIXES.iter().any(|p| lower.starts_with(p))
}

/// Normalize a URL string to its canonical form.
///
/// Invalid URLs are returned unchanged: normalization is best-effort and the
/// caller's protocol/SSRF checks decide whether the URL is usable at all.
///
/// # Examples
///
/// ```
/// use quarry_fetch::urls::normalize;
///
/// assert_eq!(
///     normalize("HTTPS://Example.COM:443/a/?b=2&a=1&utm_source=mail"),
///     "https://example.com/a?a=1&b=2"
/// );
/// // Idempotent: normalizing a canonical URL is a no-op
/// let once = normalize("https://example.com/docs/");
/// assert_eq!(normalize(&once), once);
/// ```
#[must_use]
pub fn normalize(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return raw.to_string();
    };

    // The url crate already lowercases the host for http(s); make sure
    // anyway so non-special schemes do not leak mixed case.
    if let Some(host) = url.host_str() {
        let lowered = host.to_ascii_lowercase();
        if lowered != host {
            let _ = url.set_host(Some(&lowered));
        }
    }

    if url.port() == url.scheme_default_port() {
        let _ = url.set_port(None);
    }

    url.set_fragment(None);

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();
    if pairs.is_empty() {
        url.set_query(None);
    } else {
        let query: String = pairs
            .iter()
            .map(|(k, v)| {
                if v.is_empty() {
                    encode_component(k)
                } else {
                    format!("{}={}", encode_component(k), encode_component(v))
                }
            })
            .collect::<Vec<_>>()
            .join("&");
        url.set_query(Some(&query));
    }

    let path = url.path();
    if path.len() > 1 && path.ends_with('/') {
        let trimmed = path.trim_end_matches('/').to_string();
        url.set_path(if trimmed.is_empty() { "/" } else { &trimmed });
    }

    url.to_string()
}

/// Percent-encode a query component, leaving unreserved characters alone.
fn encode_component(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Only `http` and `https` are fetchable.
#[must_use]
pub fn is_allowed_protocol(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

/// Lowercased hostname of a URL string, or `None` if it does not parse.
#[must_use]
pub fn hostname(raw: &str) -> Option<String> {
    Url::parse(raw)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
}

/// `scheme://host[:port]` of a URL string, or `None` if it does not parse.
#[must_use]
pub fn origin(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    Some(origin_of(&url))
}

/// `scheme://host[:port]`, omitting the scheme's default port.
#[must_use]
pub fn origin_of(url: &Url) -> String {
    let scheme = url.scheme();
    let host = url.host_str().unwrap_or("");
    match url.port() {
        Some(port) if url.scheme_default_port() != Some(port) => {
            format!("{scheme}://{host}:{port}")
        }
        _ => format!("{scheme}://{host}"),
    }
}

trait SchemeDefaultPort {
    fn scheme_default_port(&self) -> Option<u16>;
}

impl SchemeDefaultPort for Url {
    fn scheme_default_port(&self) -> Option<u16> {
        match self.scheme() {
            "http" => Some(80),
            "https" => Some(443),
            _ => None,
        }
    }
}
