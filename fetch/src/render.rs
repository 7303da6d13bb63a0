//! The rendering seam.
//!
//! Browser rendering lives outside this crate; whatever drives it plugs in
//! here as an opaque backend returning the same raw response shape as the
//! HTTP fetcher, plus an optional screenshot. The safety pipeline (protocol
//! gate, SSRF, robots) still runs before a backend is consulted.

use futures_util::future::BoxFuture;
use quarry_types::FetchError;

use crate::http::FetchResponse;

/// A page produced by a rendering backend.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// Same shape the HTTP fetcher returns; the decoded DOM serialization
    /// stands in for the body.
    pub response: FetchResponse,

    /// PNG screenshot, base64-encoded, when the backend captured one.
    pub screenshot_base64: Option<String>,
}

/// An opaque rendering fetcher.
///
/// Implementations own their browser lifecycle and MUST close per-request
/// contexts on success and error alike. Errors use the shared taxonomy;
/// a deadline overrun should surface as a retryable `FETCH_ERROR` so the
/// caller can fall back to plain HTTP with a `render_timeout` warning.
pub trait RenderBackend: Send + Sync {
    fn render<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<RenderedPage, FetchError>>;
}

/// How a fetch chooses between HTTP and rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// Plain HTTP only.
    #[default]
    Http,
    /// Rendering backend only; fails when none is configured.
    Render,
    /// HTTP first, rendering as a fallback for thin or failed responses.
    /// Fallbacks are invisible to the caller except through warnings.
    Auto,
}

impl FetchMode {
    /// Parse the wire name, defaulting to plain HTTP.
    #[must_use]
    pub fn from_name(name: Option<&str>) -> Self {
        match name.map(str::trim) {
            Some("render") => FetchMode::Render,
            Some("auto") => FetchMode::Auto,
            _ => FetchMode::Http,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parsing() {
        assert_eq!(FetchMode::from_name(None), FetchMode::Http);
        assert_eq!(FetchMode::from_name(Some("http")), FetchMode::Http);
        assert_eq!(FetchMode::from_name(Some("render")), FetchMode::Render);
        assert_eq!(FetchMode::from_name(Some("auto")), FetchMode::Auto);
        assert_eq!(FetchMode::from_name(Some("bogus")), FetchMode::Http);
    }
}
