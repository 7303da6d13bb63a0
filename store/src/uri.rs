//! `webfetch://{kind}/{source_id}` resource URIs.
//!
//! Parsing is strict: only this scheme, no userinfo, port, query, or
//! fragment, exactly one path segment, and a kind from the closed set.

use quarry_types::{ErrorCode, FetchError, Packet};
use url::Url;

/// What view of a packet a URI addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Packet,
    Content,
    Normalized,
    Screenshot,
}

impl ResourceKind {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "packet" => Some(ResourceKind::Packet),
            "content" => Some(ResourceKind::Content),
            "normalized" => Some(ResourceKind::Normalized),
            "screenshot" => Some(ResourceKind::Screenshot),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Packet => "packet",
            ResourceKind::Content => "content",
            ResourceKind::Normalized => "normalized",
            ResourceKind::Screenshot => "screenshot",
        }
    }

    /// The fixed mime type served for this kind.
    #[must_use]
    pub fn mime(&self) -> &'static str {
        match self {
            ResourceKind::Packet | ResourceKind::Normalized => "application/json",
            ResourceKind::Content => "text/markdown",
            ResourceKind::Screenshot => "image/png",
        }
    }
}

/// A parsed resource URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceUri {
    pub kind: ResourceKind,
    pub source_id: String,
}

impl ResourceUri {
    #[must_use]
    pub fn new(kind: ResourceKind, source_id: impl Into<String>) -> Self {
        Self {
            kind,
            source_id: source_id.into(),
        }
    }

    /// Parse a URI string, rejecting anything outside the exact shape.
    pub fn parse(raw: &str) -> Result<Self, FetchError> {
        let unparsable =
            || FetchError::new(ErrorCode::ResourceNotFound, format!("unparsable resource URI: {raw}"));

        let url = Url::parse(raw).map_err(|_| unparsable())?;
        if url.scheme() != "webfetch" {
            return Err(unparsable());
        }
        if !url.username().is_empty()
            || url.password().is_some()
            || url.port().is_some()
            || url.query().is_some()
            || url.fragment().is_some()
        {
            return Err(unparsable());
        }

        let kind = url
            .host_str()
            .and_then(ResourceKind::from_name)
            .ok_or_else(unparsable)?;

        let mut segments = url.path().trim_start_matches('/').split('/');
        let source_id = segments.next().filter(|s| !s.is_empty()).ok_or_else(unparsable)?;
        if segments.next().is_some() {
            return Err(unparsable());
        }

        Ok(Self {
            kind,
            source_id: source_id.to_string(),
        })
    }
}

impl std::fmt::Display for ResourceUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "webfetch://{}/{}", self.kind.as_str(), self.source_id)
    }
}

/// Serve one resource view of a packet as `(mime, body)`.
///
/// Screenshot requests fail when the packet holds no screenshot.
pub fn render_resource(
    uri: &ResourceUri,
    packet: &Packet,
) -> Result<(&'static str, String), FetchError> {
    let body = match uri.kind {
        ResourceKind::Packet => serde_json::to_string(packet).map_err(|e| {
            FetchError::new(ErrorCode::UnexpectedError, format!("packet serialization failed: {e}"))
        })?,
        ResourceKind::Content => packet.content.clone(),
        ResourceKind::Normalized => {
            let view = serde_json::json!({
                "source_id": packet.source_id,
                "canonical_url": packet.canonical_url,
                "content": packet.content,
                "outline": packet.outline,
                "key_blocks": packet.key_blocks,
                "metadata": packet.metadata,
            });
            view.to_string()
        }
        ResourceKind::Screenshot => packet.screenshot_base64.clone().ok_or_else(|| {
            FetchError::new(
                ErrorCode::ResourceNotFound,
                format!("no screenshot stored for {}", packet.source_id),
            )
        })?,
    };
    Ok((uri.kind.mime(), body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_every_kind() {
        for (name, kind) in [
            ("packet", ResourceKind::Packet),
            ("content", ResourceKind::Content),
            ("normalized", ResourceKind::Normalized),
            ("screenshot", ResourceKind::Screenshot),
        ] {
            let uri = ResourceUri::parse(&format!("webfetch://{name}/abc123")).unwrap();
            assert_eq!(uri.kind, kind);
            assert_eq!(uri.source_id, "abc123");
        }
    }

    #[test]
    fn display_round_trips() {
        let uri = ResourceUri::new(ResourceKind::Content, "deadbeef00112233");
        assert_eq!(uri.to_string(), "webfetch://content/deadbeef00112233");
        assert_eq!(ResourceUri::parse(&uri.to_string()).unwrap(), uri);
    }

    #[test]
    fn rejects_malformed_uris() {
        let bad = [
            "http://packet/abc",
            "webfetch://unknown/abc",
            "webfetch://packet",
            "webfetch://packet/",
            "webfetch://packet/a/b",
            "webfetch://packet/abc?x=1",
            "webfetch://packet/abc#frag",
            "webfetch://user@packet/abc",
            "webfetch://packet:99/abc",
            "not a uri",
        ];
        for raw in bad {
            let err = ResourceUri::parse(raw).unwrap_err();
            assert_eq!(err.code, ErrorCode::ResourceNotFound, "uri: {raw}");
        }
    }

    #[test]
    fn mime_types_fixed() {
        assert_eq!(ResourceKind::Packet.mime(), "application/json");
        assert_eq!(ResourceKind::Normalized.mime(), "application/json");
        assert_eq!(ResourceKind::Content.mime(), "text/markdown");
        assert_eq!(ResourceKind::Screenshot.mime(), "image/png");
    }
}
