//! Content-type detection: MIME header first, body sniffing second.

use std::str::FromStr;

/// The kinds the pipeline can extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    Html,
    Markdown,
    Pdf,
    Json,
    Xml,
    Text,
    Unknown,
}

/// Parsed view of a `Content-Type` header.
#[derive(Debug, Clone)]
pub struct DetectedType {
    pub kind: ContentKind,

    /// `type/subtype` with parameters removed, lowercased. Empty when the
    /// header was absent and sniffing decided.
    pub mime: String,

    /// The `charset` parameter, lowercased.
    pub charset: Option<String>,
}

/// Classify a response. The header is authoritative for well-known types;
/// `unknown` and bare `text/plain` fall through to a sniff of the first
/// kilobyte.
#[must_use]
pub fn detect(content_type: Option<&str>, body: &[u8]) -> DetectedType {
    let (mime, charset) = parse_content_type(content_type);
    let mut kind = kind_from_mime(&mime);

    if matches!(kind, ContentKind::Unknown | ContentKind::Text) {
        if let Some(sniffed) = sniff(body) {
            kind = sniffed;
        } else if kind == ContentKind::Unknown && !body.is_empty() {
            kind = ContentKind::Text;
        }
    }

    DetectedType {
        kind,
        mime,
        charset,
    }
}

/// Split `type/subtype; charset=…` into its parts.
fn parse_content_type(header: Option<&str>) -> (String, Option<String>) {
    let Some(header) = header else {
        return (String::new(), None);
    };

    match mime::Mime::from_str(header.trim()) {
        Ok(parsed) => {
            let charset = parsed
                .get_param(mime::CHARSET)
                .map(|c| c.as_str().to_ascii_lowercase());
            (parsed.essence_str().to_ascii_lowercase(), charset)
        }
        Err(_) => {
            // Salvage the essence from a malformed header.
            let essence = header
                .split(';')
                .next()
                .unwrap_or("")
                .trim()
                .to_ascii_lowercase();
            (essence, None)
        }
    }
}

fn kind_from_mime(mime: &str) -> ContentKind {
    match mime {
        "" => ContentKind::Unknown,
        "text/html" | "application/xhtml+xml" => ContentKind::Html,
        "text/markdown" | "text/x-markdown" => ContentKind::Markdown,
        "application/pdf" => ContentKind::Pdf,
        "application/json" => ContentKind::Json,
        "text/xml" | "application/xml" => ContentKind::Xml,
        m if m.ends_with("+json") => ContentKind::Json,
        m if m.ends_with("+xml") => ContentKind::Xml,
        m if m.starts_with("text/") => ContentKind::Text,
        _ => ContentKind::Unknown,
    }
}

/// Inspect the first kilobyte for format signatures.
fn sniff(body: &[u8]) -> Option<ContentKind> {
    let head = &body[..body.len().min(1024)];
    let text = String::from_utf8_lossy(head);
    let trimmed = text.trim_start();
    let lower = trimmed.to_ascii_lowercase();

    if trimmed.starts_with("%PDF-") {
        return Some(ContentKind::Pdf);
    }

    if lower.starts_with("<!doctype")
        || lower.starts_with("<html")
        || lower.starts_with("<head")
        || lower.starts_with("<body")
    {
        return Some(ContentKind::Html);
    }

    if lower.starts_with("<?xml")
        || lower.starts_with("<rss")
        || lower.starts_with("<feed")
        || lower.starts_with("<atom")
    {
        return Some(ContentKind::Xml);
    }

    if (trimmed.starts_with('{') || trimmed.starts_with('['))
        && serde_json::from_slice::<serde_json::Value>(body).is_ok()
    {
        return Some(ContentKind::Json);
    }

    if looks_like_markdown(trimmed) {
        return Some(ContentKind::Markdown);
    }

    None
}

fn looks_like_markdown(text: &str) -> bool {
    if text.starts_with("---\n") || text.starts_with("---\r\n") || text.starts_with("# ") {
        return true;
    }
    text.lines().take(40).any(|line| {
        let line = line.trim_start();
        line.starts_with("# ")
            || line.starts_with("## ")
            || contains_markdown_link(line)
    })
}

/// A `[text](url)` pair on one line.
fn contains_markdown_link(line: &str) -> bool {
    let Some(open) = line.find('[') else {
        return false;
    };
    let Some(close) = line[open..].find("](") else {
        return false;
    };
    line[open + close..].contains(')')
}
