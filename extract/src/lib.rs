//! Content extraction: one intermediate form for every supported type.
//!
//! [`detect::detect`] classifies a response by MIME type and body sniffing;
//! [`extract`] dispatches to the matching extractor. Every extractor emits
//! an [`ExtractedContent`]: Markdown plus whatever document metadata the
//! format can supply, with non-fatal problems as packet warnings.

pub mod charset;
pub mod detect;
pub mod html;
pub mod json;
pub mod markdown;
pub mod pdf;
pub mod text;
pub mod xml;

pub use detect::ContentKind;

use quarry_types::{ErrorCode, FetchError, Warning};

/// Common intermediate form produced by every extractor.
#[derive(Debug, Clone, Default)]
pub struct ExtractedContent {
    pub title: Option<String>,

    /// The normalized Markdown rendering.
    pub markdown: String,

    /// Plain text with markup removed, for word counts and summaries.
    pub text: String,

    /// Short leading excerpt, when the format supplies one.
    pub excerpt: Option<String>,

    pub byline: Option<String>,

    pub site_name: Option<String>,

    /// BCP-47 language tag.
    pub lang: Option<String>,

    /// ISO-8601 publication time, when the document declares one.
    pub published_time: Option<String>,

    /// Non-fatal findings (paywall, scanned PDF, charset fallback) for the
    /// normalizer to merge into the packet.
    pub warnings: Vec<Warning>,
}

/// Run the extractor matching `kind` over an already-decoded body.
///
/// `pdf` is the exception: it consumes raw bytes, so callers pass both the
/// decoded text and the original bytes.
pub fn extract(
    kind: ContentKind,
    text: &str,
    raw: &[u8],
    base_url: Option<&str>,
) -> Result<ExtractedContent, FetchError> {
    match kind {
        ContentKind::Html => Ok(html::extract(text, base_url)),
        ContentKind::Markdown => Ok(markdown::extract(text)),
        ContentKind::Pdf => pdf::extract(raw),
        ContentKind::Json => json::extract(text),
        ContentKind::Xml => Ok(xml::extract(text)),
        ContentKind::Text => Ok(text::extract(text)),
        ContentKind::Unknown => Err(FetchError::new(
            ErrorCode::ExtractionFailed,
            "content type could not be determined",
        )),
    }
}
