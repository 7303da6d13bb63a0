//! The normalizer: orchestrates detection, extraction, and annotation into
//! a finished packet.

use chrono::{SecondsFormat, Utc};
use quarry_config::ResolvedConfig;
use quarry_extract::{ContentKind, ExtractedContent, charset, detect};
use quarry_fetch::FetchResponse;
use quarry_fetch::urls;
use quarry_types::{
    ErrorCode, FetchError, Hashes, Packet, PacketMetadata, Warning, WarningKind,
};
use sha2::{Digest, Sha256};

use crate::{blocks, injection, outline, summary};

const RAW_EXCERPT_BYTES: usize = 1000;

/// Caller-controlled normalization extras.
#[derive(Debug, Clone, Default)]
pub struct NormalizeOptions {
    /// Attach the first ≤1000 bytes of the decoded body.
    pub include_raw_excerpt: bool,

    /// Screenshot supplied by a rendering fetcher, passed through verbatim.
    pub screenshot_base64: Option<String>,

    /// Extra warnings accumulated before normalization (rate limiting,
    /// render fallbacks).
    pub warnings: Vec<Warning>,
}

/// Normalize a fetched response into a packet.
pub fn normalize(
    response: &FetchResponse,
    original_url: &str,
    config: &ResolvedConfig,
    opts: &NormalizeOptions,
) -> Result<Packet, FetchError> {
    build_packet(
        original_url,
        &response.final_url,
        response.status,
        response.content_type.as_deref(),
        &response.body,
        response.truncated,
        config,
        opts,
    )
}

/// Normalize raw bytes that did not come from the fetcher (the `extract`
/// tool operation). `canonical_url` seeds the source id for anonymous
/// input.
pub fn normalize_raw(
    bytes: &[u8],
    content_type: Option<&str>,
    canonical_url: Option<&str>,
    config: &ResolvedConfig,
    opts: &NormalizeOptions,
) -> Result<Packet, FetchError> {
    let url = canonical_url.unwrap_or("raw://input");
    build_packet(url, url, 0, content_type, bytes, false, config, opts)
}

#[allow(clippy::too_many_arguments)]
fn build_packet(
    original_url: &str,
    final_url: &str,
    status: u16,
    content_type: Option<&str>,
    body: &[u8],
    body_truncated: bool,
    config: &ResolvedConfig,
    opts: &NormalizeOptions,
) -> Result<Packet, FetchError> {
    let detected = detect::detect(content_type, body);

    if detected.kind == ContentKind::Pdf && !config.pdf_enabled {
        return Err(FetchError::new(
            ErrorCode::ExtractionFailed,
            "PDF extraction is disabled by configuration",
        ));
    }

    let mut warnings = opts.warnings.clone();

    // PDF is binary; everything else decodes under the declared charset.
    let (text, charset_fallback) = if detected.kind == ContentKind::Pdf {
        (String::new(), false)
    } else {
        charset::decode(body, detected.charset.as_deref())
    };
    if charset_fallback {
        warnings.push(Warning::new(
            WarningKind::ExtractionFallback,
            format!(
                "charset {} not decoded cleanly, fell back to UTF-8",
                detected.charset.as_deref().unwrap_or("unknown")
            ),
        ));
    }

    let extracted: ExtractedContent =
        quarry_extract::extract(detected.kind, &text, body, Some(final_url))?;
    warnings.extend(extracted.warnings.iter().cloned());

    if body_truncated {
        warnings.push(Warning::new(
            WarningKind::Truncated,
            "response body was cut at the configured size limit",
        ));
    }

    let markdown = extracted.markdown.clone();

    let hits = injection::detect(&markdown);
    if !hits.is_empty() {
        warnings.push(Warning::new(
            WarningKind::InjectionDetected,
            format!("{} prompt-injection pattern(s) detected", hits.len()),
        ));
    }

    let outline_entries = outline::generate(&markdown);
    let key_blocks = blocks::split_blocks(&markdown);

    let plain = if extracted.text.is_empty() {
        markdown.clone()
    } else {
        extracted.text.clone()
    };
    let source_summary = summary::build(&outline_entries, &plain);
    let words = plain.split_whitespace().count();

    let retrieved_at = Utc::now();
    let content_hash = sha256_hex(markdown.as_bytes());
    let raw_hash = sha256_hex(body);
    let canonical_url = urls::normalize(final_url);
    let day = retrieved_at.format("%Y-%m-%d").to_string();
    let source_id = derive_source_id(&canonical_url, &day, &content_hash);

    let mime = if detected.mime.is_empty() {
        fallback_mime(detected.kind)
    } else {
        detected.mime.clone()
    };

    let raw_excerpt = opts.include_raw_excerpt.then(|| {
        let text = if detected.kind == ContentKind::Pdf {
            String::from_utf8_lossy(body).into_owned()
        } else {
            text.clone()
        };
        truncate_bytes(&text, RAW_EXCERPT_BYTES)
    });

    Ok(Packet {
        source_id,
        original_url: original_url.to_string(),
        canonical_url,
        retrieved_at: retrieved_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        status,
        content_type: mime,
        metadata: PacketMetadata {
            title: extracted.title,
            site_name: extracted.site_name,
            author: extracted.byline,
            published_at: extracted.published_time,
            language: extracted.lang,
            estimated_reading_time_min: Some(summary::reading_time_minutes(words)),
        },
        outline: outline_entries,
        key_blocks,
        content: markdown,
        source_summary,
        citations: Vec::new(),
        unsafe_instructions_detected: hits,
        warnings,
        hashes: Hashes {
            content_hash,
            raw_hash,
        },
        raw_excerpt,
        screenshot_base64: opts.screenshot_base64.clone(),
    })
}

/// First 16 hex chars of `SHA-256(canonical_url | day | content_hash)`.
#[must_use]
pub fn derive_source_id(canonical_url: &str, day: &str, content_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_url.as_bytes());
    hasher.update(b"|");
    hasher.update(day.as_bytes());
    hasher.update(b"|");
    hasher.update(content_hash.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn fallback_mime(kind: ContentKind) -> String {
    match kind {
        ContentKind::Html => "text/html",
        ContentKind::Markdown => "text/markdown",
        ContentKind::Pdf => "application/pdf",
        ContentKind::Json => "application/json",
        ContentKind::Xml => "application/xml",
        ContentKind::Text | ContentKind::Unknown => "text/plain",
    }
    .to_string()
}

/// Cut a string at a byte budget on a char boundary.
fn truncate_bytes(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}
