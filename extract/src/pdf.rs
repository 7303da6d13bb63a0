//! PDF extraction: embedded text with a scanned-document confidence check.
//!
//! Text comes from the embedded content streams only (no OCR). A document
//! averaging under 100 chars per page, or with more than half its pages
//! empty, is flagged `scanned_pdf` and low confidence.

use std::sync::LazyLock;

use chrono::NaiveDateTime;
use quarry_types::{ErrorCode, FetchError, Warning, WarningKind};
use regex::Regex;

use crate::ExtractedContent;

const LOW_CONFIDENCE_AVG_CHARS: usize = 100;
const LOW_CONFIDENCE_EMPTY_RATIO: f64 = 0.5;

static DATE_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/(?:CreationDate|ModDate)\s*\(D:(\d{14})").expect("static regex")
});
static TITLE_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/Title\s*\(([^)\\]{1,200})\)").expect("static regex"));
static PAGE_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/Type\s*/Page\b").expect("static regex"));

/// Extract a PDF from its raw bytes.
pub fn extract(raw: &[u8]) -> Result<ExtractedContent, FetchError> {
    let text = pdf_extract::extract_text_from_mem(raw).map_err(|e| {
        FetchError::new(
            ErrorCode::ExtractionFailed,
            format!("PDF text extraction failed: {e}"),
        )
    })?;

    let pages = page_texts(&text, raw);
    let page_count = pages.len().max(1);
    let total_chars: usize = pages.iter().map(|p| p.trim().len()).sum();
    let empty_pages = pages.iter().filter(|p| p.trim().is_empty()).count();

    let avg_chars = total_chars / page_count;
    let empty_ratio = empty_pages as f64 / page_count as f64;

    let mut warnings = Vec::new();
    if avg_chars < LOW_CONFIDENCE_AVG_CHARS || empty_ratio > LOW_CONFIDENCE_EMPTY_RATIO {
        warnings.push(Warning::new(
            WarningKind::ScannedPdf,
            format!(
                "likely scanned document: {avg_chars} chars/page average, {empty_pages}/{page_count} empty pages"
            ),
        ));
    }

    let raw_text = String::from_utf8_lossy(raw);
    let published_time = parse_pdf_date(&raw_text);
    if published_time.is_some() {
        // The D: form carries no usable zone information.
        warnings.push(Warning::new(
            WarningKind::LowConfidenceDate,
            "PDF date parsed without timezone",
        ));
    }

    let title = TITLE_KEY
        .captures(&raw_text)
        .map(|c| c[1].trim().to_string())
        .filter(|t| !t.is_empty() && t.chars().all(|c| !c.is_control()));

    let markdown = render_markdown(title.as_deref(), &pages);
    let plain: String = pages.join("\n\n");

    Ok(ExtractedContent {
        title,
        markdown,
        text: plain.trim().to_string(),
        published_time,
        warnings,
        ..Default::default()
    })
}

/// Per-page texts. Extraction output separates pages with form feeds when
/// the backend emits them; otherwise fall back to counting page objects in
/// the raw bytes and treating the text as evenly distributed.
fn page_texts(text: &str, raw: &[u8]) -> Vec<String> {
    let by_form_feed: Vec<String> = text.split('\u{c}').map(str::to_string).collect();
    if by_form_feed.len() > 1 {
        return by_form_feed;
    }

    let raw_text = String::from_utf8_lossy(raw);
    let page_count = PAGE_OBJECT.find_iter(&raw_text).count().max(1);
    if page_count == 1 {
        return vec![text.to_string()];
    }

    // No page markers in the text; approximate equal-length pages so the
    // chars-per-page average stays meaningful.
    let chars: Vec<char> = text.chars().collect();
    let per_page = chars.len().div_ceil(page_count);
    if per_page == 0 {
        return vec![String::new(); page_count];
    }
    chars
        .chunks(per_page)
        .map(|c| c.iter().collect())
        .chain(std::iter::repeat_with(String::new))
        .take(page_count)
        .collect()
}

/// Parse the `D:YYYYMMDDHHmmss` date form. Timezone suffixes such as
/// `+02'00'` are not honored; callers mark the result low confidence.
fn parse_pdf_date(raw_text: &str) -> Option<String> {
    let digits = DATE_KEY.captures(raw_text)?.get(1)?.as_str();
    let parsed = NaiveDateTime::parse_from_str(digits, "%Y%m%d%H%M%S").ok()?;
    Some(parsed.format("%Y-%m-%dT%H:%M:%S").to_string())
}

fn render_markdown(title: Option<&str>, pages: &[String]) -> String {
    let mut out = String::new();
    if let Some(title) = title {
        out.push_str(&format!("# {title}\n\n"));
    }
    let mut first = true;
    for page in pages {
        let page = page.trim();
        if page.is_empty() {
            continue;
        }
        if !first {
            out.push_str("\n\n");
        }
        first = false;
        // Collapse intra-page line wrapping into paragraphs on blank lines.
        let paragraphs: Vec<String> = page
            .split("\n\n")
            .map(|p| p.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|p| !p.is_empty())
            .collect();
        out.push_str(&paragraphs.join("\n\n"));
    }
    out.trim().to_string()
}
