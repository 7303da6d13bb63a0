//! HTML extraction: sanitized DOM → Markdown with harvested metadata.

mod readability;
mod sanitize;
mod to_markdown;

pub use sanitize::{is_boilerplate, is_denied_tag, is_hidden, safe_url};

use quarry_types::{Warning, WarningKind};
use scraper::{Html, Selector};
use url::Url;

use crate::ExtractedContent;

/// Class/id fragments that mark a metered or locked article.
const PAYWALL_SELECTORS: &[&str] = &[
    "paywall",
    "piano-",
    "meter-wall",
    "subscription-required",
    "premium-content",
    "locked-content",
    "regwall",
];

/// Phrases that mark a paywall in visible text.
const PAYWALL_PHRASES: &[&str] = &[
    "subscribe to continue reading",
    "subscribe to read the full article",
    "this content is for subscribers",
    "premium subscribers only",
    "sign in to continue reading",
    "already a subscriber? sign in",
    "create a free account to continue",
];

/// Extract an HTML document. `final_url` anchors relative link and image
/// targets; a `<base href>` in the document wins when present.
pub fn extract(html: &str, final_url: Option<&str>) -> ExtractedContent {
    let doc = Html::parse_document(html);
    let base_url = document_base(&doc, final_url);

    let mut warnings = Vec::new();
    if let Some(reason) = detect_paywall(&doc) {
        warnings.push(Warning::new(
            WarningKind::Paywalled,
            format!("paywall indicators present: {reason}"),
        ));
    }

    let fallback = readability::select_fallback(&doc);
    let candidate = readability::select_candidate(&doc);

    let fallback_words = fallback.map(readability::word_count).unwrap_or(0);
    let candidate_words = candidate.map(readability::word_count).unwrap_or(0);

    let chosen = if candidate.is_some()
        && readability::use_readability(candidate_words, fallback_words)
    {
        candidate
    } else {
        fallback
    };

    let markdown = chosen
        .map(|el| to_markdown::convert(el, base_url.as_ref()))
        .unwrap_or_default();
    let text = plain_text(&markdown);
    let excerpt = harvest_excerpt(&doc, &text);

    ExtractedContent {
        title: harvest_title(&doc),
        markdown,
        text,
        excerpt,
        byline: harvest_meta(
            &doc,
            &[
                "meta[name=\"author\"]",
                "meta[property=\"article:author\"]",
            ],
        ),
        site_name: harvest_meta(&doc, &["meta[property=\"og:site_name\"]"]),
        lang: harvest_lang(&doc),
        published_time: harvest_meta(
            &doc,
            &[
                "meta[property=\"article:published_time\"]",
                "meta[name=\"date\"]",
                "meta[name=\"dc.date\"]",
            ],
        )
        .or_else(|| harvest_time_element(&doc)),
        warnings,
    }
}

/// The URL relative targets resolve against: `<base href>` when the
/// document declares one (resolved against the final URL), else the final
/// URL itself.
fn document_base(doc: &Html, final_url: Option<&str>) -> Option<Url> {
    let final_url = final_url.and_then(|u| Url::parse(u).ok());

    let declared = doc
        .select(&selector("base[href]"))
        .next()
        .and_then(|el| el.value().attr("href"));
    if let Some(href) = declared {
        if let Some(resolved) = final_url.as_ref().and_then(|f| f.join(href).ok()) {
            return Some(resolved);
        }
        if let Ok(absolute) = Url::parse(href) {
            return Some(absolute);
        }
    }
    final_url
}

fn selector(s: &str) -> Selector {
    // The selector strings are compile-time constants; parse cannot fail.
    Selector::parse(s).unwrap_or_else(|_| Selector::parse("head").unwrap())
}

fn harvest_title(doc: &Html) -> Option<String> {
    let from_title = doc
        .select(&selector("title"))
        .next()
        .map(|t| t.text().collect::<String>())
        .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|t| !t.is_empty());
    if from_title.is_some() {
        return from_title;
    }

    if let Some(og) = harvest_meta(doc, &["meta[property=\"og:title\"]"]) {
        return Some(og);
    }

    doc.select(&selector("h1"))
        .next()
        .map(|h| h.text().collect::<String>())
        .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|t| !t.is_empty())
}

fn harvest_meta(doc: &Html, selectors: &[&str]) -> Option<String> {
    for s in selectors {
        if let Some(content) = doc
            .select(&selector(s))
            .next()
            .and_then(|el| el.value().attr("content"))
        {
            let trimmed = content.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

fn harvest_lang(doc: &Html) -> Option<String> {
    doc.select(&selector("html"))
        .next()
        .and_then(|el| el.value().attr("lang"))
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
}

fn harvest_time_element(doc: &Html) -> Option<String> {
    doc.select(&selector("time[datetime]"))
        .next()
        .and_then(|el| el.value().attr("datetime"))
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
}

fn harvest_excerpt(doc: &Html, text: &str) -> Option<String> {
    if let Some(description) = harvest_meta(
        doc,
        &[
            "meta[name=\"description\"]",
            "meta[property=\"og:description\"]",
        ],
    ) {
        return Some(description);
    }

    let first_para = text.split("\n\n").find(|p| p.split_whitespace().count() >= 10)?;
    let mut excerpt: String = first_para.chars().take(300).collect();
    if excerpt.len() < first_para.len() {
        excerpt.push_str("...");
    }
    Some(excerpt)
}

fn detect_paywall(doc: &Html) -> Option<String> {
    for el in doc.root_element().descendent_elements() {
        let mut haystack = String::new();
        if let Some(class) = el.value().attr("class") {
            haystack.push_str(&class.to_ascii_lowercase());
            haystack.push(' ');
        }
        if let Some(id) = el.value().attr("id") {
            haystack.push_str(&id.to_ascii_lowercase());
        }
        if let Some(hit) = PAYWALL_SELECTORS.iter().find(|s| haystack.contains(*s)) {
            return Some(format!("selector '{hit}'"));
        }
    }

    let body_text: String = doc
        .select(&selector("body"))
        .next()
        .map(|b| b.text().collect::<String>().to_ascii_lowercase())
        .unwrap_or_default();
    PAYWALL_PHRASES
        .iter()
        .find(|p| body_text.contains(*p))
        .map(|p| format!("phrase \"{p}\""))
}

/// Strip Markdown markup down to plain text for word counting.
#[must_use]
pub fn plain_text(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len());
    let mut in_fence = false;
    for line in markdown.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            out.push_str(line);
            out.push('\n');
            continue;
        }
        let stripped = trimmed
            .trim_start_matches('#')
            .trim_start_matches('>')
            .trim_start();
        out.push_str(&strip_inline(stripped));
        out.push('\n');
    }
    out.trim().to_string()
}

fn strip_inline(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' | '`' | '~' => {}
            '[' => {}
            ']' => {
                // Drop the "(url)" that follows a link text
                if chars.peek() == Some(&'(') {
                    for next in chars.by_ref() {
                        if next == ')' {
                            break;
                        }
                    }
                }
            }
            '!' if chars.peek() == Some(&'[') => {}
            _ => out.push(c),
        }
    }
    out
}
