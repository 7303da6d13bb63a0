//! Sanitizer policy: which parts of a DOM never reach the output.
//!
//! The policy is applied during Markdown serialization rather than as a
//! separate mutation pass; the effect is the same deny-list semantics:
//! dangerous elements, boilerplate, hidden nodes, and unsafe URL schemes
//! are dropped, event handlers and inline styles never survive because the
//! serializer only reads the attributes it needs.

use scraper::ElementRef;

/// Elements removed outright, along with their subtrees.
pub const DENIED_TAGS: &[&str] = &[
    "script", "style", "noscript", "iframe", "frame", "object", "embed", "applet", "svg", "math",
    "canvas", "audio", "video", "source", "track", "map", "area", "template", "slot", "portal",
];

/// Structural elements that are boilerplate regardless of attributes.
const BOILERPLATE_TAGS: &[&str] = &["nav", "footer", "aside"];

/// ARIA landmark roles that mark page chrome.
const BOILERPLATE_ROLES: &[&str] = &["banner", "navigation", "complementary", "contentinfo"];

/// Class/id fragments that mark cookie walls, ads, share bars, comment
/// sections, and similar chrome.
const BOILERPLATE_KEYWORDS: &[&str] = &[
    "cookie",
    "consent",
    "advert",
    "-ads",
    "ads-",
    "ad-banner",
    "share-bar",
    "social-share",
    "comments",
    "comment-section",
    "popup",
    "modal",
    "newsletter",
    "subscribe-banner",
    "related-posts",
    "breadcrumb",
];

/// URL schemes stripped from `href`/`src`/`action`/`formaction`.
const DANGEROUS_SCHEMES: &[&str] = &["javascript:", "data:", "vbscript:", "file:"];

#[must_use]
pub fn is_denied_tag(name: &str) -> bool {
    DENIED_TAGS.contains(&name)
}

/// Whether an element is page chrome rather than content.
#[must_use]
pub fn is_boilerplate(el: &ElementRef<'_>) -> bool {
    let name = el.value().name();
    if BOILERPLATE_TAGS.contains(&name) {
        return true;
    }

    if let Some(role) = el.value().attr("role")
        && BOILERPLATE_ROLES.contains(&role.to_ascii_lowercase().as_str())
    {
        return true;
    }

    if el
        .value()
        .attr("aria-hidden")
        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    {
        return true;
    }

    let mut haystack = String::new();
    if let Some(class) = el.value().attr("class") {
        haystack.push_str(&class.to_ascii_lowercase());
        haystack.push(' ');
    }
    if let Some(id) = el.value().attr("id") {
        haystack.push_str(&id.to_ascii_lowercase());
    }
    if haystack.is_empty() {
        return false;
    }
    BOILERPLATE_KEYWORDS.iter().any(|kw| haystack.contains(kw))
}

/// Whether inline styling hides the element.
#[must_use]
pub fn is_hidden(el: &ElementRef<'_>) -> bool {
    if el.value().attr("hidden").is_some() {
        return true;
    }
    let Some(style) = el.value().attr("style") else {
        return false;
    };
    let style: String = style.to_ascii_lowercase().split_whitespace().collect();
    style.contains("display:none")
        || style.contains("visibility:hidden")
        || style.contains("opacity:0;")
        || style.ends_with("opacity:0")
}

/// Filter a URL attribute value; dangerous schemes are dropped entirely.
#[must_use]
pub fn safe_url(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lowered = trimmed.to_ascii_lowercase();
    let compact: String = lowered.chars().filter(|c| !c.is_whitespace()).collect();
    if DANGEROUS_SCHEMES.iter().any(|s| compact.starts_with(s)) {
        return None;
    }
    Some(trimmed)
}
