//! Markdown extraction: frontmatter, embedded-HTML hygiene, fence
//! normalization.

use std::sync::LazyLock;

use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use regex::Regex;

use crate::ExtractedContent;

static SCRIPT_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)<script\b[^>]*>.*?</script>|<style\b[^>]*>.*?</style>|<iframe\b[^>]*>.*?</iframe>",
    )
    .expect("static regex")
});
static SELF_CLOSING_DANGEROUS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<(script|style|iframe)\b[^>]*/?>").expect("static regex"));
static EVENT_HANDLER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\son\w+\s*=\s*("[^"]*"|'[^']*'|[^\s>]+)"#).expect("static regex")
});

/// Extract a Markdown document.
#[must_use]
pub fn extract(raw: &str) -> ExtractedContent {
    let (frontmatter, body) = split_frontmatter(raw);

    let mut cleaned = SCRIPT_BLOCK.replace_all(body, "").into_owned();
    cleaned = SELF_CLOSING_DANGEROUS.replace_all(&cleaned, "").into_owned();
    cleaned = EVENT_HANDLER.replace_all(&cleaned, "").into_owned();
    let markdown = normalize_fences(&cleaned).trim().to_string();

    let title = frontmatter
        .as_ref()
        .and_then(|fm| fm.get("title").cloned())
        .or_else(|| first_heading(&markdown));

    let text = crate::html::plain_text(&markdown);

    ExtractedContent {
        title,
        byline: frontmatter.as_ref().and_then(|fm| fm.get("author").cloned()),
        published_time: frontmatter
            .as_ref()
            .and_then(|fm| fm.get("date").or_else(|| fm.get("published")).cloned()),
        lang: frontmatter.as_ref().and_then(|fm| fm.get("lang").cloned()),
        excerpt: text
            .split("\n\n")
            .find(|p| !p.trim().is_empty())
            .map(|p| p.chars().take(300).collect()),
        markdown,
        text,
        ..Default::default()
    }
}

/// Split `---`-delimited YAML frontmatter off the document head.
///
/// Only flat `key: value` lines are read; nested structures are skipped
/// rather than parsed.
fn split_frontmatter(raw: &str) -> (Option<std::collections::HashMap<String, String>>, &str) {
    let rest = raw.strip_prefix('\u{FEFF}').unwrap_or(raw);
    if !(rest.starts_with("---\n") || rest.starts_with("---\r\n")) {
        return (None, raw);
    }

    let after_open = &rest[rest.find('\n').unwrap_or(0) + 1..];
    let Some(close) = find_frontmatter_close(after_open) else {
        return (None, raw);
    };

    let block = &after_open[..close.0];
    let body = &after_open[close.1..];

    let mut map = std::collections::HashMap::new();
    for line in block.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        if key.starts_with(' ') || key.starts_with('\t') {
            continue;
        }
        let value = value.trim().trim_matches('"').trim_matches('\'').trim();
        if !value.is_empty() {
            map.insert(key.trim().to_ascii_lowercase(), value.to_string());
        }
    }

    (Some(map), body)
}

/// Byte offsets of the closing `---` line: (start of line, after line end).
fn find_frontmatter_close(s: &str) -> Option<(usize, usize)> {
    let mut offset = 0;
    for line in s.split_inclusive('\n') {
        let trimmed = line.trim_end();
        if trimmed == "---" || trimmed == "..." {
            return Some((offset, offset + line.len()));
        }
        offset += line.len();
    }
    None
}

/// Rewrite `~~~` fence lines to backtick fences of the same length.
fn normalize_fences(markdown: &str) -> String {
    markdown
        .lines()
        .map(|line| {
            let trimmed = line.trim_start();
            let indent_len = line.len() - trimmed.len();
            let tilde_run = trimmed.chars().take_while(|c| *c == '~').count();
            if tilde_run >= 3 {
                let rest = &trimmed[tilde_run..];
                format!("{}{}{}", &line[..indent_len], "`".repeat(tilde_run), rest)
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// First heading text, found via the event stream so fenced `#` lines are
/// never mistaken for headings.
fn first_heading(markdown: &str) -> Option<String> {
    let mut in_heading = false;
    let mut text = String::new();
    for event in Parser::new(markdown) {
        match event {
            Event::Start(Tag::Heading { .. }) => in_heading = true,
            Event::Text(t) | Event::Code(t) if in_heading => text.push_str(&t),
            Event::End(TagEnd::Heading(_)) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    return Some(trimmed.to_string());
                }
                in_heading = false;
                text.clear();
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn frontmatter_title_and_author() {
        let doc = "---\ntitle: \"My Post\"\nauthor: Jo Writer\ndate: 2026-01-15\n---\n\n# Ignored\n\nBody text.";
        let extracted = extract(doc);
        assert_eq!(extracted.title.as_deref(), Some("My Post"));
        assert_eq!(extracted.byline.as_deref(), Some("Jo Writer"));
        assert_eq!(extracted.published_time.as_deref(), Some("2026-01-15"));
        assert!(!extracted.markdown.contains("title:"));
        assert!(extracted.markdown.starts_with("# Ignored"));
    }

    #[test]
    fn title_from_first_heading_without_frontmatter() {
        let extracted = extract("Some intro.\n\n## The Real Title\n\nMore.");
        assert_eq!(extracted.title.as_deref(), Some("The Real Title"));
    }

    #[test]
    fn fenced_hash_is_not_a_title() {
        let extracted = extract("```\n# not a heading\n```\n\n# Actual\n");
        assert_eq!(extracted.title.as_deref(), Some("Actual"));
    }

    #[test]
    fn scripts_and_handlers_stripped() {
        let doc = "Before\n\n<script>evil()</script>\n<div onclick=\"evil()\">x</div>\n\nAfter";
        let extracted = extract(doc);
        assert!(!extracted.markdown.contains("script"));
        assert!(!extracted.markdown.contains("onclick"));
        assert!(extracted.markdown.contains("Before"));
        assert!(extracted.markdown.contains("After"));
    }

    #[test]
    fn tilde_fences_normalized() {
        let extracted = extract("~~~rust\nlet x = 1;\n~~~\n");
        assert_eq!(extracted.markdown, "```rust\nlet x = 1;\n```");
    }

    #[test]
    fn four_tilde_fence_keeps_length() {
        let extracted = extract("~~~~\ncode\n~~~~\n");
        assert_eq!(extracted.markdown, "````\ncode\n````");
    }

    #[test]
    fn dash_rule_is_not_frontmatter_mid_document() {
        let doc = "Intro paragraph.\n\n---\n\nMore text.";
        let extracted = extract(doc);
        assert_eq!(extracted.markdown, doc);
        assert!(extracted.title.is_none());
    }

    #[test]
    fn unclosed_frontmatter_left_alone() {
        let doc = "---\ntitle: dangling";
        let extracted = extract(doc);
        assert!(extracted.markdown.contains("title: dangling"));
    }
}
