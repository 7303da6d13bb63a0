//! DOM subtree → Markdown serialization.
//!
//! ATX headings, fenced code blocks with language detection from
//! `class="language-X"`, GitHub-flavored tables with `|` escaping. The
//! sanitize policy is enforced here: denied, boilerplate, and hidden
//! elements never emit, and URL attributes pass the scheme filter. Link
//! and image targets resolve against the document base URL when one is
//! known.

use scraper::{ElementRef, Node};
use url::Url;

use super::sanitize;

/// Serialize an element's content as Markdown blocks.
#[must_use]
pub fn convert(root: ElementRef<'_>, base_url: Option<&Url>) -> String {
    let converter = Converter { base_url };
    converter.container(root).join("\n\n")
}

/// Tags rendered inside a paragraph rather than as their own block.
const INLINE_TAGS: &[&str] = &[
    "a", "abbr", "b", "br", "cite", "code", "del", "em", "i", "img", "ins", "kbd", "mark", "q",
    "s", "small", "span", "strong", "sub", "sup", "time", "u", "var", "wbr",
];

fn is_inline(name: &str) -> bool {
    INLINE_TAGS.contains(&name)
}

fn skip(el: &ElementRef<'_>) -> bool {
    sanitize::is_denied_tag(el.value().name())
        || sanitize::is_boilerplate(el)
        || sanitize::is_hidden(el)
}

/// Conversion state: the base URL for resolving relative targets.
struct Converter<'a> {
    base_url: Option<&'a Url>,
}

impl Converter<'_> {
    /// Filter and resolve a URL attribute. Dangerous schemes are dropped;
    /// relative targets resolve against the base when one is known.
    fn resolve(&self, raw: &str) -> Option<String> {
        let safe = sanitize::safe_url(raw)?;
        if let Some(base) = self.base_url
            && let Ok(resolved) = base.join(safe)
        {
            return Some(resolved.to_string());
        }
        Some(safe.to_string())
    }

    /// Render mixed children as a sequence of Markdown blocks, grouping
    /// loose inline runs into paragraphs.
    fn container(&self, el: ElementRef<'_>) -> Vec<String> {
        let mut blocks: Vec<String> = Vec::new();
        let mut inline_run = String::new();

        let flush = |run: &mut String, blocks: &mut Vec<String>| {
            let text = normalize_inline(run);
            if !text.is_empty() {
                blocks.push(text);
            }
            run.clear();
        };

        for child in el.children() {
            match child.value() {
                Node::Text(text) => inline_run.push_str(text),
                Node::Element(_) => {
                    let Some(child_el) = ElementRef::wrap(child) else {
                        continue;
                    };
                    if skip(&child_el) {
                        continue;
                    }
                    if is_inline(child_el.value().name()) {
                        self.inline(child_el, &mut inline_run);
                    } else {
                        flush(&mut inline_run, &mut blocks);
                        blocks.extend(self.block(child_el));
                    }
                }
                _ => {} // comments, processing instructions
            }
        }
        flush(&mut inline_run, &mut blocks);

        blocks
    }

    fn block(&self, el: ElementRef<'_>) -> Vec<String> {
        let name = el.value().name();
        match name {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = name[1..].parse::<usize>().unwrap_or(1);
                let text = self.inline_text(el);
                if text.is_empty() {
                    Vec::new()
                } else {
                    vec![format!("{} {}", "#".repeat(level), text)]
                }
            }
            "p" => {
                let text = self.inline_text(el);
                if text.is_empty() { Vec::new() } else { vec![text] }
            }
            "pre" => render_code_block(el).into_iter().collect(),
            "blockquote" => {
                let inner = self.container(el).join("\n\n");
                if inner.is_empty() {
                    Vec::new()
                } else {
                    let quoted: Vec<String> = inner
                        .lines()
                        .map(|line| {
                            if line.is_empty() {
                                ">".to_string()
                            } else {
                                format!("> {line}")
                            }
                        })
                        .collect();
                    vec![quoted.join("\n")]
                }
            }
            "ul" | "ol" => self.list(el).into_iter().collect(),
            "table" => self.table(el).into_iter().collect(),
            "hr" => vec!["---".to_string()],
            // A stray li outside a list renders its content directly
            _ => self.container(el),
        }
    }

    fn list(&self, el: ElementRef<'_>) -> Option<String> {
        let ordered = el.value().name() == "ol";
        let mut items: Vec<String> = Vec::new();
        let mut index = 0usize;

        for child in el.child_elements() {
            if child.value().name() != "li" || skip(&child) {
                continue;
            }
            index += 1;
            let marker = if ordered {
                format!("{index}.")
            } else {
                "-".to_string()
            };

            let inner = self.container(child).join("\n");
            if inner.is_empty() {
                continue;
            }
            let mut lines = inner.lines();
            let first = lines.next().unwrap_or_default();
            let mut item = format!("{marker} {first}");
            for line in lines {
                item.push('\n');
                if line.is_empty() {
                    continue;
                }
                // Continuation lines (including nested list items, which
                // carry their own markers) sit two spaces under the item.
                item.push_str(&format!("  {line}"));
            }
            items.push(item);
        }

        if items.is_empty() {
            None
        } else {
            Some(items.join("\n"))
        }
    }

    fn table(&self, el: ElementRef<'_>) -> Option<String> {
        let mut rows: Vec<Vec<String>> = Vec::new();
        self.collect_rows(el, &mut rows);
        if rows.is_empty() {
            return None;
        }

        let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
        if columns == 0 {
            return None;
        }
        for row in &mut rows {
            row.resize(columns, String::new());
        }

        let mut out = String::new();
        let header = &rows[0];
        out.push_str(&format!("| {} |", header.join(" | ")));
        out.push('\n');
        out.push_str(&format!("| {} |", vec!["---"; columns].join(" | ")));
        for row in &rows[1..] {
            out.push('\n');
            out.push_str(&format!("| {} |", row.join(" | ")));
        }
        Some(out)
    }

    fn collect_rows(&self, el: ElementRef<'_>, rows: &mut Vec<Vec<String>>) {
        for child in el.child_elements() {
            match child.value().name() {
                "tr" => {
                    let cells: Vec<String> = child
                        .child_elements()
                        .filter(|c| matches!(c.value().name(), "td" | "th"))
                        .map(|c| self.inline_text(c).replace('|', "\\|"))
                        .collect();
                    if !cells.is_empty() {
                        rows.push(cells);
                    }
                }
                "thead" | "tbody" | "tfoot" => self.collect_rows(child, rows),
                _ => {}
            }
        }
    }

    /// Render an inline element into the running buffer.
    fn inline(&self, el: ElementRef<'_>, out: &mut String) {
        if skip(&el) {
            return;
        }
        match el.value().name() {
            "br" => out.push('\n'),
            "img" => {
                let alt = el.value().attr("alt").unwrap_or("").trim();
                let src = el.value().attr("src").and_then(|s| self.resolve(s));
                if let Some(src) = src {
                    out.push_str(&format!("![{alt}]({src})"));
                } else if !alt.is_empty() {
                    out.push_str(alt);
                }
            }
            "a" => {
                let mut text = String::new();
                self.inline_children(el, &mut text);
                let text = text.trim();
                let href = el.value().attr("href").and_then(|h| self.resolve(h));
                match href {
                    Some(href) if !text.is_empty() => {
                        out.push_str(&format!("[{text}]({href})"));
                    }
                    _ => out.push_str(text),
                }
            }
            "code" | "kbd" | "var" => {
                let text: String = el.text().collect();
                let text = text.trim();
                if !text.is_empty() {
                    out.push_str(&format!("`{text}`"));
                }
            }
            "strong" | "b" => self.wrap(el, out, "**"),
            "em" | "i" | "cite" => self.wrap(el, out, "*"),
            "del" | "s" => self.wrap(el, out, "~~"),
            _ => self.inline_children(el, out),
        }
    }

    fn wrap(&self, el: ElementRef<'_>, out: &mut String, marker: &str) {
        let mut text = String::new();
        self.inline_children(el, &mut text);
        let text = text.trim();
        if !text.is_empty() {
            out.push_str(&format!("{marker}{text}{marker}"));
        }
    }

    fn inline_children(&self, el: ElementRef<'_>, out: &mut String) {
        for child in el.children() {
            match child.value() {
                Node::Text(text) => out.push_str(text),
                Node::Element(_) => {
                    if let Some(child_el) = ElementRef::wrap(child) {
                        self.inline(child_el, out);
                    }
                }
                _ => {}
            }
        }
    }

    /// Inline content of an element with whitespace collapsed.
    fn inline_text(&self, el: ElementRef<'_>) -> String {
        let mut out = String::new();
        self.inline_children(el, &mut out);
        normalize_inline(&out)
    }
}

fn render_code_block(pre: ElementRef<'_>) -> Option<String> {
    let mut lang = String::new();
    for descendant in pre.descendent_elements() {
        if descendant.value().name() == "code"
            && let Some(class) = descendant.value().attr("class")
        {
            for token in class.split_whitespace() {
                if let Some(l) = token
                    .strip_prefix("language-")
                    .or_else(|| token.strip_prefix("lang-"))
                {
                    lang = l.to_string();
                    break;
                }
            }
        }
    }

    let code: String = pre.text().collect();
    let code = code.trim_matches('\n');
    if code.trim().is_empty() {
        return None;
    }

    // A fence longer than any backtick run in the body keeps it intact.
    let mut fence_len = 3;
    let mut run = 0;
    for c in code.chars() {
        if c == '`' {
            run += 1;
            fence_len = fence_len.max(run + 1);
        } else {
            run = 0;
        }
    }
    let fence = "`".repeat(fence_len);

    Some(format!("{fence}{lang}\n{code}\n{fence}"))
}

/// Collapse runs of whitespace, preserving explicit `<br>` newlines.
fn normalize_inline(raw: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    for line in raw.split('\n') {
        lines.push(line.split_whitespace().collect::<Vec<_>>().join(" "));
    }
    while lines.last().is_some_and(String::is_empty) {
        lines.pop();
    }
    while lines.first().is_some_and(String::is_empty) {
        lines.remove(0);
    }
    lines.join("\n")
}
