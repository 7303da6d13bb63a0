//! XML extraction: RSS/Atom feeds rendered as Markdown, with a generic
//! tree summary for everything else.

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::ExtractedContent;

pub const MAX_FEED_ITEMS: usize = 20;

const TREE_MAX_DEPTH: usize = 4;
const TREE_MAX_CHILDREN: usize = 10;

#[derive(Debug, Default)]
struct FeedItem {
    title: Option<String>,
    link: Option<String>,
    date: Option<String>,
    summary: Option<String>,
}

#[derive(Debug, Default)]
struct Feed {
    title: Option<String>,
    description: Option<String>,
    items: Vec<FeedItem>,
    /// Items seen beyond [`MAX_FEED_ITEMS`].
    overflow: usize,
}

/// Extract an XML document.
#[must_use]
pub fn extract(text: &str) -> ExtractedContent {
    match parse_feed(text) {
        Some(feed) => render_feed(&feed),
        None => render_tree(text),
    }
}

/// Parse RSS (`<rss><channel>`) or Atom (`<feed>`); `None` for anything
/// else.
fn parse_feed(text: &str) -> Option<Feed> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut feed = Feed::default();
    let mut path: Vec<String> = Vec::new();
    let mut is_feed = false;
    let mut atom = false;
    let mut current: Option<FeedItem> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = local_name(e.name().as_ref());
                if path.is_empty() {
                    match name.as_str() {
                        "rss" => is_feed = true,
                        "feed" => {
                            is_feed = true;
                            atom = true;
                        }
                        _ => return None,
                    }
                }
                if matches!(name.as_str(), "item" | "entry") {
                    current = Some(FeedItem::default());
                }
                // Atom carries the link as an attribute
                if atom && name == "link"
                    && let Some(item) = current.as_mut()
                    && item.link.is_none()
                {
                    item.link = attr(&e, b"href");
                }
                path.push(name);
            }
            Ok(Event::Empty(e)) => {
                let name = local_name(e.name().as_ref());
                if atom && name == "link"
                    && let Some(item) = current.as_mut()
                    && item.link.is_none()
                {
                    item.link = attr(&e, b"href");
                }
            }
            Ok(Event::Text(e)) => {
                let Ok(value) = e.unescape() else { continue };
                let value = value.trim().to_string();
                if value.is_empty() {
                    continue;
                }
                record_text(&mut feed, current.as_mut(), &path, value);
            }
            Ok(Event::CData(e)) => {
                let value = String::from_utf8_lossy(&e).trim().to_string();
                if !value.is_empty() {
                    record_text(&mut feed, current.as_mut(), &path, value);
                }
            }
            Ok(Event::End(e)) => {
                let name = local_name(e.name().as_ref());
                if matches!(name.as_str(), "item" | "entry")
                    && let Some(item) = current.take()
                {
                    if feed.items.len() < MAX_FEED_ITEMS {
                        feed.items.push(item);
                    } else {
                        feed.overflow += 1;
                    }
                }
                path.pop();
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(_) => return None,
        }
    }

    if is_feed { Some(feed) } else { None }
}

fn record_text(feed: &mut Feed, current: Option<&mut FeedItem>, path: &[String], value: String) {
    let Some(leaf) = path.last() else { return };
    let in_item = path.iter().any(|p| p == "item" || p == "entry");

    if let Some(item) = current {
        if !in_item {
            return;
        }
        match leaf.as_str() {
            "title" if item.title.is_none() => item.title = Some(value),
            "link" if item.link.is_none() => item.link = Some(value),
            "pubDate" | "published" | "updated" | "date" if item.date.is_none() => {
                item.date = Some(value);
            }
            "description" | "summary" | "content" if item.summary.is_none() => {
                item.summary = Some(value);
            }
            _ => {}
        }
        return;
    }

    // Channel/feed level metadata
    match leaf.as_str() {
        "title" if feed.title.is_none() => feed.title = Some(value),
        "description" | "subtitle" if feed.description.is_none() => {
            feed.description = Some(value);
        }
        _ => {}
    }
}

fn render_feed(feed: &Feed) -> ExtractedContent {
    let title = feed.title.clone().unwrap_or_else(|| "Feed".to_string());
    let mut markdown = format!("# {title}");
    if let Some(description) = &feed.description {
        markdown.push_str(&format!("\n\n{description}"));
    }

    for item in &feed.items {
        let item_title = item.title.as_deref().unwrap_or("(untitled)");
        match &item.link {
            Some(link) => markdown.push_str(&format!("\n\n## [{item_title}]({link})")),
            None => markdown.push_str(&format!("\n\n## {item_title}")),
        }
        if let Some(date) = &item.date {
            markdown.push_str(&format!("\n\n*{date}*"));
        }
        if let Some(summary) = &item.summary {
            let summary = summary.split_whitespace().collect::<Vec<_>>().join(" ");
            let shown: String = summary.chars().take(500).collect();
            markdown.push_str(&format!("\n\n{shown}"));
        }
    }
    if feed.overflow > 0 {
        markdown.push_str(&format!("\n\n*{} more items omitted.*", feed.overflow));
    }

    ExtractedContent {
        title: feed.title.clone(),
        text: crate::html::plain_text(&markdown),
        markdown,
        ..Default::default()
    }
}

/// Generic tree summary: element names with child counts, bounded in depth
/// and fan-out.
fn render_tree(text: &str) -> ExtractedContent {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut lines: Vec<String> = Vec::new();
    let mut depth = 0usize;
    // Children emitted at each open depth, for the fan-out cap.
    let mut emitted: Vec<usize> = vec![0];
    let mut root: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = local_name(e.name().as_ref());
                if root.is_none() {
                    root = Some(name.clone());
                }
                if depth <= TREE_MAX_DEPTH {
                    let siblings = emitted.last_mut().map(|c| {
                        *c += 1;
                        *c
                    });
                    match siblings {
                        Some(count) if count <= TREE_MAX_CHILDREN => {
                            lines.push(format!("{}- `{name}`", "  ".repeat(depth)));
                        }
                        Some(count) if count == TREE_MAX_CHILDREN + 1 => {
                            lines.push(format!("{}- ...", "  ".repeat(depth)));
                        }
                        _ => {}
                    }
                }
                depth += 1;
                emitted.push(0);
            }
            Ok(Event::Empty(e)) => {
                let name = local_name(e.name().as_ref());
                if depth <= TREE_MAX_DEPTH
                    && let Some(count) = emitted.last_mut()
                {
                    *count += 1;
                    if *count <= TREE_MAX_CHILDREN {
                        lines.push(format!("{}- `{name}`", "  ".repeat(depth)));
                    } else if *count == TREE_MAX_CHILDREN + 1 {
                        lines.push(format!("{}- ...", "  ".repeat(depth)));
                    }
                }
            }
            Ok(Event::End(_)) => {
                depth = depth.saturating_sub(1);
                emitted.pop();
                if emitted.is_empty() {
                    emitted.push(0);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(_) => break,
        }
    }

    let root_name = root.unwrap_or_else(|| "document".to_string());
    let markdown = format!(
        "# XML Document\n\nRoot element: `{root_name}`\n\n## Element Tree\n\n{}",
        lines.join("\n")
    );

    ExtractedContent {
        text: crate::html::plain_text(&markdown),
        markdown,
        ..Default::default()
    }
}

fn local_name(raw: &[u8]) -> String {
    let name = String::from_utf8_lossy(raw);
    name.rsplit(':').next().unwrap_or(&name).to_string()
}

fn attr(e: &quick_xml::events::BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .filter_map(Result::ok)
        .find(|a| a.key.local_name().as_ref() == key)
        .and_then(|a| String::from_utf8(a.value.to_vec()).ok())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Example Blog</title>
    <description>Posts about things</description>
    <item>
      <title>First Post</title>
      <link>https://example.com/first</link>
      <pubDate>Mon, 02 Mar 2026 09:00:00 GMT</pubDate>
      <description>The first post summary.</description>
    </item>
    <item>
      <title>Second Post</title>
      <link>https://example.com/second</link>
    </item>
  </channel>
</rss>"#;

    const ATOM: &str = r#"<?xml version="1.0"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Feed</title>
  <entry>
    <title>Entry One</title>
    <link href="https://example.com/e1"/>
    <updated>2026-03-02T09:00:00Z</updated>
    <summary>Entry summary text.</summary>
  </entry>
</feed>"#;

    #[test]
    fn rss_rendered_as_feed() {
        let extracted = extract(RSS);
        assert_eq!(extracted.title.as_deref(), Some("Example Blog"));
        assert!(extracted.markdown.starts_with("# Example Blog"));
        assert!(
            extracted
                .markdown
                .contains("## [First Post](https://example.com/first)")
        );
        assert!(extracted.markdown.contains("The first post summary."));
        assert!(
            extracted
                .markdown
                .contains("## [Second Post](https://example.com/second)")
        );
    }

    #[test]
    fn atom_link_from_attribute() {
        let extracted = extract(ATOM);
        assert_eq!(extracted.title.as_deref(), Some("Atom Feed"));
        assert!(
            extracted
                .markdown
                .contains("## [Entry One](https://example.com/e1)")
        );
        assert!(extracted.markdown.contains("*2026-03-02T09:00:00Z*"));
    }

    #[test]
    fn feed_items_capped() {
        let mut doc = String::from("<rss><channel><title>Big</title>");
        for i in 0..30 {
            doc.push_str(&format!("<item><title>Post {i}</title></item>"));
        }
        doc.push_str("</channel></rss>");
        let extracted = extract(&doc);
        assert!(extracted.markdown.contains("## Post 19"));
        assert!(!extracted.markdown.contains("## Post 20"));
        assert!(extracted.markdown.contains("*10 more items omitted.*"));
    }

    #[test]
    fn generic_xml_gets_tree_summary() {
        let doc = "<config><server><host>x</host><port>80</port></server><debug>true</debug></config>";
        let extracted = extract(doc);
        assert!(extracted.markdown.starts_with("# XML Document"));
        assert!(extracted.markdown.contains("Root element: `config`"));
        assert!(extracted.markdown.contains("- `server`"));
        assert!(extracted.markdown.contains("  - `host`"));
    }

    #[test]
    fn tree_fan_out_capped() {
        let mut doc = String::from("<root>");
        for i in 0..15 {
            doc.push_str(&format!("<child{i}/>"));
        }
        doc.push_str("</root>");
        let extracted = extract(&doc);
        assert!(extracted.markdown.contains("- `child9`"));
        assert!(!extracted.markdown.contains("- `child10`"));
        assert!(extracted.markdown.contains("- ..."));
    }
}
