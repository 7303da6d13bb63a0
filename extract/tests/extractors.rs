//! Cross-format extraction tests: detection drives dispatch, and every
//! extractor lands on the common intermediate form.

use quarry_extract::{ContentKind, detect, extract};

fn run(kind: ContentKind, body: &str) -> quarry_extract::ExtractedContent {
    extract(kind, body, body.as_bytes(), Some("https://example.com/doc")).expect("extract")
}

#[test]
fn html_detected_and_extracted() {
    let html = r#"<!DOCTYPE html>
<html lang="en"><head><title>Detected Page</title></head>
<body><main><h1>Detected Page</h1>
<p>A reasonable amount of paragraph text so extraction has something to
keep, spread over a couple of sentences for good measure.</p>
</main></body></html>"#;

    let detected = detect::detect(Some("text/html; charset=utf-8"), html.as_bytes());
    assert_eq!(detected.kind, ContentKind::Html);

    let extracted = run(detected.kind, html);
    assert_eq!(extracted.title.as_deref(), Some("Detected Page"));
    assert!(extracted.markdown.starts_with("# Detected Page"));
    assert_eq!(extracted.lang.as_deref(), Some("en"));
}

#[test]
fn markdown_sniffed_from_text_plain() {
    let doc = "---\ntitle: Sniffed Post\n---\n\n# Sniffed Post\n\nBody paragraph here.";
    let detected = detect::detect(Some("text/plain"), doc.as_bytes());
    assert_eq!(detected.kind, ContentKind::Markdown);

    let extracted = run(detected.kind, doc);
    assert_eq!(extracted.title.as_deref(), Some("Sniffed Post"));
    assert!(!extracted.markdown.contains("title:"));
}

#[test]
fn json_summarized_not_dumped() {
    let doc = r#"{"name": "quarry", "versions": [1, 2, 3], "active": true}"#;
    let detected = detect::detect(Some("application/json"), doc.as_bytes());
    assert_eq!(detected.kind, ContentKind::Json);

    let extracted = run(detected.kind, doc);
    assert!(extracted.markdown.contains("## Structure"));
    assert!(extracted.markdown.contains("Top-level object with 3 keys."));
}

#[test]
fn rss_feed_rendered() {
    let doc = r#"<?xml version="1.0"?><rss version="2.0"><channel>
<title>Feed Title</title>
<item><title>Post</title><link>https://example.com/post</link></item>
</channel></rss>"#;
    let detected = detect::detect(Some("application/rss+xml"), doc.as_bytes());
    assert_eq!(detected.kind, ContentKind::Xml);

    let extracted = run(detected.kind, doc);
    assert!(extracted.markdown.contains("# Feed Title"));
    assert!(extracted.markdown.contains("[Post](https://example.com/post)"));
}

#[test]
fn plain_text_structure_inferred() {
    let doc = "GETTING STARTED\n\nInstall the package first.\n\n- download it\n- unpack it";
    let detected = detect::detect(Some("text/plain"), doc.as_bytes());
    assert_eq!(detected.kind, ContentKind::Text);

    let extracted = run(detected.kind, doc);
    assert!(extracted.markdown.contains("## GETTING STARTED"));
    assert!(extracted.markdown.contains("- download it"));
}

#[test]
fn unknown_kind_fails_extraction() {
    let err = extract(ContentKind::Unknown, "", b"", None).unwrap_err();
    assert_eq!(err.code, quarry_types::ErrorCode::ExtractionFailed);
}

#[test]
fn full_article_golden_markdown() {
    let html = r#"<!DOCTYPE html>
<html lang="en">
<head><title>Deploying Quarry</title></head>
<body>
  <nav><a href="/">home</a> <a href="/docs">docs</a></nav>
  <div class="cookie-consent">We use cookies. <button>Accept</button></div>
  <main>
    <h1>Deploying Quarry</h1>
    <p>This guide walks through a production deployment, covering the
       prerequisites, configuration, and a health check at the end of
       the process so nothing is left to guesswork.</p>
    <h2>Prerequisites</h2>
    <ul>
      <li>a Linux host</li>
      <li>an <strong>API token</strong> with fetch scope</li>
    </ul>
    <h2>Configuration</h2>
    <pre><code class="language-sh">export QUARRY_MAX_BYTES=10485760
export QUARRY_RESPECT_ROBOTS=true</code></pre>
    <p>Set both variables before starting the service, then verify with
       the <code>status</code> subcommand.</p>
    <table>
      <tr><th>Variable</th><th>Default</th></tr>
      <tr><td>QUARRY_TIMEOUT_MS</td><td>30000</td></tr>
    </table>
  </main>
  <footer>© example.com</footer>
</body>
</html>"#;

    let extracted = run(ContentKind::Html, html);
    let expected = "\
# Deploying Quarry

This guide walks through a production deployment, covering the prerequisites, configuration, and a health check at the end of the process so nothing is left to guesswork.

## Prerequisites

- a Linux host
- an **API token** with fetch scope

## Configuration

```sh
export QUARRY_MAX_BYTES=10485760
export QUARRY_RESPECT_ROBOTS=true
```

Set both variables before starting the service, then verify with the `status` subcommand.

| Variable | Default |
| --- | --- |
| QUARRY_TIMEOUT_MS | 30000 |";

    assert_eq!(extracted.markdown, expected);
    assert_eq!(extracted.title.as_deref(), Some("Deploying Quarry"));
}
