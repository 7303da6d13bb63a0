//! Plain-text extraction: infer document structure from layout.
//!
//! Recognizes underlined and ALL-CAPS headings, bullet and numbered lists,
//! and indented code blocks. A document that scores as source code is
//! emitted as one fenced block instead of being reinterpreted.

use crate::ExtractedContent;

/// Substrings that mark a line as likely source code.
const CODE_INDICATORS: &[&str] = &[
    "fn ", "def ", "class ", "import ", "#include", "function ", "return ", "const ", "let ",
    "var ", "};", ") {", "=>", "==", "&&", "||", "public ", "private ",
];

/// Fraction of code-scoring lines above which the whole document is code.
const CODE_LINE_RATIO: f64 = 0.4;

/// Extract a plain-text document.
#[must_use]
pub fn extract(text: &str) -> ExtractedContent {
    let normalized = text.replace("\r\n", "\n");

    if looks_like_code(&normalized) {
        let body = normalized.trim_matches('\n');
        return ExtractedContent {
            markdown: format!("```\n{body}\n```"),
            text: normalized.trim().to_string(),
            ..Default::default()
        };
    }

    let markdown = infer_structure(&normalized);
    let title = first_heading_text(&markdown);

    ExtractedContent {
        title,
        text: normalized.trim().to_string(),
        markdown,
        ..Default::default()
    }
}

fn looks_like_code(text: &str) -> bool {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.len() < 5 {
        return false;
    }
    let code_lines = lines
        .iter()
        .filter(|line| CODE_INDICATORS.iter().any(|ind| line.contains(ind)))
        .count();
    code_lines as f64 / lines.len() as f64 > CODE_LINE_RATIO
}

fn infer_structure(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let mut out: Vec<String> = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        let trimmed = line.trim_end();

        // Underline headings: a text line followed by === or ---
        if i + 1 < lines.len()
            && !trimmed.trim().is_empty()
            && let Some(level) = underline_level(lines[i + 1])
        {
            out.push(format!("{} {}", "#".repeat(level), trimmed.trim()));
            out.push(String::new());
            i += 2;
            continue;
        }

        if is_all_caps_heading(trimmed) {
            out.push(format!("## {}", trimmed.trim()));
            out.push(String::new());
            i += 1;
            continue;
        }

        // Indented code blocks
        if is_indented_code(line) {
            let mut block: Vec<String> = Vec::new();
            while i < lines.len() && (is_indented_code(lines[i]) || lines[i].trim().is_empty()) {
                if lines[i].trim().is_empty() && block.is_empty() {
                    break;
                }
                block.push(dedent(lines[i]));
                i += 1;
            }
            while block.last().is_some_and(|l| l.trim().is_empty()) {
                block.pop();
            }
            if !block.is_empty() {
                out.push(format!("```\n{}\n```", block.join("\n")));
                out.push(String::new());
                continue;
            }
        }

        if let Some(item) = as_list_item(trimmed) {
            out.push(item);
            i += 1;
            continue;
        }

        out.push(trimmed.to_string());
        i += 1;
    }

    // Collapse runs of blank lines
    let mut collapsed: Vec<String> = Vec::new();
    for line in out {
        if line.is_empty() && collapsed.last().is_some_and(String::is_empty) {
            continue;
        }
        collapsed.push(line);
    }
    collapsed.join("\n").trim().to_string()
}

fn underline_level(line: &str) -> Option<usize> {
    let trimmed = line.trim();
    if trimmed.len() < 3 {
        return None;
    }
    if trimmed.chars().all(|c| c == '=') {
        Some(1)
    } else if trimmed.chars().all(|c| c == '-') {
        Some(2)
    } else {
        None
    }
}

fn is_all_caps_heading(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.len() < 3 || trimmed.len() > 80 || trimmed.ends_with('.') {
        return false;
    }
    let letters: Vec<char> = trimmed.chars().filter(|c| c.is_alphabetic()).collect();
    letters.len() >= 3 && letters.iter().all(|c| c.is_uppercase())
}

fn is_indented_code(line: &str) -> bool {
    !line.trim().is_empty() && (line.starts_with("    ") || line.starts_with('\t'))
}

fn dedent(line: &str) -> String {
    line.strip_prefix("    ")
        .or_else(|| line.strip_prefix('\t'))
        .unwrap_or(line)
        .to_string()
}

fn as_list_item(line: &str) -> Option<String> {
    let trimmed = line.trim_start();
    for bullet in ["- ", "* ", "+ ", "• "] {
        if let Some(rest) = trimmed.strip_prefix(bullet) {
            return Some(format!("- {rest}"));
        }
    }

    // "1." or "1)" numbered items
    let digits: String = trimmed.chars().take_while(char::is_ascii_digit).collect();
    if !digits.is_empty() {
        let rest = &trimmed[digits.len()..];
        if let Some(body) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return Some(format!("{digits}. {body}"));
        }
    }
    None
}

fn first_heading_text(markdown: &str) -> Option<String> {
    markdown
        .lines()
        .find(|l| l.starts_with('#'))
        .map(|l| l.trim_start_matches('#').trim().to_string())
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn underline_headings_promoted() {
        let doc = "Main Title\n==========\n\nIntro text.\n\nSection\n-------\n\nBody.";
        let extracted = extract(doc);
        assert!(extracted.markdown.starts_with("# Main Title"));
        assert!(extracted.markdown.contains("## Section"));
        assert_eq!(extracted.title.as_deref(), Some("Main Title"));
    }

    #[test]
    fn all_caps_lines_become_headings() {
        let doc = "INTRODUCTION\n\nSome text about the topic.\n\nNEXT STEPS\n\nMore text.";
        let extracted = extract(doc);
        assert!(extracted.markdown.contains("## INTRODUCTION"));
        assert!(extracted.markdown.contains("## NEXT STEPS"));
    }

    #[test]
    fn sentences_are_not_headings() {
        let doc = "THIS IS A SHOUTED SENTENCE THAT ENDS WITH A PERIOD AND IS NOT A HEADING AT ALL, REALLY.\n\ntext";
        let extracted = extract(doc);
        assert!(!extracted.markdown.contains("##"));
    }

    #[test]
    fn bullets_normalized() {
        let doc = "Items:\n* first\n• second\n- third";
        let extracted = extract(doc);
        assert!(extracted.markdown.contains("- first"));
        assert!(extracted.markdown.contains("- second"));
        assert!(extracted.markdown.contains("- third"));
    }

    #[test]
    fn numbered_lists_kept() {
        let doc = "Steps:\n1. unpack\n2) configure\n3. run";
        let extracted = extract(doc);
        assert!(extracted.markdown.contains("1. unpack"));
        assert!(extracted.markdown.contains("2. configure"));
        assert!(extracted.markdown.contains("3. run"));
    }

    #[test]
    fn indented_block_fenced() {
        let doc = "Example:\n\n    let x = compute();\n    println(x);\n\nDone.";
        let extracted = extract(doc);
        assert!(
            extracted
                .markdown
                .contains("```\nlet x = compute();\nprintln(x);\n```")
        );
    }

    #[test]
    fn code_heavy_document_fenced_whole() {
        let doc = "fn main() {\n    let x = 1;\n    let y = 2;\n    return x + y;\n}\nfn other() {\n}";
        let extracted = extract(doc);
        assert!(extracted.markdown.starts_with("```\n"));
        assert!(extracted.markdown.ends_with("\n```"));
        assert!(extracted.markdown.contains("fn main()"));
    }

    #[test]
    fn plain_prose_left_as_paragraphs() {
        let doc = "First paragraph of ordinary text.\n\nSecond paragraph here.";
        let extracted = extract(doc);
        assert_eq!(extracted.markdown, doc);
    }
}
