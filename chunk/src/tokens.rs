//! Heuristic token estimation.
//!
//! No tokenizer is loaded: counts are character-based with separate
//! weights for CJK text (which packs roughly one token per 1.5 chars) and
//! code (denser than prose). Estimates are used for budgeting only.

/// Chars per token for ordinary prose.
pub const PROSE_CHARS_PER_TOKEN: f64 = 3.5;

/// Chars per token when the text scores as code.
pub const CODE_CHARS_PER_TOKEN: f64 = 3.0;

/// Chars per token for CJK scripts.
pub const CJK_CHARS_PER_TOKEN: f64 = 1.5;

/// Quick indicators that a text is code rather than prose.
const CODE_INDICATORS: &[&str] = &["{", "};", "=>", "()", "fn ", "def ", "import ", "return ", "</"];

fn is_cjk(c: char) -> bool {
    matches!(u32::from(c),
        0x3040..=0x30FF      // hiragana, katakana
        | 0x3400..=0x9FFF    // CJK unified ideographs (ext A + base)
        | 0xAC00..=0xD7AF    // hangul syllables
        | 0xF900..=0xFAFF    // CJK compatibility ideographs
    )
}

fn looks_like_code(text: &str) -> bool {
    CODE_INDICATORS
        .iter()
        .filter(|ind| text.contains(**ind))
        .count()
        >= 2
}

/// Estimate the token count of a text.
///
/// # Examples
///
/// ```
/// use quarry_chunk::estimate_tokens;
///
/// assert_eq!(estimate_tokens(""), 0);
/// // Prose lands near one token per 3.5 chars
/// let prose = "a".repeat(350);
/// assert_eq!(estimate_tokens(&prose), 100);
/// ```
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }

    let cjk_chars = text.chars().filter(|c| is_cjk(*c)).count();
    let other_chars = text.chars().count() - cjk_chars;

    let per_token = if looks_like_code(text) {
        CODE_CHARS_PER_TOKEN
    } else {
        PROSE_CHARS_PER_TOKEN
    };

    let cjk_tokens = (cjk_chars as f64 / CJK_CHARS_PER_TOKEN).ceil() as usize;
    let other_tokens = (other_chars as f64 / per_token).ceil() as usize;
    cjk_tokens + other_tokens
}

/// Result of a boundary-aware truncation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Truncated {
    pub text: String,
    pub truncated: bool,
}

/// Cut `text` down to approximately `max_tokens`, preferring a paragraph,
/// sentence, or line boundary within 80–90% of the target length.
#[must_use]
pub fn truncate_to_tokens(text: &str, max_tokens: usize) -> Truncated {
    let est = estimate_tokens(text);
    if est <= max_tokens {
        return Truncated {
            text: text.to_string(),
            truncated: false,
        };
    }

    // Scale by the text's own chars-per-token ratio so code and CJK
    // content land near the budget too.
    let total_chars = text.chars().count();
    let target_chars = (total_chars as f64 * max_tokens as f64 / est as f64) as usize;
    let window_start = target_chars * 8 / 10;
    let window_end = (target_chars * 9 / 10).min(total_chars);

    let start_byte = byte_at_char(text, window_start);
    let end_byte = byte_at_char(text, window_end);
    let window = &text[start_byte..end_byte];

    let cut = window
        .rfind("\n\n")
        .map(|p| start_byte + p)
        .or_else(|| find_sentence_end(window).map(|p| start_byte + p))
        .or_else(|| window.rfind('\n').map(|p| start_byte + p))
        .unwrap_or(end_byte);

    Truncated {
        text: text[..cut].trim_end().to_string(),
        truncated: true,
    }
}

/// Last `. `/`! `/`? ` boundary in the window, returning the byte after
/// the punctuation.
fn find_sentence_end(window: &str) -> Option<usize> {
    let bytes = window.as_bytes();
    (1..bytes.len())
        .rev()
        .find(|&i| matches!(bytes[i - 1], b'.' | b'!' | b'?') && bytes[i] == b' ')
}

fn byte_at_char(text: &str, char_pos: usize) -> usize {
    text.char_indices()
        .nth(char_pos)
        .map_or(text.len(), |(b, _)| b)
}
