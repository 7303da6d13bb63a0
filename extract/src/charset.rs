//! Charset decoding for response bodies.
//!
//! UTF-8 is the default. The supported matrix covers the charsets that
//! actually appear on the web; anything else decodes as lossy UTF-8 with a
//! fallback flag the normalizer turns into an `extraction_fallback` warning.

use encoding_rs::Encoding;

/// Decode `bytes` under the declared charset.
///
/// Returns the text and whether a fallback was taken (unknown charset, or
/// replacement characters substituted for malformed sequences).
#[must_use]
pub fn decode(bytes: &[u8], charset: Option<&str>) -> (String, bool) {
    let label = charset.unwrap_or("utf-8").trim().to_ascii_lowercase();

    let encoding = match label.as_str() {
        "utf-8" | "utf8" | "" => encoding_rs::UTF_8,
        "utf-16" | "utf-16le" => encoding_rs::UTF_16LE,
        "utf-16be" => encoding_rs::UTF_16BE,
        // ASCII is a strict subset of windows-1252's mapping
        "ascii" | "us-ascii" => encoding_rs::WINDOWS_1252,
        "latin1" | "latin-1" | "iso-8859-1" | "windows-1252" | "cp1252" => {
            encoding_rs::WINDOWS_1252
        }
        other => match Encoding::for_label(other.as_bytes()) {
            // Other iso-8859-* parts and anything else encoding_rs knows
            Some(known) => known,
            None => {
                tracing::warn!(charset = other, "unknown charset, decoding as UTF-8");
                let (text, _, _) = encoding_rs::UTF_8.decode(bytes);
                return (text.into_owned(), true);
            }
        },
    };

    let (text, _, had_errors) = encoding.decode(bytes);
    (text.into_owned(), had_errors)
}
