//! Mojibake detection and repair.
//!
//! Ported from `original_source/src/core_utils.py`'s `detect_mojibake`/
//! `try_fix_mojibake`: provider responses are occasionally UTF-8 text that
//! got decoded as Latin-1 or Windows-1252 somewhere upstream. Detection
//! counts known garbled byte-sequence signatures; repair re-encodes the
//! text a byte at a time and re-decodes as UTF-8, keeping the result only
//! if it strictly reduces the signature count.

const PATTERNS: &[&str] = &[
    "Ã¡", "Ã¢", "Ã£", "Ã¤", "Ã¥", "Ã¦", "Ã§", "Ã¨", "Ã©", "Ãª", "Ã«",
    "â€™", "â€œ", "â€\u{9d}", "â€¦", "â€\"",
    "Ã¢â‚¬", "Ã‚Â", "Ã¢â€", "Ã¯Â»Â¿", "â€¹", "â€º",
    "Ã¢â‚¬Â", "ÃƒÂ", "Ã¢â‚¬â„¢", "Ã¢â‚¬Å\"",
    "Ã‚Â§", "Ã‚Â©", "Ã‚Â®",
];

/// Counts occurrences of known mojibake byte-sequence signatures.
#[must_use]
pub fn mojibake_signature_count(text: &str) -> usize {
    PATTERNS.iter().map(|pattern| text.matches(pattern).count()).sum()
}

/// Whether `text` is likely mojibake, by signature density or a high
/// non-ASCII ratio combined with several signature hits (mirrors the
/// Python threshold of 0.15 signature ratio, or >0.3 non-ASCII ratio with
/// more than 5 signature hits).
#[must_use]
pub fn looks_like_mojibake(text: &str) -> bool {
    let total_chars = text.chars().count();
    if total_chars < 10 {
        return false;
    }
    let signature_count = mojibake_signature_count(text);
    let non_ascii_count = text.chars().filter(|c| !c.is_ascii()).count();

    #[allow(clippy::cast_precision_loss)]
    let signature_ratio = signature_count as f64 / total_chars as f64;
    #[allow(clippy::cast_precision_loss)]
    let non_ascii_ratio = non_ascii_count as f64 / total_chars as f64;

    signature_ratio > 0.15 || (non_ascii_ratio > 0.3 && signature_count > 5)
}

/// Attempts to repair mojibake by reinterpreting `text` as Latin-1, then
/// Windows-1252, bytes that were actually UTF-8. Returns the repaired text
/// only if doing so strictly reduces the signature count; otherwise
/// returns `text` unchanged.
#[must_use]
pub fn try_fix(text: &str) -> String {
    let original_count = mojibake_signature_count(text);
    if original_count == 0 {
        return text.to_string();
    }

    for candidate in [encode_latin1(text), encode_windows1252(text)].into_iter().flatten() {
        if let Ok(fixed) = String::from_utf8(candidate) {
            if mojibake_signature_count(&fixed) < original_count {
                return fixed;
            }
        }
    }

    text.to_string()
}

/// Encodes `text` as Latin-1 bytes, one byte per char in `U+0000..=U+00FF`.
/// Fails (returns `None`) if any char falls outside that range, mirroring
/// Python's `UnicodeEncodeError`.
fn encode_latin1(text: &str) -> Option<Vec<u8>> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).ok())
        .collect()
}

/// Encodes `text` as Windows-1252 bytes: identical to Latin-1 except for
/// the `U+0080..=U+009F` control range, which Windows-1252 maps to its own
/// set of printable characters (smart quotes, dashes, and similar).
fn encode_windows1252(text: &str) -> Option<Vec<u8>> {
    text.chars().map(windows1252_byte).collect()
}

fn windows1252_byte(c: char) -> Option<u8> {
    match c {
        '\u{20AC}' => Some(0x80),
        '\u{201A}' => Some(0x82),
        '\u{0192}' => Some(0x83),
        '\u{201E}' => Some(0x84),
        '\u{2026}' => Some(0x85),
        '\u{2020}' => Some(0x86),
        '\u{2021}' => Some(0x87),
        '\u{02C6}' => Some(0x88),
        '\u{2030}' => Some(0x89),
        '\u{0160}' => Some(0x8A),
        '\u{2039}' => Some(0x8B),
        '\u{0152}' => Some(0x8C),
        '\u{017D}' => Some(0x8E),
        '\u{2018}' => Some(0x91),
        '\u{2019}' => Some(0x92),
        '\u{201C}' => Some(0x93),
        '\u{201D}' => Some(0x94),
        '\u{2022}' => Some(0x95),
        '\u{2013}' => Some(0x96),
        '\u{2014}' => Some(0x97),
        '\u{02DC}' => Some(0x98),
        '\u{2122}' => Some(0x99),
        '\u{0161}' => Some(0x9A),
        '\u{203A}' => Some(0x9B),
        '\u{0153}' => Some(0x9C),
        '\u{017E}' => Some(0x9E),
        '\u{0178}' => Some(0x9F),
        _ => u8::try_from(u32::from(c)).ok(),
    }
}

/// Scans and repairs `text` if it looks like mojibake. A backend calls this
/// on every piece of generated text before returning it, per the
/// scan-after-any-text-generation law: if detection fires but re-decoding
/// does not strictly reduce the signature count, the original is kept and a
/// warning is logged instead of silently returning the (unrepaired) text.
#[must_use]
pub fn scan_and_repair(text: &str) -> String {
    if !looks_like_mojibake(text) {
        return text.to_string();
    }

    let fixed = try_fix(text);
    if mojibake_signature_count(&fixed) >= mojibake_signature_count(text) {
        tracing::warn!("possible mojibake detected but could not be repaired");
        return text.to_string();
    }
    fixed
}
