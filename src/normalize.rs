//! Text canonicalization for line comparison.
//!
//! Two lines compare equal here when they differ only in whitespace or in
//! Unicode look-alikes (smart quotes, dash variants, exotic spaces, invisible
//! format characters). The output of [`normalize_for_hash`] is the key the
//! fingerprinter hashes, so any change to these tables changes every anchor.

/// Map Unicode punctuation and space variants onto their ASCII equivalents and
/// drop invisible format/control characters.
///
/// `\t`, `\n` and `\r` are kept; whitespace removal is [`strip_whitespace`]'s job.
pub fn normalize_unicode(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            // Single quote variants
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' | '\u{2032}' | '\u{2035}'
            | '\u{2039}' | '\u{203A}' | '\u{FF07}' | '\u{02BC}' => out.push('\''),
            // Double quote variants
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{2033}' | '\u{2036}'
            | '\u{00AB}' | '\u{00BB}' | '\u{FF02}' => out.push('"'),
            // Hyphens, dashes and the minus sign
            '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' | '\u{2014}' | '\u{2015}'
            | '\u{2212}' | '\u{FE58}' | '\u{FE63}' | '\u{FF0D}' => out.push('-'),
            '\u{2026}' => out.push_str("..."),
            // Space variants
            '\u{00A0}' | '\u{1680}' | '\u{2000}'..='\u{200A}' | '\u{202F}' | '\u{205F}'
            | '\u{3000}' => out.push(' '),
            c if is_invisible(c) => {}
            c => out.push(c),
        }
    }
    out
}

/// Zero-width, bidi, BOM and C0/C1 control characters.
fn is_invisible(c: char) -> bool {
    matches!(
        c,
        '\u{00AD}'
            | '\u{200B}'..='\u{200F}'
            | '\u{202A}'..='\u{202E}'
            | '\u{2060}'..='\u{2064}'
            | '\u{2066}'..='\u{2069}'
            | '\u{FEFF}'
            | '\u{007F}'..='\u{009F}'
    ) || (c.is_ascii_control() && !matches!(c, '\t' | '\n' | '\r'))
}

/// Remove every whitespace character, including `\r` and Unicode spaces.
pub fn strip_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Produce the comparison key for a line.
///
/// Order matters: Unicode canonicalization first, then optional case folding,
/// then whitespace removal.
pub fn normalize_for_hash(text: &str, case_insensitive: bool) -> String {
    let canonical = normalize_unicode(text);
    if case_insensitive {
        strip_whitespace(&canonical.to_lowercase())
    } else {
        strip_whitespace(&canonical)
    }
}
