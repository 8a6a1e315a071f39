//! Case and accent folding for free-text matching.
//!
//! The same folding runs on both sides of a `LIKE`: on the stored column via
//! the `fold()` SQL function and on the caller's search term via
//! [`contains_pattern`].

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Lowercase `s` and strip diacritics.
///
/// Text is decomposed first, so precomposed (`í`) and decomposed
/// (`i` + U+0301) spellings fold to the same string.
pub fn fold_text(s: &str) -> String {
    s.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Build a `LIKE` pattern matching rows that contain `term` anywhere.
///
/// The term is folded, and `%`, `_` and `\` are escaped, so the pattern must
/// be used with `ESCAPE '\'`.
pub fn contains_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in fold_text(term.trim()).chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}
