//! Tag name normalization
//!
//! Tag names are the identity key for the whole subsystem: lowercase,
//! whitespace-free, with underscores standing in for word breaks. Every
//! name entering the system passes through `normalize` first.

use once_cell::sync::Lazy;
use regex::Regex;

/// Trailing parenthesized qualifier, e.g. `_(cosplay)` in `foo_(cosplay)`.
static QUALIFIER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"_\(.*\)$").unwrap());

/// Normalize a raw tag name: full lowercase folding, leading/trailing
/// whitespace trimmed, internal whitespace runs collapsed to single
/// underscores.
///
/// Pure and total: every input produces a string. An all-whitespace input
/// produces the empty string, which is not a valid tag name; callers must
/// guard before creating a tag row.
pub fn normalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for (i, word) in raw.split_whitespace().enumerate() {
        if i > 0 {
            out.push('_');
        }
        for ch in word.chars() {
            out.extend(ch.to_lowercase());
        }
    }
    out
}

/// Display form of a normalized name: underscores back to spaces.
pub fn pretty_name(name: &str) -> String {
    name.replace('_', " ")
}

/// Display form with any trailing parenthesized qualifier stripped,
/// e.g. `hatsune_miku_(cosplay)` -> `hatsune miku`.
pub fn unqualified_name(name: &str) -> String {
    QUALIFIER_RE.replace(name, "").replace('_', " ")
}
