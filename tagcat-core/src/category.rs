//! Tag categories and category-prefix decoding
//!
//! Categories are small integers in storage; the gaps in the numbering are
//! historical and preserved so existing data keeps its meaning.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Tag category. Stored as an integer in the `tags.category` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TagCategory {
    General,
    Artist,
    Copyright,
    Character,
    Meta,
}

/// Keyword -> category table, including the short forms accepted in
/// `category:name` input.
const KEYWORDS: &[(&str, TagCategory)] = &[
    ("general", TagCategory::General),
    ("gen", TagCategory::General),
    ("artist", TagCategory::Artist),
    ("art", TagCategory::Artist),
    ("copyright", TagCategory::Copyright),
    ("copy", TagCategory::Copyright),
    ("co", TagCategory::Copyright),
    ("character", TagCategory::Character),
    ("char", TagCategory::Character),
    ("ch", TagCategory::Character),
    ("meta", TagCategory::Meta),
];

/// Anchored `category:name` pattern. Keywords are sorted longest-first
/// when the alternation is built so a short keyword cannot shadow a longer
/// one sharing its prefix (`co` vs `copyright`).
static PREFIX_RE: Lazy<Regex> = Lazy::new(|| {
    let mut words: Vec<&str> = KEYWORDS.iter().map(|(word, _)| *word).collect();
    words.sort_by_key(|word| std::cmp::Reverse(word.len()));
    Regex::new(&format!(r"^({}):(.+)$", words.join("|"))).unwrap()
});

impl TagCategory {
    pub const ALL: [TagCategory; 5] = [
        TagCategory::General,
        TagCategory::Artist,
        TagCategory::Copyright,
        TagCategory::Character,
        TagCategory::Meta,
    ];

    /// The stored integer id.
    pub fn id(self) -> i64 {
        match self {
            TagCategory::General => 0,
            TagCategory::Artist => 1,
            TagCategory::Copyright => 3,
            TagCategory::Character => 4,
            TagCategory::Meta => 5,
        }
    }

    pub fn from_id(id: i64) -> Option<TagCategory> {
        match id {
            0 => Some(TagCategory::General),
            1 => Some(TagCategory::Artist),
            3 => Some(TagCategory::Copyright),
            4 => Some(TagCategory::Character),
            5 => Some(TagCategory::Meta),
            _ => None,
        }
    }

    /// Capitalized display name.
    pub fn name(self) -> &'static str {
        match self {
            TagCategory::General => "General",
            TagCategory::Artist => "Artist",
            TagCategory::Copyright => "Copyright",
            TagCategory::Character => "Character",
            TagCategory::Meta => "Meta",
        }
    }
}

/// Category for a keyword, if the word is one.
pub fn keyword_category(word: &str) -> Option<TagCategory> {
    let folded = word.to_lowercase();
    KEYWORDS
        .iter()
        .find(|(keyword, _)| *keyword == folded)
        .map(|(_, category)| *category)
}

/// Decode a category designator: a valid numeric id, a known keyword, or
/// General for anything else.
pub fn value_for(word: &str) -> TagCategory {
    if let Ok(id) = word.trim().parse::<i64>() {
        if let Some(category) = TagCategory::from_id(id) {
            return category;
        }
    }
    keyword_category(word).unwrap_or(TagCategory::General)
}

/// Split an explicit `category:name` prefix off a normalized tag name.
/// Returns None when the name carries no known category keyword; a colon
/// inside an ordinary name (`re:zero`) is left alone.
pub fn split_category_prefix(name: &str) -> Option<(TagCategory, &str)> {
    let caps = PREFIX_RE.captures(name)?;
    let keyword = caps.get(1)?.as_str();
    let rest = caps.get(2)?.as_str();
    Some((keyword_category(keyword)?, rest))
}
