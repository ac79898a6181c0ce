use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::parsers::slugify;

static DISALLOWED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s-]").expect("Invalid keyword regex"));

/// A normalized search term. Only constructed through [`Keyword::normalize`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Keyword(String);

impl Keyword {
    /// Trims, lowercases, strips punctuation and collapses whitespace.
    /// Returns `None` when nothing searchable remains.
    pub fn normalize(raw: &str) -> Option<Self> {
        let lowered = raw.trim().to_lowercase();
        let stripped = DISALLOWED.replace_all(&lowered, "");
        let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
        (!collapsed.is_empty()).then_some(Self(collapsed))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Folder-safe form used for the image directory.
    pub fn slug(&self) -> String {
        let slug = slugify(&self.0);
        if slug.is_empty() {
            "keyword".to_string()
        } else {
            slug
        }
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Normalizes a batch of raw inputs, dropping empties and later duplicates.
pub fn normalize_keywords<I, S>(raw: I) -> Vec<Keyword>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    raw.into_iter()
        .filter_map(|s| Keyword::normalize(s.as_ref()))
        .filter(|k| seen.insert(k.clone()))
        .collect()
}
