pub mod price;
pub mod selectors;

pub use price::*;
pub use selectors::*;

use html_escape::decode_html_entities;
use scraper::ElementRef;

/// Clean and normalize text by removing extra whitespace and decoding HTML entities
pub fn clean_text(text: &str) -> String {
    let decoded = decode_html_entities(text);
    decoded
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Visible text of an element, text nodes joined by spaces.
pub fn element_text(element: &ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<Vec<_>>().join(" "))
}

/// Lowercase ASCII slug: runs of anything but letters and digits become one `-`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;

    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }

    slug
}

/// Truncates to at most `max` characters, on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn clean_text_decodes_and_collapses() {
        assert_eq!(clean_text("  Laptop&nbsp;&amp;  Mouse \n\t Set "), "Laptop & Mouse Set");
    }

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Laptop Gaming -- ASUS (2024)!"), "laptop-gaming-asus-2024");
        assert_eq!(slugify("***"), "");
        assert_eq!(slugify("Sepatu Lari Pria"), "sepatu-lari-pria");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
