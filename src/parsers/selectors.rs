use scraper::{ElementRef, Selector};
use std::collections::BTreeMap;
use std::sync::Mutex;
use tracing::{debug, info};

use crate::error::ScrapeError;
use crate::parsers::{clean_text, element_text};

/// One way of locating a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locator {
    /// Text of the first matching element.
    Text(&'static str),
    /// Shortest matching element text containing the needle and a digit.
    TextContaining(&'static str, &'static str),
    /// Attribute value of the first matching element carrying it.
    Attr(&'static str, &'static str),
}

impl Locator {
    pub fn css(&self) -> &'static str {
        match self {
            Locator::Text(css) | Locator::TextContaining(css, _) | Locator::Attr(css, _) => css,
        }
    }

    fn extract(&self, scope: ElementRef<'_>, min_len: usize) -> Option<String> {
        let selector = parse_selector(self.css())?;
        let long_enough = |value: &String| value.chars().count() >= min_len;

        match self {
            Locator::Text(_) => scope
                .select(&selector)
                .map(|el| element_text(&el))
                .find(long_enough),
            Locator::TextContaining(_, needle) => scope
                .select(&selector)
                .map(|el| element_text(&el))
                .filter(|text| text.contains(needle) && text.chars().any(|c| c.is_ascii_digit()))
                .filter(long_enough)
                .min_by_key(|text| text.len()),
            Locator::Attr(_, attr) => scope
                .select(&selector)
                .filter_map(|el| el.value().attr(attr))
                .map(clean_text)
                .find(long_enough),
        }
    }
}

fn parse_selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(selector) => Some(selector),
        Err(e) => {
            debug!(css, "Skipping unparseable selector: {:?}", e);
            None
        }
    }
}

/// Value produced by a chain, with the index of the locator that matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub value: String,
    pub strategy: usize,
}

/// Ordered fallback locators for one field. The first non-empty match wins.
#[derive(Debug, Clone, Copy)]
pub struct FieldChain {
    pub field: &'static str,
    pub locators: &'static [Locator],
    pub min_len: usize,
}

impl FieldChain {
    pub const fn new(field: &'static str, locators: &'static [Locator]) -> Self {
        Self {
            field,
            locators,
            min_len: 1,
        }
    }

    pub const fn with_min_len(mut self, min_len: usize) -> Self {
        self.min_len = min_len;
        self
    }

    pub fn extract(&self, scope: ElementRef<'_>) -> Result<Extracted, ScrapeError> {
        self.locators
            .iter()
            .enumerate()
            .find_map(|(strategy, locator)| {
                locator
                    .extract(scope, self.min_len)
                    .map(|value| Extracted { value, strategy })
            })
            .ok_or(ScrapeError::SelectorExhausted { field: self.field })
    }
}

/// Elements matched by the first selector in `css_chain` that matches
/// anything, together with that selector's index.
pub fn first_matching<'a>(
    scope: ElementRef<'a>,
    css_chain: &[&str],
) -> Option<(usize, Vec<ElementRef<'a>>)> {
    css_chain.iter().enumerate().find_map(|(idx, css)| {
        let selector = parse_selector(css)?;
        let found: Vec<_> = scope.select(&selector).collect();
        (!found.is_empty()).then_some((idx, found))
    })
}

/// Counts which locator strategy satisfied each chain over a run.
#[derive(Debug, Default)]
pub struct SelectorHits {
    counts: Mutex<BTreeMap<(&'static str, usize), u64>>,
}

impl SelectorHits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, chain: &'static str, strategy: usize) {
        let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        *counts.entry((chain, strategy)).or_insert(0) += 1;
    }

    pub fn snapshot(&self) -> BTreeMap<(&'static str, usize), u64> {
        self.counts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn log_summary(&self) {
        let snapshot = self.snapshot();
        if snapshot.is_empty() {
            info!("No selector hits recorded");
            return;
        }
        for ((chain, strategy), hits) in snapshot {
            info!(chain, strategy, hits, "Selector strategy usage");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use scraper::Html;

    const PRICE: FieldChain = FieldChain::new(
        "price",
        &[
            Locator::Text("[data-testid=\"lblPDPDetailProductPrice\"]"),
            Locator::TextContaining("div, span", "Rp"),
        ],
    );

    #[test]
    fn later_strategy_is_used_when_earlier_ones_miss() {
        let html = Html::parse_document(
            r#"<div class="wrap"><span>Harga spesial</span><div><span>Rp 25.000</span></div></div>"#,
        );
        let found = PRICE.extract(html.root_element()).unwrap();
        assert_eq!(found.value, "Rp 25.000");
        assert_eq!(found.strategy, 1);
    }

    #[test]
    fn exhausted_chain_names_the_field() {
        let html = Html::parse_document("<p>nothing here</p>");
        let err = PRICE.extract(html.root_element()).unwrap_err();
        assert!(matches!(err, ScrapeError::SelectorExhausted { field: "price" }));
    }

    #[test]
    fn attribute_locator_and_min_len() {
        const DESC: FieldChain = FieldChain::new(
            "description",
            &[
                Locator::Text("div.desc"),
                Locator::Attr("meta[name=\"description\"]", "content"),
            ],
        )
        .with_min_len(10);
        let html = Html::parse_document(
            r#"<head><meta name="description" content="Laptop tipis dan ringan"></head><body><div class="desc">short</div></body>"#,
        );
        let found = DESC.extract(html.root_element()).unwrap();
        assert_eq!(found.value, "Laptop tipis dan ringan");
        assert_eq!(found.strategy, 1);
    }

    #[test]
    fn first_matching_skips_empty_selectors() {
        let html = Html::parse_document(r#"<div class="card">a</div><div class="card">b</div>"#);
        let (idx, found) = first_matching(html.root_element(), &["li.card", "div.card"]).unwrap();
        assert_eq!(idx, 1);
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn hits_are_counted_per_strategy() {
        let hits = SelectorHits::new();
        hits.record("name", 0);
        hits.record("name", 0);
        hits.record("price", 2);
        let snapshot = hits.snapshot();
        assert_eq!(snapshot.get(&("name", 0)), Some(&2));
        assert_eq!(snapshot.get(&("price", 2)), Some(&1));
    }
}
