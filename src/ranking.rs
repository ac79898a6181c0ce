//! Scores extracted products against the keyword and keeps the best few.

use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::debug;

use crate::models::{Keyword, ProductDetail, ScoredCandidate};

pub const RELEVANCE_WEIGHT: f64 = 0.75;
pub const COMPLETENESS_WEIGHT: f64 = 0.25;

/// Priced items needed before the interquartile filter applies.
pub const MIN_PRICES_FOR_IQR: usize = 8;
pub const MIN_SANE_PRICE: f64 = 500.0;
pub const MAX_SANE_PRICE: f64 = 200_000_000.0;

/// Lowercased alphanumeric tokens; everything else separates tokens.
pub fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_ascii_lowercase() || c.is_ascii_digit()))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Jaccard similarity of the keyword and name token sets, 0 when either is empty.
pub fn relevance_score(keyword: &str, name: &str) -> f64 {
    let keyword_tokens = tokenize(keyword);
    let name_tokens = tokenize(name);
    if keyword_tokens.is_empty() || name_tokens.is_empty() {
        return 0.0;
    }
    let shared = keyword_tokens.intersection(&name_tokens).count();
    let union = keyword_tokens.union(&name_tokens).count();
    shared as f64 / union as f64
}

/// Fraction of name, price, url, store, image and description that are present.
pub fn completeness_score(detail: &ProductDetail) -> f64 {
    let filled = |value: &Option<String>| value.as_deref().map_or(false, |v| !v.trim().is_empty());
    let present = [
        filled(&detail.name),
        detail.price.map_or(false, |p| p > 0.0),
        !detail.product_url.trim().is_empty(),
        filled(&detail.store_name),
        filled(&detail.image_url),
        filled(&detail.description),
    ]
    .into_iter()
    .filter(|p| *p)
    .count();
    present as f64 / 6.0
}

/// Percentile over sorted values with linear interpolation between ranks.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let rank = (sorted.len() - 1) as f64 * p;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        sorted[lower] * (upper as f64 - rank) + sorted[upper] * (rank - lower as f64)
    }
}

/// Acceptable price range from the interquartile rule, or `None` when there
/// are too few prices for it to be meaningful.
pub fn price_bounds(prices: &[f64]) -> Option<(f64, f64)> {
    if prices.len() < MIN_PRICES_FOR_IQR {
        return None;
    }
    let mut sorted = prices.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let q1 = percentile(&sorted, 0.25);
    let q3 = percentile(&sorted, 0.75);
    let iqr = q3 - q1;
    Some(((q1 - 1.5 * iqr).max(0.0), q3 + 1.5 * iqr))
}

fn passes_price_filter(price: Option<f64>, bounds: Option<(f64, f64)>) -> bool {
    let Some(price) = price.filter(|p| *p > 0.0) else {
        return true;
    };
    if let Some((low, high)) = bounds {
        if price < low || price > high {
            return false;
        }
    }
    (MIN_SANE_PRICE..=MAX_SANE_PRICE).contains(&price)
}

/// Filters price outliers, scores what remains and returns the best `top_n`.
/// Ties keep discovery order.
pub fn rank(keyword: &Keyword, details: &[ProductDetail], top_n: usize) -> Vec<ScoredCandidate> {
    if details.is_empty() || top_n == 0 {
        return Vec::new();
    }

    let prices: Vec<f64> = details
        .iter()
        .filter_map(|d| d.price)
        .filter(|p| *p > 0.0)
        .collect();
    let bounds = price_bounds(&prices);

    let mut scored: Vec<ScoredCandidate> = details
        .iter()
        .filter(|d| {
            let keep = passes_price_filter(d.price, bounds);
            if !keep {
                debug!(url = %d.product_url, price = ?d.price, "Dropping price outlier");
            }
            keep
        })
        .map(|d| {
            let relevance_score = relevance_score(keyword.as_str(), d.name.as_deref().unwrap_or(""));
            let completeness_score = completeness_score(d);
            ScoredCandidate {
                detail: d.clone(),
                relevance_score,
                completeness_score,
                composite_score: RELEVANCE_WEIGHT * relevance_score
                    + COMPLETENESS_WEIGHT * completeness_score,
            }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.composite_score
            .partial_cmp(&a.composite_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                b.completeness_score
                    .partial_cmp(&a.completeness_score)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.detail.discovery_index.cmp(&b.detail.discovery_index))
    });
    scored.truncate(top_n);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn detail(index: usize, name: &str, price: Option<f64>) -> ProductDetail {
        ProductDetail {
            product_url: format!("https://www.tokopedia.com/shop/item-{index}"),
            name: Some(name.to_string()),
            description: None,
            price,
            currency: "IDR".into(),
            image_url: None,
            store_name: None,
            extraction_completeness: 0.0,
            discovery_index: index,
        }
    }

    fn keyword(s: &str) -> Keyword {
        Keyword::normalize(s).unwrap()
    }

    #[test]
    fn relevance_is_jaccard_over_tokens() {
        assert_eq!(relevance_score("laptop", "Laptop Gaming ASUS"), 1.0 / 3.0);
        assert_eq!(relevance_score("laptop gaming", "LAPTOP-gaming"), 1.0);
        assert_eq!(relevance_score("laptop", ""), 0.0);
        assert_eq!(relevance_score("", "Laptop"), 0.0);
        assert_eq!(relevance_score("mouse", "Laptop"), 0.0);
    }

    #[test]
    fn completeness_requires_a_positive_price() {
        let mut d = detail(0, "Laptop", Some(0.0));
        assert_eq!(completeness_score(&d), 2.0 / 6.0);
        d.price = Some(1_000_000.0);
        d.store_name = Some("Toko".into());
        d.image_url = Some("https://img.test/a.jpg".into());
        d.description = Some("Deskripsi lengkap".into());
        assert_eq!(completeness_score(&d), 1.0);
    }

    #[test]
    fn percentiles_interpolate() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&sorted, 0.25), 1.75);
        assert_eq!(percentile(&sorted, 0.75), 3.25);
    }

    #[test]
    fn iqr_needs_enough_prices() {
        assert_eq!(price_bounds(&[1000.0; 7]), None);
        let prices = [100.0, 110.0, 120.0, 130.0, 140.0, 150.0, 160.0, 10_000.0];
        let (low, high) = price_bounds(&prices).unwrap();
        assert!(low <= 100.0);
        assert!(high < 10_000.0);
    }

    #[test]
    fn outliers_and_absurd_prices_are_dropped() {
        let mut details: Vec<ProductDetail> = (0..8)
            .map(|i| detail(i, "laptop", Some(5_000_000.0 + i as f64 * 100_000.0)))
            .collect();
        details.push(detail(8, "laptop", Some(900_000_000.0)));
        details.push(detail(9, "laptop", Some(100.0)));
        details.push(detail(10, "laptop", None));

        let ranked = rank(&keyword("laptop"), &details, 20);
        let kept: Vec<usize> = ranked.iter().map(|s| s.detail.discovery_index).collect();

        assert_eq!(kept, vec![0, 1, 2, 3, 4, 5, 6, 7, 10]);
    }

    #[test]
    fn hard_bounds_apply_without_enough_prices() {
        let details = vec![
            detail(0, "laptop", Some(250_000_000.0)),
            detail(1, "laptop", Some(499.0)),
            detail(2, "laptop", Some(4_000_000.0)),
        ];
        let ranked = rank(&keyword("laptop"), &details, 5);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].detail.discovery_index, 2);
    }

    #[test]
    fn ordering_is_composite_then_completeness_then_discovery() {
        let mut richer = detail(2, "mouse logitech", Some(150_000.0));
        richer.store_name = Some("Logitech".into());
        let details = vec![
            detail(0, "mouse logitech", Some(150_000.0)),
            detail(1, "keyboard", Some(150_000.0)),
            richer,
            detail(3, "mouse logitech", Some(150_000.0)),
        ];

        let ranked = rank(&keyword("mouse logitech"), &details, 3);
        let order: Vec<usize> = ranked.iter().map(|s| s.detail.discovery_index).collect();
        assert_eq!(order, vec![2, 0, 3]);
        for pair in ranked.windows(2) {
            assert!(pair[0].composite_score >= pair[1].composite_score);
        }
    }

    #[test]
    fn composite_weights_relevance_and_completeness() {
        let mut full = detail(0, "Laptop Gaming ASUS", Some(12_500_000.0));
        full.store_name = Some("ASUS Official".into());
        full.image_url = Some("https://images.tokopedia.net/asus.jpg".into());
        full.description = Some("Laptop gaming dengan RTX 4050".into());

        let ranked = rank(&keyword("laptop"), &[full], 5);

        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].relevance_score, 1.0 / 3.0);
        assert_eq!(ranked[0].completeness_score, 1.0);
        assert_eq!(ranked[0].composite_score, 0.75 * (1.0 / 3.0) + 0.25);
    }

    #[test]
    fn ranking_the_same_details_twice_gives_the_same_result() {
        let mut details: Vec<ProductDetail> = (0..10)
            .map(|i| {
                let name = if i % 2 == 0 { "mouse gaming" } else { "mouse" };
                detail(i, name, Some(150_000.0 + i as f64))
            })
            .collect();
        details[3].store_name = Some("Toko".into());
        details.push(detail(10, "mouse gaming", None));

        let first = rank(&keyword("mouse gaming"), &details, 5);
        let second = rank(&keyword("mouse gaming"), &details, 5);

        assert_eq!(first, second);
        let order: Vec<usize> = first.iter().map(|s| s.detail.discovery_index).collect();
        assert_eq!(order, vec![0, 2, 4, 6, 8]);
    }

    #[test]
    fn empty_input_gives_empty_output() {
        assert!(rank(&keyword("laptop"), &[], 5).is_empty());
    }
}
