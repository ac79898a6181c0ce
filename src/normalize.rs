use chrono::{DateTime, SecondsFormat, Utc};

use crate::models::{ImageAsset, Keyword, OutputRow, ScoredCandidate, DEFAULT_CURRENCY, SOURCE_SITE};
use crate::parsers::format_price;

/// Assembles the output row for a finalist, stamped with the current time.
pub fn normalize(keyword: &Keyword, scored: &ScoredCandidate, asset: Option<&ImageAsset>) -> OutputRow {
    normalize_at(keyword, scored, asset, Utc::now())
}

pub fn normalize_at(
    keyword: &Keyword,
    scored: &ScoredCandidate,
    asset: Option<&ImageAsset>,
    scraped_at: DateTime<Utc>,
) -> OutputRow {
    let detail = &scored.detail;
    let text = |value: &Option<String>| value.clone().unwrap_or_default();

    let currency = if detail.currency.trim().is_empty() {
        DEFAULT_CURRENCY.to_string()
    } else {
        detail.currency.clone()
    };

    OutputRow {
        input_keyword: keyword.as_str().to_string(),
        product_name: text(&detail.name),
        description: text(&detail.description),
        price: detail.price.map(format_price).unwrap_or_default(),
        currency,
        image_url: text(&detail.image_url),
        image_local_path: asset.map(|a| a.local_path.clone()).unwrap_or_default(),
        store_name: text(&detail.store_name),
        product_url: detail.product_url.clone(),
        source_site: SOURCE_SITE.to_string(),
        scraped_at: scraped_at.to_rfc3339_opts(SecondsFormat::Secs, true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProductDetail, OUTPUT_COLUMNS};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn scored(price: Option<f64>, currency: &str) -> ScoredCandidate {
        ScoredCandidate {
            detail: ProductDetail {
                product_url: "https://www.tokopedia.com/asus/laptop".into(),
                name: Some("Laptop ASUS".into()),
                description: None,
                price,
                currency: currency.into(),
                image_url: Some("https://img.test/a.jpg".into()),
                store_name: Some("ASUS Store".into()),
                extraction_completeness: 0.8,
                discovery_index: 0,
            },
            relevance_score: 0.5,
            completeness_score: 0.8,
            composite_score: 0.575,
        }
    }

    #[test]
    fn row_fills_every_column() {
        let keyword = Keyword::normalize("laptop").unwrap();
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();
        let asset = ImageAsset {
            source_url: "https://img.test/a.jpg".into(),
            local_path: "images/laptop/laptop-asus_0123456789.jpg".into(),
            byte_size: 10,
        };

        let row = normalize_at(&keyword, &scored(Some(4_500_000.0), "IDR"), Some(&asset), at);

        assert_eq!(
            row,
            OutputRow {
                input_keyword: "laptop".into(),
                product_name: "Laptop ASUS".into(),
                description: String::new(),
                price: "4500000".into(),
                currency: "IDR".into(),
                image_url: "https://img.test/a.jpg".into(),
                image_local_path: "images/laptop/laptop-asus_0123456789.jpg".into(),
                store_name: "ASUS Store".into(),
                product_url: "https://www.tokopedia.com/asus/laptop".into(),
                source_site: "tokopedia".into(),
                scraped_at: "2024-05-01T08:30:00Z".into(),
            }
        );
        assert_eq!(row.values().len(), OUTPUT_COLUMNS.len());
    }

    #[test]
    fn missing_price_and_asset_become_empty_strings() {
        let keyword = Keyword::normalize("laptop").unwrap();
        let row = normalize(&keyword, &scored(None, ""), None);
        assert_eq!(row.price, "");
        assert_eq!(row.currency, "IDR");
        assert_eq!(row.image_local_path, "");
        assert!(!row.scraped_at.is_empty());
    }

    #[test]
    fn fractional_prices_keep_two_decimals() {
        let keyword = Keyword::normalize("laptop").unwrap();
        let row = normalize(&keyword, &scored(Some(1299.9), "USD"), None);
        assert_eq!(row.price, "1299.90");
        assert_eq!(row.currency, "USD");
    }
}
