use scraper::Html;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::browser::{PageLease, PageProvider};
use crate::config::Config;
use crate::error::ScrapeResult;
use crate::models::{Candidate, DetailFields, ProductDetail, Site};
use crate::parsers::{detect_currency, parse_price, FieldChain, Locator, SelectorHits};
use crate::scrapers::{ensure_not_blocked, wait_for_content};
use crate::utils::random_pause;

pub const NAME: FieldChain = FieldChain::new(
    "name",
    &[
        Locator::Text(r#"h1[data-testid="lblPDPDetailProductName"]"#),
        Locator::Text("h1.css-j63za0"),
        Locator::Text("h1"),
        Locator::Attr(r#"meta[property="og:title"]"#, "content"),
    ],
);

pub const PRICE: FieldChain = FieldChain::new(
    "price",
    &[
        Locator::Text(r#"[data-testid="lblPDPDetailProductPrice"]"#),
        Locator::Text(r#"[data-testid="lblProductPrice"]"#),
        Locator::Text("div.price"),
        Locator::TextContaining("div, span", "Rp"),
    ],
);

pub const DESCRIPTION: FieldChain = FieldChain::new(
    "description",
    &[
        Locator::Text(r#"div[role="tabpanel"]"#),
        Locator::Text(r#"[data-testid="lblPDPDescriptionProduk"]"#),
        Locator::Text(r#"[data-testid="lblPDPDescription"]"#),
        Locator::Text(r#"div[data-testid*="description"]"#),
        Locator::Text(r#"div[class*="description"]"#),
        Locator::Attr(r#"meta[name="description"]"#, "content"),
    ],
)
.with_min_len(10);

pub const IMAGE: FieldChain = FieldChain::new(
    "image",
    &[
        Locator::Attr(r#"img[data-testid="PDPMainImage"]"#, "src"),
        Locator::Attr("div.css-pefdcn img", "src"),
        Locator::Attr("div.css-pefdcn img", "data-src"),
        Locator::Attr(r#"meta[property="og:image"]"#, "content"),
        Locator::Attr("img[alt][src]", "src"),
    ],
);

pub const STORE: FieldChain = FieldChain::new(
    "store",
    &[
        Locator::Text(r#"[data-testid="llbPDPFooterShopName"]"#),
        Locator::Text(r#"[data-testid="lblPDPDetailShopName"]"#),
        Locator::Text(r#"a[href*="/shop/"]"#),
    ],
);

fn has_title(html: &str) -> bool {
    let document = Html::parse_document(html);
    NAME.extract(document.root_element()).is_ok()
}

/// Reads every detail field from a rendered product page. Each chain is
/// independent; one failing leaves only that field empty.
pub fn parse_detail_fields(html: &str, site: &Site, hits: Option<&SelectorHits>) -> DetailFields {
    let document = Html::parse_document(html);
    let root = document.root_element();

    let read = |chain: &FieldChain| match chain.extract(root) {
        Ok(found) => {
            if let Some(hits) = hits {
                hits.record(chain.field, found.strategy);
            }
            Some(found.value)
        }
        Err(e) => {
            debug!("{}", e);
            None
        }
    };

    let name = read(&NAME);
    let price_text = read(&PRICE);
    let description = read(&DESCRIPTION);
    let image_url = read(&IMAGE)
        .filter(|src| !src.starts_with("data:"))
        .and_then(|src| site.absolute_url(&src))
        .map(|url| url.to_string());
    let store_name = read(&STORE);

    let price = price_text.as_deref().and_then(|text| match parse_price(text) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!("{}", e);
            None
        }
    });
    let currency = price_text
        .as_deref()
        .map(|text| detect_currency(text).to_string());

    DetailFields {
        name,
        description,
        price_text,
        price,
        currency,
        image_url,
        store_name,
    }
}

/// Opens each candidate's product page and extracts its details.
pub struct DetailExtractor {
    config: Arc<Config>,
    site: Site,
    hits: Arc<SelectorHits>,
}

impl DetailExtractor {
    pub fn new(config: Arc<Config>, site: Site, hits: Arc<SelectorHits>) -> Self {
        Self { config, site, hits }
    }

    /// Never fails: when the page cannot be loaded the candidate itself is
    /// returned as a partial record.
    pub async fn extract(&self, candidate: &Candidate, provider: &dyn PageProvider) -> ProductDetail {
        let config = &self.config;
        let url = candidate.product_url.as_str();

        let loaded = config
            .retry_policy()
            .run("detail page", |_| async move {
                let lease = provider.open_page().await?;
                let result = load_detail(&lease, url, config).await;
                lease.release().await;
                result
            })
            .await;

        match loaded {
            Ok(html) => {
                let fields = parse_detail_fields(&html, &self.site, Some(&self.hits));
                for field in fields.missing_fields() {
                    warn!(url, field, "No locator matched, field left empty");
                }
                let detail = ProductDetail::from_fields(candidate, fields);
                info!(
                    url,
                    completeness = detail.extraction_completeness,
                    "Detail extracted"
                );
                detail
            }
            Err(e) => {
                warn!(url, error = %e, "Detail extraction failed, keeping candidate data");
                ProductDetail::from_candidate(candidate)
            }
        }
    }
}

async fn load_detail(lease: &PageLease, url: &str, config: &Config) -> ScrapeResult<String> {
    lease.goto(url).await?;
    random_pause(config.min_delay_secs, config.max_delay_secs).await;
    let html = wait_for_content(lease, config.page_load_timeout(), has_title).await?;
    ensure_not_blocked(&html, url)?;
    Ok(html)
}
