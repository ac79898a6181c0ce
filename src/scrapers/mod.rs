use scraper::{Html, Selector};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::browser::PageLease;
use crate::error::{ScrapeError, ScrapeResult};

pub mod detail;
pub mod search;

pub use detail::{parse_detail_fields, DetailExtractor};
pub use search::{scan_cards, CandidateCollector, CollectOutcome, MAX_IDLE_SCROLLS, MAX_SCROLL_ROUNDS};

const CONTENT_POLL: Duration = Duration::from_millis(250);

const PRODUCT_INDICATORS: &str = r#"[data-testid*="product"], [data-testid*="Product"], a[href*="/p/"], [class*="product"], [class*="Product"]"#;

/// Polls the rendered HTML until `ready` accepts it or `limit` elapses, and
/// returns the last snapshot either way.
pub(crate) async fn wait_for_content<F>(
    lease: &PageLease,
    limit: Duration,
    ready: F,
) -> ScrapeResult<String>
where
    F: Fn(&str) -> bool,
{
    let deadline = Instant::now() + limit;
    loop {
        let html = lease.content().await?;
        if ready(&html) || Instant::now() >= deadline {
            return Ok(html);
        }
        sleep(CONTENT_POLL).await;
    }
}

/// Whether the page is a captcha or block interstitial rather than content.
/// Pages showing any product markup are never treated as blocked.
pub fn looks_blocked(html: &str) -> bool {
    let lower = html.to_lowercase();
    let captcha = lower.contains("captcha")
        && (lower.contains("form") || lower.contains("challenge") || lower.contains("verify"));
    let denied = lower.contains("access denied") || lower.contains("forbidden");
    if !(captcha || denied) {
        return false;
    }

    let has_products = Selector::parse(PRODUCT_INDICATORS)
        .map(|selector| Html::parse_document(html).select(&selector).next().is_some())
        .unwrap_or(false);
    if has_products {
        debug!("Block markers present but product markup found, continuing");
    }
    !has_products
}

pub(crate) fn ensure_not_blocked(html: &str, url: &str) -> ScrapeResult<()> {
    if looks_blocked(html) {
        Err(ScrapeError::RateLimitSuspected {
            url: url.to_string(),
        })
    } else {
        Ok(())
    }
}
