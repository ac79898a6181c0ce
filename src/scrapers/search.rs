use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::browser::{PageLease, PageProvider};
use crate::config::Config;
use crate::error::ScrapeResult;
use crate::models::{Candidate, Keyword, Site};
use crate::parsers::{element_text, first_matching, FieldChain, Locator, SelectorHits};
use crate::scrapers::{ensure_not_blocked, wait_for_content};
use crate::utils::random_pause;

/// Scrolls attempted after the first view of the results.
pub const MAX_SCROLL_ROUNDS: usize = 8;
/// Consecutive scrolls without a new candidate before the results count as exhausted.
pub const MAX_IDLE_SCROLLS: usize = 2;

const SCROLL_STEP_PX: u32 = 1000;
const MIN_NAME_CHARS: usize = 4;
const MAX_NAME_CHARS: usize = 100;

pub const CARD_LOCATORS: &[&str] = &[
    r#"[data-testid="master-product-card"]"#,
    r#"[data-testid="divProductWrapper"]"#,
    r#"div[data-testid*="product"]"#,
    r#"div[class*="product-card"]"#,
    r#"a[href*="/p/"]"#,
];

pub const CARD_NAME: FieldChain = FieldChain::new(
    "card_name",
    &[
        Locator::Text(r#"[data-testid="spnSRPProdName"]"#),
        Locator::Text(r#"[data-testid="lblProductName"]"#),
        Locator::Attr("span[title]", "title"),
        Locator::Attr("a[title]", "title"),
        Locator::Text("h3"),
        Locator::Text("h2"),
    ],
)
.with_min_len(MIN_NAME_CHARS);

/// Index in the name chain reported when the name came from the product link text.
const NAME_FROM_LINK: usize = CARD_NAME.locators.len();
/// Index reported when the name was derived from the URL slug.
const NAME_FROM_URL: usize = NAME_FROM_LINK + 1;

/// One product card read from a results page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardStub {
    pub product_url: String,
    pub product_name: String,
    pub thumbnail_url: Option<String>,
    pub name_strategy: usize,
}

/// Cards found in one snapshot of the results page.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CardScan {
    /// Index of the card locator that matched, if any did.
    pub card_strategy: Option<usize>,
    pub cards: Vec<CardStub>,
}

/// Reads every product card from a rendered results page.
pub fn scan_cards(html: &str, site: &Site) -> CardScan {
    let document = Html::parse_document(html);
    let Some((strategy, cards)) = first_matching(document.root_element(), CARD_LOCATORS) else {
        return CardScan::default();
    };

    let cards = cards
        .into_iter()
        .filter_map(|card| read_card(card, site))
        .collect();

    CardScan {
        card_strategy: Some(strategy),
        cards,
    }
}

fn read_card(card: ElementRef<'_>, site: &Site) -> Option<CardStub> {
    let (link, url) = product_link(card, site)?;
    let product_url = Site::canonical_url(&url);

    let (product_name, name_strategy) = match CARD_NAME.extract(card) {
        Ok(found) => (found.value, found.strategy),
        Err(_) => {
            let link_text = element_text(&link);
            let link_chars = link_text.chars().count();
            if (MIN_NAME_CHARS..=MAX_NAME_CHARS).contains(&link_chars) {
                (link_text, NAME_FROM_LINK)
            } else {
                (Site::name_from_url(&url)?, NAME_FROM_URL)
            }
        }
    };

    let lowered = product_name.to_lowercase();
    if lowered == "kategori" || lowered == "category" {
        debug!("Skipping category tile {}", product_url);
        return None;
    }

    Some(CardStub {
        product_url,
        product_name,
        thumbnail_url: thumbnail(card, site),
        name_strategy,
    })
}

/// First anchor in the card, or the card itself, that points at a product page.
fn product_link<'a>(card: ElementRef<'a>, site: &Site) -> Option<(ElementRef<'a>, url::Url)> {
    let anchors = Selector::parse("a[href]").ok()?;
    std::iter::once(card)
        .chain(card.select(&anchors))
        .find_map(|anchor| {
            let href = anchor.value().attr("href")?;
            let url = site.absolute_url(href)?;
            site.looks_like_product_url(&url).then_some((anchor, url))
        })
}

fn thumbnail(card: ElementRef<'_>, site: &Site) -> Option<String> {
    let images = Selector::parse("img").ok()?;
    let img = card.select(&images).next()?;
    ["src", "data-src"]
        .iter()
        .filter_map(|attr| img.value().attr(attr))
        .filter(|src| !src.starts_with("data:"))
        .find_map(|src| site.absolute_url(src))
        .map(|url| url.to_string())
}

fn has_cards(html: &str) -> bool {
    let document = Html::parse_document(html);
    first_matching(document.root_element(), CARD_LOCATORS).is_some()
}

/// Result of collecting one keyword. An empty candidate list is a normal,
/// recoverable outcome and carries the reason in `warning`.
#[derive(Debug, Clone, Serialize)]
pub struct CollectOutcome {
    pub keyword: Keyword,
    pub candidates: Vec<Candidate>,
    pub scroll_rounds: usize,
    pub warning: Option<String>,
}

impl CollectOutcome {
    fn failed(keyword: &Keyword, reason: String) -> Self {
        Self {
            keyword: keyword.clone(),
            candidates: Vec::new(),
            scroll_rounds: 0,
            warning: Some(reason),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Turns a keyword into an ordered, deduplicated list of candidates.
pub struct CandidateCollector {
    config: Arc<Config>,
    site: Site,
    hits: Arc<SelectorHits>,
}

impl CandidateCollector {
    pub fn new(config: Arc<Config>, site: Site, hits: Arc<SelectorHits>) -> Self {
        Self { config, site, hits }
    }

    pub async fn collect(
        &self,
        keyword: &Keyword,
        provider: &dyn PageProvider,
        max_candidates: usize,
    ) -> CollectOutcome {
        let url = self.site.search_url(keyword.as_str());
        info!(keyword = %keyword, url = %url, "Collecting candidates");

        let lease = match provider.open_page().await {
            Ok(lease) => lease,
            Err(e) => {
                warn!(keyword = %keyword, error = %e, "Could not open a page for search");
                return CollectOutcome::failed(keyword, e.to_string());
            }
        };

        let result = self.collect_on(&lease, keyword, &url, max_candidates).await;
        lease.release().await;

        match result {
            Ok(outcome) => {
                if outcome.is_empty() {
                    warn!(keyword = %keyword, "No candidates found");
                } else {
                    info!(
                        keyword = %keyword,
                        candidates = outcome.candidates.len(),
                        scrolls = outcome.scroll_rounds,
                        "Collected candidates"
                    );
                }
                outcome
            }
            Err(e) => {
                warn!(keyword = %keyword, error = %e, "Candidate collection failed");
                CollectOutcome::failed(keyword, e.to_string())
            }
        }
    }

    async fn load_results(&self, lease: &PageLease, url: &str) -> ScrapeResult<String> {
        let config = &self.config;
        config
            .retry_policy()
            .run("search navigation", |_| async move {
                lease.goto(url).await?;
                random_pause(config.min_delay_secs, config.max_delay_secs).await;
                let html = wait_for_content(lease, config.page_load_timeout(), has_cards).await?;
                ensure_not_blocked(&html, url)?;
                Ok(html)
            })
            .await
    }

    async fn collect_on(
        &self,
        lease: &PageLease,
        keyword: &Keyword,
        url: &str,
        max_candidates: usize,
    ) -> ScrapeResult<CollectOutcome> {
        let mut html = self.load_results(lease, url).await?;

        let mut seen = HashSet::new();
        let mut candidates: Vec<Candidate> = Vec::new();
        let mut idle_scrolls = 0;
        let mut rounds = 0;

        loop {
            let scan = scan_cards(&html, &self.site);
            let mut added = 0;

            for card in scan.cards {
                if candidates.len() >= max_candidates {
                    break;
                }
                if !seen.insert(card.product_url.clone()) {
                    continue;
                }
                if let Some(strategy) = scan.card_strategy {
                    self.hits.record("search_card", strategy);
                }
                self.hits.record(CARD_NAME.field, card.name_strategy);
                candidates.push(Candidate {
                    discovery_index: candidates.len(),
                    product_url: card.product_url,
                    product_name: card.product_name,
                    thumbnail_url: card.thumbnail_url,
                });
                added += 1;
            }

            if candidates.len() >= max_candidates {
                break;
            }
            if added > 0 {
                idle_scrolls = 0;
            } else if !candidates.is_empty() {
                idle_scrolls += 1;
                if idle_scrolls >= MAX_IDLE_SCROLLS {
                    debug!(keyword = %keyword, "Results saturated after {} scrolls", rounds);
                    break;
                }
            }
            if rounds >= MAX_SCROLL_ROUNDS {
                break;
            }

            if let Err(e) = lease.scroll_by(SCROLL_STEP_PX).await {
                warn!(keyword = %keyword, error = %e, "Scroll failed, keeping what was found");
                break;
            }
            rounds += 1;
            random_pause(self.config.min_delay_secs, self.config.max_delay_secs).await;
            html = match lease.content().await {
                Ok(html) => html,
                Err(e) => {
                    warn!(
                        keyword = %keyword,
                        error = %e,
                        "Page unreadable after scroll, keeping what was found"
                    );
                    break;
                }
            };
        }

        let warning = candidates
            .is_empty()
            .then(|| format!("no product cards matched after {rounds} scrolls"));

        Ok(CollectOutcome {
            keyword: keyword.clone(),
            candidates,
            scroll_rounds: rounds,
            warning,
        })
    }
}
