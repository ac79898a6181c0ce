//! In-memory pages serving fixed HTML, used by collector, extractor and
//! pipeline tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::browser::{BrowserPage, PageLease, PagePool, PageProvider};
use crate::error::{ScrapeError, ScrapeResult};

#[derive(Default)]
struct SiteState {
    /// HTML per URL, one snapshot per scroll depth.
    pages: HashMap<String, Vec<String>>,
    /// Remaining forced navigation failures per URL.
    failures: HashMap<String, u32>,
    delays: HashMap<String, Duration>,
    /// Scroll depth from which reading the page fails, per URL.
    unreadable_after: HashMap<String, usize>,
    visits: Vec<String>,
}

#[derive(Clone, Default)]
pub(crate) struct FakeSite {
    state: Arc<Mutex<SiteState>>,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    open_now: Arc<AtomicUsize>,
    max_open: Arc<AtomicUsize>,
}

impl FakeSite {
    pub fn page(self, url: &str, html: &str) -> Self {
        self.scrolling_page(url, &[html])
    }

    pub fn scrolling_page(self, url: &str, snapshots: &[&str]) -> Self {
        self.state
            .lock()
            .unwrap()
            .pages
            .insert(url.to_string(), snapshots.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn failing(self, url: &str, times: u32) -> Self {
        self.state.lock().unwrap().failures.insert(url.to_string(), times);
        self
    }

    pub fn slow(self, url: &str, delay: Duration) -> Self {
        self.state.lock().unwrap().delays.insert(url.to_string(), delay);
        self
    }

    pub fn unreadable_after_scrolls(self, url: &str, scrolls: usize) -> Self {
        self.state
            .lock()
            .unwrap()
            .unreadable_after
            .insert(url.to_string(), scrolls);
        self
    }

    pub fn visits(&self, url: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .visits
            .iter()
            .filter(|v| *v == url)
            .count()
    }

    pub fn opened_pages(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed_pages(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn max_concurrent_pages(&self) -> usize {
        self.max_open.load(Ordering::SeqCst)
    }
}

struct FakePage {
    site: FakeSite,
    url: Mutex<Option<String>>,
    scrolls: AtomicUsize,
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn goto(&self, url: &str) -> ScrapeResult<()> {
        let delay = {
            let mut state = self.site.state.lock().unwrap();
            state.visits.push(url.to_string());
            if let Some(remaining) = state.failures.get_mut(url) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(ScrapeError::Navigation {
                        url: url.to_string(),
                        reason: "connection reset".into(),
                    });
                }
            }
            if !state.pages.contains_key(url) {
                return Err(ScrapeError::Navigation {
                    url: url.to_string(),
                    reason: "net::ERR_NAME_NOT_RESOLVED".into(),
                });
            }
            state.delays.get(url).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        *self.url.lock().unwrap() = Some(url.to_string());
        self.scrolls.store(0, Ordering::SeqCst);
        Ok(())
    }

    async fn content(&self) -> ScrapeResult<String> {
        let url = self.url.lock().unwrap().clone();
        let Some(url) = url else {
            return Ok("<html><body></body></html>".to_string());
        };
        let state = self.site.state.lock().unwrap();
        let snapshots = state
            .pages
            .get(&url)
            .ok_or_else(|| ScrapeError::Page(format!("no fixture for {url}")))?;
        let scrolls = self.scrolls.load(Ordering::SeqCst);
        if state.unreadable_after.get(&url).map_or(false, |limit| scrolls >= *limit) {
            return Err(ScrapeError::Page("target closed".into()));
        }
        let depth = scrolls.min(snapshots.len() - 1);
        Ok(snapshots[depth].clone())
    }

    async fn scroll_by(&self, _pixels: u32) -> ScrapeResult<()> {
        self.scrolls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(self: Box<Self>) -> ScrapeResult<()> {
        self.site.closed.fetch_add(1, Ordering::SeqCst);
        self.site.open_now.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

pub(crate) struct FakeProvider {
    site: FakeSite,
    pool: PagePool,
}

impl FakeProvider {
    pub fn new(site: FakeSite, capacity: usize) -> Self {
        Self {
            site,
            pool: PagePool::new(capacity),
        }
    }

    pub fn site(&self) -> &FakeSite {
        &self.site
    }

    pub fn pool(&self) -> &PagePool {
        &self.pool
    }
}

#[async_trait]
impl PageProvider for FakeProvider {
    async fn open_page(&self) -> ScrapeResult<PageLease> {
        let permit = self.pool.acquire().await?;
        self.site.opened.fetch_add(1, Ordering::SeqCst);
        let open = self.site.open_now.fetch_add(1, Ordering::SeqCst) + 1;
        self.site.max_open.fetch_max(open, Ordering::SeqCst);

        let page = FakePage {
            site: self.site.clone(),
            url: Mutex::new(None),
            scrolls: AtomicUsize::new(0),
        };
        Ok(PageLease::new(Box::new(page), Some(permit)))
    }
}
