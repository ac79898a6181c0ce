use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::error::{ScrapeError, ScrapeResult};

mod chromium;
#[cfg(test)]
pub(crate) mod fake;

pub use chromium::{find_chrome_executable, BrowserSession};

/// A single browser tab as seen by the scrapers.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    async fn goto(&self, url: &str) -> ScrapeResult<()>;
    /// Rendered HTML of the current document.
    async fn content(&self) -> ScrapeResult<String>;
    async fn scroll_by(&self, pixels: u32) -> ScrapeResult<()>;
    async fn close(self: Box<Self>) -> ScrapeResult<()>;
}

/// Source of pages. Implemented by the live browser session and by test fakes.
#[async_trait]
pub trait PageProvider: Send + Sync {
    async fn open_page(&self) -> ScrapeResult<PageLease>;
}

/// Bounds how many pages are open at once.
#[derive(Debug, Clone)]
pub struct PagePool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl PagePool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub async fn acquire(&self) -> ScrapeResult<OwnedSemaphorePermit> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ScrapeError::Page("page pool is closed".into()))
    }

    pub fn close(&self) {
        self.semaphore.close();
    }
}

/// A page together with its pool slot. The page is closed and the slot
/// returned on `release`, or from a spawned task when the lease is dropped.
pub struct PageLease {
    page: Option<Box<dyn BrowserPage>>,
    permit: Option<OwnedSemaphorePermit>,
}

impl PageLease {
    pub fn new(page: Box<dyn BrowserPage>, permit: Option<OwnedSemaphorePermit>) -> Self {
        Self {
            page: Some(page),
            permit,
        }
    }

    fn page(&self) -> ScrapeResult<&dyn BrowserPage> {
        self.page
            .as_deref()
            .ok_or_else(|| ScrapeError::Page("page lease already released".into()))
    }

    pub async fn goto(&self, url: &str) -> ScrapeResult<()> {
        self.page()?.goto(url).await
    }

    pub async fn content(&self) -> ScrapeResult<String> {
        self.page()?.content().await
    }

    pub async fn scroll_by(&self, pixels: u32) -> ScrapeResult<()> {
        self.page()?.scroll_by(pixels).await
    }

    pub async fn release(mut self) {
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                debug!("Page close failed: {}", e);
            }
        }
        self.permit.take();
    }
}

impl Drop for PageLease {
    fn drop(&mut self) {
        let Some(page) = self.page.take() else {
            return;
        };
        let permit = self.permit.take();
        // Without a runtime the page dies with the browser process.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = page.close().await {
                    debug!("Page close after drop failed: {}", e);
                }
                drop(permit);
            });
        }
    }
}
