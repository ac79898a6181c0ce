use async_trait::async_trait;
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use std::path::Path;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::browser::{BrowserPage, PageLease, PagePool, PageProvider};
use crate::config::Config;
use crate::error::{ScrapeError, ScrapeResult};
use crate::utils::http::DESKTOP_USER_AGENT;

const VIEWPORT_WIDTH: u32 = 1920;
const VIEWPORT_HEIGHT: u32 = 1080;

const WEBDRIVER_MASK: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined, configurable: true });
if (!window.chrome) { window.chrome = { runtime: {} }; }
Object.defineProperty(navigator, 'languages', { get: () => ['id-ID', 'id', 'en-US', 'en'] });
"#;

/// Find a usable Chromium-family executable on PATH or at a well-known location.
pub fn find_chrome_executable() -> Option<String> {
    if let Ok(path_var) = std::env::var("PATH") {
        let names = [
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
            "chrome",
        ];
        for dir in std::env::split_paths(&path_var) {
            for name in names {
                let full = dir.join(name);
                if full.exists() {
                    return Some(full.to_string_lossy().to_string());
                }
            }
        }
    }

    let known: &[&str] = if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ]
    } else if cfg!(target_os = "windows") {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ]
    } else {
        &[
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
        ]
    };

    known
        .iter()
        .find(|p| Path::new(p).exists())
        .map(|p| p.to_string())
}

fn build_browser_config(config: &Config) -> ScrapeResult<BrowserConfig> {
    let mut builder = BrowserConfig::builder()
        .no_sandbox()
        .viewport(Viewport {
            width: VIEWPORT_WIDTH,
            height: VIEWPORT_HEIGHT,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(VIEWPORT_WIDTH, VIEWPORT_HEIGHT)
        .request_timeout(config.browser_timeout())
        .arg("--disable-blink-features=AutomationControlled")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-gpu")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--lang=id-ID")
        .arg(format!("--user-agent={}", DESKTOP_USER_AGENT));

    if !config.headless_mode {
        builder = builder.with_head();
    }

    let executable = config
        .chrome_executable
        .clone()
        .filter(|p| Path::new(p).exists())
        .or_else(find_chrome_executable);
    if let Some(exe) = executable {
        debug!("Using browser executable {}", exe);
        builder = builder.chrome_executable(exe);
    }

    builder.build().map_err(|reason| ScrapeError::SessionLaunch {
        attempts: 0,
        reason,
    })
}

/// One Chromium process shared by a whole run. Pages come from a bounded pool.
pub struct BrowserSession {
    browser: Option<Browser>,
    handler: Option<JoinHandle<()>>,
    pool: PagePool,
    navigation_timeout: Duration,
}

impl BrowserSession {
    /// Launches the browser, retrying with backoff. Exhausting the retries is
    /// fatal for the run.
    pub async fn acquire(config: &Config) -> ScrapeResult<Self> {
        let policy = config.retry_policy();
        let attempts = policy.attempts();

        let launched = policy
            .run("browser launch", |attempt| async move {
                let browser_config = build_browser_config(config)?;
                info!(attempt, "Launching browser (headless: {})", config.headless_mode);
                Browser::launch(browser_config)
                    .await
                    // Launch errors go through the retry loop as page errors.
                    .map_err(|e| ScrapeError::Page(format!("launch failed: {e}")))
            })
            .await;

        let (browser, mut handler) = match launched {
            Ok(pair) => pair,
            Err(ScrapeError::SessionLaunch { reason, .. }) | Err(ScrapeError::Page(reason)) => {
                return Err(ScrapeError::SessionLaunch { attempts, reason });
            }
            Err(other) => {
                return Err(ScrapeError::SessionLaunch {
                    attempts,
                    reason: other.to_string(),
                })
            }
        };

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler error: {}", e);
                }
            }
        });

        let pool = PagePool::new(config.detail_concurrency());
        info!(pages = pool.capacity(), "Browser session ready");

        Ok(Self {
            browser: Some(browser),
            handler: Some(handler),
            pool,
            navigation_timeout: config.browser_timeout(),
        })
    }

    /// Closes the browser. Outstanding leases fail on their next call.
    pub async fn release(mut self) {
        self.pool.close();
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                warn!("Browser close error (non-fatal): {}", e);
            }
        }
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
        info!("Browser session released");
    }
}

#[async_trait]
impl PageProvider for BrowserSession {
    async fn open_page(&self) -> ScrapeResult<PageLease> {
        let permit = self.pool.acquire().await?;
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| ScrapeError::Page("browser session already released".into()))?;

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| ScrapeError::Page(format!("failed to open tab: {e}")))?;
        if let Err(e) = page.evaluate_on_new_document(WEBDRIVER_MASK).await {
            warn!("Failed to install webdriver mask: {}", e);
        }

        Ok(PageLease::new(
            Box::new(ChromiumPage {
                page,
                navigation_timeout: self.navigation_timeout,
            }),
            Some(permit),
        ))
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        let handler = self.handler.take();
        let Some(mut browser) = self.browser.take() else {
            if let Some(handler) = handler {
                handler.abort();
            }
            return;
        };
        // Drop cannot await; close on the runtime if there is one so no
        // Chromium process outlives the run.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let _ = browser.close().await;
                if let Some(handler) = handler {
                    handler.abort();
                }
            });
        }
    }
}

struct ChromiumPage {
    page: Page,
    navigation_timeout: Duration,
}

#[async_trait]
impl BrowserPage for ChromiumPage {
    async fn goto(&self, url: &str) -> ScrapeResult<()> {
        match timeout(self.navigation_timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(ScrapeError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(ScrapeError::NavigationTimeout {
                url: url.to_string(),
                timeout_ms: self.navigation_timeout.as_millis() as u64,
            }),
        }
    }

    async fn content(&self) -> ScrapeResult<String> {
        self.page
            .content()
            .await
            .map_err(|e| ScrapeError::Page(format!("failed to read content: {e}")))
    }

    async fn scroll_by(&self, pixels: u32) -> ScrapeResult<()> {
        self.page
            .evaluate(format!("window.scrollBy(0, {pixels});"))
            .await
            .map(|_| ())
            .map_err(|e| ScrapeError::Page(format!("scroll failed: {e}")))
    }

    async fn close(self: Box<Self>) -> ScrapeResult<()> {
        self.page
            .close()
            .await
            .map_err(|e| ScrapeError::Page(format!("failed to close tab: {e}")))
    }
}
