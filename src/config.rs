use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ScrapeError;
use crate::models::site::DEFAULT_BASE_URL;
use crate::utils::RetryPolicy;

/// Upper bound on concurrently open detail pages.
pub const MAX_DETAIL_CONCURRENCY: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub headless_mode: bool,
    pub browser_timeout_ms: u64,
    pub page_load_timeout_ms: u64,
    pub max_products_per_keyword: usize,
    pub max_candidates_to_collect: usize,
    pub min_delay_secs: f64,
    pub max_delay_secs: f64,
    pub max_retries: u32,
    pub retry_delay_secs: f64,
    pub download_images: bool,
    pub image_timeout_secs: u64,
    pub max_image_size_mb: u64,
    pub output_dir: PathBuf,
    pub images_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub detail_concurrency: usize,
    pub image_concurrency: usize,
    /// Whole-run deadline in seconds; 0 disables it.
    pub run_timeout_secs: u64,
    pub base_url: String,
    pub chrome_executable: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            headless_mode: true,
            browser_timeout_ms: 15_000,
            page_load_timeout_ms: 8_000,
            max_products_per_keyword: 5,
            max_candidates_to_collect: 30,
            min_delay_secs: 1.0,
            max_delay_secs: 3.0,
            max_retries: 3,
            retry_delay_secs: 2.0,
            download_images: true,
            image_timeout_secs: 10,
            max_image_size_mb: 5,
            output_dir: PathBuf::from("output"),
            images_dir: PathBuf::from("images"),
            logs_dir: PathBuf::from("logs"),
            detail_concurrency: 2,
            image_concurrency: 4,
            run_timeout_secs: 0,
            base_url: DEFAULT_BASE_URL.to_string(),
            chrome_executable: None,
        }
    }
}

impl Config {
    /// Defaults, overridden by an optional `product_scout.toml` in the working
    /// directory, overridden by environment variables (`MAX_RETRIES=5`, ...).
    pub fn load() -> Result<Self> {
        let builder = ::config::Config::builder()
            .add_source(::config::File::with_name("product_scout").required(false))
            .add_source(::config::Environment::default().try_parsing(true));
        Self::from_builder(builder)
    }

    fn from_builder(
        builder: ::config::ConfigBuilder<::config::builder::DefaultState>,
    ) -> Result<Self> {
        let config: Config = builder
            .build()
            .context("Failed to read configuration sources")?
            .try_deserialize()
            .context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the pipeline cannot run with. These are run-fatal.
    pub fn validate(&self) -> Result<(), ScrapeError> {
        if self.max_products_per_keyword == 0 {
            return Err(ScrapeError::Config(
                "max_products_per_keyword must be at least 1".into(),
            ));
        }
        if self.max_candidates_to_collect == 0 {
            return Err(ScrapeError::Config(
                "max_candidates_to_collect must be at least 1".into(),
            ));
        }
        if self.min_delay_secs < 0.0 || self.min_delay_secs > self.max_delay_secs {
            return Err(ScrapeError::Config(format!(
                "delay range [{}, {}] is invalid",
                self.min_delay_secs, self.max_delay_secs
            )));
        }
        if self.retry_delay_secs < 0.0 {
            return Err(ScrapeError::Config("retry_delay_secs must not be negative".into()));
        }
        if self.browser_timeout_ms == 0 || self.page_load_timeout_ms == 0 {
            return Err(ScrapeError::Config("timeouts must be positive".into()));
        }
        if url::Url::parse(&self.base_url).is_err() {
            return Err(ScrapeError::Config(format!(
                "base_url {:?} is not a valid URL",
                self.base_url
            )));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_secs_f64(self.retry_delay_secs.max(0.0)),
        )
    }

    pub fn browser_timeout(&self) -> Duration {
        Duration::from_millis(self.browser_timeout_ms)
    }

    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_millis(self.page_load_timeout_ms)
    }

    pub fn image_timeout(&self) -> Duration {
        Duration::from_secs(self.image_timeout_secs)
    }

    pub fn max_image_bytes(&self) -> u64 {
        self.max_image_size_mb.saturating_mul(1024 * 1024)
    }

    /// Pages open at once for detail extraction, capped to keep load on the
    /// target site low.
    pub fn detail_concurrency(&self) -> usize {
        self.detail_concurrency.clamp(1, MAX_DETAIL_CONCURRENCY)
    }

    pub fn image_concurrency(&self) -> usize {
        self.image_concurrency.max(1)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        (self.run_timeout_secs > 0).then(|| Duration::from_secs(self.run_timeout_secs))
    }
}
