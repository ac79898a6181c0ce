//! Finalist image downloads with on-disk deduplication.

use anyhow::Result;
use reqwest::{Client, StatusCode};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::Config;
use crate::error::{ScrapeError, ScrapeResult};
use crate::models::ImageAsset;
use crate::parsers::{slugify, truncate_chars};
use crate::utils::http::create_client;
use crate::utils::RetryPolicy;

const MAX_NAME_SLUG_CHARS: usize = 60;
const HASH_CHARS: usize = 10;
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "avif"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Downloaded(ImageAsset),
    /// Already on disk from an earlier run; no request was made.
    Cached(ImageAsset),
    Skipped(String),
}

impl FetchOutcome {
    pub fn asset(&self) -> Option<&ImageAsset> {
        match self {
            FetchOutcome::Downloaded(asset) | FetchOutcome::Cached(asset) => Some(asset),
            FetchOutcome::Skipped(_) => None,
        }
    }
}

pub struct AssetManager {
    client: Client,
    images_dir: PathBuf,
    max_bytes: u64,
    policy: RetryPolicy,
    enabled: bool,
}

impl AssetManager {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            client: create_client(config.image_timeout(), &config.base_url)?,
            images_dir: config.images_dir.clone(),
            max_bytes: config.max_image_bytes(),
            policy: config.retry_policy(),
            enabled: config.download_images,
        })
    }

    /// `<images_dir>/<keyword_slug>/<name slug>_<url hash>.<ext>`
    pub fn image_path(&self, url: &Url, keyword_slug: &str, product_name: &str) -> PathBuf {
        let slug = slugify(product_name);
        let base = truncate_chars(&slug, MAX_NAME_SLUG_CHARS).trim_end_matches('-');
        let base = if base.is_empty() { "product" } else { base };

        let digest = format!("{:x}", md5::compute(url.as_str().as_bytes()));
        let hash = &digest[..HASH_CHARS];

        self.images_dir
            .join(keyword_slug)
            .join(format!("{}_{}.{}", base, hash, extension(url)))
    }

    pub async fn fetch_image(&self, url: &str, keyword_slug: &str, product_name: &str) -> FetchOutcome {
        if !self.enabled {
            return FetchOutcome::Skipped("image downloads disabled".into());
        }
        let Some(parsed) = valid_image_url(url) else {
            debug!(url, "Skipping invalid image URL");
            return FetchOutcome::Skipped(format!("invalid image URL {url:?}"));
        };

        let path = self.image_path(&parsed, keyword_slug, product_name);
        if let Ok(meta) = fs::metadata(&path).await {
            if meta.is_file() && meta.len() > 0 {
                debug!(url, path = %path.display(), "Image already on disk");
                return FetchOutcome::Cached(asset(url, &path, meta.len()));
            }
        }

        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent).await {
                warn!(url, error = %e, "Could not create image directory");
                return FetchOutcome::Skipped(e.to_string());
            }
        }

        let path_ref = path.as_path();
        let downloaded = self
            .policy
            .run("image download", |_| async move { self.download(url, path_ref).await })
            .await;

        match downloaded {
            Ok(bytes) => {
                info!(url, bytes, path = %path.display(), "Image downloaded");
                FetchOutcome::Downloaded(asset(url, &path, bytes))
            }
            Err(e) => {
                warn!(url, error = %e, "Image skipped");
                FetchOutcome::Skipped(e.to_string())
            }
        }
    }

    async fn download(&self, url: &str, path: &Path) -> ScrapeResult<u64> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ScrapeError::image(url, e.to_string(), true))?;

        let status = response.status();
        if !status.is_success() {
            let retryable = status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS;
            return Err(ScrapeError::image(url, format!("HTTP {status}"), retryable));
        }

        if let Some(declared) = response.content_length() {
            if declared > self.max_bytes {
                return Err(ScrapeError::image(
                    url,
                    format!("declared size {declared} exceeds limit {}", self.max_bytes),
                    false,
                ));
            }
        }

        let part = part_path(path);
        let mut file = fs::File::create(&part)
            .await
            .map_err(|e| ScrapeError::image(url, e.to_string(), false))?;

        let mut total: u64 = 0;
        loop {
            let chunk = match response.chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => {
                    drop(file);
                    discard(&part).await;
                    return Err(ScrapeError::image(url, e.to_string(), true));
                }
            };

            total += chunk.len() as u64;
            if total > self.max_bytes {
                drop(file);
                discard(&part).await;
                return Err(ScrapeError::image(
                    url,
                    format!("body exceeds limit {}", self.max_bytes),
                    false,
                ));
            }
            if let Err(e) = file.write_all(&chunk).await {
                drop(file);
                discard(&part).await;
                return Err(ScrapeError::image(url, e.to_string(), false));
            }
        }

        if let Err(e) = file.flush().await {
            drop(file);
            discard(&part).await;
            return Err(ScrapeError::image(url, e.to_string(), false));
        }
        drop(file);

        if total == 0 {
            discard(&part).await;
            return Err(ScrapeError::image(url, "empty body", false));
        }

        fs::rename(&part, path)
            .await
            .map_err(|e| ScrapeError::image(url, e.to_string(), false))?;
        Ok(total)
    }
}

fn valid_image_url(url: &str) -> Option<Url> {
    let parsed = Url::parse(url.trim()).ok()?;
    let web = matches!(parsed.scheme(), "http" | "https");
    (web && parsed.host_str().is_some()).then_some(parsed)
}

fn extension(url: &Url) -> &'static str {
    let last = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default()
        .to_ascii_lowercase();
    last.rsplit_once('.')
        .and_then(|(_, ext)| IMAGE_EXTENSIONS.iter().find(|known| **known == ext))
        .copied()
        .unwrap_or("jpg")
}

fn part_path(path: &Path) -> PathBuf {
    let mut part = path.as_os_str().to_owned();
    part.push(".part");
    PathBuf::from(part)
}

async fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        debug!(path = %path.display(), "Could not remove partial download: {}", e);
    }
}

fn asset(url: &str, path: &Path, byte_size: u64) -> ImageAsset {
    ImageAsset {
        source_url: url.to_string(),
        local_path: path.to_string_lossy().to_string(),
        byte_size,
    }
}
