use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, REFERER};
use reqwest::{Client, ClientBuilder};
use std::time::Duration;

pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Client used for image downloads. It presents itself like the browser that
/// rendered the product page so image CDNs serve the same content.
pub fn create_client(timeout: Duration, referer: &str) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("image/avif,image/webp,image/apng,image/*,*/*;q=0.8"),
    );
    if let Ok(value) = HeaderValue::from_str(referer) {
        headers.insert(REFERER, value);
    }

    let client = ClientBuilder::new()
        .user_agent(DESKTOP_USER_AGENT)
        .default_headers(headers)
        .timeout(timeout)
        .pool_max_idle_per_host(4)
        .build()
        .context("Failed to build image download client")?;

    Ok(client)
}
