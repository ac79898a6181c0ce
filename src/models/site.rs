use url::Url;

use crate::error::{ScrapeError, ScrapeResult};

pub const SOURCE_SITE: &str = "tokopedia";
pub const DEFAULT_BASE_URL: &str = "https://www.tokopedia.com";

/// First path segments that never start a product page.
const RESERVED_SEGMENTS: &[&str] = &[
    "search", "cart", "help", "promo", "discover", "discovery", "blog", "about", "careers",
    "mitra", "seller", "admin", "events", "ta", "login", "register", "oauth", "category",
    "kategori", "find", "wishlist", "top-up",
];

/// The storefront being scraped, addressed through its base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    base: Url,
}

impl Site {
    pub fn new(base_url: &str) -> ScrapeResult<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| ScrapeError::Config(format!("invalid base URL {base_url:?}: {e}")))?;
        if base.host_str().is_none() {
            return Err(ScrapeError::Config(format!("base URL {base_url:?} has no host")));
        }
        Ok(Self { base })
    }

    pub fn base_url(&self) -> &str {
        self.base.as_str().trim_end_matches('/')
    }

    pub fn host(&self) -> &str {
        self.base.host_str().unwrap_or_default()
    }

    /// Registrable part of the host, e.g. `tokopedia.com` for `www.tokopedia.com`.
    fn domain(&self) -> &str {
        self.host().trim_start_matches("www.")
    }

    pub fn search_url(&self, keyword: &str) -> String {
        let query = serde_urlencoded::to_string([("st", "product"), ("q", keyword)])
            .unwrap_or_default();
        format!("{}/search?{}", self.base_url(), query)
    }

    /// Resolves `href` against the base URL. Script and mail links are rejected.
    pub fn absolute_url(&self, href: &str) -> Option<Url> {
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') {
            return None;
        }
        let url = self.base.join(href).ok()?;
        matches!(url.scheme(), "http" | "https").then_some(url)
    }

    /// Query string and fragment stripped; the dedup key for candidates.
    pub fn canonical_url(url: &Url) -> String {
        let mut url = url.clone();
        url.set_query(None);
        url.set_fragment(None);
        url.as_str().trim_end_matches('/').to_string()
    }

    pub fn looks_like_product_url(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        if !host.contains(self.domain()) {
            return false;
        }

        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();

        if segments.first() == Some(&"p") {
            return segments.len() >= 2;
        }
        if segments.len() < 2 {
            return false;
        }
        let first = segments[0].to_ascii_lowercase();
        let second = segments[1].to_ascii_lowercase();
        !RESERVED_SEGMENTS.contains(&first.as_str())
            && second != "category"
            && second != "kategori"
            && !url.path().to_ascii_lowercase().contains("search")
    }

    /// Product name guessed from the last path segment: `laptop-asus-x441` → `laptop asus x441`.
    pub fn name_from_url(url: &Url) -> Option<String> {
        let last = url
            .path_segments()?
            .filter(|seg| !seg.is_empty())
            .last()?;
        let name = last
            .split(['-', '_'])
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        (name.chars().count() >= 4).then_some(name)
    }
}

impl Default for Site {
    fn default() -> Self {
        Self {
            base: Url::parse(DEFAULT_BASE_URL).expect("default base URL is valid"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn search_url_encodes_the_keyword() {
        let site = Site::default();
        assert_eq!(
            site.search_url("laptop gaming"),
            "https://www.tokopedia.com/search?st=product&q=laptop+gaming"
        );
    }

    #[test]
    fn product_urls_are_recognized() {
        let site = Site::default();
        assert!(site.looks_like_product_url(&url("https://www.tokopedia.com/asusstore/laptop-asus-x441")));
        assert!(site.looks_like_product_url(&url("https://tokopedia.com/p/laptop/asus")));
        assert!(!site.looks_like_product_url(&url("https://www.tokopedia.com/search/laptop")));
        assert!(!site.looks_like_product_url(&url("https://www.tokopedia.com/asusstore")));
        assert!(!site.looks_like_product_url(&url("https://www.tokopedia.com/asusstore/kategori")));
        assert!(!site.looks_like_product_url(&url("https://ads.example.com/shop/item")));
    }

    #[test]
    fn canonical_url_drops_tracking_parameters() {
        let u = url("https://www.tokopedia.com/shop/item-1?extParam=ivf%3Dfalse&src=topads#reviews");
        assert_eq!(Site::canonical_url(&u), "https://www.tokopedia.com/shop/item-1");
    }

    #[test]
    fn relative_hrefs_resolve_against_the_base() {
        let site = Site::default();
        let resolved = site.absolute_url("/shop/item-1").unwrap();
        assert_eq!(resolved.as_str(), "https://www.tokopedia.com/shop/item-1");
        assert!(site.absolute_url("javascript:void(0)").is_none());
        assert!(site.absolute_url("#top").is_none());
    }

    #[test]
    fn name_is_derived_from_the_slug() {
        let u = url("https://www.tokopedia.com/shop/laptop-asus-x441");
        assert_eq!(Site::name_from_url(&u).as_deref(), Some("laptop asus x441"));
    }
}
