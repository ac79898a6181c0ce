use thiserror::Error;

/// Failures raised while driving the browser, parsing pages and fetching
/// images. Only `SessionLaunch` and `Config` abort a run; everything else is
/// caught at its own boundary and turned into missing data.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("browser session could not be launched after {attempts} attempts: {reason}")]
    SessionLaunch { attempts: u32, reason: String },

    #[error("no locator matched for {field}")]
    SelectorExhausted { field: &'static str },

    #[error("navigation to {url} timed out after {timeout_ms}ms")]
    NavigationTimeout { url: String, timeout_ms: u64 },

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("{url} looks like a captcha or block page")]
    RateLimitSuspected { url: String },

    #[error("image {url} not fetched: {reason}")]
    ImageFetch {
        url: String,
        reason: String,
        retryable: bool,
    },

    #[error("could not parse a price from {text:?}")]
    MalformedPrice { text: String },

    #[error("browser page error: {0}")]
    Page(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type ScrapeResult<T> = Result<T, ScrapeError>;

impl ScrapeError {
    /// Whether another attempt of the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ScrapeError::NavigationTimeout { .. }
            | ScrapeError::Navigation { .. }
            | ScrapeError::RateLimitSuspected { .. }
            | ScrapeError::Page(_) => true,
            ScrapeError::ImageFetch { retryable, .. } => *retryable,
            ScrapeError::SessionLaunch { .. }
            | ScrapeError::SelectorExhausted { .. }
            | ScrapeError::MalformedPrice { .. }
            | ScrapeError::Config(_) => false,
        }
    }

    /// Backoff multiplier applied before retrying. Suspected rate limiting
    /// waits considerably longer than an ordinary transient failure.
    pub fn backoff_multiplier(&self) -> u32 {
        match self {
            ScrapeError::RateLimitSuspected { .. } => 4,
            _ => 1,
        }
    }

    pub(crate) fn image(url: &str, reason: impl Into<String>, retryable: bool) -> Self {
        ScrapeError::ImageFetch {
            url: url.to_string(),
            reason: reason.into(),
            retryable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn navigation_failures_are_retried_but_parse_failures_are_not() {
        let timeout = ScrapeError::NavigationTimeout {
            url: "https://example.com".into(),
            timeout_ms: 100,
        };
        assert!(timeout.is_transient());
        assert!(!ScrapeError::MalformedPrice { text: "n/a".into() }.is_transient());
        assert!(!ScrapeError::SelectorExhausted { field: "price" }.is_transient());
        assert!(ScrapeError::image("u", "HTTP 503", true).is_transient());
        assert!(!ScrapeError::image("u", "too large", false).is_transient());
    }

    #[test]
    fn rate_limit_backs_off_longer() {
        let blocked = ScrapeError::RateLimitSuspected { url: "u".into() };
        assert_eq!(blocked.backoff_multiplier(), 4);
        assert_eq!(ScrapeError::Page("x".into()).backoff_multiplier(), 1);
    }
}
