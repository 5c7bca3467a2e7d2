use std::time::Duration;
use thiserror::Error;

/// Errors that cross a post or process boundary.
///
/// Per-element and per-selector failures never become a `CrawlError`; the
/// extraction steps model those as `Option` and skip. A `CrawlError` either
/// aborts one post (navigation, page state) or the whole run (browser,
/// authentication, configuration).
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("no Chromium-family browser found (install Chrome/Chromium/Brave or set CHROME_EXECUTABLE)")]
    BrowserNotFound,

    #[error("browser launch failed: {0}")]
    BrowserLaunch(String),

    #[error("navigation to {url} timed out after {timeout:?}")]
    NavigationTimeout { url: String, timeout: Duration },

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("page interaction failed: {0}")]
    Page(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("verification challenge not resolved within {0:?}")]
    ChallengeUnresolved(Duration),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
}

impl CrawlError {
    /// `true` for failures that only invalidate the current post.
    pub fn is_post_scoped(&self) -> bool {
        matches!(
            self,
            CrawlError::NavigationTimeout { .. } | CrawlError::Navigation { .. } | CrawlError::Page(_)
        )
    }
}

pub type CrawlResult<T> = Result<T, CrawlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_scoped_errors_are_classified() {
        let timeout = CrawlError::NavigationTimeout {
            url: "https://www.facebook.com/x/posts/1".into(),
            timeout: Duration::from_secs(30),
        };
        assert!(timeout.is_post_scoped());
        assert!(CrawlError::Page("stale".into()).is_post_scoped());
        assert!(!CrawlError::BrowserNotFound.is_post_scoped());
        assert!(!CrawlError::Auth("bad password".into()).is_post_scoped());
    }

    #[test]
    fn navigation_timeout_message_names_url() {
        let err = CrawlError::NavigationTimeout {
            url: "https://example.com/p".into(),
            timeout: Duration::from_millis(1500),
        };
        assert!(err.to_string().contains("https://example.com/p"));
    }
}
