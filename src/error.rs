use thirtyfour::error::WebDriverError;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Run-level failures. Any of these aborts the scan after the browser
/// session has been released.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("could not start a WebDriver session at {url}: {source}")]
    Session {
        url: String,
        #[source]
        source: WebDriverError,
    },

    #[error("navigation to {url} failed or timed out: {source}")]
    NavigationTimeout {
        url: String,
        #[source]
        source: WebDriverError,
    },

    #[error("search box `{selector}` not found: {source}")]
    SearchBox {
        selector: String,
        #[source]
        source: WebDriverError,
    },

    #[error("result feed `{selector}` not found: {source}")]
    FeedNotFound {
        selector: String,
        #[source]
        source: BoxError,
    },

    #[error("feed surface error: {0}")]
    Surface(#[source] BoxError),

    #[error("record sink failed: {0}")]
    Sink(#[source] anyhow::Error),
}

impl From<WebDriverError> for ScrapeError {
    fn from(e: WebDriverError) -> Self {
        ScrapeError::Surface(Box::new(e))
    }
}

/// Item-level failures. The card is skipped and the scan continues.
#[derive(Debug, Error)]
pub enum CardError {
    #[error("could not read card text: {0}")]
    Text(#[source] BoxError),
}
