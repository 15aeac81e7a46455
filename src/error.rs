// src/error.rs
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScrapeError>;

/// Error taxonomy for a scraping run. Nothing here is fatal to the run as a
/// whole except `Config`; callers skip the failing page/company and move on.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("timeout fetching {0}")]
    Timeout(String),

    #[error("network error fetching {url}: {message}")]
    Network { url: String, message: String },

    #[error("http {status} from {url}")]
    Http { url: String, status: u16 },

    #[error("blocked by robots.txt: {0}")]
    RobotsDisallowed(String),

    #[error("retries exhausted for {0}")]
    RetriesExhausted(String),

    #[error("parse error on {url}: {message}")]
    Parse { url: String, message: String },

    #[error("invalid candidate: {0}")]
    Validation(String),

    #[error("cancellation requested")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

impl ScrapeError {
    /// Timeouts, connection failures, 429 and 5xx are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            ScrapeError::Timeout(_) | ScrapeError::Network { .. } => true,
            ScrapeError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ScrapeError::Timeout(url.to_string())
        } else {
            ScrapeError::Network {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}
