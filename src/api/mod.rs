use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::Quota;
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

use crate::models::{FundamentalRecord, PriceRecord};

pub mod yahoo_client;
pub use yahoo_client::YahooClient;

type DirectRateLimiter = governor::RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Errors from the market data API layer.
///
/// `is_transient` decides whether a failure is worth retrying: request
/// transport problems and throttling/server statuses are; client errors
/// and unparseable bodies are not.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("API request to {url} failed with status {status}")]
    Http { status: StatusCode, url: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("no data returned for {0}")]
    NoData(String),
}

impl ApiError {
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Http { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            ApiError::Transport(e) => e.is_timeout() || e.is_connect(),
            ApiError::MalformedResponse(_) | ApiError::NoData(_) => false,
        }
    }
}

/// Spaces outbound API calls by a minimum interval.
///
/// An explicit component instance owned by the client, not a module-wide
/// clock: quota of one call per interval, so the second of two
/// back-to-back `acquire`s waits out the remainder of the interval.
pub struct RateLimiter {
    limiter: Option<DirectRateLimiter>,
}

impl RateLimiter {
    /// A zero interval disables waiting entirely.
    pub fn new(min_interval: Duration) -> Self {
        let limiter = Quota::with_period(min_interval).map(governor::RateLimiter::direct);
        Self { limiter }
    }

    pub async fn acquire(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }
}

/// Exponential backoff schedule for retrying transient API failures:
/// `base * 2^attempt`, where `attempt` counts failures so far.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base * 2u32.saturating_pow(attempt)
}

/// Per-ticker data access against the market data provider
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Daily price history covering roughly `lookback_days` before now.
    async fn fetch_price_history(
        &self,
        symbol: &str,
        lookback_days: i64,
    ) -> Result<Vec<PriceRecord>, ApiError>;

    /// Latest fundamental snapshot for the symbol.
    async fn fetch_fundamentals(&self, symbol: &str) -> Result<FundamentalRecord, ApiError>;
}
