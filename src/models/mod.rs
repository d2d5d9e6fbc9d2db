use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A tracked equity symbol. Created once at load time, immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ticker {
    pub id: Option<i64>,
    pub symbol: String,
    pub exchange: Exchange,
}

/// Which index list a ticker came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Exchange {
    Sp500,
    Nasdaq,
}

impl Exchange {
    pub fn as_str(&self) -> &'static str {
        match self {
            Exchange::Sp500 => "sp500",
            Exchange::Nasdaq => "nasdaq",
        }
    }

    pub fn from_tag(s: &str) -> Self {
        match s {
            "nasdaq" => Exchange::Nasdaq,
            _ => Exchange::Sp500,
        }
    }
}

/// One OHLCV row per ticker-day, append-only
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceRecord {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Option<i64>,
}

/// Fundamental snapshot for a ticker, refreshed per run and upserted
/// by (ticker, as_of).
///
/// `pe_ratio` and `pb_ratio` are the provider-reported trailing figures;
/// the derived ratios live in [`MetricRecord`]. `book_value` is per share.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FundamentalRecord {
    pub as_of: NaiveDate,
    pub pe_ratio: Option<f64>,
    pub pb_ratio: Option<f64>,
    pub market_cap: Option<f64>,
    pub enterprise_value: Option<f64>,
    pub ebitda: Option<f64>,
    pub eps: Option<f64>,
    pub book_value: Option<f64>,
    pub revenue: Option<f64>,
}

/// Derived momentum and valuation metrics for one ticker-day.
///
/// Any field whose input window is not yet filled, or whose denominator
/// is missing or zero, is `None` rather than NaN. Safe to regenerate:
/// recomputing from the same raw records yields the same values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricRecord {
    pub date: NaiveDate,
    pub last_price: f64,
    pub ma: Option<f64>,
    pub ema: f64,
    pub pct_above_ma: Option<f64>,
    pub pct_above_ema: Option<f64>,
    pub momentum: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub pb_ratio: Option<f64>,
    pub ebitda_ev: Option<f64>,
}

/// Configuration for the application
#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub database_path: String,
    pub data_dir: PathBuf,
    pub lookback_days: i64,
    pub min_request_interval_ms: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub http_timeout_secs: u64,
    pub ma_window: usize,
    pub ema_window: usize,
    pub momentum_lookback: usize,
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// documented defaults for anything unset or unparseable.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        Ok(Config {
            api_base_url: std::env::var("API_BASE_URL")
                .unwrap_or_else(|_| "https://query1.finance.yahoo.com".to_string()),
            database_path: std::env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "stock_metrics.db".to_string()),
            data_dir: std::env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data")),
            lookback_days: env_or("LOOKBACK_DAYS", 150),
            min_request_interval_ms: env_or("MIN_REQUEST_INTERVAL_MS", 1000),
            max_retries: env_or("MAX_RETRIES", 3),
            retry_base_delay_ms: env_or("RETRY_BASE_DELAY_MS", 500),
            http_timeout_secs: env_or("HTTP_TIMEOUT_SECS", 30),
            ma_window: env_or("MA_WINDOW", 100),
            ema_window: env_or("EMA_WINDOW", 100),
            momentum_lookback: env_or("MOMENTUM_LOOKBACK", 20),
        })
    }

    pub fn sp500_csv_path(&self) -> PathBuf {
        self.data_dir.join("sp500.csv")
    }

    pub fn nasdaq_csv_path(&self) -> PathBuf {
        self.data_dir.join("nasdaq.csv")
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_round_trip() {
        assert_eq!(Exchange::from_tag(Exchange::Sp500.as_str()), Exchange::Sp500);
        assert_eq!(Exchange::from_tag(Exchange::Nasdaq.as_str()), Exchange::Nasdaq);
        // Unknown tags fall back to S&P 500
        assert_eq!(Exchange::from_tag("nyse"), Exchange::Sp500);
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        std::env::set_var("STOCK_METRICS_TEST_GARBAGE", "not-a-number");
        let value: u32 = env_or("STOCK_METRICS_TEST_GARBAGE", 42);
        assert_eq!(value, 42);
        std::env::remove_var("STOCK_METRICS_TEST_GARBAGE");
    }

    #[test]
    fn test_csv_paths_live_under_data_dir() {
        let config = Config {
            api_base_url: String::new(),
            database_path: String::new(),
            data_dir: PathBuf::from("/tmp/universe"),
            lookback_days: 150,
            min_request_interval_ms: 0,
            max_retries: 3,
            retry_base_delay_ms: 500,
            http_timeout_secs: 30,
            ma_window: 100,
            ema_window: 100,
            momentum_lookback: 20,
        };
        assert_eq!(config.sp500_csv_path(), PathBuf::from("/tmp/universe/sp500.csv"));
        assert_eq!(config.nasdaq_csv_path(), PathBuf::from("/tmp/universe/nasdaq.csv"));
    }
}
