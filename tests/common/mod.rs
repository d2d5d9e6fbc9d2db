//! Shared fixtures for the integration tests

#![allow(dead_code)]

use chrono::NaiveDate;
use std::path::PathBuf;
use tempfile::TempDir;

use stock_metrics::database::DatabaseManager;
use stock_metrics::models::{Config, Exchange, FundamentalRecord, PriceRecord, Ticker};

/// Scratch database in a temp directory. Keep the `TempDir` alive for
/// as long as the manager is used.
pub async fn scratch_database() -> (TempDir, DatabaseManager) {
    let dir = TempDir::new().expect("failed to create temp dir");
    let path = dir.path().join("test.db");
    let database = DatabaseManager::new(path.to_str().unwrap())
        .await
        .expect("failed to create test database");
    (dir, database)
}

/// Config pointed at a mock API server, tuned for fast tests.
pub fn test_config(api_base_url: &str, database_path: &str) -> Config {
    Config {
        api_base_url: api_base_url.to_string(),
        database_path: database_path.to_string(),
        data_dir: PathBuf::from("data"),
        lookback_days: 150,
        min_request_interval_ms: 0,
        max_retries: 3,
        retry_base_delay_ms: 1,
        http_timeout_secs: 5,
        ma_window: 3,
        ema_window: 3,
        momentum_lookback: 2,
    }
}

pub fn ticker(symbol: &str, exchange: Exchange) -> Ticker {
    Ticker {
        id: None,
        symbol: symbol.to_string(),
        exchange,
    }
}

pub fn start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
}

/// Daily price rows on consecutive dates from [`start_date`]
pub fn price_series(closes: &[f64]) -> Vec<PriceRecord> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| PriceRecord {
            date: start_date() + chrono::Duration::days(i as i64),
            open: close - 0.5,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: Some(1_000_000),
        })
        .collect()
}

pub fn fundamentals(as_of: NaiveDate) -> FundamentalRecord {
    FundamentalRecord {
        as_of,
        pe_ratio: Some(25.0),
        pb_ratio: Some(5.0),
        market_cap: Some(1.0e12),
        enterprise_value: Some(1.1e12),
        ebitda: Some(1.2e11),
        eps: Some(2.0),
        book_value: Some(4.0),
        revenue: Some(4.0e11),
    }
}

/// Chart-endpoint JSON body covering `closes` on consecutive dates
pub fn chart_body(closes: &[f64]) -> serde_json::Value {
    let timestamps: Vec<i64> = closes
        .iter()
        .enumerate()
        .map(|(i, _)| {
            (start_date() + chrono::Duration::days(i as i64))
                .and_hms_opt(0, 0, 0)
                .unwrap()
                .and_utc()
                .timestamp()
        })
        .collect();
    let values: Vec<Option<f64>> = closes.iter().map(|&c| Some(c)).collect();
    let volumes: Vec<i64> = closes.iter().map(|_| 1_000_000).collect();

    serde_json::json!({
        "chart": {
            "result": [{
                "timestamp": timestamps,
                "indicators": {
                    "quote": [{
                        "open": &values,
                        "high": &values,
                        "low": &values,
                        "close": &values,
                        "volume": volumes
                    }]
                }
            }],
            "error": null
        }
    })
}

/// Quote-summary JSON body with EPS 2.0, book value 4.0, EBITDA 1.2e11
/// and enterprise value 1.1e12.
pub fn quote_summary_body() -> serde_json::Value {
    serde_json::json!({
        "quoteSummary": {
            "result": [{
                "summaryDetail": {
                    "marketCap": {"raw": 1.0e12, "fmt": "1T"},
                    "trailingPE": {"raw": 25.0}
                },
                "defaultKeyStatistics": {
                    "trailingEps": {"raw": 2.0},
                    "bookValue": {"raw": 4.0},
                    "priceToBook": {"raw": 5.0},
                    "enterpriseValue": {"raw": 1.1e12}
                },
                "financialData": {
                    "ebitda": {"raw": 1.2e11},
                    "totalRevenue": {"raw": 4.0e11},
                    "totalDebt": {"raw": 1.5e11},
                    "totalCash": {"raw": 5.0e10}
                }
            }],
            "error": null
        }
    })
}
