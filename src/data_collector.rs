use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use crate::analysis::{compute_metrics, MetricParams};
use crate::api::{ApiError, MarketDataProvider};
use crate::database::DatabaseManager;
use crate::models::{Config, FundamentalRecord, PriceRecord, Ticker};

/// A ticker that exhausted its fetch attempts this run
#[derive(Debug, Clone)]
pub struct FailedTicker {
    pub symbol: String,
    pub error: String,
}

/// Outcome of one collection run
#[derive(Debug)]
pub struct RunSummary {
    pub total: usize,
    pub processed: usize,
    pub price_rows: usize,
    pub metric_rows: usize,
    pub failed: Vec<FailedTicker>,
}

struct TickerData {
    prices: Vec<PriceRecord>,
    fundamentals: Option<FundamentalRecord>,
}

/// Sequences the pipeline per ticker: fetch (rate-limited, retried
/// inside the provider) → compute metrics → persist.
///
/// Fetch failures are isolated to the ticker and reported in the run
/// summary; database errors propagate and abort the run, since the
/// store is essential.
pub struct DataCollector<P> {
    provider: P,
    database: DatabaseManager,
    config: Config,
}

impl<P: MarketDataProvider> DataCollector<P> {
    pub fn new(provider: P, database: DatabaseManager, config: Config) -> Self {
        Self {
            provider,
            database,
            config,
        }
    }

    pub async fn run(&self, tickers: &[Ticker]) -> Result<RunSummary> {
        let params = MetricParams::from(&self.config);
        let total = tickers.len();
        info!("🚀 Starting collection run for {} tickers", total);

        let mut summary = RunSummary {
            total,
            processed: 0,
            price_rows: 0,
            metric_rows: 0,
            failed: Vec::new(),
        };

        for (i, ticker) in tickers.iter().enumerate() {
            info!("[{}/{}] Processing {}", i + 1, total, ticker.symbol);
            let ticker_id = self.database.upsert_ticker(ticker).await?;

            let data = match self.fetch_ticker(&ticker.symbol).await {
                Ok(data) => data,
                Err(e) => {
                    warn!("❌ {} failed: {}", ticker.symbol, e);
                    summary.failed.push(FailedTicker {
                        symbol: ticker.symbol.clone(),
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            let metrics = compute_metrics(&data.prices, data.fundamentals.as_ref(), &params);

            for price in &data.prices {
                self.database.insert_daily_price(ticker_id, price).await?;
            }
            if let Some(fundamentals) = &data.fundamentals {
                self.database.upsert_fundamentals(ticker_id, fundamentals).await?;
            }
            for metric in &metrics {
                self.database.upsert_metric(ticker_id, metric).await?;
            }

            summary.processed += 1;
            summary.price_rows += data.prices.len();
            summary.metric_rows += metrics.len();
            info!(
                "✅ {}: {} price rows, {} metric rows",
                ticker.symbol,
                data.prices.len(),
                metrics.len()
            );
        }

        let today = Utc::now().date_naive();
        self.database
            .set_metadata("last_run_date", &today.format("%Y-%m-%d").to_string())
            .await?;

        info!(
            "🏁 Run complete: {}/{} processed, {} failed",
            summary.processed,
            summary.total,
            summary.failed.len()
        );
        for failed in &summary.failed {
            warn!("   failed: {} ({})", failed.symbol, failed.error);
        }

        Ok(summary)
    }

    /// Fetch raw data for one ticker. A price-history failure fails the
    /// ticker; a fundamentals failure only degrades it (momentum metrics
    /// still compute, valuation ratios stay undefined).
    async fn fetch_ticker(&self, symbol: &str) -> Result<TickerData, ApiError> {
        let mut prices = self
            .provider
            .fetch_price_history(symbol, self.config.lookback_days)
            .await?;
        prices.sort_by_key(|p| p.date);
        prices.dedup_by_key(|p| p.date);

        let fundamentals = match self.provider.fetch_fundamentals(symbol).await {
            Ok(fundamentals) => Some(fundamentals),
            Err(e) => {
                warn!(
                    "Fundamentals unavailable for {}: {}; valuation ratios will be undefined",
                    symbol, e
                );
                None
            }
        };

        Ok(TickerData {
            prices,
            fundamentals,
        })
    }
}
