use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::{backoff_delay, ApiError, MarketDataProvider, RateLimiter};
use crate::models::{Config, FundamentalRecord, PriceRecord};

/// Client for the Yahoo-style market data API.
///
/// Daily candles come from the chart endpoint, fundamentals from the
/// quote summary endpoint. Every request passes through the rate
/// limiter, and transient failures are retried with exponential backoff
/// up to the configured attempt count.
pub struct YahooClient {
    client: Client,
    base_url: Url,
    rate_limiter: RateLimiter,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl YahooClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .user_agent("stock-metrics/0.1")
            .build()?;

        let base_url = Url::parse(&config.api_base_url)
            .with_context(|| format!("invalid API base URL: {}", config.api_base_url))?;

        Ok(Self {
            client,
            base_url,
            rate_limiter: RateLimiter::new(Duration::from_millis(config.min_request_interval_ms)),
            max_retries: config.max_retries.max(1),
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
        })
    }

    fn chart_url(&self, symbol: &str, lookback_days: i64) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(&format!("/v8/finance/chart/{}", symbol));
        url.query_pairs_mut()
            .append_pair("range", range_for_lookback(lookback_days))
            .append_pair("interval", "1d");
        url
    }

    fn quote_summary_url(&self, symbol: &str) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(&format!("/v10/finance/quoteSummary/{}", symbol));
        url.query_pairs_mut()
            .append_pair("modules", "summaryDetail,defaultKeyStatistics,financialData");
        url
    }

    /// One rate-limited request. Non-2xx statuses become `ApiError::Http`;
    /// an undecodable body is `MalformedResponse`, never a retry.
    async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, ApiError> {
        self.rate_limiter.acquire().await;
        debug!("GET {}", url);

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Http {
                status,
                url: url.to_string(),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::MalformedResponse(e.to_string()))
    }

    async fn get_with_retry<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        let mut attempt = 0;
        loop {
            match self.get_json(&url).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt + 1 < self.max_retries => {
                    let delay = backoff_delay(self.retry_base_delay, attempt);
                    warn!(
                        "Attempt {}/{} failed for {}: {}. Retrying in {:?}",
                        attempt + 1,
                        self.max_retries,
                        url,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait::async_trait]
impl MarketDataProvider for YahooClient {
    async fn fetch_price_history(
        &self,
        symbol: &str,
        lookback_days: i64,
    ) -> Result<Vec<PriceRecord>, ApiError> {
        let url = self.chart_url(symbol, lookback_days);
        let body: ChartResponse = self.get_with_retry(url).await?;
        let records = parse_chart(symbol, body)?;
        debug!("Retrieved {} price rows for {}", records.len(), symbol);
        Ok(records)
    }

    async fn fetch_fundamentals(&self, symbol: &str) -> Result<FundamentalRecord, ApiError> {
        let url = self.quote_summary_url(symbol);
        let body: QuoteSummaryResponse = self.get_with_retry(url).await?;
        parse_quote_summary(symbol, body)
    }
}

/// Range string for the chart endpoint covering at least `days` of history
fn range_for_lookback(days: i64) -> &'static str {
    if days <= 30 {
        "1mo"
    } else if days <= 90 {
        "3mo"
    } else if days <= 180 {
        "6mo"
    } else if days <= 365 {
        "1y"
    } else if days <= 730 {
        "2y"
    } else {
        "5y"
    }
}

// ---------------------------------------------------------------------------
// Chart endpoint schema
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartEnvelope,
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<i64>>,
}

fn parse_chart(symbol: &str, body: ChartResponse) -> Result<Vec<PriceRecord>, ApiError> {
    if let Some(error) = &body.chart.error {
        if !error.is_null() {
            return Err(ApiError::NoData(format!("{}: {}", symbol, error)));
        }
    }

    let result = body
        .chart
        .result
        .and_then(|mut r| if r.is_empty() { None } else { Some(r.remove(0)) })
        .ok_or_else(|| ApiError::NoData(symbol.to_string()))?;

    let quote = result.indicators.quote.into_iter().next().ok_or_else(|| {
        ApiError::MalformedResponse(format!("chart for {} is missing its quote block", symbol))
    })?;

    if quote.close.len() != result.timestamp.len() {
        return Err(ApiError::MalformedResponse(format!(
            "chart for {}: {} timestamps but {} closes",
            symbol,
            result.timestamp.len(),
            quote.close.len()
        )));
    }

    let mut records = Vec::with_capacity(result.timestamp.len());
    for (i, ts) in result.timestamp.iter().enumerate() {
        // The provider fills halted sessions with nulls; skip those rows
        let Some(close) = quote.close.get(i).copied().flatten() else {
            continue;
        };
        let date = DateTime::from_timestamp(*ts, 0)
            .ok_or_else(|| {
                ApiError::MalformedResponse(format!("invalid timestamp {} for {}", ts, symbol))
            })?
            .date_naive();

        records.push(PriceRecord {
            date,
            open: quote.open.get(i).copied().flatten().unwrap_or(close),
            high: quote.high.get(i).copied().flatten().unwrap_or(close),
            low: quote.low.get(i).copied().flatten().unwrap_or(close),
            close,
            volume: quote.volume.get(i).copied().flatten(),
        });
    }

    if records.is_empty() {
        return Err(ApiError::NoData(symbol.to_string()));
    }
    Ok(records)
}

// ---------------------------------------------------------------------------
// Quote summary endpoint schema
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct QuoteSummaryResponse {
    #[serde(rename = "quoteSummary")]
    quote_summary: QuoteSummaryEnvelope,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryEnvelope {
    result: Option<Vec<QuoteSummaryResult>>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryResult {
    #[serde(rename = "summaryDetail")]
    summary_detail: Option<SummaryDetail>,
    #[serde(rename = "defaultKeyStatistics")]
    key_statistics: Option<KeyStatistics>,
    #[serde(rename = "financialData")]
    financial_data: Option<FinancialData>,
}

#[derive(Debug, Default, Deserialize)]
struct SummaryDetail {
    #[serde(rename = "marketCap")]
    market_cap: Option<FinancialValue>,
    #[serde(rename = "trailingPE")]
    trailing_pe: Option<FinancialValue>,
}

#[derive(Debug, Default, Deserialize)]
struct KeyStatistics {
    #[serde(rename = "trailingEps")]
    trailing_eps: Option<FinancialValue>,
    #[serde(rename = "bookValue")]
    book_value: Option<FinancialValue>,
    #[serde(rename = "priceToBook")]
    price_to_book: Option<FinancialValue>,
    #[serde(rename = "enterpriseValue")]
    enterprise_value: Option<FinancialValue>,
}

#[derive(Debug, Default, Deserialize)]
struct FinancialData {
    ebitda: Option<FinancialValue>,
    #[serde(rename = "totalRevenue")]
    total_revenue: Option<FinancialValue>,
    #[serde(rename = "totalDebt")]
    total_debt: Option<FinancialValue>,
    #[serde(rename = "totalCash")]
    total_cash: Option<FinancialValue>,
}

/// A numeric field the provider serves either as `{"raw": ..., "fmt": ...}`,
/// as a bare number, or as an abbreviated string like `"8.71B"`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FinancialValue {
    Wrapped { raw: Option<f64> },
    Number(f64),
    Text(String),
}

impl FinancialValue {
    fn as_f64(&self) -> Option<f64> {
        match self {
            FinancialValue::Wrapped { raw } => (*raw).filter(|v| v.is_finite()),
            FinancialValue::Number(n) => Some(*n).filter(|v| v.is_finite()),
            FinancialValue::Text(s) => parse_abbrev_number(s),
        }
    }
}

fn field(value: &Option<FinancialValue>) -> Option<f64> {
    value.as_ref().and_then(FinancialValue::as_f64)
}

/// Convert strings like `"8.71B"` or `"439.26M"` (or plain `"1,234.5"`)
/// to a float. `"N/A"` and empty strings are missing data.
pub(crate) fn parse_abbrev_number(value: &str) -> Option<f64> {
    let value = value.trim();
    if value.is_empty() || value == "N/A" {
        return None;
    }

    let multiplier = match value.chars().last()?.to_ascii_uppercase() {
        'T' => Some(1e12),
        'B' => Some(1e9),
        'M' => Some(1e6),
        'K' => Some(1e3),
        _ => None,
    };

    match multiplier {
        Some(mult) => value[..value.len() - 1].parse::<f64>().ok().map(|v| v * mult),
        None => value.replace(',', "").parse::<f64>().ok(),
    }
}

fn parse_quote_summary(
    symbol: &str,
    body: QuoteSummaryResponse,
) -> Result<FundamentalRecord, ApiError> {
    if let Some(error) = &body.quote_summary.error {
        if !error.is_null() {
            return Err(ApiError::NoData(format!("{}: {}", symbol, error)));
        }
    }

    let result = body
        .quote_summary
        .result
        .and_then(|mut r| if r.is_empty() { None } else { Some(r.remove(0)) })
        .ok_or_else(|| ApiError::NoData(symbol.to_string()))?;

    if result.summary_detail.is_none()
        && result.key_statistics.is_none()
        && result.financial_data.is_none()
    {
        return Err(ApiError::MalformedResponse(format!(
            "quote summary for {} has none of the requested modules",
            symbol
        )));
    }

    let summary = result.summary_detail.unwrap_or_default();
    let stats = result.key_statistics.unwrap_or_default();
    let financials = result.financial_data.unwrap_or_default();

    let market_cap = field(&summary.market_cap);
    let total_debt = field(&financials.total_debt);
    let total_cash = field(&financials.total_cash);

    // Derive enterprise value when the provider does not report it directly
    let enterprise_value = field(&stats.enterprise_value).or_else(|| {
        match (market_cap, total_debt, total_cash) {
            (Some(mc), Some(debt), Some(cash)) => Some(mc + debt - cash),
            _ => None,
        }
    });

    Ok(FundamentalRecord {
        as_of: Utc::now().date_naive(),
        pe_ratio: field(&summary.trailing_pe),
        pb_ratio: field(&stats.price_to_book),
        market_cap,
        enterprise_value,
        ebitda: field(&financials.ebitda),
        eps: field(&stats.trailing_eps),
        book_value: field(&stats.book_value),
        revenue: field(&financials.total_revenue),
    })
}
