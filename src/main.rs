use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use stock_metrics::api::YahooClient;
use stock_metrics::data_collector::DataCollector;
use stock_metrics::database::DatabaseManager;
use stock_metrics::models::Config;
use stock_metrics::ticker_loader::TickerLoader;

/// Collect momentum and valuation metrics for the S&P 500 / NASDAQ universe
#[derive(Parser, Debug)]
#[command(name = "stock-metrics", version)]
struct Cli {
    /// Process only the first N tickers (useful for smoke testing)
    #[arg(long)]
    limit: Option<usize>,

    /// Days of price history to fetch, overriding LOOKBACK_DAYS
    #[arg(long)]
    lookback_days: Option<i64>,

    /// Directory holding sp500.csv and nasdaq.csv, overriding DATA_DIR
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// SQLite database file, overriding DATABASE_PATH
    #[arg(long)]
    database_path: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(lookback_days) = cli.lookback_days {
        config.lookback_days = lookback_days;
    }
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(database_path) = cli.database_path {
        config.database_path = database_path;
    }

    info!("🚀 Starting stock metrics collection");

    let loader = TickerLoader::new(config.sp500_csv_path(), config.nasdaq_csv_path());
    let mut tickers = loader.load_unique_tickers()?;
    if let Some(limit) = cli.limit {
        tickers.truncate(limit);
        info!("🔢 Limiting run to the first {} tickers", tickers.len());
    }

    let database = DatabaseManager::new(&config.database_path).await?;
    let client = YahooClient::new(&config)?;
    let collector = DataCollector::new(client, database.clone(), config);

    let summary = collector.run(&tickers).await?;

    if !summary.failed.is_empty() {
        warn!(
            "⚠️  {} of {} tickers failed this run",
            summary.failed.len(),
            summary.total
        );
    }

    display_database_summary(&database).await?;
    info!("✅ Stock metrics collection completed");
    Ok(())
}

/// Log a short summary of what the database now holds, mirroring the
/// per-run report at the end of a collection.
async fn display_database_summary(database: &DatabaseManager) -> Result<()> {
    let stats = database.get_stats().await?;
    info!(
        "📊 Database: {} tickers, {} price rows, {} metric rows",
        stats.total_tickers, stats.total_price_rows, stats.total_metric_rows
    );

    let latest = database.get_latest_metrics(None).await?;
    if latest.is_empty() {
        warn!("Database holds no metric records");
        return Ok(());
    }

    let pe_values: Vec<f64> = latest.iter().filter_map(|m| m.metric.pe_ratio).collect();
    if !pe_values.is_empty() {
        let min = pe_values.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = pe_values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let avg = pe_values.iter().sum::<f64>() / pe_values.len() as f64;
        info!(
            "P/E ratios: min={:.2}, max={:.2}, avg={:.2} ({} defined)",
            min,
            max,
            avg,
            pe_values.len()
        );
    }

    let sample: Vec<&str> = latest.iter().take(10).map(|m| m.symbol.as_str()).collect();
    info!("Sample tickers: {}", sample.join(", "));
    Ok(())
}
