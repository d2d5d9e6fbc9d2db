use anyhow::Result;
use chrono::NaiveDate;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::models::{Exchange, FundamentalRecord, MetricRecord, PriceRecord, Ticker};

/// Latest derived metrics for one ticker, as returned by
/// [`DatabaseManager::get_latest_metrics`].
#[derive(Debug, Clone)]
pub struct LatestMetrics {
    pub symbol: String,
    pub metric: MetricRecord,
}

/// Row counts and run bookkeeping for the summary display
#[derive(Debug, Clone)]
pub struct DatabaseStats {
    pub total_tickers: i64,
    pub total_price_rows: i64,
    pub total_metric_rows: i64,
    pub last_run_date: Option<NaiveDate>,
}

/// SQLite-backed persistence for raw and derived records.
///
/// Every write is an upsert keyed by ticker and date, so re-running the
/// pipeline for the same ticker/date overwrites rather than duplicates.
#[derive(Clone)]
pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    pub async fn new(database_path: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect_with(
                SqliteConnectOptions::new()
                    .filename(database_path)
                    .create_if_missing(true),
            )
            .await?;

        sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
        sqlx::query("PRAGMA synchronous = NORMAL").execute(&pool).await?;

        let db = Self { pool };
        db.run_migrations().await?;
        info!("Database initialized at {}", database_path);
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tickers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT UNIQUE NOT NULL,
                exchange TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS daily_prices (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ticker_id INTEGER NOT NULL,
                date DATE NOT NULL,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                volume INTEGER,
                FOREIGN KEY (ticker_id) REFERENCES tickers(id),
                UNIQUE(ticker_id, date)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS fundamentals (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ticker_id INTEGER NOT NULL,
                as_of DATE NOT NULL,
                pe_ratio REAL,
                pb_ratio REAL,
                market_cap REAL,
                enterprise_value REAL,
                ebitda REAL,
                eps REAL,
                book_value REAL,
                revenue REAL,
                FOREIGN KEY (ticker_id) REFERENCES tickers(id),
                UNIQUE(ticker_id, as_of)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS stock_metrics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ticker_id INTEGER NOT NULL,
                date DATE NOT NULL,
                last_price REAL NOT NULL,
                ma REAL,
                ema REAL NOT NULL,
                pct_above_ma REAL,
                pct_above_ema REAL,
                momentum REAL,
                pe_ratio REAL,
                pb_ratio REAL,
                ebitda_ev REAL,
                computed_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (ticker_id) REFERENCES tickers(id),
                UNIQUE(ticker_id, date)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_daily_prices_ticker_date ON daily_prices(ticker_id, date)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_stock_metrics_ticker_date ON stock_metrics(ticker_id, date)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Register a ticker, returning its row id. The symbol is created
    /// once; re-registering an existing symbol keeps the original
    /// exchange tag (tickers are immutable after load).
    pub async fn upsert_ticker(&self, ticker: &Ticker) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO tickers (symbol, exchange)
            VALUES (?, ?)
            ON CONFLICT(symbol) DO UPDATE SET symbol = excluded.symbol
            RETURNING id
            "#,
        )
        .bind(&ticker.symbol)
        .bind(ticker.exchange.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<i64, _>("id"))
    }

    pub async fn get_tickers(&self) -> Result<Vec<Ticker>> {
        let rows = sqlx::query("SELECT id, symbol, exchange FROM tickers ORDER BY symbol")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|r| Ticker {
                id: Some(r.get::<i64, _>("id")),
                symbol: r.get::<String, _>("symbol"),
                exchange: Exchange::from_tag(&r.get::<String, _>("exchange")),
            })
            .collect())
    }

    pub async fn insert_daily_price(&self, ticker_id: i64, price: &PriceRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO daily_prices (ticker_id, date, open, high, low, close, volume)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(ticker_id, date) DO UPDATE SET
                open = excluded.open,
                high = excluded.high,
                low = excluded.low,
                close = excluded.close,
                volume = excluded.volume
            "#,
        )
        .bind(ticker_id)
        .bind(price.date)
        .bind(price.open)
        .bind(price.high)
        .bind(price.low)
        .bind(price.close)
        .bind(price.volume)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn upsert_fundamentals(
        &self,
        ticker_id: i64,
        record: &FundamentalRecord,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO fundamentals (
                ticker_id, as_of, pe_ratio, pb_ratio, market_cap,
                enterprise_value, ebitda, eps, book_value, revenue
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(ticker_id, as_of) DO UPDATE SET
                pe_ratio = excluded.pe_ratio,
                pb_ratio = excluded.pb_ratio,
                market_cap = excluded.market_cap,
                enterprise_value = excluded.enterprise_value,
                ebitda = excluded.ebitda,
                eps = excluded.eps,
                book_value = excluded.book_value,
                revenue = excluded.revenue
            "#,
        )
        .bind(ticker_id)
        .bind(record.as_of)
        .bind(record.pe_ratio)
        .bind(record.pb_ratio)
        .bind(record.market_cap)
        .bind(record.enterprise_value)
        .bind(record.ebitda)
        .bind(record.eps)
        .bind(record.book_value)
        .bind(record.revenue)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn upsert_metric(&self, ticker_id: i64, metric: &MetricRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO stock_metrics (
                ticker_id, date, last_price, ma, ema, pct_above_ma,
                pct_above_ema, momentum, pe_ratio, pb_ratio, ebitda_ev
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(ticker_id, date) DO UPDATE SET
                last_price = excluded.last_price,
                ma = excluded.ma,
                ema = excluded.ema,
                pct_above_ma = excluded.pct_above_ma,
                pct_above_ema = excluded.pct_above_ema,
                momentum = excluded.momentum,
                pe_ratio = excluded.pe_ratio,
                pb_ratio = excluded.pb_ratio,
                ebitda_ev = excluded.ebitda_ev,
                computed_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(ticker_id)
        .bind(metric.date)
        .bind(metric.last_price)
        .bind(metric.ma)
        .bind(metric.ema)
        .bind(metric.pct_above_ma)
        .bind(metric.pct_above_ema)
        .bind(metric.momentum)
        .bind(metric.pe_ratio)
        .bind(metric.pb_ratio)
        .bind(metric.ebitda_ev)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Most recent fundamental snapshot for one ticker
    pub async fn get_latest_fundamentals(
        &self,
        ticker_id: i64,
    ) -> Result<Option<FundamentalRecord>> {
        let row = sqlx::query(
            r#"
            SELECT as_of, pe_ratio, pb_ratio, market_cap, enterprise_value,
                   ebitda, eps, book_value, revenue
            FROM fundamentals
            WHERE ticker_id = ?
            ORDER BY as_of DESC
            LIMIT 1
            "#,
        )
        .bind(ticker_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| FundamentalRecord {
            as_of: r.get::<NaiveDate, _>("as_of"),
            pe_ratio: r.get::<Option<f64>, _>("pe_ratio"),
            pb_ratio: r.get::<Option<f64>, _>("pb_ratio"),
            market_cap: r.get::<Option<f64>, _>("market_cap"),
            enterprise_value: r.get::<Option<f64>, _>("enterprise_value"),
            ebitda: r.get::<Option<f64>, _>("ebitda"),
            eps: r.get::<Option<f64>, _>("eps"),
            book_value: r.get::<Option<f64>, _>("book_value"),
            revenue: r.get::<Option<f64>, _>("revenue"),
        }))
    }

    /// Price history for one ticker, ordered by date ascending
    pub async fn get_price_history(&self, ticker_id: i64) -> Result<Vec<PriceRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT date, open, high, low, close, volume
            FROM daily_prices
            WHERE ticker_id = ?
            ORDER BY date
            "#,
        )
        .bind(ticker_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| PriceRecord {
                date: r.get::<NaiveDate, _>("date"),
                open: r.get::<f64, _>("open"),
                high: r.get::<f64, _>("high"),
                low: r.get::<f64, _>("low"),
                close: r.get::<f64, _>("close"),
                volume: r.get::<Option<i64>, _>("volume"),
            })
            .collect())
    }

    /// The most recent metric row per ticker, optionally filtered to one
    /// symbol, ordered by symbol.
    pub async fn get_latest_metrics(&self, symbol: Option<&str>) -> Result<Vec<LatestMetrics>> {
        let sql = r#"
            SELECT t.symbol, m.date, m.last_price, m.ma, m.ema, m.pct_above_ma,
                   m.pct_above_ema, m.momentum, m.pe_ratio, m.pb_ratio, m.ebitda_ev
            FROM stock_metrics m
            JOIN tickers t ON t.id = m.ticker_id
            JOIN (
                SELECT ticker_id, MAX(date) AS max_date
                FROM stock_metrics
                GROUP BY ticker_id
            ) latest ON latest.ticker_id = m.ticker_id AND latest.max_date = m.date
            WHERE (?1 IS NULL OR t.symbol = ?1)
            ORDER BY t.symbol
            "#;

        let rows = sqlx::query(sql).bind(symbol).fetch_all(&self.pool).await?;

        Ok(rows
            .into_iter()
            .map(|r| LatestMetrics {
                symbol: r.get::<String, _>("symbol"),
                metric: MetricRecord {
                    date: r.get::<NaiveDate, _>("date"),
                    last_price: r.get::<f64, _>("last_price"),
                    ma: r.get::<Option<f64>, _>("ma"),
                    ema: r.get::<f64, _>("ema"),
                    pct_above_ma: r.get::<Option<f64>, _>("pct_above_ma"),
                    pct_above_ema: r.get::<Option<f64>, _>("pct_above_ema"),
                    momentum: r.get::<Option<f64>, _>("momentum"),
                    pe_ratio: r.get::<Option<f64>, _>("pe_ratio"),
                    pb_ratio: r.get::<Option<f64>, _>("pb_ratio"),
                    ebitda_ev: r.get::<Option<f64>, _>("ebitda_ev"),
                },
            })
            .collect())
    }

    pub async fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM metadata WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    pub async fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO metadata (key, value, updated_at)
            VALUES (?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_stats(&self) -> Result<DatabaseStats> {
        let total_tickers =
            sqlx::query("SELECT COUNT(*) AS n FROM tickers")
                .fetch_one(&self.pool)
                .await?
                .get::<i64, _>("n");
        let total_price_rows =
            sqlx::query("SELECT COUNT(*) AS n FROM daily_prices")
                .fetch_one(&self.pool)
                .await?
                .get::<i64, _>("n");
        let total_metric_rows =
            sqlx::query("SELECT COUNT(*) AS n FROM stock_metrics")
                .fetch_one(&self.pool)
                .await?
                .get::<i64, _>("n");

        let last_run_date = match self.get_metadata("last_run_date").await? {
            Some(value) => Some(NaiveDate::parse_from_str(&value, "%Y-%m-%d")?),
            None => None,
        };

        Ok(DatabaseStats {
            total_tickers,
            total_price_rows,
            total_metric_rows,
            last_run_date,
        })
    }
}
