use anyhow::{Context, Result, bail};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::models::{Exchange, Ticker};

/// Header names that may hold the symbol column, tried in order.
const SYMBOL_COLUMNS: &[&str] = &["Symbol", "Ticker", "symbol", "ticker"];

/// Loads the tracked universe from the S&P 500 and NASDAQ constituent CSVs.
pub struct TickerLoader {
    sp500_path: PathBuf,
    nasdaq_path: PathBuf,
}

impl TickerLoader {
    pub fn new(sp500_path: PathBuf, nasdaq_path: PathBuf) -> Self {
        Self {
            sp500_path,
            nasdaq_path,
        }
    }

    /// Load both lists, normalize, and deduplicate across the combined
    /// universe. The S&P 500 file is loaded first, so an overlapping
    /// symbol keeps its S&P 500 tag. Malformed rows are skipped and
    /// logged; a missing file is fatal.
    pub fn load_unique_tickers(&self) -> Result<Vec<Ticker>> {
        let mut seen = HashSet::new();
        let mut tickers = Vec::new();

        let sp500_count =
            self.load_file(&self.sp500_path, Exchange::Sp500, &mut seen, &mut tickers)?;
        let nasdaq_count =
            self.load_file(&self.nasdaq_path, Exchange::Nasdaq, &mut seen, &mut tickers)?;

        if tickers.is_empty() {
            bail!("no valid ticker symbols found in either input file");
        }

        info!(
            "Loaded {} unique tickers ({} from S&P 500, {} from NASDAQ)",
            tickers.len(),
            sp500_count,
            nasdaq_count
        );
        Ok(tickers)
    }

    /// Read one constituent file, appending new symbols to `tickers`.
    /// Returns how many rows in this file carried a usable symbol
    /// (including ones already seen in an earlier file).
    fn load_file(
        &self,
        path: &Path,
        exchange: Exchange,
        seen: &mut HashSet<String>,
        tickers: &mut Vec<Ticker>,
    ) -> Result<usize> {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("failed to open ticker list {}", path.display()))?;

        let headers = reader.headers()?.clone();
        let column = SYMBOL_COLUMNS
            .iter()
            .find_map(|name| headers.iter().position(|h| h == *name));

        let Some(column) = column else {
            warn!(
                "No symbol column found in {} (available columns: {:?})",
                path.display(),
                headers.iter().collect::<Vec<_>>()
            );
            return Ok(0);
        };

        let mut loaded = 0;
        for (row, result) in reader.records().enumerate() {
            let record = match result {
                Ok(record) => record,
                Err(e) => {
                    warn!("Skipping unreadable row {} in {}: {}", row + 1, path.display(), e);
                    continue;
                }
            };

            let raw = record.get(column).unwrap_or("");
            let symbol = raw.trim().to_uppercase();
            if !is_valid_symbol(&symbol) {
                warn!(
                    "Skipping malformed symbol {:?} at row {} in {}",
                    raw,
                    row + 1,
                    path.display()
                );
                continue;
            }

            loaded += 1;
            if seen.insert(symbol.clone()) {
                tickers.push(Ticker {
                    id: None,
                    symbol,
                    exchange,
                });
            }
        }

        Ok(loaded)
    }
}

/// A symbol is well-formed when, ignoring `.` and `-` class/share
/// separators (BRK.B, BF-B), it is non-empty ASCII alphanumeric.
fn is_valid_symbol(symbol: &str) -> bool {
    let mut stripped = symbol.chars().filter(|c| *c != '.' && *c != '-');
    let mut any = false;
    for c in &mut stripped {
        if !c.is_ascii_alphanumeric() {
            return false;
        }
        any = true;
    }
    any
}
