//! Momentum and valuation metric derivation.
//!
//! Pure functions over a ticker's price history and latest fundamental
//! snapshot. Anything undefined (unfilled window, missing or zero
//! denominator) is `None`; no metric ever comes out as NaN.

use crate::models::{Config, FundamentalRecord, MetricRecord, PriceRecord};

/// Tunable windows for the momentum metrics
#[derive(Debug, Clone)]
pub struct MetricParams {
    /// Simple moving average window, in trading days
    pub ma_window: usize,
    /// EMA span; smoothing factor is `2 / (span + 1)`
    pub ema_window: usize,
    /// Lookback for the percentage price change, in trading days
    pub momentum_lookback: usize,
}

impl Default for MetricParams {
    fn default() -> Self {
        Self {
            ma_window: 100,
            ema_window: 100,
            momentum_lookback: 20,
        }
    }
}

impl From<&Config> for MetricParams {
    fn from(config: &Config) -> Self {
        Self {
            ma_window: config.ma_window.max(1),
            ema_window: config.ema_window.max(1),
            momentum_lookback: config.momentum_lookback.max(1),
        }
    }
}

/// Compute one metric record per price row.
///
/// `prices` must be ordered by date ascending. The EMA is seeded with the
/// first close and always defined; MA and momentum stay `None` until
/// their windows fill. Valuation ratios use each date's close against the
/// latest fundamentals.
pub fn compute_metrics(
    prices: &[PriceRecord],
    fundamentals: Option<&FundamentalRecord>,
    params: &MetricParams,
) -> Vec<MetricRecord> {
    let alpha = 2.0 / (params.ema_window as f64 + 1.0);

    let mut records = Vec::with_capacity(prices.len());
    let mut window_sum = 0.0;
    let mut ema = 0.0;

    for (i, price) in prices.iter().enumerate() {
        let close = price.close;

        window_sum += close;
        if i >= params.ma_window {
            window_sum -= prices[i - params.ma_window].close;
        }
        let ma = if i + 1 >= params.ma_window {
            Some(window_sum / params.ma_window as f64)
        } else {
            None
        };

        ema = if i == 0 { close } else { ema + alpha * (close - ema) };

        let momentum = if i >= params.momentum_lookback {
            pct_change(prices[i - params.momentum_lookback].close, close)
        } else {
            None
        };

        records.push(MetricRecord {
            date: price.date,
            last_price: close,
            ma,
            ema,
            pct_above_ma: ma.and_then(|ma| pct_change(ma, close)),
            pct_above_ema: pct_change(ema, close),
            momentum,
            pe_ratio: ratio_over(close, fundamentals.and_then(|f| f.eps)),
            pb_ratio: ratio_over(close, fundamentals.and_then(|f| f.book_value)),
            ebitda_ev: ebitda_over_ev(fundamentals),
        });
    }

    records
}

/// Percentage change from `base` to `value`; undefined for a zero or
/// non-finite base.
fn pct_change(base: f64, value: f64) -> Option<f64> {
    if base == 0.0 || !base.is_finite() || !value.is_finite() {
        return None;
    }
    Some((value - base) / base * 100.0)
}

/// `value / denom`, defined only for a strictly positive denominator.
/// Negative earnings or book value make the ratio meaningless.
fn ratio_over(value: f64, denom: Option<f64>) -> Option<f64> {
    match denom {
        Some(d) if d > 0.0 && d.is_finite() && value.is_finite() => Some(value / d),
        _ => None,
    }
}

/// EBITDA divided by enterprise value; undefined when either side is
/// missing or EV is zero.
fn ebitda_over_ev(fundamentals: Option<&FundamentalRecord>) -> Option<f64> {
    let f = fundamentals?;
    match (f.ebitda, f.enterprise_value) {
        (Some(ebitda), Some(ev)) if ev != 0.0 && ev.is_finite() && ebitda.is_finite() => {
            Some(ebitda / ev)
        }
        _ => None,
    }
}
