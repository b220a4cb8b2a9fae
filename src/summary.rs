use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::indicator::volume::VolumeMA;
use crate::model::{Interval, Series};

const SURGE_WINDOW: usize = 20;
const SURGE_MULTIPLIER: f64 = 2.0;
const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Scalar readings of one series, as shown in a dashboard header.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub symbol: String,
    pub provenance: String,
    pub synthetic: bool,
    pub stale: bool,
    pub bars: usize,
    pub as_of: Option<DateTime<Utc>>,
    pub last_close: Option<f64>,
    /// Last close minus the first close of the range.
    pub change: Option<f64>,
    pub change_pct: Option<f64>,
    pub range_high: Option<f64>,
    pub range_low: Option<f64>,
    /// Annualized standard deviation of log returns.
    pub realized_volatility: Option<f64>,
    /// Last bar traded more than twice its 20-bar volume average.
    pub volume_surge: bool,
}

pub fn summarize(series: &Series) -> Summary {
    let bars = series.bars();
    let closes: Vec<f64> = series
        .closes()
        .into_iter()
        .filter(|c| c.is_finite())
        .collect();
    let first = closes.first().copied();
    let last = closes.last().copied();

    let change = first.zip(last).map(|(f, l)| l - f);
    let change_pct = first
        .zip(last)
        .filter(|(f, _)| *f != 0.0)
        .map(|(f, l)| (l / f - 1.0) * 100.0);

    let range_high = bars
        .iter()
        .map(|b| b.high)
        .filter(|h| h.is_finite())
        .reduce(f64::max);
    let range_low = bars
        .iter()
        .map(|b| b.low)
        .filter(|l| l.is_finite())
        .reduce(f64::min);

    let volume_surge = VolumeMA::new(SURGE_WINDOW)
        .ok()
        .and_then(|vma| vma.detect_surges(bars, SURGE_MULTIPLIER).last().copied())
        .unwrap_or(false);

    Summary {
        symbol: series.symbol().to_owned(),
        provenance: series.provenance().to_string(),
        synthetic: series.is_synthetic(),
        stale: series.is_stale(),
        bars: series.len(),
        as_of: series.last().map(|b| b.timestamp),
        last_close: last,
        change,
        change_pct,
        range_high,
        range_low,
        realized_volatility: realized_volatility(&closes, series.interval()),
        volume_surge,
    }
}

/// Bars per year for annualization. Intraday bars assume round-the-clock
/// sessions, which fits futures and crypto better than cash equities.
fn periods_per_year(interval: Interval) -> f64 {
    match interval {
        Interval::Day1 => TRADING_DAYS_PER_YEAR,
        Interval::Day5 | Interval::Week1 => 52.0,
        Interval::Month1 => 12.0,
        intraday => {
            let per_day = Duration::days(1).num_seconds() as f64
                / intraday.duration().num_seconds() as f64;
            TRADING_DAYS_PER_YEAR * per_day
        }
    }
}

/// Annualized sample standard deviation of log returns. `None` with fewer
/// than two returns.
pub fn realized_volatility(closes: &[f64], interval: Interval) -> Option<f64> {
    let returns: Vec<f64> = closes
        .windows(2)
        .filter(|w| w[0] > 0.0 && w[1] > 0.0)
        .map(|w| (w[1] / w[0]).ln())
        .collect();
    if returns.len() < 2 {
        return None;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some((variance * periods_per_year(interval)).sqrt())
}
