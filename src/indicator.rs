pub mod atr;
pub mod bollinger;
pub mod correlation;
pub mod ma;
pub mod macd;
pub mod rsi;
pub mod volume;
pub mod vwap;
pub mod zscore;

use crate::model::Bar;

/// One named output column, aligned index-for-index with the input bars.
pub type Column = (String, Vec<Option<f64>>);

/// A technical analysis indicator over a slice of bars.
///
/// Bars must be in ascending chronological order (oldest first). Every output
/// column has exactly `bars.len()` entries; positions inside the warm-up
/// window, or touching a missing input value, are `None`. Implementations
/// never fail on short or empty input.
pub trait Indicator: Send + Sync {
    /// Bundle key of the primary output column (e.g. `"RSI14"`).
    fn name(&self) -> String;

    /// Number of bars needed before the first defined value.
    fn required_bars(&self) -> usize;

    /// Calculate every output column of this indicator.
    fn calculate(&self, bars: &[Bar]) -> Vec<Column>;
}

/// Extract close prices from a slice of bars.
pub fn close_prices(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}

/// Extract volumes from a slice of bars.
pub fn volumes(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.volume).collect()
}

/// Trailing arithmetic mean over `window` values, `None` until the window is
/// full or while it holds a non-finite value.
pub(crate) fn rolling_mean(values: &[f64], window: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if window == 0 || values.len() < window {
        return out;
    }
    for (i, w) in values.windows(window).enumerate() {
        if w.iter().all(|v| v.is_finite()) {
            out[i + window - 1] = Some(w.iter().sum::<f64>() / window as f64);
        }
    }
    out
}

/// Trailing sample standard deviation (`n - 1` denominator).
///
/// Deviations are taken from the first value of each window, so a constant
/// window yields exactly zero whatever its price.
pub(crate) fn rolling_std(values: &[f64], window: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if window < 2 || values.len() < window {
        return out;
    }
    let n = window as f64;
    for (i, w) in values.windows(window).enumerate() {
        if !w.iter().all(|v| v.is_finite()) {
            continue;
        }
        let shift = w[0];
        let mean = w.iter().map(|&v| v - shift).sum::<f64>() / n;
        let variance = w
            .iter()
            .map(|&v| (v - shift - mean).powi(2))
            .sum::<f64>()
            / (n - 1.0);
        out[i + window - 1] = Some(variance.sqrt());
    }
    out
}

/// Exponentially weighted mean with `alpha = 2 / (span + 1)`, seeded with the
/// first defined value. Missing inputs yield `None` and leave the state as is.
pub(crate) fn ema_over<I>(values: I, span: usize) -> Vec<Option<f64>>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut state: Option<f64> = None;
    values
        .into_iter()
        .map(|value| {
            let value = value.filter(|v| v.is_finite())?;
            let next = match state {
                None => value,
                Some(prev) => alpha * value + (1.0 - alpha) * prev,
            };
            state = Some(next);
            Some(next)
        })
        .collect()
}
