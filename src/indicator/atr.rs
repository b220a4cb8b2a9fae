use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::{Column, Indicator, rolling_mean};
use crate::model::Bar;

/// Average True Range: rolling mean of the true range.
pub struct Atr {
    period: usize,
}

impl Atr {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        if period == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "period must be > 0".into(),
            });
        }
        Ok(Self { period })
    }
}

/// `max(high - low, |high - prev_close|, |low - prev_close|)`; the first bar
/// has no previous close and uses `high - low`.
pub fn true_range(bars: &[Bar]) -> Vec<f64> {
    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            let range = bar.high - bar.low;
            match i.checked_sub(1).map(|p| bars[p].close) {
                Some(prev) if prev.is_finite() => range
                    .max((bar.high - prev).abs())
                    .max((bar.low - prev).abs()),
                _ => range,
            }
        })
        .collect()
}

impl Indicator for Atr {
    fn name(&self) -> String {
        format!("ATR{}", self.period)
    }

    fn required_bars(&self) -> usize {
        self.period
    }

    fn calculate(&self, bars: &[Bar]) -> Vec<Column> {
        vec![(self.name(), rolling_mean(&true_range(bars), self.period))]
    }
}
