use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::{Column, Indicator, close_prices, ema_over, rolling_mean};
use crate::model::Bar;

/// Simple Moving Average of close.
pub struct Sma {
    period: usize,
}

impl Sma {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        if period == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "period must be > 0".into(),
            });
        }
        Ok(Self { period })
    }

    /// Calculate SMA values from a price slice (internal helper).
    pub fn calculate_prices(&self, prices: &[f64]) -> Vec<Option<f64>> {
        rolling_mean(prices, self.period)
    }
}

impl Indicator for Sma {
    fn name(&self) -> String {
        format!("SMA{}", self.period)
    }

    fn required_bars(&self) -> usize {
        self.period
    }

    fn calculate(&self, bars: &[Bar]) -> Vec<Column> {
        vec![(self.name(), self.calculate_prices(&close_prices(bars)))]
    }
}

/// Exponential Moving Average of close.
pub struct Ema {
    span: usize,
}

impl Ema {
    pub fn new(span: usize) -> Result<Self, Report<IndicatorError>> {
        if span == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "span must be > 0".into(),
            });
        }
        Ok(Self { span })
    }

    /// Calculate EMA values from a price slice (internal helper).
    ///
    /// Seeded with the first finite price, so the output is defined from that
    /// bar onward.
    pub fn calculate_prices(&self, prices: &[f64]) -> Vec<Option<f64>> {
        ema_over(prices.iter().map(|&p| Some(p)), self.span)
    }

    /// EMA of an already-derived series with gaps.
    pub fn calculate_values(&self, values: &[Option<f64>]) -> Vec<Option<f64>> {
        ema_over(values.iter().copied(), self.span)
    }
}

impl Indicator for Ema {
    fn name(&self) -> String {
        format!("EMA{}", self.span)
    }

    fn required_bars(&self) -> usize {
        1
    }

    fn calculate(&self, bars: &[Bar]) -> Vec<Column> {
        vec![(self.name(), self.calculate_prices(&close_prices(bars)))]
    }
}
