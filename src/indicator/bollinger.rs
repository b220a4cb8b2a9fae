use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::{Column, Indicator, close_prices, rolling_mean, rolling_std};
use crate::model::Bar;

pub struct BollingerBands {
    period: usize,
    std_dev_multiplier: f64,
}

/// Upper, middle and lower band columns.
pub struct Bands {
    pub upper: Vec<Option<f64>>,
    pub middle: Vec<Option<f64>>,
    pub lower: Vec<Option<f64>>,
}

impl BollingerBands {
    pub fn new(period: usize, std_dev_multiplier: f64) -> Result<Self, Report<IndicatorError>> {
        if period < 2 {
            bail!(IndicatorError::InvalidParameter {
                name: "period must be >= 2".into(),
            });
        }
        if std_dev_multiplier.is_nan() || std_dev_multiplier <= 0.0 {
            bail!(IndicatorError::InvalidParameter {
                name: "std_dev_multiplier must be > 0".into(),
            });
        }
        Ok(Self {
            period,
            std_dev_multiplier,
        })
    }

    /// `middle ± k * σ` where `σ` is the sample standard deviation of close.
    pub fn calculate_bands(&self, prices: &[f64]) -> Bands {
        let middle = rolling_mean(prices, self.period);
        let std_dev = rolling_std(prices, self.period);

        let (upper, lower) = middle
            .iter()
            .zip(&std_dev)
            .map(|(m, s)| match (m, s) {
                (Some(m), Some(s)) => (
                    Some(m + self.std_dev_multiplier * s),
                    Some(m - self.std_dev_multiplier * s),
                ),
                _ => (None, None),
            })
            .unzip();

        Bands {
            upper,
            middle,
            lower,
        }
    }
}

impl Indicator for BollingerBands {
    fn name(&self) -> String {
        "BB_MIDDLE".into()
    }

    fn required_bars(&self) -> usize {
        self.period
    }

    fn calculate(&self, bars: &[Bar]) -> Vec<Column> {
        let bands = self.calculate_bands(&close_prices(bars));
        vec![
            ("BB_UPPER".into(), bands.upper),
            ("BB_MIDDLE".into(), bands.middle),
            ("BB_LOWER".into(), bands.lower),
        ]
    }
}
