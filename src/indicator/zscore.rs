use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::{Column, Indicator, close_prices, rolling_mean, rolling_std};
use crate::model::Bar;

/// Distance of close from its rolling mean, in sample standard deviations.
pub struct ZScore {
    period: usize,
}

impl ZScore {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        if period < 2 {
            bail!(IndicatorError::InvalidParameter {
                name: "period must be >= 2".into(),
            });
        }
        Ok(Self { period })
    }

    pub fn calculate_prices(&self, prices: &[f64]) -> Vec<Option<f64>> {
        let mean = rolling_mean(prices, self.period);
        let std_dev = rolling_std(prices, self.period);
        prices
            .iter()
            .zip(mean.iter().zip(&std_dev))
            .map(|(&price, (m, s))| {
                let (m, s) = ((*m)?, (*s)?);
                (s != 0.0).then(|| (price - m) / s)
            })
            .collect()
    }
}

impl Indicator for ZScore {
    fn name(&self) -> String {
        format!("ZSCORE{}", self.period)
    }

    fn required_bars(&self) -> usize {
        self.period
    }

    fn calculate(&self, bars: &[Bar]) -> Vec<Column> {
        vec![(self.name(), self.calculate_prices(&close_prices(bars)))]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zscore_period_too_small_invalid() {
        assert!(ZScore::new(1).is_err());
    }

    #[test]
    fn zscore_known_value() {
        // window [1, 2, 3]: mean 2, sample stddev 1 -> (3 - 2) / 1
        let values = ZScore::new(3).unwrap().calculate_prices(&[1.0, 2.0, 3.0]);
        assert_eq!(values, vec![None, None, Some(1.0)]);
    }

    #[test]
    fn zscore_undefined_for_zero_deviation() {
        let values = ZScore::new(3).unwrap().calculate_prices(&[5.0; 6]);
        assert!(values.iter().all(Option::is_none));
    }

    #[test]
    fn zscore_undefined_for_flat_fractional_prices() {
        let zscore = ZScore::new(20).unwrap();
        for price in [4.187, 0.1] {
            let values = zscore.calculate_prices(&[price; 25]);
            assert!(values.iter().all(Option::is_none), "{price}");
        }
    }

    #[test]
    fn zscore_sign_follows_price() {
        let values = ZScore::new(3).unwrap().calculate_prices(&[3.0, 2.0, 1.0]);
        assert_eq!(values[2], Some(-1.0));
    }
}
