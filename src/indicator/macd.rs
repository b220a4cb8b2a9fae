use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::ma::Ema;
use crate::indicator::{Column, Indicator, close_prices};
use crate::model::Bar;

pub struct Macd {
    fast: Ema,
    slow: Ema,
    signal: Ema,
    slow_period: usize,
}

/// MACD line, signal line and histogram, aligned with the input.
pub struct MacdLines {
    pub macd: Vec<Option<f64>>,
    pub signal: Vec<Option<f64>>,
    pub histogram: Vec<Option<f64>>,
}

impl Macd {
    pub fn new(
        fast_period: usize,
        slow_period: usize,
        signal_period: usize,
    ) -> Result<Self, Report<IndicatorError>> {
        if fast_period == 0 || slow_period == 0 || signal_period == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "all periods must be > 0".into(),
            });
        }
        if fast_period >= slow_period {
            bail!(IndicatorError::InvalidParameter {
                name: "fast_period must be < slow_period".into(),
            });
        }
        Ok(Self {
            fast: Ema::new(fast_period)?,
            slow: Ema::new(slow_period)?,
            signal: Ema::new(signal_period)?,
            slow_period,
        })
    }

    pub fn calculate_lines(&self, prices: &[f64]) -> MacdLines {
        let fast = self.fast.calculate_prices(prices);
        let slow = self.slow.calculate_prices(prices);

        let macd: Vec<Option<f64>> = fast
            .iter()
            .zip(&slow)
            .map(|(f, s)| Some((*f)? - (*s)?))
            .collect();
        let signal = self.signal.calculate_values(&macd);
        let histogram = macd
            .iter()
            .zip(&signal)
            .map(|(m, s)| Some((*m)? - (*s)?))
            .collect();

        MacdLines {
            macd,
            signal,
            histogram,
        }
    }
}

impl Indicator for Macd {
    fn name(&self) -> String {
        "MACD".into()
    }

    fn required_bars(&self) -> usize {
        self.slow_period
    }

    fn calculate(&self, bars: &[Bar]) -> Vec<Column> {
        let lines = self.calculate_lines(&close_prices(bars));
        vec![
            ("MACD".into(), lines.macd),
            ("MACD_SIGNAL".into(), lines.signal),
            ("MACD_HIST".into(), lines.histogram),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::testing::{bars_from_closes, wavy_closes};

    #[test]
    fn macd_invalid_fast_ge_slow() {
        assert!(Macd::new(26, 12, 9).is_err());
        assert!(Macd::new(12, 12, 9).is_err());
    }

    #[test]
    fn macd_period_zero_invalid() {
        assert!(Macd::new(0, 26, 9).is_err());
    }

    #[test]
    fn macd_flat_prices_returns_zero() {
        let macd = Macd::new(3, 5, 3).unwrap();
        let columns = macd.calculate(&bars_from_closes(&[10.0_f64; 10]));
        for (_, values) in &columns {
            for v in values {
                assert_eq!(*v, Some(0.0));
            }
        }
    }

    #[test]
    fn macd_output_is_aligned() {
        let macd = Macd::new(12, 26, 9).unwrap();
        let columns = macd.calculate(&bars_from_closes(&wavy_closes(40)));
        let names: Vec<&str> = columns.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["MACD", "MACD_SIGNAL", "MACD_HIST"]);
        assert!(columns.iter().all(|(_, v)| v.len() == 40));
    }

    #[test]
    fn histogram_is_exact_difference() {
        let lines = Macd::new(12, 26, 9).unwrap().calculate_lines(&wavy_closes(150));
        for i in 0..150 {
            let (m, s, h) = (lines.macd[i], lines.signal[i], lines.histogram[i]);
            if let (Some(m), Some(s)) = (m, s) {
                assert_eq!(h, Some(m - s));
            }
        }
    }

    #[test]
    fn macd_positive_in_uptrend() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let lines = Macd::new(12, 26, 9).unwrap().calculate_lines(&closes);
        assert!(lines.macd[59].unwrap() > 0.0);
    }
}
