use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::{Column, Indicator, close_prices};
use crate::model::Bar;

/// How average gain and loss are carried from bar to bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RsiSmoothing {
    /// Plain rolling mean over the last `period` differences.
    #[default]
    Simple,
    /// Wilder's recursive smoothing, seeded with the simple mean.
    Wilder,
}

/// Relative Strength Index.
pub struct Rsi {
    period: usize,
    smoothing: RsiSmoothing,
}

impl Rsi {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        if period == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "period must be > 0".into(),
            });
        }
        Ok(Self {
            period,
            smoothing: RsiSmoothing::Simple,
        })
    }

    pub fn with_smoothing(mut self, smoothing: RsiSmoothing) -> Self {
        self.smoothing = smoothing;
        self
    }

    /// RSI aligned with `prices`; the first defined value is at index `period`.
    pub fn calculate_prices(&self, prices: &[f64]) -> Vec<Option<f64>> {
        let deltas: Vec<Option<f64>> = std::iter::once(None)
            .chain(prices.windows(2).map(|w| {
                let d = w[1] - w[0];
                d.is_finite().then_some(d)
            }))
            .collect();

        match self.smoothing {
            RsiSmoothing::Simple => self.simple(&deltas),
            RsiSmoothing::Wilder => self.wilder(&deltas),
        }
    }

    fn simple(&self, deltas: &[Option<f64>]) -> Vec<Option<f64>> {
        let mut out = vec![None; deltas.len()];
        let period = self.period as f64;
        for i in self.period..deltas.len() {
            let window = &deltas[i + 1 - self.period..=i];
            let Some(window) = window.iter().copied().collect::<Option<Vec<f64>>>() else {
                continue;
            };
            let avg_gain = window.iter().map(|&d| d.max(0.0)).sum::<f64>() / period;
            let avg_loss = window.iter().map(|&d| (-d).max(0.0)).sum::<f64>() / period;
            out[i] = Some(rsi_value(avg_gain, avg_loss));
        }
        out
    }

    fn wilder(&self, deltas: &[Option<f64>]) -> Vec<Option<f64>> {
        let mut out = vec![None; deltas.len()];
        let period = self.period as f64;
        let (mut seed_gain, mut seed_loss, mut seen) = (0.0, 0.0, 0usize);
        let mut averages: Option<(f64, f64)> = None;

        for (i, delta) in deltas.iter().enumerate() {
            let Some(delta) = *delta else { continue };
            let gain = delta.max(0.0);
            let loss = (-delta).max(0.0);

            let next = match averages {
                Some((avg_gain, avg_loss)) => (
                    (avg_gain * (period - 1.0) + gain) / period,
                    (avg_loss * (period - 1.0) + loss) / period,
                ),
                None => {
                    seed_gain += gain;
                    seed_loss += loss;
                    seen += 1;
                    if seen < self.period {
                        continue;
                    }
                    (seed_gain / period, seed_loss / period)
                }
            };
            averages = Some(next);
            out[i] = Some(rsi_value(next.0, next.1));
        }
        out
    }
}

impl Indicator for Rsi {
    fn name(&self) -> String {
        format!("RSI{}", self.period)
    }

    fn required_bars(&self) -> usize {
        self.period + 1
    }

    fn calculate(&self, bars: &[Bar]) -> Vec<Column> {
        vec![(self.name(), self.calculate_prices(&close_prices(bars)))]
    }
}

/// `100 - 100 / (1 + gain / loss)`, saturating at 100 when there are no
/// losses. A window with neither gains nor losses reads as neutral 50.
fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return if avg_gain == 0.0 { 50.0 } else { 100.0 };
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}
