use std::sync::Arc;

use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::{Column, Indicator};
use crate::model::{Bar, Series};

/// Rolling Pearson correlation between the period returns of the primary
/// instrument and those of a peer series.
///
/// The peer's closes are forward-filled onto the primary timestamps before
/// returns are taken, so markets with different trading hours still line up.
pub struct RollingCorrelation {
    label: String,
    peer: Arc<Series>,
    window: usize,
}

impl RollingCorrelation {
    pub fn new(
        label: &str,
        peer: Arc<Series>,
        window: usize,
    ) -> Result<Self, Report<IndicatorError>> {
        if window < 2 {
            bail!(IndicatorError::InvalidParameter {
                name: "correlation window must be >= 2".into(),
            });
        }
        let label: String = label
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .map(|c| c.to_ascii_uppercase())
            .collect();
        if label.is_empty() {
            bail!(IndicatorError::InvalidParameter {
                name: "correlation label must contain alphanumerics".into(),
            });
        }
        Ok(Self {
            label,
            peer,
            window,
        })
    }

    pub fn calculate_values(&self, bars: &[Bar]) -> Vec<Option<f64>> {
        let primary: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let aligned = forward_fill(bars, self.peer.bars());
        let pairs: Vec<Option<(f64, f64)>> = pct_returns(&primary)
            .into_iter()
            .zip(pct_returns_opt(&aligned))
            .map(|(a, b)| Some((a?, b?)))
            .collect();

        let mut out = vec![None; bars.len()];
        if pairs.len() < self.window {
            return out;
        }
        for (i, window) in pairs.windows(self.window).enumerate() {
            let Some(window) = window.iter().copied().collect::<Option<Vec<_>>>() else {
                continue;
            };
            out[i + self.window - 1] = pearson(&window);
        }
        out
    }
}

impl Indicator for RollingCorrelation {
    fn name(&self) -> String {
        format!("CORR_{}_{}", self.label, self.window)
    }

    fn required_bars(&self) -> usize {
        self.window + 1
    }

    fn calculate(&self, bars: &[Bar]) -> Vec<Column> {
        vec![(self.name(), self.calculate_values(bars))]
    }
}

/// Peer close at or before each primary timestamp, skipping missing closes.
fn forward_fill(primary: &[Bar], peer: &[Bar]) -> Vec<Option<f64>> {
    let mut j = 0;
    let mut last: Option<f64> = None;
    primary
        .iter()
        .map(|bar| {
            while j < peer.len() && peer[j].timestamp <= bar.timestamp {
                if peer[j].close.is_finite() {
                    last = Some(peer[j].close);
                }
                j += 1;
            }
            last
        })
        .collect()
}

fn pct_returns(values: &[f64]) -> Vec<Option<f64>> {
    let values: Vec<Option<f64>> = values.iter().map(|&v| Some(v)).collect();
    pct_returns_opt(&values)
}

/// `v[i] / v[i - 1] - 1`; undefined at index 0 and wherever an input is
/// missing, non-finite or the previous value is zero.
fn pct_returns_opt(values: &[Option<f64>]) -> Vec<Option<f64>> {
    std::iter::once(None)
        .chain(values.windows(2).map(|w| {
            let (prev, cur) = (w[0]?, w[1]?);
            let r = cur / prev - 1.0;
            (prev != 0.0 && r.is_finite()).then_some(r)
        }))
        .take(values.len())
        .collect()
}

fn pearson(pairs: &[(f64, f64)]) -> Option<f64> {
    let n = pairs.len() as f64;
    let mean_a = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_b = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for &(a, b) in pairs {
        let (da, db) = (a - mean_a, b - mean_b);
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    if var_a == 0.0 || var_b == 0.0 {
        return None;
    }
    Some((cov / (var_a * var_b).sqrt()).clamp(-1.0, 1.0))
}
