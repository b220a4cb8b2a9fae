use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::{Column, Indicator, rolling_mean, volumes};
use crate::model::Bar;

/// Volume moving average: simple average of traded volume over a period.
pub struct VolumeMA {
    period: usize,
}

impl VolumeMA {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        if period == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "period must be > 0".into(),
            });
        }
        Ok(Self { period })
    }

    /// `true` for each bar whose volume exceeds `surge_multiplier` times the
    /// volume MA ending at that bar. Bars inside the warm-up are never surges.
    pub fn detect_surges(&self, bars: &[Bar], surge_multiplier: f64) -> Vec<bool> {
        let vols = volumes(bars);
        rolling_mean(&vols, self.period)
            .iter()
            .zip(&vols)
            .map(|(ma, &vol)| ma.is_some_and(|ma| vol > ma * surge_multiplier))
            .collect()
    }
}

impl Indicator for VolumeMA {
    fn name(&self) -> String {
        format!("VOL_MA{}", self.period)
    }

    fn required_bars(&self) -> usize {
        self.period
    }

    fn calculate(&self, bars: &[Bar]) -> Vec<Column> {
        vec![(self.name(), rolling_mean(&volumes(bars), self.period))]
    }
}
