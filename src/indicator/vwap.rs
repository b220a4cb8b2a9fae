use crate::indicator::{Column, Indicator};
use crate::model::Bar;

/// Volume-weighted average price, cumulative from the first loaded bar.
///
/// There is no session reset: the average restarts only when the caller loads
/// a different window of bars.
pub struct Vwap;

impl Vwap {
    pub fn calculate_values(&self, bars: &[Bar]) -> Vec<Option<f64>> {
        let mut cum_pv = 0.0;
        let mut cum_volume = 0.0;
        bars.iter()
            .map(|bar| {
                let typical = bar.typical_price();
                if !typical.is_finite() || !bar.volume.is_finite() {
                    return None;
                }
                cum_pv += typical * bar.volume;
                cum_volume += bar.volume;
                (cum_volume > 0.0).then(|| cum_pv / cum_volume)
            })
            .collect()
    }
}

impl Indicator for Vwap {
    fn name(&self) -> String {
        "VWAP".into()
    }

    fn required_bars(&self) -> usize {
        1
    }

    fn calculate(&self, bars: &[Bar]) -> Vec<Column> {
        vec![(self.name(), self.calculate_values(bars))]
    }
}
