use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use error_stack::{Report, ResultExt, bail};

use crate::config::IndicatorConfig;
use crate::error::IndicatorError;
use crate::indicator::Indicator;
use crate::indicator::atr::Atr;
use crate::indicator::bollinger::BollingerBands;
use crate::indicator::correlation::RollingCorrelation;
use crate::indicator::ma::{Ema, Sma};
use crate::indicator::macd::Macd;
use crate::indicator::rsi::{Rsi, RsiSmoothing};
use crate::indicator::volume::VolumeMA;
use crate::indicator::vwap::Vwap;
use crate::indicator::zscore::ZScore;
use crate::model::Series;

/// The indicators to derive from one series.
#[derive(Default)]
pub struct IndicatorSet {
    indicators: Vec<Box<dyn Indicator>>,
}

impl IndicatorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The dashboard's default catalog.
    pub fn standard() -> Result<Self, Report<IndicatorError>> {
        Ok(Self::new()
            .with(Sma::new(20)?)
            .with(Sma::new(50)?)
            .with(Ema::new(20)?)
            .with(Rsi::new(14)?)
            .with(BollingerBands::new(20, 2.0)?)
            .with(Macd::new(12, 26, 9)?)
            .with(Atr::new(14)?)
            .with(Vwap)
            .with(ZScore::new(20)?)
            .with(VolumeMA::new(20)?))
    }

    /// Build a set from `[[dashboard.indicators]]` entries; an empty list
    /// yields the standard catalog.
    pub fn from_config(configs: &[IndicatorConfig]) -> Result<Self, Report<IndicatorError>> {
        if configs.is_empty() {
            return Self::standard();
        }
        let mut set = Self::new();
        for config in configs {
            set = set.with_boxed(build_indicator(config)?);
        }
        Ok(set)
    }

    pub fn with(self, indicator: impl Indicator + 'static) -> Self {
        self.with_boxed(Box::new(indicator))
    }

    pub fn with_boxed(mut self, indicator: Box<dyn Indicator>) -> Self {
        self.indicators.push(indicator);
        self
    }

    /// Add a rolling correlation against `peer`, keyed `CORR_<LABEL>_<window>`.
    pub fn with_correlation(
        self,
        label: &str,
        peer: Arc<Series>,
        window: usize,
    ) -> Result<Self, Report<IndicatorError>> {
        Ok(self.with(RollingCorrelation::new(label, peer, window)?))
    }

    /// Bars needed before every indicator in the set has a defined value.
    pub fn max_required_bars(&self) -> usize {
        self.indicators
            .iter()
            .map(|i| i.required_bars())
            .max()
            .unwrap_or(0)
    }

    pub fn names(&self) -> Vec<String> {
        self.indicators.iter().map(|i| i.name()).collect()
    }
}

fn build_indicator(config: &IndicatorConfig) -> Result<Box<dyn Indicator>, Report<IndicatorError>> {
    let indicator: Box<dyn Indicator> = match config.kind.as_str() {
        "sma" => Box::new(Sma::new(get_usize(config, "period", 20)?)?),
        "ema" => Box::new(Ema::new(get_usize(config, "period", 20)?)?),
        "rsi" => {
            let smoothing = match config.params.get("smoothing") {
                None => RsiSmoothing::Simple,
                Some(value) => match value.as_str() {
                    Some("simple") => RsiSmoothing::Simple,
                    Some("wilder") => RsiSmoothing::Wilder,
                    _ => bail!(IndicatorError::InvalidParameter {
                        name: format!("unknown rsi smoothing {value}"),
                    }),
                },
            };
            Box::new(Rsi::new(get_usize(config, "period", 14)?)?.with_smoothing(smoothing))
        }
        "bollinger" => Box::new(BollingerBands::new(
            get_usize(config, "period", 20)?,
            get_f64(config, "std_dev_multiplier", 2.0)?,
        )?),
        "macd" => Box::new(Macd::new(
            get_usize(config, "fast_period", 12)?,
            get_usize(config, "slow_period", 26)?,
            get_usize(config, "signal_period", 9)?,
        )?),
        "atr" => Box::new(Atr::new(get_usize(config, "period", 14)?)?),
        "vwap" => Box::new(Vwap),
        "zscore" => Box::new(ZScore::new(get_usize(config, "period", 20)?)?),
        "volume_ma" => Box::new(VolumeMA::new(get_usize(config, "period", 20)?)?),
        other => bail!(IndicatorError::InvalidParameter {
            name: format!("unknown indicator kind \"{other}\""),
        }),
    };
    Ok(indicator)
}

/// `default` when `key` is absent; an error when it is present but not a
/// non-negative integer.
fn get_usize(
    config: &IndicatorConfig,
    key: &str,
    default: usize,
) -> Result<usize, Report<IndicatorError>> {
    let Some(value) = config.params.get(key) else {
        return Ok(default);
    };
    value
        .as_integer()
        .and_then(|v| usize::try_from(v).ok())
        .ok_or_else(|| {
            Report::new(IndicatorError::InvalidParameter {
                name: format!("{key} must be a non-negative integer"),
            })
            .attach(format!("{key} = {value}"))
        })
}

fn get_f64(config: &IndicatorConfig, key: &str, default: f64) -> Result<f64, Report<IndicatorError>> {
    let Some(value) = config.params.get(key) else {
        return Ok(default);
    };
    value
        .as_float()
        .or_else(|| value.as_integer().map(|i| i as f64))
        .ok_or_else(|| {
            Report::new(IndicatorError::InvalidParameter {
                name: format!("{key} must be a number"),
            })
            .attach(format!("{key} = {value}"))
        })
}

/// Named indicator columns aligned index-for-index with a source series.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorBundle {
    timestamps: Vec<DateTime<Utc>>,
    columns: BTreeMap<String, Vec<Option<f64>>>,
}

impl IndicatorBundle {
    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn get(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    /// Value of `name` at the last bar, if defined there.
    pub fn latest(&self, name: &str) -> Option<f64> {
        self.get(name)?.last().copied().flatten()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }
}

/// Derive every indicator in `set` from `series`.
///
/// Never fails: short input produces undefined columns and an empty series
/// produces an empty bundle. When two indicators emit the same column name the
/// later one wins.
pub fn compute(series: &Series, set: &IndicatorSet) -> IndicatorBundle {
    let bars = series.bars();
    let mut columns = BTreeMap::new();
    if !series.is_empty() {
        for indicator in &set.indicators {
            for (name, values) in indicator.calculate(bars) {
                debug_assert_eq!(values.len(), bars.len(), "{name} is misaligned");
                columns.insert(name, values);
            }
        }
    }
    IndicatorBundle {
        timestamps: series.timestamps(),
        columns,
    }
}

/// Parse and validate indicator entries up front so configuration errors
/// surface at startup rather than on the first refresh.
pub fn validate_configs(configs: &[IndicatorConfig]) -> Result<(), Report<IndicatorError>> {
    for config in configs {
        build_indicator(config).attach_with(|| format!("indicator kind: {}", config.kind))?;
    }
    Ok(())
}
