use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Bar interval supported by the upstream chart endpoint.
///
/// String representations match the config file format (e.g. `"15m"`, `"1d"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Interval {
    Min1,
    Min2,
    Min5,
    Min15,
    Min30,
    Hour1,
    Min90,
    Day1,
    Day5,
    Week1,
    Month1,
}

impl Interval {
    /// Parse a config-format string into an `Interval`. `"60m"` is accepted as
    /// an alias of `"1h"`.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "1m" => Some(Self::Min1),
            "2m" => Some(Self::Min2),
            "5m" => Some(Self::Min5),
            "15m" => Some(Self::Min15),
            "30m" => Some(Self::Min30),
            "1h" | "60m" => Some(Self::Hour1),
            "90m" => Some(Self::Min90),
            "1d" => Some(Self::Day1),
            "5d" => Some(Self::Day5),
            "1wk" => Some(Self::Week1),
            "1mo" => Some(Self::Month1),
            _ => None,
        }
    }

    /// Return the config-format string, which is also the upstream query value.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Min1 => "1m",
            Self::Min2 => "2m",
            Self::Min5 => "5m",
            Self::Min15 => "15m",
            Self::Min30 => "30m",
            Self::Hour1 => "1h",
            Self::Min90 => "90m",
            Self::Day1 => "1d",
            Self::Day5 => "5d",
            Self::Week1 => "1wk",
            Self::Month1 => "1mo",
        }
    }

    /// Nominal bar length. Months are taken as 30 days.
    pub fn duration(self) -> Duration {
        match self {
            Self::Min1 => Duration::minutes(1),
            Self::Min2 => Duration::minutes(2),
            Self::Min5 => Duration::minutes(5),
            Self::Min15 => Duration::minutes(15),
            Self::Min30 => Duration::minutes(30),
            Self::Hour1 => Duration::hours(1),
            Self::Min90 => Duration::minutes(90),
            Self::Day1 => Duration::days(1),
            Self::Day5 => Duration::days(5),
            Self::Week1 => Duration::weeks(1),
            Self::Month1 => Duration::days(30),
        }
    }

    pub fn is_intraday(self) -> bool {
        self.duration() < Duration::days(1)
    }

    /// Whether the upstream serves this interval over `range`.
    ///
    /// 1-minute bars go back at most a few days, the other sub-hourly bars
    /// about two months and hourly bars about two years.
    pub fn supports(self, range: Range) -> bool {
        let limit = match self {
            Self::Min1 => Range::Day5,
            Self::Min2 | Self::Min5 | Self::Min15 | Self::Min30 | Self::Min90 => Range::Month1,
            Self::Hour1 => Range::Year2,
            Self::Day1 | Self::Day5 | Self::Week1 | Self::Month1 => return true,
        };
        range.within(limit)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lookback window of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Range {
    Day1,
    Day5,
    Month1,
    Month3,
    Month6,
    Year1,
    Year2,
    Year5,
    Year10,
    Ytd,
    Max,
}

impl Range {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "1d" => Some(Self::Day1),
            "5d" => Some(Self::Day5),
            "1mo" => Some(Self::Month1),
            "3mo" => Some(Self::Month3),
            "6mo" => Some(Self::Month6),
            "1y" => Some(Self::Year1),
            "2y" => Some(Self::Year2),
            "5y" => Some(Self::Year5),
            "10y" => Some(Self::Year10),
            "ytd" => Some(Self::Ytd),
            "max" => Some(Self::Max),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Day1 => "1d",
            Self::Day5 => "5d",
            Self::Month1 => "1mo",
            Self::Month3 => "3mo",
            Self::Month6 => "6mo",
            Self::Year1 => "1y",
            Self::Year2 => "2y",
            Self::Year5 => "5y",
            Self::Year10 => "10y",
            Self::Ytd => "ytd",
            Self::Max => "max",
        }
    }

    /// Upper bound of the window in calendar days; `None` for `max`.
    pub fn max_days(self) -> Option<i64> {
        match self {
            Self::Day1 => Some(1),
            Self::Day5 => Some(5),
            Self::Month1 => Some(31),
            Self::Month3 => Some(92),
            Self::Month6 => Some(183),
            Self::Year1 | Self::Ytd => Some(366),
            Self::Year2 => Some(731),
            Self::Year5 => Some(1827),
            Self::Year10 => Some(3653),
            Self::Max => None,
        }
    }
}

impl Range {
    /// Whether this window is no longer than `other`. `max` is longer than
    /// every bounded window.
    pub fn within(self, other: Range) -> bool {
        match (self.max_days(), other.max_days()) {
            (Some(days), Some(limit)) => days <= limit,
            (_, None) => true,
            (None, Some(_)) => false,
        }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Broad instrument family, used to anchor synthetic data and pick cache TTLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentClass {
    IndexFuture,
    #[default]
    Equity,
    Etf,
    Crypto,
    Volatility,
    Rates,
    Fx,
    Commodity,
}

impl InstrumentClass {
    /// A plausible price level for a random walk when no real quote exists.
    pub fn base_price(self) -> f64 {
        match self {
            Self::IndexFuture => 20_000.0,
            Self::Equity => 150.0,
            Self::Etf => 450.0,
            Self::Crypto => 60_000.0,
            Self::Volatility => 18.0,
            Self::Rates => 4.25,
            Self::Fx => 1.08,
            Self::Commodity => 2_300.0,
        }
    }

    /// Per-bar standard deviation of synthetic log returns.
    pub fn bar_volatility(self) -> f64 {
        match self {
            Self::Crypto => 0.006,
            Self::Volatility => 0.02,
            Self::Rates | Self::Fx => 0.001,
            _ => 0.002,
        }
    }

    /// Slower-moving macro series that tolerate a longer cache TTL.
    pub fn is_macro(self) -> bool {
        matches!(self, Self::Volatility | Self::Rates)
    }
}

/// How an acquisition treats rows with missing values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AcquisitionMode {
    /// Drop rows without a usable close; every OHLC field is finite.
    #[default]
    Clean,
    /// Keep every server-side row, missing values as NaN.
    Raw,
}

/// Where the bars of a series actually came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Provenance {
    Primary,
    Proxy { symbol: String },
    Synthetic,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Proxy { symbol } => write!(f, "proxy:{symbol}"),
            Self::Synthetic => write!(f, "synthetic"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// `(high + low + close) / 3`
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }
}

/// An ordered run of bars for one instrument at one interval.
///
/// Series are immutable once built; the gateway hands out shared references
/// and every derived computation produces new data aligned to `timestamps()`.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    symbol: String,
    interval: Interval,
    range: Range,
    bars: Vec<Bar>,
    provenance: Provenance,
    mode: AcquisitionMode,
    stale: bool,
}

impl Series {
    pub fn new(
        symbol: impl Into<String>,
        interval: Interval,
        range: Range,
        bars: Vec<Bar>,
        provenance: Provenance,
        mode: AcquisitionMode,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            interval,
            range,
            bars,
            provenance,
            mode,
            stale: false,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn interval(&self) -> Interval {
        self.interval
    }

    pub fn range(&self) -> Range {
        self.range
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    pub fn mode(&self) -> AcquisitionMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.bars.iter().map(|b| b.timestamp).collect()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    /// Simulated data; the presentation layer must flag it as such.
    pub fn is_synthetic(&self) -> bool {
        self.provenance == Provenance::Synthetic
    }

    /// Served from an expired cache entry after a failed refresh.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub(crate) fn into_stale(mut self) -> Self {
        self.stale = true;
        self
    }
}

/// Best-effort scalar fields about an instrument. Any field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Quote {
    pub symbol: String,
    pub last_price: Option<f64>,
    pub previous_close: Option<f64>,
    pub day_high: Option<f64>,
    pub day_low: Option<f64>,
    pub volume: Option<f64>,
    pub currency: Option<String>,
    pub exchange: Option<String>,
}

impl Quote {
    /// Percent change of `last_price` against `previous_close`, when both exist.
    pub fn change_pct(&self) -> Option<f64> {
        match (self.last_price, self.previous_close) {
            (Some(last), Some(prev)) if prev != 0.0 => Some((last / prev - 1.0) * 100.0),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_round_trip() {
        let frames = [
            ("1m", Interval::Min1),
            ("2m", Interval::Min2),
            ("5m", Interval::Min5),
            ("15m", Interval::Min15),
            ("30m", Interval::Min30),
            ("1h", Interval::Hour1),
            ("90m", Interval::Min90),
            ("1d", Interval::Day1),
            ("5d", Interval::Day5),
            ("1wk", Interval::Week1),
            ("1mo", Interval::Month1),
        ];
        for (s, interval) in frames {
            assert_eq!(Interval::from_str(s), Some(interval));
            assert_eq!(interval.as_str(), s);
        }
    }

    #[test]
    fn sixty_minutes_is_hourly() {
        assert_eq!(Interval::from_str("60m"), Some(Interval::Hour1));
    }

    #[test]
    fn invalid_strings_return_none() {
        assert_eq!(Interval::from_str("3m"), None);
        assert_eq!(Interval::from_str(""), None);
        assert_eq!(Range::from_str("2d"), None);
        assert_eq!(Range::from_str("1Y"), None);
    }

    #[test]
    fn minute_bars_limited_to_short_ranges() {
        assert!(Interval::Min1.supports(Range::Day5));
        assert!(!Interval::Min1.supports(Range::Month1));
        assert!(Interval::Min15.supports(Range::Month1));
        assert!(!Interval::Min15.supports(Range::Month3));
        assert!(Interval::Hour1.supports(Range::Year2));
        assert!(Interval::Hour1.supports(Range::Ytd));
        assert!(!Interval::Hour1.supports(Range::Year5));
        assert!(!Interval::Hour1.supports(Range::Max));
        assert!(Interval::Min90.supports(Range::Month1));
        assert!(!Interval::Min90.supports(Range::Month3));
        assert!(Interval::Day1.supports(Range::Max));
    }

    #[test]
    fn range_within_compares_window_lengths() {
        assert!(Range::Year2.within(Range::Year2));
        assert!(Range::Ytd.within(Range::Year1));
        assert!(!Range::Year5.within(Range::Year2));
        assert!(Range::Max.within(Range::Max));
        assert!(!Range::Max.within(Range::Year10));
    }

    #[test]
    fn intraday_classification() {
        assert!(Interval::Min90.is_intraday());
        assert!(!Interval::Day1.is_intraday());
    }

    #[test]
    fn provenance_display() {
        assert_eq!(Provenance::Primary.to_string(), "primary");
        assert_eq!(
            Provenance::Proxy {
                symbol: "QQQ".into()
            }
            .to_string(),
            "proxy:QQQ"
        );
        assert_eq!(Provenance::Synthetic.to_string(), "synthetic");
    }

    #[test]
    fn instrument_class_deserializes_snake_case() {
        #[derive(Deserialize)]
        struct Wrapper {
            class: InstrumentClass,
        }
        let parsed: Wrapper = toml::from_str("class = \"index_future\"").unwrap();
        assert_eq!(parsed.class, InstrumentClass::IndexFuture);
    }

    #[test]
    fn quote_change_pct_requires_both_prices() {
        let mut quote = Quote {
            symbol: "SPY".into(),
            last_price: Some(101.0),
            previous_close: Some(100.0),
            ..Default::default()
        };
        assert!((quote.change_pct().unwrap() - 1.0).abs() < 1e-9);
        quote.previous_close = None;
        assert_eq!(quote.change_pct(), None);
    }

    #[test]
    fn typical_price_is_hlc_mean() {
        let bar = Bar {
            timestamp: Utc::now(),
            open: 10.0,
            high: 12.0,
            low: 9.0,
            close: 11.0,
            volume: 5.0,
        };
        assert!((bar.typical_price() - 32.0 / 3.0).abs() < 1e-12);
    }
}
