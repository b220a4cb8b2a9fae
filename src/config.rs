use std::collections::HashSet;
use std::path::Path;

use error_stack::{Report, ResultExt};
use serde::Deserialize;

use crate::engine;
use crate::error::ConfigError;
use crate::model::{InstrumentClass, Interval, Range};
use crate::provider::yahoo::YAHOO_BASE_URL;

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "text".into()
}

fn default_base_url() -> String {
    YAHOO_BASE_URL.into()
}

fn default_intraday_ttl_secs() -> u64 {
    60
}

fn default_macro_ttl_secs() -> u64 {
    300
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_requests_per_second() -> u32 {
    4
}

fn default_symbol() -> String {
    "NQ=F".into()
}

fn default_interval() -> String {
    "15m".into()
}

fn default_range() -> String {
    "5d".into()
}

fn default_refresh_secs() -> u64 {
    60
}

fn default_correlation_window() -> usize {
    30
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub instruments: Vec<InstrumentConfig>,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Accepted values: `"text"` | `"json"`
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_intraday_ttl_secs")]
    pub intraday_ttl_secs: u64,
    #[serde(default = "default_macro_ttl_secs")]
    pub macro_ttl_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
    #[serde(default)]
    pub serve_stale_on_error: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            intraday_ttl_secs: default_intraday_ttl_secs(),
            macro_ttl_secs: default_macro_ttl_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            requests_per_second: default_requests_per_second(),
            serve_stale_on_error: false,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DashboardConfig {
    #[serde(default = "default_symbol")]
    pub symbol: String,
    #[serde(default = "default_interval")]
    pub interval: String,
    #[serde(default = "default_range")]
    pub range: String,
    /// Fall back to a simulated series when the symbol and its proxy both fail.
    #[serde(default = "default_true")]
    pub allow_synthetic: bool,
    /// Period of the `watch` command.
    #[serde(default = "default_refresh_secs")]
    pub refresh_secs: u64,
    #[serde(default)]
    pub correlate_with: Vec<String>,
    #[serde(default = "default_correlation_window")]
    pub correlation_window: usize,
    /// Empty means the standard catalog.
    #[serde(default)]
    pub indicators: Vec<IndicatorConfig>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            interval: default_interval(),
            range: default_range(),
            allow_synthetic: true,
            refresh_secs: default_refresh_secs(),
            correlate_with: Vec::new(),
            correlation_window: default_correlation_window(),
            indicators: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct InstrumentConfig {
    pub symbol: String,
    /// Short display name, also used in correlation column names.
    pub label: Option<String>,
    #[serde(default)]
    pub class: InstrumentClass,
    pub proxy: Option<String>,
    /// Overrides the class default as the synthetic walk's starting price.
    pub base_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct IndicatorConfig {
    /// `sma`, `ema`, `rsi`, `bollinger`, `macd`, `atr`, `vwap`, `zscore` or `volume_ma`
    pub kind: String,
    #[serde(default)]
    pub params: toml::Table,
}

impl AppConfig {
    pub fn instrument(&self, symbol: &str) -> Option<&InstrumentConfig> {
        self.instruments.iter().find(|i| i.symbol == symbol)
    }

    /// Display label for `symbol`: the configured label, else the symbol.
    pub fn label_for<'a>(&'a self, symbol: &'a str) -> &'a str {
        self.instrument(symbol)
            .and_then(|i| i.label.as_deref())
            .unwrap_or(symbol)
    }
}

/// Load and validate an `AppConfig` from a TOML file at `path`.
pub fn load(path: &Path) -> Result<AppConfig, Report<ConfigError>> {
    let content = std::fs::read_to_string(path)
        .change_context(ConfigError::ReadFile)
        .attach_with(|| format!("path: {}", path.display()))?;

    let config: AppConfig = toml::from_str(&content).change_context(ConfigError::Parse {
        reason: "invalid TOML syntax or schema mismatch".into(),
    })?;

    validate(&config)?;

    Ok(config)
}

fn invalid(field: String) -> Report<ConfigError> {
    Report::new(ConfigError::Validation { field })
}

fn validate(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    validate_general(config)?;
    validate_gateway(config)?;
    validate_dashboard(config)?;
    validate_instruments(config)?;
    Ok(())
}

fn validate_general(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    match config.general.log_format.as_str() {
        "text" | "json" => Ok(()),
        other => Err(invalid(format!(
            "general.log_format \"{other}\" must be \"text\" or \"json\""
        ))),
    }
}

fn validate_gateway(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let gateway = &config.gateway;
    for (name, value) in [
        ("intraday_ttl_secs", gateway.intraday_ttl_secs),
        ("macro_ttl_secs", gateway.macro_ttl_secs),
        ("request_timeout_secs", gateway.request_timeout_secs),
        ("requests_per_second", u64::from(gateway.requests_per_second)),
    ] {
        if value == 0 {
            return Err(invalid(format!("gateway.{name} must be > 0")));
        }
    }
    if gateway.base_url.trim().is_empty() {
        return Err(invalid("gateway.base_url must not be empty".into()));
    }
    Ok(())
}

fn validate_dashboard(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let dashboard = &config.dashboard;
    if dashboard.symbol.trim().is_empty() {
        return Err(invalid("dashboard.symbol must not be empty".into()));
    }
    let interval = Interval::from_str(&dashboard.interval).ok_or_else(|| {
        invalid(format!(
            "dashboard.interval: unknown interval \"{}\"",
            dashboard.interval
        ))
    })?;
    let range = Range::from_str(&dashboard.range)
        .ok_or_else(|| invalid(format!("dashboard.range: unknown range \"{}\"", dashboard.range)))?;
    if !interval.supports(range) {
        return Err(invalid(format!(
            "dashboard.range \"{range}\" is too long for \"{interval}\" bars"
        )));
    }
    if dashboard.refresh_secs == 0 {
        return Err(invalid("dashboard.refresh_secs must be > 0".into()));
    }
    if dashboard.correlate_with.iter().any(|s| s.trim().is_empty()) {
        return Err(invalid("dashboard.correlate_with: empty symbol".into()));
    }
    if dashboard.correlation_window < 2 {
        return Err(invalid("dashboard.correlation_window must be >= 2".into()));
    }
    engine::validate_configs(&dashboard.indicators)
        .change_context(ConfigError::Validation {
            field: "dashboard.indicators".into(),
        })?;
    Ok(())
}

fn validate_instruments(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let mut seen = HashSet::new();
    for instrument in &config.instruments {
        if instrument.symbol.trim().is_empty() {
            return Err(invalid("instruments: empty symbol".into()));
        }
        if !seen.insert(instrument.symbol.as_str()) {
            return Err(invalid(format!(
                "instruments: duplicate symbol \"{}\"",
                instrument.symbol
            )));
        }
        if let Some(proxy) = &instrument.proxy
            && (proxy.trim().is_empty() || *proxy == instrument.symbol)
        {
            return Err(invalid(format!(
                "instruments[\"{}\"].proxy must be a different, non-empty symbol",
                instrument.symbol
            )));
        }
        if let Some(base) = instrument.base_price
            && !(base.is_finite() && base > 0.0)
        {
            return Err(invalid(format!(
                "instruments[\"{}\"].base_price must be a positive number",
                instrument.symbol
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> AppConfig {
        toml::from_str(toml).expect("parse failed")
    }

    #[test]
    fn valid_full_config_parses() {
        let toml = r#"
[general]
log_level = "debug"
log_format = "json"

[gateway]
base_url = "http://localhost:8080"
intraday_ttl_secs = 30
macro_ttl_secs = 600
request_timeout_secs = 5
requests_per_second = 2
serve_stale_on_error = true

[dashboard]
symbol = "NQ=F"
interval = "15m"
range = "5d"
allow_synthetic = false
refresh_secs = 30
correlate_with = ["^VIX", "^TNX"]
correlation_window = 20

[[dashboard.indicators]]
kind = "rsi"
params = { period = 14, smoothing = "wilder" }

[[dashboard.indicators]]
kind = "bollinger"
params = { period = 20, std_dev_multiplier = 2.5 }

[[instruments]]
symbol = "NQ=F"
label = "NQ"
class = "index_future"
proxy = "QQQ"
base_price = 20000.0

[[instruments]]
symbol = "^VIX"
label = "VIX"
class = "volatility"
"#;
        let config = parse(toml);
        assert!(validate(&config).is_ok());
        assert_eq!(config.general.log_format, "json");
        assert!(config.gateway.serve_stale_on_error);
        assert_eq!(config.dashboard.correlate_with.len(), 2);
        assert_eq!(config.dashboard.indicators.len(), 2);
        assert_eq!(config.instruments[0].class, InstrumentClass::IndexFuture);
        assert_eq!(config.instruments[0].proxy.as_deref(), Some("QQQ"));
        assert_eq!(config.label_for("^VIX"), "VIX");
        assert_eq!(config.label_for("SPY"), "SPY");
    }

    #[test]
    fn defaults_applied_when_sections_omitted() {
        let config = parse("");
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.log_format, "text");
        assert_eq!(config.gateway.base_url, YAHOO_BASE_URL);
        assert_eq!(config.gateway.intraday_ttl_secs, 60);
        assert_eq!(config.gateway.macro_ttl_secs, 300);
        assert_eq!(config.gateway.request_timeout_secs, 10);
        assert!(!config.gateway.serve_stale_on_error);
        assert_eq!(config.dashboard.symbol, "NQ=F");
        assert_eq!(config.dashboard.interval, "15m");
        assert_eq!(config.dashboard.range, "5d");
        assert!(config.dashboard.allow_synthetic);
        assert_eq!(config.dashboard.correlation_window, 30);
        assert!(config.instruments.is_empty());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn instrument_class_defaults_to_equity() {
        let config = parse("[[instruments]]\nsymbol = \"AAPL\"\n");
        assert_eq!(config.instruments[0].class, InstrumentClass::Equity);
    }

    #[test]
    fn unknown_interval_rejected() {
        let config = parse("[dashboard]\ninterval = \"3m\"\n");
        assert!(validate(&config).is_err());
    }

    #[test]
    fn incompatible_interval_and_range_rejected() {
        let config = parse("[dashboard]\ninterval = \"1m\"\nrange = \"1y\"\n");
        assert!(validate(&config).is_err());
    }

    #[test]
    fn zero_ttl_rejected() {
        let config = parse("[gateway]\nintraday_ttl_secs = 0\n");
        assert!(validate(&config).is_err());
    }

    #[test]
    fn unknown_log_format_rejected() {
        let config = parse("[general]\nlog_format = \"xml\"\n");
        assert!(validate(&config).is_err());
    }

    #[test]
    fn duplicate_instruments_rejected() {
        let toml = r#"
[[instruments]]
symbol = "SPY"

[[instruments]]
symbol = "SPY"
"#;
        assert!(validate(&parse(toml)).is_err());
    }

    #[test]
    fn self_proxy_rejected() {
        let config = parse("[[instruments]]\nsymbol = \"SPY\"\nproxy = \"SPY\"\n");
        assert!(validate(&config).is_err());
    }

    #[test]
    fn short_correlation_window_rejected() {
        let config = parse("[dashboard]\ncorrelation_window = 1\n");
        assert!(validate(&config).is_err());
    }

    #[test]
    fn unknown_indicator_kind_rejected() {
        let toml = r#"
[[dashboard.indicators]]
kind = "ichimoku"
"#;
        let err = validate(&parse(toml)).unwrap_err();
        assert!(matches!(
            err.current_context(),
            ConfigError::Validation { .. }
        ));
    }

    #[test]
    fn unknown_class_fails_to_parse() {
        let result: Result<AppConfig, _> =
            toml::from_str("[[instruments]]\nsymbol = \"X\"\nclass = \"bond\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = load(Path::new("/nonexistent/market-pulse.toml")).unwrap_err();
        assert!(matches!(err.current_context(), ConfigError::ReadFile));
    }
}
