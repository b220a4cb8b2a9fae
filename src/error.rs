use derive_more::{Display, Error};

#[derive(Debug, Display, Error)]
pub enum ConfigError {
    #[display("failed to read config file")]
    ReadFile,
    #[display("failed to parse config: {reason}")]
    Parse { reason: String },
    #[display("invalid config: {field}")]
    Validation { field: String },
}

/// Failures of a single upstream call. Both variants advance the gateway's
/// fallback chain; neither reaches the caller directly.
#[derive(Debug, Display, Error)]
pub enum ProviderError {
    #[display("{provider} is unavailable")]
    UpstreamUnavailable { provider: String },
    #[display("malformed response from {provider}")]
    MalformedResponse { provider: String },
}

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[display("no data available for {symbol}")]
    NoDataAvailable { symbol: String },
    #[display("invalid interval: {value}")]
    InvalidInterval { value: String },
    #[display("invalid range: {value}")]
    InvalidRange { value: String },
    #[display("symbol must not be empty")]
    InvalidSymbol,
    #[display("quote lookup for {symbol} failed")]
    QuoteUnavailable { symbol: String },
}

#[derive(Debug, Display, Error)]
pub enum IndicatorError {
    #[display("invalid parameter: {name}")]
    InvalidParameter { name: String },
}
