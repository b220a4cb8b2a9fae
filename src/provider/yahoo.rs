use std::collections::{BTreeSet, HashMap};
use std::num::NonZeroU32;
use std::sync::Arc;

use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::ProviderError;
use crate::model::{Interval, Quote, Range};
use crate::provider::{Field, MarketDataProvider, RawColumn, RawTable};

pub const YAHOO_BASE_URL: &str = "https://query1.finance.yahoo.com";
const PROVIDER: &str = "yahoo";
// The chart endpoint rejects requests without a browser-like agent
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) market-pulse/0.1";

fn unavailable() -> ProviderError {
    ProviderError::UpstreamUnavailable {
        provider: PROVIDER.into(),
    }
}

fn malformed() -> ProviderError {
    ProviderError::MalformedResponse {
        provider: PROVIDER.into(),
    }
}

/// Client for the public chart endpoint (`/v8/finance/chart/{symbol}`).
///
/// The endpoint serves one symbol per request, so a batch is fetched symbol by
/// symbol behind the rate limiter and assembled into one multi-symbol table.
pub struct YahooProvider {
    client: reqwest::Client,
    base_url: String,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
}

impl YahooProvider {
    pub fn new(base_url: &str, requests_per_second: u32) -> Result<Self, Report<ProviderError>> {
        let rate = NonZeroU32::new(requests_per_second).unwrap_or(nonzero!(1u32));
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .change_context(unavailable())?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            rate_limiter: Arc::new(RateLimiter::direct(Quota::per_second(rate))),
        })
    }

    /// `Ok(None)` when the endpoint does not know the symbol.
    async fn fetch_chart(
        &self,
        symbol: &str,
        interval: &str,
        range: &str,
    ) -> Result<Option<ChartResult>, Report<ProviderError>> {
        // Wait for rate limiter before making the request
        self.rate_limiter.until_ready().await;

        let url = format!("{}/v8/finance/chart/{}", self.base_url, encode_symbol(symbol));
        let params = [
            ("interval", interval),
            ("range", range),
            ("includePrePost", "false"),
        ];

        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .change_context(unavailable())
            .attach_with(|| format!("symbol: {symbol}"))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(symbol, "chart endpoint does not know symbol");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Report::new(unavailable())
                .attach(format!("HTTP status: {status}"))
                .attach(format!("symbol: {symbol}")));
        }

        let body: ChartResponse = response
            .json()
            .await
            .change_context(malformed())
            .attach_with(|| format!("symbol: {symbol}"))?;

        if let Some(error) = &body.chart.error {
            debug!(symbol, code = %error.code, "chart endpoint returned an error body");
        }
        Ok(body.chart.result.and_then(|r| r.into_iter().next()))
    }
}

impl MarketDataProvider for YahooProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn fetch_history(
        &self,
        symbols: &[String],
        interval: Interval,
        range: Range,
    ) -> BoxFuture<'_, Result<RawTable, Report<ProviderError>>> {
        let symbols = symbols.to_vec();
        Box::pin(async move {
            let mut frames = Vec::with_capacity(symbols.len());
            let mut last_error = None;

            for symbol in &symbols {
                let frame = self
                    .fetch_chart(symbol, interval.as_str(), range.as_str())
                    .await
                    .and_then(|chart| SymbolFrame::from_chart(symbol, chart));
                match frame {
                    Ok(Some(frame)) => frames.push(frame),
                    Ok(None) => debug!(symbol = %symbol, "no rows returned"),
                    Err(e) => {
                        warn!(symbol = %symbol, error = ?e, "chart fetch failed");
                        last_error = Some(e);
                    }
                }
            }

            if frames.is_empty()
                && let Some(e) = last_error
            {
                return Err(e);
            }

            let table = merge_frames(frames);
            info!(
                symbols = ?symbols,
                interval = %interval,
                range = %range,
                rows = table.timestamps.len(),
                "chart fetch complete"
            );
            Ok(table)
        })
    }

    fn fetch_quote(&self, symbol: &str) -> BoxFuture<'_, Result<Quote, Report<ProviderError>>> {
        let symbol = symbol.to_owned();
        Box::pin(async move {
            let chart = self
                .fetch_chart(&symbol, Interval::Day1.as_str(), Range::Day1.as_str())
                .await?
                .ok_or_else(|| {
                    Report::new(unavailable()).attach(format!("unknown symbol: {symbol}"))
                })?;
            Ok(chart.meta.into_quote(&symbol))
        })
    }
}

/// Percent-encode everything but the characters tickers use literally.
fn encode_symbol(symbol: &str) -> String {
    symbol
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'=' | b'_' => {
                (b as char).to_string()
            }
            _ => format!("%{b:02X}"),
        })
        .collect()
}

/// Columns of a single symbol before they are put on the shared index.
#[derive(Debug)]
struct SymbolFrame {
    symbol: String,
    timestamps: Vec<i64>,
    columns: Vec<(Field, Vec<Option<f64>>)>,
}

impl SymbolFrame {
    fn from_chart(
        symbol: &str,
        chart: Option<ChartResult>,
    ) -> Result<Option<Self>, Report<ProviderError>> {
        let Some(chart) = chart else {
            return Ok(None);
        };
        if chart.timestamp.is_empty() {
            return Ok(None);
        }
        let rows = chart.timestamp.len();
        let quote = chart.indicators.quote.into_iter().next().ok_or_else(|| {
            Report::new(malformed()).attach(format!("{symbol}: rows without a quote block"))
        })?;

        let mut columns = Vec::with_capacity(5);
        for (field, values) in [
            (Field::Open, quote.open),
            (Field::High, quote.high),
            (Field::Low, quote.low),
            (Field::Close, quote.close),
            (Field::Volume, quote.volume),
        ] {
            let values = match values.len() {
                0 => vec![None; rows],
                n if n == rows => values,
                n => {
                    return Err(Report::new(malformed()).attach(format!(
                        "{symbol}: {field:?} has {n} values for {rows} timestamps"
                    )));
                }
            };
            columns.push((field, values));
        }

        Ok(Some(Self {
            symbol: symbol.to_owned(),
            timestamps: chart.timestamp,
            columns,
        }))
    }
}

/// Put every frame on the union of their timestamps, tagging columns with
/// their symbol.
fn merge_frames(frames: Vec<SymbolFrame>) -> RawTable {
    let index: Vec<i64> = frames
        .iter()
        .flat_map(|f| f.timestamps.iter().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut columns = Vec::new();
    for frame in frames {
        let positions: HashMap<i64, usize> = frame
            .timestamps
            .iter()
            .enumerate()
            .map(|(pos, &ts)| (ts, pos))
            .collect();
        for (field, values) in frame.columns {
            let aligned = index
                .iter()
                .map(|ts| positions.get(ts).and_then(|&pos| values[pos]))
                .collect();
            columns.push(RawColumn {
                field,
                symbol: Some(frame.symbol.clone()),
                values: aligned,
            });
        }
    }

    RawTable {
        timestamps: index,
        columns,
    }
}

// ── REST response types ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<QuoteColumns>,
}

/// Parallel arrays; `null` marks a missing value.
#[derive(Debug, Default, Deserialize)]
struct QuoteColumns {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    currency: Option<String>,
    exchange_name: Option<String>,
    regular_market_price: Option<f64>,
    chart_previous_close: Option<f64>,
    previous_close: Option<f64>,
    regular_market_day_high: Option<f64>,
    regular_market_day_low: Option<f64>,
    regular_market_volume: Option<f64>,
}

impl ChartMeta {
    fn into_quote(self, symbol: &str) -> Quote {
        Quote {
            symbol: symbol.to_owned(),
            last_price: self.regular_market_price,
            previous_close: self.previous_close.or(self.chart_previous_close),
            day_high: self.regular_market_day_high,
            day_low: self.regular_market_day_low,
            volume: self.regular_market_volume,
            currency: self.currency,
            exchange: self.exchange_name,
        }
    }
}
