pub mod cache;
pub mod normalize;
pub mod synthetic;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;
use error_stack::{Report, ResultExt, bail};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::GatewayError;
use crate::model::{
    AcquisitionMode, Bar, InstrumentClass, Interval, Provenance, Quote, Range, Series,
};
use crate::provider::{MarketDataProvider, RawTable};

use self::cache::{CacheKey, Lookup, SeriesCache};
use self::normalize::normalize;

pub struct GatewayOptions {
    /// TTL for intraday bars of ordinary instruments.
    pub intraday_ttl: Duration,
    /// TTL for macro instruments and for daily or coarser bars.
    pub macro_ttl: Duration,
    pub request_timeout: std::time::Duration,
    /// Serve an expired cache entry (flagged stale) when every live source fails.
    pub serve_stale_on_error: bool,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            intraday_ttl: Duration::seconds(60),
            macro_ttl: Duration::seconds(300),
            request_timeout: std::time::Duration::from_secs(10),
            serve_stale_on_error: false,
        }
    }
}

/// Static knowledge about a symbol: its family, the proxy to use when the
/// upstream has nothing for it, and an optional anchor for synthetic data.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentProfile {
    pub symbol: String,
    pub class: InstrumentClass,
    pub proxy: Option<String>,
    pub base_price: Option<f64>,
}

impl InstrumentProfile {
    pub fn new(symbol: impl Into<String>, class: InstrumentClass) -> Self {
        Self {
            symbol: symbol.into(),
            class,
            proxy: None,
            base_price: None,
        }
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn with_base_price(mut self, base_price: f64) -> Self {
        self.base_price = Some(base_price);
        self
    }
}

/// What to do once the primary symbol and its proxy have both failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackPolicy {
    /// Fail with `NoDataAvailable`.
    #[default]
    ProxyOnly,
    /// Serve a synthetic series tagged as such.
    AllowSynthetic,
}

/// A validated history request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesRequest {
    symbol: String,
    interval: Interval,
    range: Range,
    mode: AcquisitionMode,
    fallback: FallbackPolicy,
    refresh: bool,
}

impl SeriesRequest {
    pub fn new(symbol: &str, interval: Interval, range: Range) -> Result<Self, Report<GatewayError>> {
        let symbol = symbol.trim();
        if symbol.is_empty() {
            bail!(GatewayError::InvalidSymbol);
        }
        if !interval.supports(range) {
            bail!(GatewayError::InvalidRange {
                value: format!("{range} is too long for {interval} bars"),
            });
        }
        Ok(Self {
            symbol: symbol.to_owned(),
            interval,
            range,
            mode: AcquisitionMode::default(),
            fallback: FallbackPolicy::default(),
            refresh: false,
        })
    }

    /// Validate user-supplied strings, e.g. `("NQ=F", "15m", "5d")`.
    pub fn parse(symbol: &str, interval: &str, range: &str) -> Result<Self, Report<GatewayError>> {
        let parsed_interval = Interval::from_str(interval).ok_or_else(|| {
            Report::new(GatewayError::InvalidInterval {
                value: interval.to_owned(),
            })
        })?;
        let parsed_range = Range::from_str(range).ok_or_else(|| {
            Report::new(GatewayError::InvalidRange {
                value: range.to_owned(),
            })
        })?;
        Self::new(symbol, parsed_interval, parsed_range)
    }

    pub fn with_mode(mut self, mode: AcquisitionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackPolicy) -> Self {
        self.fallback = fallback;
        self
    }

    /// Bypass a fresh cache entry and go to the upstream.
    pub fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    /// The same request for another symbol.
    pub fn for_symbol(&self, symbol: &str) -> Result<Self, Report<GatewayError>> {
        Ok(Self::new(symbol, self.interval, self.range)?
            .with_mode(self.mode)
            .with_fallback(self.fallback)
            .with_refresh(self.refresh))
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

    pub fn mode(&self) -> AcquisitionMode {
        self.mode
    }

    pub fn fallback(&self) -> FallbackPolicy {
        self.fallback
    }

    fn key(&self) -> CacheKey {
        CacheKey {
            symbol: self.symbol.clone(),
            interval: self.interval,
            range: self.range,
            mode: self.mode,
        }
    }
}

/// Single entry point for market data.
///
/// Sources are tried strictly in order: the requested symbol, its configured
/// proxy, an expired cache entry (only with `serve_stale_on_error`), and a
/// synthetic walk (only with [`FallbackPolicy::AllowSynthetic`]). Live results
/// are cached per `(symbol, interval, range, mode)`; synthetic ones never are.
pub struct Gateway {
    provider: Arc<dyn MarketDataProvider>,
    clock: Arc<dyn Clock>,
    cache: SeriesCache,
    instruments: HashMap<String, InstrumentProfile>,
    options: GatewayOptions,
}

impl Gateway {
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        clock: Arc<dyn Clock>,
        options: GatewayOptions,
        instruments: impl IntoIterator<Item = InstrumentProfile>,
    ) -> Self {
        let instruments = instruments
            .into_iter()
            .map(|profile| (profile.symbol.clone(), profile))
            .collect();
        Self {
            provider,
            cache: SeriesCache::new(Arc::clone(&clock)),
            clock,
            instruments,
            options,
        }
    }

    pub fn profile(&self, symbol: &str) -> InstrumentProfile {
        self.instruments
            .get(symbol)
            .cloned()
            .unwrap_or_else(|| InstrumentProfile::new(symbol, InstrumentClass::default()))
    }

    fn ttl_for(&self, request: &SeriesRequest) -> Duration {
        if self.profile(&request.symbol).class.is_macro() || !request.interval.is_intraday() {
            self.options.macro_ttl
        } else {
            self.options.intraday_ttl
        }
    }

    pub async fn resolve(&self, request: &SeriesRequest) -> Result<Arc<Series>, Report<GatewayError>> {
        let stale = match self.cache.get(&request.key()) {
            Lookup::Fresh(series) if !request.refresh => {
                debug!(symbol = %request.symbol, "cache hit");
                return Ok(series);
            }
            lookup => lookup.into_stale(),
        };
        let fetched = self.fetch(std::slice::from_ref(&request.symbol), request).await;
        self.settle(request, fetched.as_ref().map_err(String::as_str), stale)
            .await
    }

    /// Resolve several symbols with one upstream call for every cache miss.
    ///
    /// Results line up with `symbols`. A symbol missing from the batch
    /// response goes through its own fallback chain without affecting the
    /// others.
    pub async fn resolve_batch(
        &self,
        symbols: &[String],
        template: &SeriesRequest,
    ) -> Vec<Result<Arc<Series>, Report<GatewayError>>> {
        enum Slot {
            Done(Result<Arc<Series>, Report<GatewayError>>),
            Pending(SeriesRequest, Option<Arc<Series>>),
        }

        let mut wanted: Vec<String> = Vec::new();
        let slots: Vec<Slot> = symbols
            .iter()
            .map(|symbol| {
                let request = match template.for_symbol(symbol) {
                    Ok(request) => request,
                    Err(e) => return Slot::Done(Err(e)),
                };
                match self.cache.get(&request.key()) {
                    Lookup::Fresh(series) if !request.refresh => Slot::Done(Ok(series)),
                    lookup => {
                        if !wanted.contains(&request.symbol) {
                            wanted.push(request.symbol.clone());
                        }
                        Slot::Pending(request, lookup.into_stale())
                    }
                }
            })
            .collect();

        let fetched = if wanted.is_empty() {
            Ok(RawTable::default())
        } else {
            self.fetch(&wanted, template).await
        };

        let mut results = Vec::with_capacity(slots.len());
        for slot in slots {
            let result = match slot {
                Slot::Done(result) => result,
                Slot::Pending(request, stale) => {
                    self.settle(&request, fetched.as_ref().map_err(String::as_str), stale)
                        .await
                }
            };
            results.push(result);
        }
        results
    }

    /// Best-effort quote for one symbol. No fallback applies.
    pub async fn quote(&self, symbol: &str) -> Result<Quote, Report<GatewayError>> {
        let symbol = symbol.trim();
        if symbol.is_empty() {
            bail!(GatewayError::InvalidSymbol);
        }
        let unavailable = GatewayError::QuoteUnavailable {
            symbol: symbol.to_owned(),
        };
        match tokio::time::timeout(self.options.request_timeout, self.provider.fetch_quote(symbol)).await
        {
            Ok(result) => result.change_context(unavailable),
            Err(_) => Err(Report::new(unavailable).attach(format!(
                "timed out after {:?}",
                self.options.request_timeout
            ))),
        }
    }

    /// Drop the cache entry for `request`. Returns whether one existed.
    pub fn invalidate(&self, request: &SeriesRequest) -> bool {
        self.cache.remove(&request.key())
    }

    /// Drop every cached series. Returns how many entries were dropped.
    pub fn clear(&self) -> usize {
        self.cache.clear()
    }

    /// One upstream history call under the request timeout. Failures are
    /// flattened to a short reason for the fallback log.
    async fn fetch(&self, symbols: &[String], request: &SeriesRequest) -> Result<RawTable, String> {
        let call = self
            .provider
            .fetch_history(symbols, request.interval, request.range);
        match tokio::time::timeout(self.options.request_timeout, call).await {
            Ok(Ok(table)) => Ok(table),
            Ok(Err(report)) => {
                debug!(?symbols, error = ?report, "upstream call failed");
                Err(report.current_context().to_string())
            }
            Err(_) => Err(format!(
                "{} timed out after {:?}",
                self.provider.name(),
                self.options.request_timeout
            )),
        }
    }

    fn usable_bars(
        &self,
        fetched: Result<&RawTable, &str>,
        symbol: &str,
        mode: AcquisitionMode,
    ) -> Result<Vec<Bar>, String> {
        let table = fetched.map_err(str::to_owned)?;
        let bars = normalize(table, symbol, mode, self.provider.name())
            .map_err(|e| e.current_context().to_string())?;
        if bars.iter().any(|b| b.close.is_finite()) {
            Ok(bars)
        } else {
            Err("no rows returned".to_owned())
        }
    }

    /// Walk the fallback chain once the primary fetch has completed.
    async fn settle(
        &self,
        request: &SeriesRequest,
        primary: Result<&RawTable, &str>,
        stale: Option<Arc<Series>>,
    ) -> Result<Arc<Series>, Report<GatewayError>> {
        let symbol = request.symbol.as_str();
        let mut failures = Vec::new();

        match self.usable_bars(primary, symbol, request.mode) {
            Ok(bars) => return Ok(self.store(request, bars, Provenance::Primary)),
            Err(reason) => {
                warn!(symbol, %reason, "primary source failed");
                failures.push(format!("{symbol}: {reason}"));
            }
        }

        let profile = self.profile(symbol);
        if let Some(proxy) = &profile.proxy {
            let fetched = self.fetch(std::slice::from_ref(proxy), request).await;
            match self.usable_bars(fetched.as_ref().map_err(String::as_str), proxy, request.mode) {
                Ok(bars) => {
                    warn!(symbol, proxy = %proxy, "serving proxy data");
                    let provenance = Provenance::Proxy {
                        symbol: proxy.clone(),
                    };
                    return Ok(self.store(request, bars, provenance));
                }
                Err(reason) => {
                    warn!(symbol, proxy = %proxy, %reason, "proxy source failed");
                    failures.push(format!("{proxy} (proxy): {reason}"));
                }
            }
        }

        if let Some(series) = stale {
            if self.options.serve_stale_on_error {
                warn!(symbol, "all live sources failed, serving expired cache entry");
                return Ok(Arc::new(series.as_ref().clone().into_stale()));
            }
            self.cache.remove(&request.key());
        }

        if request.fallback == FallbackPolicy::AllowSynthetic {
            warn!(symbol, "all live sources failed, serving synthetic data");
            let bars = synthetic::synthesize(
                symbol,
                request.interval,
                request.range,
                profile.base_price.unwrap_or(profile.class.base_price()),
                profile.class.bar_volatility(),
                self.clock.now(),
            );
            return Ok(Arc::new(Series::new(
                symbol,
                request.interval,
                request.range,
                bars,
                Provenance::Synthetic,
                request.mode,
            )));
        }

        let mut report = Report::new(GatewayError::NoDataAvailable {
            symbol: symbol.to_owned(),
        });
        for failure in failures {
            report = report.attach(failure);
        }
        Err(report)
    }

    fn store(&self, request: &SeriesRequest, bars: Vec<Bar>, provenance: Provenance) -> Arc<Series> {
        let series = Arc::new(Series::new(
            request.symbol.as_str(),
            request.interval,
            request.range,
            bars,
            provenance,
            request.mode,
        ));
        self.cache
            .insert(request.key(), Arc::clone(&series), self.ttl_for(request));
        series
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use chrono::{DateTime, Utc};
    use futures::future::BoxFuture;

    use super::*;
    use crate::clock::ManualClock;
    use crate::error::ProviderError;
    use crate::provider::{Field, RawColumn};

    const START: i64 = 1_704_067_200;

    /// Serves canned closes for known symbols and nothing for the rest.
    struct FakeProvider {
        closes: HashMap<String, Vec<f64>>,
        failing: HashSet<String>,
        down: AtomicBool,
        delay: Option<std::time::Duration>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl FakeProvider {
        fn new(known: &[(&str, f64)]) -> Self {
            let closes = known
                .iter()
                .map(|(symbol, base)| {
                    let values = (0..40).map(|i| base + i as f64).collect();
                    (symbol.to_string(), values)
                })
                .collect();
            Self {
                closes,
                failing: HashSet::new(),
                down: AtomicBool::new(false),
                delay: None,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing(mut self, symbol: &str) -> Self {
            self.failing.insert(symbol.to_owned());
            self
        }

        fn delayed(mut self, delay: std::time::Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }

        fn table(&self, symbols: &[String]) -> RawTable {
            let mut table = RawTable::default();
            for symbol in symbols {
                let Some(values) = self.closes.get(symbol) else {
                    continue;
                };
                table.timestamps = (0..values.len() as i64).map(|i| START + i * 900).collect();
                table.columns.push(RawColumn {
                    field: Field::Close,
                    symbol: Some(symbol.clone()),
                    values: values.iter().copied().map(Some).collect(),
                });
                table.columns.push(RawColumn {
                    field: Field::Volume,
                    symbol: Some(symbol.clone()),
                    values: vec![Some(1_000.0); values.len()],
                });
            }
            table
        }
    }

    impl MarketDataProvider for FakeProvider {
        fn name(&self) -> &str {
            "fake"
        }

        fn fetch_history(
            &self,
            symbols: &[String],
            _interval: Interval,
            _range: Range,
        ) -> BoxFuture<'_, Result<RawTable, Report<ProviderError>>> {
            let symbols = symbols.to_vec();
            Box::pin(async move {
                self.calls.lock().unwrap().push(symbols.clone());
                if let Some(delay) = self.delay {
                    tokio::time::sleep(delay).await;
                }
                if self.down.load(Ordering::SeqCst)
                    || symbols.iter().any(|s| self.failing.contains(s))
                {
                    bail!(ProviderError::UpstreamUnavailable {
                        provider: "fake".into()
                    });
                }
                Ok(self.table(&symbols))
            })
        }

        fn fetch_quote(&self, symbol: &str) -> BoxFuture<'_, Result<Quote, Report<ProviderError>>> {
            let symbol = symbol.to_owned();
            Box::pin(async move {
                let Some(values) = self.closes.get(&symbol) else {
                    bail!(ProviderError::MalformedResponse {
                        provider: "fake".into()
                    });
                };
                Ok(Quote {
                    symbol,
                    last_price: values.last().copied(),
                    previous_close: values.first().copied(),
                    ..Default::default()
                })
            })
        }
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            DateTime::<Utc>::from_timestamp(START + 40 * 900, 0).unwrap(),
        ))
    }

    fn gateway(provider: &Arc<FakeProvider>, clock: &Arc<ManualClock>) -> Gateway {
        gateway_with(provider, clock, GatewayOptions::default())
    }

    fn gateway_with(
        provider: &Arc<FakeProvider>,
        clock: &Arc<ManualClock>,
        options: GatewayOptions,
    ) -> Gateway {
        let instruments = vec![
            InstrumentProfile::new("NQ=F", InstrumentClass::IndexFuture).with_proxy("QQQ"),
            InstrumentProfile::new("^VIX", InstrumentClass::Volatility),
            InstrumentProfile::new("DEAD", InstrumentClass::Equity)
                .with_proxy("GONE")
                .with_base_price(42.0),
        ];
        Gateway::new(provider.clone(), clock.clone(), options, instruments)
    }

    fn request(symbol: &str) -> SeriesRequest {
        SeriesRequest::parse(symbol, "15m", "5d").unwrap()
    }

    #[tokio::test]
    async fn primary_result_is_cached() {
        let provider = Arc::new(FakeProvider::new(&[("SPY", 450.0)]));
        let clock = clock();
        let gw = gateway(&provider, &clock);

        let first = gw.resolve(&request("SPY")).await.unwrap();
        let second = gw.resolve(&request("SPY")).await.unwrap();
        assert_eq!(*first.provenance(), Provenance::Primary);
        assert_eq!(first.len(), 40);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(provider.calls().len(), 1);
    }

    #[tokio::test]
    async fn falls_back_to_proxy() {
        let provider = Arc::new(FakeProvider::new(&[("QQQ", 400.0)]));
        let clock = clock();
        let gw = gateway(&provider, &clock);

        let series = gw.resolve(&request("NQ=F")).await.unwrap();
        assert_eq!(series.symbol(), "NQ=F");
        assert_eq!(
            *series.provenance(),
            Provenance::Proxy {
                symbol: "QQQ".into()
            }
        );
        assert_eq!(series.last().unwrap().close, 439.0);
        assert_eq!(
            provider.calls(),
            vec![vec!["NQ=F".to_string()], vec!["QQQ".to_string()]]
        );
    }

    #[tokio::test]
    async fn upstream_error_also_advances_to_proxy() {
        let provider = Arc::new(FakeProvider::new(&[("QQQ", 400.0)]).failing("NQ=F"));
        let clock = clock();
        let gw = gateway(&provider, &clock);

        let series = gw.resolve(&request("NQ=F")).await.unwrap();
        assert!(matches!(series.provenance(), Provenance::Proxy { .. }));
    }

    #[tokio::test]
    async fn unknown_symbol_without_synthetic_is_no_data() {
        let provider = Arc::new(FakeProvider::new(&[]));
        let clock = clock();
        let gw = gateway(&provider, &clock);

        let err = gw.resolve(&request("ZZZZ-FAKE")).await.unwrap_err();
        assert_eq!(
            *err.current_context(),
            GatewayError::NoDataAvailable {
                symbol: "ZZZZ-FAKE".into()
            }
        );
    }

    #[tokio::test]
    async fn exhausted_proxy_is_no_data() {
        let provider = Arc::new(FakeProvider::new(&[]));
        let clock = clock();
        let gw = gateway(&provider, &clock);

        let err = gw.resolve(&request("NQ=F")).await.unwrap_err();
        assert!(matches!(
            err.current_context(),
            GatewayError::NoDataAvailable { .. }
        ));
        assert_eq!(provider.calls().len(), 2);
    }

    #[tokio::test]
    async fn synthetic_is_tagged_and_never_cached() {
        let provider = Arc::new(FakeProvider::new(&[]));
        let clock = clock();
        let gw = gateway(&provider, &clock);
        let req = request("DEAD").with_fallback(FallbackPolicy::AllowSynthetic);

        let series = gw.resolve(&req).await.unwrap();
        assert!(series.is_synthetic());
        assert_eq!(series.symbol(), "DEAD");
        assert_eq!(series.bars()[0].open, 42.0);
        assert!(series.last().unwrap().timestamp <= clock.now());

        gw.resolve(&req).await.unwrap();
        // primary + proxy on each resolve
        assert_eq!(provider.calls().len(), 4);
    }

    #[tokio::test]
    async fn intraday_entries_expire_after_ttl() {
        let provider = Arc::new(FakeProvider::new(&[("SPY", 450.0), ("^VIX", 15.0)]));
        let clock = clock();
        let gw = gateway(&provider, &clock);

        gw.resolve(&request("SPY")).await.unwrap();
        gw.resolve(&request("^VIX")).await.unwrap();
        clock.advance(Duration::seconds(61));
        gw.resolve(&request("SPY")).await.unwrap();
        gw.resolve(&request("^VIX")).await.unwrap();

        // SPY refetched, ^VIX still inside the macro TTL
        assert_eq!(provider.calls().len(), 3);
    }

    #[tokio::test]
    async fn daily_bars_use_macro_ttl() {
        let provider = Arc::new(FakeProvider::new(&[("SPY", 450.0)]));
        let clock = clock();
        let gw = gateway(&provider, &clock);
        let req = SeriesRequest::parse("SPY", "1d", "1y").unwrap();

        gw.resolve(&req).await.unwrap();
        clock.advance(Duration::seconds(120));
        gw.resolve(&req).await.unwrap();
        assert_eq!(provider.calls().len(), 1);
    }

    #[tokio::test]
    async fn refresh_bypasses_fresh_entry() {
        let provider = Arc::new(FakeProvider::new(&[("SPY", 450.0)]));
        let clock = clock();
        let gw = gateway(&provider, &clock);

        gw.resolve(&request("SPY")).await.unwrap();
        gw.resolve(&request("SPY").with_refresh(true)).await.unwrap();
        assert_eq!(provider.calls().len(), 2);
    }

    #[tokio::test]
    async fn modes_are_cached_separately() {
        let provider = Arc::new(FakeProvider::new(&[("SPY", 450.0)]));
        let clock = clock();
        let gw = gateway(&provider, &clock);

        gw.resolve(&request("SPY")).await.unwrap();
        let raw = gw
            .resolve(&request("SPY").with_mode(AcquisitionMode::Raw))
            .await
            .unwrap();
        assert_eq!(raw.mode(), AcquisitionMode::Raw);
        assert_eq!(provider.calls().len(), 2);
    }

    #[tokio::test]
    async fn expired_entry_served_stale_when_enabled() {
        let provider = Arc::new(FakeProvider::new(&[("SPY", 450.0)]));
        let clock = clock();
        let options = GatewayOptions {
            serve_stale_on_error: true,
            ..Default::default()
        };
        let gw = gateway_with(&provider, &clock, options);

        let fresh = gw.resolve(&request("SPY")).await.unwrap();
        assert!(!fresh.is_stale());

        provider.down.store(true, Ordering::SeqCst);
        clock.advance(Duration::seconds(61));
        let stale = gw.resolve(&request("SPY")).await.unwrap();
        assert!(stale.is_stale());
        assert_eq!(stale.bars(), fresh.bars());
    }

    #[tokio::test]
    async fn expired_entry_not_served_by_default() {
        let provider = Arc::new(FakeProvider::new(&[("SPY", 450.0)]));
        let clock = clock();
        let gw = gateway(&provider, &clock);

        gw.resolve(&request("SPY")).await.unwrap();
        provider.down.store(true, Ordering::SeqCst);
        clock.advance(Duration::seconds(61));
        assert!(gw.resolve(&request("SPY")).await.is_err());
        // the expired entry was evicted
        assert!(!gw.invalidate(&request("SPY")));
    }

    #[tokio::test]
    async fn slow_upstream_times_out() {
        let provider = Arc::new(
            FakeProvider::new(&[("SPY", 450.0)]).delayed(std::time::Duration::from_secs(5)),
        );
        let clock = clock();
        let options = GatewayOptions {
            request_timeout: std::time::Duration::from_millis(20),
            ..Default::default()
        };
        let gw = gateway_with(&provider, &clock, options);

        let err = gw.resolve(&request("SPY")).await.unwrap_err();
        assert!(matches!(
            err.current_context(),
            GatewayError::NoDataAvailable { .. }
        ));

        let synthetic = gw
            .resolve(&request("SPY").with_fallback(FallbackPolicy::AllowSynthetic))
            .await
            .unwrap();
        assert!(synthetic.is_synthetic());
    }

    #[tokio::test]
    async fn batch_issues_one_call_for_misses() {
        let provider = Arc::new(FakeProvider::new(&[("SPY", 450.0), ("QQQ", 400.0)]));
        let clock = clock();
        let gw = gateway(&provider, &clock);
        let symbols: Vec<String> = ["SPY", "QQQ", "ZZZZ-FAKE"]
            .into_iter()
            .map(String::from)
            .collect();

        let results = gw.resolve_batch(&symbols, &request("SPY")).await;
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().symbol(), "SPY");
        assert_eq!(results[1].as_ref().unwrap().symbol(), "QQQ");
        assert!(results[2].is_err());
        assert_eq!(provider.calls(), vec![symbols.clone()]);

        gw.resolve_batch(&symbols, &request("SPY")).await;
        assert_eq!(provider.calls().len(), 2);
        assert_eq!(provider.calls()[1], vec!["ZZZZ-FAKE".to_string()]);
    }

    #[tokio::test]
    async fn batch_rejects_empty_symbol_in_place() {
        let provider = Arc::new(FakeProvider::new(&[("SPY", 450.0)]));
        let clock = clock();
        let gw = gateway(&provider, &clock);
        let symbols = vec!["SPY".to_string(), "  ".to_string()];

        let results = gw.resolve_batch(&symbols, &request("SPY")).await;
        assert!(results[0].is_ok());
        assert_eq!(
            *results[1].as_ref().unwrap_err().current_context(),
            GatewayError::InvalidSymbol
        );
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let provider = Arc::new(FakeProvider::new(&[("SPY", 450.0)]));
        let clock = clock();
        let gw = gateway(&provider, &clock);

        gw.resolve(&request("SPY")).await.unwrap();
        assert!(gw.invalidate(&request("SPY")));
        assert!(!gw.invalidate(&request("SPY")));
        gw.resolve(&request("SPY")).await.unwrap();
        assert_eq!(gw.clear(), 1);
        gw.resolve(&request("SPY")).await.unwrap();
        assert_eq!(provider.calls().len(), 3);
    }

    #[tokio::test]
    async fn quote_for_known_and_unknown_symbols() {
        let provider = Arc::new(FakeProvider::new(&[("SPY", 450.0)]));
        let clock = clock();
        let gw = gateway(&provider, &clock);

        let quote = gw.quote("SPY").await.unwrap();
        assert_eq!(quote.last_price, Some(489.0));
        let err = gw.quote("ZZZZ-FAKE").await.unwrap_err();
        assert_eq!(
            *err.current_context(),
            GatewayError::QuoteUnavailable {
                symbol: "ZZZZ-FAKE".into()
            }
        );
        assert_eq!(
            *gw.quote("").await.unwrap_err().current_context(),
            GatewayError::InvalidSymbol
        );
    }

    #[test]
    fn request_validation() {
        let err = SeriesRequest::parse("SPY", "3m", "5d").unwrap_err();
        assert_eq!(
            *err.current_context(),
            GatewayError::InvalidInterval { value: "3m".into() }
        );
        let err = SeriesRequest::parse("SPY", "15m", "2d").unwrap_err();
        assert_eq!(
            *err.current_context(),
            GatewayError::InvalidRange { value: "2d".into() }
        );
        let err = SeriesRequest::parse("SPY", "1m", "1y").unwrap_err();
        assert!(matches!(
            err.current_context(),
            GatewayError::InvalidRange { .. }
        ));
        let err = SeriesRequest::parse("", "15m", "5d").unwrap_err();
        assert_eq!(*err.current_context(), GatewayError::InvalidSymbol);

        let ok = SeriesRequest::parse(" NQ=F ", "60m", "1mo").unwrap();
        assert_eq!(ok.symbol(), "NQ=F");
        assert_eq!(ok.interval(), Interval::Hour1);
        assert_eq!(ok.fallback(), FallbackPolicy::ProxyOnly);
    }
}
