mod clock;
mod config;
mod engine;
mod error;
mod gateway;
mod indicator;
mod model;
mod provider;
mod report;
mod summary;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use derive_more::{Display, Error};
use error_stack::{Report, ResultExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use clock::{Clock, SystemClock};
use config::AppConfig;
use engine::IndicatorSet;
use gateway::{FallbackPolicy, Gateway, GatewayOptions, InstrumentProfile, SeriesRequest};
use model::{AcquisitionMode, Provenance, Series};
use provider::yahoo::YahooProvider;
use report::json::JsonReporter;
use report::terminal::TerminalReporter;
use report::{Reporter, Snapshot};

#[derive(Debug, Display, Error)]
pub enum AppError {
    #[display("configuration error")]
    Config,
    #[display("market data provider error")]
    Provider,
    #[display("market data unavailable")]
    Gateway,
    #[display("indicator setup error")]
    Indicator,
    #[display("runtime error")]
    Runtime,
}

#[derive(Parser)]
#[command(name = "market-pulse", about = "Market data gateway and technical indicator dashboard")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
    /// Print snapshots as JSON lines on stdout instead of log lines
    #[arg(long)]
    json: bool,
    /// Keep rows with missing values (as NaN) instead of dropping them
    #[arg(long)]
    raw: bool,
    /// Drop cached series before every refresh pass
    #[arg(long)]
    refresh: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve the dashboard symbol once and report the latest readings (default)
    Snapshot,
    /// Refresh every `dashboard.refresh_secs` until ctrl+c
    Watch,
}

#[tokio::main]
async fn main() {
    if let Err(report) = run().await {
        eprintln!("{report:?}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Report<AppError>> {
    let cli = Cli::parse();
    let config = config::load(Path::new(&cli.config)).change_context(AppError::Config)?;

    init_tracing(&config);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let gateway = build_gateway(&config, Arc::clone(&clock))?;
    let reporter: Box<dyn Reporter> = if cli.json {
        Box::new(JsonReporter)
    } else {
        Box::new(TerminalReporter)
    };

    let dashboard = &config.dashboard;
    let fallback = if dashboard.allow_synthetic {
        FallbackPolicy::AllowSynthetic
    } else {
        FallbackPolicy::ProxyOnly
    };
    let mode = if cli.raw {
        AcquisitionMode::Raw
    } else {
        AcquisitionMode::Clean
    };
    let request = SeriesRequest::parse(&dashboard.symbol, &dashboard.interval, &dashboard.range)
        .change_context(AppError::Config)?
        .with_mode(mode)
        .with_fallback(fallback);
    let pass = Pass {
        gateway: &gateway,
        config: &config,
        request: &request,
        clock: clock.as_ref(),
        reporter: reporter.as_ref(),
        force_refresh: cli.refresh,
    };

    info!(
        symbol = %request.symbol(),
        interval = %request.interval(),
        range = %request.range(),
        mode = ?request.mode(),
        peers = ?dashboard.correlate_with,
        "market-pulse starting"
    );

    match cli.command.unwrap_or(Command::Snapshot) {
        Command::Snapshot => pass.refresh().await,
        Command::Watch => pass.watch().await,
    }
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::new(&config.general.log_level);
    // stdout carries JSON snapshots; logs go to stderr
    match config.general.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

fn build_gateway(config: &AppConfig, clock: Arc<dyn Clock>) -> Result<Gateway, Report<AppError>> {
    let settings = &config.gateway;
    let provider = YahooProvider::new(&settings.base_url, settings.requests_per_second)
        .change_context(AppError::Provider)?;

    let ttl = |secs: u64, field: &str| {
        chrono::Duration::from_std(Duration::from_secs(secs))
            .change_context(AppError::Config)
            .attach_with(|| format!("gateway.{field} = {secs}"))
    };
    let options = GatewayOptions {
        intraday_ttl: ttl(settings.intraday_ttl_secs, "intraday_ttl_secs")?,
        macro_ttl: ttl(settings.macro_ttl_secs, "macro_ttl_secs")?,
        request_timeout: Duration::from_secs(settings.request_timeout_secs),
        serve_stale_on_error: settings.serve_stale_on_error,
    };

    let instruments = config.instruments.iter().map(|i| InstrumentProfile {
        symbol: i.symbol.clone(),
        class: i.class,
        proxy: i.proxy.clone(),
        base_price: i.base_price,
    });

    Ok(Gateway::new(Arc::new(provider), clock, options, instruments))
}

/// Everything a refresh pass needs, borrowed from `run`.
struct Pass<'a> {
    gateway: &'a Gateway,
    config: &'a AppConfig,
    request: &'a SeriesRequest,
    clock: &'a dyn Clock,
    reporter: &'a dyn Reporter,
    force_refresh: bool,
}

impl Pass<'_> {
    /// One pass of resolve, compute and report.
    async fn refresh(&self) -> Result<(), Report<AppError>> {
        let gateway = self.gateway;
        let dashboard = &self.config.dashboard;

        // peers never fall back to synthetic data
        let peer_template = self.request.clone().with_fallback(FallbackPolicy::ProxyOnly);
        if self.force_refresh {
            self.invalidate(&peer_template)?;
        }

        let series = gateway
            .resolve(self.request)
            .await
            .change_context(AppError::Gateway)?;
        let peer_results = gateway
            .resolve_batch(&dashboard.correlate_with, &peer_template)
            .await;

        let mut set =
            IndicatorSet::from_config(&dashboard.indicators).change_context(AppError::Indicator)?;
        let mut peers: Vec<Arc<Series>> = Vec::new();
        for (symbol, result) in dashboard.correlate_with.iter().zip(peer_results) {
            match result {
                Ok(peer) => {
                    set = set
                        .with_correlation(
                            self.config.label_for(symbol),
                            Arc::clone(&peer),
                            dashboard.correlation_window,
                        )
                        .change_context(AppError::Indicator)?;
                    peers.push(peer);
                }
                Err(e) => warn!(symbol = %symbol, error = ?e, "peer unavailable, skipping correlation"),
            }
        }

        let bundle = engine::compute(&series, &set);
        debug!(
            symbol = %series.symbol(),
            bars = series.len(),
            as_of = ?bundle.timestamps().last(),
            warm_up = set.max_required_bars(),
            indicators = ?set.names(),
            columns = bundle.names().count(),
            "indicators computed"
        );

        let quote = if *series.provenance() == Provenance::Primary {
            match gateway.quote(series.symbol()).await {
                Ok(quote) => Some(quote),
                Err(e) => {
                    debug!(error = ?e, "quote unavailable");
                    None
                }
            }
        } else {
            None
        };

        let peer_refs: Vec<&Series> = peers.iter().map(Arc::as_ref).collect();
        let snapshot = Snapshot::new(&series, &bundle, &peer_refs, quote, self.clock.now());
        self.reporter.report(&snapshot);
        Ok(())
    }

    /// Drop the cached dashboard series and every peer series.
    fn invalidate(&self, peer_template: &SeriesRequest) -> Result<(), Report<AppError>> {
        let mut dropped = usize::from(self.gateway.invalidate(self.request));
        for symbol in &self.config.dashboard.correlate_with {
            let peer = peer_template
                .for_symbol(symbol)
                .change_context(AppError::Config)?;
            dropped += usize::from(self.gateway.invalidate(&peer));
        }
        debug!(dropped, "cached series invalidated");
        Ok(())
    }

    async fn watch(&self) -> Result<(), Report<AppError>> {
        let cancel = CancellationToken::new();
        let signal = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!(error = %e, "failed to listen for ctrl+c");
                }
                cancel.cancel();
            })
        };

        let mut ticker =
            tokio::time::interval(Duration::from_secs(self.config.dashboard.refresh_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.refresh().await {
                        error!(error = ?e, "refresh failed");
                    }
                }
            }
        }

        info!("ctrl+c received, shutting down");
        signal.await.change_context(AppError::Runtime)?;
        let dropped = self.gateway.clear();
        info!(cached_series = dropped, "shutdown complete");
        Ok(())
    }
}
