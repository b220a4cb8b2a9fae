pub mod yahoo;

use error_stack::Report;
use futures::future::BoxFuture;

use crate::error::ProviderError;
use crate::model::{Interval, Quote, Range};

/// OHLCV field of a raw table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Open,
    High,
    Low,
    Close,
    Volume,
}

/// One column of a provider table.
///
/// Batch responses tag every column with the symbol it belongs to; single
/// symbol responses may leave `symbol` empty.
#[derive(Debug, Clone, PartialEq)]
pub struct RawColumn {
    pub field: Field,
    pub symbol: Option<String>,
    pub values: Vec<Option<f64>>,
}

/// Tabular provider response: a shared timestamp index (epoch seconds) and
/// any number of columns, possibly covering several symbols.
///
/// No rows is the only way a provider signals "nothing for this request".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub timestamps: Vec<i64>,
    pub columns: Vec<RawColumn>,
}

impl RawTable {
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// Upstream market-data source.
///
/// Uses `BoxFuture` (from `futures` crate) instead of `async fn` in trait
/// to keep the trait object-safe (`dyn MarketDataProvider`).
pub trait MarketDataProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch OHLCV rows for one or several symbols in a single call.
    fn fetch_history(
        &self,
        symbols: &[String],
        interval: Interval,
        range: Range,
    ) -> BoxFuture<'_, Result<RawTable, Report<ProviderError>>>;

    /// Best-effort scalar fields for one symbol.
    fn fetch_quote(&self, symbol: &str) -> BoxFuture<'_, Result<Quote, Report<ProviderError>>>;
}
