pub mod json;
pub mod terminal;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::engine::IndicatorBundle;
use crate::model::{Quote, Series};
use crate::summary::{Summary, summarize};

/// Everything one refresh of the dashboard produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub generated_at: DateTime<Utc>,
    pub interval: String,
    pub range: String,
    pub summary: Summary,
    /// Latest value of every indicator column; `None` while still warming up.
    pub indicators: BTreeMap<String, Option<f64>>,
    pub peers: Vec<Summary>,
    pub quote: Option<Quote>,
}

impl Snapshot {
    pub fn new(
        series: &Series,
        bundle: &IndicatorBundle,
        peers: &[&Series],
        quote: Option<Quote>,
        generated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            generated_at,
            interval: series.interval().to_string(),
            range: series.range().to_string(),
            summary: summarize(series),
            indicators: bundle
                .names()
                .map(|name| (name.to_owned(), bundle.latest(name)))
                .collect(),
            peers: peers.iter().map(|peer| summarize(peer)).collect(),
            quote,
        }
    }

    /// Any part of the snapshot that is not live upstream data.
    pub fn is_degraded(&self) -> bool {
        std::iter::once(&self.summary)
            .chain(&self.peers)
            .any(|s| s.synthetic || s.stale)
    }
}

/// Sink for dashboard snapshots.
pub trait Reporter: Send + Sync {
    fn report(&self, snapshot: &Snapshot);
}
