use tracing::{debug, info, warn};

use crate::report::{Reporter, Snapshot};
use crate::summary::Summary;

pub struct TerminalReporter;

fn flag_degraded(summary: &Summary, role: &str) {
    if summary.synthetic {
        warn!(
            symbol = %summary.symbol,
            role,
            "SIMULATED DATA: upstream and proxy unavailable, values are not real"
        );
    }
    if summary.stale {
        warn!(symbol = %summary.symbol, role, "serving expired data (upstream offline)");
    }
}

fn log_summary(summary: &Summary, role: &str) {
    info!(
        symbol = %summary.symbol,
        role,
        source = %summary.provenance,
        bars = summary.bars,
        last = ?summary.last_close,
        change_pct = ?summary.change_pct.map(|p| (p * 100.0).round() / 100.0),
        high = ?summary.range_high,
        low = ?summary.range_low,
        realized_vol = ?summary.realized_volatility,
        volume_surge = summary.volume_surge,
        "{}",
        summary.symbol,
    );
}

impl Reporter for TerminalReporter {
    fn report(&self, snapshot: &Snapshot) {
        if snapshot.is_degraded() {
            flag_degraded(&snapshot.summary, "primary");
            for peer in &snapshot.peers {
                flag_degraded(peer, "peer");
            }
        }
        log_summary(&snapshot.summary, "primary");
        for peer in &snapshot.peers {
            log_summary(peer, "peer");
        }
        if let Some(quote) = &snapshot.quote {
            info!(
                symbol = %quote.symbol,
                last = ?quote.last_price,
                previous_close = ?quote.previous_close,
                change_pct = ?quote.change_pct(),
                currency = ?quote.currency,
                "quote"
            );
        }
        for (name, value) in &snapshot.indicators {
            match value {
                Some(v) => info!(indicator = %name, value = *v, "indicator"),
                None => debug!(indicator = %name, "indicator warming up"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Provenance;
    use crate::report::testing::snapshot;

    #[test]
    fn terminal_reporter_does_not_panic() {
        TerminalReporter.report(&snapshot(Provenance::Primary));
        TerminalReporter.report(&snapshot(Provenance::Synthetic));
    }
}
