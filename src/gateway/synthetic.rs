use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::model::{Bar, Interval, Range};

const MIN_BARS: i64 = 2;
const MAX_BARS: i64 = 500;

/// Deterministic seed for a request, stable across runs and platforms.
fn seed_for(symbol: &str, interval: Interval, range: Range) -> u64 {
    // FNV-1a
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in symbol
        .bytes()
        .chain([b'|'])
        .chain(interval.as_str().bytes())
        .chain([b'|'])
        .chain(range.as_str().bytes())
    {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

fn bar_count(interval: Interval, range: Range) -> i64 {
    let Some(days) = range.max_days() else {
        return MAX_BARS;
    };
    let step = interval.duration().num_seconds().max(1);
    let span = Duration::days(days).num_seconds();
    ((span + step - 1) / step).clamp(MIN_BARS, MAX_BARS)
}

/// Simulated OHLCV bars: a geometric random walk starting at `base_price`.
///
/// Timestamps are evenly spaced at `interval`, the last one aligned down to
/// an interval boundary at or before `end`. The same inputs always produce
/// the same bars.
pub fn synthesize(
    symbol: &str,
    interval: Interval,
    range: Range,
    base_price: f64,
    volatility: f64,
    end: DateTime<Utc>,
) -> Vec<Bar> {
    let mut rng = StdRng::seed_from_u64(seed_for(symbol, interval, range));
    let step = interval.duration().num_seconds().max(1);
    let count = bar_count(interval, range);
    let last = end.timestamp() - end.timestamp().rem_euclid(step);
    let first = last - (count - 1) * step;

    let mut close = base_price;
    let mut bars = Vec::with_capacity(count as usize);
    for i in 0..count {
        let Some(timestamp) = DateTime::from_timestamp(first + i * step, 0) else {
            continue;
        };
        let open = close;
        let z: f64 = rng.sample(StandardNormal);
        close = open * (volatility * z).exp();

        let wick_up: f64 = rng.sample::<f64, _>(StandardNormal).abs() * volatility / 2.0;
        let wick_down: f64 = rng.sample::<f64, _>(StandardNormal).abs() * volatility / 2.0;
        bars.push(Bar {
            timestamp,
            open,
            high: open.max(close) * (1.0 + wick_up),
            low: open.min(close) * (1.0 - wick_down),
            close,
            volume: rng.gen_range(1_000.0..10_000.0_f64).round(),
        });
    }
    bars
}
