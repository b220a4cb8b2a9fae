use chrono::DateTime;
use error_stack::Report;

use crate::error::ProviderError;
use crate::model::{AcquisitionMode, Bar};
use crate::provider::{Field, RawColumn, RawTable};

fn malformed(provider: &str) -> ProviderError {
    ProviderError::MalformedResponse {
        provider: provider.into(),
    }
}

/// Reduce a provider table to the single-symbol bar sequence of `symbol`.
///
/// Columns tagged with `symbol` win; untagged columns are taken as belonging to
/// the only symbol requested. A batch that simply lacks `symbol` yields no
/// bars. The output is sorted by time with one bar per timestamp (the last
/// row wins).
///
/// In [`AcquisitionMode::Clean`] rows without a close are dropped, missing
/// open/high/low fall back to the close and missing volume reads as zero. In
/// [`AcquisitionMode::Raw`] every row is kept and missing values are NaN.
pub fn normalize(
    table: &RawTable,
    symbol: &str,
    mode: AcquisitionMode,
    provider: &str,
) -> Result<Vec<Bar>, Report<ProviderError>> {
    let tagged: Vec<&RawColumn> = table
        .columns
        .iter()
        .filter(|c| c.symbol.as_deref() == Some(symbol))
        .collect();
    let columns = if tagged.is_empty() {
        table.columns.iter().filter(|c| c.symbol.is_none()).collect()
    } else {
        tagged
    };
    if table.is_empty() || columns.is_empty() {
        return Ok(Vec::new());
    }

    let rows = table.timestamps.len();
    let mut by_field: [Option<&[Option<f64>]>; 5] = [None; 5];
    for column in &columns {
        if column.values.len() != rows {
            return Err(Report::new(malformed(provider)).attach(format!(
                "{symbol}: {:?} has {} values for {rows} timestamps",
                column.field,
                column.values.len()
            )));
        }
        let slot = &mut by_field[field_slot(column.field)];
        if slot.is_some() {
            return Err(Report::new(malformed(provider))
                .attach(format!("{symbol}: duplicate {:?} column", column.field)));
        }
        *slot = Some(&column.values);
    }
    let Some(close) = by_field[field_slot(Field::Close)] else {
        return Err(Report::new(malformed(provider)).attach(format!("{symbol}: no close column")));
    };
    let value = |field: Field, row: usize| by_field[field_slot(field)].and_then(|v| v[row]);

    let mut bars: Vec<Bar> = Vec::with_capacity(rows);
    for (row, &ts) in table.timestamps.iter().enumerate() {
        let timestamp = DateTime::from_timestamp(ts, 0).ok_or_else(|| {
            Report::new(malformed(provider)).attach(format!("{symbol}: bad timestamp {ts}"))
        })?;
        let open = value(Field::Open, row);
        let high = value(Field::High, row);
        let low = value(Field::Low, row);
        let volume = value(Field::Volume, row);

        let bar = match mode {
            AcquisitionMode::Clean => {
                let Some(c) = close[row].filter(|c| c.is_finite()) else {
                    continue;
                };
                let open = open.unwrap_or(c);
                Bar {
                    timestamp,
                    open,
                    high: high.unwrap_or(open.max(c)),
                    low: low.unwrap_or(open.min(c)),
                    close: c,
                    volume: volume.unwrap_or(0.0),
                }
            }
            AcquisitionMode::Raw => Bar {
                timestamp,
                open: open.unwrap_or(f64::NAN),
                high: high.unwrap_or(f64::NAN),
                low: low.unwrap_or(f64::NAN),
                close: close[row].unwrap_or(f64::NAN),
                volume: volume.unwrap_or(f64::NAN),
            },
        };
        bars.push(bar);
    }

    bars.sort_by_key(|b| b.timestamp);
    let mut deduped: Vec<Bar> = Vec::with_capacity(bars.len());
    for bar in bars {
        match deduped.last_mut() {
            Some(last) if last.timestamp == bar.timestamp => *last = bar,
            _ => deduped.push(bar),
        }
    }
    Ok(deduped)
}

fn field_slot(field: Field) -> usize {
    match field {
        Field::Open => 0,
        Field::High => 1,
        Field::Low => 2,
        Field::Close => 3,
        Field::Volume => 4,
    }
}
