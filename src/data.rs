use std::path::Path;

use chrono::NaiveDateTime;
use polars::prelude::*;

use crate::error::{EngineError, Result};

/// One minute OHLC record. All prices are finite by construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    pub time: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

const TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y.%m.%d %H:%M",
    "%Y-%m-%d %H:%M",
];

/// Extract a `NaiveDateTime` from the `time` column at a given index.
/// Handles both Datetime and String column types.
fn extract_time(col: &Column, idx: usize) -> Result<NaiveDateTime> {
    match col.dtype() {
        DataType::Datetime(tu, _) => {
            let val = col.datetime()?.phys.get(idx);
            let Some(v) = val else {
                return Err(EngineError::Simulation(format!("null time at row {idx}")));
            };
            let ndt = match tu {
                TimeUnit::Milliseconds => {
                    chrono::DateTime::from_timestamp_millis(v).map(|dt| dt.naive_utc())
                }
                TimeUnit::Microseconds => {
                    chrono::DateTime::from_timestamp_micros(v).map(|dt| dt.naive_utc())
                }
                TimeUnit::Nanoseconds => {
                    let secs = v / 1_000_000_000;
                    let nsecs = (v % 1_000_000_000) as u32;
                    chrono::DateTime::from_timestamp(secs, nsecs).map(|dt| dt.naive_utc())
                }
            };
            ndt.ok_or_else(|| EngineError::Simulation(format!("invalid time value at row {idx}")))
        }
        DataType::String => {
            let val = col.str()?.get(idx);
            let Some(text) = val else {
                return Err(EngineError::Simulation(format!("null time at row {idx}")));
            };
            for fmt in TIME_FORMATS {
                if let Ok(parsed) = NaiveDateTime::parse_from_str(text, fmt) {
                    return Ok(parsed);
                }
            }
            Err(EngineError::Simulation(format!(
                "unparseable time at row {idx}: {text}"
            )))
        }
        other => Err(EngineError::Simulation(format!(
            "unsupported time column type: {other:?}"
        ))),
    }
}

fn price_column(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let col = df.column(name)?.cast(&DataType::Float64)?;
    let ca = col.f64()?;
    let mut out = Vec::with_capacity(df.height());
    for idx in 0..df.height() {
        let Some(v) = ca.get(idx) else {
            return Err(EngineError::Simulation(format!(
                "null {name} at row {idx}"
            )));
        };
        if !v.is_finite() {
            return Err(EngineError::Simulation(format!(
                "non-finite {name} at row {idx}: {v}"
            )));
        }
        out.push(v);
    }
    Ok(out)
}

/// Load a bar series from CSV with columns `time, open, high, low, close`.
/// Bars are sorted ascending by timestamp; duplicate timestamps and
/// non-finite prices are rejected.
pub fn load_bars(path: impl AsRef<Path>) -> Result<Vec<Bar>> {
    let path = path.as_ref();
    let path_str = path.to_string_lossy().to_string();
    let df = LazyCsvReader::new(path_str.as_str().into())
        .with_has_header(true)
        .finish()?
        .collect()?;

    let times_col = df.column("time")?;
    let opens = price_column(&df, "open")?;
    let highs = price_column(&df, "high")?;
    let lows = price_column(&df, "low")?;
    let closes = price_column(&df, "close")?;

    let mut bars = Vec::with_capacity(df.height());
    for idx in 0..df.height() {
        bars.push(Bar {
            time: extract_time(times_col, idx)?,
            open: opens[idx],
            high: highs[idx],
            low: lows[idx],
            close: closes[idx],
        });
    }

    bars.sort_by_key(|bar| bar.time);
    for pair in bars.windows(2) {
        if pair[0].time == pair[1].time {
            return Err(EngineError::Simulation(format!(
                "duplicate timestamp in bar data: {}",
                pair[0].time
            )));
        }
    }

    tracing::debug!(rows = bars.len(), path = %path.display(), "loaded bar series");
    Ok(bars)
}
