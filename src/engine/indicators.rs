use chrono::{DateTime, NaiveDateTime};

use crate::config::Config;
use crate::data::Bar;
use crate::error::{EngineError, Result};

/// Per-minute boolean signals derived from the M15 RSI. NaN warmup values
/// compare false on every flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MinuteFlags {
    pub overbought: bool,
    pub oversold: bool,
    pub reset: bool,
}

/// Indicator buffers shared read-only for the lifetime of a run. All vectors
/// are aligned with the minute bar index.
#[derive(Debug, Clone)]
pub struct IndicatorSet {
    pub rsi_m1: Vec<f64>,
    pub rsi_m15: Vec<f64>,
    pub rsi_h1: Vec<f64>,
    pub flags: Vec<MinuteFlags>,
}

/// Wilder RSI: gains and losses smoothed recursively with alpha = 1/period,
/// NaN during the `period`-sample warmup, then `100 - 100/(1+RS)`.
pub fn rsi_wilder(closes: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; closes.len()];
    if period == 0 || closes.len() < 2 {
        return out;
    }

    let alpha = 1.0 / period as f64;
    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    let mut samples = 0usize;

    for i in 1..closes.len() {
        let delta = closes[i] - closes[i - 1];
        let (gain, loss) = if delta > 0.0 {
            (delta, 0.0)
        } else {
            (0.0, -delta)
        };

        if samples == 0 {
            avg_gain = gain;
            avg_loss = loss;
        } else {
            avg_gain = alpha * gain + (1.0 - alpha) * avg_gain;
            avg_loss = alpha * loss + (1.0 - alpha) * avg_loss;
        }
        samples += 1;

        if samples >= period {
            out[i] = if avg_loss == 0.0 {
                if avg_gain == 0.0 {
                    50.0
                } else {
                    100.0
                }
            } else {
                let rs = avg_gain / avg_loss;
                100.0 - 100.0 / (1.0 + rs)
            };
        }
    }
    out
}

fn epoch_minutes(time: NaiveDateTime) -> i64 {
    time.and_utc().timestamp() / 60
}

fn from_epoch_minutes(minutes: i64) -> NaiveDateTime {
    DateTime::from_timestamp(minutes * 60, 0)
        .map(|dt| dt.naive_utc())
        .unwrap_or_default()
}

/// Aggregate minute bars to a right-closed, right-labeled higher timeframe:
/// a bar stamped `t` belongs to the window ending at the next multiple of
/// `minutes` (inclusive on the boundary). The trailing window is dropped
/// while it is still filling, so a resampled value never sees the future.
pub fn resample_ohlc(bars: &[Bar], minutes: u32) -> Vec<Bar> {
    let mut out: Vec<Bar> = Vec::new();
    let Some(last) = bars.last() else {
        return out;
    };
    let width = i64::from(minutes);
    let last_minute = epoch_minutes(last.time);

    for bar in bars {
        let t = epoch_minutes(bar.time);
        let label = (t + width - 1).div_euclid(width) * width;
        if label > last_minute {
            continue;
        }
        let label_time = from_epoch_minutes(label);
        match out.last_mut() {
            Some(current) if current.time == label_time => {
                current.high = current.high.max(bar.high);
                current.low = current.low.min(bar.low);
                current.close = bar.close;
            }
            _ => out.push(Bar {
                time: label_time,
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
            }),
        }
    }
    out
}

/// Project a higher-timeframe series onto the minute grid: each minute takes
/// the value of the latest label at or before it, NaN before the first.
fn forward_fill(bars: &[Bar], labels: &[Bar], values: &[f64]) -> Vec<f64> {
    let mut out = vec![f64::NAN; bars.len()];
    let mut j = 0usize;
    let mut current = f64::NAN;
    for (i, bar) in bars.iter().enumerate() {
        while j < labels.len() && labels[j].time <= bar.time {
            current = values[j];
            j += 1;
        }
        out[i] = current;
    }
    out
}

/// Compute the base, M15, and H1 RSI buffers plus the per-minute flag table.
pub fn compute_rsi_and_flags(bars: &[Bar], cfg: &Config) -> Result<IndicatorSet> {
    if bars.is_empty() {
        return Err(EngineError::Simulation("empty bar series".to_string()));
    }
    let period = cfg.rsi_period as usize;
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let rsi_m1 = rsi_wilder(&closes, period);

    let m15 = resample_ohlc(bars, 15);
    let m15_closes: Vec<f64> = m15.iter().map(|b| b.close).collect();
    let rsi_m15 = forward_fill(bars, &m15, &rsi_wilder(&m15_closes, period));

    let h1 = resample_ohlc(bars, 60);
    let h1_closes: Vec<f64> = h1.iter().map(|b| b.close).collect();
    let rsi_h1 = forward_fill(bars, &h1, &rsi_wilder(&h1_closes, period));

    let flags = rsi_m15
        .iter()
        .map(|&rsi| MinuteFlags {
            overbought: rsi >= cfg.overbought,
            oversold: rsi <= cfg.oversold,
            reset: rsi >= cfg.reset_level,
        })
        .collect();

    Ok(IndicatorSet {
        rsi_m1,
        rsi_m15,
        rsi_h1,
        flags,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support::sample_config;
    use chrono::NaiveDate;

    fn minute_bars(closes: &[f64]) -> Vec<Bar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 1, 0)
            .unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                time: start + chrono::Duration::minutes(i as i64),
                open: close,
                high: close + 0.5,
                low: close - 0.5,
                close,
            })
            .collect()
    }

    #[test]
    fn rsi_warmup_is_nan() {
        let closes: Vec<f64> = (0..20).map(f64::from).collect();
        let rsi = rsi_wilder(&closes, 14);
        assert!(rsi[..14].iter().all(|v| v.is_nan()));
        assert!(rsi[14..].iter().all(|v| v.is_finite()));
    }

    #[test]
    fn rsi_monotonic_up_is_100() {
        let closes: Vec<f64> = (0..20).map(f64::from).collect();
        let rsi = rsi_wilder(&closes, 14);
        assert!((rsi[19] - 100.0).abs() < 1e-9);
    }

    #[test]
    fn rsi_monotonic_down_is_0() {
        let closes: Vec<f64> = (0..20).map(|i| f64::from(100 - i)).collect();
        let rsi = rsi_wilder(&closes, 14);
        assert!(rsi[19].abs() < 1e-9);
    }

    #[test]
    fn rsi_flat_series_is_50() {
        let closes = vec![5.0; 20];
        let rsi = rsi_wilder(&closes, 14);
        assert!((rsi[19] - 50.0).abs() < 1e-9);
    }

    #[test]
    fn resample_aggregates_right_closed() {
        // Minutes 00:01..=00:30 -> two full 15-minute windows labeled
        // 00:15 and 00:30.
        let bars = minute_bars(&(1..=30).map(f64::from).collect::<Vec<_>>());
        let m15 = resample_ohlc(&bars, 15);
        assert_eq!(m15.len(), 2);
        assert_eq!(
            m15[0].time,
            NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 15, 0)
                .unwrap()
        );
        assert!((m15[0].open - 1.0).abs() < 1e-12);
        assert!((m15[0].close - 15.0).abs() < 1e-12);
        assert!((m15[0].high - 15.5).abs() < 1e-12);
        assert!((m15[0].low - 0.5).abs() < 1e-12);
        assert!((m15[1].close - 30.0).abs() < 1e-12);
    }

    #[test]
    fn resample_drops_trailing_partial_window() {
        let bars = minute_bars(&(1..=20).map(f64::from).collect::<Vec<_>>());
        let m15 = resample_ohlc(&bars, 15);
        // Minutes 16..=20 sit in the unfinished (00:15, 00:30] window.
        assert_eq!(m15.len(), 1);
    }

    #[test]
    fn forward_fill_aligns_to_minute_grid() {
        let bars = minute_bars(&(1..=30).map(f64::from).collect::<Vec<_>>());
        let m15 = resample_ohlc(&bars, 15);
        let values = vec![10.0, 20.0];
        let filled = forward_fill(&bars, &m15, &values);
        // Minutes before the first label are NaN.
        assert!(filled[..14].iter().all(|v| v.is_nan()));
        // Minute 00:15 (index 14) takes the first label's value.
        assert!((filled[14] - 10.0).abs() < 1e-12);
        assert!((filled[28] - 10.0).abs() < 1e-12);
        assert!((filled[29] - 20.0).abs() < 1e-12);
    }

    #[test]
    fn flags_follow_m15_rsi_and_nan_is_false() {
        let mut cfg = sample_config();
        cfg.rsi_period = 2;
        // 16 * 15 = 240 minutes of rising closes: M15 RSI pegs at 100.
        let bars = minute_bars(&(1..=240).map(f64::from).collect::<Vec<_>>());
        let set = compute_rsi_and_flags(&bars, &cfg).unwrap();
        assert_eq!(set.flags.len(), bars.len());
        let first = set.flags[0];
        assert!(!first.overbought && !first.oversold && !first.reset);
        let last = *set.flags.last().unwrap();
        assert!(last.overbought);
        assert!(last.reset);
        assert!(!last.oversold);
    }

    #[test]
    fn indicator_lengths_share_the_bar_index() {
        let cfg = sample_config();
        let bars = minute_bars(&(1..=100).map(f64::from).collect::<Vec<_>>());
        let set = compute_rsi_and_flags(&bars, &cfg).unwrap();
        assert_eq!(set.rsi_m1.len(), bars.len());
        assert_eq!(set.rsi_m15.len(), bars.len());
        assert_eq!(set.rsi_h1.len(), bars.len());
    }

    #[test]
    fn empty_series_is_an_error() {
        let cfg = sample_config();
        assert!(compute_rsi_and_flags(&[], &cfg).is_err());
    }
}
