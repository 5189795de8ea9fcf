use chrono::NaiveDateTime;

use crate::config::OhlcOrder;
use crate::data::Bar;

/// Expand one OHLC bar into the four synthetic prices visited in `order`.
pub fn ohlc_to_ticks(open: f64, high: f64, low: f64, close: f64, order: OhlcOrder) -> [f64; 4] {
    match order {
        OhlcOrder::OpenHighLowClose => [open, high, low, close],
        OhlcOrder::OpenLowHighClose => [open, low, high, close],
    }
}

/// Iterate bars as `(timestamp, synthetic tick path)` in series order.
pub fn iter_minute_paths(
    bars: &[Bar],
    order: OhlcOrder,
) -> impl Iterator<Item = (NaiveDateTime, [f64; 4])> + '_ {
    bars.iter()
        .map(move |bar| (bar.time, ohlc_to_ticks(bar.open, bar.high, bar.low, bar.close, order)))
}
