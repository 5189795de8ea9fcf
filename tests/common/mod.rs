use chrono::{NaiveDate, NaiveDateTime};

use barsim::config::{Config, MoneyMode, OhlcOrder, SpreadPolicy};
use barsim::data::Bar;

/// Baseline valid configuration for end-to-end tests: point 0.01, no costs,
/// 10-point stop with rr 2.
pub fn test_config() -> Config {
    Config {
        symbol: "USDJPY".to_string(),
        timezone: "UTC".to_string(),
        dst: false,
        data_path: "data".to_string(),
        point: 0.01,
        tick_size: 0.01,
        tick_value: 1.0,
        min_lot: 0.1,
        lot_step: 0.1,
        max_lot: 1.0,
        ft6_mode: false,
        spread_policy: SpreadPolicy::None,
        fixed_spread_point: 0,
        commission_per_lot_round: 0.0,
        swap_long_per_lot_day: 0.0,
        swap_short_per_lot_day: 0.0,
        money_mode: MoneyMode::Fixed,
        risk_ratio: 0.01,
        step_percent: 0.5,
        base_balance: 10_000.0,
        fixed_lot: 0.1,
        stoploss_points: 10,
        rr: 2.0,
        enable_trailing_stop: false,
        trailing_start_ratio: 0.5,
        trailing_width_points: 10,
        rsi_period: 14,
        overbought: 70.0,
        oversold: 30.0,
        reset_level: 50.0,
        loss_streak_max: 3,
        ohlc_order: OhlcOrder::OpenHighLowClose,
        batch_size: 4,
        chunk_years: 1,
    }
}

pub fn minute(offset: i64) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        + chrono::Duration::minutes(offset)
}

pub fn bar(offset: i64, open: f64, high: f64, low: f64, close: f64) -> Bar {
    Bar {
        time: minute(offset),
        open,
        high,
        low,
        close,
    }
}
