use crate::config::{Config, MoneyMode, SpreadPolicy};

use super::types::Side;

/// Currency value of a one-point move for one lot.
pub fn value_per_point(cfg: &Config) -> f64 {
    cfg.tick_value / cfg.tick_size
}

/// Snap a lot to the instrument's step grid and clamp it into
/// `[min_lot, max_lot]`. Rounding at the step granularity is half-to-even.
pub fn normalize_lot(lot: f64, cfg: &Config) -> f64 {
    let (min_lot, step) = cfg.lot_granularity();
    let stepped = (lot / step).round_ties_even() * step;
    stepped.clamp(min_lot, cfg.max_lot)
}

/// Risk-based lot: the lot whose stop-out loses `balance * risk_ratio`.
pub fn compute_lot(balance: f64, risk_ratio: f64, sl_points: f64, cfg: &Config) -> f64 {
    let raw = balance * risk_ratio / (sl_points * value_per_point(cfg));
    normalize_lot(raw, cfg)
}

/// Lot sizing under the configured money mode.
///
/// FIXED ignores account state entirely; the progressive modes scale the
/// effective risk fraction with the current loss streak before delegating to
/// [`compute_lot`].
pub fn compute_lot_with_mode(
    balance: f64,
    risk_pct: f64,
    sl_points: f64,
    loss_streak: u32,
    cfg: &Config,
) -> f64 {
    match cfg.money_mode {
        MoneyMode::Fixed => normalize_lot(cfg.fixed_lot, cfg),
        MoneyMode::Geometric => {
            let effective = risk_pct * (1.0 + cfg.step_percent).powi(loss_streak as i32);
            compute_lot(balance, effective, sl_points, cfg)
        }
        MoneyMode::Arithmetic => {
            let effective = risk_pct + cfg.step_percent * f64::from(loss_streak);
            compute_lot(balance, effective, sl_points, cfg)
        }
    }
}

/// Quote-time spread adjustment. Only the FULL policy moves the quote;
/// barrier-level handling lives in [`barrier_prices`].
pub fn apply_spread_policy(price: f64, side: Side, cfg: &Config) -> f64 {
    match cfg.spread_policy {
        SpreadPolicy::None | SpreadPolicy::SlOnly => price,
        SpreadPolicy::Full => price + cfg.spread() * side.sign(),
    }
}

/// Derive SL/TP barrier prices from an entry price and point distances,
/// then layer the spread policy: SL_ONLY shifts the stop by one spread,
/// FULL shifts both barriers. Signs are mirrored for SELL.
pub fn barrier_prices(
    entry: f64,
    side: Side,
    sl_points: f64,
    tp_points: f64,
    point: f64,
    spread_points: f64,
    policy: SpreadPolicy,
) -> (f64, f64) {
    let spread = spread_points * point;
    let (mut sl, mut tp) = match side {
        Side::Buy => (entry - sl_points * point, entry + tp_points * point),
        Side::Sell => (entry + sl_points * point, entry - tp_points * point),
    };
    if matches!(policy, SpreadPolicy::SlOnly | SpreadPolicy::Full) {
        sl -= spread * side.sign();
    }
    if matches!(policy, SpreadPolicy::Full) {
        tp -= spread * side.sign();
    }
    (sl, tp)
}

/// Round-turn commission for a trade of `lot`.
pub fn commission_for_trade(lot: f64, cfg: &Config) -> f64 {
    lot * cfg.commission_per_lot_round
}

/// Swap accrued over `days` rollover days.
pub fn swap_for_days(lot: f64, days: i64, is_long: bool, cfg: &Config) -> f64 {
    let rate = if is_long {
        cfg.swap_long_per_lot_day
    } else {
        cfg.swap_short_per_lot_day
    };
    lot * days as f64 * rate
}
