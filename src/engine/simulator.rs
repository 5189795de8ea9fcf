use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::data::Bar;
use crate::error::Result;
use crate::strategy::Strategy;

use super::actions::{validate_actions, Action};
use super::context::MinuteContext;
use super::execution::{barrier_prices, commission_for_trade, value_per_point};
use super::hit::{resolve_segment, HitEvent};
use super::indicators::compute_rsi_and_flags;
use super::state::{PendingOrder, Position, RunState, Trailing};
use super::ticks::iter_minute_paths;
use super::types::{Side, TradeOutcome, TradeRecord};

/// Outcome of a full single-run simulation.
#[derive(Debug, Clone)]
pub struct SimulationResult {
    pub trades: Vec<TradeRecord>,
    pub final_balance: f64,
}

fn ask_path(bid: &[f64; 4], spread: f64) -> [f64; 4] {
    [
        bid[0] + spread,
        bid[1] + spread,
        bid[2] + spread,
        bid[3] + spread,
    ]
}

/// Path of the book side a position is adjudicated against: bid for BUY,
/// ask for SELL.
fn book_path(side: Side, bid: &[f64; 4], spread: f64) -> [f64; 4] {
    match side {
        Side::Buy => *bid,
        Side::Sell => ask_path(bid, spread),
    }
}

#[allow(clippy::too_many_arguments)]
fn open_position(
    state: &mut RunState,
    side: Side,
    lot: f64,
    entry: f64,
    sl: Option<f64>,
    tp: Option<f64>,
    opened_at: NaiveDateTime,
    cfg: &Config,
) {
    let sl_points = sl.map_or(f64::from(cfg.stoploss_points), |price| {
        (entry - price).abs() / cfg.point
    });
    let (derived_sl, derived_tp) = barrier_prices(
        entry,
        side,
        sl_points,
        cfg.rr * sl_points,
        cfg.point,
        f64::from(cfg.fixed_spread_point),
        cfg.spread_policy,
    );
    let ticket = state.next_ticket();
    let trailing = cfg.enable_trailing_stop.then_some(Trailing {
        start_ratio: cfg.trailing_start_ratio,
        width_points: f64::from(cfg.trailing_width_points),
        best: entry,
    });
    state.position = Some(Position {
        ticket,
        side,
        open_price: entry,
        sl: sl.unwrap_or(derived_sl),
        tp: tp.unwrap_or(derived_tp),
        lot,
        sl_points,
        opened_at,
        trailing,
    });
    state.lock_side(side);
    debug!(ticket, ?side, entry, lot, "position opened");
}

fn close_trade(
    state: &mut RunState,
    trades: &mut Vec<TradeRecord>,
    exit_price: f64,
    outcome: TradeOutcome,
    time: NaiveDateTime,
    cfg: &Config,
) {
    let Some(position) = state.position.take() else {
        return;
    };
    let pnl_points = (exit_price - position.open_price) / cfg.point * position.side.sign();
    let pnl_currency =
        pnl_points * value_per_point(cfg) * position.lot - commission_for_trade(position.lot, cfg);
    state.update_after_trade(pnl_currency, cfg);
    trades.push(TradeRecord {
        time,
        outcome,
        exit_price,
        pnl_points,
        pnl_currency,
    });
    debug!(
        ticket = position.ticket,
        result = outcome.as_str(),
        pnl_points,
        pnl_currency,
        "position closed"
    );
}

fn apply_action(
    action: &Action,
    state: &mut RunState,
    trades: &mut Vec<TradeRecord>,
    bid: &[f64; 4],
    time: NaiveDateTime,
    cfg: &Config,
) {
    let spread = cfg.spread();
    match action {
        Action::Open { side, lot, sl, tp } => {
            if state.position.is_some() {
                warn!(?side, "OPEN ignored: a position is already held");
                return;
            }
            let entry = match side {
                Side::Buy => bid[0],
                Side::Sell => bid[0] + spread,
            };
            open_position(state, *side, *lot, entry, *sl, *tp, time, cfg);
        }
        Action::Close { ticket } => {
            let live = state.position.as_ref().map(|p| (p.ticket, p.side));
            match live {
                Some((live_ticket, side)) if live_ticket == *ticket => {
                    let exit = match side {
                        Side::Buy => bid[0],
                        Side::Sell => bid[0] + spread,
                    };
                    close_trade(state, trades, exit, TradeOutcome::Manual, time, cfg);
                }
                Some((live_ticket, _)) => {
                    warn!(
                        ticket,
                        live = live_ticket,
                        "CLOSE ignored: ticket does not match the live position"
                    );
                }
                None => warn!(ticket, "CLOSE ignored: no position is held"),
            }
        }
        Action::Modify { ticket, sl, tp } => match state.position.as_mut() {
            Some(position) if position.ticket == *ticket => {
                if let Some(sl) = sl {
                    position.sl = *sl;
                }
                if let Some(tp) = tp {
                    position.tp = *tp;
                }
            }
            _ => warn!(ticket, "MODIFY ignored: no matching position"),
        },
        Action::SetTrailing {
            ticket,
            start_ratio,
        } => match state.position.as_mut() {
            Some(position) if position.ticket == *ticket => {
                position.trailing = Some(Trailing {
                    start_ratio: start_ratio.unwrap_or(cfg.trailing_start_ratio),
                    width_points: f64::from(cfg.trailing_width_points),
                    best: position.open_price,
                });
            }
            _ => warn!(ticket, "SET_TRAILING ignored: no matching position"),
        },
        Action::PendingOpen { side, lot, price } => {
            let ticket = state.next_ticket();
            state.pending.push(PendingOrder {
                ticket,
                side: *side,
                lot: *lot,
                price: *price,
            });
            debug!(ticket, ?side, price, "pending order placed");
        }
        Action::CancelPending { ticket } => {
            let before = state.pending.len();
            state.pending.retain(|order| order.ticket != *ticket);
            if state.pending.len() == before {
                warn!(ticket, "CANCEL_PENDING ignored: no such order");
            }
        }
        Action::Nop => {}
    }
}

/// Fill the first pending order whose trigger price lies on the current
/// bar's book-side path, then adjudicate the remainder of the bar against
/// the fresh position, the way a fresh OPEN is adjudicated from its entry
/// tick. Pending orders never expire on their own. Returns whether a fill
/// happened; the caller must not adjudicate the bar a second time.
fn trigger_pending(
    state: &mut RunState,
    trades: &mut Vec<TradeRecord>,
    bid: &[f64; 4],
    time: NaiveDateTime,
    cfg: &Config,
) -> bool {
    if state.position.is_some() {
        return false;
    }
    let spread = cfg.spread();
    let mut fill: Option<(usize, usize)> = None;
    'orders: for (idx, order) in state.pending.iter().enumerate() {
        let path = book_path(order.side, bid, spread);
        for seg in 0..3 {
            let (lo, hi) = if path[seg] <= path[seg + 1] {
                (path[seg], path[seg + 1])
            } else {
                (path[seg + 1], path[seg])
            };
            if (lo..=hi).contains(&order.price) {
                fill = Some((idx, seg));
                break 'orders;
            }
        }
    }
    let Some((idx, seg)) = fill else {
        return false;
    };
    let order = state.pending.remove(idx);
    debug!(
        ticket = order.ticket,
        price = order.price,
        "pending order triggered"
    );
    open_position(
        state, order.side, order.lot, order.price, None, None, time, cfg,
    );

    // The rest of the bar, split at the fill price inside the fill segment.
    let path = book_path(order.side, bid, spread);
    let mut remainder = Vec::with_capacity(4 - seg);
    remainder.push(order.price);
    remainder.extend_from_slice(&path[seg + 1..]);
    resolve_path(state, trades, &remainder, time, cfg);
    true
}

/// Adjudicate consecutive path points against the live position. Trailing
/// advances are folded in point by point, before each segment is resolved.
fn resolve_path(
    state: &mut RunState,
    trades: &mut Vec<TradeRecord>,
    points: &[f64],
    time: NaiveDateTime,
    cfg: &Config,
) {
    let Some(position) = state.position.as_mut() else {
        return;
    };

    let mut hit = None;
    for k in 0..points.len().saturating_sub(1) {
        position.advance_trailing(points[k], cfg.point);
        if let Some(event) =
            resolve_segment(position.side, points[k], points[k + 1], position.sl, position.tp)
        {
            hit = Some(event);
            break;
        }
    }

    let exit = match hit {
        Some(HitEvent::TakeProfit) => Some((position.tp, TradeOutcome::Tp)),
        Some(HitEvent::StopLoss) => Some((position.sl, TradeOutcome::Sl)),
        None => {
            if let Some(&last) = points.last() {
                position.advance_trailing(last, cfg.point);
            }
            None
        }
    };
    if let Some((price, outcome)) = exit {
        close_trade(state, trades, price, outcome, time, cfg);
    }
}

/// Adjudicate the current bar's full path against the live position.
fn resolve_bar(
    state: &mut RunState,
    trades: &mut Vec<TradeRecord>,
    bid: &[f64; 4],
    time: NaiveDateTime,
    cfg: &Config,
) {
    let Some(side) = state.position.as_ref().map(|p| p.side) else {
        return;
    };
    let path = book_path(side, bid, cfg.spread());
    resolve_path(state, trades, &path, time, cfg);
}

/// Drive the minute loop over the full bar series. The per-bar event order
/// is fixed: flags, context, strategy, validation, actions, pending
/// triggers, trailing + hit resolution, state update, trade append.
pub fn run_simulation(
    bars: &[Bar],
    cfg: &Config,
    strategy: &mut dyn Strategy,
) -> Result<SimulationResult> {
    let indicators = compute_rsi_and_flags(bars, cfg)?;
    let mut state = RunState::new(cfg);
    let mut trades: Vec<TradeRecord> = Vec::new();
    let spread = cfg.spread();

    for (i, (time, bid)) in iter_minute_paths(bars, cfg.ohlc_order).enumerate() {
        let flags = indicators.flags[i];
        if flags.reset {
            state.clear_locks();
        }

        let ctx = MinuteContext {
            bid: bid[0],
            ask: bid[0] + spread,
            point: cfg.point,
            rsi_m15: &indicators.rsi_m15[..=i],
            rsi_h1: &indicators.rsi_h1[..=i],
            flags,
            state: state.view(),
            cfg,
        };
        let actions = strategy.emit_actions(i, &ctx);
        validate_actions(&actions)?;

        for action in &actions {
            apply_action(action, &mut state, &mut trades, &bid, time, cfg);
        }
        // A pending fill adjudicates its own remainder of the bar.
        let filled_from_pending = trigger_pending(&mut state, &mut trades, &bid, time, cfg);
        if !filled_from_pending {
            resolve_bar(&mut state, &mut trades, &bid, time, cfg);
        }
    }

    // Flatten whatever is still open at the end of the series.
    if let Some(side) = state.position.as_ref().map(|p| p.side) {
        let last = bars.last().expect("non-empty series");
        let exit = match side {
            Side::Buy => last.close,
            Side::Sell => last.close + spread,
        };
        close_trade(
            &mut state,
            &mut trades,
            exit,
            TradeOutcome::Timeout,
            last.time,
            cfg,
        );
    }

    info!(
        trades = trades.len(),
        balance = state.balance,
        "simulation finished"
    );
    Ok(SimulationResult {
        trades,
        final_balance: state.balance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support::sample_config;

    use chrono::NaiveDate;

    fn bar(minute: i64, open: f64, high: f64, low: f64, close: f64) -> Bar {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        Bar {
            time: start + chrono::Duration::minutes(minute),
            open,
            high,
            low,
            close,
        }
    }

    /// Emits a fixed script of action lists, one per minute.
    struct Scripted {
        script: Vec<Vec<Action>>,
    }

    impl Strategy for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn emit_actions(&mut self, i_minute: usize, _ctx: &MinuteContext<'_>) -> Vec<Action> {
            self.script.get(i_minute).cloned().unwrap_or_default()
        }
    }

    fn open_buy(lot: f64) -> Vec<Action> {
        vec![Action::Open {
            side: Side::Buy,
            lot,
            sl: None,
            tp: None,
        }]
    }

    #[test]
    fn buy_tp_within_opening_bar() {
        // Entry at 100, SL 10 pts = 99.9, TP 20 pts = 100.2 (rr 2). The
        // opening rally through 100.3 serves TP in the first segment.
        let cfg = sample_config();
        let bars = vec![bar(0, 100.0, 100.3, 99.95, 100.1)];
        let mut strategy = Scripted {
            script: vec![open_buy(0.1)],
        };
        let result = run_simulation(&bars, &cfg, &mut strategy).unwrap();
        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.outcome, TradeOutcome::Tp);
        assert!((trade.exit_price - 100.2).abs() < 1e-12);
        assert!((trade.pnl_points - 20.0).abs() < 1e-9);
        // 20 pts * 100 per point * 0.1 lot = 200 currency, no commission.
        assert!((trade.pnl_currency - 200.0).abs() < 1e-9);
        assert!((result.final_balance - 10_200.0).abs() < 1e-9);
    }

    #[test]
    fn sl_hit_increments_loss_streak() {
        let cfg = sample_config();
        let bars = vec![
            bar(0, 100.0, 100.05, 99.95, 100.0),
            bar(1, 100.0, 100.02, 99.8, 99.85),
        ];
        let mut strategy = Scripted {
            script: vec![open_buy(0.1)],
        };
        let result = run_simulation(&bars, &cfg, &mut strategy).unwrap();
        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].outcome, TradeOutcome::Sl);
        assert!((result.trades[0].pnl_points + 10.0).abs() < 1e-9);
        assert!(result.final_balance < 10_000.0);
    }

    #[test]
    fn open_while_positioned_is_ignored() {
        let cfg = sample_config();
        let bars = vec![
            bar(0, 100.0, 100.05, 99.95, 100.0),
            bar(1, 100.0, 100.05, 99.95, 100.0),
        ];
        let mut strategy = Scripted {
            script: vec![open_buy(0.1), open_buy(0.5)],
        };
        let result = run_simulation(&bars, &cfg, &mut strategy).unwrap();
        // Neither barrier is reached: a single TIMEOUT close of the original
        // 0.1-lot position.
        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].outcome, TradeOutcome::Timeout);
    }

    #[test]
    fn manual_close_while_flat_is_a_noop() {
        let cfg = sample_config();
        let bars = vec![bar(0, 100.0, 100.05, 99.95, 100.0)];
        let mut strategy = Scripted {
            script: vec![vec![Action::Close { ticket: 7 }]],
        };
        let result = run_simulation(&bars, &cfg, &mut strategy).unwrap();
        assert!(result.trades.is_empty());
    }

    #[test]
    fn manual_close_records_manual_outcome() {
        let cfg = sample_config();
        let bars = vec![
            bar(0, 100.0, 100.05, 99.95, 100.0),
            bar(1, 100.1, 100.12, 100.05, 100.1),
        ];
        let mut strategy = Scripted {
            script: vec![open_buy(0.1), vec![Action::Close { ticket: 1 }]],
        };
        let result = run_simulation(&bars, &cfg, &mut strategy).unwrap();
        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.outcome, TradeOutcome::Manual);
        assert!((trade.exit_price - 100.1).abs() < 1e-12);
        assert!((trade.pnl_points - 10.0).abs() < 1e-9);
    }

    #[test]
    fn timeout_flattens_at_series_end() {
        let cfg = sample_config();
        let bars = vec![
            bar(0, 100.0, 100.05, 99.95, 100.0),
            bar(1, 100.0, 100.08, 99.98, 100.05),
        ];
        let mut strategy = Scripted {
            script: vec![open_buy(0.1)],
        };
        let result = run_simulation(&bars, &cfg, &mut strategy).unwrap();
        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.outcome, TradeOutcome::Timeout);
        assert!((trade.exit_price - 100.05).abs() < 1e-12);
    }

    #[test]
    fn explicit_barriers_override_derived_ones() {
        let cfg = sample_config();
        let bars = vec![bar(0, 100.0, 100.5, 99.9, 100.4)];
        let mut strategy = Scripted {
            script: vec![vec![Action::Open {
                side: Side::Buy,
                lot: 0.1,
                sl: Some(99.0),
                tp: Some(100.45),
            }]],
        };
        let result = run_simulation(&bars, &cfg, &mut strategy).unwrap();
        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].outcome, TradeOutcome::Tp);
        assert!((result.trades[0].exit_price - 100.45).abs() < 1e-12);
    }

    #[test]
    fn invalid_action_aborts_the_run() {
        let cfg = sample_config();
        let bars = vec![bar(0, 100.0, 100.05, 99.95, 100.0)];
        let mut strategy = Scripted {
            script: vec![vec![Action::Open {
                side: Side::Buy,
                lot: -1.0,
                sl: None,
                tp: None,
            }]],
        };
        assert!(run_simulation(&bars, &cfg, &mut strategy).is_err());
    }

    #[test]
    fn pending_fill_is_adjudicated_in_the_trigger_bar() {
        let cfg = sample_config();
        let bars = vec![
            bar(0, 100.0, 100.05, 99.95, 100.0),
            bar(1, 100.0, 100.04, 99.97, 100.0),
            bar(2, 100.0, 100.3, 99.98, 100.25),
        ];
        let mut strategy = Scripted {
            script: vec![vec![Action::PendingOpen {
                side: Side::Buy,
                lot: 0.1,
                price: 100.25,
            }]],
        };
        let result = run_simulation(&bars, &cfg, &mut strategy).unwrap();
        // Filled at 100.25 inside the third bar's rally; the slide to the
        // low then stops the fresh position out within the same bar.
        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].outcome, TradeOutcome::Sl);
        assert!((result.trades[0].exit_price - 100.15).abs() < 1e-9);
        assert!((result.trades[0].pnl_points + 10.0).abs() < 1e-9);
    }

    #[test]
    fn pending_fill_surviving_the_trigger_bar_times_out() {
        let cfg = sample_config();
        let bars = vec![
            bar(0, 100.0, 100.05, 99.95, 100.0),
            bar(1, 100.22, 100.3, 100.2, 100.28),
        ];
        let mut strategy = Scripted {
            script: vec![vec![Action::PendingOpen {
                side: Side::Buy,
                lot: 0.1,
                price: 100.25,
            }]],
        };
        let result = run_simulation(&bars, &cfg, &mut strategy).unwrap();
        // Filled at 100.25; neither barrier sits on the rest of the bar,
        // so the position rides to the series end.
        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].outcome, TradeOutcome::Timeout);
        assert!((result.trades[0].exit_price - 100.28).abs() < 1e-12);
        assert!((result.trades[0].pnl_points - 3.0).abs() < 1e-9);
    }

    #[test]
    fn cancelled_pending_never_fills() {
        let cfg = sample_config();
        let bars = vec![
            bar(0, 100.0, 100.05, 99.95, 100.0),
            bar(1, 100.0, 100.3, 99.98, 100.25),
        ];
        let mut strategy = Scripted {
            script: vec![
                vec![
                    Action::PendingOpen {
                        side: Side::Buy,
                        lot: 0.1,
                        price: 100.25,
                    },
                    Action::CancelPending { ticket: 1 },
                ],
                Vec::new(),
            ],
        };
        let result = run_simulation(&bars, &cfg, &mut strategy).unwrap();
        assert!(result.trades.is_empty());
    }

    #[test]
    fn trailing_stop_locks_in_profit() {
        let mut cfg = sample_config();
        cfg.enable_trailing_stop = true;
        cfg.trailing_start_ratio = 0.5;
        cfg.trailing_width_points = 2;
        // Entry 100, stop 99.9. The rally to 100.15 drags the stop to
        // 100.13; the slide back then stops out in profit.
        let bars = vec![
            bar(0, 100.0, 100.02, 99.98, 100.0),
            bar(1, 100.0, 100.15, 99.99, 100.1),
            bar(2, 100.1, 100.12, 99.95, 99.96),
        ];
        let mut strategy = Scripted {
            script: vec![open_buy(0.1)],
        };
        let result = run_simulation(&bars, &cfg, &mut strategy).unwrap();
        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.outcome, TradeOutcome::Sl);
        assert!(
            trade.pnl_points > 0.0,
            "trailing stop should exit in profit, got {} pts",
            trade.pnl_points
        );
        assert!((trade.exit_price - 100.13).abs() < 1e-9);
    }

    /// Records the buy-lock state visible to the strategy each minute and
    /// opens one BUY on the first bar.
    struct LockProbe {
        locks: Vec<bool>,
    }

    impl Strategy for LockProbe {
        fn name(&self) -> &'static str {
            "lock_probe"
        }

        fn emit_actions(&mut self, i_minute: usize, ctx: &MinuteContext<'_>) -> Vec<Action> {
            self.locks.push(ctx.state.buy_locked);
            if i_minute == 0 {
                open_buy(0.1)
            } else {
                Vec::new()
            }
        }
    }

    #[test]
    fn reset_flag_clears_directional_locks() {
        let mut cfg = sample_config();
        cfg.rsi_period = 2;
        // Steadily rising closes push the M15 RSI to 100, above the reset
        // level once the warmup completes.
        let bars: Vec<Bar> = (0..120)
            .map(|i| {
                let base = 100.0 + f64::from(i) * 0.01;
                bar(i64::from(i), base, base + 0.005, base - 0.005, base)
            })
            .collect();
        let flags = compute_rsi_and_flags(&bars, &cfg).unwrap().flags;
        let first_reset = flags.iter().position(|f| f.reset).expect("reset fires");
        assert!(first_reset > 1);

        let mut strategy = LockProbe { locks: Vec::new() };
        run_simulation(&bars, &cfg, &mut strategy).unwrap();
        // Locked from the bar after the OPEN up to the reset, unlocked after.
        assert!(!strategy.locks[0]);
        assert!(strategy.locks[1]);
        assert!(strategy.locks[first_reset - 1]);
        assert!(!strategy.locks[first_reset]);
    }

    #[test]
    fn deterministic_across_runs() {
        let cfg = sample_config();
        let bars: Vec<Bar> = (0..120)
            .map(|i| {
                let base = 100.0 + f64::from(i % 17) * 0.01 - f64::from(i % 5) * 0.02;
                bar(i64::from(i), base, base + 0.08, base - 0.07, base + 0.01)
            })
            .collect();
        let run = |bars: &[Bar]| {
            let mut strategy = Scripted {
                script: (0..bars.len())
                    .map(|i| if i % 10 == 0 { open_buy(0.1) } else { Vec::new() })
                    .collect(),
            };
            run_simulation(bars, &cfg, &mut strategy).unwrap()
        };
        let a = run(&bars);
        let b = run(&bars);
        assert_eq!(a.trades, b.trades);
        assert!((a.final_balance - b.final_balance).abs() < f64::EPSILON);
    }
}
