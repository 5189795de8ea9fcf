use crate::engine::actions::Action;
use crate::engine::context::MinuteContext;
use crate::engine::execution::compute_lot_with_mode;
use crate::engine::types::Side;

use super::Strategy;

/// Mean-reversion entries on M15 RSI extremes, risk-sized by the configured
/// money mode. A side stays locked after an entry until the reset flag fires,
/// and no new trades open past the loss-streak cap.
#[derive(Debug, Default)]
pub struct RsiReversal;

impl Strategy for RsiReversal {
    fn name(&self) -> &'static str {
        "rsi_reversal"
    }

    fn emit_actions(&mut self, _i_minute: usize, ctx: &MinuteContext<'_>) -> Vec<Action> {
        let Some(&rsi) = ctx.rsi_m15.last() else {
            return vec![Action::Nop];
        };
        if rsi.is_nan() || ctx.state.position_side.is_some() {
            return vec![Action::Nop];
        }
        if ctx.state.loss_streak >= ctx.cfg.loss_streak_max {
            return vec![Action::Nop];
        }

        let lot = compute_lot_with_mode(
            ctx.state.balance,
            ctx.state.risk_pct,
            f64::from(ctx.cfg.stoploss_points),
            ctx.state.loss_streak,
            ctx.cfg,
        );

        if rsi <= ctx.cfg.oversold && !ctx.state.buy_locked {
            vec![Action::Open {
                side: Side::Buy,
                lot,
                sl: None,
                tp: None,
            }]
        } else if rsi >= ctx.cfg.overbought && !ctx.state.sell_locked {
            vec![Action::Open {
                side: Side::Sell,
                lot,
                sl: None,
                tp: None,
            }]
        } else {
            vec![Action::Nop]
        }
    }
}
