use crate::engine::context::MinuteContext;
use crate::engine::types::Side;

use super::EntrySignal;

/// Legacy side-only strategy: signals when the M15 RSI crosses back out of
/// an extreme zone (up through oversold, down through overbought).
#[derive(Debug, Default)]
pub struct RsiCross;

impl EntrySignal for RsiCross {
    fn name(&self) -> &'static str {
        "rsi_cross"
    }

    fn entry_signal(&mut self, _i_minute: usize, ctx: &MinuteContext<'_>) -> Option<Side> {
        let [.., prev, cur] = ctx.rsi_m15 else {
            return None;
        };
        if prev.is_nan() || cur.is_nan() || ctx.state.position_side.is_some() {
            return None;
        }
        if *prev < ctx.cfg.oversold && *cur >= ctx.cfg.oversold && !ctx.state.buy_locked {
            Some(Side::Buy)
        } else if *prev > ctx.cfg.overbought && *cur <= ctx.cfg.overbought && !ctx.state.sell_locked
        {
            Some(Side::Sell)
        } else {
            None
        }
    }
}
