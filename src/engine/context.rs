use crate::config::Config;

use super::indicators::MinuteFlags;
use super::state::StateView;

/// Read-only view of the current minute handed to a strategy. Indicator
/// slices cover `[0..=i_minute]`; the strategy must not retain references
/// beyond the call.
#[derive(Debug, Clone, Copy)]
pub struct MinuteContext<'a> {
    pub bid: f64,
    pub ask: f64,
    pub point: f64,
    pub rsi_m15: &'a [f64],
    pub rsi_h1: &'a [f64],
    pub flags: MinuteFlags,
    pub state: StateView,
    pub cfg: &'a Config,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support::sample_config;
    use crate::engine::state::RunState;

    #[test]
    fn context_is_a_cheap_borrowed_view() {
        let cfg = sample_config();
        let state = RunState::new(&cfg);
        let rsi = vec![f64::NAN, 50.0];
        let ctx = MinuteContext {
            bid: 100.0,
            ask: 100.03,
            point: cfg.point,
            rsi_m15: &rsi[..2],
            rsi_h1: &rsi[..1],
            flags: MinuteFlags::default(),
            state: state.view(),
            cfg: &cfg,
        };
        assert_eq!(ctx.rsi_m15.len(), 2);
        assert!((ctx.ask - ctx.bid - 0.03).abs() < 1e-12);
        assert!(ctx.state.position_side.is_none());
    }
}
