use rayon::prelude::*;

use crate::config::{OhlcOrder, SpreadPolicy};
use crate::error::{EngineError, Result};

use super::execution::barrier_prices;
use super::hit::resolve_hit;
use super::ticks::ohlc_to_ticks;
use super::types::Side;

/// Dense batched inputs, aligned by `(run_index, minute)`. Price and
/// entry-side arrays have length `n_runs * n_minutes`; the per-run arrays
/// have length `n_runs`.
#[derive(Debug, Clone, Copy)]
pub struct BatchParams<'a> {
    pub open: &'a [f64],
    pub high: &'a [f64],
    pub low: &'a [f64],
    pub close: &'a [f64],
    /// Entry signal per bar per run: +1 BUY, -1 SELL, 0 stay flat.
    pub entry_side: &'a [i8],
    pub sl_points: &'a [i32],
    pub tp_points: &'a [i32],
    pub point: f64,
    pub ohlc_order: OhlcOrder,
    pub spread_points: i32,
    pub spread_policy: SpreadPolicy,
    pub n_minutes: usize,
}

/// Per-run exit metrics. `exit_reason` is +1 for TP, -1 for SL, 0 for a run
/// that timed out (or never entered).
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
    pub exit_reason: Vec<i8>,
    pub entry_price: Vec<f64>,
    pub exit_price: Vec<f64>,
    pub pnl_points: Vec<f64>,
}

impl BatchParams<'_> {
    pub fn n_runs(&self) -> usize {
        self.sl_points.len()
    }

    fn validate(&self) -> Result<()> {
        let n_runs = self.n_runs();
        if self.tp_points.len() != n_runs {
            return Err(EngineError::Simulation(format!(
                "tp_points length mismatch: {} runs vs {}",
                n_runs,
                self.tp_points.len()
            )));
        }
        if self.n_minutes == 0 {
            return Err(EngineError::Simulation("n_minutes must be > 0".to_string()));
        }
        let expected = n_runs * self.n_minutes;
        for (name, len) in [
            ("open", self.open.len()),
            ("high", self.high.len()),
            ("low", self.low.len()),
            ("close", self.close.len()),
            ("entry_side", self.entry_side.len()),
        ] {
            if len != expected {
                return Err(EngineError::Simulation(format!(
                    "{name} length mismatch: expected {expected}, got {len}"
                )));
            }
        }
        Ok(())
    }
}

/// Walk one run over its minute slice: adopt the first non-zero entry side,
/// derive barriers, adjudicate each bar until a hit, fall back to the last
/// close when the series ends unresolved.
fn simulate_run(params: &BatchParams<'_>, idx: usize) -> (i8, f64, f64, f64) {
    let base = idx * params.n_minutes;
    let spread = f64::from(params.spread_points) * params.point;
    let sl_pts = f64::from(params.sl_points[idx]);
    let tp_pts = f64::from(params.tp_points[idx]);

    let mut side: Option<Side> = None;
    let mut entry = 0.0;
    let mut sl = 0.0;
    let mut tp = 0.0;

    for t in 0..params.n_minutes {
        let i = base + t;
        if side.is_none() {
            if let Some(adopted) = Side::from_code(params.entry_side[i]) {
                entry = match adopted {
                    Side::Buy => params.open[i] + spread,
                    Side::Sell => params.open[i],
                };
                let (sl_price, tp_price) = barrier_prices(
                    entry,
                    adopted,
                    sl_pts,
                    tp_pts,
                    params.point,
                    f64::from(params.spread_points),
                    params.spread_policy,
                );
                sl = sl_price;
                tp = tp_price;
                side = Some(adopted);
            }
        }
        if let Some(held) = side {
            let bid = ohlc_to_ticks(
                params.open[i],
                params.high[i],
                params.low[i],
                params.close[i],
                params.ohlc_order,
            );
            let path = match held {
                Side::Buy => bid,
                Side::Sell => [
                    bid[0] + spread,
                    bid[1] + spread,
                    bid[2] + spread,
                    bid[3] + spread,
                ],
            };
            if let Some(event) = resolve_hit(held, &path, sl, tp) {
                let exit = match event {
                    super::hit::HitEvent::TakeProfit => tp,
                    super::hit::HitEvent::StopLoss => sl,
                };
                let pnl = (exit - entry) / params.point * held.sign();
                return (event.code(), entry, exit, pnl);
            }
        }
    }

    // Unresolved at series end: mark-to-market against the final close.
    if let Some(held) = side {
        let last = params.close[base + params.n_minutes - 1];
        let exit = match held {
            Side::Buy => last,
            Side::Sell => last + spread,
        };
        let pnl = (exit - entry) / params.point * held.sign();
        return (0, entry, exit, pnl);
    }
    (0, 0.0, 0.0, 0.0)
}

fn collect(results: Vec<(i8, f64, f64, f64)>) -> BatchResult {
    let mut out = BatchResult {
        exit_reason: Vec::with_capacity(results.len()),
        entry_price: Vec::with_capacity(results.len()),
        exit_price: Vec::with_capacity(results.len()),
        pnl_points: Vec::with_capacity(results.len()),
    };
    for (reason, entry, exit, pnl) in results {
        out.exit_reason.push(reason);
        out.entry_price.push(entry);
        out.exit_price.push(exit);
        out.pnl_points.push(pnl);
    }
    out
}

/// Data-parallel batch execution: runs are independent, writes land in
/// disjoint per-run slots, output order is the run order.
pub fn simulate_batch(params: &BatchParams<'_>) -> Result<BatchResult> {
    params.validate()?;
    let results: Vec<_> = (0..params.n_runs())
        .into_par_iter()
        .map(|idx| simulate_run(params, idx))
        .collect();
    Ok(collect(results))
}

/// Sequential reference implementation of [`simulate_batch`]. The two must
/// agree bit for bit; the test suite cross-checks them.
pub fn simulate_batch_sequential(params: &BatchParams<'_>) -> Result<BatchResult> {
    params.validate()?;
    let results: Vec<_> = (0..params.n_runs())
        .map(|idx| simulate_run(params, idx))
        .collect();
    Ok(collect(results))
}
