use chrono::NaiveDateTime;

use crate::config::Config;

use super::types::Side;

/// Trailing-stop bookkeeping attached to a live position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trailing {
    pub start_ratio: f64,
    pub width_points: f64,
    /// Best favourable price seen since entry.
    pub best: f64,
}

/// The single live position. At most one exists per run.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub ticket: u64,
    pub side: Side,
    pub open_price: f64,
    pub sl: f64,
    pub tp: f64,
    pub lot: f64,
    /// Stop distance in points used for trailing arithmetic.
    pub sl_points: f64,
    pub opened_at: NaiveDateTime,
    pub trailing: Option<Trailing>,
}

impl Position {
    /// Advance the trailing stop from an observed price. The stop follows the
    /// best favourable price at `width_points` distance once the move reaches
    /// `start_ratio` of the stop distance, and never loosens.
    pub fn advance_trailing(&mut self, price: f64, point: f64) {
        let Some(trailing) = self.trailing.as_mut() else {
            return;
        };
        match self.side {
            Side::Buy => {
                if price > trailing.best {
                    trailing.best = price;
                }
                let run = trailing.best - self.open_price;
                if run >= trailing.start_ratio * self.sl_points * point {
                    let candidate = trailing.best - trailing.width_points * point;
                    if candidate > self.sl {
                        self.sl = candidate;
                    }
                }
            }
            Side::Sell => {
                if price < trailing.best {
                    trailing.best = price;
                }
                let run = self.open_price - trailing.best;
                if run >= trailing.start_ratio * self.sl_points * point {
                    let candidate = trailing.best + trailing.width_points * point;
                    if candidate < self.sl {
                        self.sl = candidate;
                    }
                }
            }
        }
    }
}

/// A resting order waiting for its trigger price.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingOrder {
    pub ticket: u64,
    pub side: Side,
    pub lot: f64,
    pub price: f64,
}

/// Mutable account state. Created once per run, owned exclusively by the
/// simulator, and mutated only between strategy calls.
#[derive(Debug, Clone)]
pub struct RunState {
    pub position: Option<Position>,
    pub pending: Vec<PendingOrder>,
    pub loss_streak: u32,
    pub buy_locked: bool,
    pub sell_locked: bool,
    pub balance: f64,
    pub risk_pct: f64,
    pub cycle_profit: f64,
    next_ticket: u64,
}

impl RunState {
    pub fn new(cfg: &Config) -> Self {
        Self {
            position: None,
            pending: Vec::new(),
            loss_streak: 0,
            buy_locked: false,
            sell_locked: false,
            balance: cfg.base_balance,
            risk_pct: cfg.risk_ratio,
            cycle_profit: 0.0,
            next_ticket: 0,
        }
    }

    pub fn next_ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }

    pub fn lock_side(&mut self, side: Side) {
        match side {
            Side::Buy => self.buy_locked = true,
            Side::Sell => self.sell_locked = true,
        }
    }

    pub fn clear_locks(&mut self) {
        self.buy_locked = false;
        self.sell_locked = false;
    }

    /// Post-trade account update. Losses restart the risk cycle; wins drain
    /// accumulated cycle profit into risk-pct increments, one threshold at a
    /// time.
    pub fn update_after_trade(&mut self, profit: f64, cfg: &Config) {
        self.balance += profit;
        if profit < 0.0 {
            self.loss_streak += 1;
            self.risk_pct = cfg.risk_ratio;
            self.cycle_profit = 0.0;
        } else {
            self.loss_streak = 0;
            self.cycle_profit += profit;
            let threshold = cfg.base_balance * cfg.step_percent;
            if threshold > 0.0 {
                while self.cycle_profit >= threshold {
                    self.risk_pct += cfg.step_percent;
                    self.cycle_profit -= threshold;
                }
            }
        }
    }

    /// Immutable snapshot handed to strategies through the context.
    pub fn view(&self) -> StateView {
        StateView {
            position_side: self.position.as_ref().map(|p| p.side),
            ticket: self.position.as_ref().map(|p| p.ticket),
            open_price: self.position.as_ref().map(|p| p.open_price),
            sl: self.position.as_ref().map(|p| p.sl),
            tp: self.position.as_ref().map(|p| p.tp),
            lot: self.position.as_ref().map(|p| p.lot),
            loss_streak: self.loss_streak,
            buy_locked: self.buy_locked,
            sell_locked: self.sell_locked,
            balance: self.balance,
            risk_pct: self.risk_pct,
        }
    }
}

/// Read-only view of the run state, valid for one strategy call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateView {
    pub position_side: Option<Side>,
    pub ticket: Option<u64>,
    pub open_price: Option<f64>,
    pub sl: Option<f64>,
    pub tp: Option<f64>,
    pub lot: Option<f64>,
    pub loss_streak: u32,
    pub buy_locked: bool,
    pub sell_locked: bool,
    pub balance: f64,
    pub risk_pct: f64,
}
