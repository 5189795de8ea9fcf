use std::fs;
use std::path::Path;

use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Order in which the four synthetic prices of a bar are assumed to be
/// visited by the market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OhlcOrder {
    #[serde(rename = "O_H_L_C")]
    OpenHighLowClose,
    #[serde(rename = "O_L_H_C")]
    OpenLowHighClose,
}

/// How the fixed spread is folded into barrier prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpreadPolicy {
    None,
    SlOnly,
    Full,
}

impl SpreadPolicy {
    /// Numeric encoding used by the batched simulator (0/1/2).
    pub fn code(self) -> i8 {
        match self {
            SpreadPolicy::None => 0,
            SpreadPolicy::SlOnly => 1,
            SpreadPolicy::Full => 2,
        }
    }
}

/// Money-management mode mapping (balance, risk, loss streak) to a lot size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MoneyMode {
    Fixed,
    Geometric,
    Arithmetic,
}

fn validate_max_lot_gte_min(min_lot: &f64) -> impl FnOnce(&f64, &()) -> garde::Result + '_ {
    move |max_lot: &f64, (): &()| {
        if max_lot < min_lot {
            return Err(garde::Error::new(format!(
                "max_lot ({max_lot}) must be >= min_lot ({min_lot})"
            )));
        }
        Ok(())
    }
}

fn validate_overbought_gt_oversold(
    oversold: &f64,
) -> impl FnOnce(&f64, &()) -> garde::Result + '_ {
    move |overbought: &f64, (): &()| {
        if overbought <= oversold {
            return Err(garde::Error::new(format!(
                "overbought ({overbought}) must be greater than oversold ({oversold})"
            )));
        }
        Ok(())
    }
}

/// Immutable run parameters. Validated once at load; every component borrows
/// `&Config` for the lifetime of the run.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct Config {
    // -- Instrument --
    #[garde(length(min = 1))]
    pub symbol: String,
    #[garde(length(min = 1))]
    pub timezone: String,
    #[garde(skip)]
    pub dst: bool,
    #[garde(skip)]
    pub data_path: String,
    #[garde(range(min = f64::MIN_POSITIVE))]
    pub point: f64,
    #[garde(range(min = f64::MIN_POSITIVE))]
    pub tick_size: f64,
    #[garde(range(min = f64::MIN_POSITIVE))]
    pub tick_value: f64,

    // -- Lot constraints --
    #[garde(range(min = f64::MIN_POSITIVE))]
    pub min_lot: f64,
    #[garde(range(min = f64::MIN_POSITIVE))]
    pub lot_step: f64,
    #[garde(range(min = f64::MIN_POSITIVE), custom(validate_max_lot_gte_min(&self.min_lot)))]
    pub max_lot: f64,
    /// Overrides (`min_lot`, `lot_step`) to (0.01, 0.01) when set.
    #[garde(skip)]
    pub ft6_mode: bool,

    // -- Costs --
    #[garde(skip)]
    pub spread_policy: SpreadPolicy,
    #[garde(range(min = 0))]
    pub fixed_spread_point: i32,
    #[garde(range(min = 0.0))]
    pub commission_per_lot_round: f64,
    #[garde(skip)]
    pub swap_long_per_lot_day: f64,
    #[garde(skip)]
    pub swap_short_per_lot_day: f64,

    // -- Money management --
    #[garde(skip)]
    pub money_mode: MoneyMode,
    /// Initial risk fraction of balance per trade.
    #[garde(range(min = 0.0))]
    pub risk_ratio: f64,
    #[garde(range(min = 0.0))]
    pub step_percent: f64,
    #[garde(range(min = f64::MIN_POSITIVE))]
    pub base_balance: f64,
    #[garde(range(min = f64::MIN_POSITIVE))]
    pub fixed_lot: f64,

    // -- Strategy knobs --
    #[garde(range(min = 0))]
    pub stoploss_points: i32,
    #[garde(range(min = f64::MIN_POSITIVE))]
    pub rr: f64,
    #[garde(skip)]
    pub enable_trailing_stop: bool,
    #[garde(range(min = 0.0))]
    pub trailing_start_ratio: f64,
    #[garde(range(min = 0))]
    pub trailing_width_points: i32,
    #[garde(range(min = 1))]
    pub rsi_period: u32,
    #[garde(range(min = 0.0, max = 100.0), custom(validate_overbought_gt_oversold(&self.oversold)))]
    pub overbought: f64,
    #[garde(range(min = 0.0, max = 100.0))]
    pub oversold: f64,
    #[garde(range(min = 0.0, max = 100.0))]
    pub reset_level: f64,
    #[garde(range(min = 0))]
    pub loss_streak_max: u32,

    // -- Bar ordering & batching --
    #[garde(skip)]
    pub ohlc_order: OhlcOrder,
    #[garde(range(min = 1))]
    pub batch_size: u32,
    #[garde(range(min = 1))]
    pub chunk_years: u32,
}

impl Config {
    /// Load a configuration from a YAML file and enforce every invariant.
    /// Unknown keys are rejected, numerics refuse booleans, enum fields
    /// accept their names as strings.
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|err| EngineError::Config(format!("{}: {err}", path.display())))?;
        let cfg: Config =
            serde_yaml::from_str(&text).map_err(|err| EngineError::Config(err.to_string()))?;
        cfg.validate()
            .map_err(|err| EngineError::Config(err.to_string()))?;
        if !Path::new(&cfg.data_path).exists() {
            return Err(EngineError::Config(format!(
                "data_path does not exist: {}",
                cfg.data_path
            )));
        }
        Ok(cfg)
    }

    /// Effective (min, step) lot granularity, honoring `ft6_mode`.
    pub fn lot_granularity(&self) -> (f64, f64) {
        if self.ft6_mode {
            (0.01, 0.01)
        } else {
            (self.min_lot, self.lot_step)
        }
    }

    /// Fixed spread expressed in price units.
    pub fn spread(&self) -> f64 {
        f64::from(self.fixed_spread_point) * self.point
    }
}
