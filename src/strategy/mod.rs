pub mod rsi_cross;
pub mod rsi_reversal;

use crate::engine::actions::Action;
use crate::engine::context::MinuteContext;
use crate::engine::types::Side;
use crate::error::{EngineError, Result};

pub use rsi_cross::RsiCross;
pub use rsi_reversal::RsiReversal;

/// A strategy emits trade intents for each minute. Implementations own their
/// internal state for the lifetime of one run.
pub trait Strategy: Send {
    fn name(&self) -> &'static str;

    fn emit_actions(&mut self, i_minute: usize, ctx: &MinuteContext<'_>) -> Vec<Action>;
}

impl std::fmt::Debug for dyn Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Strategy").field("name", &self.name()).finish()
    }
}

/// Legacy side-only API: a strategy that merely names an entry side.
pub trait EntrySignal: Send {
    fn name(&self) -> &'static str;

    fn entry_signal(&mut self, i_minute: usize, ctx: &MinuteContext<'_>) -> Option<Side>;
}

/// Adapter lifting the legacy API into the action-emitting one: each signal
/// becomes a single OPEN at the instrument's minimum lot.
pub struct LegacySideStrategy<S> {
    inner: S,
}

impl<S: EntrySignal> LegacySideStrategy<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S: EntrySignal> Strategy for LegacySideStrategy<S> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn emit_actions(&mut self, i_minute: usize, ctx: &MinuteContext<'_>) -> Vec<Action> {
        match self.inner.entry_signal(i_minute, ctx) {
            Some(side) => vec![Action::Open {
                side,
                lot: ctx.cfg.min_lot,
                sl: None,
                tp: None,
            }],
            None => Vec::new(),
        }
    }
}

/// Names of every registered strategy, in registry order.
pub fn strategy_names() -> Vec<&'static str> {
    vec!["rsi_reversal", "rsi_cross"]
}

/// Resolve a strategy by name from the compile-time registry.
pub fn load_strategy(name: &str) -> Result<Box<dyn Strategy>> {
    match name {
        "rsi_reversal" => {
            tracing::info!("strategy loaded: rsi_reversal (action api)");
            Ok(Box::new(RsiReversal::default()))
        }
        "rsi_cross" => {
            tracing::info!("strategy loaded: rsi_cross (legacy side api, wrapped)");
            Ok(Box::new(LegacySideStrategy::new(RsiCross::default())))
        }
        other => Err(EngineError::EaValidation(format!(
            "unknown strategy: {other}"
        ))),
    }
}
