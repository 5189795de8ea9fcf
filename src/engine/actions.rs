use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

use super::types::Side;

/// Trade intent emitted by a strategy. The serialized form is tagged by
/// `type`, matching the wire grammar strategies are written against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Open {
        side: Side,
        lot: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sl: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tp: Option<f64>,
    },
    Close {
        ticket: u64,
    },
    Modify {
        ticket: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sl: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tp: Option<f64>,
    },
    SetTrailing {
        ticket: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        start_ratio: Option<f64>,
    },
    PendingOpen {
        side: Side,
        lot: f64,
        price: f64,
    },
    CancelPending {
        ticket: u64,
    },
    Nop,
}

fn ensure_finite(name: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(EngineError::ActionSchema(format!(
            "{name} must be a finite number, got {value}"
        )))
    }
}

/// Validate a single action against the schema grammar.
pub fn validate_action(action: &Action) -> Result<()> {
    match action {
        Action::Open { lot, sl, tp, .. } => {
            ensure_finite("lot", *lot)?;
            if *lot <= 0.0 {
                return Err(EngineError::ActionSchema(format!(
                    "lot must be positive, got {lot}"
                )));
            }
            if let Some(sl) = sl {
                ensure_finite("sl", *sl)?;
            }
            if let Some(tp) = tp {
                ensure_finite("tp", *tp)?;
            }
        }
        Action::Modify { sl, tp, .. } => {
            if sl.is_none() && tp.is_none() {
                return Err(EngineError::ActionSchema(
                    "MODIFY requires sl or tp".to_string(),
                ));
            }
            if let Some(sl) = sl {
                ensure_finite("sl", *sl)?;
            }
            if let Some(tp) = tp {
                ensure_finite("tp", *tp)?;
            }
        }
        Action::SetTrailing { start_ratio, .. } => {
            if let Some(ratio) = start_ratio {
                if !ratio.is_finite() || !(0.0..=1.0).contains(ratio) {
                    return Err(EngineError::ActionSchema(format!(
                        "start_ratio must be within [0, 1], got {ratio}"
                    )));
                }
            }
        }
        Action::PendingOpen { lot, price, .. } => {
            ensure_finite("lot", *lot)?;
            if *lot <= 0.0 {
                return Err(EngineError::ActionSchema(format!(
                    "lot must be positive, got {lot}"
                )));
            }
            ensure_finite("price", *price)?;
        }
        Action::Close { .. } | Action::CancelPending { .. } | Action::Nop => {}
    }
    Ok(())
}

/// Validate an entire action list, failing on the first offender.
pub fn validate_actions(actions: &[Action]) -> Result<()> {
    for action in actions {
        validate_action(action)?;
    }
    Ok(())
}
