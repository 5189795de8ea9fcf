use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Direction of a position or trade intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn sign(self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }

    /// ±1 encoding used by the batched simulator. Zero maps to no side.
    pub fn from_code(code: i8) -> Option<Self> {
        match code {
            1.. => Some(Side::Buy),
            ..=-1 => Some(Side::Sell),
            0 => None,
        }
    }
}

/// How a closed trade ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeOutcome {
    Tp,
    Sl,
    Manual,
    Timeout,
}

impl TradeOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            TradeOutcome::Tp => "TP",
            TradeOutcome::Sl => "SL",
            TradeOutcome::Manual => "MANUAL",
            TradeOutcome::Timeout => "TIMEOUT",
        }
    }
}

/// One row of the trade history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub time: NaiveDateTime,
    pub outcome: TradeOutcome,
    pub exit_price: f64,
    pub pnl_points: f64,
    pub pnl_currency: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_sign() {
        assert!((Side::Buy.sign() - 1.0).abs() < f64::EPSILON);
        assert!((Side::Sell.sign() + 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn side_from_code() {
        assert_eq!(Side::from_code(1), Some(Side::Buy));
        assert_eq!(Side::from_code(-1), Some(Side::Sell));
        assert_eq!(Side::from_code(0), None);
    }

    #[test]
    fn side_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Side::Buy).unwrap(), "\"BUY\"");
        assert_eq!(
            serde_json::from_str::<Side>("\"SELL\"").unwrap(),
            Side::Sell
        );
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(TradeOutcome::Tp.as_str(), "TP");
        assert_eq!(TradeOutcome::Timeout.as_str(), "TIMEOUT");
    }
}
