//! Advisory request/response types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::IndicatorResult;

/// Action recommended by the advisory service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdviceAction {
    Enter,
    Exit,
    Hold,
    Wait,
}

/// Why the advisory service is being consulted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdvisoryContext {
    /// Confirming a technical entry signal.
    Entry { secondary_score: u8 },
    /// Open position has reached the take-profit threshold.
    TargetReached {
        pnl_fraction: Decimal,
        holding_secs: i64,
    },
    /// Scheduled review of an open position.
    PeriodicReview {
        pnl_fraction: Decimal,
        holding_secs: i64,
    },
}

/// Request sent to the advisory service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryRequest {
    pub instrument: String,
    pub price: Decimal,
    pub indicators: IndicatorResult,
    pub context: AdvisoryContext,
}

/// Advisory service recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advice {
    pub action: AdviceAction,
    /// Confidence score (0.0 - 1.0).
    pub confidence: f64,
    pub rationale: String,
}

impl Advice {
    pub fn new(action: AdviceAction, confidence: f64, rationale: impl Into<String>) -> Self {
        Self {
            action,
            confidence,
            rationale: rationale.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advice_parses_from_service_response() {
        let advice: Advice = serde_json::from_str(
            r#"{"action":"ENTER","confidence":0.78,"rationale":"oversold bounce"}"#,
        )
        .unwrap();
        assert_eq!(advice.action, AdviceAction::Enter);
        assert_eq!(advice.confidence, 0.78);
    }

    #[test]
    fn test_unknown_action_rejected() {
        let parsed = serde_json::from_str::<Advice>(
            r#"{"action":"BUY","confidence":0.9,"rationale":""}"#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn test_context_is_tagged() {
        let json = serde_json::to_value(AdvisoryContext::TargetReached {
            pnl_fraction: Decimal::new(31, 3),
            holding_secs: 5400,
        })
        .unwrap();
        assert_eq!(json["kind"], "target_reached");
        assert_eq!(json["holding_secs"], 5400);
    }
}
