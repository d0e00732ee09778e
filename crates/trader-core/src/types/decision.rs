//! Entry and exit decision records.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How an entry decision was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    /// Confirmed by the advisory service.
    Advisory,
    /// Deterministic scoring while the advisory service was unavailable.
    Fallback,
}

/// Decision to open a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryDecision {
    pub instrument: String,
    /// Confidence score (0.0 - 1.0).
    pub confidence: f64,
    /// Secondary corroboration score (0-3).
    pub secondary_score: u8,
    pub source: DecisionSource,
    pub rationale: String,
}

impl EntryDecision {
    pub fn is_fallback(&self) -> bool {
        self.source == DecisionSource::Fallback
    }
}

/// Why a position is being closed, in exit-engine priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    Timeout,
    TrailingStop,
    TargetExit,
    PeriodicExit,
    /// Forced close after a circuit-breaker trip.
    RiskLiquidation,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StopLoss => "stop_loss",
            Self::Timeout => "timeout",
            Self::TrailingStop => "trailing_stop",
            Self::TargetExit => "target_exit",
            Self::PeriodicExit => "periodic_exit",
            Self::RiskLiquidation => "risk_liquidation",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision to close an open position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitDecision {
    pub reason: ExitReason,
    /// Price return at decision time.
    pub pnl_fraction: Decimal,
    /// Advisory confidence, when the advisory service made the call.
    pub confidence: Option<f64>,
    pub rationale: String,
}

impl ExitDecision {
    pub fn new(reason: ExitReason, pnl_fraction: Decimal, rationale: impl Into<String>) -> Self {
        Self {
            reason,
            pnl_fraction,
            confidence: None,
            rationale: rationale.into(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
}
