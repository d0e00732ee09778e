//! Technical indicator results consumed by the decision engines.
//!
//! Indicators are computed by an external collaborator; the core only reads
//! the fields defined here.

use serde::{Deserialize, Serialize};

use crate::error::ContractViolation;

/// Highest number of independently satisfied technical conditions.
pub const MAX_SIGNAL_COUNT: u8 = 4;

/// RSI reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RsiReading {
    pub value: f64,
    pub oversold: bool,
    pub overbought: bool,
}

/// MACD momentum classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MacdMomentum {
    StrongBullish,
    Bullish,
    Neutral,
    Bearish,
    StrongBearish,
}

impl MacdMomentum {
    pub fn is_bullish(self) -> bool {
        matches!(self, Self::StrongBullish | Self::Bullish)
    }
}

/// MACD reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacdReading {
    pub golden_cross: bool,
    pub death_cross: bool,
    pub momentum: MacdMomentum,
}

/// Bollinger band touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BollingerReading {
    pub lower_touch: bool,
    pub upper_touch: bool,
}

/// Fibonacci retracement proximity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FibonacciReading {
    pub near_support: bool,
}

/// Indicator result for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorResult {
    pub instrument: String,
    /// Independently satisfied technical entry conditions (0-4).
    pub signal_count: u8,
    pub rsi: RsiReading,
    pub macd: MacdReading,
    pub bollinger: BollingerReading,
    pub fibonacci: FibonacciReading,
}

impl IndicatorResult {
    /// Check the collaborator contract.
    pub fn validate(&self) -> Result<(), ContractViolation> {
        if self.signal_count > MAX_SIGNAL_COUNT {
            return Err(ContractViolation::SignalCountOutOfRange {
                instrument: self.instrument.clone(),
                count: self.signal_count,
            });
        }
        if !self.rsi.value.is_finite() || !(0.0..=100.0).contains(&self.rsi.value) {
            return Err(ContractViolation::FieldOutOfRange {
                instrument: self.instrument.clone(),
                field: "rsi.value",
                value: self.rsi.value,
            });
        }
        Ok(())
    }

    /// Check the contract and that the result belongs to `instrument`.
    pub fn validate_for(&self, instrument: &str) -> Result<(), ContractViolation> {
        if self.instrument != instrument {
            return Err(ContractViolation::InstrumentMismatch {
                expected: instrument.to_string(),
                actual: self.instrument.clone(),
            });
        }
        self.validate()
    }

    /// A neutral reading with no satisfied conditions.
    pub fn neutral(instrument: impl Into<String>) -> Self {
        Self {
            instrument: instrument.into(),
            signal_count: 0,
            rsi: RsiReading {
                value: 50.0,
                oversold: false,
                overbought: false,
            },
            macd: MacdReading {
                golden_cross: false,
                death_cross: false,
                momentum: MacdMomentum::Neutral,
            },
            bollinger: BollingerReading {
                lower_touch: false,
                upper_touch: false,
            },
            fibonacci: FibonacciReading {
                near_support: false,
            },
        }
    }
}
