//! Market snapshot types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Point-in-time view of one instrument, as supplied by the market-data
/// collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Tradable symbol.
    pub instrument: String,
    /// Last traded price.
    pub price: Decimal,
    /// When the snapshot was taken.
    pub taken_at: DateTime<Utc>,
    /// Fast moving average, if available.
    pub ma_short: Option<Decimal>,
    /// Slow moving average, if available.
    pub ma_long: Option<Decimal>,
    /// Current volume relative to its recent average (1.0 = average).
    pub volume_ratio: Option<f64>,
    /// Stochastic %K (0-100).
    pub stochastic_k: Option<f64>,
}

impl MarketSnapshot {
    /// Create a snapshot with no auxiliary inputs.
    pub fn new(instrument: impl Into<String>, price: Decimal, taken_at: DateTime<Utc>) -> Self {
        Self {
            instrument: instrument.into(),
            price,
            taken_at,
            ma_short: None,
            ma_long: None,
            volume_ratio: None,
            stochastic_k: None,
        }
    }

    pub fn with_moving_averages(mut self, short: Decimal, long: Decimal) -> Self {
        self.ma_short = Some(short);
        self.ma_long = Some(long);
        self
    }

    pub fn with_volume_ratio(mut self, ratio: f64) -> Self {
        self.volume_ratio = Some(ratio);
        self
    }

    pub fn with_stochastic_k(mut self, k: f64) -> Self {
        self.stochastic_k = Some(k);
        self
    }

    /// Whether price, fast average, and slow average are stacked bullishly.
    pub fn moving_averages_aligned(&self) -> bool {
        match (self.ma_short, self.ma_long) {
            (Some(short), Some(long)) => self.price > short && short > long,
            _ => false,
        }
    }
}
