//! Exchange fills and journal records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ExitReason;

/// Definitive fill returned by the exchange for an open or close.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fill {
    pub instrument: String,
    pub price: Decimal,
    pub quantity: Decimal,
    pub fee: Decimal,
    /// Exchange-side order reference.
    pub order_ref: String,
}

impl Fill {
    /// Gross traded value (price × quantity).
    pub fn value(&self) -> Decimal {
        self.price * self.quantity
    }
}

/// Journal entry written after a successful open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenRecord {
    pub instrument: String,
    pub entry_price: Decimal,
    pub quantity: Decimal,
    pub entry_time: DateTime<Utc>,
    pub entry_fee: Decimal,
    pub order_ref: String,
    pub rationale: String,
}

/// Journal entry written after a successful close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloseRecord {
    pub instrument: String,
    pub exit_price: Decimal,
    pub pnl_fraction: Decimal,
    pub pnl_amount: Decimal,
    pub exit_reason: ExitReason,
    pub holding_secs: i64,
    pub rationale: String,
}
