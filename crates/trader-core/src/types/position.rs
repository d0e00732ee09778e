//! Open position and realized P&L types.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Fill;

/// A single long holding in one instrument.
///
/// Created from a successful open fill and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub instrument: String,
    pub entry_price: Decimal,
    pub quantity: Decimal,
    pub entry_time: DateTime<Utc>,
    pub entry_fee: Decimal,
    /// Exchange order reference for the opening trade.
    pub external_trade_reference: String,
}

/// Realized outcome of a closed position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealizedPnl {
    /// Price return (exit − entry) / entry.
    pub pnl_fraction: Decimal,
    /// Net amount after entry and exit fees.
    pub pnl_amount: Decimal,
    pub holding_secs: i64,
}

impl Position {
    /// Build a position from an opening fill.
    pub fn from_fill(fill: &Fill, entry_time: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            instrument: fill.instrument.clone(),
            entry_price: fill.price,
            quantity: fill.quantity,
            entry_time,
            entry_fee: fill.fee,
            external_trade_reference: fill.order_ref.clone(),
        }
    }

    /// Total cost paid to open, fees included.
    pub fn entry_cost(&self) -> Decimal {
        self.entry_price * self.quantity + self.entry_fee
    }

    /// Price return at `price`.
    pub fn pnl_fraction(&self, price: Decimal) -> Decimal {
        if self.entry_price.is_zero() {
            return Decimal::ZERO;
        }
        (price - self.entry_price) / self.entry_price
    }

    pub fn holding_time(&self, now: DateTime<Utc>) -> Duration {
        now - self.entry_time
    }

    /// Realize P&L against a closing fill.
    pub fn realize(&self, exit: &Fill, exit_time: DateTime<Utc>) -> RealizedPnl {
        let proceeds = exit.price * exit.quantity - exit.fee;
        RealizedPnl {
            pnl_fraction: self.pnl_fraction(exit.price),
            pnl_amount: proceeds - self.entry_cost(),
            holding_secs: self.holding_time(exit_time).num_seconds(),
        }
    }
}
