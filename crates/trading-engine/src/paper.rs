//! Paper trading exchange for dry runs and tests.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::info;
use trader_core::ports::Exchange;
use trader_core::types::Fill;
use trader_core::ExecutionError;
use uuid::Uuid;

#[derive(Debug, Default)]
struct PaperBook {
    cash: Decimal,
    prices: HashMap<String, Decimal>,
    holdings: HashMap<String, Decimal>,
}

/// In-memory exchange filling every order at the last set price.
pub struct PaperExchange {
    fee_rate: Decimal,
    book: RwLock<PaperBook>,
}

impl PaperExchange {
    pub fn new(cash: Decimal, fee_rate: Decimal) -> Self {
        Self {
            fee_rate,
            book: RwLock::new(PaperBook {
                cash,
                ..Default::default()
            }),
        }
    }

    /// Set the fill price for an instrument.
    pub async fn set_price(&self, instrument: &str, price: Decimal) {
        self.book
            .write()
            .await
            .prices
            .insert(instrument.to_string(), price);
    }

    pub async fn cash(&self) -> Decimal {
        self.book.read().await.cash
    }

    pub async fn holding(&self, instrument: &str) -> Decimal {
        self.book
            .read()
            .await
            .holdings
            .get(instrument)
            .copied()
            .unwrap_or_default()
    }
}

fn price_of(book: &PaperBook, instrument: &str) -> Result<Decimal, ExecutionError> {
    book.prices
        .get(instrument)
        .copied()
        .filter(|price| *price > Decimal::ZERO)
        .ok_or_else(|| ExecutionError::OrderRejected {
            message: format!("no price for {instrument}"),
        })
}

#[async_trait]
impl Exchange for PaperExchange {
    async fn open(&self, instrument: &str, amount: Decimal) -> Result<Fill, ExecutionError> {
        let mut book = self.book.write().await;
        let price = price_of(&book, instrument)?;

        if amount <= Decimal::ZERO {
            return Err(ExecutionError::OrderRejected {
                message: format!("order amount {amount} must be positive"),
            });
        }
        if amount > book.cash {
            return Err(ExecutionError::InsufficientBalance {
                required: amount,
                available: book.cash,
            });
        }

        let fee = amount * self.fee_rate;
        let quantity = (amount - fee) / price;
        book.cash -= amount;
        *book.holdings.entry(instrument.to_string()).or_default() += quantity;

        let fill = Fill {
            instrument: instrument.to_string(),
            price,
            quantity,
            fee,
            order_ref: Uuid::new_v4().to_string(),
        };

        info!(
            instrument = %instrument,
            price = %price,
            quantity = %quantity,
            fee = %fee,
            "[PAPER] Simulated buy fill"
        );

        Ok(fill)
    }

    async fn close(&self, instrument: &str) -> Result<Fill, ExecutionError> {
        let mut book = self.book.write().await;
        let price = price_of(&book, instrument)?;

        let quantity = match book.holdings.remove(instrument) {
            Some(quantity) if quantity > Decimal::ZERO => quantity,
            _ => {
                return Err(ExecutionError::NoPosition {
                    instrument: instrument.to_string(),
                })
            }
        };

        let value = quantity * price;
        let fee = value * self.fee_rate;
        book.cash += value - fee;

        info!(
            instrument = %instrument,
            price = %price,
            quantity = %quantity,
            fee = %fee,
            "[PAPER] Simulated sell fill"
        );

        Ok(Fill {
            instrument: instrument.to_string(),
            price,
            quantity,
            fee,
            order_ref: Uuid::new_v4().to_string(),
        })
    }

    async fn balance(&self) -> Result<Decimal, ExecutionError> {
        let book = self.book.read().await;
        let holdings_value: Decimal = book
            .holdings
            .iter()
            .map(|(instrument, quantity)| {
                book.prices.get(instrument).copied().unwrap_or_default() * *quantity
            })
            .sum();
        Ok(book.cash + holdings_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange() -> PaperExchange {
        PaperExchange::new(Decimal::new(1000, 0), Decimal::new(1, 3))
    }

    #[tokio::test]
    async fn test_open_and_close() {
        let exchange = exchange();
        exchange.set_price("BTC/USDT", Decimal::new(100, 0)).await;

        let open = exchange.open("BTC/USDT", Decimal::new(200, 0)).await.unwrap();
        assert_eq!(open.fee, Decimal::new(2, 1));
        assert_eq!(open.quantity, Decimal::new(1998, 3));
        assert_eq!(exchange.cash().await, Decimal::new(800, 0));

        exchange.set_price("BTC/USDT", Decimal::new(110, 0)).await;
        assert_eq!(
            exchange.balance().await.unwrap(),
            Decimal::new(800, 0) + Decimal::new(21978, 2)
        );

        let close = exchange.close("BTC/USDT").await.unwrap();
        assert_eq!(close.quantity, open.quantity);
        assert_eq!(exchange.holding("BTC/USDT").await, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_insufficient_balance() {
        let exchange = exchange();
        exchange.set_price("BTC/USDT", Decimal::new(100, 0)).await;
        let result = exchange.open("BTC/USDT", Decimal::new(5000, 0)).await;
        assert!(matches!(
            result,
            Err(ExecutionError::InsufficientBalance { .. })
        ));
        assert_eq!(exchange.cash().await, Decimal::new(1000, 0));
    }

    #[tokio::test]
    async fn test_close_without_holding() {
        let exchange = exchange();
        exchange.set_price("ETH/USDT", Decimal::new(50, 0)).await;
        let result = exchange.close("ETH/USDT").await;
        assert!(matches!(result, Err(ExecutionError::NoPosition { .. })));
    }

    #[tokio::test]
    async fn test_unpriced_instrument_rejected() {
        let exchange = exchange();
        let result = exchange.open("DOGE/USDT", Decimal::new(10, 0)).await;
        assert!(matches!(result, Err(ExecutionError::OrderRejected { .. })));
    }
}
