//! Interfaces to the external collaborators the core drives.
//!
//! Every call crossing these traits is a suspension point of the
//! orchestration loop.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::{AdvisoryError, ExecutionError};
use crate::types::{
    Advice, AdvisoryRequest, BalanceMarks, CloseRecord, Fill, IndicatorResult, MarketSnapshot,
    OpenRecord,
};

/// Market data and indicator source.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Current snapshot for an instrument.
    async fn snapshot(&self, instrument: &str) -> anyhow::Result<MarketSnapshot>;

    /// Indicator result computed over recent data for the snapshot's instrument.
    async fn indicators(&self, snapshot: &MarketSnapshot) -> anyhow::Result<IndicatorResult>;
}

/// AI advisory service.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait Advisor: Send + Sync {
    async fn advise(&self, request: &AdvisoryRequest) -> Result<Advice, AdvisoryError>;
}

/// Exchange execution. Calls resolve partial fills before returning.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Buy `amount` worth (quote currency) of `instrument`.
    async fn open(&self, instrument: &str, amount: Decimal) -> Result<Fill, ExecutionError>;

    /// Sell the whole holding of `instrument`.
    async fn close(&self, instrument: &str) -> Result<Fill, ExecutionError>;

    /// Total account value in quote currency.
    async fn balance(&self) -> Result<Decimal, ExecutionError>;
}

/// Durable trade journal. The core never retries failed writes.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait TradeJournal: Send + Sync {
    async fn record_open(&self, record: &OpenRecord) -> anyhow::Result<()>;

    async fn record_close(&self, record: &CloseRecord) -> anyhow::Result<()>;

    /// Previously saved balance marks, if any.
    async fn load_balance_marks(&self) -> anyhow::Result<Option<BalanceMarks>>;

    async fn save_balance_marks(&self, marks: &BalanceMarks) -> anyhow::Result<()>;
}
