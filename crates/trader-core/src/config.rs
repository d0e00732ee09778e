//! Trading configuration.
//!
//! Values are layered: built-in defaults, then an optional config file, then
//! `TRADER_*` environment variables (a `.env` file is honoured).

use crate::{Error, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Thresholds and cadence for the decision core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    /// Instruments evaluated each tick, in order.
    pub instruments: Vec<String>,
    /// Daily P&L fraction at or below which trading stops for the day (negative).
    pub daily_loss_limit: Decimal,
    /// Drawdown from the monthly high at or below which trading stops for the month (negative).
    pub monthly_drawdown_limit: Decimal,
    /// Consecutive losing trades that trigger a timed pause.
    pub consecutive_loss_limit: u32,
    /// Length of a consecutive-loss pause.
    pub pause_duration_secs: u64,
    /// Profit fraction that triggers the advisory target check.
    pub take_profit: Decimal,
    /// Loss fraction that forces an immediate exit (negative).
    pub stop_loss: Decimal,
    /// Profit fraction that arms the trailing stop.
    pub trailing_activation: Decimal,
    /// Trailing distance below the highest price.
    pub trailing_stop: Decimal,
    /// Minimum advisory confidence to accept an entry.
    pub min_ai_confidence: f64,
    /// Minimum holding time between periodic advisory reviews.
    pub ai_check_interval_secs: u64,
    /// Holding time after which a position is closed unconditionally.
    pub max_holding_secs: u64,
    /// Interval between orchestration ticks.
    pub tick_interval_secs: u64,
    /// Timeout applied to each advisory call.
    pub advisory_timeout_secs: u64,
    /// Fraction of account value committed per entry.
    pub order_size_pct: Decimal,
    /// Entries smaller than this amount are skipped.
    pub min_order_amount: Decimal,
    /// Whether the circuit breaker gates trading.
    pub risk_enabled: bool,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            instruments: vec!["BTC/USDT".to_string(), "ETH/USDT".to_string()],
            daily_loss_limit: Decimal::new(-5, 2),        // -5%
            monthly_drawdown_limit: Decimal::new(-15, 2), // -15%
            consecutive_loss_limit: 3,
            pause_duration_secs: 24 * 60 * 60,
            take_profit: Decimal::new(3, 2),          // 3%
            stop_loss: Decimal::new(-2, 2),           // -2%
            trailing_activation: Decimal::new(15, 3), // 1.5%
            trailing_stop: Decimal::new(1, 2),        // 1%
            min_ai_confidence: 0.7,
            ai_check_interval_secs: 30 * 60,
            max_holding_secs: 4 * 60 * 60,
            tick_interval_secs: 60,
            advisory_timeout_secs: 30,
            order_size_pct: Decimal::new(2, 1), // 20%
            min_order_amount: Decimal::new(10, 0),
            risk_enabled: true,
        }
    }
}

impl TradingConfig {
    /// Load from environment variables only.
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Load defaults, then `path` (if given), then `TRADER_*` env vars.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("TRADER")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("instruments"),
        );

        let cfg: Self = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject inconsistent thresholds.
    pub fn validate(&self) -> Result<()> {
        if self.instruments.is_empty() {
            return Err(config_error("at least one instrument is required"));
        }
        if self.daily_loss_limit >= Decimal::ZERO {
            return Err(config_error("daily_loss_limit must be negative"));
        }
        if self.monthly_drawdown_limit >= Decimal::ZERO {
            return Err(config_error("monthly_drawdown_limit must be negative"));
        }
        if self.stop_loss >= Decimal::ZERO {
            return Err(config_error("stop_loss must be negative"));
        }
        if self.take_profit <= Decimal::ZERO {
            return Err(config_error("take_profit must be positive"));
        }
        if self.trailing_activation <= Decimal::ZERO
            || self.trailing_stop <= Decimal::ZERO
            || self.trailing_stop >= Decimal::ONE
        {
            return Err(config_error(
                "trailing_activation must be positive and trailing_stop within (0, 1)",
            ));
        }
        if !(0.0..=1.0).contains(&self.min_ai_confidence) {
            return Err(config_error("min_ai_confidence must be within [0, 1]"));
        }
        if self.order_size_pct <= Decimal::ZERO || self.order_size_pct > Decimal::ONE {
            return Err(config_error("order_size_pct must be within (0, 1]"));
        }
        if self.consecutive_loss_limit == 0 {
            return Err(config_error("consecutive_loss_limit must be at least 1"));
        }
        if self.tick_interval_secs == 0 {
            return Err(config_error("tick_interval_secs must be at least 1"));
        }
        Ok(())
    }

    pub fn pause_duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.pause_duration_secs as i64)
    }

    pub fn ai_check_interval(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.ai_check_interval_secs as i64)
    }

    pub fn max_holding_time(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.max_holding_secs as i64)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn advisory_timeout(&self) -> Duration {
        Duration::from_secs(self.advisory_timeout_secs)
    }
}

fn config_error(message: &str) -> Error {
    Error::Config {
        message: message.to_string(),
    }
}
