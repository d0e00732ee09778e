//! Exit decision engine for open positions.
//!
//! Five conditions are checked in strict priority order and the first match
//! wins:
//!
//! 1. stop loss
//! 2. maximum holding time
//! 3. trailing stop
//! 4. take-profit target, confirmed by the advisory service
//! 5. periodic advisory review
//!
//! Only the last two consult the advisory service. An advisory failure at the
//! target realizes the gain; an advisory failure at a periodic review keeps
//! the position.

use chrono::{DateTime, Duration, Utc};
use risk_manager::{TrailingSignal, TrailingStop};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use trader_core::ports::Advisor;
use trader_core::types::{
    AdviceAction, AdvisoryContext, AdvisoryRequest, ExitDecision, ExitReason, IndicatorResult,
    Position,
};
use trader_core::{ContractViolation, TradingConfig};

use crate::advisory::consult;

/// Configuration for the exit engine.
#[derive(Debug, Clone)]
pub struct ExitConfig {
    /// Loss fraction that forces an exit (negative).
    pub stop_loss: Decimal,
    /// Profit fraction at which the advisory service is asked to exit.
    pub take_profit: Decimal,
    pub trailing_activation: Decimal,
    pub trailing_stop: Decimal,
    pub max_holding_time: Duration,
    /// Minimum holding time between periodic reviews.
    pub ai_check_interval: Duration,
    pub advisory_timeout: std::time::Duration,
}

impl From<&TradingConfig> for ExitConfig {
    fn from(config: &TradingConfig) -> Self {
        Self {
            stop_loss: config.stop_loss,
            take_profit: config.take_profit,
            trailing_activation: config.trailing_activation,
            trailing_stop: config.trailing_stop,
            max_holding_time: config.max_holding_time(),
            ai_check_interval: config.ai_check_interval(),
            advisory_timeout: config.advisory_timeout(),
        }
    }
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self::from(&TradingConfig::default())
    }
}

/// Per-position exit state that lives across ticks.
#[derive(Debug, Clone)]
pub struct PositionWatch {
    pub trailing: TrailingStop,
    /// Last periodic review (entry time until the first review).
    pub last_review_at: DateTime<Utc>,
}

/// Decides, once per tick, whether an open position should be closed.
pub struct ExitEngine {
    config: ExitConfig,
    advisor: Arc<dyn Advisor>,
    /// Watches keyed by instrument.
    watches: HashMap<String, PositionWatch>,
}

impl ExitEngine {
    pub fn new(config: ExitConfig, advisor: Arc<dyn Advisor>) -> Self {
        Self {
            config,
            advisor,
            watches: HashMap::new(),
        }
    }

    /// Start watching a newly opened position, replacing any stale watch.
    pub fn track(&mut self, position: &Position) {
        self.watches
            .insert(position.instrument.clone(), self.new_watch(position));
    }

    /// Stop watching a closed position.
    pub fn untrack(&mut self, instrument: &str) -> Option<PositionWatch> {
        self.watches.remove(instrument)
    }

    pub fn watch(&self, instrument: &str) -> Option<&PositionWatch> {
        self.watches.get(instrument)
    }

    pub fn watched_count(&self) -> usize {
        self.watches.len()
    }

    /// Evaluate an open position at `current_price`.
    ///
    /// Price-only conditions are checked before the indicator contract.
    pub async fn decide(
        &mut self,
        position: &Position,
        current_price: Decimal,
        indicators: &IndicatorResult,
        now: DateTime<Utc>,
    ) -> Result<Option<ExitDecision>, ContractViolation> {
        if let Some(decision) = self.price_exit(position, current_price, now) {
            return Ok(Some(decision));
        }

        indicators.validate_for(&position.instrument)?;

        let pnl_fraction = position.pnl_fraction(current_price);
        let holding = position.holding_time(now);
        let review_due = self
            .watches
            .get(&position.instrument)
            .is_some_and(|watch| now - watch.last_review_at >= self.config.ai_check_interval);

        // Priority 4: take-profit target
        if pnl_fraction >= self.config.take_profit {
            let request = self.request(
                position,
                current_price,
                indicators,
                AdvisoryContext::TargetReached {
                    pnl_fraction,
                    holding_secs: holding.num_seconds(),
                },
            );
            match consult(self.advisor.as_ref(), &request, self.config.advisory_timeout).await {
                Ok(advice) if advice.action == AdviceAction::Exit => {
                    return Ok(Some(
                        ExitDecision::new(
                            ExitReason::TargetExit,
                            pnl_fraction,
                            format!("target {}% reached: {}", percent(pnl_fraction), advice.rationale),
                        )
                        .with_confidence(advice.confidence),
                    ));
                }
                Ok(advice) => {
                    info!(
                        instrument = %position.instrument,
                        action = ?advice.action,
                        pnl_fraction = %pnl_fraction,
                        "Advisory holding past target"
                    );
                }
                Err(e) => {
                    warn!(
                        instrument = %position.instrument,
                        error = %e,
                        "Advisory failed at target, realizing gain"
                    );
                    return Ok(Some(ExitDecision::new(
                        ExitReason::TargetExit,
                        pnl_fraction,
                        format!(
                            "target {}% reached, advisory unavailable ({e})",
                            percent(pnl_fraction)
                        ),
                    )));
                }
            }
        }

        // Priority 5: periodic review
        if !review_due {
            return Ok(None);
        }
        if let Some(watch) = self.watches.get_mut(&position.instrument) {
            watch.last_review_at = now;
        }

        let request = self.request(
            position,
            current_price,
            indicators,
            AdvisoryContext::PeriodicReview {
                pnl_fraction,
                holding_secs: holding.num_seconds(),
            },
        );
        match consult(self.advisor.as_ref(), &request, self.config.advisory_timeout).await {
            Ok(advice) if advice.action == AdviceAction::Exit => Ok(Some(
                ExitDecision::new(
                    ExitReason::PeriodicExit,
                    pnl_fraction,
                    format!("periodic review: {}", advice.rationale),
                )
                .with_confidence(advice.confidence),
            )),
            Ok(advice) => {
                debug!(
                    instrument = %position.instrument,
                    action = ?advice.action,
                    "Periodic review keeps position"
                );
                Ok(None)
            }
            Err(e) => {
                warn!(
                    instrument = %position.instrument,
                    error = %e,
                    "Periodic review failed, holding position"
                );
                Ok(None)
            }
        }
    }

    /// Priorities 1-3, which need only the current price.
    ///
    /// Also used on its own when indicators are unavailable for a tick.
    pub fn price_exit(
        &mut self,
        position: &Position,
        current_price: Decimal,
        now: DateTime<Utc>,
    ) -> Option<ExitDecision> {
        let pnl_fraction = position.pnl_fraction(current_price);
        let holding = position.holding_time(now);

        // Priority 1: stop loss
        if pnl_fraction <= self.config.stop_loss {
            return Some(ExitDecision::new(
                ExitReason::StopLoss,
                pnl_fraction,
                format!(
                    "stop loss: return {}% at or below limit {}%",
                    percent(pnl_fraction),
                    percent(self.config.stop_loss)
                ),
            ));
        }

        // Priority 2: maximum holding time
        if holding >= self.config.max_holding_time {
            return Some(ExitDecision::new(
                ExitReason::Timeout,
                pnl_fraction,
                format!(
                    "held {}m, limit {}m",
                    holding.num_minutes(),
                    self.config.max_holding_time.num_minutes()
                ),
            ));
        }

        // Priority 3: trailing stop
        if !self.watches.contains_key(&position.instrument) {
            debug!(instrument = %position.instrument, "Creating watch for adopted position");
            let watch = self.new_watch(position);
            self.watches.insert(position.instrument.clone(), watch);
        }
        let watch = self.watches.get_mut(&position.instrument)?;
        if watch.trailing.update(current_price) == TrailingSignal::Stop {
            let stop_price = watch.trailing.state().stop_price;
            return Some(ExitDecision::new(
                ExitReason::TrailingStop,
                pnl_fraction,
                format!("trailing stop: price {current_price} at or below stop {stop_price}"),
            ));
        }

        None
    }

    fn new_watch(&self, position: &Position) -> PositionWatch {
        PositionWatch {
            trailing: TrailingStop::new(
                position.entry_price,
                self.config.trailing_activation,
                self.config.trailing_stop,
            ),
            last_review_at: position.entry_time,
        }
    }

    fn request(
        &self,
        position: &Position,
        price: Decimal,
        indicators: &IndicatorResult,
        context: AdvisoryContext,
    ) -> AdvisoryRequest {
        AdvisoryRequest {
            instrument: position.instrument.clone(),
            price,
            indicators: indicators.clone(),
            context,
        }
    }
}

fn percent(fraction: Decimal) -> Decimal {
    (fraction * Decimal::ONE_HUNDRED).round_dp(2)
}
