//! Orchestration loop.
//!
//! Once per tick: read the account balance, roll the balance marks, consult
//! the circuit breaker, then walk the instruments one at a time. A flat
//! instrument goes to the entry engine, an open one to the exit engine.
//!
//! Positions, balance marks, and breaker state are only mutated here, and
//! only after the exchange has confirmed the corresponding fill.

use chrono::{DateTime, Utc};
use risk_manager::{CircuitBreaker, CircuitBreakerConfig, RiskVerdict};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use trader_core::ports::{Advisor, Exchange, MarketData, TradeJournal};
use trader_core::types::{
    BalanceMarks, CloseRecord, DecisionSource, EntryDecision, ExitReason, OpenRecord, Position,
};
use trader_core::{Result, TradingConfig};

use crate::entry::{EntryConfig, EntryEngine};
use crate::exit::{ExitConfig, ExitEngine};

/// What happened to one instrument during a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InstrumentOutcome {
    Opened {
        entry_price: Decimal,
        quantity: Decimal,
        source: DecisionSource,
        rationale: String,
    },
    Closed {
        reason: ExitReason,
        pnl_fraction: Decimal,
        pnl_amount: Decimal,
        rationale: String,
    },
    /// Open position kept.
    Held,
    /// Flat instrument, no entry.
    NoEntry,
    /// Not evaluated this tick.
    Skipped { reason: String },
    /// Order failed; state untouched, retried next tick.
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentReport {
    pub instrument: String,
    pub outcome: InstrumentOutcome,
}

/// Summary of one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub at: DateTime<Utc>,
    pub balance: Option<Decimal>,
    pub verdict: Option<RiskVerdict>,
    pub instruments: Vec<InstrumentReport>,
}

impl TickReport {
    fn new(at: DateTime<Utc>) -> Self {
        Self {
            at,
            balance: None,
            verdict: None,
            instruments: Vec::new(),
        }
    }

    fn push(&mut self, instrument: &str, outcome: InstrumentOutcome) {
        self.instruments.push(InstrumentReport {
            instrument: instrument.to_string(),
            outcome,
        });
    }

    pub fn outcome(&self, instrument: &str) -> Option<&InstrumentOutcome> {
        self.instruments
            .iter()
            .find(|report| report.instrument == instrument)
            .map(|report| &report.outcome)
    }
}

/// Drives the decision engines under the circuit breaker.
pub struct Orchestrator {
    config: TradingConfig,
    market_data: Arc<dyn MarketData>,
    exchange: Arc<dyn Exchange>,
    journal: Arc<dyn TradeJournal>,
    breaker: CircuitBreaker,
    entry: EntryEngine,
    exit: ExitEngine,
    /// Open positions keyed by instrument; at most one each.
    positions: HashMap<String, Position>,
    marks: Option<BalanceMarks>,
    /// A breach liquidation left positions open.
    liquidation_pending: bool,
}

impl Orchestrator {
    pub fn new(
        config: TradingConfig,
        market_data: Arc<dyn MarketData>,
        advisor: Arc<dyn Advisor>,
        exchange: Arc<dyn Exchange>,
        journal: Arc<dyn TradeJournal>,
    ) -> Self {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig::from(&config));
        let entry = EntryEngine::new(EntryConfig::from(&config), advisor.clone());
        let exit = ExitEngine::new(ExitConfig::from(&config), advisor);
        Self {
            config,
            market_data,
            exchange,
            journal,
            breaker,
            entry,
            exit,
            positions: HashMap::new(),
            marks: None,
            liquidation_pending: false,
        }
    }

    /// Replace the circuit breaker, e.g. one restored from saved state.
    pub fn with_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.breaker = breaker;
        self
    }

    /// Take over a position opened before this process started.
    /// Returns false if the instrument already has a position.
    pub fn adopt_position(&mut self, position: Position) -> bool {
        if self.positions.contains_key(&position.instrument) {
            warn!(instrument = %position.instrument, "Position already held, not adopting");
            return false;
        }
        self.exit.track(&position);
        self.positions.insert(position.instrument.clone(), position);
        true
    }

    pub fn positions(&self) -> &HashMap<String, Position> {
        &self.positions
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn balance_marks(&self) -> Option<&BalanceMarks> {
        self.marks.as_ref()
    }

    pub fn exit_engine(&self) -> &ExitEngine {
        &self.exit
    }

    /// Run ticks until `shutdown` flips to true or its sender is dropped.
    ///
    /// Returns an error only for contract violations by a collaborator.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            instruments = ?self.config.instruments,
            tick_interval_secs = self.config.tick_interval_secs,
            "Starting orchestration loop"
        );

        let mut ticker = tokio::time::interval(self.config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.tick().await {
                        Ok(report) => debug!(
                            balance = ?report.balance,
                            instruments = report.instruments.len(),
                            "Tick complete"
                        ),
                        Err(e) => {
                            error!(error = %e, "Tick aborted by contract violation, stopping loop");
                            return Err(e);
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(open_positions = self.positions.len(), "Orchestration loop stopped");
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Run one tick at the current time.
    pub async fn tick(&mut self) -> Result<TickReport> {
        self.tick_at(Utc::now()).await
    }

    /// Run one tick at `now`.
    pub async fn tick_at(&mut self, now: DateTime<Utc>) -> Result<TickReport> {
        let mut report = TickReport::new(now);

        let balance = match self.exchange.balance().await {
            Ok(balance) => balance,
            Err(e) => {
                warn!(error = %e, "Balance read failed, skipping tick");
                return Ok(report);
            }
        };
        report.balance = Some(balance);

        let (mut marks, loaded) = self.load_marks(balance, now).await;
        let rolled = marks.roll(balance, now);
        let verdict = self.breaker.evaluate_at(
            now,
            balance,
            marks.today_start_balance,
            marks.monthly_high_balance,
        );
        let raised = verdict
            .high_water_mark()
            .is_some_and(|high| marks.raise_high(high));
        if loaded {
            if rolled || raised {
                self.save_marks(&marks).await;
            }
            self.marks = Some(marks);
        }
        report.verdict = Some(verdict.clone());

        match &verdict {
            RiskVerdict::Ok { .. } => {}
            RiskVerdict::Paused { .. } => {
                if self.liquidation_pending && !self.positions.is_empty() {
                    warn!(
                        open_positions = self.positions.len(),
                        "Retrying liquidation left over from breach"
                    );
                    self.liquidate_all(&verdict, now, &mut report).await;
                } else {
                    debug!(rationale = %verdict.rationale(), "Trading paused");
                }
                return Ok(report);
            }
            breach => {
                error!(
                    rationale = %breach.rationale(),
                    open_positions = self.positions.len(),
                    "Risk limit breached, liquidating"
                );
                self.liquidate_all(breach, now, &mut report).await;
                return Ok(report);
            }
        }

        let instruments = self.config.instruments.clone();
        for instrument in &instruments {
            let outcome = self.process_instrument(instrument, balance, now).await?;
            report.push(instrument, outcome);
        }

        Ok(report)
    }

    async fn process_instrument(
        &mut self,
        instrument: &str,
        balance: Decimal,
        now: DateTime<Utc>,
    ) -> Result<InstrumentOutcome> {
        let snapshot = match self.market_data.snapshot(instrument).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(instrument = %instrument, error = %e, "Snapshot unavailable, skipping");
                return Ok(InstrumentOutcome::Skipped {
                    reason: format!("snapshot unavailable: {e}"),
                });
            }
        };
        let indicators = match self.market_data.indicators(&snapshot).await {
            Ok(indicators) => indicators,
            Err(e) => {
                let reason = format!("indicators unavailable: {e}");
                let Some(position) = self.positions.get(instrument).cloned() else {
                    warn!(instrument = %instrument, error = %e, "Indicators unavailable, skipping");
                    return Ok(InstrumentOutcome::Skipped { reason });
                };

                warn!(
                    instrument = %instrument,
                    error = %e,
                    "Indicators unavailable, checking price exits only"
                );
                return Ok(
                    match self.exit.price_exit(&position, snapshot.price, now) {
                        Some(decision) => {
                            self.close_position(
                                &position,
                                decision.reason,
                                decision.rationale,
                                now,
                            )
                            .await
                        }
                        None => InstrumentOutcome::Skipped { reason },
                    },
                );
            }
        };

        if let Some(position) = self.positions.get(instrument).cloned() {
            let decision = self
                .exit
                .decide(&position, snapshot.price, &indicators, now)
                .await?;
            return Ok(match decision {
                Some(decision) => {
                    self.close_position(&position, decision.reason, decision.rationale, now)
                        .await
                }
                None => InstrumentOutcome::Held,
            });
        }

        let decision = self.entry.decide(&snapshot, &indicators).await?;
        Ok(match decision {
            Some(decision) => self.open_position(decision, balance, now).await,
            None => InstrumentOutcome::NoEntry,
        })
    }

    async fn open_position(
        &mut self,
        decision: EntryDecision,
        balance: Decimal,
        now: DateTime<Utc>,
    ) -> InstrumentOutcome {
        let instrument = decision.instrument.as_str();
        let amount = (balance * self.config.order_size_pct).round_dp(8);
        if amount < self.config.min_order_amount {
            info!(
                instrument = %instrument,
                amount = %amount,
                min_order_amount = %self.config.min_order_amount,
                "Order amount below minimum, skipping entry"
            );
            return InstrumentOutcome::Skipped {
                reason: format!(
                    "order amount {amount} below minimum {}",
                    self.config.min_order_amount
                ),
            };
        }

        let fill = match self.exchange.open(instrument, amount).await {
            Ok(fill) if fill.quantity > Decimal::ZERO => fill,
            Ok(_) => {
                warn!(instrument = %instrument, "Open returned an empty fill");
                return InstrumentOutcome::Failed {
                    error: "empty fill".to_string(),
                };
            }
            Err(e) => {
                warn!(instrument = %instrument, error = %e, "Open failed, will retry next tick");
                return InstrumentOutcome::Failed {
                    error: e.to_string(),
                };
            }
        };

        if fill.instrument != instrument {
            warn!(
                requested = %instrument,
                filled = %fill.instrument,
                "Fill instrument differs from order, keying by order"
            );
        }
        let position = Position {
            instrument: instrument.to_string(),
            ..Position::from_fill(&fill, now)
        };

        let record = OpenRecord {
            instrument: position.instrument.clone(),
            entry_price: position.entry_price,
            quantity: position.quantity,
            entry_time: position.entry_time,
            entry_fee: position.entry_fee,
            order_ref: position.external_trade_reference.clone(),
            rationale: decision.rationale.clone(),
        };
        if let Err(e) = self.journal.record_open(&record).await {
            error!(instrument = %instrument, error = %e, "Failed to journal open");
        }

        info!(
            instrument = %instrument,
            entry_price = %position.entry_price,
            quantity = %position.quantity,
            amount = %amount,
            confidence = decision.confidence,
            source = ?decision.source,
            "Position opened"
        );

        let outcome = InstrumentOutcome::Opened {
            entry_price: position.entry_price,
            quantity: position.quantity,
            source: decision.source,
            rationale: decision.rationale,
        };
        self.exit.track(&position);
        self.positions.insert(position.instrument.clone(), position);
        outcome
    }

    async fn close_position(
        &mut self,
        position: &Position,
        reason: ExitReason,
        rationale: String,
        now: DateTime<Utc>,
    ) -> InstrumentOutcome {
        let instrument = position.instrument.as_str();
        let fill = match self.exchange.close(instrument).await {
            Ok(fill) => fill,
            Err(e) => {
                warn!(
                    instrument = %instrument,
                    reason = %reason,
                    error = %e,
                    "Close failed, will retry next tick"
                );
                return InstrumentOutcome::Failed {
                    error: e.to_string(),
                };
            }
        };

        let pnl = position.realize(&fill, now);
        let record = CloseRecord {
            instrument: instrument.to_string(),
            exit_price: fill.price,
            pnl_fraction: pnl.pnl_fraction,
            pnl_amount: pnl.pnl_amount,
            exit_reason: reason,
            holding_secs: pnl.holding_secs,
            rationale: rationale.clone(),
        };
        if let Err(e) = self.journal.record_close(&record).await {
            error!(instrument = %instrument, error = %e, "Failed to journal close");
        }

        self.breaker.record_outcome(pnl.pnl_fraction);
        self.exit.untrack(instrument);
        self.positions.remove(instrument);

        info!(
            instrument = %instrument,
            reason = %reason,
            exit_price = %fill.price,
            pnl_fraction = %pnl.pnl_fraction,
            pnl_amount = %pnl.pnl_amount,
            holding_secs = pnl.holding_secs,
            "Position closed"
        );

        InstrumentOutcome::Closed {
            reason,
            pnl_fraction: pnl.pnl_fraction,
            pnl_amount: pnl.pnl_amount,
            rationale,
        }
    }

    async fn liquidate_all(
        &mut self,
        verdict: &RiskVerdict,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) {
        let open: Vec<Position> = self.positions.values().cloned().collect();
        for position in open {
            let outcome = self
                .close_position(
                    &position,
                    ExitReason::RiskLiquidation,
                    verdict.rationale(),
                    now,
                )
                .await;
            report.push(&position.instrument, outcome);
        }

        self.liquidation_pending = !self.positions.is_empty();
        if self.liquidation_pending {
            error!(
                remaining = self.positions.len(),
                "Liquidation incomplete, retrying next tick"
            );
        }
    }

    /// Current balance marks, and whether they are durable. Marks built after
    /// a failed load are used for this tick only, so the next tick retries.
    async fn load_marks(&mut self, balance: Decimal, now: DateTime<Utc>) -> (BalanceMarks, bool) {
        if let Some(marks) = &self.marks {
            return (marks.clone(), true);
        }

        match self.journal.load_balance_marks().await {
            Ok(Some(marks)) => (marks, true),
            Ok(None) => {
                info!(balance = %balance, "No saved balance marks, anchoring at current balance");
                let marks = BalanceMarks::new(balance, now);
                self.save_marks(&marks).await;
                (marks, true)
            }
            Err(e) => {
                warn!(error = %e, "Failed to load balance marks, using current balance for this tick");
                (BalanceMarks::new(balance, now), false)
            }
        }
    }

    async fn save_marks(&self, marks: &BalanceMarks) {
        if let Err(e) = self.journal.save_balance_marks(marks).await {
            error!(error = %e, "Failed to persist balance marks");
        }
    }
}
