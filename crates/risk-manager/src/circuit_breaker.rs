//! Circuit breaker for account-level trading halts.
//!
//! Three conditions gate trading: the daily loss limit, the monthly drawdown
//! limit, and the consecutive-loss streak. Any breach starts a pause that is
//! lifted lazily by the first check made after its resume time.

use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use trader_core::TradingConfig;

/// Reason for circuit breaker activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripReason {
    /// Daily loss limit exceeded.
    DailyLossLimit,
    /// Monthly drawdown limit exceeded.
    MonthlyDrawdown,
    /// Too many consecutive losses.
    ConsecutiveLosses,
    /// Manual activation.
    Manual,
}

/// Configuration for circuit breaker thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Daily P&L fraction that halts trading until local midnight (e.g., -0.05).
    pub daily_loss_limit: Decimal,
    /// Drawdown fraction from the monthly high that halts trading until next month.
    pub monthly_drawdown_limit: Decimal,
    /// Number of consecutive losses before a timed pause.
    pub consecutive_loss_limit: u32,
    /// Length of a consecutive-loss pause (in minutes).
    pub pause_minutes: i64,
    /// Whether circuit breaker is enabled.
    pub enabled: bool,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            daily_loss_limit: Decimal::new(-5, 2),        // -5% per day
            monthly_drawdown_limit: Decimal::new(-15, 2), // -15% from monthly high
            consecutive_loss_limit: 3,
            pause_minutes: 24 * 60,
            enabled: true,
        }
    }
}

impl From<&TradingConfig> for CircuitBreakerConfig {
    fn from(config: &TradingConfig) -> Self {
        Self {
            daily_loss_limit: config.daily_loss_limit,
            monthly_drawdown_limit: config.monthly_drawdown_limit,
            consecutive_loss_limit: config.consecutive_loss_limit,
            pause_minutes: config.pause_duration().num_minutes(),
            enabled: config.risk_enabled,
        }
    }
}

/// Mutable breaker state. Only the breaker writes it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskState {
    /// Count of consecutive losing trades.
    pub consecutive_losses: u32,
    /// When trading can resume (if paused).
    pub pause_until: Option<DateTime<Utc>>,
    /// Reason for the current pause.
    pub pause_reason: Option<TripReason>,
    /// When the current pause started.
    pub tripped_at: Option<DateTime<Utc>>,
}

/// Outcome of one breaker evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RiskVerdict {
    /// Trading allowed.
    Ok { high_water_mark: Decimal },
    /// An earlier breach is still in force.
    Paused {
        reason: Option<TripReason>,
        resume_at: DateTime<Utc>,
    },
    /// Daily loss limit breached; halted until next local midnight.
    StopTrading {
        daily_pnl: Decimal,
        resume_at: DateTime<Utc>,
        high_water_mark: Decimal,
    },
    /// Monthly drawdown limit breached; halted until next month.
    EmergencyStop {
        drawdown: Decimal,
        resume_at: DateTime<Utc>,
        high_water_mark: Decimal,
    },
    /// Consecutive-loss streak reached; fixed-length pause.
    Pause {
        consecutive_losses: u32,
        resume_at: DateTime<Utc>,
        high_water_mark: Decimal,
    },
}

impl RiskVerdict {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    /// Whether every open position must be closed before honouring the pause.
    pub fn requires_liquidation(&self) -> bool {
        matches!(
            self,
            Self::StopTrading { .. } | Self::EmergencyStop { .. } | Self::Pause { .. }
        )
    }

    /// High-water mark the caller should persist, if this evaluation computed one.
    pub fn high_water_mark(&self) -> Option<Decimal> {
        match self {
            Self::Ok { high_water_mark }
            | Self::StopTrading {
                high_water_mark, ..
            }
            | Self::EmergencyStop {
                high_water_mark, ..
            }
            | Self::Pause {
                high_water_mark, ..
            } => Some(*high_water_mark),
            Self::Paused { .. } => None,
        }
    }

    pub fn resume_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Ok { .. } => None,
            Self::Paused { resume_at, .. }
            | Self::StopTrading { resume_at, .. }
            | Self::EmergencyStop { resume_at, .. }
            | Self::Pause { resume_at, .. } => Some(*resume_at),
        }
    }

    /// Human-readable explanation for display and logs.
    pub fn rationale(&self) -> String {
        match self {
            Self::Ok { high_water_mark } => {
                format!("risk limits clear (monthly high {high_water_mark})")
            }
            Self::Paused { reason, resume_at } => match reason {
                Some(reason) => format!("trading paused ({reason:?}) until {resume_at}"),
                None => format!("trading paused until {resume_at}"),
            },
            Self::StopTrading {
                daily_pnl,
                resume_at,
                ..
            } => format!(
                "daily loss {}% breached limit; trading stopped until {resume_at}",
                (*daily_pnl * Decimal::ONE_HUNDRED).round_dp(2)
            ),
            Self::EmergencyStop {
                drawdown,
                resume_at,
                ..
            } => format!(
                "monthly drawdown {}% breached limit; emergency stop until {resume_at}",
                (*drawdown * Decimal::ONE_HUNDRED).round_dp(2)
            ),
            Self::Pause {
                consecutive_losses,
                resume_at,
                ..
            } => format!(
                "{consecutive_losses} consecutive losses; trading paused until {resume_at}"
            ),
        }
    }
}

/// Circuit breaker for account-level trading halts.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: RiskState,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with clean state.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: RiskState::default(),
        }
    }

    /// Create a circuit breaker resuming from previously saved state.
    pub fn with_state(config: CircuitBreakerConfig, state: RiskState) -> Self {
        Self { config, state }
    }

    /// Evaluate the account at the current time.
    pub fn evaluate(
        &mut self,
        current_balance: Decimal,
        today_start_balance: Decimal,
        monthly_high_balance: Decimal,
    ) -> RiskVerdict {
        self.evaluate_at(
            Utc::now(),
            current_balance,
            today_start_balance,
            monthly_high_balance,
        )
    }

    /// Evaluate the account at `now`.
    pub fn evaluate_at(
        &mut self,
        now: DateTime<Utc>,
        current_balance: Decimal,
        today_start_balance: Decimal,
        monthly_high_balance: Decimal,
    ) -> RiskVerdict {
        let today_start = if today_start_balance <= Decimal::ZERO {
            warn!(
                today_start_balance = %today_start_balance,
                current_balance = %current_balance,
                "Non-positive day start balance, using current balance"
            );
            current_balance
        } else {
            today_start_balance
        };
        let monthly_high = if monthly_high_balance <= Decimal::ZERO {
            warn!(
                monthly_high_balance = %monthly_high_balance,
                current_balance = %current_balance,
                "Non-positive monthly high, using current balance"
            );
            current_balance
        } else {
            monthly_high_balance
        };

        let new_high = monthly_high.max(current_balance);

        if !self.config.enabled {
            return RiskVerdict::Ok {
                high_water_mark: new_high,
            };
        }

        if self.is_paused(now) {
            if let Some(resume_at) = self.state.pause_until {
                return RiskVerdict::Paused {
                    reason: self.state.pause_reason,
                    resume_at,
                };
            }
        }

        // Daily loss limit
        if today_start > Decimal::ZERO {
            let daily_pnl = (current_balance - today_start) / today_start;
            if daily_pnl <= self.config.daily_loss_limit {
                let resume_at = next_local_midnight(now);
                self.trip(now, TripReason::DailyLossLimit, resume_at);
                return RiskVerdict::StopTrading {
                    daily_pnl,
                    resume_at,
                    high_water_mark: new_high,
                };
            }
        }

        // Monthly drawdown from the high-water mark
        if new_high > Decimal::ZERO {
            let drawdown = (current_balance - new_high) / new_high;
            if drawdown <= self.config.monthly_drawdown_limit {
                let resume_at = next_local_month_start(now);
                self.trip(now, TripReason::MonthlyDrawdown, resume_at);
                return RiskVerdict::EmergencyStop {
                    drawdown,
                    resume_at,
                    high_water_mark: new_high,
                };
            }
        }

        // Consecutive losses
        if self.state.consecutive_losses >= self.config.consecutive_loss_limit {
            let resume_at = now + Duration::minutes(self.config.pause_minutes);
            let consecutive_losses = self.state.consecutive_losses;
            self.trip(now, TripReason::ConsecutiveLosses, resume_at);
            return RiskVerdict::Pause {
                consecutive_losses,
                resume_at,
                high_water_mark: new_high,
            };
        }

        debug!(
            current_balance = %current_balance,
            high_water_mark = %new_high,
            consecutive_losses = self.state.consecutive_losses,
            "Risk limits clear"
        );

        RiskVerdict::Ok {
            high_water_mark: new_high,
        }
    }

    /// Record a closed trade's return.
    ///
    /// Must be called exactly once per closed position; a second call for the
    /// same close double-counts the streak.
    pub fn record_outcome(&mut self, pnl_fraction: Decimal) {
        if pnl_fraction < Decimal::ZERO {
            self.state.consecutive_losses += 1;
        } else {
            self.state.consecutive_losses = 0;
        }

        debug!(
            pnl_fraction = %pnl_fraction,
            consecutive_losses = self.state.consecutive_losses,
            "Recorded trade outcome"
        );
    }

    /// Check whether a pause is in force at `now`.
    ///
    /// The first call after an expired pause clears it and resets the loss
    /// streak, so a resumed breaker does not immediately re-trip on old losses.
    pub fn is_paused(&mut self, now: DateTime<Utc>) -> bool {
        match self.state.pause_until {
            Some(resume_at) if now < resume_at => true,
            Some(resume_at) => {
                info!(
                    reason = ?self.state.pause_reason,
                    resume_at = %resume_at,
                    cleared_losses = self.state.consecutive_losses,
                    "Circuit breaker pause expired, trading resumed"
                );
                self.state.pause_until = None;
                self.state.pause_reason = None;
                self.state.tripped_at = None;
                self.state.consecutive_losses = 0;
                false
            }
            None => false,
        }
    }

    /// Manually pause trading until `until`.
    pub fn manual_pause(&mut self, now: DateTime<Utc>, until: DateTime<Utc>) {
        warn!(resume_at = %until, "Manual circuit breaker pause");
        self.trip(now, TripReason::Manual, until);
    }

    pub fn consecutive_losses(&self) -> u32 {
        self.state.consecutive_losses
    }

    /// Get current state.
    pub fn state(&self) -> &RiskState {
        &self.state
    }

    /// Replace state, e.g. after loading it from storage.
    pub fn restore(&mut self, state: RiskState) {
        info!(
            consecutive_losses = state.consecutive_losses,
            pause_until = ?state.pause_until,
            "Circuit breaker state restored"
        );
        self.state = state;
    }

    /// Get current configuration.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn trip(&mut self, now: DateTime<Utc>, reason: TripReason, resume_at: DateTime<Utc>) {
        self.state.pause_until = Some(resume_at);
        self.state.pause_reason = Some(reason);
        self.state.tripped_at = Some(now);

        error!(
            reason = ?reason,
            resume_at = %resume_at,
            consecutive_losses = self.state.consecutive_losses,
            "Circuit breaker TRIPPED - trading halted"
        );
    }
}

/// Start of the next local calendar day.
fn next_local_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    let today = now.with_timezone(&Local).date_naive();
    match today.succ_opt() {
        Some(tomorrow) => local_day_start(tomorrow).unwrap_or(now + Duration::days(1)),
        None => now + Duration::days(1),
    }
}

/// First instant of the next local calendar month.
fn next_local_month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let today = now.with_timezone(&Local).date_naive();
    let (year, month) = if today.month() == 12 {
        (today.year() + 1, 1)
    } else {
        (today.year(), today.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(local_day_start)
        .unwrap_or(now + Duration::days(31))
}

fn local_day_start(day: NaiveDate) -> Option<DateTime<Utc>> {
    day.and_time(NaiveTime::MIN)
        .and_local_timezone(Local)
        .earliest()
        .map(|start| start.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig::default())
    }

    fn d(value: i64) -> Decimal {
        Decimal::new(value, 0)
    }

    #[test]
    fn test_flat_account_is_ok() {
        let mut breaker = breaker();
        for balance in [d(1), d(100), d(1_000_000), Decimal::new(12345, 2)] {
            let verdict = breaker.evaluate(balance, balance, balance);
            assert_eq!(
                verdict,
                RiskVerdict::Ok {
                    high_water_mark: balance
                }
            );
        }
    }

    #[test]
    fn test_high_water_mark_is_monotonic() {
        let mut breaker = breaker();
        let mut high = d(1000);
        let mut last = Decimal::ZERO;
        for balance in [1000, 1000, 1010, 1050, 1050, 1200] {
            let verdict = breaker.evaluate(d(balance), d(1000), high);
            let mark = verdict.high_water_mark().unwrap();
            assert!(mark >= last);
            last = mark;
            high = mark;
        }
        assert_eq!(high, d(1200));
    }

    #[test]
    fn test_daily_limit_inclusive_boundary() {
        let now = Utc::now();

        // Exactly -5%
        let mut breaker = breaker();
        let verdict = breaker.evaluate_at(now, d(950), d(1000), d(1000));
        assert!(matches!(verdict, RiskVerdict::StopTrading { .. }));
        assert!(verdict.requires_liquidation());

        // Just above the limit
        let mut breaker = self::breaker();
        let verdict = breaker.evaluate_at(now, Decimal::new(9501, 1), d(1000), d(1000));
        assert!(verdict.is_ok());
    }

    #[test]
    fn test_daily_stop_resumes_at_local_midnight() {
        let now = Utc::now();
        let mut breaker = breaker();
        let verdict = breaker.evaluate_at(now, d(900), d(1000), d(1000));
        let resume_at = verdict.resume_at().unwrap();

        assert!(resume_at > now);
        assert!(resume_at - now <= Duration::hours(25));
        let local = resume_at.with_timezone(&Local);
        assert_eq!((local.hour(), local.minute(), local.second()), (0, 0, 0));
        assert_eq!(breaker.state().pause_reason, Some(TripReason::DailyLossLimit));
    }

    #[test]
    fn test_monthly_drawdown_emergency_stop() {
        let now = Utc::now();
        let mut breaker = breaker();
        // Day is flat, but 15% below the monthly high
        let verdict = breaker.evaluate_at(now, d(850), d(850), d(1000));

        match verdict {
            RiskVerdict::EmergencyStop {
                drawdown,
                resume_at,
                high_water_mark,
            } => {
                assert_eq!(drawdown, Decimal::new(-15, 2));
                assert_eq!(high_water_mark, d(1000));
                let local = resume_at.with_timezone(&Local);
                assert_eq!(local.day(), 1);
                assert_eq!(local.hour(), 0);
                assert!(resume_at > now);
            }
            other => panic!("expected emergency stop, got {other:?}"),
        }
    }

    #[test]
    fn test_daily_limit_checked_before_drawdown() {
        let mut breaker = breaker();
        let verdict = breaker.evaluate(d(800), d(1000), d(1000));
        assert!(matches!(verdict, RiskVerdict::StopTrading { .. }));
    }

    #[test]
    fn test_non_positive_marks_are_normalized() {
        let mut breaker = breaker();
        let verdict = breaker.evaluate(d(500), Decimal::ZERO, d(-1));
        assert_eq!(
            verdict,
            RiskVerdict::Ok {
                high_water_mark: d(500)
            }
        );
    }

    #[test]
    fn test_consecutive_losses_pause() {
        let now = Utc::now();
        let mut breaker = breaker();
        for _ in 0..3 {
            breaker.record_outcome(Decimal::new(-1, 2));
        }

        let verdict = breaker.evaluate_at(now, d(1000), d(1000), d(1000));
        match verdict {
            RiskVerdict::Pause {
                consecutive_losses,
                resume_at,
                ..
            } => {
                assert_eq!(consecutive_losses, 3);
                assert_eq!(resume_at, now + Duration::hours(24));
            }
            other => panic!("expected pause, got {other:?}"),
        }

        // Subsequent evaluations report the pause without re-tripping
        let verdict = breaker.evaluate_at(now + Duration::hours(1), d(1000), d(1000), d(1000));
        assert!(matches!(
            verdict,
            RiskVerdict::Paused {
                reason: Some(TripReason::ConsecutiveLosses),
                ..
            }
        ));
        assert!(!verdict.requires_liquidation());
    }

    #[test]
    fn test_win_resets_consecutive_losses() {
        let mut breaker = breaker();
        breaker.record_outcome(Decimal::new(-1, 2));
        breaker.record_outcome(Decimal::new(-1, 2));
        breaker.record_outcome(Decimal::ZERO);
        assert_eq!(breaker.consecutive_losses(), 0);

        breaker.record_outcome(Decimal::new(-1, 2));
        breaker.record_outcome(Decimal::new(-1, 2));
        assert!(breaker.evaluate(d(1000), d(1000), d(1000)).is_ok());
    }

    #[test]
    fn test_pause_expiry_resets_streak() {
        let start = Utc::now();
        let mut breaker = breaker();
        for _ in 0..3 {
            breaker.record_outcome(Decimal::new(-1, 2));
        }
        breaker.evaluate_at(start, d(1000), d(1000), d(1000));

        assert!(breaker.is_paused(start));
        assert!(breaker.is_paused(start + Duration::hours(24) - Duration::seconds(1)));
        assert_eq!(breaker.consecutive_losses(), 3);

        assert!(!breaker.is_paused(start + Duration::hours(24)));
        assert_eq!(breaker.consecutive_losses(), 0);
        assert_eq!(breaker.state().pause_until, None);

        // Fresh start is not immediately re-paused
        let verdict =
            breaker.evaluate_at(start + Duration::hours(24), d(1000), d(1000), d(1000));
        assert!(verdict.is_ok());
    }

    #[test]
    fn test_manual_pause() {
        let now = Utc::now();
        let mut breaker = breaker();
        breaker.manual_pause(now, now + Duration::minutes(10));

        let verdict = breaker.evaluate_at(now, d(1000), d(1000), d(1000));
        assert_eq!(
            verdict,
            RiskVerdict::Paused {
                reason: Some(TripReason::Manual),
                resume_at: now + Duration::minutes(10),
            }
        );
        assert!(!breaker.is_paused(now + Duration::minutes(10)));
    }

    #[test]
    fn test_disabled_breaker() {
        let config = CircuitBreakerConfig {
            enabled: false,
            ..Default::default()
        };
        let mut breaker = CircuitBreaker::new(config);
        let verdict = breaker.evaluate(d(1), d(1000), d(1000));
        assert!(verdict.is_ok());
    }

    #[test]
    fn test_restore_state() {
        let now = Utc::now();
        let mut breaker = breaker();
        breaker.restore(RiskState {
            consecutive_losses: 2,
            pause_until: Some(now + Duration::hours(1)),
            pause_reason: Some(TripReason::DailyLossLimit),
            tripped_at: Some(now),
        });
        assert!(breaker.is_paused(now));
        assert_eq!(breaker.consecutive_losses(), 2);
    }

    #[test]
    fn test_config_from_trading_config() {
        let trading = TradingConfig::default();
        let config = CircuitBreakerConfig::from(&trading);
        assert_eq!(config.pause_minutes, 24 * 60);
        assert_eq!(config.consecutive_loss_limit, trading.consecutive_loss_limit);
    }

    #[test]
    fn test_verdict_serializes_with_status_tag() {
        let verdict = RiskVerdict::Ok {
            high_water_mark: d(1000),
        };
        let json = serde_json::to_value(&verdict).unwrap();
        assert_eq!(json["status"], "ok");
        assert!(verdict.rationale().contains("1000"));
    }
}
