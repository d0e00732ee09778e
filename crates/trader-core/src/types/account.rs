//! Account balance reference points used by the circuit breaker.

use chrono::{DateTime, Datelike, Local, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Balance at the start of the trading day and the month's high-water mark.
///
/// Rollover happens on local calendar boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceMarks {
    pub today_start_balance: Decimal,
    pub trading_day: NaiveDate,
    pub monthly_high_balance: Decimal,
    /// First day of the month the high-water mark belongs to.
    pub trading_month: NaiveDate,
}

impl BalanceMarks {
    /// Fresh marks anchored at `balance`.
    pub fn new(balance: Decimal, now: DateTime<Utc>) -> Self {
        let day = now.with_timezone(&Local).date_naive();
        Self {
            today_start_balance: balance,
            trading_day: day,
            monthly_high_balance: balance,
            trading_month: month_start(day),
        }
    }

    /// Roll the day and month anchors forward if `now` is past them.
    /// Returns true if anything changed.
    pub fn roll(&mut self, balance: Decimal, now: DateTime<Utc>) -> bool {
        let day = now.with_timezone(&Local).date_naive();
        let mut changed = false;

        if day > self.trading_day {
            self.today_start_balance = balance;
            self.trading_day = day;
            changed = true;
        }

        let month = month_start(day);
        if month > self.trading_month {
            self.monthly_high_balance = balance;
            self.trading_month = month;
            changed = true;
        }

        changed
    }

    /// Raise the monthly high-water mark. Returns true if it rose.
    pub fn raise_high(&mut self, high: Decimal) -> bool {
        if high > self.monthly_high_balance {
            self.monthly_high_balance = high;
            true
        } else {
            false
        }
    }
}

fn month_start(day: NaiveDate) -> NaiveDate {
    day.with_day(1).unwrap_or(day)
}
