//! Trailing stop that arms once a position is in profit.
//!
//! Before activation the tracker never stops a position out; the fixed
//! stop-loss covers that range. After activation the stop trails the
//! highest observed price and only ever moves up.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Result of feeding a price to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrailingSignal {
    Stop,
    Continue,
}

/// Snapshot of the tracker's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrailingStopState {
    pub entry_price: Decimal,
    /// Price at which the stop arms.
    pub activation_price: Decimal,
    pub activated: bool,
    /// Highest price seen while tracking.
    pub highest_price: Decimal,
    /// Current stop level (zero until activation).
    pub stop_price: Decimal,
}

/// Per-position trailing stop.
#[derive(Debug, Clone)]
pub struct TrailingStop {
    state: TrailingStopState,
    /// Distance below the highest price (e.g., 0.01 = 1%).
    offset_pct: Decimal,
}

impl TrailingStop {
    /// Create a tracker for a position opened at `entry_price`.
    pub fn new(entry_price: Decimal, activation_pct: Decimal, offset_pct: Decimal) -> Self {
        Self {
            state: TrailingStopState {
                entry_price,
                activation_price: entry_price * (Decimal::ONE + activation_pct),
                activated: false,
                highest_price: entry_price,
                stop_price: Decimal::ZERO,
            },
            offset_pct,
        }
    }

    /// Feed the latest price.
    pub fn update(&mut self, current_price: Decimal) -> TrailingSignal {
        let state = &mut self.state;

        let activating = !state.activated;
        if activating {
            if current_price < state.activation_price {
                return TrailingSignal::Continue;
            }
            state.activated = true;
            debug!(
                activation_price = %state.activation_price,
                current_price = %current_price,
                "Trailing stop activated"
            );
        }

        // The activating update always arms the stop, even without a new peak.
        if activating || current_price > state.highest_price {
            state.highest_price = state.highest_price.max(current_price);
            let candidate = state.highest_price * (Decimal::ONE - self.offset_pct);
            if candidate > state.stop_price {
                state.stop_price = candidate;
                debug!(
                    new_peak = %state.highest_price,
                    stop_price = %state.stop_price,
                    "Raised trailing stop"
                );
            }
        }

        if current_price <= state.stop_price {
            TrailingSignal::Stop
        } else {
            TrailingSignal::Continue
        }
    }

    pub fn is_activated(&self) -> bool {
        self.state.activated
    }

    /// Current stop level, once armed.
    pub fn stop_price(&self) -> Option<Decimal> {
        self.state.activated.then_some(self.state.stop_price)
    }

    pub fn highest_price(&self) -> Decimal {
        self.state.highest_price
    }

    pub fn state(&self) -> &TrailingStopState {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> TrailingStop {
        // Entry at 100, arms at +0.5%, trails 1%
        TrailingStop::new(Decimal::new(100, 0), Decimal::new(5, 3), Decimal::new(1, 2))
    }

    #[test]
    fn test_price_sequence() {
        let mut stop = tracker();

        assert_eq!(stop.update(Decimal::new(1006, 1)), TrailingSignal::Continue);
        assert!(stop.is_activated());

        assert_eq!(stop.update(Decimal::new(105, 0)), TrailingSignal::Continue);
        assert_eq!(stop.highest_price(), Decimal::new(105, 0));
        assert_eq!(stop.stop_price(), Some(Decimal::new(10395, 2)));

        assert_eq!(stop.update(Decimal::new(104, 0)), TrailingSignal::Continue);
        assert_eq!(stop.update(Decimal::new(1039, 1)), TrailingSignal::Stop);
    }

    #[test]
    fn test_no_stop_before_activation() {
        let mut stop = tracker();
        assert_eq!(stop.update(Decimal::new(90, 0)), TrailingSignal::Continue);
        assert_eq!(stop.update(Decimal::new(1004, 1)), TrailingSignal::Continue);
        assert!(!stop.is_activated());
        assert_eq!(stop.stop_price(), None);
    }

    #[test]
    fn test_activation_is_one_way() {
        let mut stop = tracker();
        stop.update(Decimal::new(101, 0));
        assert!(stop.is_activated());

        stop.update(Decimal::new(95, 0));
        assert!(stop.is_activated());
        stop.update(Decimal::new(100, 0));
        assert!(stop.is_activated());
    }

    #[test]
    fn test_stop_price_never_decreases() {
        let mut stop = tracker();
        let prices = [101, 103, 102, 99, 104, 100, 110, 97, 108];
        let mut last_stop = Decimal::ZERO;
        let mut last_high = Decimal::ZERO;

        for price in prices {
            stop.update(Decimal::new(price, 0));
            let state = stop.state();
            assert!(state.stop_price >= last_stop);
            assert!(state.highest_price >= last_high);
            last_stop = state.stop_price;
            last_high = state.highest_price;
        }

        assert_eq!(last_high, Decimal::new(110, 0));
        assert_eq!(last_stop, Decimal::new(1089, 1));
    }

    #[test]
    fn test_stop_repeats_while_below_level() {
        let mut stop = tracker();
        stop.update(Decimal::new(110, 0));
        assert_eq!(stop.update(Decimal::new(108, 0)), TrailingSignal::Stop);
        assert_eq!(stop.update(Decimal::new(107, 0)), TrailingSignal::Stop);
    }

    #[test]
    fn test_activation_without_new_peak_arms_stop() {
        // Non-positive activation: arms at or below entry
        let mut stop =
            TrailingStop::new(Decimal::new(100, 0), Decimal::new(-1, 2), Decimal::new(1, 2));

        assert_eq!(stop.update(Decimal::new(995, 1)), TrailingSignal::Continue);
        assert!(stop.is_activated());
        assert_eq!(stop.highest_price(), Decimal::new(100, 0));
        assert_eq!(stop.stop_price(), Some(Decimal::new(99, 0)));
        assert_eq!(stop.update(Decimal::new(989, 1)), TrailingSignal::Stop);
    }

    #[test]
    fn test_zero_activation_arms_at_entry() {
        let mut stop = TrailingStop::new(Decimal::new(100, 0), Decimal::ZERO, Decimal::new(1, 2));

        assert_eq!(stop.update(Decimal::new(100, 0)), TrailingSignal::Continue);
        assert_eq!(stop.stop_price(), Some(Decimal::new(99, 0)));
    }
}
