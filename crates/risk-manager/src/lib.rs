//! Risk Manager
//!
//! Account-level circuit breaker and per-position trailing stops.

pub mod circuit_breaker;
pub mod trailing_stop;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, RiskState, RiskVerdict, TripReason,
};
pub use trailing_stop::{TrailingSignal, TrailingStop, TrailingStopState};
