//! Error types for the autotrader core.
//!
//! Four failure classes exist and each is handled differently:
//! advisory errors are recovered where they occur, execution errors are
//! surfaced to the loop and retried next tick, contract violations propagate,
//! and risk-limit breaches are verdicts rather than errors.

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration file error: {0}")]
    ConfigFile(#[from] config::ConfigError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Contract violation: {0}")]
    Contract(#[from] ContractViolation),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure of the AI advisory collaborator.
///
/// Never a malformed-but-successful response; callers apply a per-site
/// fallback policy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdvisoryError {
    #[error("advisory request timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("advisory service unavailable: {message}")]
    Unavailable { message: String },

    #[error("advisory response rejected: {message}")]
    InvalidResponse { message: String },
}

/// Order placement or account query failure reported by the exchange.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: Decimal, available: Decimal },

    #[error("order rejected: {message}")]
    OrderRejected { message: String },

    #[error("no open holding for {instrument}")]
    NoPosition { instrument: String },

    #[error("exchange call timed out")]
    Timeout,

    #[error("exchange connectivity error: {message}")]
    Connectivity { message: String },
}

/// A collaborator handed the core data that breaks its contract.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContractViolation {
    #[error("signal_count {count} for {instrument} is outside 0..=4")]
    SignalCountOutOfRange { instrument: String, count: u8 },

    #[error("{field} for {instrument} has invalid value {value}")]
    FieldOutOfRange {
        instrument: String,
        field: &'static str,
        value: f64,
    },

    #[error("indicator result for {expected} was computed for {actual}")]
    InstrumentMismatch { expected: String, actual: String },
}
