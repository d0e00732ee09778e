//! Trader Core Library
//!
//! Shared domain types, collaborator ports, configuration, and error taxonomy
//! for the autotrader decision-and-safety core.

pub mod config;
pub mod error;
pub mod logging;
pub mod ports;
pub mod types;

pub use config::TradingConfig;
pub use error::{AdvisoryError, ContractViolation, Error, ExecutionError, Result};
