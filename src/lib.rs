//! Autotrader: decision and safety core for an unattended trading agent
//!
//! This is the root crate that provides benchmark and integration test
//! access to the member crates:
//!
//! - `trader-core`: Domain types, collaborator ports, configuration, errors
//! - `risk-manager`: Account circuit breaker, trailing stop tracker
//! - `trading-engine`: Entry/exit decision engines, orchestration loop, paper exchange

pub use risk_manager as risk;
pub use trader_core as core;
pub use trading_engine as trading;
