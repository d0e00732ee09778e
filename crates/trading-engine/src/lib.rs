//! Trading Engine
//!
//! Entry and exit decision engines and the orchestration loop that drives
//! them under the circuit breaker.

mod advisory;
pub mod entry;
pub mod exit;
pub mod orchestrator;
pub mod paper;

pub use entry::{EntryConfig, EntryEngine};
pub use exit::{ExitConfig, ExitEngine, PositionWatch};
pub use orchestrator::{InstrumentOutcome, InstrumentReport, Orchestrator, TickReport};
pub use paper::PaperExchange;
