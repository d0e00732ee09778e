//! Core domain types for the autotrader system.

pub mod account;
pub mod advice;
pub mod decision;
pub mod indicator;
pub mod market;
pub mod order;
pub mod position;

pub use account::*;
pub use advice::*;
pub use decision::*;
pub use indicator::*;
pub use market::*;
pub use order::*;
pub use position::*;
