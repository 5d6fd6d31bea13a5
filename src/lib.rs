//! Simple Broker: accepts market and stop orders, holds stop orders until the
//! instrument's price crosses their trigger, and executes market orders against
//! an exchange while the market is open.
//!
//! - `dispatch`: the generic threshold-gated order queue and its filters
//! - `broker`: per-instrument order managers and the broker façade
//! - `order`: order variants
//! - `exchange` / `account`: collaborator traits with in-memory implementations
//! - `core`: configuration, logging and health

pub mod account;
pub mod broker;
pub mod core;
pub mod dispatch;
pub mod error;
pub mod exchange;
pub mod order;

pub use broker::{OrderManager, SimpleBroker};
pub use dispatch::{DispatchFilter, DispatchPriority, OrderQueue};
pub use error::{BrokerError, BrokerResult};
