pub mod filter;
pub mod queue;

pub use filter::{
    DispatchFilter, MarketDispatchFilter, StopBuyDispatchFilter, StopSellDispatchFilter,
};
pub use queue::{DispatchPriority, OrderProcessor, OrderQueue};
