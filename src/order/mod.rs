pub mod types;

pub use types::{
    MarketBuyOrder, MarketOrder, MarketSellOrder, Order, OrderDetails, Price, QueuedOrder,
    StopBuyOrder, StopOrder, StopSellOrder,
};
