use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Prices are whole cents.
pub type Price = i64;

static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_sequence() -> u64 {
    NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed)
}

/// Attributes shared by every order variant. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDetails {
    id: Uuid,
    sequence: u64,
    account_id: String,
    ticker: String,
    quantity: u32,
    price: Price,
    created_at: DateTime<Utc>,
}

impl OrderDetails {
    fn new(account_id: &str, ticker: &str, quantity: u32, price: Price) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence: next_sequence(),
            account_id: account_id.to_string(),
            ticker: ticker.to_string(),
            quantity,
            price,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Creation order across the whole process; used to break dispatch ties.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    /// Market price for market orders, trigger price for stop orders.
    pub fn price(&self) -> Price {
        self.price
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Anything an order queue can hold.
pub trait QueuedOrder: fmt::Debug + Send + 'static {
    fn details(&self) -> &OrderDetails;
}

macro_rules! order_variant {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        pub struct $name(OrderDetails);

        impl $name {
            pub fn new(account_id: &str, ticker: &str, quantity: u32, price: Price) -> Self {
                Self(OrderDetails::new(account_id, ticker, quantity, price))
            }
        }

        impl std::ops::Deref for $name {
            type Target = OrderDetails;

            fn deref(&self) -> &OrderDetails {
                &self.0
            }
        }

        impl QueuedOrder for $name {
            fn details(&self) -> &OrderDetails {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(
                    f,
                    "{} #{} [{}] {} x {} @ {}",
                    $label,
                    self.0.sequence,
                    self.0.account_id,
                    self.0.ticker,
                    self.0.quantity,
                    self.0.price
                )
            }
        }
    };
}

order_variant!(
    /// Buy at the current market price once the exchange is open.
    MarketBuyOrder,
    "MarketBuy"
);
order_variant!(
    /// Sell at the current market price once the exchange is open.
    MarketSellOrder,
    "MarketSell"
);
order_variant!(
    /// Becomes a market buy once the price rises to or through the trigger.
    StopBuyOrder,
    "StopBuy"
);
order_variant!(
    /// Becomes a market sell once the price falls to or through the trigger.
    StopSellOrder,
    "StopSell"
);

impl StopBuyOrder {
    /// Converts a triggered stop into the equivalent market order.
    pub fn into_market(self) -> MarketBuyOrder {
        MarketBuyOrder(self.0)
    }
}

impl StopSellOrder {
    pub fn into_market(self) -> MarketSellOrder {
        MarketSellOrder(self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MarketOrder {
    Buy(MarketBuyOrder),
    Sell(MarketSellOrder),
}

impl MarketOrder {
    pub fn is_buy(&self) -> bool {
        matches!(self, MarketOrder::Buy(_))
    }
}

impl QueuedOrder for MarketOrder {
    fn details(&self) -> &OrderDetails {
        match self {
            MarketOrder::Buy(order) => order.details(),
            MarketOrder::Sell(order) => order.details(),
        }
    }
}

impl fmt::Display for MarketOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketOrder::Buy(order) => fmt::Display::fmt(order, f),
            MarketOrder::Sell(order) => fmt::Display::fmt(order, f),
        }
    }
}

impl From<MarketBuyOrder> for MarketOrder {
    fn from(order: MarketBuyOrder) -> Self {
        MarketOrder::Buy(order)
    }
}

impl From<MarketSellOrder> for MarketOrder {
    fn from(order: MarketSellOrder) -> Self {
        MarketOrder::Sell(order)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StopOrder {
    Buy(StopBuyOrder),
    Sell(StopSellOrder),
}

impl QueuedOrder for StopOrder {
    fn details(&self) -> &OrderDetails {
        match self {
            StopOrder::Buy(order) => order.details(),
            StopOrder::Sell(order) => order.details(),
        }
    }
}

impl From<StopBuyOrder> for StopOrder {
    fn from(order: StopBuyOrder) -> Self {
        StopOrder::Buy(order)
    }
}

impl From<StopSellOrder> for StopOrder {
    fn from(order: StopSellOrder) -> Self {
        StopOrder::Sell(order)
    }
}

/// Any order a client can place with the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Order {
    Market(MarketOrder),
    Stop(StopOrder),
}

impl Order {
    pub fn kind(&self) -> &'static str {
        match self {
            Order::Market(MarketOrder::Buy(_)) => "market_buy",
            Order::Market(MarketOrder::Sell(_)) => "market_sell",
            Order::Stop(StopOrder::Buy(_)) => "stop_buy",
            Order::Stop(StopOrder::Sell(_)) => "stop_sell",
        }
    }
}

impl QueuedOrder for Order {
    fn details(&self) -> &OrderDetails {
        match self {
            Order::Market(order) => order.details(),
            Order::Stop(order) => order.details(),
        }
    }
}

impl From<MarketOrder> for Order {
    fn from(order: MarketOrder) -> Self {
        Order::Market(order)
    }
}

impl From<StopOrder> for Order {
    fn from(order: StopOrder) -> Self {
        Order::Stop(order)
    }
}

impl From<MarketBuyOrder> for Order {
    fn from(order: MarketBuyOrder) -> Self {
        Order::Market(order.into())
    }
}

impl From<MarketSellOrder> for Order {
    fn from(order: MarketSellOrder) -> Self {
        Order::Market(order.into())
    }
}

impl From<StopBuyOrder> for Order {
    fn from(order: StopBuyOrder) -> Self {
        Order::Stop(order.into())
    }
}

impl From<StopSellOrder> for Order {
    fn from(order: StopSellOrder) -> Self {
        Order::Stop(order.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_increase_with_creation() {
        let first = MarketBuyOrder::new("neo", "ABC", 10, 100);
        let second = StopSellOrder::new("neo", "ABC", 10, 90);
        assert!(second.sequence() > first.sequence());
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn stop_conversion_keeps_identity() {
        let stop = StopBuyOrder::new("trinity", "XYZ", 25, 4_250);
        let id = stop.id();
        let sequence = stop.sequence();

        let market = stop.into_market();
        assert_eq!(market.id(), id);
        assert_eq!(market.sequence(), sequence);
        assert_eq!(market.account_id(), "trinity");
        assert_eq!(market.ticker(), "XYZ");
        assert_eq!(market.quantity(), 25);
        assert_eq!(market.price(), 4_250);
    }

    #[test]
    fn order_kind_follows_variant() {
        let order: Order = StopSellOrder::new("neo", "ABC", 1, 1).into();
        assert_eq!(order.kind(), "stop_sell");
        let order: Order = MarketBuyOrder::new("neo", "ABC", 1, 1).into();
        assert_eq!(order.kind(), "market_buy");
    }

    #[test]
    fn display_names_the_variant() {
        let order = MarketSellOrder::new("neo", "ABC", 3, 1_500);
        let text = order.to_string();
        assert!(text.starts_with("MarketSell #"));
        assert!(text.ends_with("[neo] ABC x 3 @ 1500"));
    }
}
