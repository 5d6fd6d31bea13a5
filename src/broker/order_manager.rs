use std::future::Future;
use tokio::sync::RwLock;

use crate::dispatch::{DispatchPriority, OrderQueue, StopBuyDispatchFilter, StopSellDispatchFilter};
use crate::error::DispatchError;
use crate::order::{Price, StopBuyOrder, StopOrder, StopSellOrder};

/// Holds the stop orders for one instrument and releases them as its price moves.
pub struct OrderManager {
    ticker: String,
    price: RwLock<Price>,
    stop_buy_orders: OrderQueue<Price, StopBuyOrder>,
    stop_sell_orders: OrderQueue<Price, StopSellOrder>,
}

impl OrderManager {
    pub fn new(ticker: &str, price: Price) -> Self {
        Self {
            ticker: ticker.to_string(),
            price: RwLock::new(price),
            stop_buy_orders: OrderQueue::new(
                format!("{}/stop-buy", ticker),
                price,
                StopBuyDispatchFilter,
                DispatchPriority::LowestPriceFirst,
            ),
            stop_sell_orders: OrderQueue::new(
                format!("{}/stop-sell", ticker),
                price,
                StopSellDispatchFilter,
                DispatchPriority::HighestPriceFirst,
            ),
        }
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub async fn price(&self) -> Price {
        *self.price.read().await
    }

    /// Installs the callback that receives triggered stop buys.
    pub async fn set_buy_order_processor<P, Fut>(&self, processor: P)
    where
        P: FnMut(StopBuyOrder) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.stop_buy_orders.set_order_processor(processor).await;
    }

    /// Installs the callback that receives triggered stop sells.
    pub async fn set_sell_order_processor<P, Fut>(&self, processor: P)
    where
        P: FnMut(StopSellOrder) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.stop_sell_orders.set_order_processor(processor).await;
    }

    /// Queues a stop order; it is released immediately if the current price
    /// already satisfies its trigger.
    pub async fn queue_order(&self, order: StopOrder) -> Result<(), DispatchError> {
        match order {
            StopOrder::Buy(order) => self.stop_buy_orders.enqueue(order).await,
            StopOrder::Sell(order) => self.stop_sell_orders.enqueue(order).await,
        }
    }

    /// Records a new price and releases every stop order it triggers.
    pub async fn adjust_price(&self, price: Price) -> Result<(), DispatchError> {
        *self.price.write().await = price;
        tracing::debug!("{} price adjusted to {}", self.ticker, price);

        let buys = self.stop_buy_orders.set_threshold(price).await;
        let sells = self.stop_sell_orders.set_threshold(price).await;
        buys.and(sells)
    }

    pub async fn pending_buy_orders(&self) -> usize {
        self.stop_buy_orders.pending_count().await
    }

    pub async fn pending_sell_orders(&self) -> usize {
        self.stop_sell_orders.pending_count().await
    }
}
