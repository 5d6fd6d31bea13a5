pub mod simulated;

pub use simulated::SimulatedExchange;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::ExchangeError;
use crate::order::{MarketOrder, Price};

/// Notifications pushed by an exchange to its subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExchangeEvent {
    PriceChanged { ticker: String, price: Price },
    Opened,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockQuote {
    pub ticker: String,
    pub price: Price,
    pub timestamp: DateTime<Utc>,
}

impl StockQuote {
    pub fn new(ticker: &str, price: Price) -> Self {
        Self {
            ticker: ticker.to_string(),
            price,
            timestamp: Utc::now(),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StockExchange: Send + Sync {
    fn is_open(&self) -> bool;

    /// Every instrument listed on the exchange.
    fn tickers(&self) -> Vec<String>;

    async fn quote(&self, ticker: &str) -> Result<StockQuote, ExchangeError>;

    /// Executes at the current market price and returns that price.
    async fn execute_trade(&self, order: &MarketOrder) -> Result<Price, ExchangeError>;

    fn subscribe(&self) -> broadcast::Receiver<ExchangeEvent>;
}
