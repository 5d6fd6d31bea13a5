use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use tokio::sync::broadcast;

use super::{ExchangeEvent, StockExchange, StockQuote};
use crate::error::ExchangeError;
use crate::order::{MarketOrder, Price, QueuedOrder};

/// In-memory exchange with a fixed instrument list.
///
/// Prices only move through `set_price`; every change, open and close is
/// published to subscribers.
pub struct SimulatedExchange {
    listings: RwLock<BTreeMap<String, Price>>,
    open: AtomicBool,
    events: broadcast::Sender<ExchangeEvent>,
}

impl SimulatedExchange {
    pub fn new<I>(listings: I, event_capacity: usize) -> Self
    where
        I: IntoIterator<Item = (String, Price)>,
    {
        let (events, _) = broadcast::channel(event_capacity);
        let listings: BTreeMap<String, Price> = listings.into_iter().collect();
        tracing::info!("Simulated exchange listing {} instruments", listings.len());

        Self {
            listings: RwLock::new(listings),
            open: AtomicBool::new(false),
            events,
        }
    }

    pub fn open(&self) {
        self.open.store(true, Ordering::SeqCst);
        tracing::info!("Exchange opened");
        self.publish(ExchangeEvent::Opened);
    }

    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        tracing::info!("Exchange closed");
        self.publish(ExchangeEvent::Closed);
    }

    pub fn price(&self, ticker: &str) -> Option<Price> {
        self.listings
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(ticker)
            .copied()
    }

    /// Moves a listed instrument's price and notifies subscribers.
    pub fn set_price(&self, ticker: &str, price: Price) -> Result<(), ExchangeError> {
        {
            let mut listings = self
                .listings
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let current = listings
                .get_mut(ticker)
                .ok_or_else(|| ExchangeError::QuoteUnavailable(ticker.to_string()))?;
            *current = price;
        }

        self.publish(ExchangeEvent::PriceChanged {
            ticker: ticker.to_string(),
            price,
        });
        Ok(())
    }

    fn publish(&self, event: ExchangeEvent) {
        match self.events.send(event.clone()) {
            Ok(receivers) => {
                tracing::debug!("Exchange event published to {} receivers: {:?}", receivers, event);
            }
            Err(_) => {
                tracing::debug!("No subscribers for exchange event: {:?}", event);
            }
        }
    }
}

#[async_trait]
impl StockExchange for SimulatedExchange {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn tickers(&self) -> Vec<String> {
        self.listings
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    async fn quote(&self, ticker: &str) -> Result<StockQuote, ExchangeError> {
        self.price(ticker)
            .map(|price| StockQuote::new(ticker, price))
            .ok_or_else(|| ExchangeError::QuoteUnavailable(ticker.to_string()))
    }

    async fn execute_trade(&self, order: &MarketOrder) -> Result<Price, ExchangeError> {
        if !self.is_open() {
            return Err(ExchangeError::Closed);
        }

        let ticker = order.details().ticker();
        let price = self
            .price(ticker)
            .ok_or_else(|| ExchangeError::QuoteUnavailable(ticker.to_string()))?;
        tracing::info!("Executed {} at {}", order, price);
        Ok(price)
    }

    fn subscribe(&self) -> broadcast::Receiver<ExchangeEvent> {
        self.events.subscribe()
    }
}
