use anyhow::Context;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::metrics::BrokerMetrics;
use super::order_manager::OrderManager;
use crate::account::{Account, AccountManager};
use crate::dispatch::{DispatchPriority, MarketDispatchFilter, OrderQueue};
use crate::error::{AccountError, BrokerError, BrokerResult};
use crate::exchange::{ExchangeEvent, StockExchange, StockQuote};
use crate::order::{MarketOrder, Order, Price, QueuedOrder, StopBuyOrder, StopSellOrder};

/// Everything the broker needs while it is active. Dropped on `close`.
struct BrokerState {
    account_manager: Arc<dyn AccountManager>,
    exchange: Arc<dyn StockExchange>,
    order_managers: HashMap<String, OrderManager>,
    market_orders: Arc<OrderQueue<bool, MarketOrder>>,
}

struct BrokerInner {
    name: String,
    metrics: Arc<BrokerMetrics>,
    state: Mutex<Option<BrokerState>>,
}

/// Every public operation runs this first.
fn active(state: &Option<BrokerState>) -> BrokerResult<&BrokerState> {
    state.as_ref().ok_or(BrokerError::InvalidState)
}

impl BrokerInner {
    async fn price_changed(&self, ticker: &str, price: Price) -> BrokerResult<()> {
        let guard = self.state.lock().await;
        let state = active(&guard)?;
        tracing::info!("Processing price change [{}:{}]", ticker, price);

        match state.order_managers.get(ticker) {
            Some(manager) => manager.adjust_price(price).await?,
            None => tracing::debug!("Ignoring price change for unlisted '{}'", ticker),
        }
        Ok(())
    }

    async fn exchange_opened(&self) -> BrokerResult<()> {
        let guard = self.state.lock().await;
        let state = active(&guard)?;
        tracing::info!("### MARKET OPENED ###");
        state.market_orders.set_threshold(true).await?;
        Ok(())
    }

    async fn exchange_closed(&self) -> BrokerResult<()> {
        let guard = self.state.lock().await;
        let state = active(&guard)?;
        state.market_orders.set_threshold(false).await?;
        tracing::info!("### MARKET CLOSED ###");
        Ok(())
    }

    /// Re-reads the open flag and every listed price from the exchange.
    /// Used after the listener has missed events; replaying current state is
    /// idempotent for the queues.
    async fn resync(&self) -> BrokerResult<()> {
        let guard = self.state.lock().await;
        let state = active(&guard)?;

        let open = state.exchange.is_open();
        tracing::info!("Resyncing with exchange (open: {})", open);
        let mut first_error = state
            .market_orders
            .set_threshold(open)
            .await
            .err()
            .map(BrokerError::from);

        for (ticker, manager) in &state.order_managers {
            let result = match state.exchange.quote(ticker).await {
                Ok(quote) => manager.adjust_price(quote.price).await.map_err(BrokerError::from),
                Err(err) => Err(err.into()),
            };
            if let Err(err) = result {
                tracing::warn!("Resync of '{}' failed: {}", ticker, err);
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn handle_event(&self, event: ExchangeEvent) -> BrokerResult<()> {
        match event {
            ExchangeEvent::PriceChanged { ticker, price } => {
                self.price_changed(&ticker, price).await
            }
            ExchangeEvent::Opened => self.exchange_opened().await,
            ExchangeEvent::Closed => self.exchange_closed().await,
        }
    }
}

/// Broker façade: accounts, quotes, and order routing between the exchange's
/// price feed and the market execution path.
///
/// All operations serialize on one broker-wide lock. Exchange events are
/// consumed by a single listener task, so they are applied in the order the
/// exchange published them.
pub struct SimpleBroker {
    inner: Arc<BrokerInner>,
    listener: StdMutex<Option<JoinHandle<()>>>,
}

impl SimpleBroker {
    /// Builds the market queue and one order manager per listed instrument,
    /// then starts listening to the exchange.
    pub async fn new(
        name: &str,
        account_manager: Arc<dyn AccountManager>,
        exchange: Arc<dyn StockExchange>,
    ) -> BrokerResult<Self> {
        // Subscribe first so no event published during setup is lost.
        let events = exchange.subscribe();
        let metrics = Arc::new(BrokerMetrics::new()?);

        let market_orders = Arc::new(OrderQueue::new(
            "market",
            exchange.is_open(),
            MarketDispatchFilter,
            DispatchPriority::Fifo,
        ));
        install_market_processor(&market_orders, &exchange, &account_manager, &metrics).await;

        let mut order_managers = HashMap::new();
        for ticker in exchange.tickers() {
            let price = exchange.quote(&ticker).await?.price;
            let manager = OrderManager::new(&ticker, price);
            install_stop_processors(&manager, &market_orders, &metrics).await;
            tracing::info!("Initialized order manager for '{}' @ {}", ticker, price);
            order_managers.insert(ticker, manager);
        }

        let inner = Arc::new(BrokerInner {
            name: name.to_string(),
            metrics,
            state: Mutex::new(Some(BrokerState {
                account_manager,
                exchange,
                order_managers,
                market_orders,
            })),
        });
        let listener = spawn_listener(inner.clone(), events);
        tracing::info!("Broker '{}' active", name);

        Ok(Self {
            inner,
            listener: StdMutex::new(Some(listener)),
        })
    }

    pub async fn name(&self) -> BrokerResult<&str> {
        let guard = self.inner.state.lock().await;
        active(&guard)?;
        Ok(&self.inner.name)
    }

    pub fn metrics(&self) -> Arc<BrokerMetrics> {
        self.inner.metrics.clone()
    }

    pub async fn create_account(
        &self,
        id: &str,
        password: &str,
        balance: i64,
    ) -> BrokerResult<Account> {
        let guard = self.inner.state.lock().await;
        let state = active(&guard)?;
        Ok(state.account_manager.create_account(id, password, balance).await?)
    }

    pub async fn delete_account(&self, id: &str) -> BrokerResult<()> {
        let guard = self.inner.state.lock().await;
        let state = active(&guard)?;
        Ok(state.account_manager.delete_account(id).await?)
    }

    /// Returns the account once the credentials check out.
    pub async fn get_account(&self, id: &str, password: &str) -> BrokerResult<Account> {
        let guard = self.inner.state.lock().await;
        let state = active(&guard)?;

        if !state.account_manager.validate_login(id, password).await? {
            return Err(AccountError::InvalidCredentials(id.to_string()).into());
        }
        Ok(state.account_manager.get_account(id).await?)
    }

    pub async fn request_quote(&self, ticker: &str) -> BrokerResult<StockQuote> {
        let guard = self.inner.state.lock().await;
        let state = active(&guard)?;
        Ok(state.exchange.quote(ticker).await?)
    }

    /// Market orders go straight to the market queue; stop orders wait in the
    /// order manager of their instrument.
    pub async fn place_order(&self, order: impl Into<Order>) -> BrokerResult<()> {
        let order = order.into();
        let guard = self.inner.state.lock().await;
        let state = active(&guard)?;
        let kind = order.kind();
        tracing::info!("Placing {} order {:?}", kind, order.details().id());

        match order {
            Order::Market(order) => state.market_orders.enqueue(order).await?,
            Order::Stop(order) => {
                let ticker = order.details().ticker();
                let manager = state
                    .order_managers
                    .get(ticker)
                    .ok_or_else(|| BrokerError::UnknownInstrument(ticker.to_string()))?;
                manager.queue_order(order).await?;
            }
        }

        self.inner.metrics.order_placed(kind);
        Ok(())
    }

    pub async fn price_changed(&self, ticker: &str, price: Price) -> BrokerResult<()> {
        self.inner.price_changed(ticker, price).await
    }

    pub async fn exchange_opened(&self) -> BrokerResult<()> {
        self.inner.exchange_opened().await
    }

    pub async fn exchange_closed(&self) -> BrokerResult<()> {
        self.inner.exchange_closed().await
    }

    pub async fn pending_market_orders(&self) -> BrokerResult<usize> {
        let guard = self.inner.state.lock().await;
        let state = active(&guard)?;
        Ok(state.market_orders.pending_count().await)
    }

    /// Pending (buy, sell) stop orders for one instrument.
    pub async fn pending_stop_orders(&self, ticker: &str) -> BrokerResult<(usize, usize)> {
        let guard = self.inner.state.lock().await;
        let state = active(&guard)?;
        let manager = state
            .order_managers
            .get(ticker)
            .ok_or_else(|| BrokerError::UnknownInstrument(ticker.to_string()))?;
        Ok((manager.pending_buy_orders().await, manager.pending_sell_orders().await))
    }

    /// Stops listening to the exchange, closes the account manager and
    /// releases the order managers. Later calls fail with `InvalidState`.
    pub async fn close(&self) -> BrokerResult<()> {
        let state = self
            .inner
            .state
            .lock()
            .await
            .take()
            .ok_or(BrokerError::InvalidState)?;

        self.stop_listener();
        state.account_manager.close().await?;

        tracing::info!(
            "Broker '{}' closed, released {} order managers",
            self.inner.name,
            state.order_managers.len()
        );
        Ok(())
    }

    fn stop_listener(&self) {
        let handle = self
            .listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

impl Drop for SimpleBroker {
    fn drop(&mut self) {
        self.stop_listener();
    }
}

/// Executes each released market order and reflects it in the owning account.
/// Failures are logged and the order is considered delivered.
async fn install_market_processor(
    market_orders: &OrderQueue<bool, MarketOrder>,
    exchange: &Arc<dyn StockExchange>,
    account_manager: &Arc<dyn AccountManager>,
    metrics: &Arc<BrokerMetrics>,
) {
    let exchange = exchange.clone();
    let account_manager = account_manager.clone();
    let metrics = metrics.clone();

    market_orders
        .set_order_processor(move |order: MarketOrder| {
            let exchange = exchange.clone();
            let account_manager = account_manager.clone();
            let metrics = metrics.clone();
            async move {
                metrics.order_dispatched("market");
                match execute_order(exchange.as_ref(), account_manager.as_ref(), &order).await {
                    Ok(()) => metrics.trade_executed(),
                    Err(err) => {
                        metrics.processor_failed();
                        tracing::error!("Unable to complete {}: {:#}", order, err);
                    }
                }
                Ok::<_, anyhow::Error>(())
            }
        })
        .await;
}

async fn execute_order(
    exchange: &dyn StockExchange,
    account_manager: &dyn AccountManager,
    order: &MarketOrder,
) -> anyhow::Result<()> {
    tracing::info!("Executing - {}", order);
    let share_price = exchange
        .execute_trade(order)
        .await
        .context("trade execution failed")?;

    let account_id = order.details().account_id();
    let mut account = account_manager
        .get_account(account_id)
        .await
        .with_context(|| format!("unable to update account, {}", account_id))?;
    account
        .reflect_order(order, share_price)
        .with_context(|| format!("unable to update account, {}", account_id))?;
    account_manager
        .update_account(&account)
        .await
        .with_context(|| format!("unable to update account, {}", account_id))?;

    tracing::info!("New balance - {}", account.balance());
    Ok(())
}

/// Triggered stops become market orders on the shared market queue.
async fn install_stop_processors(
    manager: &OrderManager,
    market_orders: &Arc<OrderQueue<bool, MarketOrder>>,
    metrics: &Arc<BrokerMetrics>,
) {
    let market = market_orders.clone();
    let counter = metrics.clone();
    manager
        .set_buy_order_processor(move |order: StopBuyOrder| {
            let market = market.clone();
            counter.order_dispatched("stop_buy");
            async move {
                market
                    .enqueue(order.into_market().into())
                    .await
                    .map_err(anyhow::Error::from)
            }
        })
        .await;

    let market = market_orders.clone();
    let counter = metrics.clone();
    manager
        .set_sell_order_processor(move |order: StopSellOrder| {
            let market = market.clone();
            counter.order_dispatched("stop_sell");
            async move {
                market
                    .enqueue(order.into_market().into())
                    .await
                    .map_err(anyhow::Error::from)
            }
        })
        .await;
}

fn spawn_listener(
    inner: Arc<BrokerInner>,
    mut events: broadcast::Receiver<ExchangeEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let applied = match events.recv().await {
                Ok(event) => inner.handle_event(event).await,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Exchange listener lagged, {} events skipped", skipped);
                    inner.resync().await
                }
                Err(RecvError::Closed) => {
                    tracing::info!("Exchange event stream ended");
                    break;
                }
            };

            match applied {
                Ok(()) => {}
                Err(BrokerError::InvalidState) => {
                    tracing::debug!("Broker closed, exchange listener exiting");
                    break;
                }
                Err(err) => tracing::error!("Failed to apply exchange event: {}", err),
            }
        }
    })
}
