use simple_broker::account::{AccountManager, InMemoryAccountManager};
use simple_broker::exchange::SimulatedExchange;
use simple_broker::order::{MarketBuyOrder, MarketSellOrder, StopBuyOrder, StopSellOrder};
use simple_broker::{BrokerError, SimpleBroker};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;

fn listings() -> Vec<(String, i64)> {
    vec![("ABC".to_string(), 10_000), ("XYZ".to_string(), 2_500)]
}

async fn start() -> (Arc<SimulatedExchange>, SimpleBroker) {
    start_with_capacity(64).await
}

async fn start_with_capacity(event_capacity: usize) -> (Arc<SimulatedExchange>, SimpleBroker) {
    let exchange = Arc::new(SimulatedExchange::new(listings(), event_capacity));
    let accounts: Arc<dyn AccountManager> = Arc::new(InMemoryAccountManager::new());
    let broker = SimpleBroker::new("Flow Brokers", accounts, exchange.clone())
        .await
        .unwrap();
    broker.create_account("neo", "matrix", 100_000).await.unwrap();
    (exchange, broker)
}

/// Polls until `check` holds; exchange events are applied by a background task.
async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    time::timeout(Duration::from_secs(2), async {
        while !check().await {
            time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn stop_orders_trigger_from_exchange_price_events() {
    let (exchange, broker) = start().await;
    let broker = &broker;

    broker
        .place_order(StopBuyOrder::new("neo", "ABC", 1, 10_500))
        .await
        .unwrap();
    broker
        .place_order(StopSellOrder::new("neo", "ABC", 1, 9_500))
        .await
        .unwrap();

    exchange.set_price("ABC", 10_400).unwrap();
    exchange.set_price("ABC", 10_600).unwrap();
    eventually(move || async move {
        broker.pending_stop_orders("ABC").await.unwrap() == (0, 1)
    })
    .await;
    assert_eq!(broker.pending_market_orders().await.unwrap(), 1);

    exchange.open();
    eventually(move || async move { broker.pending_market_orders().await.unwrap() == 0 })
        .await;
    // Executed at the price in effect when the market opened.
    assert_eq!(broker.get_account("neo", "matrix").await.unwrap().balance(), 89_400);

    exchange.set_price("ABC", 9_000).unwrap();
    eventually(move || async move {
        broker.pending_stop_orders("ABC").await.unwrap() == (0, 0)
    })
    .await;
    eventually(move || async move { broker.metrics().trades() == 2 }).await;
    assert_eq!(broker.get_account("neo", "matrix").await.unwrap().balance(), 98_400);

    broker.close().await.unwrap();
}

#[tokio::test]
async fn market_orders_queue_while_closed_and_run_on_open() {
    let (exchange, broker) = start().await;
    let broker = &broker;

    broker
        .place_order(MarketBuyOrder::new("neo", "XYZ", 4, 0))
        .await
        .unwrap();
    broker
        .place_order(MarketSellOrder::new("neo", "ABC", 1, 0))
        .await
        .unwrap();
    assert_eq!(broker.pending_market_orders().await.unwrap(), 2);

    exchange.open();
    eventually(move || async move { broker.pending_market_orders().await.unwrap() == 0 })
        .await;
    assert_eq!(
        broker.get_account("neo", "matrix").await.unwrap().balance(),
        100_000 - 4 * 2_500 + 10_000
    );

    exchange.close();
    // Apply the close directly so the next order cannot race the listener.
    broker.exchange_closed().await.unwrap();
    broker
        .place_order(MarketBuyOrder::new("neo", "XYZ", 1, 0))
        .await
        .unwrap();
    assert_eq!(broker.pending_market_orders().await.unwrap(), 1);

    broker.close().await.unwrap();
}

#[tokio::test]
async fn quotes_and_accounts_go_through_the_broker() {
    let (exchange, broker) = start().await;
    let broker = &broker;

    let quote = broker.request_quote("XYZ").await.unwrap();
    assert_eq!(quote.price, 2_500);
    exchange.set_price("XYZ", 2_600).unwrap();
    assert_eq!(broker.request_quote("XYZ").await.unwrap().price, 2_600);
    assert!(matches!(
        broker.request_quote("QQQ").await,
        Err(BrokerError::Exchange(_))
    ));

    assert!(matches!(
        broker.get_account("neo", "wrong").await,
        Err(BrokerError::Account(_))
    ));
    broker.delete_account("neo").await.unwrap();
    assert!(broker.get_account("neo", "matrix").await.is_err());

    broker.close().await.unwrap();
    assert!(matches!(broker.close().await, Err(BrokerError::InvalidState)));
    // Events after close are ignored without panicking.
    exchange.set_price("ABC", 1).unwrap();
}

#[tokio::test]
async fn lagging_listener_resyncs_with_the_exchange() {
    // Room for two events: the burst below overruns the listener before it runs.
    let (exchange, broker) = start_with_capacity(2).await;
    let broker = &broker;

    broker
        .place_order(MarketBuyOrder::new("neo", "XYZ", 4, 0))
        .await
        .unwrap();
    broker
        .place_order(StopBuyOrder::new("neo", "ABC", 1, 10_500))
        .await
        .unwrap();

    exchange.open();
    exchange.set_price("ABC", 10_600).unwrap();
    exchange.set_price("XYZ", 2_600).unwrap();
    exchange.set_price("XYZ", 2_700).unwrap();

    eventually(move || async move { broker.metrics().trades() == 2 }).await;
    assert_eq!(broker.pending_market_orders().await.unwrap(), 0);
    assert_eq!(broker.pending_stop_orders("ABC").await.unwrap(), (0, 0));
    assert_eq!(
        broker.get_account("neo", "matrix").await.unwrap().balance(),
        100_000 - 4 * 2_700 - 10_600
    );

    broker.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn orders_placed_while_prices_move_are_never_stranded() {
    const PLACERS: usize = 8;
    const ORDERS_PER_PLACER: usize = 25;
    const FINAL_PRICE: i64 = 10_500;

    let (exchange, broker) = start_with_capacity(1024).await;
    let broker = Arc::new(broker);

    let mut handles = Vec::new();
    for placer in 0..PLACERS {
        let broker = broker.clone();
        handles.push(tokio::spawn(async move {
            let mut triggers = Vec::with_capacity(ORDERS_PER_PLACER);
            for n in 0..ORDERS_PER_PLACER {
                let trigger = 10_000 + ((placer * 37 + n * 53) % 1_000) as i64;
                broker
                    .place_order(StopBuyOrder::new("neo", "ABC", 1, trigger))
                    .await
                    .unwrap();
                triggers.push(trigger);
                tokio::task::yield_now().await;
            }
            triggers
        }));
    }

    // Prices only rise, so an order is released exactly when its trigger is at
    // or below the final price.
    let feed = exchange.clone();
    let prices = tokio::spawn(async move {
        for price in (10_000..=FINAL_PRICE).step_by(25) {
            feed.set_price("ABC", price).unwrap();
            tokio::task::yield_now().await;
        }
    });

    let mut triggers = Vec::new();
    for handle in handles {
        triggers.extend(handle.await.unwrap());
    }
    prices.await.unwrap();

    let released = triggers.iter().filter(|t| **t <= FINAL_PRICE).count();
    let held = triggers.len() - released;
    assert_eq!(triggers.len(), PLACERS * ORDERS_PER_PLACER);

    let observed = broker.clone();
    eventually(move || {
        let broker = observed.clone();
        async move { broker.pending_stop_orders("ABC").await.unwrap() == (held, 0) }
    })
    .await;
    assert_eq!(broker.pending_market_orders().await.unwrap(), released);
    assert_eq!(broker.metrics().dispatched("stop_buy"), released as u64);

    broker.close().await.unwrap();
}
