use anyhow::{Context, Result};
use rand::Rng;
use simple_broker::account::{AccountManager, InMemoryAccountManager};
use simple_broker::broker::{BrokerMetrics, SimpleBroker};
use simple_broker::core::{logging, BrokerConfig, HealthChecker};
use simple_broker::exchange::{SimulatedExchange, StockExchange};
use simple_broker::order::{MarketBuyOrder, MarketSellOrder, Price, StopBuyOrder, StopSellOrder};
use std::sync::Arc;
use std::time::Duration;

const DEMO_ACCOUNT: &str = "demo";
const DEMO_PASSWORD: &str = "demo-password";

#[tokio::main]
async fn main() -> Result<()> {
    let config = BrokerConfig::from_env()?;
    logging::init_logging(&config.monitoring.log_level);

    tracing::info!("Simple Broker starting...");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let exchange = Arc::new(SimulatedExchange::new(
        config.exchange.instruments.clone(),
        config.exchange.event_capacity,
    ));
    let accounts: Arc<dyn AccountManager> = Arc::new(InMemoryAccountManager::new());
    let broker = SimpleBroker::new(&config.broker.name, accounts, exchange.clone())
        .await
        .context("Failed to start broker")?;

    let health_checker = Arc::new(HealthChecker::new());
    health_checker.update_component("broker", true).await;
    health_checker.update_component("accounts", true).await;

    let health_clone = health_checker.clone();
    let metrics = broker.metrics();
    let health_port = config.monitoring.health_port;
    tokio::spawn(async move { start_health_server(health_clone, metrics, health_port).await });
    tracing::info!("Health endpoint running on port {}", health_port);

    broker
        .create_account(DEMO_ACCOUNT, DEMO_PASSWORD, config.simulation.demo_balance)
        .await?;
    place_demo_orders(&broker, &exchange).await?;

    exchange.open();
    health_checker.update_component("exchange_open", true).await;

    random_walk(&exchange, &config).await;

    exchange.close();
    health_checker.update_component("exchange_open", false).await;

    // Give the listener a moment to drain the last events.
    tokio::time::sleep(Duration::from_millis(config.simulation.tick_interval_ms)).await;

    let account = broker.get_account(DEMO_ACCOUNT, DEMO_PASSWORD).await?;
    tracing::info!("Final balance for '{}': {}", account.id(), account.balance());
    for (ticker, _) in &config.exchange.instruments {
        let (buys, sells) = broker.pending_stop_orders(ticker).await?;
        tracing::info!("{}: {} stop buys, {} stop sells still pending", ticker, buys, sells);
    }
    tracing::info!("Metrics:\n{}", broker.metrics().render()?);

    broker.close().await?;
    health_checker.update_component("broker", false).await;
    tracing::info!("Simple Broker stopped");
    Ok(())
}

/// One market order per side, plus a stop on either side of each listing.
async fn place_demo_orders(broker: &SimpleBroker, exchange: &SimulatedExchange) -> Result<()> {
    for ticker in exchange.tickers() {
        let price = exchange
            .price(&ticker)
            .with_context(|| format!("No opening price for '{}'", ticker))?;
        let band = (price / 50).max(1);

        broker
            .place_order(MarketBuyOrder::new(DEMO_ACCOUNT, &ticker, 10, 0))
            .await?;
        broker
            .place_order(StopBuyOrder::new(DEMO_ACCOUNT, &ticker, 5, price + band))
            .await?;
        broker
            .place_order(StopSellOrder::new(DEMO_ACCOUNT, &ticker, 5, price - band))
            .await?;
        broker
            .place_order(MarketSellOrder::new(DEMO_ACCOUNT, &ticker, 2, 0))
            .await?;
    }
    Ok(())
}

async fn random_walk(exchange: &SimulatedExchange, config: &BrokerConfig) {
    let tickers = exchange.tickers();
    if tickers.is_empty() {
        return;
    }

    let period = Duration::from_millis(config.simulation.tick_interval_ms.max(1));
    let mut interval = tokio::time::interval(period);
    for tick in 0..config.simulation.ticks {
        interval.tick().await;

        let (ticker, step) = {
            let mut rng = rand::thread_rng();
            let ticker = tickers[rng.gen_range(0..tickers.len())].clone();
            let step: f64 = rng.gen_range(-0.03..0.03);
            (ticker, step)
        };
        let Some(current) = exchange.price(&ticker) else {
            continue;
        };
        let next = ((current as f64) * (1.0 + step)).round().max(1.0) as Price;

        if let Err(e) = exchange.set_price(&ticker, next) {
            tracing::warn!("Tick {}: unable to move {}: {}", tick, ticker, e);
        }
    }
}

async fn start_health_server(
    health_checker: Arc<HealthChecker>,
    metrics: Arc<BrokerMetrics>,
    port: u16,
) {
    use warp::Filter;

    let health = warp::path("health")
        .and(warp::any().map(move || health_checker.clone()))
        .and_then(|checker: Arc<HealthChecker>| async move {
            let status = checker.get_status().await;
            Ok::<_, warp::Rejection>(warp::reply::json(&status))
        });

    let metrics = warp::path("metrics")
        .and(warp::any().map(move || metrics.clone()))
        .and_then(|metrics: Arc<BrokerMetrics>| async move {
            match metrics.render() {
                Ok(body) => Ok::<_, warp::Rejection>(body),
                Err(e) => {
                    tracing::error!("Failed to render metrics: {}", e);
                    Err(warp::reject())
                }
            }
        });

    warp::serve(health.or(metrics)).run(([0, 0, 0, 0], port)).await;
}
