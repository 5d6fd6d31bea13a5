pub mod metrics;
pub mod order_manager;
pub mod simple_broker;

pub use metrics::BrokerMetrics;
pub use order_manager::OrderManager;
pub use simple_broker::SimpleBroker;
