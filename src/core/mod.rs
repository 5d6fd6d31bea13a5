pub mod config;
pub mod health;
pub mod logging;

pub use self::config::BrokerConfig;
pub use health::HealthChecker;
