use anyhow::{Context, Result};
use serde::Deserialize;

use crate::order::Price;

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub broker: BrokerSettings,
    pub exchange: ExchangeSettings,
    pub simulation: SimulationSettings,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone)]
pub struct BrokerSettings {
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct ExchangeSettings {
    /// Listed tickers with their opening prices in cents.
    pub instruments: Vec<(String, Price)>,
    pub event_capacity: usize,
}

#[derive(Debug, Clone)]
pub struct SimulationSettings {
    pub tick_interval_ms: u64,
    pub ticks: u32,
    pub demo_balance: i64,
}

#[derive(Debug, Clone)]
pub struct MonitoringConfig {
    pub health_port: u16,
    pub log_level: String,
}

/// Flat view of the `BROKER_*` variables.
#[derive(Debug, Deserialize)]
struct RawSettings {
    name: String,
    log_level: String,
    health_port: u16,
    instruments: String,
    event_capacity: usize,
    tick_interval_ms: u64,
    ticks: u32,
    demo_balance: i64,
}

impl BrokerConfig {
    /// Reads `.env` if present, then `BROKER_*` environment variables over the defaults.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_source(config::Environment::with_prefix("BROKER"))
    }

    pub fn from_source<S>(source: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let raw: RawSettings = config::Config::builder()
            .set_default("name", "SimpleBroker")?
            .set_default("log_level", "info")?
            .set_default("health_port", 3000_i64)?
            .set_default("instruments", "BA=7525,F=1210,GOOG=13450,IBM=14200,MSFT=4105")?
            .set_default("event_capacity", 1024_i64)?
            .set_default("tick_interval_ms", 250_i64)?
            .set_default("ticks", 40_i64)?
            .set_default("demo_balance", 1_000_000_i64)?
            .add_source(source)
            .build()
            .context("Failed to build broker configuration")?
            .try_deserialize()
            .context("Invalid broker configuration")?;

        Ok(BrokerConfig {
            broker: BrokerSettings { name: raw.name },
            exchange: ExchangeSettings {
                instruments: parse_instruments(&raw.instruments)?,
                event_capacity: raw.event_capacity.max(1),
            },
            simulation: SimulationSettings {
                tick_interval_ms: raw.tick_interval_ms,
                ticks: raw.ticks,
                demo_balance: raw.demo_balance,
            },
            monitoring: MonitoringConfig {
                health_port: raw.health_port,
                log_level: raw.log_level,
            },
        })
    }
}

/// Parses `TICKER=cents` pairs separated by commas.
pub fn parse_instruments(listing: &str) -> Result<Vec<(String, Price)>> {
    listing
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (ticker, price) = entry
                .split_once('=')
                .with_context(|| format!("Instrument '{}' is not TICKER=PRICE", entry))?;
            let price: Price = price
                .trim()
                .parse()
                .with_context(|| format!("Invalid price for '{}'", ticker.trim()))?;
            anyhow::ensure!(price > 0, "Price for '{}' must be positive", ticker.trim());
            Ok((ticker.trim().to_uppercase(), price))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};

    #[test]
    fn defaults_apply_without_overrides() {
        let config = BrokerConfig::from_source(File::from_str("", FileFormat::Toml)).unwrap();
        assert_eq!(config.broker.name, "SimpleBroker");
        assert_eq!(config.monitoring.log_level, "info");
        assert_eq!(config.exchange.instruments.len(), 5);
        assert_eq!(config.exchange.instruments[0], ("BA".to_string(), 7525));
    }

    #[test]
    fn overrides_replace_defaults() {
        let overrides = r#"
            name = "Discount Brokers"
            instruments = "abc=10000, XYZ=2500"
            ticks = 3
        "#;
        let config =
            BrokerConfig::from_source(File::from_str(overrides, FileFormat::Toml)).unwrap();
        assert_eq!(config.broker.name, "Discount Brokers");
        assert_eq!(config.simulation.ticks, 3);
        assert_eq!(
            config.exchange.instruments,
            vec![("ABC".to_string(), 10_000), ("XYZ".to_string(), 2_500)]
        );
    }

    #[test]
    fn malformed_instruments_are_rejected() {
        assert!(parse_instruments("ABC").is_err());
        assert!(parse_instruments("ABC=ten").is_err());
        assert!(parse_instruments("ABC=-5").is_err());
        assert!(parse_instruments("").unwrap().is_empty());
    }
}
