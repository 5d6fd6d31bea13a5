use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub components: ComponentHealth,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub broker: bool,
    pub exchange_open: bool,
    pub accounts: bool,
    #[serde(flatten)]
    pub extra: HashMap<String, bool>,
}

impl ComponentHealth {
    pub fn get(&self, key: &str) -> Option<bool> {
        match key {
            "broker" => Some(self.broker),
            "exchange_open" => Some(self.exchange_open),
            "accounts" => Some(self.accounts),
            _ => self.extra.get(key).copied(),
        }
    }
}

#[derive(Clone)]
pub struct HealthChecker {
    start_time: std::time::Instant,
    status: Arc<RwLock<ComponentHealth>>,
}

impl HealthChecker {
    pub fn new() -> Self {
        Self {
            start_time: std::time::Instant::now(),
            status: Arc::new(RwLock::new(ComponentHealth::default())),
        }
    }

    pub async fn get_status(&self) -> HealthStatus {
        let components = self.status.read().await.clone();

        HealthStatus {
            status: if components.broker && components.accounts {
                "healthy".to_string()
            } else {
                "degraded".to_string()
            },
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            components,
        }
    }

    pub async fn update_component(&self, component: &str, healthy: bool) {
        let mut status = self.status.write().await;
        match component {
            "broker" => status.broker = healthy,
            "exchange_open" => status.exchange_open = healthy,
            "accounts" => status.accounts = healthy,
            _ => {
                status.extra.insert(component.to_string(), healthy);
            }
        }
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn degraded_until_broker_and_accounts_are_up() {
        let checker = HealthChecker::new();
        assert_eq!(checker.get_status().await.status, "degraded");

        checker.update_component("broker", true).await;
        checker.update_component("accounts", true).await;
        checker.update_component("listener", true).await;

        let status = checker.get_status().await;
        assert_eq!(status.status, "healthy");
        assert_eq!(status.components.get("listener"), Some(true));
        assert_eq!(status.components.get("exchange_open"), Some(false));
        assert_eq!(status.components.get("unknown"), None);
    }

    #[tokio::test]
    async fn status_serializes_with_flattened_extras() {
        let checker = HealthChecker::new();
        checker.update_component("listener", true).await;

        let json = serde_json::to_value(checker.get_status().await).unwrap();
        assert_eq!(json["components"]["listener"], serde_json::json!(true));
        assert_eq!(json["components"]["broker"], serde_json::json!(false));
    }
}
