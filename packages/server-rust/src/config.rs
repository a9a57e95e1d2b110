//! Process-wide configuration, assembled once and passed to
//! [`OrderServer::new`](crate::network::OrderServer::new).

use crate::item::ItemClientConfig;
use crate::network::NetworkConfig;
use crate::service::ServiceConfig;

/// Everything the server needs to know at construction.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub service: ServiceConfig,
    pub items: ItemClientConfig,
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn defaults_compose() {
        let config = AppConfig::default();
        assert_eq!(config.network.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.items.endpoint, "127.0.0.1:9090");
        assert_eq!(config.service.sleeper_delay, Duration::ZERO);
        assert!(config.service.load_sample_data);
        assert!(!config.service.require_auth);
    }
}
