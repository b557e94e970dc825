//! Shared helpers for integration tests.

use std::sync::Arc;
use std::time::Duration;

use quarry::config::PollingConfig;
use quarry::service::MockQueryService;
use quarry::storage::{MemoryStorage, Storage};
use quarry::{Client, ClientConfig};

/// Configuration with millisecond polling, so tests never wait long.
pub fn fast_config() -> ClientConfig {
    let mut config = ClientConfig::default();
    config.polling = PollingConfig::new(Duration::from_millis(1), Duration::from_millis(5));
    config
}

/// Mock returning one row of three columns.
pub fn sample_service() -> MockQueryService {
    MockQueryService::new().with_rows(
        &[("id", "integer"), ("name", "varchar"), ("value", "double")],
        &[&[Some("1"), Some("foo"), Some("3.14")]],
    )
}

/// Caches shared between clients in one test.
#[derive(Debug, Clone, Default)]
pub struct Caches {
    pub local: MemoryStorage,
    pub remote: MemoryStorage,
}

impl Caches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Client using both caches.
    pub fn client(&self, service: &MockQueryService, config: ClientConfig) -> Client {
        Client::with_storage(
            Arc::new(service.clone()),
            config,
            Some(Arc::new(self.local.clone()) as Arc<dyn Storage>),
            Some(Arc::new(self.remote.clone()) as Arc<dyn Storage>),
        )
    }

    /// Client using only the local cache.
    pub fn local_client(&self, service: &MockQueryService, config: ClientConfig) -> Client {
        Client::with_storage(
            Arc::new(service.clone()),
            config,
            Some(Arc::new(self.local.clone()) as Arc<dyn Storage>),
            None,
        )
    }

    /// Client using only the remote cache.
    pub fn remote_client(&self, service: &MockQueryService, config: ClientConfig) -> Client {
        Client::with_storage(
            Arc::new(service.clone()),
            config,
            None,
            Some(Arc::new(self.remote.clone()) as Arc<dyn Storage>),
        )
    }
}

/// Client with no caches.
pub fn uncached_client(service: &MockQueryService, config: ClientConfig) -> Client {
    Client::with_storage(Arc::new(service.clone()), config, None, None)
}
