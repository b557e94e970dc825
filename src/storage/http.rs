//! HTTP-backed storage.
//!
//! Keys are resolved against a base URL. `GET` reads a value (404 is a
//! miss) and `PUT` writes one.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use url::Url;

use super::Storage;
use crate::error::{QuarryError, Result};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Storage served by an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpStorage {
    base: Url,
    client: Client,
}

impl HttpStorage {
    /// Creates storage for the given base URL.
    pub fn new(mut base: Url) -> Result<Self> {
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| QuarryError::storage(base.as_str(), e))?;
        Ok(Self { base, client })
    }

    fn url(&self, key: &str) -> Result<Url> {
        self.base
            .join(key)
            .map_err(|e| QuarryError::internal(format!("Invalid storage key '{key}': {e}")))
    }

    fn error(&self, err: impl Into<crate::error::BoxError>) -> QuarryError {
        QuarryError::storage(self.uri(), err)
    }
}

#[async_trait]
impl Storage for HttpStorage {
    fn uri(&self) -> String {
        self.base.to_string()
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(self.url(key)?)
            .send()
            .await
            .map_err(|e| self.error(e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(self.error(format!("GET {key} returned {status}")));
        }
        let body = response.text().await.map_err(|e| self.error(e))?;
        Ok(Some(body))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let response = self
            .client
            .put(self.url(key)?)
            .body(value.to_string())
            .send()
            .await
            .map_err(|e| self.error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.error(format!("PUT {key} returned {status}")));
        }
        Ok(())
    }
}
