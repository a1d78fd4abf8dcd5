//! etcd v2 keys-API client
//!
//! Implements the store surface against the etcd v2 HTTP API: creation
//! races via `prevExist=false`, renewals via `prevIndex` compare-and-swap,
//! TTL refresh on every write.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use url::Url;

use crate::KvStore;
use crate::error::{Result, StoreError};
use crate::model::KvEntry;

/// etcd error code for "key not found".
const CODE_KEY_NOT_FOUND: i64 = 100;
/// etcd error code for "compare failed" (prevIndex mismatch).
const CODE_COMPARE_FAILED: i64 = 101;
/// etcd error code for "key already exists" (prevExist=false violated).
const CODE_NODE_EXIST: i64 = 105;

/// Configuration for the etcd client.
#[derive(Clone, Debug)]
pub struct EtcdConfig {
    /// Endpoint to connect to, e.g. `http://localhost:2379`.
    pub endpoint: String,
    /// Connection timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Per-request timeout in milliseconds; keeps the poll loop failing
    /// fast when the endpoint is unreachable.
    pub request_timeout_ms: u64,
}

impl Default for EtcdConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:2379".to_string(),
            connect_timeout_ms: 1000,
            request_timeout_ms: 1000,
        }
    }
}

impl EtcdConfig {
    /// Create a config for a single endpoint.
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            ..Default::default()
        }
    }

    /// Set timeouts.
    pub fn with_timeouts(mut self, connect_ms: u64, request_ms: u64) -> Self {
        self.connect_timeout_ms = connect_ms;
        self.request_timeout_ms = request_ms;
        self
    }
}

/// A node in an etcd v2 keys response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EtcdNode {
    pub key: String,
    #[serde(default)]
    pub value: Option<String>,
    pub modified_index: u64,
    pub created_index: u64,
    #[serde(default)]
    pub ttl: Option<i64>,
}

/// Successful etcd v2 keys response.
#[derive(Debug, Clone, Deserialize)]
pub struct EtcdResponse {
    pub action: String,
    pub node: EtcdNode,
}

/// etcd v2 error body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EtcdErrorBody {
    error_code: i64,
    message: String,
}

/// [`KvStore`] implementation over the etcd v2 keys API.
pub struct EtcdKvStore {
    client: Client,
    keys_base: String,
}

impl EtcdKvStore {
    pub fn new(config: EtcdConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|_| StoreError::InvalidEndpoint(config.endpoint.clone()))?;
        if endpoint.scheme() != "http" && endpoint.scheme() != "https" {
            return Err(StoreError::InvalidEndpoint(config.endpoint.clone()));
        }

        let client = Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        let keys_base = format!("{}/v2/keys", config.endpoint.trim_end_matches('/'));
        Ok(Self { client, keys_base })
    }

    /// Build the keys-API URL for a (normalized, slash-prefixed) key.
    fn key_url(&self, key: &str) -> String {
        format!("{}{}", self.keys_base, key)
    }

    /// Map a non-success response into a typed error.
    async fn api_error(response: Response) -> StoreError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<EtcdErrorBody>(&body) {
            Ok(err) => StoreError::Api {
                code: err.error_code,
                message: err.message,
            },
            Err(_) => StoreError::UnexpectedResponse { status, body },
        }
    }
}

#[async_trait]
impl KvStore for EtcdKvStore {
    async fn create_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let ttl_secs = ttl.as_secs().to_string();
        let response = self
            .client
            .put(self.key_url(key))
            .query(&[("prevExist", "false")])
            .form(&[("value", value), ("ttl", ttl_secs.as_str())])
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(true);
        }
        match Self::api_error(response).await {
            StoreError::Api {
                code: CODE_NODE_EXIST,
                ..
            } => Ok(false),
            err => Err(err),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<KvEntry>> {
        let response = self.client.get(self.key_url(key)).send().await?;

        if response.status().is_success() {
            let body: EtcdResponse = response.json().await?;
            return Ok(Some(KvEntry {
                value: body.node.value.unwrap_or_default(),
                revision: body.node.modified_index,
                ttl: body.node.ttl,
            }));
        }
        match Self::api_error(response).await {
            StoreError::Api {
                code: CODE_KEY_NOT_FOUND,
                ..
            } => Ok(None),
            err => Err(err),
        }
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        value: &str,
        expected_revision: u64,
        ttl: Duration,
    ) -> Result<bool> {
        let revision = expected_revision.to_string();
        let ttl_secs = ttl.as_secs().to_string();
        let response = self
            .client
            .put(self.key_url(key))
            .query(&[("prevIndex", revision.as_str())])
            .form(&[("value", value), ("ttl", ttl_secs.as_str())])
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(true);
        }
        match Self::api_error(response).await {
            // A revision mismatch, or the key expiring between read and
            // renewal, both mean another writer intervened; the caller's
            // next poll decides ownership.
            StoreError::Api {
                code: CODE_COMPARE_FAILED | CODE_KEY_NOT_FOUND,
                ..
            } => Ok(false),
            err => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(endpoint: &str) -> EtcdKvStore {
        EtcdKvStore::new(EtcdConfig::new(endpoint)).unwrap()
    }

    #[test]
    fn test_config_default() {
        let config = EtcdConfig::default();
        assert_eq!(config.endpoint, "http://localhost:2379");
        assert_eq!(config.connect_timeout_ms, 1000);
        assert_eq!(config.request_timeout_ms, 1000);
    }

    #[test]
    fn test_config_builder() {
        let config = EtcdConfig::new("http://etcd:2379").with_timeouts(500, 2000);
        assert_eq!(config.endpoint, "http://etcd:2379");
        assert_eq!(config.connect_timeout_ms, 500);
        assert_eq!(config.request_timeout_ms, 2000);
    }

    #[test]
    fn test_key_url() {
        let store = store("http://localhost:2379");
        assert_eq!(
            store.key_url("/runlock/locks/jobs"),
            "http://localhost:2379/v2/keys/runlock/locks/jobs"
        );
    }

    #[test]
    fn test_key_url_trailing_slash() {
        let store = store("http://etcd:2379/");
        assert_eq!(
            store.key_url("/runlock/locks/jobs"),
            "http://etcd:2379/v2/keys/runlock/locks/jobs"
        );
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        assert!(matches!(
            EtcdKvStore::new(EtcdConfig::new("not an endpoint")),
            Err(StoreError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            EtcdKvStore::new(EtcdConfig::new("ftp://etcd:2379")),
            Err(StoreError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn test_parse_keys_response() {
        let body = r#"{
            "action": "get",
            "node": {
                "key": "/runlock/locks/jobs",
                "value": "3b6ffe3e-5a43-4c1e-9c9e-1c2d6a0f9a11",
                "modifiedIndex": 7,
                "createdIndex": 5,
                "ttl": 5
            }
        }"#;
        let parsed: EtcdResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.action, "get");
        assert_eq!(parsed.node.modified_index, 7);
        assert_eq!(parsed.node.created_index, 5);
        assert_eq!(parsed.node.ttl, Some(5));
        assert_eq!(
            parsed.node.value.as_deref(),
            Some("3b6ffe3e-5a43-4c1e-9c9e-1c2d6a0f9a11")
        );
    }

    #[test]
    fn test_parse_error_body() {
        let body = r#"{
            "errorCode": 105,
            "message": "Key already exists",
            "cause": "/runlock/locks/jobs",
            "index": 8
        }"#;
        let parsed: EtcdErrorBody = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.error_code, 105);
        assert_eq!(parsed.message, "Key already exists");
    }
}
