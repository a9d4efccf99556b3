// src/storage/content_store.rs
//! Content-addressed storage client.
//!
//! Payloads are uploaded to an IPFS node and retrieved back through a gateway
//! URL templated on the content hash. The hash returned by an upload is the
//! storage key; fetching by that key is what makes the store content-addressed.
//!
//! # Security Considerations
//! - All stored data is public by default (IPFS is a public network)
//! - For private data, encrypt before storage

use async_trait::async_trait;
use ipfs_api_backend_hyper::{IpfsApi, IpfsClient, TryFromUri};
use std::io::Cursor;
use std::sync::Arc;

use crate::error::ProtocolError;

/// Stateless façade for uploading a JSON payload and retrieving it by
/// content hash.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Uploads `payload` and returns its content hash (the storage key).
    async fn upload(&self, payload: &serde_json::Value) -> Result<String, ProtocolError>;

    /// Retrieves the payload stored under `hash`.
    async fn fetch(&self, hash: &str) -> Result<serde_json::Value, ProtocolError>;
}

/// IPFS-backed content store.
///
/// Uploads go through the node API; retrieval goes through the configured
/// gateway so relying parties need no local node.
pub struct IpfsContentStore {
    /// Shared IPFS client instance
    client: Arc<IpfsClient>,
    /// HTTP client for gateway retrieval
    http: reqwest::Client,
    /// Gateway URL template with a `{hash}` placeholder
    gateway_template: String,
}

impl IpfsContentStore {
    /// Creates a content store against `api_url` (node API) and
    /// `gateway_template` (retrieval, `{hash}` substituted per fetch).
    pub fn new(api_url: &str, gateway_template: &str) -> Result<Self, ProtocolError> {
        let client = IpfsClient::from_str(api_url)
            .map_err(|e| ProtocolError::Config(format!("invalid ipfs api url: {}", e)))?;
        Ok(IpfsContentStore {
            client: Arc::new(client),
            http: reqwest::Client::new(),
            gateway_template: gateway_template.to_string(),
        })
    }

    fn gateway_url(&self, hash: &str) -> String {
        self.gateway_template.replace("{hash}", hash)
    }
}

#[async_trait]
impl ContentStore for IpfsContentStore {
    async fn upload(&self, payload: &serde_json::Value) -> Result<String, ProtocolError> {
        let bytes = serde_json::to_vec(payload)?;
        let response = self
            .client
            .add(Cursor::new(bytes))
            .await
            .map_err(|e| ProtocolError::Transport(format!("ipfs add failed: {}", e)))?;
        Ok(response.hash)
    }

    async fn fetch(&self, hash: &str) -> Result<serde_json::Value, ProtocolError> {
        let url = self.gateway_url(hash);
        let response = self.http.get(&url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}
