// src/directory/directory_client.rs
//! Backend directory REST client.
//!
//! The directory is the off-chain index: member/organization records, the
//! per-token content-hash histories (append-only, supporting point-in-time
//! audit), role-activity logging, and the pending-DID approval queue. The
//! directory is never authoritative for authorization decisions; it is a
//! lookup and reconciliation surface.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ethers_core::types::{Address, U256};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ProtocolError;
use crate::models::authorization::{DataKind, UpdateAction};
use crate::models::did::Role;

/// An organization member as recorded by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberRecord {
    pub organization_id: String,
    pub name: String,
    pub ethereum_address: String,
}

/// The directory's identity mapping for a wallet address.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub did_name: String,
    pub credential_id: String,
}

/// Per-token content-hash histories, one append-only list per data kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OffchainRecord {
    #[serde(default)]
    pub histories: BTreeMap<String, Vec<String>>,
}

impl OffchainRecord {
    /// Latest recorded hash for `kind`, if any.
    pub fn latest(&self, kind: DataKind) -> Option<&String> {
        self.histories.get(kind.as_str()).and_then(|h| h.last())
    }
}

/// Body of an off-chain history append.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OffchainAppend {
    pub kind: String,
    pub hash: String,
}

/// One entry of the role-activity audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleActivity {
    pub actor: String,
    pub role: Role,
    pub action: UpdateAction,
    pub token_id: String,
    pub tx_hash: String,
    pub timestamp: DateTime<Utc>,
}

/// A DID registration awaiting registrar approval.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingDid {
    pub id: String,
    pub did: String,
    pub owner: String,
    pub role: Role,
    pub trust_level: u8,
    #[serde(default)]
    pub approved: bool,
}

/// Body of a pending-DID submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingDidRequest {
    pub did: String,
    pub owner: String,
    pub role: Role,
    pub trust_level: u8,
}

/// Stateless façade for the backend member/organization/index REST API.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Organization member record for a wallet address, if known.
    async fn member_by_address(
        &self,
        address: Address,
    ) -> Result<Option<MemberRecord>, ProtocolError>;

    /// The directory's `{did_name, credential_id}` mapping for an address.
    async fn user_by_address(&self, address: Address)
        -> Result<Option<UserIdentity>, ProtocolError>;

    /// Appends one hash to a token's history. Histories are append-only;
    /// nothing is ever overwritten.
    async fn append_offchain_hash(
        &self,
        token_id: U256,
        kind: DataKind,
        hash: &str,
    ) -> Result<(), ProtocolError>;

    /// Full per-kind hash histories for a token.
    async fn offchain_record(&self, token_id: U256) -> Result<OffchainRecord, ProtocolError>;

    /// Records one role-activity audit entry.
    async fn record_activity(&self, activity: &RoleActivity) -> Result<(), ProtocolError>;

    /// Queues a DID registration for registrar approval.
    async fn submit_pending_did(
        &self,
        request: &PendingDidRequest,
    ) -> Result<PendingDid, ProtocolError>;

    /// Marks a queued registration approved.
    async fn approve_pending_did(&self, id: &str) -> Result<PendingDid, ProtocolError>;
}

/// Production REST implementation.
pub struct RestDirectory {
    base_url: String,
    http: reqwest::Client,
}

impl RestDirectory {
    /// Creates a client against `base_url` (trailing slash tolerated).
    pub fn new(base_url: &str) -> Self {
        RestDirectory {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl Directory for RestDirectory {
    async fn member_by_address(
        &self,
        address: Address,
    ) -> Result<Option<MemberRecord>, ProtocolError> {
        let url = self.url(&format!("/organization/member/0x{:x}", address));
        let response = self.http.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(response.error_for_status()?.json().await?))
    }

    async fn user_by_address(
        &self,
        address: Address,
    ) -> Result<Option<UserIdentity>, ProtocolError> {
        let url = self.url("/user/byEthereumAddress");
        let response = self
            .http
            .get(&url)
            .query(&[("address", format!("0x{:x}", address))])
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(response.error_for_status()?.json().await?))
    }

    async fn append_offchain_hash(
        &self,
        token_id: U256,
        kind: DataKind,
        hash: &str,
    ) -> Result<(), ProtocolError> {
        let url = self.url(&format!("/offchain/updateDataOffChain/{}", token_id));
        let body = OffchainAppend {
            kind: kind.as_str().to_string(),
            hash: hash.to_string(),
        };
        self.http
            .put(&url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn offchain_record(&self, token_id: U256) -> Result<OffchainRecord, ProtocolError> {
        let url = self.url(&format!("/offchain/getDataOffChain/{}", token_id));
        let response = self.http.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(OffchainRecord::default());
        }
        Ok(response.error_for_status()?.json().await?)
    }

    async fn record_activity(&self, activity: &RoleActivity) -> Result<(), ProtocolError> {
        let url = self.url("/role-activity");
        self.http
            .post(&url)
            .json(activity)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn submit_pending_did(
        &self,
        request: &PendingDidRequest,
    ) -> Result<PendingDid, ProtocolError> {
        let url = self.url("/pending-did");
        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn approve_pending_did(&self, id: &str) -> Result<PendingDid, ProtocolError> {
        let url = self.url(&format!("/pending-did/{}/approve", id));
        let response = self.http.patch(&url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}
