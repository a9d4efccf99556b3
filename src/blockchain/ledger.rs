// src/blockchain/ledger.rs
//! The ledger façade: one stateless trait covering the identity registry,
//! the credential registry, and the battery-passport contract.
//!
//! Services depend on the [`Ledger`] trait rather than on concrete contract
//! wrappers so the orchestration sequence can be exercised against an
//! in-memory ledger in tests. The production implementation, [`EvmLedger`],
//! delegates to the three typed contract façades and verifies deployed
//! bytecode at every configured address before first use.

use async_trait::async_trait;
use ethers_core::types::{Address, H256, U256};

use crate::blockchain::evm_client::EvmClient;
use crate::config::Settings;
use crate::contracts::battery_passport::BatteryPassport;
use crate::contracts::credential_registry::CredentialRegistry;
use crate::contracts::identity_registry::IdentityRegistry;
use crate::error::ProtocolError;
use crate::models::authorization::{DataKind, UpdateAction};
use crate::models::credential::VerifiableCredential;
use crate::models::did::{DidRecord, Role};

/// A fully assembled, signature-authorized update ready for submission.
#[derive(Debug, Clone)]
pub struct LedgerUpdate {
    /// Passport token being updated
    pub token_id: U256,
    /// Which update method to invoke
    pub action: UpdateAction,
    /// Address that authorized the update (signature signer)
    pub account: Address,
    /// Content hashes ordered like `action.payload_kinds()`
    pub content_hashes: Vec<String>,
    /// Keccak hash of the caller's DID name
    pub did_hash: String,
    /// Credential backing the caller's authority
    pub credential_id: String,
    /// Receiving address, ownership transfers only
    pub new_owner: Option<Address>,
    /// Replay nonce, nonce-bearing actions only
    pub nonce: Option<U256>,
    /// 65-byte typed-data signature
    pub signature: Vec<u8>,
}

impl LedgerUpdate {
    /// Content hash at position `index` of the action's payload order.
    pub fn content_hash(&self, index: usize) -> Result<String, ProtocolError> {
        self.content_hashes.get(index).cloned().ok_or_else(|| {
            ProtocolError::PreconditionFailed(format!(
                "action {:?} requires content hash #{}",
                self.action, index
            ))
        })
    }

    /// The nonce, which must be present for nonce-bearing actions.
    pub fn required_nonce(&self) -> Result<U256, ProtocolError> {
        self.nonce.ok_or_else(|| {
            ProtocolError::PreconditionFailed(format!("action {:?} requires a nonce", self.action))
        })
    }

    /// The new owner, which must be present for ownership transfers.
    pub fn required_new_owner(&self) -> Result<Address, ProtocolError> {
        self.new_owner.ok_or_else(|| {
            ProtocolError::PreconditionFailed("ownership transfer requires a new owner".to_string())
        })
    }
}

/// Owner, DID hash, and status of a passport token.
#[derive(Debug, Clone)]
pub struct PassportSnapshot {
    pub owner: Address,
    pub did_hash: String,
    pub status: u8,
}

/// Stateless read/write façade over the three protocol contracts.
#[async_trait]
pub trait Ledger: Send + Sync {
    // --- identity registry ---

    /// Registers a DID, unverified. Sender must hold the registrar role.
    async fn register_did(
        &self,
        did: &str,
        owner: Address,
        trust_level: u8,
        roles: &[Role],
    ) -> Result<(), ProtocolError>;

    /// Flags a DID as verified.
    async fn verify_did(&self, did: &str) -> Result<(), ProtocolError>;

    async fn is_did_registered(&self, did: &str) -> Result<bool, ProtocolError>;

    /// The full DID record, or `None` when unregistered.
    async fn get_did(&self, did: &str) -> Result<Option<DidRecord>, ProtocolError>;

    /// On-chain role validation read.
    async fn validate_did_role(
        &self,
        did: &str,
        role: Role,
        caller: Address,
    ) -> Result<bool, ProtocolError>;

    // --- credential registry ---

    /// Issues an unsigned credential; the ledger stamps the issuance time.
    async fn issue_credential(
        &self,
        id: &str,
        subject_did: &str,
        claims_json: &str,
        expires_at: u64,
    ) -> Result<(), ProtocolError>;

    /// Stores the issuer signature for an issued credential.
    async fn sign_credential(&self, id: &str, signature: &[u8]) -> Result<(), ProtocolError>;

    /// The full credential record, or `None` when unknown.
    async fn get_credential(&self, id: &str)
        -> Result<Option<VerifiableCredential>, ProtocolError>;

    /// On-chain validity read.
    async fn validate_credential(&self, id: &str) -> Result<bool, ProtocolError>;

    /// Revokes a credential. May reject an already-revoked credential.
    async fn revoke_credential(&self, id: &str) -> Result<(), ProtocolError>;

    /// Ledger-recorded issuance timestamp.
    async fn issued_timestamp(&self, id: &str) -> Result<u64, ProtocolError>;

    // --- battery passport ---

    async fn passport_exists(&self, token_id: U256) -> Result<bool, ProtocolError>;

    async fn get_battery_passport(&self, token_id: U256)
        -> Result<PassportSnapshot, ProtocolError>;

    async fn lifecycle_status(&self, token_id: U256) -> Result<u8, ProtocolError>;

    /// Current replay nonce for `account`; re-read before every use.
    async fn nonce_of(&self, account: Address) -> Result<U256, ProtocolError>;

    async fn grant_role(&self, role: Role, account: Address) -> Result<H256, ProtocolError>;

    async fn assign_organization(
        &self,
        token_id: U256,
        organization: Address,
    ) -> Result<H256, ProtocolError>;

    /// Committed content digest for `kind`, gated by a signed read
    /// authorization.
    async fn committed_digest(
        &self,
        token_id: U256,
        kind: DataKind,
        signature: &[u8],
    ) -> Result<H256, ProtocolError>;

    /// Submits a signature-authorized update; returns the transaction hash.
    async fn submit_update(&self, update: &LedgerUpdate) -> Result<H256, ProtocolError>;
}

/// Production ledger over the deployed contracts.
pub struct EvmLedger {
    identity: IdentityRegistry,
    credentials: CredentialRegistry,
    passport: BatteryPassport,
    /// Address the middleware signs with; reported on registrar-role reverts
    sender: Address,
}

impl EvmLedger {
    /// Builds the three contract façades and verifies bytecode exists at each
    /// configured address. Runs once at initialization; a missing deployment
    /// blocks all further operation.
    pub async fn connect(client: &EvmClient, settings: &Settings) -> Result<Self, ProtocolError> {
        let identity_addr = settings.identity_registry_address()?;
        let credential_addr = settings.credential_registry_address()?;
        let passport_addr = settings.battery_passport_address()?;

        client.ensure_deployed(identity_addr).await?;
        client.ensure_deployed(credential_addr).await?;
        client.ensure_deployed(passport_addr).await?;

        Ok(EvmLedger {
            identity: IdentityRegistry::new(client.middleware(), identity_addr)?,
            credentials: CredentialRegistry::new(client.middleware(), credential_addr)?,
            passport: BatteryPassport::new(client.middleware(), passport_addr)?,
            sender: client.address(),
        })
    }
}

/// OpenZeppelin-style access-control reverts on the registrar operations
/// become `Unauthorized` so call sites can tell a permissions problem from
/// any other rejected write.
fn registrar_auth_error(err: ProtocolError, sender: Address) -> ProtocolError {
    match err {
        ProtocolError::OnChainRejected(msg)
            if msg.contains("AccessControl") || msg.contains("missing role") =>
        {
            ProtocolError::Unauthorized(sender)
        }
        other => other,
    }
}

#[async_trait]
impl Ledger for EvmLedger {
    async fn register_did(
        &self,
        did: &str,
        owner: Address,
        trust_level: u8,
        roles: &[Role],
    ) -> Result<(), ProtocolError> {
        let tags = roles.iter().map(|r| r.as_str().to_string()).collect();
        self.identity
            .register_did(did, owner, trust_level, tags)
            .await
            .map_err(|e| registrar_auth_error(e, self.sender))?;
        Ok(())
    }

    async fn verify_did(&self, did: &str) -> Result<(), ProtocolError> {
        self.identity
            .verify_did(did)
            .await
            .map_err(|e| registrar_auth_error(e, self.sender))?;
        Ok(())
    }

    async fn is_did_registered(&self, did: &str) -> Result<bool, ProtocolError> {
        self.identity.is_registered(did).await
    }

    async fn get_did(&self, did: &str) -> Result<Option<DidRecord>, ProtocolError> {
        if !self.identity.is_registered(did).await? {
            return Ok(None);
        }
        let (owner, trust, tags, verified, registered_at) = self.identity.get_did(did).await?;
        let mut roles = Vec::with_capacity(tags.len());
        for tag in &tags {
            let role = Role::parse(tag).ok_or_else(|| {
                ProtocolError::Transport(format!("ledger returned unknown role tag `{}`", tag))
            })?;
            roles.push(role);
        }
        Ok(Some(DidRecord {
            did: did.to_string(),
            owner,
            trust_level: trust.as_u64() as u8,
            roles,
            verified,
            registered_at: registered_at.as_u64(),
        }))
    }

    async fn validate_did_role(
        &self,
        did: &str,
        role: Role,
        caller: Address,
    ) -> Result<bool, ProtocolError> {
        self.identity
            .validate_role(did, role.on_chain_id(), caller)
            .await
    }

    async fn issue_credential(
        &self,
        id: &str,
        subject_did: &str,
        claims_json: &str,
        expires_at: u64,
    ) -> Result<(), ProtocolError> {
        self.credentials
            .issue(id, subject_did, claims_json, expires_at)
            .await?;
        Ok(())
    }

    async fn sign_credential(&self, id: &str, signature: &[u8]) -> Result<(), ProtocolError> {
        self.credentials.sign(id, signature).await?;
        Ok(())
    }

    async fn get_credential(
        &self,
        id: &str,
    ) -> Result<Option<VerifiableCredential>, ProtocolError> {
        if !self.credentials.exists(id).await? {
            return Ok(None);
        }
        let (subject_did, claims, issuer, issued_at, expires_at, signature, revoked) =
            self.credentials.get(id).await?;
        let claims = serde_json::from_str(&claims)
            .unwrap_or_else(|_| serde_json::Value::String(claims.clone()));
        Ok(Some(VerifiableCredential {
            id: id.to_string(),
            subject_did,
            claims,
            issuer,
            issued_at: issued_at.as_u64(),
            expires_at: expires_at.as_u64(),
            signature: if signature.is_empty() {
                None
            } else {
                Some(signature.to_vec())
            },
            revoked,
        }))
    }

    async fn validate_credential(&self, id: &str) -> Result<bool, ProtocolError> {
        self.credentials.validate(id).await
    }

    async fn revoke_credential(&self, id: &str) -> Result<(), ProtocolError> {
        self.credentials.revoke(id).await?;
        Ok(())
    }

    async fn issued_timestamp(&self, id: &str) -> Result<u64, ProtocolError> {
        self.credentials.issued_timestamp(id).await
    }

    async fn passport_exists(&self, token_id: U256) -> Result<bool, ProtocolError> {
        self.passport.exists(token_id).await
    }

    async fn get_battery_passport(
        &self,
        token_id: U256,
    ) -> Result<PassportSnapshot, ProtocolError> {
        let (owner, did_hash, status) = self.passport.get_passport(token_id).await?;
        Ok(PassportSnapshot {
            owner,
            did_hash,
            status: status.as_u64() as u8,
        })
    }

    async fn lifecycle_status(&self, token_id: U256) -> Result<u8, ProtocolError> {
        self.passport.lifecycle_status(token_id).await
    }

    async fn nonce_of(&self, account: Address) -> Result<U256, ProtocolError> {
        self.passport.nonce_of(account).await
    }

    async fn grant_role(&self, role: Role, account: Address) -> Result<H256, ProtocolError> {
        self.passport.grant_role(role.on_chain_id(), account).await
    }

    async fn assign_organization(
        &self,
        token_id: U256,
        organization: Address,
    ) -> Result<H256, ProtocolError> {
        self.passport.assign_organization(token_id, organization).await
    }

    async fn committed_digest(
        &self,
        token_id: U256,
        kind: DataKind,
        signature: &[u8],
    ) -> Result<H256, ProtocolError> {
        self.passport.committed_digest(token_id, kind, signature).await
    }

    async fn submit_update(&self, update: &LedgerUpdate) -> Result<H256, ProtocolError> {
        self.passport.submit_update(update).await
    }
}
