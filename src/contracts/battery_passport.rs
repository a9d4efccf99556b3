// src/contracts/battery_passport.rs
//! Battery Passport smart contract interface.
//!
//! Wraps the content-update contract: token reads, replay nonces, and the
//! six signature-authorized update methods. Every update takes the content
//! hash(es), the caller's DID hash, the credential id, and the typed-data
//! signature collected by the orchestrator.

use ethers_contract::Contract;
use ethers_core::abi::Abi;
use ethers_core::types::{Address, Bytes, H256, U256};
use std::sync::Arc;

use crate::blockchain::evm_client::EvmMiddleware;
use crate::blockchain::ledger::LedgerUpdate;
use crate::contracts::{abi_error, call_error, send_error, GAS_LIMIT};
use crate::error::ProtocolError;
use crate::models::authorization::{DataKind, UpdateAction};

const ABI_JSON: &[u8] = include_bytes!("../abi/BatteryPassport.json");

/// Battery Passport contract wrapper.
pub struct BatteryPassport {
    /// Underlying contract instance
    contract: Contract<EvmMiddleware>,
}

impl BatteryPassport {
    /// Creates a new BatteryPassport façade.
    pub fn new(client: Arc<EvmMiddleware>, contract_address: Address) -> Result<Self, ProtocolError> {
        let abi = Abi::load(ABI_JSON)
            .map_err(|e| ProtocolError::Config(format!("BatteryPassport ABI: {}", e)))?;
        Ok(BatteryPassport {
            contract: Contract::new(contract_address, abi, client),
        })
    }

    /// True when a passport token exists.
    pub async fn exists(&self, token_id: U256) -> Result<bool, ProtocolError> {
        self.contract
            .method::<_, bool>("exists", (token_id,))
            .map_err(abi_error)?
            .call()
            .await
            .map_err(call_error)
    }

    /// Owner, DID hash, and status of a passport token.
    pub async fn get_passport(
        &self,
        token_id: U256,
    ) -> Result<(Address, String, U256), ProtocolError> {
        self.contract
            .method::<_, (Address, String, U256)>("getBatteryPassport", (token_id,))
            .map_err(abi_error)?
            .call()
            .await
            .map_err(call_error)
    }

    /// Current lifecycle status code of a token.
    pub async fn lifecycle_status(&self, token_id: U256) -> Result<u8, ProtocolError> {
        let status: U256 = self
            .contract
            .method::<_, U256>("getLifecycleStatus", (token_id,))
            .map_err(abi_error)?
            .call()
            .await
            .map_err(call_error)?;
        Ok(status.as_u64() as u8)
    }

    /// Current replay nonce for `account`. Always re-read immediately before
    /// constructing a nonce-bearing signature.
    pub async fn nonce_of(&self, account: Address) -> Result<U256, ProtocolError> {
        self.contract
            .method::<_, U256>("nonces", (account,))
            .map_err(abi_error)?
            .call()
            .await
            .map_err(call_error)
    }

    /// Grants an on-chain role to an account (admin operation).
    pub async fn grant_role(&self, role_id: H256, account: Address) -> Result<H256, ProtocolError> {
        let call = self
            .contract
            .method::<_, H256>("grantRole", (role_id, account))
            .map_err(abi_error)?
            .gas(GAS_LIMIT);
        let pending = call.send().await.map_err(send_error)?;
        Ok(pending.tx_hash())
    }

    /// Binds a passport token to an organization (admin operation).
    pub async fn assign_organization(
        &self,
        token_id: U256,
        organization: Address,
    ) -> Result<H256, ProtocolError> {
        let call = self
            .contract
            .method::<_, H256>("assignOrganization", (token_id, organization))
            .map_err(abi_error)?
            .gas(GAS_LIMIT);
        let pending = call.send().await.map_err(send_error)?;
        Ok(pending.tx_hash())
    }

    /// Committed content digest for one kind of data, gated by a signed read
    /// authorization.
    pub async fn committed_digest(
        &self,
        token_id: U256,
        kind: DataKind,
        signature: &[u8],
    ) -> Result<H256, ProtocolError> {
        self.contract
            .method::<_, H256>(
                "committedDigest",
                (
                    token_id,
                    U256::from(kind.code()),
                    Bytes::from(signature.to_vec()),
                ),
            )
            .map_err(abi_error)?
            .call()
            .await
            .map_err(call_error)
    }

    /// Submits a signature-authorized update, dispatching to the
    /// action-specific contract method.
    pub async fn submit_update(&self, update: &LedgerUpdate) -> Result<H256, ProtocolError> {
        let sig = Bytes::from(update.signature.clone());
        let did = update.did_hash.clone();
        let cred = update.credential_id.clone();
        let method = update.action.contract_method();

        let call = match update.action {
            UpdateAction::MaterialComposition => self
                .contract
                .method::<_, H256>(
                    method,
                    (
                        update.token_id,
                        update.content_hash(0)?,
                        update.content_hash(1)?,
                        did,
                        cred,
                        sig,
                    ),
                )
                .map_err(abi_error)?,
            UpdateAction::OwnershipTransfer => self
                .contract
                .method::<_, H256>(
                    method,
                    (
                        update.token_id,
                        update.required_new_owner()?,
                        update.content_hash(0)?,
                        did,
                        cred,
                        update.required_nonce()?,
                        sig,
                    ),
                )
                .map_err(abi_error)?,
            UpdateAction::LifecycleStatus => self
                .contract
                .method::<_, H256>(
                    method,
                    (
                        update.token_id,
                        update.content_hash(0)?,
                        did,
                        cred,
                        update.required_nonce()?,
                        sig,
                    ),
                )
                .map_err(abi_error)?,
            UpdateAction::DueDiligence
            | UpdateAction::StatusChange
            | UpdateAction::DiscrepancyReport => self
                .contract
                .method::<_, H256>(
                    method,
                    (update.token_id, update.content_hash(0)?, did, cred, sig),
                )
                .map_err(abi_error)?,
        };

        let call = call.gas(GAS_LIMIT);
        let pending = call.send().await.map_err(send_error)?;
        Ok(pending.tx_hash())
    }
}
