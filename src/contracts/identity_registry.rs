// src/contracts/identity_registry.rs
//! Identity Registry smart contract interface.
//!
//! Wraps the on-chain DID registry: registration, verification, and the
//! role/trust reads backing the client-side pre-flight checks.

use ethers_contract::Contract;
use ethers_core::abi::Abi;
use ethers_core::types::{Address, H256, U256};
use std::sync::Arc;

use crate::blockchain::evm_client::EvmMiddleware;
use crate::contracts::{abi_error, call_error, send_error, GAS_LIMIT};
use crate::error::ProtocolError;

const ABI_JSON: &[u8] = include_bytes!("../abi/IdentityRegistry.json");

/// Identity Registry contract wrapper.
pub struct IdentityRegistry {
    /// Underlying contract instance
    contract: Contract<EvmMiddleware>,
}

impl IdentityRegistry {
    /// Creates a new IdentityRegistry façade.
    ///
    /// # Arguments
    /// * `client` - Signing middleware from [`EvmClient`](crate::blockchain::evm_client::EvmClient)
    /// * `contract_address` - Address of the deployed IdentityRegistry contract
    pub fn new(client: Arc<EvmMiddleware>, contract_address: Address) -> Result<Self, ProtocolError> {
        let abi = Abi::load(ABI_JSON)
            .map_err(|e| ProtocolError::Config(format!("IdentityRegistry ABI: {}", e)))?;
        Ok(IdentityRegistry {
            contract: Contract::new(contract_address, abi, client),
        })
    }

    /// Registers a new DID, unverified. The sending wallet must hold the
    /// registrar role on-chain.
    pub async fn register_did(
        &self,
        did: &str,
        owner: Address,
        trust_level: u8,
        roles: Vec<String>,
    ) -> Result<H256, ProtocolError> {
        let call = self
            .contract
            .method::<_, H256>(
                "registerDID",
                (did.to_string(), owner, U256::from(trust_level), roles),
            )
            .map_err(abi_error)?
            .gas(GAS_LIMIT);
        let pending = call.send().await.map_err(send_error)?;
        Ok(pending.tx_hash())
    }

    /// Flags a registered DID as verified.
    pub async fn verify_did(&self, did: &str) -> Result<H256, ProtocolError> {
        let call = self
            .contract
            .method::<_, H256>("verifyDID", (did.to_string(),))
            .map_err(abi_error)?
            .gas(GAS_LIMIT);
        let pending = call.send().await.map_err(send_error)?;
        Ok(pending.tx_hash())
    }

    /// True when a record exists for `did`.
    pub async fn is_registered(&self, did: &str) -> Result<bool, ProtocolError> {
        self.contract
            .method::<_, bool>("isDIDRegistered", (did.to_string(),))
            .map_err(abi_error)?
            .call()
            .await
            .map_err(call_error)
    }

    /// Raw record fields: owner, trust level, role tags, verified flag,
    /// registration timestamp.
    pub async fn get_did(
        &self,
        did: &str,
    ) -> Result<(Address, U256, Vec<String>, bool, U256), ProtocolError> {
        self.contract
            .method::<_, (Address, U256, Vec<String>, bool, U256)>("getDID", (did.to_string(),))
            .map_err(abi_error)?
            .call()
            .await
            .map_err(call_error)
    }

    /// On-chain role validation mirror of the client-side check.
    pub async fn validate_role(
        &self,
        did: &str,
        role_id: H256,
        caller: Address,
    ) -> Result<bool, ProtocolError> {
        self.contract
            .method::<_, bool>("validateDIDRole", (did.to_string(), role_id, caller))
            .map_err(abi_error)?
            .call()
            .await
            .map_err(call_error)
    }
}
