// src/contracts/credential_registry.rs
//! Credential Registry smart contract interface.
//!
//! Wraps the on-chain verifiable-credential registry: issuance, issuer
//! signature submission, validation reads, and revocation.

use ethers_contract::Contract;
use ethers_core::abi::Abi;
use ethers_core::types::{Address, Bytes, H256, U256};
use std::sync::Arc;

use crate::blockchain::evm_client::EvmMiddleware;
use crate::contracts::{abi_error, call_error, send_error, GAS_LIMIT};
use crate::error::ProtocolError;

const ABI_JSON: &[u8] = include_bytes!("../abi/CredentialRegistry.json");

/// Credential Registry contract wrapper.
pub struct CredentialRegistry {
    /// Underlying contract instance
    contract: Contract<EvmMiddleware>,
}

impl CredentialRegistry {
    /// Creates a new CredentialRegistry façade.
    pub fn new(client: Arc<EvmMiddleware>, contract_address: Address) -> Result<Self, ProtocolError> {
        let abi = Abi::load(ABI_JSON)
            .map_err(|e| ProtocolError::Config(format!("CredentialRegistry ABI: {}", e)))?;
        Ok(CredentialRegistry {
            contract: Contract::new(contract_address, abi, client),
        })
    }

    /// Issues a new, unsigned credential. The ledger records block time as
    /// the issuance timestamp.
    pub async fn issue(
        &self,
        id: &str,
        subject_did: &str,
        claims_json: &str,
        expires_at: u64,
    ) -> Result<H256, ProtocolError> {
        let call = self
            .contract
            .method::<_, H256>(
                "issueVerifiableCredential",
                (
                    id.to_string(),
                    subject_did.to_string(),
                    claims_json.to_string(),
                    U256::from(expires_at),
                ),
            )
            .map_err(abi_error)?
            .gas(GAS_LIMIT);
        let pending = call.send().await.map_err(send_error)?;
        Ok(pending.tx_hash())
    }

    /// Submits the issuer signature for an issued credential.
    pub async fn sign(&self, id: &str, signature: &[u8]) -> Result<H256, ProtocolError> {
        let call = self
            .contract
            .method::<_, H256>(
                "signCredential",
                (id.to_string(), Bytes::from(signature.to_vec())),
            )
            .map_err(abi_error)?
            .gas(GAS_LIMIT);
        let pending = call.send().await.map_err(send_error)?;
        Ok(pending.tx_hash())
    }

    /// True when a credential exists under `id`.
    pub async fn exists(&self, id: &str) -> Result<bool, ProtocolError> {
        self.contract
            .method::<_, bool>("credentialExists", (id.to_string(),))
            .map_err(abi_error)?
            .call()
            .await
            .map_err(call_error)
    }

    /// Raw record fields: subject DID, claims JSON, issuer, issued-at,
    /// expires-at, signature bytes (empty until signed), revoked flag.
    pub async fn get(
        &self,
        id: &str,
    ) -> Result<(String, String, Address, U256, U256, Bytes, bool), ProtocolError> {
        self.contract
            .method::<_, (String, String, Address, U256, U256, Bytes, bool)>(
                "getCredential",
                (id.to_string(),),
            )
            .map_err(abi_error)?
            .call()
            .await
            .map_err(call_error)
    }

    /// On-chain validity read (unrevoked + unexpired + signature present).
    pub async fn validate(&self, id: &str) -> Result<bool, ProtocolError> {
        self.contract
            .method::<_, bool>("validateVerifiableCredential", (id.to_string(),))
            .map_err(abi_error)?
            .call()
            .await
            .map_err(call_error)
    }

    /// Revokes a credential. Revocation is terminal.
    pub async fn revoke(&self, id: &str) -> Result<H256, ProtocolError> {
        let call = self
            .contract
            .method::<_, H256>("revokeCredential", (id.to_string(),))
            .map_err(abi_error)?
            .gas(GAS_LIMIT);
        let pending = call.send().await.map_err(send_error)?;
        Ok(pending.tx_hash())
    }

    /// Issuance timestamp as recorded by the ledger. Read back before
    /// signing; block time may differ from client time.
    pub async fn issued_timestamp(&self, id: &str) -> Result<u64, ProtocolError> {
        let ts: U256 = self
            .contract
            .method::<_, U256>("getIssuedTimestamp", (id.to_string(),))
            .map_err(abi_error)?
            .call()
            .await
            .map_err(call_error)?;
        Ok(ts.as_u64())
    }
}
