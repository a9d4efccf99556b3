// src/blockchain/evm_client.rs
//! EVM chain client.
//!
//! Provides the provider/wallet middleware shared by every contract façade,
//! plus the deployed-bytecode check performed once at initialization for each
//! configured contract address.

use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{Signer as EthSigner, Wallet};
use ethers_core::types::Address;
use ethers_core::utils::hex;
use k256::ecdsa::SigningKey;
use k256::elliptic_curve::generic_array::GenericArray;
use std::sync::Arc;

use crate::error::ProtocolError;

/// Middleware stack used by all contract façades: HTTP provider + local
/// signing wallet.
pub type EvmMiddleware = SignerMiddleware<Provider<Http>, Wallet<SigningKey>>;

/// EVM client managing the provider, the connected wallet, and the live
/// chain id.
#[derive(Clone)]
pub struct EvmClient {
    /// Raw provider, used for read-only calls that need no signer
    provider: Arc<Provider<Http>>,
    /// Provider wrapped with the signing wallet for state-changing calls
    middleware: Arc<EvmMiddleware>,
    /// Chain id read from the connected network, never assumed
    chain_id: u64,
    /// Address of the connected wallet
    address: Address,
}

impl EvmClient {
    /// Connects to the chain and initializes the signing wallet.
    ///
    /// # Arguments
    /// * `rpc_url` - JSON-RPC endpoint URL
    /// * `private_key` - Hex-encoded private key (with or without 0x prefix)
    ///
    /// # Errors
    /// Returns `ProtocolError::Config` for a malformed key or URL and
    /// `ProtocolError::Transport` when the chain id cannot be read.
    pub async fn connect(rpc_url: &str, private_key: &str) -> Result<Self, ProtocolError> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| ProtocolError::Config(format!("invalid rpc url `{}`: {}", rpc_url, e)))?;

        let key_bytes = hex::decode(private_key.trim_start_matches("0x"))
            .map_err(|e| ProtocolError::Config(format!("invalid private key hex: {}", e)))?;
        if key_bytes.len() != 32 {
            return Err(ProtocolError::Config(format!(
                "private key must be 32 bytes, got {}",
                key_bytes.len()
            )));
        }
        let signing_key = SigningKey::from_bytes(GenericArray::from_slice(&key_bytes))
            .map_err(|e| ProtocolError::Config(format!("invalid private key: {}", e)))?;

        let chain_id = provider
            .get_chainid()
            .await
            .map_err(|e| ProtocolError::Transport(format!("failed to read chain id: {}", e)))?
            .as_u64();

        let wallet = Wallet::from(signing_key).with_chain_id(chain_id);
        let address = wallet.address();
        let middleware = Arc::new(SignerMiddleware::new(provider.clone(), wallet));

        Ok(EvmClient {
            provider: Arc::new(provider),
            middleware,
            chain_id,
            address,
        })
    }

    /// Live chain id of the connected network.
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Address of the connected wallet.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Middleware handle for constructing contract façades.
    pub fn middleware(&self) -> Arc<EvmMiddleware> {
        self.middleware.clone()
    }

    /// Fails fast with `ContractNotDeployed` when no bytecode exists at
    /// `address` on the connected chain.
    pub async fn ensure_deployed(&self, address: Address) -> Result<(), ProtocolError> {
        let code = self
            .provider
            .get_code(address, None)
            .await
            .map_err(|e| ProtocolError::Transport(format!("get_code failed: {}", e)))?;
        if code.as_ref().is_empty() {
            return Err(ProtocolError::ContractNotDeployed(address));
        }
        Ok(())
    }
}
