// src/wallet/signer.rs
//! Wallet signing capability.
//!
//! Wraps typed-data (EIP-712) and plain-message signing behind one trait so
//! the services can run against a local key in production tooling and a
//! deterministic fixed key in tests. ECDSA over secp256k1 is deterministic
//! (RFC 6979): identical input under the same key yields a byte-identical
//! signature.

use async_trait::async_trait;
use ethers::signers::{Signer as EthSigner, Wallet};
use ethers_core::types::transaction::eip712::TypedData;
use ethers_core::types::{Address, Signature};
use ethers_core::utils::hex;
use k256::ecdsa::SigningKey;
use k256::elliptic_curve::generic_array::GenericArray;

use crate::error::ProtocolError;

/// Expected signature length on the wire: r (32) + s (32) + v (1).
pub const SIGNATURE_LENGTH: usize = 65;

/// Typed-data and personal-message signing capability of the connected
/// wallet.
#[async_trait]
pub trait TypedDataSigner: Send + Sync {
    /// Address of the signing account.
    fn address(&self) -> Address;

    /// Signs a domain-separated typed-data payload.
    ///
    /// A user-denied request surfaces as `SignatureDenied`; every other
    /// wallet/provider failure surfaces as `Wallet`.
    async fn sign_typed_data(&self, payload: &TypedData) -> Result<Signature, ProtocolError>;

    /// Signs a plain (EIP-191 prefixed) message.
    async fn sign_personal(&self, message: &[u8]) -> Result<Signature, ProtocolError>;
}

/// Serializes a signature for on-chain submission, enforcing the expected
/// wire length. A wrong length indicates wallet/provider incompatibility and
/// is a hard stop, never retried.
pub fn signature_bytes(signature: &Signature) -> Result<Vec<u8>, ProtocolError> {
    let bytes = signature.to_vec();
    if bytes.len() != SIGNATURE_LENGTH {
        return Err(ProtocolError::SignatureLengthInvalid(bytes.len()));
    }
    Ok(bytes)
}

/// Local-key signer backed by an in-process secp256k1 wallet.
#[derive(Clone)]
pub struct WalletSigner {
    /// Signing wallet, bound to the connected chain id
    wallet: Wallet<SigningKey>,
}

impl WalletSigner {
    /// Creates a signer from a hex-encoded private key (with or without 0x
    /// prefix), bound to `chain_id`.
    pub fn new(private_key: &str, chain_id: u64) -> Result<Self, ProtocolError> {
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
        Ok(WalletSigner {
            wallet: Wallet::from(signing_key).with_chain_id(chain_id),
        })
    }
}

#[async_trait]
impl TypedDataSigner for WalletSigner {
    fn address(&self) -> Address {
        self.wallet.address()
    }

    async fn sign_typed_data(&self, payload: &TypedData) -> Result<Signature, ProtocolError> {
        self.wallet
            .sign_typed_data(payload)
            .await
            .map_err(|e| ProtocolError::Wallet(e.to_string()))
    }

    async fn sign_personal(&self, message: &[u8]) -> Result<Signature, ProtocolError> {
        self.wallet
            .sign_message(message)
            .await
            .map_err(|e| ProtocolError::Wallet(e.to_string()))
    }
}
