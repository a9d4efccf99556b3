// src/models/credential.rs
//! Verifiable Credential data model.
//!
//! A credential is a signed claim set about a DID with an
//! issuance/expiry/revocation lifecycle:
//! issued unsigned → signed by issuer → validated by any relying party →
//! optionally revoked. Revocation is terminal.

use ethers_core::types::Address;
use serde::{Deserialize, Serialize};

/// A Verifiable Credential as stored by the credential registry.
///
/// A credential is valid only if it is unrevoked, unexpired, and its stored
/// signature recovers to the declared issuer; see
/// [`CredentialIssuer::validate`](crate::services::credential_issuer::CredentialIssuer::validate).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiableCredential {
    /// Caller-chosen unique identifier
    /// Example: "vc:battery:lot-7#supplier-0xabc"
    pub id: String,

    /// DID of the credential subject
    pub subject_did: String,

    /// Arbitrary JSON claim payload
    pub claims: serde_json::Value,

    /// Address of the issuing entity
    pub issuer: Address,

    /// Unix timestamp of issuance (ledger block time, not client time)
    pub issued_at: u64,

    /// Unix timestamp after which the credential no longer validates
    pub expires_at: u64,

    /// 65-byte issuer signature; absent until the signing step completes
    pub signature: Option<Vec<u8>>,

    /// Terminal revocation flag
    pub revoked: bool,
}

impl VerifiableCredential {
    /// True once `now` has passed the expiry timestamp.
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }
}
