// src/error.rs
//! Failure taxonomy for the passport protocol.
//!
//! Every component surfaces failures to its immediate caller as a typed
//! [`ProtocolError`]; no component swallows an error to produce a default
//! value. The taxonomy groups into:
//! - Precondition errors (missing role, unverified DID, nonexistent token,
//!   expired/revoked credential), recoverable by correcting state elsewhere
//! - Integrity errors (hash mismatch across ledger/directory/storage)
//! - Transport errors (RPC or HTTP failure, reported with the underlying message)
//! - User-cancellation errors (signature request denied), kept distinct from
//!   wallet/provider errors
//! - Fatal configuration errors (bad settings, contract not deployed), raised
//!   once at initialization

use ethers_core::types::Address;
use thiserror::Error;

use crate::models::authorization::DataKind;

/// A content part that was successfully published before a later part failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedPart {
    /// Kind of payload this part carries
    pub kind: DataKind,
    /// Content-store key returned by the upload
    pub hash: String,
}

/// A content part whose upload failed.
#[derive(Debug, Clone)]
pub struct FailedPart {
    /// Kind of payload this part carries
    pub kind: DataKind,
    /// Underlying upload error message
    pub reason: String,
}

/// Unified error type for every protocol component.
///
/// Variants map one-to-one onto the failure modes of the orchestration
/// sequence so call sites can distinguish a permissions problem from a
/// transient fault without string matching.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// DID registration attempted for an identifier that already exists
    #[error("DID `{0}` is already registered")]
    AlreadyRegistered(String),

    /// Caller lacks the privileged on-chain role required for the operation
    #[error("address {0:#x} is not authorized for this registry operation")]
    Unauthorized(Address),

    /// Credential issuance attempted with an id that already exists
    #[error("credential `{0}` already exists")]
    DuplicateCredential(String),

    /// Neither the session cache nor the directory knows a credential for
    /// the connected address
    #[error("no credential found for address {0:#x}")]
    NoCredentialFound(Address),

    /// A pre-flight read check failed before any write was attempted
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// One or more payload uploads failed; the published half is retained so
    /// the caller can retry only the missing part
    #[error("content publish incomplete: {} of {} parts published", published.len(), published.len() + failed.len())]
    ContentPublishFailed {
        published: Vec<PublishedPart>,
        failed: Vec<FailedPart>,
    },

    /// The user declined the wallet signing prompt
    #[error("signature request denied by user")]
    SignatureDenied,

    /// The signer returned a signature of unexpected length. Indicates
    /// wallet/provider incompatibility; never retried.
    #[error("signature malformed: expected 65 bytes, got {0}")]
    SignatureLengthInvalid(usize),

    /// The ledger rejected the state-changing call (revert, gas, nonce reuse)
    #[error("on-chain write rejected: {0}")]
    OnChainRejected(String),

    /// Off-chain reconciliation failed after the on-chain write succeeded.
    /// Non-fatal; surfaced as a warning only.
    #[error("off-chain reconciliation failed: {0}")]
    ReconciliationFailed(String),

    /// The three hash sources disagree; the content cannot be proven to be
    /// what was authorized and is never returned
    #[error("hash mismatch at {stage} (expected {expected}, got {actual})")]
    HashMismatch {
        stage: &'static str,
        expected: String,
        actual: String,
    },

    /// No bytecode is deployed at a configured contract address
    #[error("no contract deployed at {0:#x}")]
    ContractNotDeployed(Address),

    /// Settings could not be loaded or failed validation
    #[error("configuration error: {0}")]
    Config(String),

    /// RPC or HTTP failure, reported with the underlying message
    #[error("transport error: {0}")]
    Transport(String),

    /// Wallet/provider failure other than an explicit user denial
    #[error("wallet error: {0}")]
    Wallet(String),
}

impl ProtocolError {
    /// True for errors raised once at initialization that block all further
    /// operation.
    pub fn is_fatal_config(&self) -> bool {
        matches!(
            self,
            ProtocolError::Config(_) | ProtocolError::ContractNotDeployed(_)
        )
    }

    /// True for failures the caller can fix by correcting state elsewhere
    /// (registering, verifying, renewing a credential) rather than retrying.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            ProtocolError::AlreadyRegistered(_)
                | ProtocolError::Unauthorized(_)
                | ProtocolError::DuplicateCredential(_)
                | ProtocolError::NoCredentialFound(_)
                | ProtocolError::PreconditionFailed(_)
        )
    }
}

impl From<reqwest::Error> for ProtocolError {
    fn from(err: reqwest::Error) -> Self {
        ProtocolError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        ProtocolError::Transport(format!("payload (de)serialization failed: {}", err))
    }
}
