// src/services/credential_issuer.rs
//! Credential Issuer service.
//!
//! Manages the verifiable-credential lifecycle against the credential
//! registry: issue (unsigned) → sign (issuer typed-data signature) →
//! validate (pure read) → revoke (terminal). The issue → sign → validate
//! ordering is enforced by [`CredentialIssuer::issue_signed`], which aborts
//! on the first failing step.

use chrono::Utc;
use ethers_core::types::transaction::eip712::Eip712;
use ethers_core::types::{RecoveryMessage, Signature};
use std::sync::Arc;

use crate::blockchain::ledger::Ledger;
use crate::error::ProtocolError;
use crate::models::authorization::{credential_attestation, AuthDomain};
use crate::models::credential::VerifiableCredential;
use crate::wallet::signer::{signature_bytes, TypedDataSigner};

/// Service for issuing, signing, validating, and revoking credentials.
pub struct CredentialIssuer<L, S> {
    /// Ledger façade for credential-registry calls
    ledger: Arc<L>,
    /// Issuer's signing capability
    signer: Arc<S>,
    /// Typed-data domain the attestation is bound to
    domain: AuthDomain,
}

impl<L, S> CredentialIssuer<L, S>
where
    L: Ledger,
    S: TypedDataSigner,
{
    pub fn new(ledger: Arc<L>, signer: Arc<S>, domain: AuthDomain) -> Self {
        CredentialIssuer {
            ledger,
            signer,
            domain,
        }
    }

    /// Issues a new, unsigned credential for a verified DID.
    ///
    /// Issuing for an unverified DID is rejected before any ledger write or
    /// signature request; the ledger would reject it anyway and that failure
    /// is fatal, not retried.
    ///
    /// # Errors
    /// - `DuplicateCredential` when `id` already exists
    /// - `PreconditionFailed` when the subject DID is missing or unverified
    pub async fn issue(
        &self,
        id: &str,
        subject_did: &str,
        claims: &serde_json::Value,
        expires_at: u64,
    ) -> Result<(), ProtocolError> {
        if self.ledger.get_credential(id).await?.is_some() {
            return Err(ProtocolError::DuplicateCredential(id.to_string()));
        }
        let record = self.ledger.get_did(subject_did).await?.ok_or_else(|| {
            ProtocolError::PreconditionFailed(format!(
                "subject DID `{}` is not registered",
                subject_did
            ))
        })?;
        if !record.verified {
            return Err(ProtocolError::PreconditionFailed(format!(
                "subject DID `{}` is not verified",
                subject_did
            )));
        }
        let claims_json = serde_json::to_string(claims)?;
        log::info!("issuing credential {} for {}", id, subject_did);
        self.ledger
            .issue_credential(id, subject_did, &claims_json, expires_at)
            .await
    }

    /// Signs an issued credential and submits the signature on-chain.
    ///
    /// The issuance timestamp is read back from the ledger first: block
    /// time may differ from client time, and the attestation must commit to
    /// the recorded value.
    ///
    /// # Errors
    /// - `PreconditionFailed` when the credential does not exist
    /// - `SignatureLengthInvalid` when the signer returns an unexpected
    ///   signature length; this is a hard stop, never retried
    pub async fn sign(&self, id: &str) -> Result<Signature, ProtocolError> {
        let record = self.ledger.get_credential(id).await?.ok_or_else(|| {
            ProtocolError::PreconditionFailed(format!("credential `{}` does not exist", id))
        })?;
        let issued_at = self.ledger.issued_timestamp(id).await?;
        let claims_json = serde_json::to_string(&record.claims)?;
        let attestation = credential_attestation(
            &self.domain,
            id,
            self.signer.address(),
            &record.subject_did,
            &claims_json,
            issued_at,
            record.expires_at,
        );
        let signature = self.signer.sign_typed_data(&attestation).await?;
        let bytes = signature_bytes(&signature)?;
        self.ledger.sign_credential(id, &bytes).await?;
        Ok(signature)
    }

    /// Pure validity read: unrevoked, unexpired, and the stored signature
    /// recovers to the declared issuer. Missing or unsigned credentials are
    /// invalid, not errors.
    pub async fn validate(&self, id: &str) -> Result<bool, ProtocolError> {
        let record = match self.ledger.get_credential(id).await? {
            Some(record) => record,
            None => return Ok(false),
        };
        let now = Utc::now().timestamp() as u64;
        Ok(!record.revoked && !record.is_expired(now) && self.signature_recovers(&record)?)
    }

    /// Revokes a credential. Idempotent from the caller's perspective:
    /// revoking an already-revoked credential reports success.
    pub async fn revoke(&self, id: &str) -> Result<(), ProtocolError> {
        let record = self.ledger.get_credential(id).await?.ok_or_else(|| {
            ProtocolError::PreconditionFailed(format!("credential `{}` does not exist", id))
        })?;
        if record.revoked {
            return Ok(());
        }
        log::info!("revoking credential {}", id);
        self.ledger.revoke_credential(id).await
    }

    /// The issue → sign → validate sequence, defined once. Any failing step
    /// aborts the remaining steps.
    pub async fn issue_signed(
        &self,
        id: &str,
        subject_did: &str,
        claims: &serde_json::Value,
        expires_at: u64,
    ) -> Result<Signature, ProtocolError> {
        self.issue(id, subject_did, claims, expires_at).await?;
        let signature = self.sign(id).await?;
        if !self.validate(id).await? {
            return Err(ProtocolError::PreconditionFailed(format!(
                "credential `{}` did not validate after signing",
                id
            )));
        }
        Ok(signature)
    }

    fn signature_recovers(&self, record: &VerifiableCredential) -> Result<bool, ProtocolError> {
        let bytes = match &record.signature {
            Some(bytes) => bytes,
            None => return Ok(false),
        };
        let signature = match Signature::try_from(bytes.as_slice()) {
            Ok(signature) => signature,
            Err(_) => return Ok(false),
        };
        let claims_json = serde_json::to_string(&record.claims)?;
        let attestation = credential_attestation(
            &self.domain,
            &record.id,
            record.issuer,
            &record.subject_did,
            &claims_json,
            record.issued_at,
            record.expires_at,
        );
        let digest = attestation
            .encode_eip712()
            .map_err(|e| ProtocolError::Wallet(format!("typed data encoding failed: {}", e)))?;
        match signature.recover(RecoveryMessage::Hash(digest.into())) {
            Ok(recovered) => Ok(recovered == record.issuer),
            Err(_) => Ok(false),
        }
    }
}
