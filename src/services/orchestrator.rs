// src/services/orchestrator.rs
//! Authorized Update Orchestrator.
//!
//! One state machine for every signature-authorized passport update,
//! parameterized by action type. The canonical sequence:
//!
//! 1. Resolve the caller's `{did_name, credential_id}` (session cache, then
//!    directory)
//! 2. Pre-flight authorization checks (all reads, all before any write)
//! 3. Publish the JSON payload(s) to content storage
//! 4. Build the domain-separated authorization struct and collect the
//!    signature
//! 5. Submit the on-chain write (the only irreversible step)
//! 6. Reconcile off-chain state (append-only hash history + activity log),
//!    best-effort
//!
//! Steps are strictly sequential: each depends on the previous step's
//! result. No automatic retries anywhere; a partially published content
//! hash or a partially advanced nonce makes blind retries unsafe, so every
//! failure is reported for manual retry.
//!
//! The mirror-image integrity read path ([`UpdateOrchestrator::fetch_verified`])
//! cross-checks the on-chain commitment against the directory record before
//! fetching content, and never returns a payload it cannot prove was
//! authorized.

use chrono::Utc;
use ethers_core::types::{Address, H256, U256};
use ethers_core::utils::keccak256;
use std::sync::Arc;

use crate::blockchain::ledger::{Ledger, LedgerUpdate};
use crate::directory::directory_client::{Directory, RoleActivity, UserIdentity};
use crate::error::{FailedPart, ProtocolError, PublishedPart};
use crate::models::authorization::{
    read_authorization, update_authorization, AuthDomain, AuthorizationIntent, DataKind,
    UpdateAction,
};
use crate::models::did::{hash_did, DidRecord, Role, RoleTrustTable};
use crate::services::credential_issuer::CredentialIssuer;
use crate::services::identity_registrar::IdentityRegistrar;
use crate::services::session::Session;
use crate::storage::content_store::ContentStore;
use crate::wallet::signer::{signature_bytes, TypedDataSigner};

/// One JSON payload to publish, labeled with its data kind.
#[derive(Debug, Clone)]
pub struct PayloadPart {
    pub kind: DataKind,
    pub body: serde_json::Value,
}

/// A requested passport update.
#[derive(Debug, Clone)]
pub struct UpdateRequest {
    /// Passport token to update
    pub token_id: U256,
    /// Which update to perform
    pub action: UpdateAction,
    /// Role the caller acts under; checked at its configured trust level
    pub role: Role,
    /// Payload parts, ordered like `action.payload_kinds()`
    pub payloads: Vec<PayloadPart>,
    /// Receiving address, ownership transfers only
    pub new_owner: Option<Address>,
}

/// Outcome of a successful update.
#[derive(Debug, Clone)]
pub struct UpdateReceipt {
    /// Hash of the submitted transaction
    pub tx_hash: H256,
    /// Published content hashes, one per payload part
    pub content_hashes: Vec<PublishedPart>,
    /// Reconciliation warnings; non-empty when step 6 partially failed
    pub warnings: Vec<String>,
}

/// The authorized-update state machine.
pub struct UpdateOrchestrator<L, C, D, S> {
    ledger: Arc<L>,
    content: Arc<C>,
    directory: Arc<D>,
    signer: Arc<S>,
    session: Arc<Session>,
    registrar: IdentityRegistrar<L, D>,
    issuer: CredentialIssuer<L, S>,
    domain: AuthDomain,
}

impl<L, C, D, S> UpdateOrchestrator<L, C, D, S>
where
    L: Ledger,
    C: ContentStore,
    D: Directory,
    S: TypedDataSigner,
{
    /// Wires the orchestrator and its registrar/issuer collaborators from
    /// shared client handles and the session created on wallet connect.
    pub fn new(
        ledger: Arc<L>,
        content: Arc<C>,
        directory: Arc<D>,
        signer: Arc<S>,
        session: Arc<Session>,
        trust: RoleTrustTable,
        domain: AuthDomain,
    ) -> Self {
        let registrar = IdentityRegistrar::new(ledger.clone(), directory.clone(), trust);
        let issuer = CredentialIssuer::new(ledger.clone(), signer.clone(), domain.clone());
        UpdateOrchestrator {
            ledger,
            content,
            directory,
            signer,
            session,
            registrar,
            issuer,
            domain,
        }
    }

    /// Runs the full update sequence for `request`.
    pub async fn execute(&self, request: UpdateRequest) -> Result<UpdateReceipt, ProtocolError> {
        // step 1: resolve caller credentials
        let identity = self.resolve_identity().await?;
        log::debug!(
            "resolved identity {} / {} for {:#x}",
            identity.did_name,
            identity.credential_id,
            self.session.address()
        );

        // step 2: pre-flight authorization checks, all reads
        self.preflight(&request, &identity).await?;

        // step 3: publish content
        let published = self.publish(&request).await?;

        // step 4: build and collect the authorization signature
        let (intent, nonce) = self.build_intent(&request, &published).await?;
        let signature = self.signer.sign_typed_data(&intent.typed_data).await?;
        let signature = signature_bytes(&signature)?;

        // step 5: the on-chain write; everything above must already have
        // succeeded
        let update = LedgerUpdate {
            token_id: request.token_id,
            action: request.action,
            account: self.session.address(),
            content_hashes: published.iter().map(|p| p.hash.clone()).collect(),
            did_hash: hash_did(&identity.did_name),
            credential_id: identity.credential_id.clone(),
            new_owner: request.new_owner,
            nonce,
            signature,
        };
        let tx_hash = self.ledger.submit_update(&update).await?;
        log::info!(
            "{:?} update for token {} committed in {:#x}",
            request.action,
            request.token_id,
            tx_hash
        );

        // step 6: best-effort off-chain reconciliation
        let warnings = self.reconcile(&request, &published, tx_hash).await;

        Ok(UpdateReceipt {
            tx_hash,
            content_hashes: published,
            warnings,
        })
    }

    /// Integrity read path: proves the directory-recorded hash against the
    /// on-chain commitment before fetching the payload. Any mismatch is
    /// `HashMismatch` and the payload is never returned.
    pub async fn fetch_verified(
        &self,
        token_id: U256,
        kind: DataKind,
    ) -> Result<serde_json::Value, ProtocolError> {
        let account = self.session.address();
        let authorization = read_authorization(&self.domain, token_id, kind, account);
        let signature = self.signer.sign_typed_data(&authorization).await?;
        let signature = signature_bytes(&signature)?;

        let committed = self
            .ledger
            .committed_digest(token_id, kind, &signature)
            .await?;
        let record = self.directory.offchain_record(token_id).await?;
        let recorded = record.latest(kind).ok_or(ProtocolError::HashMismatch {
            stage: "directory",
            expected: format!("{:#x}", committed),
            actual: "<no recorded hash>".to_string(),
        })?;

        let digest = H256::from(keccak256(recorded.as_bytes()));
        if digest != committed {
            return Err(ProtocolError::HashMismatch {
                stage: "directory",
                expected: format!("{:#x}", committed),
                actual: format!("{:#x}", digest),
            });
        }

        self.content.fetch(recorded).await
    }

    async fn resolve_identity(&self) -> Result<UserIdentity, ProtocolError> {
        let address = self.session.address();
        if let Some(identity) = self.session.cached_identity(address) {
            return Ok(identity);
        }
        match self.directory.user_by_address(address).await? {
            Some(identity) => {
                self.session.remember_identity(address, identity.clone());
                Ok(identity)
            }
            None => Err(ProtocolError::NoCredentialFound(address)),
        }
    }

    async fn preflight(
        &self,
        request: &UpdateRequest,
        identity: &UserIdentity,
    ) -> Result<DidRecord, ProtocolError> {
        let expected = request.action.payload_kinds();
        let supplied: Vec<DataKind> = request.payloads.iter().map(|p| p.kind).collect();
        if supplied != expected {
            return Err(ProtocolError::PreconditionFailed(format!(
                "action {:?} expects payload kinds {:?}, got {:?}",
                request.action, expected, supplied
            )));
        }
        if request.action == UpdateAction::OwnershipTransfer && request.new_owner.is_none() {
            return Err(ProtocolError::PreconditionFailed(
                "ownership transfer requires a new owner".to_string(),
            ));
        }

        if !self.ledger.passport_exists(request.token_id).await? {
            return Err(ProtocolError::PreconditionFailed(format!(
                "passport token {} does not exist",
                request.token_id
            )));
        }

        if !self.issuer.validate(&identity.credential_id).await? {
            return Err(ProtocolError::PreconditionFailed(format!(
                "credential `{}` is revoked, expired, or unsigned",
                identity.credential_id
            )));
        }

        let address = self.session.address();
        let record = self
            .ledger
            .get_did(&identity.did_name)
            .await?
            .ok_or_else(|| {
                ProtocolError::PreconditionFailed(format!(
                    "DID `{}` is not registered",
                    identity.did_name
                ))
            })?;
        if record.owner != address {
            return Err(ProtocolError::PreconditionFailed(format!(
                "DID `{}` is owned by {:#x}, not the connected address {:#x}",
                identity.did_name, record.owner, address
            )));
        }

        let min_trust = self.registrar.min_trust(request.role);
        if !self
            .registrar
            .check_role(&identity.did_name, request.role, min_trust, address)
            .await?
        {
            return Err(ProtocolError::PreconditionFailed(format!(
                "DID `{}` does not hold role `{}` at trust level {}",
                identity.did_name,
                request.role.as_str(),
                min_trust
            )));
        }

        Ok(record)
    }

    async fn publish(&self, request: &UpdateRequest) -> Result<Vec<PublishedPart>, ProtocolError> {
        let mut published = Vec::new();
        let mut failed = Vec::new();
        for part in &request.payloads {
            match self.content.upload(&part.body).await {
                Ok(hash) => {
                    log::debug!("published {:?} payload as {}", part.kind, hash);
                    published.push(PublishedPart {
                        kind: part.kind,
                        hash,
                    });
                }
                Err(e) => failed.push(FailedPart {
                    kind: part.kind,
                    reason: e.to_string(),
                }),
            }
        }
        if !failed.is_empty() {
            // surface the halves separately so only the missing part is
            // retried, never the whole submission
            return Err(ProtocolError::ContentPublishFailed { published, failed });
        }
        Ok(published)
    }

    async fn build_intent(
        &self,
        request: &UpdateRequest,
        published: &[PublishedPart],
    ) -> Result<(AuthorizationIntent, Option<U256>), ProtocolError> {
        let account = self.session.address();
        // the nonce is re-read immediately before signing, never cached, so
        // a concurrent session cannot leave us with a stale value
        let nonce = if request.action.nonce_bearing() {
            Some(self.ledger.nonce_of(account).await?)
        } else {
            None
        };
        let hashes: Vec<String> = published.iter().map(|p| p.hash.clone()).collect();
        let intent = update_authorization(
            &self.domain,
            request.action,
            account,
            &hashes,
            request.new_owner,
            nonce,
        );
        Ok((intent, nonce))
    }

    async fn reconcile(
        &self,
        request: &UpdateRequest,
        published: &[PublishedPart],
        tx_hash: H256,
    ) -> Vec<String> {
        let mut warnings = Vec::new();

        for part in published {
            if let Err(e) = self
                .directory
                .append_offchain_hash(request.token_id, part.kind, &part.hash)
                .await
            {
                let warning = ProtocolError::ReconciliationFailed(format!(
                    "hash history append for {:?}: {}",
                    part.kind, e
                ));
                log::warn!("{}", warning);
                warnings.push(warning.to_string());
            }
        }

        let activity = RoleActivity {
            actor: format!("0x{:x}", self.session.address()),
            role: request.role,
            action: request.action,
            token_id: request.token_id.to_string(),
            tx_hash: format!("{:#x}", tx_hash),
            timestamp: Utc::now(),
        };
        if let Err(e) = self.directory.record_activity(&activity).await {
            let warning =
                ProtocolError::ReconciliationFailed(format!("activity log entry: {}", e));
            log::warn!("{}", warning);
            warnings.push(warning.to_string());
        }

        warnings
    }
}
