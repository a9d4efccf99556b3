// src/services/identity_registrar.rs
//! Identity Registrar service.
//!
//! Registers and verifies DIDs against the identity registry and performs
//! the client-side role/trust check that runs before every privileged write,
//! so a permissions problem fails fast with an actionable message instead of
//! spending gas on a revert. Also drives the pending-DID approval workflow
//! through the backend directory.

use ethers_core::types::Address;
use std::str::FromStr;
use std::sync::Arc;

use crate::blockchain::ledger::Ledger;
use crate::directory::directory_client::{Directory, PendingDid, PendingDidRequest};
use crate::error::ProtocolError;
use crate::models::did::{Role, RoleTrustTable};

/// Service for DID lifecycle management and role checks.
pub struct IdentityRegistrar<L, D> {
    /// Ledger façade for identity-registry calls
    ledger: Arc<L>,
    /// Directory façade for the pending-DID queue
    directory: Arc<D>,
    /// Role → minimum trust table from configuration
    trust: RoleTrustTable,
}

impl<L, D> IdentityRegistrar<L, D>
where
    L: Ledger,
    D: Directory,
{
    pub fn new(ledger: Arc<L>, directory: Arc<D>, trust: RoleTrustTable) -> Self {
        IdentityRegistrar {
            ledger,
            directory,
            trust,
        }
    }

    /// Registers a new DID, unverified.
    ///
    /// The caller's wallet must hold the privileged registrar role on-chain;
    /// a failure there surfaces as `Unauthorized` or `OnChainRejected`.
    ///
    /// # Errors
    /// - `AlreadyRegistered` when a record exists for `did`
    /// - `PreconditionFailed` for an empty role set or a trust level below
    ///   one of the requested roles' minimums
    pub async fn register(
        &self,
        did: &str,
        owner: Address,
        trust_level: u8,
        roles: &[Role],
    ) -> Result<(), ProtocolError> {
        if roles.is_empty() {
            return Err(ProtocolError::PreconditionFailed(
                "a DID requires at least one role".to_string(),
            ));
        }
        for role in roles {
            let min = self.trust.min_trust(*role);
            if trust_level < min {
                return Err(ProtocolError::PreconditionFailed(format!(
                    "trust level {} is below the minimum {} for role `{}`",
                    trust_level,
                    min,
                    role.as_str()
                )));
            }
        }
        if self.ledger.is_did_registered(did).await? {
            return Err(ProtocolError::AlreadyRegistered(did.to_string()));
        }
        log::info!("registering DID {} for owner {:#x}", did, owner);
        self.ledger
            .register_did(did, owner, trust_level, roles)
            .await
    }

    /// Flags a DID as verified. Idempotent: verifying an already-verified
    /// DID is a no-op.
    pub async fn verify(&self, did: &str) -> Result<(), ProtocolError> {
        let record = self.ledger.get_did(did).await?.ok_or_else(|| {
            ProtocolError::PreconditionFailed(format!("DID `{}` is not registered", did))
        })?;
        if record.verified {
            return Ok(());
        }
        log::info!("verifying DID {}", did);
        self.ledger.verify_did(did).await
    }

    /// Client-side role check: true only if the DID is registered, verified,
    /// owned by `caller`, holds `role`, and has trust level ≥ `min_trust`.
    ///
    /// Pure read; address comparison is canonical (parsing normalizes hex
    /// case).
    pub async fn check_role(
        &self,
        did: &str,
        role: Role,
        min_trust: u8,
        caller: Address,
    ) -> Result<bool, ProtocolError> {
        let record = match self.ledger.get_did(did).await? {
            Some(record) => record,
            None => return Ok(false),
        };
        Ok(record.verified
            && record.owner == caller
            && record.has_role(role)
            && record.trust_level >= min_trust)
    }

    /// Configured minimum trust level for `role`.
    pub fn min_trust(&self, role: Role) -> u8 {
        self.trust.min_trust(role)
    }

    /// Queues a DID registration for registrar approval, at the role's
    /// configured trust level.
    pub async fn submit_pending(
        &self,
        did: &str,
        owner: Address,
        role: Role,
    ) -> Result<PendingDid, ProtocolError> {
        let request = PendingDidRequest {
            did: did.to_string(),
            owner: format!("0x{:x}", owner),
            role,
            trust_level: self.trust.min_trust(role),
        };
        self.directory.submit_pending_did(&request).await
    }

    /// Approves a queued registration: marks it approved in the directory,
    /// then registers (unless already present) and verifies the DID on-chain.
    pub async fn approve_pending(&self, pending_id: &str) -> Result<(), ProtocolError> {
        let pending = self.directory.approve_pending_did(pending_id).await?;
        let owner = Address::from_str(&pending.owner).map_err(|e| {
            ProtocolError::PreconditionFailed(format!(
                "pending DID `{}` has malformed owner `{}`: {}",
                pending.id, pending.owner, e
            ))
        })?;
        if !self.ledger.is_did_registered(&pending.did).await? {
            self.register(&pending.did, owner, pending.trust_level, &[pending.role])
                .await?;
        }
        self.verify(&pending.did).await
    }
}
