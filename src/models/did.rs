// src/models/did.rs
//! Decentralized Identifier (DID) data model.
//!
//! Defines the on-chain DID record, the closed role enumeration with its
//! on-chain identifiers, and the role → minimum-trust-level table.
//!
//! # DID Format
//! Identifiers follow DID syntax with a discriminator fragment:
//! ```text
//! did:<method>:<namespace>#<discriminator>
//! ```

use ethers_core::types::{Address, H256};
use ethers_core::utils::{hex, keccak256};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ProtocolError;

/// Closed enumeration of the supply-chain roles a DID may hold.
///
/// Each role carries a fixed on-chain `bytes32` identifier and a minimum
/// trust level. The set is closed: role dispatch never goes through string
/// concatenation at call time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Manufacturer,
    Supplier,
    Miner,
    Recycler,
    TenantAdmin,
    Government,
}

impl Role {
    /// All roles, in declaration order.
    pub const ALL: [Role; 6] = [
        Role::Manufacturer,
        Role::Supplier,
        Role::Miner,
        Role::Recycler,
        Role::TenantAdmin,
        Role::Government,
    ];

    /// The role tag as stored in a DID's role set.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Manufacturer => "manufacturer",
            Role::Supplier => "supplier",
            Role::Miner => "miner",
            Role::Recycler => "recycler",
            Role::TenantAdmin => "tenant-admin",
            Role::Government => "government",
        }
    }

    /// The Solidity-side role constant this tag maps to.
    fn on_chain_tag(&self) -> &'static str {
        match self {
            Role::Manufacturer => "MANUFACTURER_ROLE",
            Role::Supplier => "SUPPLIER_ROLE",
            Role::Miner => "MINER_ROLE",
            Role::Recycler => "RECYCLER_ROLE",
            Role::TenantAdmin => "TENANT_ADMIN_ROLE",
            Role::Government => "GOVERNMENT_ROLE",
        }
    }

    /// On-chain `bytes32` identifier of the role (keccak of the role constant,
    /// matching Solidity's `keccak256("MANUFACTURER_ROLE")`).
    pub fn on_chain_id(&self) -> H256 {
        H256::from(keccak256(self.on_chain_tag().as_bytes()))
    }

    /// Parses a role tag as used in configuration and directory payloads.
    pub fn parse(tag: &str) -> Option<Role> {
        Role::ALL.iter().copied().find(|r| r.as_str() == tag)
    }
}

/// Default role → minimum trust level mapping.
///
/// Overridable through configuration; see [`RoleTrustTable`].
static DEFAULT_TRUST_LEVELS: Lazy<HashMap<Role, u8>> = Lazy::new(|| {
    HashMap::from([
        (Role::Manufacturer, 4),
        (Role::Supplier, 3),
        (Role::Miner, 2),
        (Role::Recycler, 3),
        (Role::TenantAdmin, 5),
        (Role::Government, 5),
    ])
});

/// Highest trust level a DID can be assigned.
pub const MAX_TRUST_LEVEL: u8 = 5;

/// Role → minimum trust level table, validated at configuration load time.
///
/// The mapping is configuration, not derived: unknown role names or levels
/// outside `1..=MAX_TRUST_LEVEL` in an override are fatal configuration
/// errors rather than call-time surprises.
#[derive(Debug, Clone)]
pub struct RoleTrustTable {
    levels: HashMap<Role, u8>,
}

impl RoleTrustTable {
    /// Builds the table from the defaults plus optional configured overrides.
    ///
    /// # Errors
    /// Returns `ProtocolError::Config` if an override names an unknown role
    /// or a level outside the valid range.
    pub fn from_overrides(overrides: Option<&HashMap<String, u8>>) -> Result<Self, ProtocolError> {
        let mut levels = DEFAULT_TRUST_LEVELS.clone();
        if let Some(overrides) = overrides {
            for (tag, level) in overrides {
                let role = Role::parse(tag).ok_or_else(|| {
                    ProtocolError::Config(format!("unknown role `{}` in trust level overrides", tag))
                })?;
                if *level == 0 || *level > MAX_TRUST_LEVEL {
                    return Err(ProtocolError::Config(format!(
                        "trust level {} for role `{}` outside 1..={}",
                        level, tag, MAX_TRUST_LEVEL
                    )));
                }
                levels.insert(role, *level);
            }
        }
        Ok(RoleTrustTable { levels })
    }

    /// Minimum trust level required to exercise `role`.
    pub fn min_trust(&self, role: Role) -> u8 {
        // every Role key is present: construction starts from the full default map
        self.levels[&role]
    }
}

impl Default for RoleTrustTable {
    fn default() -> Self {
        RoleTrustTable {
            levels: DEFAULT_TRUST_LEVELS.clone(),
        }
    }
}

/// A DID record as stored by the identity registry.
///
/// The owning address never changes after registration; the trust level is
/// assigned at registration and can only be elevated by a re-registration.
/// Records are never deleted, only flagged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DidRecord {
    /// The complete DID string identifier
    /// Example: "did:web:org.example#create-0xabc"
    pub did: String,

    /// Address that owns (controls) this DID
    pub owner: Address,

    /// Trust level assigned at registration
    pub trust_level: u8,

    /// Non-empty set of role tags this DID holds
    pub roles: Vec<Role>,

    /// Whether a registrar has verified this DID
    pub verified: bool,

    /// Unix timestamp of registration (ledger time, not client time)
    pub registered_at: u64,
}

impl DidRecord {
    /// True if `role` is present in this record's role set.
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

/// Hashes a DID name to the hex digest form the passport contract expects.
pub fn hash_did(did: &str) -> String {
    format!("0x{}", hex::encode(keccak256(did.as_bytes())))
}
