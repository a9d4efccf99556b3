// src/services/session.rs
//! Connected-account session context.
//!
//! A [`Session`] is created when a wallet connects and dropped on disconnect
//! or account switch; nothing about the connected account lives in module
//! globals. The session carries the only shared client-side state of the
//! protocol: a credential cache mapping addresses to their directory
//! identity, used solely to avoid a directory round-trip. The cache is never
//! authoritative and is read-only during an update.

use ethers_core::types::Address;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::directory::directory_client::UserIdentity;

/// Per-connection session state.
pub struct Session {
    /// Connected wallet address
    address: Address,
    /// Chain id the wallet is connected to
    chain_id: u64,
    /// address → `{did_name, credential_id}` cache
    cache: RwLock<HashMap<Address, UserIdentity>>,
}

impl Session {
    /// Opens a session for a newly connected account.
    pub fn connect(address: Address, chain_id: u64) -> Self {
        Session {
            address,
            chain_id,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Connected wallet address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Chain id of the connected network.
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Cached directory identity for `address`, if resolved before.
    pub fn cached_identity(&self, address: Address) -> Option<UserIdentity> {
        self.cache.read().expect("cache lock poisoned").get(&address).cloned()
    }

    /// Remembers a resolved identity for later lookups.
    pub fn remember_identity(&self, address: Address, identity: UserIdentity) {
        self.cache
            .write()
            .expect("cache lock poisoned")
            .insert(address, identity);
    }
}
