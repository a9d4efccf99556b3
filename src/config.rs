// src/config.rs
//! Configuration for the passport protocol client.
//!
//! Settings are loaded once at startup from an optional `passport.toml` file
//! plus `PASSPORT_*` environment variables, and validated eagerly: contract
//! addresses must parse and the role trust table must be well-formed before
//! any component is constructed. Configuration failures block all further
//! operation.

use config::{Config, Environment, File};
use ethers_core::types::Address;
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;

use crate::error::ProtocolError;
use crate::models::did::RoleTrustTable;

/// Runtime settings for every external collaborator.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// JSON-RPC endpoint of the connected chain
    pub rpc_url: String,

    /// Deployed IdentityRegistry contract address (0x-hex)
    pub identity_registry: String,

    /// Deployed CredentialRegistry contract address (0x-hex)
    pub credential_registry: String,

    /// Deployed BatteryPassport contract address (0x-hex)
    pub battery_passport: String,

    /// Base URL of the backend directory REST API
    pub directory_base_url: String,

    /// IPFS node API endpoint used for uploads
    #[serde(default = "default_ipfs_api_url")]
    pub ipfs_api_url: String,

    /// Gateway URL template for content retrieval; `{hash}` is substituted
    /// with the content hash
    #[serde(default = "default_ipfs_gateway_url")]
    pub ipfs_gateway_url: String,

    /// Typed-data domain name, fixed per deployment
    #[serde(default = "default_auth_domain_name")]
    pub auth_domain_name: String,

    /// Typed-data domain version, fixed per deployment
    #[serde(default = "default_auth_domain_version")]
    pub auth_domain_version: String,

    /// Optional role → minimum trust level overrides
    #[serde(default)]
    pub trust_levels: Option<HashMap<String, u8>>,
}

fn default_ipfs_api_url() -> String {
    "http://localhost:5001".to_string()
}

fn default_ipfs_gateway_url() -> String {
    "http://localhost:8080/ipfs/{hash}".to_string()
}

fn default_auth_domain_name() -> String {
    "BatteryPassport".to_string()
}

fn default_auth_domain_version() -> String {
    "1".to_string()
}

impl Settings {
    /// Loads settings from `passport.toml` (optional) and `PASSPORT_*`
    /// environment variables, then validates them.
    ///
    /// # Errors
    /// Returns `ProtocolError::Config` when a source fails to parse, an
    /// address is malformed, or the trust table overrides are invalid.
    pub fn load() -> Result<Self, ProtocolError> {
        let settings: Settings = Config::builder()
            .add_source(File::with_name("passport").required(false))
            .add_source(Environment::with_prefix("PASSPORT"))
            .build()
            .and_then(Config::try_deserialize)
            .map_err(|e| ProtocolError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Eagerly parses everything that must be well-formed before first use.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        self.identity_registry_address()?;
        self.credential_registry_address()?;
        self.battery_passport_address()?;
        self.role_trust_table()?;
        if !self.ipfs_gateway_url.contains("{hash}") {
            return Err(ProtocolError::Config(
                "ipfs_gateway_url must contain a {hash} placeholder".to_string(),
            ));
        }
        Ok(())
    }

    pub fn identity_registry_address(&self) -> Result<Address, ProtocolError> {
        parse_address("identity_registry", &self.identity_registry)
    }

    pub fn credential_registry_address(&self) -> Result<Address, ProtocolError> {
        parse_address("credential_registry", &self.credential_registry)
    }

    pub fn battery_passport_address(&self) -> Result<Address, ProtocolError> {
        parse_address("battery_passport", &self.battery_passport)
    }

    /// The validated role → minimum trust table.
    pub fn role_trust_table(&self) -> Result<RoleTrustTable, ProtocolError> {
        RoleTrustTable::from_overrides(self.trust_levels.as_ref())
    }
}

fn parse_address(label: &str, value: &str) -> Result<Address, ProtocolError> {
    Address::from_str(value)
        .map_err(|e| ProtocolError::Config(format!("invalid {} address `{}`: {}", label, value, e)))
}
