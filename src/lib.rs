// src/lib.rs
//! # Passport Protocol
//!
//! Client-side protocol library for a multi-party battery-passport supply
//! chain. Implements the identity-and-authorization orchestration protocol:
//! DID registration and verification, verifiable-credential issuance and
//! signing, typed domain-separated authorization signatures over content
//! hashes, and the three-way integrity check across the ledger, the backend
//! directory, and content-addressed storage.
//!
//! ## Architecture Overview
//! 1. **Blockchain layer**: [`blockchain::evm_client::EvmClient`] and the
//!    [`blockchain::ledger::Ledger`] façade over the deployed contracts
//! 2. **Storage layer**: [`storage::content_store::ContentStore`] (IPFS)
//! 3. **Directory layer**: [`directory::directory_client::Directory`] (REST)
//! 4. **Wallet layer**: [`wallet::signer::TypedDataSigner`]
//! 5. **Services layer**: identity registrar, credential issuer, and the
//!    authorized-update orchestrator

pub mod blockchain;
pub mod config;
pub mod contracts;
pub mod directory;
pub mod error;
pub mod models;
pub mod services;
pub mod storage;
pub mod wallet;

#[cfg(test)]
pub mod testing;

pub use config::Settings;
pub use error::ProtocolError;
pub use models::authorization::{AuthDomain, DataKind, UpdateAction};
pub use models::did::{Role, RoleTrustTable};
pub use services::orchestrator::{PayloadPart, UpdateOrchestrator, UpdateReceipt, UpdateRequest};
pub use services::session::Session;
