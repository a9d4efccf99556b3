// src/contracts/mod.rs
//! Typed façades over the deployed registry and passport contracts.
//!
//! Each façade owns an `ethers` contract instance built from a compiled-in
//! JSON ABI. Reads map failures to transport errors; state-changing sends map
//! failures to `OnChainRejected` carrying the revert/gas detail.

pub mod battery_passport;
pub mod credential_registry;
pub mod identity_registry;

use crate::error::ProtocolError;

/// Fixed gas limit for registry writes (adjust per deployment if needed).
pub(crate) const GAS_LIMIT: u64 = 3_000_000;

pub(crate) fn abi_error(e: impl std::fmt::Display) -> ProtocolError {
    ProtocolError::Transport(format!("abi error: {}", e))
}

pub(crate) fn call_error(e: impl std::fmt::Display) -> ProtocolError {
    ProtocolError::Transport(format!("contract call failed: {}", e))
}

pub(crate) fn send_error(e: impl std::fmt::Display) -> ProtocolError {
    ProtocolError::OnChainRejected(e.to_string())
}
