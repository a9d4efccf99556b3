// src/models/authorization.rs
//! Typed, domain-separated authorization intents (EIP-712 style).
//!
//! Every state-changing passport action is authorized by a signature over a
//! structured, domain-separated message containing the content hash(es) being
//! committed and the authorizing address. Replay-sensitive actions (ownership
//! transfer, lifecycle status) additionally embed a freshly read on-chain
//! nonce.
//!
//! The struct encoding must exactly match what the verifying contract
//! recomputes: a field-order or type mismatch does not fail client-side, it
//! silently produces a non-matching signature. All field tables therefore
//! live in this one module and nowhere else.

use ethers_core::types::transaction::eip712::{EIP712Domain, Eip712, Eip712DomainType, TypedData};
use ethers_core::types::{Address, U256};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::error::ProtocolError;

/// Typed-data domain binding a signature to one contract on one chain.
#[derive(Debug, Clone)]
pub struct AuthDomain {
    /// Domain name, fixed per deployment (e.g. "BatteryPassport")
    pub name: String,
    /// Domain version, fixed per deployment
    pub version: String,
    /// Live chain id of the connected network
    pub chain_id: u64,
    /// Address of the verifying contract
    pub verifying_contract: Address,
}

impl AuthDomain {
    fn eip712(&self) -> EIP712Domain {
        EIP712Domain {
            name: Some(self.name.clone()),
            version: Some(self.version.clone()),
            chain_id: Some(U256::from(self.chain_id)),
            verifying_contract: Some(self.verifying_contract),
            salt: None,
        }
    }

    fn domain_fields() -> Vec<Eip712DomainType> {
        vec![
            field("name", "string"),
            field("version", "string"),
            field("chainId", "uint256"),
            field("verifyingContract", "address"),
        ]
    }
}

/// Kinds of content a passport token carries, one history per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataKind {
    MaterialComposition,
    DueDiligence,
    LifecycleStatus,
    Ownership,
    Status,
    Discrepancy,
}

impl DataKind {
    /// Wire encoding used by the passport contract's committed-digest getter.
    pub fn code(&self) -> u8 {
        match self {
            DataKind::MaterialComposition => 0,
            DataKind::DueDiligence => 1,
            DataKind::LifecycleStatus => 2,
            DataKind::Ownership => 3,
            DataKind::Status => 4,
            DataKind::Discrepancy => 5,
        }
    }

    /// Kind tag as used in directory payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataKind::MaterialComposition => "material-composition",
            DataKind::DueDiligence => "due-diligence",
            DataKind::LifecycleStatus => "lifecycle-status",
            DataKind::Ownership => "ownership",
            DataKind::Status => "status",
            DataKind::Discrepancy => "discrepancy",
        }
    }
}

/// The six state-changing passport actions the orchestrator can authorize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateAction {
    MaterialComposition,
    DueDiligence,
    LifecycleStatus,
    OwnershipTransfer,
    StatusChange,
    DiscrepancyReport,
}

impl UpdateAction {
    /// Payload parts this action publishes, in signature field order.
    ///
    /// Material composition carries its due-diligence report alongside; both
    /// are uploaded and hashed independently.
    pub fn payload_kinds(&self) -> &'static [DataKind] {
        match self {
            UpdateAction::MaterialComposition => {
                &[DataKind::MaterialComposition, DataKind::DueDiligence]
            }
            UpdateAction::DueDiligence => &[DataKind::DueDiligence],
            UpdateAction::LifecycleStatus => &[DataKind::LifecycleStatus],
            UpdateAction::OwnershipTransfer => &[DataKind::Ownership],
            UpdateAction::StatusChange => &[DataKind::Status],
            UpdateAction::DiscrepancyReport => &[DataKind::Discrepancy],
        }
    }

    /// Name of the passport contract method committing this action.
    pub fn contract_method(&self) -> &'static str {
        match self {
            UpdateAction::MaterialComposition => "updateMaterialComposition",
            UpdateAction::DueDiligence => "updateDueDiligence",
            UpdateAction::LifecycleStatus => "updateLifecycleStatus",
            UpdateAction::OwnershipTransfer => "transferOwnership",
            UpdateAction::StatusChange => "updateStatus",
            UpdateAction::DiscrepancyReport => "reportDiscrepancy",
        }
    }

    /// Primary type of the typed-data struct authorizing this action.
    pub fn primary_type(&self) -> &'static str {
        match self {
            UpdateAction::MaterialComposition => "MaterialCompositionUpdate",
            UpdateAction::DueDiligence => "DueDiligenceUpdate",
            UpdateAction::LifecycleStatus => "LifecycleStatusUpdate",
            UpdateAction::OwnershipTransfer => "OwnershipTransfer",
            UpdateAction::StatusChange => "StatusChange",
            UpdateAction::DiscrepancyReport => "DiscrepancyReport",
        }
    }

    /// True for actions whose struct embeds a replay-protection nonce.
    pub fn nonce_bearing(&self) -> bool {
        matches!(
            self,
            UpdateAction::OwnershipTransfer | UpdateAction::LifecycleStatus
        )
    }
}

/// An ephemeral, unpersisted authorization: the action, the domain-separated
/// struct, and (once collected) the signature. Constructed per call, consumed
/// once. Nonce-bearing variants are never reused; hash-bearing variants are
/// naturally idempotent.
#[derive(Debug, Clone)]
pub struct AuthorizationIntent {
    pub action: UpdateAction,
    pub typed_data: TypedData,
}

impl AuthorizationIntent {
    /// The 32-byte digest the signer commits to.
    pub fn digest(&self) -> Result<[u8; 32], ProtocolError> {
        self.typed_data
            .encode_eip712()
            .map_err(|e| ProtocolError::Wallet(format!("typed data encoding failed: {}", e)))
    }
}

/// Builds the authorization intent for a state-changing passport action.
///
/// `content_hashes` must be ordered like
/// [`UpdateAction::payload_kinds`]; `new_owner` is required for ownership
/// transfers and `nonce` for every nonce-bearing action. The orchestrator
/// validates both before calling here.
pub fn update_authorization(
    domain: &AuthDomain,
    action: UpdateAction,
    account: Address,
    content_hashes: &[String],
    new_owner: Option<Address>,
    nonce: Option<U256>,
) -> AuthorizationIntent {
    let mut fields = Vec::new();
    let mut message: BTreeMap<String, Value> = BTreeMap::new();

    match action {
        UpdateAction::MaterialComposition => {
            fields.push(field("materialHash", "string"));
            fields.push(field("dueDiligenceHash", "string"));
            message.insert("materialHash".into(), json!(content_hashes[0]));
            message.insert("dueDiligenceHash".into(), json!(content_hashes[1]));
        }
        _ => {
            fields.push(field("contentHash", "string"));
            message.insert("contentHash".into(), json!(content_hashes[0]));
        }
    }

    if action == UpdateAction::OwnershipTransfer {
        fields.push(field("newOwner", "address"));
        message.insert(
            "newOwner".into(),
            addr_value(new_owner.unwrap_or_default()),
        );
    }

    fields.push(field("account", "address"));
    message.insert("account".into(), addr_value(account));

    if action.nonce_bearing() {
        fields.push(field("nonce", "uint256"));
        message.insert("nonce".into(), u256_value(nonce.unwrap_or_default()));
    }

    AuthorizationIntent {
        action,
        typed_data: typed_data(domain, action.primary_type(), fields, message),
    }
}

/// Builds the typed-data struct an issuer signs over a credential.
///
/// `issued_at` must be the value read back from the ledger after issuance,
/// never the client clock.
pub fn credential_attestation(
    domain: &AuthDomain,
    id: &str,
    issuer: Address,
    subject_did: &str,
    claims_json: &str,
    issued_at: u64,
    expires_at: u64,
) -> TypedData {
    let fields = vec![
        field("id", "string"),
        field("issuer", "address"),
        field("subject", "string"),
        field("claims", "string"),
        field("issuedAt", "uint256"),
        field("expiresAt", "uint256"),
    ];
    let message = BTreeMap::from([
        ("id".to_string(), json!(id)),
        ("issuer".to_string(), addr_value(issuer)),
        ("subject".to_string(), json!(subject_did)),
        ("claims".to_string(), json!(claims_json)),
        ("issuedAt".to_string(), u256_value(U256::from(issued_at))),
        ("expiresAt".to_string(), u256_value(U256::from(expires_at))),
    ]);
    typed_data(domain, "CredentialAttestation", fields, message)
}

/// Builds the signed read authorization used by the integrity read path.
pub fn read_authorization(
    domain: &AuthDomain,
    token_id: U256,
    kind: DataKind,
    account: Address,
) -> TypedData {
    let fields = vec![
        field("tokenId", "uint256"),
        field("kind", "uint8"),
        field("account", "address"),
    ];
    let message = BTreeMap::from([
        ("tokenId".to_string(), u256_value(token_id)),
        ("kind".to_string(), u256_value(U256::from(kind.code()))),
        ("account".to_string(), addr_value(account)),
    ]);
    typed_data(domain, "ReadAuthorization", fields, message)
}

fn typed_data(
    domain: &AuthDomain,
    primary_type: &str,
    fields: Vec<Eip712DomainType>,
    message: BTreeMap<String, Value>,
) -> TypedData {
    let mut types: BTreeMap<String, Vec<Eip712DomainType>> = BTreeMap::new();
    types.insert("EIP712Domain".to_string(), AuthDomain::domain_fields());
    types.insert(primary_type.to_string(), fields);
    TypedData {
        domain: domain.eip712(),
        types,
        primary_type: primary_type.to_string(),
        message,
    }
}

fn field(name: &str, ty: &str) -> Eip712DomainType {
    Eip712DomainType {
        name: name.to_string(),
        r#type: ty.to_string(),
    }
}

fn addr_value(addr: Address) -> Value {
    json!(format!("0x{:x}", addr))
}

fn u256_value(value: U256) -> Value {
    json!(format!("0x{:x}", value))
}
