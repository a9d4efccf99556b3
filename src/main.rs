// src/main.rs
//! Connectivity check and read-path probe for the passport protocol.
//!
//! Loads configuration, connects the chain client, verifies that every
//! configured contract is deployed, and reports the connected account's
//! directory identity and credential state. With a token id argument it also
//! runs the verified read path for that token's due-diligence record.
//!
//! ## Environment Variables Required
//! - `PRIVATE_KEY`: wallet private key (hex)
//! - `PASSPORT_RPC_URL`, `PASSPORT_IDENTITY_REGISTRY`,
//!   `PASSPORT_CREDENTIAL_REGISTRY`, `PASSPORT_BATTERY_PASSPORT`,
//!   `PASSPORT_DIRECTORY_BASE_URL` (or a `passport.toml`)

use anyhow::Context;
use dotenv::dotenv;
use ethers_core::types::U256;
use std::sync::Arc;

use passport_protocol::blockchain::evm_client::EvmClient;
use passport_protocol::blockchain::ledger::{EvmLedger, Ledger};
use passport_protocol::directory::directory_client::{Directory, RestDirectory};
use passport_protocol::services::credential_issuer::CredentialIssuer;
use passport_protocol::storage::content_store::IpfsContentStore;
use passport_protocol::wallet::signer::WalletSigner;
use passport_protocol::{AuthDomain, DataKind, Session, Settings, UpdateOrchestrator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let settings = Settings::load()?;
    let private_key =
        std::env::var("PRIVATE_KEY").context("PRIVATE_KEY must be set in the environment")?;

    let client = EvmClient::connect(&settings.rpc_url, &private_key).await?;
    println!(
        "connected as 0x{:x} on chain {}",
        client.address(),
        client.chain_id()
    );

    // verifies deployed bytecode at all three configured addresses
    let ledger = Arc::new(EvmLedger::connect(&client, &settings).await?);
    println!(
        "contracts verified: identity={} credentials={} passport={}",
        settings.identity_registry, settings.credential_registry, settings.battery_passport
    );

    let domain = AuthDomain {
        name: settings.auth_domain_name.clone(),
        version: settings.auth_domain_version.clone(),
        chain_id: client.chain_id(),
        verifying_contract: settings.battery_passport_address()?,
    };
    let signer = Arc::new(WalletSigner::new(&private_key, client.chain_id())?);
    let directory = Arc::new(RestDirectory::new(&settings.directory_base_url));

    if let Some(member) = directory.member_by_address(client.address()).await? {
        println!(
            "organization member: {} ({})",
            member.name, member.organization_id
        );
    }

    match directory.user_by_address(client.address()).await? {
        Some(identity) => {
            println!(
                "directory identity: {} / {}",
                identity.did_name, identity.credential_id
            );
            match ledger.get_did(&identity.did_name).await? {
                Some(record) => println!(
                    "DID on-chain: verified={} trust={} roles={:?}",
                    record.verified, record.trust_level, record.roles
                ),
                None => println!("DID `{}` is not registered on-chain", identity.did_name),
            }
            let issuer = CredentialIssuer::new(ledger.clone(), signer.clone(), domain.clone());
            println!(
                "credential `{}` valid: {}",
                identity.credential_id,
                issuer.validate(&identity.credential_id).await?
            );
        }
        None => println!("no directory identity for the connected address"),
    }

    // optional: run the verified read path for a token
    if let Some(arg) = std::env::args().nth(1) {
        let token_id = U256::from_dec_str(&arg)
            .map_err(|e| anyhow::anyhow!("token id must be a decimal integer: {}", e))?;
        let passport = ledger.get_battery_passport(token_id).await?;
        println!(
            "token {}: owner=0x{:x} status={} (lifecycle {})",
            token_id,
            passport.owner,
            passport.status,
            ledger.lifecycle_status(token_id).await?
        );
        let content = Arc::new(IpfsContentStore::new(
            &settings.ipfs_api_url,
            &settings.ipfs_gateway_url,
        )?);
        let session = Arc::new(Session::connect(client.address(), client.chain_id()));
        let orchestrator = UpdateOrchestrator::new(
            ledger,
            content,
            directory,
            signer,
            session,
            settings.role_trust_table()?,
            domain,
        );
        let payload = orchestrator
            .fetch_verified(token_id, DataKind::DueDiligence)
            .await?;
        println!("verified due-diligence payload for token {}:", token_id);
        println!("{}", serde_json::to_string_pretty(&payload)?);
    }

    Ok(())
}
