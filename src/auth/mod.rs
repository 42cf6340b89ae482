//! Credential minting: consumes unused accounts through the login driver,
//! validates what comes back, and hands surviving credentials to the
//! orchestrator.

mod driver;

pub use driver::{LoginDriver, WebDriverLoginDriver};

use crate::enrich::CredentialValidator;
use crate::error::Result;
use crate::shutdown::Shutdown;
use crate::store::Store;
use std::sync::Arc;
use std::time::Duration;

/// Accounts are processed in micro-batches of this size.
const MINT_BATCH_SIZE: usize = 3;

/// Pause between micro-batches so the login provider sees a human-ish
/// cadence.
const INTER_BATCH_PAUSE: Duration = Duration::from_secs(10);

/// Roughly one in three mint attempts succeeds, so the account budget is
/// three times the credential target.
const ACCOUNTS_PER_CREDENTIAL: usize = 3;

/// Mints credentials from the store's unused-account cursor.
pub struct CredentialMinter {
    driver: Arc<dyn LoginDriver>,
    shutdown: Arc<Shutdown>,
}

impl CredentialMinter {
    pub fn new(driver: Arc<dyn LoginDriver>, shutdown: Arc<Shutdown>) -> Self {
        Self { driver, shutdown }
    }

    /// Tries to obtain `target` live credentials. Every account handed to
    /// the driver is marked used, success or not. Returns whatever survived
    /// validation, possibly fewer than asked for; the caller decides
    /// whether that is enough to proceed.
    pub async fn mint(
        &self,
        store: &Store,
        validator: &CredentialValidator,
        target: usize,
        test_email: &str,
    ) -> Result<Vec<String>> {
        if target == 0 {
            return Ok(Vec::new());
        }

        let budget = target * ACCOUNTS_PER_CREDENTIAL;
        let accounts = store.unused_accounts(budget)?;
        if accounts.is_empty() {
            tracing::warn!(target: "minter", "No unused accounts left to mint from");
            return Ok(Vec::new());
        }

        tracing::info!(
            target: "minter",
            "Minting up to {} credentials from {} accounts",
            target,
            accounts.len()
        );

        let mut minted: Vec<String> = Vec::new();
        let chunk_count = accounts.chunks(MINT_BATCH_SIZE).count();

        for (chunk_index, chunk) in accounts.chunks(MINT_BATCH_SIZE).enumerate() {
            if self.shutdown.is_requested() {
                tracing::warn!(target: "minter", "Shutdown requested, stopping mint run");
                break;
            }

            let mut raw: Vec<String> = Vec::with_capacity(chunk.len());
            for account in chunk {
                if self.shutdown.is_requested() {
                    break;
                }
                // Consumed either way; an account is never retried in a run.
                if let Err(e) = store.mark_account_used(&account.email) {
                    tracing::warn!(target: "minter", "Failed to mark account used: {}", e);
                }
                match self.driver.mint(account).await {
                    Ok(credential) if !credential.is_empty() => raw.push(credential),
                    Ok(_) => {
                        tracing::warn!(target: "minter", "Empty credential from {}", account.email);
                    }
                    Err(e) => {
                        tracing::warn!(target: "minter", "Mint failed for {}: {}", account.email, e);
                    }
                }
            }

            if !raw.is_empty() {
                tracing::debug!(target: "minter", "Validating {} fresh credentials...", raw.len());
                let surviving = validator
                    .validate_fresh(&raw, test_email, &self.shutdown)
                    .await;
                tracing::info!(
                    target: "minter",
                    "Micro-batch {}/{}: {}/{} credentials survived validation",
                    chunk_index + 1,
                    chunk_count,
                    surviving.len(),
                    raw.len()
                );
                minted.extend(surviving);
            }

            if minted.len() >= target {
                break;
            }

            if chunk_index + 1 < chunk_count {
                tracing::debug!(target: "minter", "Pausing {:?} before next micro-batch", INTER_BATCH_PAUSE);
                tokio::select! {
                    _ = self.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(INTER_BATCH_PAUSE) => {}
                }
            }
        }

        tracing::info!(
            target: "minter",
            "Mint run finished with {}/{} credentials",
            minted.len(),
            target
        );
        Ok(minted)
    }
}
