//! The orchestrator: assembles the working pieces, runs the bulk pass and
//! the bounded retry sweep, and reports the final tally.

mod batch;
mod reporter;
mod retry;

use crate::auth::{CredentialMinter, LoginDriver};
use crate::config::Config;
use crate::engine::batch::{BatchContext, BatchCounters, BatchSummary};
use crate::enrich::{CredentialPool, CredentialValidator, EnrichmentClient, RequestGovernor};
use crate::error::Result;
use crate::logging::EventLog;
use crate::output::HitWriter;
use crate::shutdown::Shutdown;
use crate::store::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Breather between phase-1 batches, before re-validating credentials.
const INTER_BATCH_DELAY: Duration = Duration::from_secs(5);

/// Phase 2 runs at most this many sweeps over the leftovers.
const MAX_RETRY_SWEEPS: u32 = 7;

/// Settle time before each retry sweep.
const RETRY_SWEEP_PAUSE: Duration = Duration::from_secs(10);

/// Fallback probe target when the work queue is already empty.
const PLACEHOLDER_TEST_EMAIL: &str = "test@example.com";

/// The work-orchestration engine. Construct with [`Engine::new`], then
/// drive to completion with [`Engine::run`].
pub struct Engine {
    config: Config,
    store: Arc<Store>,
    minter: CredentialMinter,
    events: EventLog,
    events_drain: JoinHandle<()>,
    shutdown: Arc<Shutdown>,
}

impl Engine {
    /// Opens the store, re-imports the input files, and opens the event
    /// log. Any failure here is fatal to the process.
    pub async fn new(
        config: Config,
        driver: Arc<dyn LoginDriver>,
        shutdown: Arc<Shutdown>,
    ) -> Result<Self> {
        let store = Arc::new(Store::open(&config.database_file)?);

        tracing::info!("Importing input files into the store...");
        let emails = store.import_emails_file(&config.emails_file)?;
        let accounts = store.import_accounts_file(&config.accounts_file)?;
        let credentials = store.import_credentials_file(&config.tokens_file)?;
        tracing::info!(
            "Imported {} emails, {} accounts, {} credentials",
            emails,
            accounts,
            credentials
        );

        let (events, events_drain) = EventLog::open(&config.log_file).await?;
        let minter = CredentialMinter::new(driver, Arc::clone(&shutdown));

        Ok(Self {
            config,
            store,
            minter,
            events,
            events_drain,
            shutdown,
        })
    }

    /// Runs both phases and prints the final summary. Returns once the work
    /// queue is drained, credentials and accounts are exhausted, or
    /// shutdown was requested.
    pub async fn run(self) -> Result<()> {
        let stats = self.store.stats()?;
        tracing::info!(
            "Starting enrichment: {} emails total ({} pending), {} unused accounts, {} valid credentials",
            stats.total,
            stats.pending,
            self.store.unused_account_count()?,
            self.store.count_valid_credentials()?
        );

        self.primary_pass().await?;
        if let Err(e) = self.retry_sweep().await {
            tracing::warn!("Retry sweep aborted: {}", e);
        }

        self.print_summary()?;

        // Let the event log drain before the process goes away.
        let Engine {
            events,
            events_drain,
            ..
        } = self;
        drop(events);
        let _ = events_drain.await;
        Ok(())
    }

    /// Phase 1: repeat ensure-credentials → run-batch until the queue is
    /// drained or nothing can make progress.
    async fn primary_pass(&self) -> Result<()> {
        tracing::info!("Phase 1: bulk pass over the work queue");

        while self.store.count_remaining()? > 0 {
            if self.shutdown.is_requested() {
                tracing::warn!("Shutdown requested, leaving phase 1");
                break;
            }

            tracing::info!(
                "{} emails remaining; assembling credential working set",
                self.store.count_remaining()?
            );

            let working = self.gather_credentials().await?;
            if working.is_empty() {
                tracing::error!(
                    "No live credentials and no accounts left to mint from; cannot make progress"
                );
                break;
            }

            let emails = self.store.get_remaining()?;
            if emails.is_empty() {
                break;
            }
            tracing::info!(
                "Running batch: {} emails with {} credentials",
                emails.len(),
                working.len()
            );

            let summary = self.run_enrichment_batch(working, emails).await?;
            if summary.cancelled && !self.shutdown.is_requested() {
                tracing::warn!("Batch preempted (credentials exhausted); minting a fresh set");
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => {}
                _ = tokio::time::sleep(INTER_BATCH_DELAY) => {}
            }
        }
        Ok(())
    }

    /// Phase 2: bounded sweeps over whatever phase 1 left behind, stopping
    /// as soon as a sweep makes no progress.
    async fn retry_sweep(&self) -> Result<()> {
        tracing::info!("Phase 2: retry sweep over remaining emails");

        for sweep in 1..=MAX_RETRY_SWEEPS {
            if self.shutdown.is_requested() {
                break;
            }
            let remaining = self.store.get_remaining()?;
            if remaining.is_empty() {
                tracing::info!("Nothing left to retry");
                break;
            }
            tracing::info!(
                "Sweep {}/{}: {} emails remaining, settling {:?} first",
                sweep,
                MAX_RETRY_SWEEPS,
                remaining.len(),
                RETRY_SWEEP_PAUSE
            );
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(RETRY_SWEEP_PAUSE) => {}
            }

            let test_email = self.test_email()?;
            let validator = CredentialValidator::new(EnrichmentClient::new(&self.config)?);

            let stored = self.store.valid_credentials()?;
            let mut credentials = if stored.is_empty() {
                Vec::new()
            } else {
                validator
                    .validate_existing(&self.store, &stored, &test_email, &self.shutdown)
                    .await
            };
            if credentials.is_empty() {
                if self.store.unused_account_count()? == 0 {
                    tracing::warn!("No credentials and no accounts left for retries");
                    break;
                }
                credentials = self
                    .minter
                    .mint(
                        &self.store,
                        &validator,
                        self.config.max_credentials,
                        &test_email,
                    )
                    .await?;
                self.store.add_credentials(&credentials)?;
            }
            if credentials.is_empty() {
                tracing::warn!("No live credentials for the retry sweep");
                break;
            }

            let before = remaining.len();
            self.run_enrichment_batch(credentials, remaining).await?;
            let after = self.store.get_remaining()?.len();

            if after == 0 {
                tracing::info!("All emails resolved");
                break;
            }
            if after >= before {
                tracing::warn!(
                    "No progress in sweep {} ({} -> {} remaining), stopping",
                    sweep,
                    before,
                    after
                );
                break;
            }
            tracing::info!("Sweep {}: {} -> {} remaining", sweep, before, after);
        }
        Ok(())
    }

    /// Assembles the credential working set for one phase-1 iteration:
    /// revalidate what the store has (if the cheap prefilter says it is
    /// worth the time), then mint the shortfall.
    async fn gather_credentials(&self) -> Result<Vec<String>> {
        let test_email = self.test_email()?;
        let validator = CredentialValidator::new(EnrichmentClient::new(&self.config)?);

        let stored = self.store.valid_credentials()?;
        let mut working = if !stored.is_empty()
            && validator
                .quick_check(&self.store, &stored, &test_email, &self.shutdown)
                .await
        {
            tracing::info!(
                "Stored credentials look usable; validating all {} of them",
                stored.len()
            );
            validator
                .validate_existing(&self.store, &stored, &test_email, &self.shutdown)
                .await
        } else {
            Vec::new()
        };

        if working.len() < self.config.min_credentials {
            let unused = self.store.unused_account_count()?;
            if unused == 0 {
                if !working.is_empty() {
                    tracing::warn!(
                        "Accounts exhausted; proceeding with the {} credentials that remain",
                        working.len()
                    );
                }
                return Ok(working);
            }

            let deficit = self.config.max_credentials.saturating_sub(working.len());
            tracing::info!(
                "{} credentials live, below the minimum of {}; minting up to {} more",
                working.len(),
                self.config.min_credentials,
                deficit
            );
            let minted = self
                .minter
                .mint(&self.store, &validator, deficit, &test_email)
                .await?;
            if !minted.is_empty() {
                self.store.add_credentials(&minted)?;
                working.extend(minted);
            }
        }

        Ok(working)
    }

    /// Spins up the per-batch plumbing (client, governor, pool, output
    /// handle) and runs the worker pool over `emails`.
    async fn run_enrichment_batch(
        &self,
        credentials: Vec<String>,
        emails: Vec<String>,
    ) -> Result<BatchSummary> {
        // The LRU hand-off order for the next batch depends on these
        // touches.
        for credential in &credentials {
            if let Err(e) = self.store.mark_credential_used(credential) {
                tracing::warn!("Failed to touch credential: {}", e);
            }
        }

        let cancel = self.shutdown.child_token();
        let ctx = Arc::new(BatchContext {
            store: Arc::clone(&self.store),
            pool: Arc::new(CredentialPool::new(credentials)),
            governor: Arc::new(RequestGovernor::new(
                self.config.requests_per_sec,
                self.config.max_concurrency,
                cancel.clone(),
            )),
            client: Arc::new(EnrichmentClient::new(&self.config)?),
            hits: Arc::new(HitWriter::open(&self.config.output_file)?),
            events: self.events.clone(),
            counters: BatchCounters::default(),
            shutdown: Arc::clone(&self.shutdown),
            cancel,
            max_concurrency: self.config.max_concurrency,
        });

        let summary = batch::run_batch(ctx, emails).await;
        tracing::info!(
            "Batch finished: processed {} | ok {} | failed {}{}",
            summary.processed,
            summary.success,
            summary.failed,
            if summary.cancelled { " | cancelled" } else { "" }
        );
        Ok(summary)
    }

    /// The probe target for credential validation: the head of the work
    /// queue when there is one, else a throwaway placeholder.
    fn test_email(&self) -> Result<String> {
        let mut remaining = self.store.get_remaining()?;
        Ok(if remaining.is_empty() {
            PLACEHOLDER_TEST_EMAIL.to_string()
        } else {
            remaining.swap_remove(0)
        })
    }

    fn print_summary(&self) -> Result<()> {
        let stats = self.store.stats()?;
        let succeeded = stats.succeeded();
        let success_percent = if stats.total > 0 {
            succeeded as f64 * 100.0 / stats.total as f64
        } else {
            0.0
        };
        let data_percent = if succeeded > 0 {
            stats.success_with_data as f64 * 100.0 / succeeded as f64
        } else {
            0.0
        };

        tracing::info!("------------------ Enrichment Summary ------------------");
        tracing::info!("Total emails                : {}", stats.total);
        tracing::info!(
            "Succeeded                   : {} ({:.1}%)",
            succeeded,
            success_percent
        );
        tracing::info!(
            "  - With profile data       : {} ({:.1}% of successes)",
            stats.success_with_data,
            data_percent
        );
        tracing::info!(
            "  - Without profile data    : {}",
            stats.success_without_data
        );
        tracing::info!("Still pending               : {}", stats.pending);
        tracing::info!("Retry-eligible failures     : {}", stats.failed);
        tracing::info!("Permanent failures          : {}", stats.permanent_failed);
        if stats.success_with_data > 0 {
            tracing::info!(
                "Profiles written to         : {}",
                self.config.output_file.display()
            );
        }
        tracing::info!("---------------------------------------------------------");
        Ok(())
    }
}
