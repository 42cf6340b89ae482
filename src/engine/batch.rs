//! One batch: a producer feeding a bounded channel, a pool of cooperative
//! workers, and the status reporter, all peers under one cancellation token.

use crate::engine::{reporter, retry};
use crate::enrich::{CredentialPool, EnrichmentClient, RequestGovernor};
use crate::logging::EventLog;
use crate::output::HitWriter;
use crate::shutdown::Shutdown;
use crate::store::Store;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Backpressure bound between the producer and the workers.
const CHANNEL_CAPACITY: usize = 100;

/// Live counters for the current batch, read by the reporter.
#[derive(Default)]
pub(crate) struct BatchCounters {
    pub processed: AtomicU64,
    pub success: AtomicU64,
    pub failed: AtomicU64,
}

/// Everything a worker needs, shared across the batch.
pub(crate) struct BatchContext {
    pub store: Arc<Store>,
    pub pool: Arc<CredentialPool>,
    pub governor: Arc<RequestGovernor>,
    pub client: Arc<EnrichmentClient>,
    pub hits: Arc<HitWriter>,
    pub events: EventLog,
    pub counters: BatchCounters,
    pub shutdown: Arc<Shutdown>,
    pub cancel: CancellationToken,
    pub max_concurrency: usize,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct BatchSummary {
    pub processed: u64,
    pub success: u64,
    pub failed: u64,
    pub cancelled: bool,
}

/// Drives one batch to completion or cancellation and returns its counters.
pub(crate) async fn run_batch(ctx: Arc<BatchContext>, emails: Vec<String>) -> BatchSummary {
    let total = emails.len() as u64;
    let (tx, rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);
    let rx = Arc::new(tokio::sync::Mutex::new(rx));

    let producer = tokio::spawn({
        let cancel = ctx.cancel.clone();
        async move {
            for email in emails {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    sent = tx.send(email) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
            // Dropping the sender closes the channel and lets idle workers
            // drain out.
        }
    });

    let display_stop = ctx.cancel.child_token();
    let reporter_task = tokio::spawn(reporter::run(
        Arc::clone(&ctx),
        total,
        display_stop.clone(),
    ));

    let mut workers = Vec::with_capacity(ctx.max_concurrency);
    for _ in 0..ctx.max_concurrency {
        let ctx = Arc::clone(&ctx);
        let rx = Arc::clone(&rx);
        workers.push(tokio::spawn(async move {
            loop {
                if ctx.cancel.is_cancelled() || ctx.shutdown.is_requested() {
                    break;
                }
                if ctx.pool.all_failed() {
                    // Primary preemption path: credentials evaporated
                    // mid-flight, so the whole batch stands down.
                    ctx.cancel.cancel();
                    break;
                }

                let email = {
                    let mut guard = rx.lock().await;
                    tokio::select! {
                        _ = ctx.cancel.cancelled() => None,
                        email = guard.recv() => email,
                    }
                };
                let Some(email) = email else { break };

                ctx.counters.processed.fetch_add(1, Ordering::SeqCst);
                retry::process_email(&ctx, &email).await;
            }
        }));
    }

    for worker in workers {
        let _ = worker.await;
    }
    let _ = producer.await;
    display_stop.cancel();
    let _ = reporter_task.await;

    BatchSummary {
        processed: ctx.counters.processed.load(Ordering::SeqCst),
        success: ctx.counters.success.load(Ordering::SeqCst),
        failed: ctx.counters.failed.load(Ordering::SeqCst),
        cancelled: ctx.cancel.is_cancelled(),
    }
}
