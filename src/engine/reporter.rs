//! Two-line live progress display, refreshed once a second.
//!
//! The reporter doubles as the all-failed watchdog: when every credential
//! in the pool has been invalidated it cancels the batch so the
//! orchestrator can mint a fresh set.

use crate::engine::batch::BatchContext;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub(crate) async fn run(ctx: Arc<BatchContext>, batch_total: u64, stop: CancellationToken) {
    let multi = MultiProgress::with_draw_target(ProgressDrawTarget::stderr());

    let batch_bar = multi.add(ProgressBar::new(batch_total));
    batch_bar.set_style(
        ProgressStyle::with_template(
            "batch [{bar:25.cyan/blue}] {percent:>3}% ({pos}/{len}) | {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓░"),
    );

    let totals_line = multi.add(ProgressBar::new(batch_total));
    totals_line.set_style(
        ProgressStyle::with_template("{msg}").unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let mut tick = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = tick.tick() => {
                if ctx.pool.all_failed() {
                    tracing::warn!("All credentials in the pool have failed, cancelling batch");
                    ctx.cancel.cancel();
                    break;
                }

                let processed = ctx.counters.processed.load(Ordering::SeqCst);
                let success = ctx.counters.success.load(Ordering::SeqCst);
                let failed = ctx.counters.failed.load(Ordering::SeqCst);

                batch_bar.set_position(processed.min(batch_total));
                batch_bar.set_message(format!(
                    "ok {} | failed {} | active {} | credentials {}/{}",
                    success,
                    failed,
                    ctx.governor.active_requests(),
                    ctx.pool.valid_count(),
                    ctx.pool.len()
                ));

                if let Ok(stats) = ctx.store.stats() {
                    let percent = if stats.total > 0 {
                        stats.processed() as f64 * 100.0 / stats.total as f64
                    } else {
                        0.0
                    };
                    totals_line.set_message(format!(
                        "total {:.1}% ({}/{}) | data {} | no-data {} | failed {} | permanent {}",
                        percent,
                        stats.processed(),
                        stats.total,
                        stats.success_with_data,
                        stats.success_without_data,
                        stats.failed,
                        stats.permanent_failed
                    ));
                }
            }
        }
    }

    batch_bar.finish_and_clear();
    totals_line.finish_and_clear();
}
