//! The per-email retry state machine.
//!
//! Each email gets a bounded number of attempts. Credential-level trouble
//! (429 throttling, 401/424 rejection) is handled inside the attempt by
//! swapping credentials, so it is not charged against the attempt budget;
//! an email only reaches a terminal state through a 2xx or by exhausting
//! its attempts.

use crate::engine::batch::BatchContext;
use crate::enrich::parse_profile;
use crate::models::{EmailStatus, Outcome};
use rand::Rng;
use std::sync::atomic::Ordering;
use std::time::Duration;

pub(crate) const MAX_ATTEMPTS: u32 = 5;

/// How much of a response body goes into the event log.
const SNIPPET_CHARS: usize = 200;

/// Result of one per-email run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EmailRun {
    /// Terminal: the email reached a `success_*` status.
    Done,
    /// Terminal for this run: attempts exhausted, email marked `failed`.
    Exhausted,
    /// The batch ended underneath us; no status was written.
    Incomplete,
}

/// Drives one email through up to [`MAX_ATTEMPTS`] attempts.
pub(crate) async fn process_email(ctx: &BatchContext, email: &str) -> EmailRun {
    for attempt in 1..=MAX_ATTEMPTS {
        if ctx.shutdown.is_requested() || ctx.cancel.is_cancelled() || ctx.pool.all_failed() {
            return EmailRun::Incomplete;
        }

        let Some((status, body)) = query_with_rotation(ctx, email).await else {
            return EmailRun::Incomplete;
        };

        ctx.events.log(format!(
            "attempt {}/{} - email: {} | status: {} | response: {}",
            attempt,
            MAX_ATTEMPTS,
            email,
            status,
            snippet(&body)
        ));

        match classify(status, &body) {
            Outcome::WithData(profile) => {
                if let Err(e) = ctx.store.update_with_profile(email, &profile) {
                    tracing::warn!("Store update failed for {}: {}", email, e);
                }
                if let Err(e) = ctx.hits.append(email, &profile) {
                    tracing::warn!("Output write failed for {}: {}", email, e);
                }
                ctx.events.log(format!(
                    "profile found: {} | {} | {}",
                    email, profile.display_name, profile.linkedin_url
                ));
                ctx.counters.success.fetch_add(1, Ordering::SeqCst);
                return EmailRun::Done;
            }
            Outcome::WithoutData => {
                if let Err(e) = ctx.store.update_status(email, EmailStatus::SuccessWithoutData) {
                    tracing::warn!("Store update failed for {}: {}", email, e);
                }
                ctx.events.log(format!("no profile mapping: {}", email));
                ctx.counters.success.fetch_add(1, Ordering::SeqCst);
                return EmailRun::Done;
            }
            // Credential-level consequences were already applied inside
            // query_with_rotation; both failure kinds just burn an attempt.
            Outcome::TransientFail(_) | Outcome::HardFail(_) => {}
        }

        if attempt < MAX_ATTEMPTS {
            tokio::select! {
                _ = ctx.cancel.cancelled() => return EmailRun::Incomplete,
                _ = tokio::time::sleep(attempt_jitter()) => {}
            }
        }
    }

    if let Err(e) = ctx.store.update_status(email, EmailStatus::Failed) {
        tracing::warn!("Store update failed for {}: {}", email, e);
    }
    if let Err(e) = ctx
        .store
        .increment_retry(email, "Failed after max retries")
    {
        tracing::warn!("Retry-count update failed for {}: {}", email, e);
    }
    ctx.events.log(format!(
        "gave up on {} after {} attempts",
        email, MAX_ATTEMPTS
    ));
    ctx.counters.failed.fetch_add(1, Ordering::SeqCst);
    EmailRun::Exhausted
}

/// One governed request, with in-attempt credential handling:
///
/// * 429 with more than one live credential: the current one is benched
///   for the rest of the batch (not persisted) and the request is re-issued
///   with another;
/// * 429 with a single credential: wait a second and re-issue with the
///   same one;
/// * 401/424: the credential is dead for good (persisted); re-issue with a
///   fresh one unless the pool just emptied, which cancels the batch.
///
/// Returns `None` when the batch was cancelled or the pool drained; the
/// email stays incomplete with no status written.
async fn query_with_rotation(ctx: &BatchContext, email: &str) -> Option<(u16, String)> {
    let _permit = ctx.governor.admit(&ctx.cancel).await?;

    let Some(credential) = ctx.pool.pick() else {
        ctx.cancel.cancel();
        return None;
    };
    let (mut status, mut body) = issue(ctx, email, &credential).await;

    if status == 429 {
        if let Err(e) = ctx.store.increment_credential_failure(&credential) {
            tracing::warn!("Failure-count update failed: {}", e);
        }
        if ctx.pool.valid_count() > 1 {
            ctx.pool.invalidate(&credential);
            ctx.events.log(format!(
                "rate limited, rotating credential ({} still live)",
                ctx.pool.valid_count()
            ));
            if let Some(next) = ctx.pool.pick() {
                (status, body) = issue(ctx, email, &next).await;
            }
        } else {
            tokio::select! {
                _ = ctx.cancel.cancelled() => return None,
                _ = tokio::time::sleep(Duration::from_secs(1)) => {}
            }
            (status, body) = issue(ctx, email, &credential).await;
        }
    } else if status == 401 || status == 424 {
        ctx.pool.invalidate(&credential);
        if let Err(e) = ctx.store.invalidate_credential(&credential) {
            tracing::warn!("Credential invalidation failed: {}", e);
        }
        ctx.events.log(format!(
            "credential hard-rejected (status {}), removed from pool",
            status
        ));
        if ctx.pool.all_failed() {
            ctx.cancel.cancel();
            return None;
        }
        if let Some(next) = ctx.pool.pick() {
            (status, body) = issue(ctx, email, &next).await;
        }
    }

    Some((status, body))
}

/// Issues the raw request; transport errors map to status 0 so the caller's
/// classification stays uniform.
async fn issue(ctx: &BatchContext, email: &str, credential: &str) -> (u16, String) {
    match ctx.client.query(email, credential).await {
        Ok(reply) => (reply.status, reply.body),
        Err(e) => {
            ctx.events
                .log(format!("transport error for {}: {}", email, e));
            (0, String::new())
        }
    }
}

/// Classifies one settled response into the outcome taxonomy.
pub(crate) fn classify(status: u16, body: &str) -> Outcome {
    match status {
        200 => {
            if !body.contains("displayName") {
                return Outcome::WithoutData;
            }
            match parse_profile(body) {
                Ok(profile) if profile.has_identity() => Outcome::WithData(profile),
                _ => Outcome::WithoutData,
            }
        }
        401 | 424 => Outcome::HardFail(status),
        other => Outcome::TransientFail(other),
    }
}

/// Uniform 200–600 ms between attempts.
fn attempt_jitter() -> Duration {
    Duration::from_millis(rand::thread_rng().gen_range(200..=600))
}

/// First [`SNIPPET_CHARS`] characters of a body, for the event log.
fn snippet(body: &str) -> String {
    if body.chars().count() <= SNIPPET_CHARS {
        return body.to_string();
    }
    let mut cut: String = body.chars().take(SNIPPET_CHARS).collect();
    cut.push_str("...");
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_with_profile_is_with_data() {
        let body = r#"{"persons": [{"displayName": "Alice", "linkedInUrl": "lnk/a"}]}"#;
        match classify(200, body) {
            Outcome::WithData(profile) => {
                assert_eq!(profile.display_name, "Alice");
                assert_eq!(profile.linkedin_url, "lnk/a");
            }
            other => panic!("expected WithData, got {:?}", other),
        }
    }

    #[test]
    fn ok_without_marker_is_without_data() {
        assert_eq!(classify(200, "{}"), Outcome::WithoutData);
    }

    #[test]
    fn hollow_profiles_count_as_without_data() {
        let null_name = r#"{"persons": [{"displayName": "null"}]}"#;
        assert_eq!(classify(200, null_name), Outcome::WithoutData);

        let braces = r#"{"persons": [{"displayName": "{}"}]}"#;
        assert_eq!(classify(200, braces), Outcome::WithoutData);
    }

    #[test]
    fn unparseable_200_is_without_data() {
        // Contains the marker but is not valid JSON.
        assert_eq!(classify(200, "displayName garbage"), Outcome::WithoutData);
    }

    #[test]
    fn credential_rejections_are_hard_failures() {
        assert_eq!(classify(401, ""), Outcome::HardFail(401));
        assert_eq!(classify(424, ""), Outcome::HardFail(424));
    }

    #[test]
    fn everything_else_is_transient() {
        assert_eq!(classify(429, ""), Outcome::TransientFail(429));
        assert_eq!(classify(500, ""), Outcome::TransientFail(500));
        assert_eq!(classify(503, ""), Outcome::TransientFail(503));
        // Status 0 stands in for transport errors.
        assert_eq!(classify(0, ""), Outcome::TransientFail(0));
    }

    #[test]
    fn jitter_stays_in_range() {
        for _ in 0..1000 {
            let delay = attempt_jitter();
            assert!(delay >= Duration::from_millis(200));
            assert!(delay <= Duration::from_millis(600));
        }
    }

    #[test]
    fn snippets_are_bounded() {
        let long = "x".repeat(1000);
        let cut = snippet(&long);
        assert!(cut.chars().count() <= SNIPPET_CHARS + 3);
        assert!(cut.ends_with("..."));
        assert_eq!(snippet("short"), "short");
    }
}
