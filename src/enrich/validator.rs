//! Probe-based credential validation.
//!
//! A probe is one enrichment lookup for a known test email. A credential
//! that gets any authenticated response (200, or throttled/erroring 429/500,
//! or even a transport failure) is at least alive; 401 and 424 mean the
//! endpoint rejected the credential itself.

use super::client::EnrichmentClient;
use crate::shutdown::Shutdown;
use crate::store::Store;
use std::time::Duration;

/// Spacing between probes so validation itself never trips the throttle.
const PROBE_SPACING: Duration = Duration::from_secs(1);

/// How many credentials the cheap prefilter looks at.
const QUICK_CHECK_LIMIT: usize = 3;

/// Classification of one probe response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeVerdict {
    /// The credential is authenticated (200/429/500 or transport error).
    Live,
    /// Rejected, but not conclusively dead; do not persist.
    Dead,
    /// Hard rejection (401/424); persist the invalidation.
    DeadPersisted,
}

/// Maps an HTTP status to a verdict. `None` status means a transport error,
/// which is accepted: the endpoint may be flaky, but the credential was not
/// refused.
pub fn probe_verdict(status: Option<u16>) -> ProbeVerdict {
    match status {
        None => ProbeVerdict::Live,
        Some(200) | Some(429) | Some(500) => ProbeVerdict::Live,
        Some(401) | Some(424) => ProbeVerdict::DeadPersisted,
        Some(_) => ProbeVerdict::Dead,
    }
}

/// Validates credentials against the enrichment endpoint. Owns its own
/// client so a validation pass never competes with batch workers for the
/// connection pool.
pub struct CredentialValidator {
    client: EnrichmentClient,
}

impl CredentialValidator {
    pub fn new(client: EnrichmentClient) -> Self {
        Self { client }
    }

    /// Cheap prefilter: probes at most three credentials and reports
    /// whether the set looks worth a full validation (at least 2 accepted).
    /// Hard rejections observed here are persisted, same as a full pass
    /// over stored credentials.
    pub async fn quick_check(
        &self,
        store: &Store,
        credentials: &[String],
        test_email: &str,
        shutdown: &Shutdown,
    ) -> bool {
        if credentials.is_empty() {
            return false;
        }
        let mut live = 0usize;
        for (index, credential) in credentials.iter().take(QUICK_CHECK_LIMIT).enumerate() {
            if shutdown.is_requested() {
                return false;
            }
            match self.probe(credential, test_email).await {
                ProbeVerdict::Live => live += 1,
                ProbeVerdict::Dead => {}
                ProbeVerdict::DeadPersisted => {
                    if let Err(e) = store.invalidate_credential(credential) {
                        tracing::warn!(target: "validator", "Failed to persist invalidation: {}", e);
                    }
                }
            }
            if index + 1 < QUICK_CHECK_LIMIT.min(credentials.len()) {
                tokio::time::sleep(PROBE_SPACING).await;
            }
        }
        // Two accepts normally; a smaller set passes when everything
        // probed accepted, so a lone stored credential is still usable.
        live >= credentials.len().min(2)
    }

    /// Full validation of credentials loaded from the store. Hard
    /// rejections are persisted so they never come back in a later listing.
    pub async fn validate_existing(
        &self,
        store: &Store,
        credentials: &[String],
        test_email: &str,
        shutdown: &Shutdown,
    ) -> Vec<String> {
        self.validate(credentials, test_email, shutdown, Some(store))
            .await
    }

    /// Validation of freshly minted credentials. Nothing is persisted;
    /// rejects are simply dropped before they ever reach the store.
    pub async fn validate_fresh(
        &self,
        credentials: &[String],
        test_email: &str,
        shutdown: &Shutdown,
    ) -> Vec<String> {
        self.validate(credentials, test_email, shutdown, None).await
    }

    async fn validate(
        &self,
        credentials: &[String],
        test_email: &str,
        shutdown: &Shutdown,
        store: Option<&Store>,
    ) -> Vec<String> {
        let mut surviving = Vec::with_capacity(credentials.len());
        let total = credentials.len();

        for (index, credential) in credentials.iter().enumerate() {
            if shutdown.is_requested() {
                break;
            }
            tracing::debug!(
                target: "validator",
                "Probing credential {}/{}...",
                index + 1,
                total
            );

            match self.probe(credential, test_email).await {
                ProbeVerdict::Live => {
                    surviving.push(credential.clone());
                }
                ProbeVerdict::Dead => {
                    tracing::debug!(target: "validator", "Credential {}/{} rejected", index + 1, total);
                }
                ProbeVerdict::DeadPersisted => {
                    tracing::info!(
                        target: "validator",
                        "Credential {}/{} hard-rejected, invalidating",
                        index + 1,
                        total
                    );
                    if let Some(store) = store {
                        if let Err(e) = store.invalidate_credential(credential) {
                            tracing::warn!(target: "validator", "Failed to persist invalidation: {}", e);
                        }
                    }
                }
            }

            if index + 1 < total {
                tokio::time::sleep(PROBE_SPACING).await;
            }
        }

        tracing::info!(
            target: "validator",
            "Validation finished: {}/{} credentials live",
            surviving.len(),
            total
        );
        surviving
    }

    async fn probe(&self, credential: &str, test_email: &str) -> ProbeVerdict {
        match self.client.query(test_email, credential).await {
            Ok(reply) => probe_verdict(Some(reply.status)),
            Err(e) => {
                tracing::debug!(target: "validator", "Probe transport error (credential kept): {}", e);
                probe_verdict(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authenticated_statuses_are_live() {
        assert_eq!(probe_verdict(Some(200)), ProbeVerdict::Live);
        assert_eq!(probe_verdict(Some(429)), ProbeVerdict::Live);
        assert_eq!(probe_verdict(Some(500)), ProbeVerdict::Live);
    }

    #[test]
    fn transport_errors_are_accepted() {
        assert_eq!(probe_verdict(None), ProbeVerdict::Live);
    }

    #[test]
    fn hard_rejections_persist() {
        assert_eq!(probe_verdict(Some(401)), ProbeVerdict::DeadPersisted);
        assert_eq!(probe_verdict(Some(424)), ProbeVerdict::DeadPersisted);
    }

    #[test]
    fn anything_else_is_dead_but_not_persisted() {
        assert_eq!(probe_verdict(Some(403)), ProbeVerdict::Dead);
        assert_eq!(probe_verdict(Some(302)), ProbeVerdict::Dead);
        assert_eq!(probe_verdict(Some(404)), ProbeVerdict::Dead);
    }
}
