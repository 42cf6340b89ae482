//! Core data types shared across the engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A provisioned login identity. Each account can mint at most one
/// credential per run; once handed to the login driver it is consumed,
/// whether or not the mint succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub email: String,
    pub password: String,
}

/// The profile tuple extracted from an enrichment response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileData {
    pub display_name: String,
    pub linkedin_url: String,
    pub location: String,
    pub connection_count: String,
}

impl ProfileData {
    /// True when the parse produced a usable identity. Some responses carry
    /// a literal `"null"` or `"{}"` where the display name should be; those
    /// count as no data.
    pub fn has_identity(&self) -> bool {
        !self.display_name.is_empty()
            && self.display_name != "null"
            && self.display_name != "{}"
    }
}

/// Lifecycle status of a target email.
///
/// `Pending` and `Failed` are retry-eligible; the other three are terminal.
/// Transitions happen only through the retry state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmailStatus {
    Pending,
    SuccessWithData,
    SuccessWithoutData,
    Failed,
    PermanentFailed,
}

impl EmailStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailStatus::Pending => "pending",
            EmailStatus::SuccessWithData => "success_with_data",
            EmailStatus::SuccessWithoutData => "success_without_data",
            EmailStatus::Failed => "failed",
            EmailStatus::PermanentFailed => "permanent_failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(EmailStatus::Pending),
            "success_with_data" => Some(EmailStatus::SuccessWithData),
            "success_without_data" => Some(EmailStatus::SuccessWithoutData),
            "failed" => Some(EmailStatus::Failed),
            "permanent_failed" => Some(EmailStatus::PermanentFailed),
            _ => None,
        }
    }
}

impl fmt::Display for EmailStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified outcome of one enrichment attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// HTTP 200 with a usable profile.
    WithData(ProfileData),
    /// HTTP 200 but no LinkedIn mapping (or a hollow profile).
    WithoutData,
    /// Retryable failure: 429/500, unrecognized status, or a transport
    /// error (status 0).
    TransientFail(u16),
    /// Credential-level rejection (401 or 424). The credential is dead;
    /// the email itself is still retryable.
    HardFail(u16),
}

/// Per-email status counts as reported by the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmailStats {
    pub pending: u64,
    pub success_with_data: u64,
    pub success_without_data: u64,
    pub failed: u64,
    pub permanent_failed: u64,
    pub total: u64,
}

impl EmailStats {
    /// Emails that have reached any state other than `pending`/`failed`.
    pub fn processed(&self) -> u64 {
        self.success_with_data + self.success_without_data + self.permanent_failed
    }

    pub fn succeeded(&self) -> u64 {
        self.success_with_data + self.success_without_data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            EmailStatus::Pending,
            EmailStatus::SuccessWithData,
            EmailStatus::SuccessWithoutData,
            EmailStatus::Failed,
            EmailStatus::PermanentFailed,
        ] {
            assert_eq!(EmailStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(EmailStatus::parse("bogus"), None);
    }

    #[test]
    fn hollow_profiles_carry_no_identity() {
        assert!(!ProfileData::default().has_identity());

        let mut profile = ProfileData {
            display_name: "null".into(),
            ..Default::default()
        };
        assert!(!profile.has_identity());

        profile.display_name = "{}".into();
        assert!(!profile.has_identity());

        profile.display_name = "Alice".into();
        assert!(profile.has_identity());
    }
}
