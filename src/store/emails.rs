//! Email operations: import, work-queue reads, and status transitions.

use super::Store;
use crate::error::Result;
use crate::models::{EmailStats, EmailStatus, ProfileData};
use rusqlite::params;

impl Store {
    /// Idempotent bulk insert; duplicates are ignored on the unique key.
    pub fn import_emails(&self, emails: &[String]) -> Result<()> {
        if emails.is_empty() {
            return Ok(());
        }
        self.with_tx(|tx| {
            let mut stmt = tx.prepare("INSERT OR IGNORE INTO emails (email) VALUES (?1)")?;
            for email in emails {
                stmt.execute([email])?;
            }
            Ok(())
        })
    }

    /// Emails still in `pending`, in insertion order. `limit = 0` means all.
    pub fn get_pending(&self, limit: usize) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut query =
                String::from("SELECT email FROM emails WHERE status = 'pending' ORDER BY id");
            if limit > 0 {
                query.push_str(&format!(" LIMIT {}", limit));
            }
            let mut stmt = conn.prepare(&query)?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect()
        })
    }

    /// Emails that still need work (`pending` or `failed`), least-retried
    /// first so fresh targets are not starved by stubborn ones.
    pub fn get_remaining(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT email FROM emails
                 WHERE status IN ('pending', 'failed')
                 ORDER BY retry_count ASC, id ASC",
            )?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect()
        })
    }

    pub fn count_remaining(&self) -> Result<u64> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM emails WHERE status IN ('pending', 'failed')",
                [],
                |row| row.get(0),
            )
        })
    }

    pub fn update_status(&self, email: &str, status: EmailStatus) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE emails
                 SET status = ?1, updated_at = CURRENT_TIMESTAMP
                 WHERE email = ?2",
                params![status.as_str(), email],
            )
            .map(|_| ())
        })
    }

    /// Records the extracted profile; implies `success_with_data`.
    pub fn update_with_profile(&self, email: &str, profile: &ProfileData) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE emails
                 SET status = ?1,
                     profile_user = ?2,
                     profile_url = ?3,
                     profile_location = ?4,
                     profile_connections = ?5,
                     updated_at = CURRENT_TIMESTAMP
                 WHERE email = ?6",
                params![
                    EmailStatus::SuccessWithData.as_str(),
                    profile.display_name,
                    profile.linkedin_url,
                    profile.location,
                    profile.connection_count,
                    email
                ],
            )
            .map(|_| ())
        })
    }

    /// Bumps the retry counter once per per-email run, never per attempt.
    pub fn increment_retry(&self, email: &str, last_error: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE emails
                 SET retry_count = retry_count + 1,
                     last_error = ?1,
                     updated_at = CURRENT_TIMESTAMP
                 WHERE email = ?2",
                params![last_error, email],
            )
            .map(|_| ())
        })
    }

    /// Status counts plus the grand total.
    pub fn stats(&self) -> Result<EmailStats> {
        self.with_conn(|conn| {
            let mut stats = EmailStats::default();
            let mut stmt =
                conn.prepare("SELECT status, COUNT(*) FROM emails GROUP BY status")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
            })?;
            for row in rows {
                let (status, count) = row?;
                match EmailStatus::parse(&status) {
                    Some(EmailStatus::Pending) => stats.pending = count,
                    Some(EmailStatus::SuccessWithData) => stats.success_with_data = count,
                    Some(EmailStatus::SuccessWithoutData) => stats.success_without_data = count,
                    Some(EmailStatus::Failed) => stats.failed = count,
                    Some(EmailStatus::PermanentFailed) => stats.permanent_failed = count,
                    None => {}
                }
            }
            stats.total = conn.query_row("SELECT COUNT(*) FROM emails", [], |row| row.get(0))?;
            Ok(stats)
        })
    }

    #[cfg(test)]
    pub(crate) fn email_row(&self, email: &str) -> Result<(String, i64, Option<String>)> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT status, retry_count, last_error FROM emails WHERE email = ?1",
                [email],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::open_test_store;
    use crate::models::{EmailStatus, ProfileData};

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn import_deduplicates_and_preserves_order() {
        let (_dir, store) = open_test_store();
        store
            .import_emails(&strings(&["a@x.com", "b@x.com", "a@x.com", "c@x.com"]))
            .unwrap();
        assert_eq!(
            store.get_pending(0).unwrap(),
            strings(&["a@x.com", "b@x.com", "c@x.com"])
        );
        // Importing the same list again changes nothing.
        store
            .import_emails(&strings(&["a@x.com", "b@x.com"]))
            .unwrap();
        assert_eq!(store.get_pending(0).unwrap().len(), 3);
    }

    #[test]
    fn pending_limit_applies() {
        let (_dir, store) = open_test_store();
        store
            .import_emails(&strings(&["a@x.com", "b@x.com", "c@x.com"]))
            .unwrap();
        assert_eq!(store.get_pending(2).unwrap(), strings(&["a@x.com", "b@x.com"]));
    }

    #[test]
    fn remaining_orders_by_retry_count_then_insertion() {
        let (_dir, store) = open_test_store();
        store
            .import_emails(&strings(&["a@x.com", "b@x.com", "c@x.com"]))
            .unwrap();
        store
            .update_status("a@x.com", EmailStatus::Failed)
            .unwrap();
        store.increment_retry("a@x.com", "boom").unwrap();
        store
            .update_status("b@x.com", EmailStatus::SuccessWithoutData)
            .unwrap();

        // c is pending with retry_count 0, a is failed with retry_count 1.
        assert_eq!(
            store.get_remaining().unwrap(),
            strings(&["c@x.com", "a@x.com"])
        );
        assert_eq!(store.count_remaining().unwrap(), 2);
    }

    #[test]
    fn profile_update_implies_success_with_data() {
        let (_dir, store) = open_test_store();
        store.import_emails(&strings(&["a@x.com"])).unwrap();
        let profile = ProfileData {
            display_name: "Alice".into(),
            linkedin_url: "lnk/a".into(),
            ..Default::default()
        };
        store.update_with_profile("a@x.com", &profile).unwrap();

        let (status, retry, _) = store.email_row("a@x.com").unwrap();
        assert_eq!(status, "success_with_data");
        assert_eq!(retry, 0);

        let stats = store.stats().unwrap();
        assert_eq!(stats.success_with_data, 1);
        assert_eq!(stats.total, 1);
        assert_eq!(store.count_remaining().unwrap(), 0);
    }

    #[test]
    fn retry_counter_records_last_error() {
        let (_dir, store) = open_test_store();
        store.import_emails(&strings(&["e@x.com"])).unwrap();
        store.update_status("e@x.com", EmailStatus::Failed).unwrap();
        store
            .increment_retry("e@x.com", "Failed after max retries")
            .unwrap();

        let (status, retry, last_error) = store.email_row("e@x.com").unwrap();
        assert_eq!(status, "failed");
        assert_eq!(retry, 1);
        assert_eq!(last_error.as_deref(), Some("Failed after max retries"));
    }

    #[test]
    fn stats_cover_every_status() {
        let (_dir, store) = open_test_store();
        store
            .import_emails(&strings(&["a@x.com", "b@x.com", "c@x.com", "d@x.com"]))
            .unwrap();
        store
            .update_status("a@x.com", EmailStatus::SuccessWithoutData)
            .unwrap();
        store.update_status("b@x.com", EmailStatus::Failed).unwrap();
        store
            .update_status("c@x.com", EmailStatus::PermanentFailed)
            .unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.success_without_data, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.permanent_failed, 1);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.processed(), 2);
        assert_eq!(stats.succeeded(), 1);
    }
}
