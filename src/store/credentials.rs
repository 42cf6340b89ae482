//! Credential operations. The listing order is least-recently-used first so
//! the freshest credentials are held back for later batches.

use super::{strip_bearer, Store};
use crate::error::Result;

impl Store {
    /// Idempotent bulk insert; any `Bearer ` prefix is stripped first.
    pub fn add_credentials(&self, credentials: &[String]) -> Result<()> {
        if credentials.is_empty() {
            return Ok(());
        }
        self.with_tx(|tx| {
            let mut stmt = tx.prepare("INSERT OR IGNORE INTO tokens (token) VALUES (?1)")?;
            for credential in credentials {
                let bare = strip_bearer(credential);
                if !bare.is_empty() {
                    stmt.execute([bare])?;
                }
            }
            Ok(())
        })
    }

    /// All valid credentials, LRU order.
    pub fn valid_credentials(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT token FROM tokens
                 WHERE is_valid = 1
                 ORDER BY COALESCE(last_used_at, created_at) ASC",
            )?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect()
        })
    }

    pub fn mark_credential_used(&self, credential: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE tokens
                 SET last_used_at = CURRENT_TIMESTAMP,
                     updated_at = CURRENT_TIMESTAMP
                 WHERE token = ?1",
                [credential],
            )
            .map(|_| ())
        })
    }

    /// Hard rejection (401/424 or validator verdict): the credential never
    /// comes back.
    pub fn invalidate_credential(&self, credential: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE tokens
                 SET is_valid = 0,
                     updated_at = CURRENT_TIMESTAMP
                 WHERE token = ?1",
                [credential],
            )
            .map(|_| ())
        })
    }

    pub fn increment_credential_failure(&self, credential: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE tokens
                 SET failure_count = failure_count + 1,
                     updated_at = CURRENT_TIMESTAMP
                 WHERE token = ?1",
                [credential],
            )
            .map(|_| ())
        })
    }

    pub fn count_valid_credentials(&self) -> Result<u64> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM tokens WHERE is_valid = 1",
                [],
                |row| row.get(0),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::open_test_store;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn bearer_prefix_is_stripped_on_import() {
        let (_dir, store) = open_test_store();
        store
            .add_credentials(&strings(&["Bearer X", "Y", "Bearer X"]))
            .unwrap();
        let credentials = store.valid_credentials().unwrap();
        assert!(credentials.contains(&"X".to_string()));
        assert!(credentials.contains(&"Y".to_string()));
        assert_eq!(credentials.len(), 2);
    }

    #[test]
    fn listing_is_least_recently_used_first() {
        let (_dir, store) = open_test_store();
        store.add_credentials(&strings(&["t1", "t2", "t3"])).unwrap();
        // Touch t1 so it sorts after the never-used t2/t3. SQLite's
        // CURRENT_TIMESTAMP has second granularity, so pin the others
        // explicitly instead of sleeping.
        store
            .with_conn(|conn| {
                conn.execute(
                    "UPDATE tokens SET created_at = '2000-01-01 00:00:00' WHERE token IN ('t2', 't3')",
                    [],
                )
                .map(|_| ())
            })
            .unwrap();
        store.mark_credential_used("t1").unwrap();

        let credentials = store.valid_credentials().unwrap();
        assert_eq!(credentials.last().unwrap(), "t1");
    }

    #[test]
    fn invalidation_is_one_way() {
        let (_dir, store) = open_test_store();
        store.add_credentials(&strings(&["t1", "t2"])).unwrap();
        assert_eq!(store.count_valid_credentials().unwrap(), 2);

        store.invalidate_credential("t1").unwrap();
        assert_eq!(store.count_valid_credentials().unwrap(), 1);
        assert_eq!(store.valid_credentials().unwrap(), strings(&["t2"]));

        // Re-adding an invalidated credential is a no-op on the unique key.
        store.add_credentials(&strings(&["t1"])).unwrap();
        assert_eq!(store.count_valid_credentials().unwrap(), 1);
    }

    #[test]
    fn failure_counter_accumulates() {
        let (_dir, store) = open_test_store();
        store.add_credentials(&strings(&["t1"])).unwrap();
        store.increment_credential_failure("t1").unwrap();
        store.increment_credential_failure("t1").unwrap();
        let count: i64 = store
            .with_conn(|conn| {
                conn.query_row(
                    "SELECT failure_count FROM tokens WHERE token = 't1'",
                    [],
                    |row| row.get(0),
                )
            })
            .unwrap();
        assert_eq!(count, 2);
    }
}
