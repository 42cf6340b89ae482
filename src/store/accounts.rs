//! Account operations. Accounts are consumed exactly once per run; the
//! `is_used` flag only ever moves from 0 to 1.

use super::Store;
use crate::error::Result;
use crate::models::Account;
use rusqlite::params;

impl Store {
    /// Idempotent bulk insert keyed on the account email.
    pub fn import_accounts(&self, accounts: &[Account]) -> Result<()> {
        if accounts.is_empty() {
            return Ok(());
        }
        self.with_tx(|tx| {
            let mut stmt =
                tx.prepare("INSERT OR IGNORE INTO accounts (email, password) VALUES (?1, ?2)")?;
            for account in accounts {
                stmt.execute(params![account.email, account.password])?;
            }
            Ok(())
        })
    }

    /// Accounts not yet handed to the minter, in insertion order.
    /// `limit = 0` means all.
    pub fn unused_accounts(&self, limit: usize) -> Result<Vec<Account>> {
        self.with_conn(|conn| {
            let mut query =
                String::from("SELECT email, password FROM accounts WHERE is_used = 0 ORDER BY id");
            if limit > 0 {
                query.push_str(&format!(" LIMIT {}", limit));
            }
            let mut stmt = conn.prepare(&query)?;
            let rows = stmt.query_map([], |row| {
                Ok(Account {
                    email: row.get(0)?,
                    password: row.get(1)?,
                })
            })?;
            rows.collect()
        })
    }

    pub fn mark_account_used(&self, email: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE accounts
                 SET is_used = 1,
                     updated_at = CURRENT_TIMESTAMP
                 WHERE email = ?1",
                [email],
            )
            .map(|_| ())
        })
    }

    pub fn unused_account_count(&self) -> Result<u64> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM accounts WHERE is_used = 0",
                [],
                |row| row.get(0),
            )
        })
    }
}
