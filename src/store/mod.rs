//! Durable persistence for emails, accounts, and credentials.
//!
//! A single `rusqlite` connection behind a mutex gives the single-writer
//! discipline the schema assumes; every operation is one serialized
//! transaction. The per-concern operations live in [`emails`],
//! [`credentials`], and [`accounts`] as `impl Store` blocks.

mod accounts;
mod credentials;
mod emails;

use crate::error::Result;
use crate::models::Account;
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;

/// Each run starts from a fresh schema and re-imports the input files;
/// statuses are durable for the lifetime of the run.
const SCHEMA_DROP: &str = "
    DROP TABLE IF EXISTS emails;
    DROP TABLE IF EXISTS tokens;
    DROP TABLE IF EXISTS accounts;
";

const SCHEMA: &str = "
    CREATE TABLE emails (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        email TEXT UNIQUE NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        profile_user TEXT,
        profile_url TEXT,
        profile_location TEXT,
        profile_connections TEXT,
        retry_count INTEGER DEFAULT 0,
        last_error TEXT,
        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    );
    CREATE INDEX idx_emails_status ON emails(status);
    CREATE INDEX idx_emails_email ON emails(email);

    CREATE TABLE tokens (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        token TEXT UNIQUE NOT NULL,
        is_valid BOOLEAN DEFAULT 1,
        failure_count INTEGER DEFAULT 0,
        last_used_at TIMESTAMP,
        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    );
    CREATE INDEX idx_tokens_is_valid ON tokens(is_valid);

    CREATE TABLE accounts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        email TEXT UNIQUE NOT NULL,
        password TEXT NOT NULL,
        is_used BOOLEAN DEFAULT 0,
        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    );
    CREATE INDEX idx_accounts_is_used ON accounts(is_used);
";

/// Single-writer SQLite store.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Opens (or creates) the database, enables WAL, and resets the schema.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch(SCHEMA_DROP)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Runs `f` against the serialized connection.
    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let conn = self.conn.lock();
        Ok(f(&conn)?)
    }

    /// Runs `f` inside one transaction on the serialized connection.
    pub(crate) fn with_tx<T>(
        &self,
        f: impl FnOnce(&rusqlite::Transaction<'_>) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Imports the target-email list. Returns the number of lines accepted.
    pub fn import_emails_file(&self, path: &Path) -> Result<usize> {
        let content = std::fs::read_to_string(path)?;
        let emails: Vec<String> = content.lines().filter_map(parse_email_line).collect();
        self.import_emails(&emails)?;
        Ok(emails.len())
    }

    /// Imports the login-account list (`email|password` lines).
    pub fn import_accounts_file(&self, path: &Path) -> Result<usize> {
        let content = std::fs::read_to_string(path)?;
        let accounts: Vec<Account> = content.lines().filter_map(parse_account_line).collect();
        self.import_accounts(&accounts)?;
        Ok(accounts.len())
    }

    /// Imports previously minted credentials. A missing file is not an
    /// error; there is simply nothing to seed the pool with yet.
    pub fn import_credentials_file(&self, path: &Path) -> Result<usize> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let credentials: Vec<String> = content
            .lines()
            .filter_map(parse_credential_line)
            .collect();
        self.add_credentials(&credentials)?;
        Ok(credentials.len())
    }
}

/// One email per line, or `prefix,email` (everything after the first comma).
/// Blank lines and `#` comments are skipped.
fn parse_email_line(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let email = match line.split_once(',') {
        Some((_, rest)) => rest.trim(),
        None => line,
    };
    if email.is_empty() {
        return None;
    }
    Some(email.to_string())
}

/// `email|password` with both sides non-empty after trimming.
fn parse_account_line(line: &str) -> Option<Account> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let (email, password) = line.split_once('|')?;
    let (email, password) = (email.trim(), password.trim());
    if email.is_empty() || password.is_empty() || password.contains('|') {
        return None;
    }
    Some(Account {
        email: email.to_string(),
        password: password.to_string(),
    })
}

/// One credential per line; an optional `Bearer ` prefix is dropped here so
/// the stored form is always the bare token.
fn parse_credential_line(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    Some(strip_bearer(line).to_string())
}

pub(crate) fn strip_bearer(credential: &str) -> &str {
    credential
        .strip_prefix("Bearer ")
        .unwrap_or(credential)
        .trim()
}

#[cfg(test)]
pub(crate) fn open_test_store() -> (tempfile::TempDir, Store) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Store::open(&dir.path().join("crawler.db")).expect("open store");
    (dir, store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_lines_accept_bare_and_comma_forms() {
        assert_eq!(parse_email_line("a@x.com"), Some("a@x.com".to_string()));
        assert_eq!(
            parse_email_line("  42,b@x.com  "),
            Some("b@x.com".to_string())
        );
        assert_eq!(parse_email_line("# comment"), None);
        assert_eq!(parse_email_line("   "), None);
        assert_eq!(parse_email_line("prefix,"), None);
    }

    #[test]
    fn account_lines_require_both_fields() {
        assert_eq!(
            parse_account_line(" user@x.com | hunter2 "),
            Some(Account {
                email: "user@x.com".to_string(),
                password: "hunter2".to_string(),
            })
        );
        assert_eq!(parse_account_line("user@x.com"), None);
        assert_eq!(parse_account_line("user@x.com|"), None);
        assert_eq!(parse_account_line("|hunter2"), None);
        assert_eq!(parse_account_line("# user@x.com|hunter2"), None);
    }

    #[test]
    fn credential_lines_strip_bearer_prefix() {
        assert_eq!(parse_credential_line("Bearer abc"), Some("abc".to_string()));
        assert_eq!(parse_credential_line("abc"), Some("abc".to_string()));
        assert_eq!(parse_credential_line("# abc"), None);
        assert_eq!(parse_credential_line(""), None);
    }

    #[test]
    fn reopening_resets_the_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crawler.db");

        let store = Store::open(&path).unwrap();
        store.import_emails(&["a@x.com".to_string()]).unwrap();
        assert_eq!(store.count_remaining().unwrap(), 1);
        drop(store);

        let store = Store::open(&path).unwrap();
        assert_eq!(store.count_remaining().unwrap(), 0);
    }
}
