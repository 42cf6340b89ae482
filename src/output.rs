//! The enriched-profile output file (`hit.txt`).
//!
//! Append-only; one pipe-separated row per `success_with_data` email,
//! flushed and fsync'd per row so a crash loses at most the in-flight line.

use crate::error::Result;
use crate::models::ProfileData;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Serialized writer over the append-only output file.
pub struct HitWriter {
    writer: Mutex<BufWriter<File>>,
}

impl HitWriter {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Appends one profile row and forces it to disk.
    pub fn append(&self, email: &str, profile: &ProfileData) -> Result<()> {
        let line = hit_line(email, profile);
        let mut writer = self.writer.lock();
        writer.write_all(line.as_bytes())?;
        writer.flush()?;
        writer.get_ref().sync_data()?;
        Ok(())
    }
}

/// `email|displayName|linkedInUrl|location|connectionCount\n`
fn hit_line(email: &str, profile: &ProfileData) -> String {
    format!(
        "{}|{}|{}|{}|{}\n",
        email,
        profile.display_name,
        profile.linkedin_url,
        profile.location,
        profile.connection_count
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_format_matches_the_contract() {
        let profile = ProfileData {
            display_name: "Alice".into(),
            linkedin_url: "lnk/a".into(),
            location: String::new(),
            connection_count: String::new(),
        };
        assert_eq!(hit_line("a@x.com", &profile), "a@x.com|Alice|lnk/a||\n");
    }

    #[test]
    fn appending_never_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hit.txt");

        let profile = ProfileData {
            display_name: "Alice".into(),
            linkedin_url: "lnk/a".into(),
            ..Default::default()
        };

        {
            let writer = HitWriter::open(&path).unwrap();
            writer.append("a@x.com", &profile).unwrap();
        }
        {
            let writer = HitWriter::open(&path).unwrap();
            writer.append("b@x.com", &profile).unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("a@x.com|"));
        assert!(lines[1].starts_with("b@x.com|"));
    }
}
