//! The per-attempt event log (`crawler.log`).
//!
//! Workers push free-form lines into a bounded channel; one background task
//! drains it into a buffered file. A full queue drops the line rather than
//! block a worker mid-request.

use crate::error::Result;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const EVENT_QUEUE_CAPACITY: usize = 1000;

/// Cheap cloneable handle for emitting event lines.
#[derive(Clone)]
pub struct EventLog {
    tx: mpsc::Sender<String>,
}

impl EventLog {
    /// Opens the log file in append mode and starts the drain task. The
    /// returned handle completes once every queued line has been flushed
    /// (after the last `EventLog` clone is dropped).
    pub async fn open(path: &std::path::Path) -> Result<(EventLog, JoinHandle<()>)> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        let (tx, mut rx) = mpsc::channel::<String>(EVENT_QUEUE_CAPACITY);

        let drain = tokio::spawn(async move {
            let mut writer = BufWriter::new(file);
            while let Some(line) = rx.recv().await {
                if let Err(e) = writer.write_all(line.as_bytes()).await {
                    tracing::warn!("Failed to write event log line: {}", e);
                    continue;
                }
                if let Err(e) = writer.write_all(b"\n").await {
                    tracing::warn!("Failed to write event log line: {}", e);
                }
            }
            if let Err(e) = writer.flush().await {
                tracing::warn!("Failed to flush event log: {}", e);
            }
        });

        Ok((EventLog { tx }, drain))
    }

    /// Queues one line. Never blocks; on overflow the line is dropped with
    /// a warning.
    pub fn log(&self, line: impl Into<String>) {
        if let Err(mpsc::error::TrySendError::Full(dropped)) = self.tx.try_send(line.into()) {
            tracing::warn!("Event log queue full, dropping line: {}", dropped);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lines_reach_the_file_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crawler.log");

        let (log, drain) = EventLog::open(&path).await.unwrap();
        log.log("first");
        log.log("second");
        drop(log);
        drain.await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "first\nsecond\n");
    }

    #[tokio::test]
    async fn reopening_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crawler.log");

        for line in ["one", "two"] {
            let (log, drain) = EventLog::open(&path).await.unwrap();
            log.log(line);
            drop(log);
            drain.await.unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "one\ntwo\n");
    }
}
