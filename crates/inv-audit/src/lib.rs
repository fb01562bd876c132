// SPDX-License-Identifier: MIT OR Apache-2.0
//! inv-audit
#![deny(unsafe_code)]
//!
//! Append-only audit log. Entries are line-delimited JSON; producers
//! enqueue onto a channel and a single writer task drains it, so lines
//! are never interleaved and entries for one job are totally ordered by
//! append sequence. LLM calls are recorded as digests and sizes only —
//! raw prompt or response content never reaches the log.

mod entry;
mod stats;

pub use entry::AuditEntry;
pub use stats::ProcessingStats;

use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, warn};

/// Stages that additionally get a per-stage detailed record.
const DETAILED_STAGES: [&str; 5] = ["ocr", "extraction", "validation", "llm_fallback", "completed"];

/// Audit failures.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// Filesystem failure while opening or reading the log.
    #[error("audit io: {0}")]
    Io(#[from] std::io::Error),

    /// A log line could not be parsed.
    #[error("corrupt audit line: {0}")]
    Corrupt(String),

    /// The writer task is gone.
    #[error("audit writer closed")]
    WriterClosed,
}

enum WriterMsg {
    Entry(Box<AuditEntry>),
    Flush(oneshot::Sender<()>),
}

/// Handle to the audit log. Clone freely; all clones feed one writer.
#[derive(Clone)]
pub struct AuditLog {
    tx: mpsc::UnboundedSender<WriterMsg>,
    log_file: PathBuf,
}

impl AuditLog {
    /// Open (or create) the audit log under `dir` and start the writer.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Io`] if the directories cannot be created.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, AuditError> {
        let dir = dir.as_ref().to_path_buf();
        let detailed_dir = dir.join("detailed");
        fs::create_dir_all(&detailed_dir).await?;
        let log_file = dir.join("audit.log");

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(writer_task(log_file.clone(), detailed_dir, rx));

        Ok(Self { tx, log_file })
    }

    /// Enqueue an entry. Never blocks; a closed writer is reported once
    /// per call site via `tracing` rather than propagated.
    pub fn record(&self, entry: AuditEntry) {
        if self.tx.send(WriterMsg::Entry(Box::new(entry))).is_err() {
            warn!(target: "inv.audit", "writer task gone; audit entry dropped");
        }
    }

    /// Wait until every previously enqueued entry is on disk.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::WriterClosed`] if the writer task is gone.
    pub async fn flush(&self) -> Result<(), AuditError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(WriterMsg::Flush(ack_tx))
            .map_err(|_| AuditError::WriterClosed)?;
        ack_rx.await.map_err(|_| AuditError::WriterClosed)
    }

    /// The complete ordered trail for a job.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Io`] when the log cannot be read.
    pub async fn trail(&self, job_id: &str) -> Result<Vec<AuditEntry>, AuditError> {
        let mut out = Vec::new();
        for line in self.read_lines().await? {
            let entry: AuditEntry =
                serde_json::from_str(&line).map_err(|e| AuditError::Corrupt(e.to_string()))?;
            if entry.job_id == job_id {
                out.push(entry);
            }
        }
        Ok(out)
    }

    /// Aggregate statistics over `[start, end]` in one scan.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Io`] when the log cannot be read.
    pub async fn stats(
        &self,
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
    ) -> Result<ProcessingStats, AuditError> {
        let mut stats = ProcessingStats::default();
        for line in self.read_lines().await? {
            let entry: AuditEntry =
                serde_json::from_str(&line).map_err(|e| AuditError::Corrupt(e.to_string()))?;
            if entry.timestamp >= start && entry.timestamp <= end {
                stats.absorb(&entry);
            }
        }
        stats.finish();
        Ok(stats)
    }

    async fn read_lines(&self) -> Result<Vec<String>, AuditError> {
        match fs::read_to_string(&self.log_file).await {
            Ok(content) => Ok(content.lines().map(str::to_string).collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

async fn writer_task(
    log_file: PathBuf,
    detailed_dir: PathBuf,
    mut rx: mpsc::UnboundedReceiver<WriterMsg>,
) {
    while let Some(msg) = rx.recv().await {
        match msg {
            WriterMsg::Entry(entry) => {
                if let Err(e) = append_entry(&log_file, &detailed_dir, &entry).await {
                    error!(target: "inv.audit", error = %e, "failed to write audit entry");
                }
            }
            WriterMsg::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
}

async fn append_entry(
    log_file: &Path,
    detailed_dir: &Path,
    entry: &AuditEntry,
) -> Result<(), AuditError> {
    let mut line = serde_json::to_string(entry).map_err(|e| AuditError::Corrupt(e.to_string()))?;
    line.push('\n');

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await?;

    if let Some(stage) = entry.stage.as_deref() {
        if DETAILED_STAGES.contains(&stage) {
            let path = detailed_dir.join(format!("{}_{stage}.json", entry.job_id));
            let pretty = serde_json::to_vec_pretty(entry)
                .map_err(|e| AuditError::Corrupt(e.to_string()))?;
            fs::write(path, pretty).await?;
        }
    }
    Ok(())
}
