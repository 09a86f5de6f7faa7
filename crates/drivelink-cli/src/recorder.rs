//! Session recorder – appends every control snapshot to a JSONL file.
//!
//! Files are named `<YYYY_MM_DD>_test_<N>.jsonl`, where `N` is one more than
//! the number of sessions already recorded on that day in the same directory.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use drivelink_middleware::TopicReceiver;
use drivelink_types::{DriveError, EventPayload};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

/// Date prefix used in session file names.
pub fn date_prefix(date: NaiveDate) -> String {
    date.format("%Y_%m_%d").to_string()
}

/// Path of the next session file for `date` inside `dir`.
pub async fn next_session_path(dir: &Path, date: NaiveDate) -> Result<PathBuf, DriveError> {
    let prefix = date_prefix(date);
    let mut existing = 0usize;
    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|e| DriveError::Config(format!("cannot list {}: {e}", dir.display())))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| DriveError::Config(format!("cannot list {}: {e}", dir.display())))?
    {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(&prefix) && name.ends_with(".jsonl") {
            existing += 1;
        }
    }
    Ok(dir.join(format!("{prefix}_test_{}.jsonl", existing + 1)))
}

pub struct SessionRecorder {
    path: PathBuf,
    writer: BufWriter<File>,
    lines: u64,
}

impl SessionRecorder {
    /// Create `dir` if needed and open a fresh session file for `date`.
    pub async fn create(dir: &Path, date: NaiveDate) -> Result<Self, DriveError> {
        fs::create_dir_all(dir)
            .await
            .map_err(|e| DriveError::Config(format!("cannot create {}: {e}", dir.display())))?;
        let path = next_session_path(dir, date).await?;
        let file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&path)
            .await
            .map_err(|e| DriveError::Config(format!("cannot open {}: {e}", path.display())))?;
        info!(path = %path.display(), "recording session");
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            lines: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Consume `rx` until the bus closes, writing one line per snapshot.
    /// Returns the number of lines written.
    pub async fn run(mut self, mut rx: TopicReceiver) -> Result<u64, DriveError> {
        while let Some(event) = rx.next().await {
            let EventPayload::ControlSnapshot(snapshot) = &event.payload else {
                continue;
            };
            let mut line = serde_json::to_vec(snapshot)
                .map_err(|e| DriveError::Channel(format!("snapshot encode: {e}")))?;
            line.push(b'\n');
            if let Err(e) = self.writer.write_all(&line).await {
                warn!(path = %self.path.display(), error = %e, "recording write failed; stopping");
                break;
            }
            self.lines += 1;
        }
        self.writer
            .flush()
            .await
            .map_err(|e| DriveError::Channel(format!("recording flush: {e}")))?;
        debug!(lines = self.lines, "recorder drained");
        Ok(self.lines)
    }
}
