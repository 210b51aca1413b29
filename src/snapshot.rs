//! Snapshot reader
//!
//! Reads the latest row of the persistent log while another process may be
//! appending to it. Each read copies the log to a uniquely named sibling file,
//! parses the copy, and removes it again. Only newline-terminated rows are
//! considered, so a copy taken mid-append yields a prefix of the writer's
//! rows and never a partial one. No cross-process lock is taken.

use crate::error::FluxError;
use crate::types::LatestRecord;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Minimum fields in a usable row: timestamp and valence
const REQUIRED_FIELDS: usize = 2;

/// Consumer side of the persistent log
#[derive(Debug, Clone)]
pub struct SnapshotReader {
    log_path: PathBuf,
}

impl SnapshotReader {
    pub fn new<P: AsRef<Path>>(log_path: P) -> Self {
        Self {
            log_path: log_path.as_ref().to_path_buf(),
        }
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Latest complete record, or `None` when the log holds no usable data.
    ///
    /// I/O and encoding failures are returned as errors; the temporary copy is
    /// removed on every path.
    pub fn latest(&self) -> Result<Option<LatestRecord>, FluxError> {
        if !self.log_path.exists() {
            debug!(path = %self.log_path.display(), "Log does not exist yet");
            return Ok(None);
        }

        let copy = SnapshotCopy::create(&self.log_path)?;
        let content = fs::read_to_string(copy.path())?;
        Ok(parse_latest(&content))
    }
}

/// Extract the last complete row from log content
pub fn parse_latest(content: &str) -> Option<LatestRecord> {
    let complete = match content.rfind('\n') {
        Some(end) => &content[..end],
        None => return None,
    };

    let rows: Vec<&str> = complete
        .split('\n')
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .collect();

    // header + at least one data row
    if rows.len() < 2 {
        return None;
    }

    let last = rows[rows.len() - 1];
    let fields: Vec<&str> = last.split(',').map(str::trim).collect();
    if fields.len() < REQUIRED_FIELDS {
        warn!(row = last, "Last log row has too few fields");
        return None;
    }

    Some(LatestRecord {
        timestamp: fields[0].to_string(),
        valence: fields[1].to_string(),
        heart_rate: fields.get(2).map(|s| s.to_string()).unwrap_or_default(),
    })
}

/// Point-in-time copy of the log, deleted when dropped
struct SnapshotCopy {
    path: PathBuf,
}

impl SnapshotCopy {
    fn create(source: &Path) -> Result<Self, FluxError> {
        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "log".to_string());
        let path = source.with_file_name(format!(".{}.{}.snapshot", file_name, Uuid::new_v4()));

        // Guard first so a copy that fails halfway is still cleaned up
        let copy = Self { path };
        fs::copy(source, &copy.path)?;
        Ok(copy)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SnapshotCopy {
    fn drop(&mut self) {
        if self.path.exists() {
            if let Err(e) = fs::remove_file(&self.path) {
                warn!(path = %self.path.display(), error = %e, "Failed to remove snapshot copy");
            }
        }
    }
}
