//! Persistent reading log
//!
//! Append-only CSV file with a `timestamp,valence,heart_rate` header and one
//! row per smoothed reading. The writer never seeks backward and writes each
//! row (including its newline) with a single `write_all`, so a reader only
//! ever sees complete rows followed by at most one unterminated tail.

use crate::error::FluxError;
use crate::types::SmoothedReading;
use chrono::SecondsFormat;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Header row written when the log is created
pub const LOG_HEADER: &str = "timestamp,valence,heart_rate";

/// Writer side of the persistent log
pub struct ReadingLog {
    path: PathBuf,
    file: File,
    precision: u32,
    rows_written: u64,
}

impl ReadingLog {
    /// Open the log for appending, creating it with a header if absent
    pub fn open<P: AsRef<Path>>(path: P, precision: u32) -> Result<Self, FluxError> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;

        if file.metadata()?.len() == 0 {
            file.write_all(format!("{}\n", LOG_HEADER).as_bytes())?;
            file.flush()?;
            info!(path = %path.display(), "Created reading log");
        }

        Ok(Self {
            path,
            file,
            precision,
            rows_written: 0,
        })
    }

    /// Append one reading as a complete row
    pub fn append(&mut self, reading: &SmoothedReading) -> Result<(), FluxError> {
        let row = format_row(reading, self.precision);
        self.file.write_all(row.as_bytes())?;
        self.file.flush()?;
        self.rows_written += 1;
        debug!(row = row.trim_end(), "Appended reading");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows appended through this handle
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }
}

/// Render a reading as a newline-terminated CSV row
pub fn format_row(reading: &SmoothedReading, precision: u32) -> String {
    let heart_rate = reading
        .heart_rate
        .map(|hr| hr.to_string())
        .unwrap_or_default();
    format!(
        "{},{:.*},{}\n",
        reading.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
        precision as usize,
        reading.smoothed_valence,
        heart_rate
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn reading(valence: f64, heart_rate: Option<u32>) -> SmoothedReading {
        SmoothedReading {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap(),
            smoothed_valence: valence,
            heart_rate,
        }
    }

    #[test]
    fn test_format_row() {
        assert_eq!(
            format_row(&reading(0.61234, Some(72)), 4),
            "2024-01-15T10:30:00.000000Z,0.6123,72\n"
        );
        assert_eq!(
            format_row(&reading(0.5, None), 4),
            "2024-01-15T10:30:00.000000Z,0.5000,\n"
        );
    }

    #[test]
    fn test_open_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("valence.csv");

        {
            let mut log = ReadingLog::open(&path, 4).unwrap();
            log.append(&reading(0.5, Some(60))).unwrap();
            assert_eq!(log.rows_written(), 1);
        }
        {
            let mut log = ReadingLog::open(&path, 4).unwrap();
            log.append(&reading(0.75, None)).unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines,
            vec![
                LOG_HEADER,
                "2024-01-15T10:30:00.000000Z,0.5000,60",
                "2024-01-15T10:30:00.000000Z,0.7500,",
            ]
        );
    }
}
