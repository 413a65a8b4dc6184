//! Persistent history of speed test results.
//!
//! The history file holds one JSON record per line. Appends never rewrite
//! existing content, so repeated runs (including concurrent ones) only ever
//! add lines. Lines that fail to parse are skipped on load.

use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind as IoErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::errors::SpeedTestError;
use crate::results::SpeedTestResult;

/// File name used by earlier releases; kept so existing history continues.
pub const DEFAULT_HISTORY_FILE: &str = "Internet.Speed.Results.json";

/// Newline-delimited JSON store of [`SpeedTestResult`] records.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one result, creating the file if needed.
    ///
    /// The record is written with a single `write_all` on a file opened in
    /// append mode, so concurrent appends do not interleave within a line.
    pub fn append(
        &self,
        result: &SpeedTestResult,
    ) -> Result<(), SpeedTestError> {
        let record = serde_json::to_string(result).map_err(|e| {
            SpeedTestError::history("could not serialize the result")
                .with_source(e)
        })?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&self.path)
            .map_err(|e| self.io_error("open", e))?;

        let mut line = String::with_capacity(record.len() + 2);
        let terminated = ends_with_newline(&mut file)
            .map_err(|e| self.io_error("read", e))?;
        if !terminated {
            // A previous writer left a partial line; keep our record on its own.
            line.push('\n');
        }
        line.push_str(&record);
        line.push('\n');

        file.write_all(line.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| self.io_error("write", e))?;

        debug!("Appended result to {}", self.path.display());

        Ok(())
    }

    /// Load every readable record in append order.
    ///
    /// A missing file is an empty history. Blank and corrupt lines are
    /// skipped with a warning.
    pub fn load(&self) -> Result<Vec<SpeedTestResult>, SpeedTestError> {
        let content = match fs::read(&self.path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(self.io_error("read", e)),
        };

        let mut results = Vec::new();
        let mut skipped = 0;

        for (number, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_str::<SpeedTestResult>(line) {
                Ok(result) => results.push(result.normalized()),
                Err(e) => {
                    skipped += 1;
                    debug!(
                        "{}:{}: skipping unreadable record: {}",
                        self.path.display(),
                        number + 1,
                        e
                    );
                }
            }
        }

        if skipped > 0 {
            warn!(
                "Skipped {} unreadable line(s) in {}",
                skipped,
                self.path.display()
            );
        }

        Ok(results)
    }

    fn io_error(&self, action: &str, error: io::Error) -> SpeedTestError {
        SpeedTestError::history(format!(
            "could not {} {}: {}",
            action,
            self.path.display(),
            error
        ))
        .with_source(error)
    }
}

/// Whether the file is empty or its last byte is a newline.
fn ends_with_newline(file: &mut fs::File) -> io::Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(true);
    }

    let mut last = [0_u8];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;

    Ok(last[0] == b'\n')
}
