//! Per-attempt transcripts.
//!
//! Each generate → run attempt is written as one JSON document:
//!
//! ```text
//! transcripts/<unix-millis>-<attempt>-<model>-<uuid>.json
//! ```
//!
//! The trailing UUID v7 keeps names unique when attempts of different jobs
//! finish in the same millisecond.
//!
//! Transcripts are diagnostics only; failing to write one never fails a job.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::snapshot::GeneratedCode;
use crate::types::Timestamp;

/// Everything known about one attempt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based attempt number within the job.
    pub attempt: usize,

    /// Model that was asked.
    pub model: String,

    /// Normalized question.
    pub question: String,

    /// Prompt sent to the model, if the agent exposed it.
    pub prompt: Option<String>,

    /// Raw model response, if the agent exposed it.
    pub response: Option<String>,

    /// Code that was generated, if generation succeeded.
    pub code: Option<GeneratedCode>,

    /// Exit code, if the code ran.
    pub exit_code: Option<i32>,

    /// Captured program output.
    pub output: String,

    /// Failure description, if the attempt failed.
    pub error: Option<String>,

    /// Time spent on the attempt in milliseconds.
    pub latency_ms: u64,

    /// When the attempt finished.
    pub recorded_at: Timestamp,
}

impl AttemptRecord {
    /// Returns true if the attempt produced code that exited with 0.
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0) && self.error.is_none()
    }
}

/// Writes attempt records to a directory.
#[derive(Clone, Debug)]
pub struct TranscriptLog {
    dir: PathBuf,
}

impl TranscriptLog {
    /// Creates a log writing to `dir`, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Directory transcripts are written to.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes one record, returning its path.
    pub fn write(&self, record: &AttemptRecord) -> Result<PathBuf> {
        let name = format!(
            "{}-{}-{}-{}.json",
            record.recorded_at.as_millis(),
            record.attempt,
            file_safe(&record.model),
            Uuid::now_v7().simple()
        );
        let path = self.dir.join(name);
        fs::write(&path, serde_json::to_string_pretty(record)?)?;
        debug!(path = %path.display(), "Transcript written");
        Ok(path)
    }

    /// Writes one record, logging instead of failing.
    pub(crate) fn record(&self, record: &AttemptRecord) {
        if let Err(e) = self.write(record) {
            warn!(
                error = %e,
                attempt = record.attempt,
                model = %record.model,
                "Failed to write transcript"
            );
        }
    }

    /// Reads every transcript in the directory, oldest first.
    ///
    /// Files that fail to parse are skipped.
    pub fn read_all(&self) -> Result<Vec<AttemptRecord>> {
        let mut records: Vec<AttemptRecord> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "json"))
            .filter_map(|entry| {
                let text = fs::read_to_string(entry.path()).ok()?;
                serde_json::from_str(&text).ok()
            })
            .collect();
        records.sort_by(|a, b| {
            a.recorded_at
                .cmp(&b.recorded_at)
                .then(a.attempt.cmp(&b.attempt))
        });
        Ok(records)
    }
}

/// Lowercases `model` and replaces anything outside `[a-z0-9._-]` with `_`.
fn file_safe(model: &str) -> String {
    let name: String = model
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if name.is_empty() {
        "model".to_string()
    } else {
        name
    }
}
