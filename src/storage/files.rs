//! JSON-file snapshot storage.
//!
//! Each snapshot is one pretty-printed JSON document under the snapshot
//! directory, named after its question:
//!
//! ```text
//! snapshots/what-concerts-do-i-have-this-week-0.json
//! snapshots/what-concerts-do-i-have-this-week-1.json   (slug collision)
//! ```
//!
//! Records are wrapped with the schema version:
//!
//! ```text
//! { "schema_version": 1, "snapshot": { "question": ..., ... } }
//! ```
//!
//! Writes go to a `.tmp` sibling first and are renamed into place, so a
//! crash never leaves a half-written record under a `.json` name.
//!
//! The directory is guarded by an exclusive advisory lock on `.lock`; a
//! second writer fails fast with [`StorageError::DirectoryLocked`].

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::schema::{LOCK_FILE, SCHEMA_VERSION, SNAPSHOT_EXTENSION};
use super::{LoadReport, SnapshotStorage};
use crate::error::{Result, SolveCacheError, StorageError};
use crate::question::slugify;
use crate::snapshot::{validate_snapshot, SolutionSnapshot};

/// Extension used for in-flight writes.
const TEMP_EXTENSION: &str = "tmp";

/// On-disk record, borrowed for writing.
#[derive(Serialize)]
struct SnapshotFileRef<'a> {
    schema_version: u32,
    snapshot: &'a SolutionSnapshot,
}

/// On-disk record, owned for reading.
#[derive(Deserialize)]
struct SnapshotFile {
    schema_version: u32,
    snapshot: SolutionSnapshot,
}

/// Snapshot storage backed by one JSON file per snapshot.
///
/// Holds the directory lock for its whole lifetime.
#[derive(Debug)]
pub struct FileSnapshotStorage {
    /// Snapshot directory.
    dir: PathBuf,

    /// Open handle on the lock file; the advisory lock lives as long as it.
    lock: File,

    /// Question → file it was loaded from or last written to.
    paths: Mutex<HashMap<String, PathBuf>>,
}

impl FileSnapshotStorage {
    /// Opens (creating if needed) a snapshot directory and takes its lock.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::DirectoryLocked`] if another handle already
    /// holds the lock, or an I/O error if the directory can't be created.
    #[instrument(fields(dir = %dir.as_ref().display()))]
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let lock = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir.join(LOCK_FILE))?;

        if let Err(err) = FileExt::try_lock_exclusive(&lock) {
            let contended = err.kind() == ErrorKind::WouldBlock
                || err.raw_os_error() == fs2::lock_contended_error().raw_os_error();
            if contended {
                warn!("Snapshot directory is locked by another writer");
                return Err(StorageError::DirectoryLocked(dir).into());
            }
            return Err(err.into());
        }

        debug!("Snapshot directory locked");
        Ok(Self {
            dir,
            lock,
            paths: Mutex::new(HashMap::new()),
        })
    }

    /// Picks a file name for a question that has no file yet.
    ///
    /// The counter is the lowest `n` such that `<slug>-<n>.json` is neither
    /// on disk nor claimed by another question.
    fn allocate_path(&self, question: &str, claimed: &HashMap<String, PathBuf>) -> PathBuf {
        let slug = slugify(question);
        let mut n = 0usize;
        loop {
            let candidate = self
                .dir
                .join(format!("{}-{}.{}", slug, n, SNAPSHOT_EXTENSION));
            let taken = candidate.exists() || claimed.values().any(|p| p == &candidate);
            if !taken {
                return candidate;
            }
            n += 1;
        }
    }

    fn read_file(
        path: &Path,
        dimension: usize,
    ) -> std::result::Result<SolutionSnapshot, StorageError> {
        let corrupt = |reason: String| StorageError::corrupt_snapshot(path, reason);

        let text = fs::read_to_string(path).map_err(|e| corrupt(e.to_string()))?;
        let record: SnapshotFile =
            serde_json::from_str(&text).map_err(|e| corrupt(e.to_string()))?;
        if record.schema_version != SCHEMA_VERSION {
            return Err(corrupt(format!(
                "schema version {} (expected {})",
                record.schema_version, SCHEMA_VERSION
            )));
        }

        let mut snapshot = record.snapshot;
        let conflicts = snapshot.reconcile();
        if !conflicts.is_empty() {
            warn!(
                path = %path.display(),
                conflicts = ?conflicts,
                "Questions both synonym and blacklisted; keeping them blacklisted"
            );
        }
        validate_snapshot(&snapshot, dimension).map_err(|e| corrupt(e.to_string()))?;
        Ok(snapshot)
    }

    fn is_snapshot_file(path: &Path) -> bool {
        path.is_file()
            && path
                .extension()
                .is_some_and(|ext| ext == SNAPSHOT_EXTENSION)
    }
}

/// Writes `content` to a temp sibling and renames it over `path`.
fn write_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    let tmp_path = path.with_extension(TEMP_EXTENSION);
    fs::write(&tmp_path, content)?;
    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }
    Ok(())
}

impl SnapshotStorage for FileSnapshotStorage {
    #[instrument(skip(self), fields(dir = %self.dir.display()))]
    fn load_all(&self, dimension: usize) -> Result<LoadReport> {
        let mut report = LoadReport::default();
        let mut by_question: HashMap<String, (SolutionSnapshot, PathBuf)> = HashMap::new();

        let mut entries: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| Self::is_snapshot_file(path))
            .collect();
        entries.sort();

        for path in entries {
            let snapshot = match Self::read_file(&path, dimension) {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    warn!(error = %err, "Skipping corrupt snapshot file");
                    report.skipped.push(err);
                    continue;
                }
            };

            match by_question.get(&snapshot.question) {
                Some((existing, existing_path)) if existing.updated_at >= snapshot.updated_at => {
                    warn!(
                        question = %snapshot.question,
                        kept = %existing_path.display(),
                        path = %path.display(),
                        "Skipping older duplicate snapshot file"
                    );
                    report
                        .skipped
                        .push(StorageError::duplicate_snapshot(path, existing_path));
                }
                Some((_, existing_path)) => {
                    warn!(
                        question = %snapshot.question,
                        kept = %path.display(),
                        path = %existing_path.display(),
                        "Skipping older duplicate snapshot file"
                    );
                    report
                        .skipped
                        .push(StorageError::duplicate_snapshot(existing_path, &path));
                    by_question.insert(snapshot.question.clone(), (snapshot, path));
                }
                None => {
                    by_question.insert(snapshot.question.clone(), (snapshot, path));
                }
            }
        }

        let mut paths = self
            .paths
            .lock()
            .map_err(|_| SolveCacheError::index("snapshot path table lock poisoned"))?;
        paths.clear();
        for (question, (snapshot, path)) in by_question {
            paths.insert(question, path);
            report.snapshots.push(snapshot);
        }
        report
            .snapshots
            .sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.question.cmp(&b.question)));

        info!(
            loaded = report.snapshots.len(),
            skipped = report.skipped.len(),
            "Snapshot files loaded"
        );
        Ok(report)
    }

    fn save_snapshot(&self, snapshot: &SolutionSnapshot) -> Result<PathBuf> {
        let content = serde_json::to_string_pretty(&SnapshotFileRef {
            schema_version: SCHEMA_VERSION,
            snapshot,
        })?;

        let mut paths = self
            .paths
            .lock()
            .map_err(|_| SolveCacheError::index("snapshot path table lock poisoned"))?;
        let path = match paths.get(&snapshot.question) {
            Some(path) => path.clone(),
            None => self.allocate_path(&snapshot.question, &paths),
        };

        write_atomic(&path, &content)?;
        paths.insert(snapshot.question.clone(), path.clone());

        debug!(question = %snapshot.question, path = %path.display(), "Snapshot saved");
        Ok(path)
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.dir)
    }

    #[instrument(skip(self), fields(dir = %self.dir.display()))]
    fn close(self: Box<Self>) -> Result<()> {
        FileExt::unlock(&self.lock)?;
        info!("Snapshot directory released");
        Ok(())
    }
}
