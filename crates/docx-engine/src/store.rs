//! Temporary artifact store
//!
//! Generated documents are written under random, unguessable names and kept
//! for a retention window. Cleanup is an explicit [`ArtifactStore::sweep`] so
//! callers decide when it runs (a timer, an idle request, a test).

use std::collections::HashMap;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::{Serialize, Serializer};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::EngineError;

const ARTIFACT_SUFFIX: &str = ".docx";
const PARTIAL_SUFFIX: &str = ".docx.part";

/// Identifier of a generated artifact: 32 lowercase hex digits of a random UUID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArtifactId(Uuid);

impl ArtifactId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    fn file_name(&self) -> String {
        format!("{}{}", self, ARTIFACT_SUFFIX)
    }

    fn partial_file_name(&self) -> String {
        format!("{}{}", self, PARTIAL_SUFFIX)
    }
}

impl Default for ArtifactId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for ArtifactId {
    type Err = EngineError;

    /// Only the exact canonical form is accepted, so ids taken from URLs can
    /// never name a path outside the store
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let canonical = s.len() == 32
            && s
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
        if !canonical {
            return Err(EngineError::ArtifactNotFound(s.to_string()));
        }
        Uuid::parse_str(s)
            .map(ArtifactId)
            .map_err(|_| EngineError::ArtifactNotFound(s.to_string()))
    }
}

impl Serialize for ArtifactId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Metadata of a stored artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactRecord {
    pub id: ArtifactId,
    pub template_key: String,
    /// Filename offered to the browser, e.g. `WP_20241225_101500.docx`
    pub download_name: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub size: u64,
}

/// A freshly generated document and its retention metadata
#[derive(Debug, Clone)]
pub struct GeneratedArtifact {
    pub id: ArtifactId,
    pub template_key: String,
    pub download_name: String,
    pub content: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl GeneratedArtifact {
    pub fn record(&self) -> ArtifactRecord {
        ArtifactRecord {
            id: self.id,
            template_key: self.template_key.clone(),
            download_name: self.download_name.clone(),
            created_at: self.created_at,
            expires_at: self.expires_at,
            size: self.content.len() as u64,
        }
    }
}

/// Outcome of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub removed: usize,
    pub retained: usize,
    pub errors: usize,
}

/// Download filename for a document generated at `now`
pub fn download_name(template_key: &str, now: DateTime<Utc>) -> String {
    format!("{}_{}.docx", template_key, now.format("%Y%m%d_%H%M%S"))
}

/// Directory of generated artifacts plus their in-memory records
#[derive(Debug)]
pub struct ArtifactStore {
    dir: PathBuf,
    retention: Duration,
    records: Mutex<HashMap<ArtifactId, ArtifactRecord>>,
}

impl ArtifactStore {
    /// Open (creating if needed) a store rooted at `dir`
    pub fn new(dir: impl Into<PathBuf>, retention: Duration) -> Result<Self, EngineError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            retention,
            records: Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    fn records(&self) -> MutexGuard<'_, HashMap<ArtifactId, ArtifactRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// End of the retention window for something created at `created_at`;
    /// `None` when it lies beyond the representable calendar
    fn expiry(&self, created_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        created_at.checked_add_signed(self.retention)
    }

    fn path_of(&self, id: &ArtifactId) -> PathBuf {
        self.dir.join(id.file_name())
    }

    /// Write `content` under a new id and register it.
    ///
    /// The bytes go to `<id>.docx.part` first and are renamed into place, so a
    /// reader never sees a partial document. Any partial file is removed when
    /// writing fails.
    pub fn persist(
        &self,
        content: Vec<u8>,
        template_key: &str,
        now: DateTime<Utc>,
    ) -> Result<GeneratedArtifact, EngineError> {
        let expires_at = self.expiry(now).ok_or_else(|| {
            EngineError::Storage(io::Error::new(
                io::ErrorKind::InvalidInput,
                "retention window overflows the calendar",
            ))
        })?;
        let id = ArtifactId::new();
        let partial = self.dir.join(id.partial_file_name());
        let target = self.path_of(&id);

        let written = write_new_file(&partial, &content).and_then(|_| fs::rename(&partial, &target));
        if let Err(err) = written {
            if let Err(cleanup) = fs::remove_file(&partial) {
                if cleanup.kind() != io::ErrorKind::NotFound {
                    warn!(path = %partial.display(), error = %cleanup, "Failed to remove partial artifact");
                }
            }
            return Err(EngineError::Storage(err));
        }

        let artifact = GeneratedArtifact {
            id,
            template_key: template_key.to_string(),
            download_name: download_name(template_key, now),
            content,
            created_at: now,
            expires_at,
        };
        self.records().insert(id, artifact.record());
        debug!(artifact_id = %id, size = artifact.content.len(), "Artifact stored");
        Ok(artifact)
    }

    /// Track an artifact whose file is already in the store directory
    pub fn register(&self, record: ArtifactRecord) -> Result<(), EngineError> {
        let path = self.path_of(&record.id);
        if !path.is_file() {
            return Err(EngineError::ArtifactNotFound(record.id.to_string()));
        }
        self.records().insert(record.id, record);
        Ok(())
    }

    /// Metadata and content of a live artifact
    pub fn open(
        &self,
        id: &ArtifactId,
        now: DateTime<Utc>,
    ) -> Result<(ArtifactRecord, Vec<u8>), EngineError> {
        let not_found = || EngineError::ArtifactNotFound(id.to_string());
        let record = self.records().get(id).cloned().ok_or_else(not_found)?;
        if record.expires_at <= now {
            return Err(not_found());
        }
        match fs::read(self.path_of(id)) {
            Ok(content) => Ok((record, content)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                self.records().remove(id);
                Err(not_found())
            }
            Err(err) => Err(EngineError::Storage(err)),
        }
    }

    /// Delete every artifact (and stale partial file) created at or before
    /// `now - retention`.
    ///
    /// Age comes from the in-memory record, or from the file modification time
    /// for files left by an earlier process. Files that vanish mid-scan and
    /// files not named by this store are ignored, so sweeping is idempotent and
    /// safe to run while documents are being generated.
    pub fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return report,
            Err(err) => {
                warn!(dir = %self.dir.display(), error = %err, "Sweep could not read store directory");
                report.errors += 1;
                return report;
            }
        };

        for entry in entries.flatten() {
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            let (stem, partial) = match file_name.strip_suffix(PARTIAL_SUFFIX) {
                Some(stem) => (stem, true),
                None => match file_name.strip_suffix(ARTIFACT_SUFFIX) {
                    Some(stem) => (stem, false),
                    None => continue,
                },
            };
            let Ok(id) = stem.parse::<ArtifactId>() else {
                continue;
            };

            let recorded = if partial {
                None
            } else {
                self.records().get(&id).map(|r| r.created_at)
            };
            let created_at = match recorded {
                Some(created_at) => created_at,
                None => match entry.metadata().and_then(|m| m.modified()) {
                    Ok(modified) => DateTime::<Utc>::from(modified),
                    Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                    Err(err) => {
                        warn!(file = %file_name, error = %err, "Sweep could not read file age");
                        report.errors += 1;
                        continue;
                    }
                },
            };

            if self.expiry(created_at).map_or(true, |expires_at| expires_at > now) {
                report.retained += 1;
                continue;
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => {
                    debug!(file = %file_name, "Removed expired artifact");
                    report.removed += 1;
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(file = %file_name, error = %err, "Failed to remove expired artifact");
                    report.errors += 1;
                    continue;
                }
            }
            if !partial {
                self.records().remove(&id);
            }
        }

        self.records().retain(|_, record| {
            record
                .created_at
                .checked_add_signed(self.retention)
                .map_or(true, |expires_at| expires_at > now)
        });

        if report.removed > 0 || report.errors > 0 {
            info!(
                removed = report.removed,
                retained = report.retained,
                errors = report.errors,
                "Sweep complete"
            );
        } else {
            debug!(retained = report.retained, "Sweep found nothing to remove");
        }
        report
    }

    /// Remove an artifact now; unknown ids are a no-op
    pub fn purge(&self, id: &ArtifactId) -> Result<(), EngineError> {
        self.records().remove(id);
        match fs::remove_file(self.path_of(id)) {
            Ok(()) => {
                debug!(artifact_id = %id, "Artifact purged");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(EngineError::Storage(err)),
        }
    }

    /// Number of tracked artifacts
    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }
}

fn write_new_file(path: &Path, content: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(content)?;
    file.sync_all()
}
