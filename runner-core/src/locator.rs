//! Changeset discovery: pick a file by version label or by newest modification time.
//!
//! Directory access goes through [`ChangesetSource`] so selection can be
//! exercised against fixed timestamps.

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::ChangesetSettings;
use crate::error::{Result, RunnerError};

/// One candidate changeset file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangesetEntry {
    /// File name with the extension stripped.
    pub version: String,
    pub path: PathBuf,
    pub modified: DateTime<Utc>,
}

/// How the changeset for a run was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    /// Requested by version label.
    Explicit,
    /// Newest modification time in the directory.
    Latest,
}

/// The single changeset used for every database in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedChangeset {
    pub entry: ChangesetEntry,
    pub mode: SelectionMode,
}

impl ResolvedChangeset {
    pub fn path(&self) -> &Path {
        &self.entry.path
    }

    pub fn version(&self) -> &str {
        &self.entry.version
    }
}

/// All candidates in a directory plus the one a run would pick by default.
#[derive(Debug, Clone, Serialize)]
pub struct ChangesetListing {
    pub directory: PathBuf,
    /// Candidates sorted by version label.
    pub entries: Vec<ChangesetEntry>,
    /// Version label of the newest candidate.
    pub latest: Option<String>,
}

/// Read access to a directory of changeset files.
pub trait ChangesetSource {
    /// Directory being listed, for diagnostics.
    fn directory(&self) -> &Path;

    /// Whether the directory exists.
    fn exists(&self) -> bool;

    /// Candidate files (matching extension only), in no particular order.
    fn entries(&self) -> Result<Vec<ChangesetEntry>>;

    /// Fail if the selected file cannot be opened for reading.
    fn check_readable(&self, entry: &ChangesetEntry) -> Result<()>;
}

/// [`ChangesetSource`] backed by the real filesystem.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    directory: PathBuf,
    extension: String,
}

impl DirectorySource {
    pub fn new(directory: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            extension: extension.into(),
        }
    }

    pub fn from_settings(settings: &ChangesetSettings) -> Self {
        Self::new(settings.directory.clone(), settings.extension.clone())
    }
}

/// Files without a readable modification time rank oldest.
fn modified_or_epoch(path: &Path, modified: std::io::Result<SystemTime>) -> SystemTime {
    match modified {
        Ok(time) => time,
        Err(e) => {
            log::warn!(
                "Cannot read modification time, ranking as oldest; path={}, error={}",
                path.display(),
                e
            );
            SystemTime::UNIX_EPOCH
        }
    }
}

impl ChangesetSource for DirectorySource {
    fn directory(&self) -> &Path {
        &self.directory
    }

    fn exists(&self) -> bool {
        self.directory.is_dir()
    }

    fn entries(&self) -> Result<Vec<ChangesetEntry>> {
        let suffix = format!(".{}", self.extension);
        let mut entries = Vec::new();

        for dir_entry in fs::read_dir(&self.directory)? {
            let dir_entry = dir_entry?;
            let path = dir_entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(version) = name.strip_suffix(&suffix) else {
                continue;
            };
            if version.is_empty() {
                continue;
            }

            // Follows symlinks so linked changesets count as files.
            let meta = match fs::metadata(&path) {
                Ok(meta) if meta.is_file() => meta,
                Ok(_) => continue,
                Err(e) => {
                    log::warn!("Skipping changeset candidate; path={}, error={}", path.display(), e);
                    continue;
                }
            };
            let modified = modified_or_epoch(&path, meta.modified());

            entries.push(ChangesetEntry {
                version: version.to_string(),
                path,
                modified: DateTime::<Utc>::from(modified),
            });
        }

        Ok(entries)
    }

    fn check_readable(&self, entry: &ChangesetEntry) -> Result<()> {
        fs::File::open(&entry.path)
            .map(|_| ())
            .map_err(|e| RunnerError::ChangesetUnreadable {
                path: entry.path.clone(),
                reason: e.to_string(),
            })
    }
}

/// Newest-first ordering: modification time, then version label.
fn newer(a: &ChangesetEntry, b: &ChangesetEntry) -> Ordering {
    a.modified
        .cmp(&b.modified)
        .then_with(|| a.version.cmp(&b.version))
}

/// Version labels sorted lexicographically.
fn sorted_versions(entries: &[ChangesetEntry]) -> Vec<String> {
    let mut versions: Vec<String> = entries.iter().map(|e| e.version.clone()).collect();
    versions.sort();
    versions
}

/// Resolve the changeset for a run.
///
/// With a version label, the file `<label>.<ext>` must exist; otherwise the
/// error lists every available label. Without one, the entry with the
/// greatest modification time wins, ties going to the greatest label.
pub fn locate(source: &dyn ChangesetSource, version: Option<&str>) -> Result<ResolvedChangeset> {
    if !source.exists() {
        return Err(RunnerError::MissingDirectory(source.directory().to_path_buf()));
    }

    let entries = source.entries()?;

    let resolved = match version {
        Some(label) => match entries.iter().find(|e| e.version == label) {
            Some(entry) => ResolvedChangeset {
                entry: entry.clone(),
                mode: SelectionMode::Explicit,
            },
            None => {
                return Err(RunnerError::ChangesetNotFound {
                    version: label.to_string(),
                    available: sorted_versions(&entries),
                });
            }
        },
        None => match entries.iter().max_by(|a, b| newer(a, b)) {
            Some(entry) => ResolvedChangeset {
                entry: entry.clone(),
                mode: SelectionMode::Latest,
            },
            None => return Err(RunnerError::NoChangesets(source.directory().to_path_buf())),
        },
    };

    source.check_readable(&resolved.entry)?;
    log::debug!(
        "Resolved changeset; version={}, path={}, mode={:?}",
        resolved.version(),
        resolved.path().display(),
        resolved.mode
    );
    Ok(resolved)
}

/// List every candidate in the directory, marking the default pick.
pub fn list(source: &dyn ChangesetSource) -> Result<ChangesetListing> {
    if !source.exists() {
        return Err(RunnerError::MissingDirectory(source.directory().to_path_buf()));
    }

    let mut entries = source.entries()?;
    let latest = entries.iter().max_by(|a, b| newer(a, b)).map(|e| e.version.clone());
    entries.sort_by(|a, b| a.version.cmp(&b.version));

    Ok(ChangesetListing {
        directory: source.directory().to_path_buf(),
        entries,
        latest,
    })
}
