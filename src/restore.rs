// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Uninstall-side restoration and cleanup.
//!
//! Once packages are unlinked, the home directory can be brought back to the
//! state it was in before the install run: the backup set gets copied back
//! over the home directory, the persisted state of the run gets deleted, and
//! anything the symlink-farm tool left lying around gets hunted down.

use crate::{
    backup::{copy_archive, remove_entry},
    config::Settings,
    metadata::{MetadataError, MetadataStore},
};

use glob::Pattern;
use ignore::WalkBuilder;
use std::{
    fs,
    io,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// Result of restoring a backup set.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    /// Top-level entries copied back into the home directory.
    pub restored: Vec<PathBuf>,

    /// Top-level entries that could not be restored, with the reason.
    pub failed: Vec<(PathBuf, String)>,
}

/// Copy a backup set back over the home directory.
///
/// Current files at the destination are overwritten. Directories merge into
/// what is already there, including directories the home directory only
/// links to, so only leaf entries get replaced. Each top-level entry of
/// the backup set is restored on its own, so one failure does not stop the
/// rest.
///
/// # Errors
///
/// - Return [`RestoreError::MissingBackup`] if backup set does not exist.
/// - Return [`RestoreError::ReadBackup`] if backup set cannot be read.
#[instrument(skip(backup_dir, home_dir), level = "debug")]
pub fn restore_backup(
    backup_dir: impl AsRef<Path>,
    home_dir: impl AsRef<Path>,
) -> Result<RestoreReport> {
    let backup_dir = backup_dir.as_ref();
    if !backup_dir.is_dir() {
        return Err(RestoreError::MissingBackup {
            path: backup_dir.to_path_buf(),
        });
    }

    let read_err = |err| RestoreError::ReadBackup {
        source: err,
        path: backup_dir.to_path_buf(),
    };

    let mut entries = fs::read_dir(backup_dir)
        .map_err(read_err)?
        .map(|entry| entry.map(|entry| entry.file_name()))
        .collect::<io::Result<Vec<_>>>()
        .map_err(read_err)?;
    entries.sort();

    let mut report = RestoreReport::default();
    for name in entries {
        let relative = PathBuf::from(&name);
        let destination = home_dir.as_ref().join(&name);
        match copy_archive(&backup_dir.join(&name), &destination) {
            Ok(()) => {
                info!("restored {:?}", destination.display());
                report.restored.push(relative);
            }
            Err(error) => {
                warn!("cannot restore {:?}: {error}", destination.display());
                report.failed.push((relative, error.to_string()));
            }
        }
    }

    Ok(report)
}

/// Delete persisted state of an install run.
///
/// Removes the metadata file and the backup set, whichever of them exist.
///
/// # Errors
///
/// - Return [`RestoreError::Metadata`] if metadata file cannot be removed.
/// - Return [`RestoreError::RemoveBackup`] if backup set cannot be removed.
pub fn cleanup(store: &MetadataStore, backup_dir: Option<&Path>) -> Result<()> {
    store.remove()?;

    if let Some(backup_dir) = backup_dir {
        match fs::remove_dir_all(backup_dir) {
            Ok(()) => info!("removed backup directory {:?}", backup_dir.display()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(RestoreError::RemoveBackup {
                    source: err,
                    path: backup_dir.to_path_buf(),
                })
            }
        }
    }

    Ok(())
}

/// Leftovers of the symlink-farm tool found in the home directory.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TraceReport {
    /// Symlinks whose target no longer exists.
    pub dangling: Vec<PathBuf>,

    /// Marker files dropped by the farm tool.
    pub markers: Vec<PathBuf>,
}

impl TraceReport {
    /// Check if nothing was found.
    pub fn is_empty(&self) -> bool {
        self.dangling.is_empty() && self.markers.is_empty()
    }

    /// Iterate over every path found.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.dangling
            .iter()
            .chain(self.markers.iter())
            .map(PathBuf::as_path)
    }
}

/// Scanner for leftover traces in the home directory.
///
/// The dotfiles directory and backup sets are never scanned, since both may
/// legitimately hold marker files and broken links.
#[derive(Debug, Clone)]
pub struct TraceScanner {
    home_dir: PathBuf,
    max_depth: usize,
    markers: Vec<Pattern>,
    dotfiles_dir: PathBuf,
    backup_root: PathBuf,
    backup_prefix: String,
}

impl TraceScanner {
    /// Construct new trace scanner from settings.
    ///
    /// # Errors
    ///
    /// - Return [`RestoreError::Pattern`] if a marker is not a valid glob.
    pub fn new(settings: &Settings) -> Result<Self> {
        let markers = settings
            .trace_markers
            .iter()
            .map(|marker| Pattern::new(marker))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            home_dir: settings.home_dir.clone(),
            max_depth: settings.trace_depth,
            markers,
            dotfiles_dir: settings.dotfiles_dir.clone(),
            backup_root: settings.backup_root.clone(),
            backup_prefix: settings.backup_prefix.clone(),
        })
    }

    /// Scan home directory up to the configured depth.
    ///
    /// Unreadable directories are skipped.
    #[instrument(skip(self), level = "debug")]
    pub fn scan(&self) -> TraceReport {
        let dotfiles_dir = self.dotfiles_dir.clone();
        let backup_root = self.backup_root.clone();
        let backup_prefix = self.backup_prefix.clone();
        let walker = WalkBuilder::new(&self.home_dir)
            .standard_filters(false)
            .follow_links(false)
            .max_depth(Some(self.max_depth))
            .sort_by_file_path(|a, b| a.cmp(b))
            .filter_entry(move |entry| {
                let path = entry.path();
                let is_backup = path.parent() == Some(backup_root.as_path())
                    && entry
                        .file_name()
                        .to_string_lossy()
                        .starts_with(backup_prefix.as_str());
                path != dotfiles_dir && !is_backup
            })
            .build();

        let mut report = TraceReport::default();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(error) => {
                    debug!("skip unreadable entry: {error}");
                    continue;
                }
            };

            let path = entry.path();
            let Some(kind) = entry.file_type() else {
                continue;
            };

            if kind.is_symlink() && fs::metadata(path).is_err() {
                debug!("dangling symlink {:?}", path.display());
                report.dangling.push(path.to_path_buf());
            } else if !kind.is_dir() && self.is_marker(entry.file_name().to_string_lossy().as_ref()) {
                debug!("marker file {:?}", path.display());
                report.markers.push(path.to_path_buf());
            }
        }

        report
    }

    fn is_marker(&self, name: &str) -> bool {
        self.markers.iter().any(|pattern| pattern.matches(name))
    }
}

/// Delete every path of a trace report.
///
/// Returns the paths that could not be removed, with the reason.
pub fn remove_traces(report: &TraceReport) -> Vec<(PathBuf, String)> {
    let mut failed = Vec::new();
    for path in report.paths() {
        match remove_entry(path) {
            Ok(()) => info!("removed {:?}", path.display()),
            Err(error) => {
                warn!("cannot remove {:?}: {error}", path.display());
                failed.push((path.to_path_buf(), error.to_string()));
            }
        }
    }

    failed
}

/// Restoration and cleanup error types.
#[derive(Debug, thiserror::Error)]
pub enum RestoreError {
    /// Backup set does not exist.
    #[error("backup directory {:?} does not exist", path.display())]
    MissingBackup { path: PathBuf },

    /// Backup set cannot be read.
    #[error("failed to read backup directory {:?}", path.display())]
    ReadBackup {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Backup set cannot be removed.
    #[error("failed to remove backup directory {:?}", path.display())]
    RemoveBackup {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Metadata file manipulation fails.
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// Marker is not a valid glob pattern.
    #[error(transparent)]
    Pattern(#[from] glob::PatternError),
}

/// Friendly result alias :3
pub type Result<T, E = RestoreError> = std::result::Result<T, E>;
