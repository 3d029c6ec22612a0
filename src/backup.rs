// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Conflict detection and backup.
//!
//! Before a package gets linked into the home directory, every file it would
//! occupy must either be free, or already be the package's own link. Anything
//! else sitting at a target path is a __conflict__.
//!
//! # Conflict Policy
//!
//! Only regular files inside a package drive detection. Directories are not
//! checked on their own, because the symlink-farm tool happily links into
//! existing directories. For each file, the target is the same relative path
//! under the home directory. That target is a conflict when it exists in any
//! form (file, directory, symlink, dangling symlink) and does not resolve to
//! the package's source file.
//!
//! Resolution goes through canonical paths. Thus, a per-file link and a file
//! reached through a folded directory link both count as correctly linked,
//! which keeps re-installs idempotent. A conflict that is only reachable
//! through a symlinked directory of the home directory is never removed, the
//! package fails instead, since the entry really lives wherever that link
//! points.
//!
//! # Backup Sets
//!
//! Each install run gets one __backup set__, a timestamped directory that
//! mirrors the relative paths of everything it preserved. Conflicts are copied
//! archive-style into the backup set, and only removed from the home directory
//! once their copy succeeded. A target path is never backed up twice in the
//! same run, even if two packages claim it. If nothing needed preserving, the
//! empty backup set is removed again.

mod archive;

pub(crate) use archive::{copy_archive, remove_entry};

use crate::{config::Settings, package::Package, path::relative_to};

use chrono::{DateTime, Local};
use ignore::WalkBuilder;
use std::{
    collections::HashSet,
    fmt::{Display, Formatter, Result as FmtResult},
    fs,
    io,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// Timestamp layout used to name backup sets.
pub const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Kind of filesystem entry found at a target path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
}

impl Display for EntryKind {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::File => fmt.write_str("file"),
            Self::Directory => fmt.write_str("directory"),
            Self::Symlink => fmt.write_str("symlink"),
        }
    }
}

/// Pre-existing entry in the way of a package file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    /// Package that wants the target path.
    pub package: String,

    /// Target path relative to the home directory.
    pub relative: PathBuf,

    /// Absolute target path.
    pub target: PathBuf,

    /// What currently lives at the target path.
    pub kind: EntryKind,
}

/// Where the backup set of a run ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    /// Nothing needed preserving.
    None,

    /// Conflicts were preserved in this directory.
    Created(PathBuf),
}

impl BackupOutcome {
    /// Path to backup set, if one was created.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::None => None,
            Self::Created(path) => Some(path.as_path()),
        }
    }
}

impl Display for BackupOutcome {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::None => fmt.write_str("none"),
            Self::Created(path) => fmt.write_str(path.to_string_lossy().as_ref()),
        }
    }
}

/// Result of backing up a batch of packages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReport {
    /// Backup set of this run.
    pub outcome: BackupOutcome,

    /// Conflicts that were preserved and cleared.
    pub backed_up: Vec<Conflict>,

    /// Packages whose conflicts could not be handled, with the reason.
    pub failed: Vec<(String, String)>,
}

impl BackupReport {
    /// Check if a package failed backup, and thus must not be linked.
    pub fn is_failed(&self, package: &str) -> bool {
        self.failed.iter().any(|(name, _)| name == package)
    }
}

/// Conflict detection and backup engine.
#[derive(Debug, Clone)]
pub struct BackupEngine<'a> {
    settings: &'a Settings,
}

impl<'a> BackupEngine<'a> {
    /// Construct new backup engine.
    pub fn new(settings: &'a Settings) -> Self {
        Self { settings }
    }

    /// Path of the backup set for a run started at `timestamp`.
    ///
    /// Runs started within the same second get a numeric suffix, so an
    /// existing backup set is never reused.
    pub fn backup_dir_for(&self, timestamp: DateTime<Local>) -> PathBuf {
        let base = format!(
            "{}{}",
            self.settings.backup_prefix,
            timestamp.format(BACKUP_TIMESTAMP_FORMAT)
        );

        let mut path = self.settings.backup_root.join(&base);
        let mut suffix = 1;
        while fs::symlink_metadata(&path).is_ok() {
            path = self.settings.backup_root.join(format!("{base}_{suffix}"));
            suffix += 1;
        }

        path
    }

    /// Find every conflict a package would run into.
    ///
    /// # Errors
    ///
    /// - Return [`BackupError::Walk`] if package tree cannot be traversed.
    /// - Return [`BackupError::Inspect`] if a target path cannot be inspected.
    #[instrument(skip(self, package), fields(package = package.name()), level = "debug")]
    pub fn detect_conflicts(&self, package: &Package) -> Result<Vec<Conflict>> {
        let mut conflicts = Vec::new();
        for source in package_files(package)? {
            let Some(relative) = relative_to(&source, package.source()) else {
                continue;
            };
            let target = self.settings.home_dir.join(&relative);

            let Some(kind) = entry_kind(&target)? else {
                continue;
            };

            if resolves_to(&target, &source) {
                debug!("{:?} already linked", target.display());
                continue;
            }

            debug!("{:?} conflicts as {kind}", target.display());
            conflicts.push(Conflict {
                package: package.name().to_string(),
                relative,
                target,
                kind,
            });
        }

        Ok(conflicts)
    }

    /// Back up and clear conflicts of a batch of packages.
    ///
    /// Uses the current local time to name the backup set.
    ///
    /// # Errors
    ///
    /// - Return [`BackupError::CreateBackupDir`] if backup set cannot be
    ///   created.
    /// - Return [`BackupError::RemoveBackupDir`] if an unused backup set cannot
    ///   be removed.
    pub fn backup(&self, packages: &[Package]) -> Result<BackupReport> {
        self.backup_into(packages, self.backup_dir_for(Local::now()))
    }

    /// Back up and clear conflicts of a batch of packages into target backup
    /// set.
    ///
    /// Failures of a single package are recorded in the report, and do not
    /// stop the others from being processed.
    ///
    /// # Errors
    ///
    /// - Return [`BackupError::CreateBackupDir`] if backup set cannot be
    ///   created, or already exists.
    /// - Return [`BackupError::RemoveBackupDir`] if an unused backup set cannot
    ///   be removed.
    #[instrument(skip(self, packages, backup_dir), level = "debug")]
    pub fn backup_into(
        &self,
        packages: &[Package],
        backup_dir: impl Into<PathBuf>,
    ) -> Result<BackupReport> {
        let backup_dir = backup_dir.into();
        mkdirp::mkdirp(&self.settings.backup_root).map_err(|err| {
            BackupError::CreateBackupDir {
                source: err,
                path: self.settings.backup_root.clone(),
            }
        })?;
        fs::create_dir(&backup_dir).map_err(|err| BackupError::CreateBackupDir {
            source: err,
            path: backup_dir.clone(),
        })?;

        let mut seen = HashSet::new();
        let mut backed_up = Vec::new();
        let mut failed = Vec::new();
        for package in packages {
            let result = self.detect_conflicts(package).and_then(|conflicts| {
                for conflict in conflicts {
                    // INVARIANT: One backup per target path per run.
                    if !seen.insert(conflict.target.clone()) {
                        debug!("{:?} already backed up", conflict.target.display());
                        continue;
                    }

                    self.backup_conflict(&conflict, &backup_dir)?;
                    backed_up.push(conflict);
                }

                Ok(())
            });

            if let Err(error) = result {
                warn!("cannot back up conflicts of {}: {error}", package.name());
                failed.push((package.name().to_string(), error.to_string()));
            }
        }

        let outcome = if backed_up.is_empty() {
            debug!("no conflicts, removing {:?}", backup_dir.display());
            fs::remove_dir_all(&backup_dir).map_err(|err| BackupError::RemoveBackupDir {
                source: err,
                path: backup_dir.clone(),
            })?;
            BackupOutcome::None
        } else {
            info!(
                "backed up {} conflicting entries to {:?}",
                backed_up.len(),
                backup_dir.display()
            );
            BackupOutcome::Created(backup_dir)
        };

        Ok(BackupReport {
            outcome,
            backed_up,
            failed,
        })
    }

    fn backup_conflict(&self, conflict: &Conflict, backup_dir: &Path) -> Result<()> {
        // INVARIANT: Never delete through a link into the dotfiles directory.
        //   - A non-link target that resolves there belongs to another package.
        if conflict.kind != EntryKind::Symlink
            && resolves_into(&conflict.target, &self.settings.dotfiles_dir)
        {
            return Err(BackupError::ForeignLink {
                path: conflict.target.clone(),
            });
        }

        // INVARIANT: Never delete outside the home directory tree.
        //   - A target behind a symlinked parent lives wherever that link points.
        if let Some(link) = linked_parent(&self.settings.home_dir, &conflict.relative) {
            return Err(BackupError::LinkedParent {
                path: conflict.target.clone(),
                link,
            });
        }

        let destination = backup_dir.join(&conflict.relative);
        if let Some(parent) = destination.parent() {
            mkdirp::mkdirp(parent).map_err(|err| BackupError::CreateBackupDir {
                source: err,
                path: parent.to_path_buf(),
            })?;
        }

        info!(
            "back up {} {:?} to {:?}",
            conflict.kind,
            conflict.target.display(),
            destination.display()
        );
        copy_archive(&conflict.target, &destination).map_err(|err| BackupError::Copy {
            source: err,
            from: conflict.target.clone(),
            to: destination.clone(),
        })?;

        // INVARIANT: Only clear target once its copy is safe.
        remove_entry(&conflict.target).map_err(|err| BackupError::Remove {
            source: err,
            path: conflict.target.clone(),
        })?;

        Ok(())
    }
}

fn package_files(package: &Package) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let walker = WalkBuilder::new(package.source())
        .standard_filters(false)
        .follow_links(false)
        .sort_by_file_path(|a, b| a.cmp(b))
        .build();

    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_some_and(|kind| kind.is_file()) {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

fn entry_kind(path: &Path) -> Result<Option<EntryKind>> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => Ok(Some(EntryKind::Symlink)),
        Ok(meta) if meta.is_dir() => Ok(Some(EntryKind::Directory)),
        Ok(_) => Ok(Some(EntryKind::File)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(BackupError::Inspect {
            source: err,
            path: path.to_path_buf(),
        }),
    }
}

fn linked_parent(home_dir: &Path, relative: &Path) -> Option<PathBuf> {
    let mut path = home_dir.to_path_buf();
    let mut components = relative.components().peekable();
    while let Some(component) = components.next() {
        if components.peek().is_none() {
            break;
        }

        path.push(component);
        if fs::symlink_metadata(&path).is_ok_and(|meta| meta.file_type().is_symlink()) {
            return Some(path);
        }
    }

    None
}

fn resolves_to(target: &Path, source: &Path) -> bool {
    match (fs::canonicalize(target), fs::canonicalize(source)) {
        (Ok(target), Ok(source)) => target == source,
        _ => false,
    }
}

fn resolves_into(target: &Path, dir: &Path) -> bool {
    match (fs::canonicalize(target), fs::canonicalize(dir)) {
        (Ok(target), Ok(dir)) => target.starts_with(dir),
        _ => false,
    }
}

/// Backup error types.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    /// Package tree cannot be traversed.
    #[error(transparent)]
    Walk(#[from] ignore::Error),

    /// Target path cannot be inspected.
    #[error("failed to inspect {:?}", path.display())]
    Inspect {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Target path reaches into the dotfiles directory through a foreign link.
    #[error("{:?} is linked into another package, refusing to remove it", path.display())]
    ForeignLink { path: PathBuf },

    /// Target path sits below a symlinked directory of the home directory.
    #[error(
        "{:?} is reached through symlinked directory {:?}, refusing to remove it",
        path.display(),
        link.display()
    )]
    LinkedParent { path: PathBuf, link: PathBuf },

    /// Backup set or one of its subdirectories cannot be created.
    #[error("failed to create backup directory {:?}", path.display())]
    CreateBackupDir {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Unused backup set cannot be removed.
    #[error("failed to remove unused backup directory {:?}", path.display())]
    RemoveBackupDir {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Conflict cannot be copied into backup set.
    #[error("failed to copy {:?} to {:?}", from.display(), to.display())]
    Copy {
        #[source]
        source: io::Error,
        from: PathBuf,
        to: PathBuf,
    },

    /// Conflict cannot be cleared after backup.
    #[error("failed to remove {:?} after backup", path.display())]
    Remove {
        #[source]
        source: io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = BackupError> = std::result::Result<T, E>;
