// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Install metadata persistence.
//!
//! Every install run records what it did in a small flat file, so that a
//! later uninstall knows which packages to take down, and where the backup
//! set of that run lives.
//!
//! # File Layout
//!
//! The file is plain text made of `KEY=value` lines:
//!
//! ```text
//! INSTALL_DATE=2025-01-31T12:00:00+01:00
//! BACKUP_DIR=/home/user/.dotfiles_backup_20250131_120000
//! INSTALLED_PACKAGES=bash git nvim
//! ```
//!
//! There is no escaping. The package list is space-separated, so package
//! names containing spaces cannot be represented. A backup directory of
//! `none` means the run had no conflicts to preserve.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{read_to_string, remove_file, write},
    io,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::{debug, info, instrument};

const KEY_DATE: &str = "INSTALL_DATE";
const KEY_BACKUP: &str = "BACKUP_DIR";
const KEY_PACKAGES: &str = "INSTALLED_PACKAGES";
const NO_BACKUP: &str = "none";

/// Record of one install run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InstallMetadata {
    /// When the install ran.
    pub date: String,

    /// Backup set of the run, if any.
    pub backup_dir: Option<PathBuf>,

    /// Packages that were linked.
    pub packages: Vec<String>,
}

impl Display for InstallMetadata {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let backup = match &self.backup_dir {
            Some(path) => path.to_string_lossy().into_owned(),
            None => NO_BACKUP.into(),
        };

        writeln!(fmt, "{KEY_DATE}={}", self.date)?;
        writeln!(fmt, "{KEY_BACKUP}={backup}")?;
        writeln!(fmt, "{KEY_PACKAGES}={}", self.packages.join(" "))
    }
}

impl FromStr for InstallMetadata {
    type Err = MetadataError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut metadata = InstallMetadata::default();
        for (number, line) in data.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(MetadataError::Malformed {
                    line: number + 1,
                    content: line.to_string(),
                });
            };
            let value = unquote(value.trim());

            match key.trim() {
                KEY_DATE => metadata.date = value.to_string(),
                KEY_BACKUP => {
                    metadata.backup_dir = match value {
                        "" | NO_BACKUP => None,
                        path => Some(PathBuf::from(path)),
                    }
                }
                KEY_PACKAGES => {
                    metadata.packages = value.split_whitespace().map(str::to_owned).collect()
                }
                other => debug!("ignore unknown metadata key {other:?}"),
            }
        }

        Ok(metadata)
    }
}

impl InstallMetadata {
    /// Figure out what is left of the install run once some of its packages
    /// got unlinked.
    ///
    /// A run that recorded no packages at all is complete right away, so a
    /// backup set left behind by a run whose every link failed can still be
    /// restored.
    pub fn after_unlink(mut self, unlinked: &[String]) -> UninstallState {
        self.packages.retain(|name| !unlinked.contains(name));

        // INVARIANT: Backups are only restored once nothing of the run is linked.
        if self.packages.is_empty() {
            UninstallState::Complete {
                backup_dir: self.backup_dir,
            }
        } else {
            UninstallState::Partial(self)
        }
    }
}

/// State of an install run after an uninstall pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UninstallState {
    /// Packages of the run are still linked. Holds the record to persist.
    Partial(InstallMetadata),

    /// Nothing of the run is linked anymore, its backup set may be restored.
    Complete { backup_dir: Option<PathBuf> },
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(value)
}

/// Metadata file handle at a fixed path.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    path: PathBuf,
}

impl MetadataStore {
    /// Construct new metadata store at target path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path to metadata file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite metadata file with a new record.
    ///
    /// # Errors
    ///
    /// - Return [`MetadataError::Write`] if metadata file cannot be written.
    #[instrument(skip(self, metadata), level = "debug")]
    pub fn save(&self, metadata: &InstallMetadata) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            mkdirp::mkdirp(parent).map_err(|err| MetadataError::Write {
                source: err,
                path: self.path.clone(),
            })?;
        }

        write(&self.path, metadata.to_string()).map_err(|err| MetadataError::Write {
            source: err,
            path: self.path.clone(),
        })?;
        info!("saved install metadata to {:?}", self.path.display());

        Ok(())
    }

    /// Load metadata record, if one exists.
    ///
    /// # Errors
    ///
    /// - Return [`MetadataError::Read`] if metadata file exists but cannot be
    ///   read.
    /// - Return [`MetadataError::Malformed`] if a line is not a `KEY=value`
    ///   pair.
    #[instrument(skip(self), level = "debug")]
    pub fn load(&self) -> Result<Option<InstallMetadata>> {
        match read_to_string(&self.path) {
            Ok(content) => content.parse().map(Some),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("no metadata at {:?}", self.path.display());
                Ok(None)
            }
            Err(err) => Err(MetadataError::Read {
                source: err,
                path: self.path.clone(),
            }),
        }
    }

    /// Delete metadata file if present.
    ///
    /// # Errors
    ///
    /// - Return [`MetadataError::Remove`] if metadata file cannot be removed.
    pub fn remove(&self) -> Result<()> {
        match remove_file(&self.path) {
            Ok(()) => {
                info!("removed install metadata {:?}", self.path.display());
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(MetadataError::Remove {
                source: err,
                path: self.path.clone(),
            }),
        }
    }
}

/// Metadata error types.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    /// Metadata file cannot be read.
    #[error("failed to read metadata file {:?}", path.display())]
    Read {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Metadata file cannot be written.
    #[error("failed to write metadata file {:?}", path.display())]
    Write {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Metadata file cannot be removed.
    #[error("failed to remove metadata file {:?}", path.display())]
    Remove {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Metadata line is not a key-value pair.
    #[error("malformed metadata at line {line}: {content:?}")]
    Malformed { line: usize, content: String },
}

/// Friendly result alias :3
pub type Result<T, E = MetadataError> = std::result::Result<T, E>;
