// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Dotstow reads an optional configuration file at
//! `$XDG_CONFIG_HOME/dotstow/config.toml`. Every field of the file is
//! optional. Missing fields fall back to defaults that mirror a classic
//! `~/dotfiles` layout managed through GNU Stow.
//!
//! The file layout ([`ConfigFile`]) is kept separate from the resolved
//! [`Settings`] that the rest of the crate works with. Resolution performs
//! shell expansion on path fields, fills in defaults, and freezes the result.
//! After that point the settings are only ever shared by reference.

use crate::path::{home_dir, NoWayHome};

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::{debug, instrument};

/// Default name of the dotfiles directory inside the home directory.
pub const DEFAULT_DOTFILES_DIR: &str = "dotfiles";

/// Default name of the metadata file inside the home directory.
pub const DEFAULT_METADATA_FILE: &str = ".dotfiles_install_metadata";

/// Default prefix of timestamped backup directories.
pub const DEFAULT_BACKUP_PREFIX: &str = ".dotfiles_backup_";

/// Default symlink-farm tool.
pub const DEFAULT_FARM_TOOL: &str = "stow";

/// Default depth of the leftover trace scan.
pub const DEFAULT_TRACE_DEPTH: usize = 3;

/// Default marker files left behind by the symlink-farm tool.
pub const DEFAULT_TRACE_MARKERS: [&str; 3] = [".stow", ".stow-local-ignore", ".stow-global-ignore"];

/// Configuration file layout.
///
/// All fields are optional. Path fields may contain `~` or environment
/// variables, which are expanded during [`Settings::resolve`].
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct ConfigFile {
    /// Directory holding one subdirectory per package.
    pub dotfiles_dir: Option<String>,

    /// Directory packages get linked into.
    pub home_dir: Option<String>,

    /// Directory that timestamped backup sets are created in.
    pub backup_root: Option<String>,

    /// Name prefix of timestamped backup sets.
    pub backup_prefix: Option<String>,

    /// Path of the install metadata file.
    pub metadata_file: Option<String>,

    /// Symlink-farm tool to invoke.
    pub farm_tool: Option<String>,

    /// Maximum directory depth of the leftover trace scan.
    pub trace_depth: Option<usize>,

    /// Glob patterns naming marker files left behind by the farm tool.
    pub trace_markers: Option<Vec<String>>,
}

impl ConfigFile {
    /// Load configuration file from target path.
    ///
    /// A missing file is not an error, it simply yields the empty layout.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::ReadConfig`] if the file exists but cannot be
    ///   read.
    /// - Return [`ConfigError::Deserialize`] if the file is not valid TOML.
    #[instrument(skip(path), level = "debug")]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("no configuration file at {:?}, using defaults", path.display());
            return Ok(Self::default());
        }

        debug!("load configuration file {:?}", path.display());
        read_to_string(path)
            .map_err(|err| ConfigError::ReadConfig {
                source: err,
                path: path.to_path_buf(),
            })?
            .parse()
    }

    /// Layer another configuration on top of this one.
    ///
    /// Every field set in `overrides` replaces the field in `self`.
    pub fn merge(self, overrides: ConfigFile) -> Self {
        Self {
            dotfiles_dir: overrides.dotfiles_dir.or(self.dotfiles_dir),
            home_dir: overrides.home_dir.or(self.home_dir),
            backup_root: overrides.backup_root.or(self.backup_root),
            backup_prefix: overrides.backup_prefix.or(self.backup_prefix),
            metadata_file: overrides.metadata_file.or(self.metadata_file),
            farm_tool: overrides.farm_tool.or(self.farm_tool),
            trace_depth: overrides.trace_depth.or(self.trace_depth),
            trace_markers: overrides.trace_markers.or(self.trace_markers),
        }
    }
}

impl FromStr for ConfigFile {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        toml::de::from_str(data).map_err(ConfigError::Deserialize)
    }
}

impl Display for ConfigFile {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Resolved settings.
///
/// Immutable view of the configuration that every component receives by
/// reference.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Settings {
    pub dotfiles_dir: PathBuf,
    pub home_dir: PathBuf,
    pub backup_root: PathBuf,
    pub backup_prefix: String,
    pub metadata_file: PathBuf,
    pub farm_tool: String,
    pub trace_depth: usize,
    pub trace_markers: Vec<String>,
}

impl Settings {
    /// Resolve configuration file layout into settings.
    ///
    /// The home directory defaults to the user's home directory. The dotfiles
    /// directory, the backup root, and the metadata file default to locations
    /// inside the resolved home directory, so overriding the home directory
    /// moves all of them along with it.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::ShellExpansion`] if a path field cannot be
    ///   expanded.
    /// - Return [`ConfigError::NoWayHome`] if no home directory is given and
    ///   the user's home directory cannot be determined.
    pub fn resolve(file: ConfigFile) -> Result<Self> {
        let home_dir = match file.home_dir {
            Some(path) => expand(&path)?,
            None => home_dir()?,
        };
        let dotfiles_dir = match file.dotfiles_dir {
            Some(path) => expand(&path)?,
            None => home_dir.join(DEFAULT_DOTFILES_DIR),
        };
        let backup_root = match file.backup_root {
            Some(path) => expand(&path)?,
            None => home_dir.clone(),
        };
        let metadata_file = match file.metadata_file {
            Some(path) => expand(&path)?,
            None => home_dir.join(DEFAULT_METADATA_FILE),
        };

        Ok(Self {
            dotfiles_dir,
            home_dir,
            backup_root,
            backup_prefix: file
                .backup_prefix
                .unwrap_or_else(|| DEFAULT_BACKUP_PREFIX.into()),
            metadata_file,
            farm_tool: file.farm_tool.unwrap_or_else(|| DEFAULT_FARM_TOOL.into()),
            trace_depth: file.trace_depth.unwrap_or(DEFAULT_TRACE_DEPTH),
            trace_markers: file.trace_markers.unwrap_or_else(|| {
                DEFAULT_TRACE_MARKERS.iter().map(ToString::to_string).collect()
            }),
        })
    }
}

fn expand(path: &str) -> Result<PathBuf> {
    Ok(PathBuf::from(
        shellexpand::full(path)
            .map_err(ConfigError::ShellExpansion)?
            .into_owned(),
    ))
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read configuration file at {:?}", path.display())]
    ReadConfig {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Cannot figure out where home is.
    #[error(transparent)]
    NoWayHome(#[from] NoWayHome),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
