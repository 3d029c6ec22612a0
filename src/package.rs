// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Package discovery.
//!
//! A __package__ is a directory inside the dotfiles directory whose tree
//! mirrors a subset of the home directory's layout. For example, the package
//! `nvim` may contain `.config/nvim/init.lua`, which gets linked to
//! `~/.config/nvim/init.lua`. The name of a package is the name of its
//! directory.
//!
//! Only the top-level of the dotfiles directory is evaluated. Hidden entries
//! like `.git` are never considered packages.

use crate::path::is_hidden;

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::read_dir,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};

/// A package of dotfiles.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Package {
    name: String,
    source: PathBuf,
}

impl Package {
    /// Construct new package from the dotfiles directory and its name.
    pub fn new(dotfiles_dir: impl AsRef<Path>, name: impl Into<String>) -> Self {
        let name = name.into();
        let source = dotfiles_dir.as_ref().join(&name);
        Self { name, source }
    }

    /// Name of package.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute path to the package's source tree.
    pub fn source(&self) -> &Path {
        &self.source
    }
}

impl Display for Package {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(&self.name)
    }
}

/// List candidate packages under the dotfiles directory.
///
/// Packages are returned sorted by name.
///
/// # Errors
///
/// - Return [`DiscoveryError::MissingRoot`] if the dotfiles directory does not
///   exist.
/// - Return [`DiscoveryError::ReadRoot`] if the dotfiles directory cannot be
///   read.
/// - Return [`DiscoveryError::NoPackages`] if no candidate package exists.
#[instrument(skip(root), level = "debug")]
pub fn discover_packages(root: impl AsRef<Path>) -> Result<Vec<Package>> {
    let root = root.as_ref();
    if !root.is_dir() {
        return Err(DiscoveryError::MissingRoot {
            root: root.to_path_buf(),
        });
    }

    let read_err = |err| DiscoveryError::ReadRoot {
        source: err,
        root: root.to_path_buf(),
    };

    let mut packages = Vec::new();
    for entry in read_dir(root).map_err(read_err)? {
        let path = entry.map_err(read_err)?.path();
        if is_hidden(&path) || !path.is_dir() {
            debug!("skip {:?}", path.display());
            continue;
        }

        if let Some(name) = path.file_name() {
            packages.push(Package::new(root, name.to_string_lossy()));
        }
    }

    if packages.is_empty() {
        return Err(DiscoveryError::NoPackages {
            root: root.to_path_buf(),
        });
    }

    packages.sort();
    debug!("found {} packages", packages.len());

    Ok(packages)
}

/// Package discovery error types.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// Dotfiles directory does not exist.
    #[error("dotfiles directory {:?} does not exist", root.display())]
    MissingRoot { root: PathBuf },

    /// Dotfiles directory cannot be read.
    #[error("failed to read dotfiles directory {:?}", root.display())]
    ReadRoot {
        #[source]
        source: std::io::Error,
        root: PathBuf,
    },

    /// Dotfiles directory does not contain a single package.
    #[error("no packages found in {:?}", root.display())]
    NoPackages { root: PathBuf },
}

/// Friendly result alias :3
pub type Result<T, E = DiscoveryError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs::{create_dir_all, write};
    use tempfile::tempdir;

    #[test]
    fn discover_sorted_visible_directories() -> anyhow::Result<()> {
        let root = tempdir()?;
        create_dir_all(root.path().join("zsh"))?;
        create_dir_all(root.path().join("bash"))?;
        create_dir_all(root.path().join(".git"))?;
        write(root.path().join("README.md"), "not a package")?;

        let result = discover_packages(root.path())?
            .into_iter()
            .map(|pkg| pkg.name().to_string())
            .collect::<Vec<_>>();
        assert_eq!(result, vec!["bash", "zsh"]);

        Ok(())
    }

    #[test]
    fn discover_nothing_is_an_error() -> anyhow::Result<()> {
        let root = tempdir()?;
        create_dir_all(root.path().join(".hidden"))?;

        let result = discover_packages(root.path());
        assert!(matches!(result, Err(DiscoveryError::NoPackages { .. })));

        Ok(())
    }

    #[test]
    fn discover_missing_root_is_an_error() -> anyhow::Result<()> {
        let root = tempdir()?;

        let result = discover_packages(root.path().join("nope"));
        assert!(matches!(result, Err(DiscoveryError::MissingRoot { .. })));

        Ok(())
    }
}
