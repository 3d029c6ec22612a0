// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

#![cfg(unix)]

mod integration;

use anyhow::Result;
use dotstow::{
    config::{ConfigFile, Settings},
    farm::{FarmError, LinkFarm},
    package::Package,
};
use std::{
    fs::{self, create_dir_all, write},
    os::unix::fs::symlink,
    path::{Path, PathBuf},
};
use tempfile::{tempdir, TempDir};

/// Temporary home directory with a dotfiles directory inside it.
pub(crate) struct HomeFixture {
    _root: TempDir,
    pub(crate) settings: Settings,
}

impl HomeFixture {
    pub(crate) fn new() -> Result<Self> {
        let root = tempdir()?;
        let home = root.path().join("home");
        create_dir_all(home.join("dotfiles"))?;

        let settings = Settings::resolve(ConfigFile {
            home_dir: Some(home.to_string_lossy().into_owned()),
            ..Default::default()
        })?;

        Ok(Self {
            _root: root,
            settings,
        })
    }

    pub(crate) fn package(&self, name: &str, files: &[(&str, &str)]) -> Result<Package> {
        let package = Package::new(&self.settings.dotfiles_dir, name);
        for (path, contents) in files {
            let path = package.source().join(path);
            create_dir_all(path.parent().unwrap())?;
            write(path, contents)?;
        }

        Ok(package)
    }

    pub(crate) fn home(&self, path: impl AsRef<Path>) -> PathBuf {
        self.settings.home_dir.join(path)
    }

    pub(crate) fn write_home(&self, path: &str, contents: &str) -> Result<()> {
        let path = self.home(path);
        create_dir_all(path.parent().unwrap())?;
        write(path, contents)?;

        Ok(())
    }
}

/// Symlink farm that links every package file on its own, with absolute
/// links, instead of shelling out.
pub(crate) struct FileFarm {
    home_dir: PathBuf,
}

impl FileFarm {
    pub(crate) fn new(settings: &Settings) -> Self {
        Self {
            home_dir: settings.home_dir.clone(),
        }
    }

    fn pairs(&self, package: &Package) -> Vec<(PathBuf, PathBuf)> {
        let mut pairs = Vec::new();
        let mut pending = vec![package.source().to_path_buf()];
        while let Some(dir) = pending.pop() {
            for entry in fs::read_dir(&dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    pending.push(path);
                } else {
                    let relative = path.strip_prefix(package.source()).unwrap();
                    pairs.push((path.clone(), self.home_dir.join(relative)));
                }
            }
        }
        pairs.sort();

        pairs
    }

    fn points_at(target: &Path, source: &Path) -> bool {
        fs::read_link(target)
            .map(|link| link == source)
            .unwrap_or(false)
    }
}

impl LinkFarm for FileFarm {
    fn link(&self, package: &Package) -> Result<String, FarmError> {
        let mut output = Vec::new();
        for (source, target) in self.pairs(package) {
            if Self::points_at(&target, &source) {
                continue;
            }

            create_dir_all(target.parent().unwrap()).map_err(spawn_error)?;
            symlink(&source, &target).map_err(|_| FarmError::Syscall {
                program: "fake".into(),
                message: format!("existing target is not owned: {}", target.display()),
            })?;
            output.push(format!("LINK: {}", target.display()));
        }

        Ok(output.join("\n"))
    }

    fn unlink(&self, package: &Package) -> Result<String, FarmError> {
        let mut output = Vec::new();
        for (source, target) in self.pairs(package) {
            if Self::points_at(&target, &source) {
                fs::remove_file(&target).map_err(spawn_error)?;
                output.push(format!("UNLINK: {}", target.display()));
            }
        }

        Ok(output.join("\n"))
    }

    fn is_linked(&self, package: &Package) -> Result<bool, FarmError> {
        Ok(self
            .pairs(package)
            .iter()
            .any(|(source, target)| Self::points_at(target, source)))
    }
}

fn spawn_error(err: std::io::Error) -> FarmError {
    FarmError::Spawn {
        source: err,
        program: "fake".into(),
    }
}
