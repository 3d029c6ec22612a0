// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Symlink farm management.
//!
//! Dotstow does not create links itself. It drives an external
//! __symlink-farm__ tool, GNU Stow by default, which mirrors a package tree
//! into the home directory as a set of symlinks, and takes them down again.
//!
//! Each package is handled by its own subprocess. The failure of one package
//! is recorded in a [`LinkReport`], and never stops the remaining packages
//! from being processed.

use crate::{config::Settings, package::Package};

use std::{
    ffi::{OsStr, OsString},
    path::PathBuf,
    process::Command,
};
use tracing::{debug, info, instrument, warn};

/// Layer of indirection for symlink-farm access.
pub trait LinkFarm {
    /// Link package tree into the home directory.
    fn link(&self, package: &Package) -> Result<String>;

    /// Remove links of package from the home directory.
    fn unlink(&self, package: &Package) -> Result<String>;

    /// Check if any link of package currently exists in the home directory.
    fn is_linked(&self, package: &Package) -> Result<bool>;
}

/// Symlink farm through GNU Stow.
#[derive(Debug, Clone)]
pub struct Stow {
    program: OsString,
    dotfiles_dir: PathBuf,
    home_dir: PathBuf,
}

impl Stow {
    /// Construct new stow driver from settings.
    pub fn new(settings: &Settings) -> Self {
        Self {
            program: settings.farm_tool.clone().into(),
            dotfiles_dir: settings.dotfiles_dir.clone(),
            home_dir: settings.home_dir.clone(),
        }
    }

    fn expand_bin_args(
        &self,
        package: &Package,
        args: impl IntoIterator<Item = impl Into<OsString>>,
    ) -> Vec<OsString> {
        let mut bin_args: Vec<OsString> = vec![
            "--dir".into(),
            self.dotfiles_dir.clone().into_os_string(),
            "--target".into(),
            self.home_dir.clone().into_os_string(),
        ];
        bin_args.extend(args.into_iter().map(Into::into));
        bin_args.push(package.name().into());

        bin_args
    }
}

impl LinkFarm for Stow {
    #[instrument(skip(self, package), fields(package = package.name()), level = "debug")]
    fn link(&self, package: &Package) -> Result<String> {
        // INVARIANT: Restow so a re-install prunes stale links of the package.
        syscall_non_interactive(
            &self.program,
            self.expand_bin_args(package, ["--verbose", "--restow"]),
        )
    }

    #[instrument(skip(self, package), fields(package = package.name()), level = "debug")]
    fn unlink(&self, package: &Package) -> Result<String> {
        syscall_non_interactive(
            &self.program,
            self.expand_bin_args(package, ["--verbose", "--delete"]),
        )
    }

    #[instrument(skip(self, package), fields(package = package.name()), level = "debug")]
    fn is_linked(&self, package: &Package) -> Result<bool> {
        let output = syscall_non_interactive(
            &self.program,
            self.expand_bin_args(package, ["--no", "--verbose", "--delete"]),
        )?;

        Ok(reports_unlink(&output))
    }
}

/// Aggregated outcome of linking or unlinking a batch of packages.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LinkReport {
    /// Packages that were handled.
    pub succeeded: Vec<String>,

    /// Packages that failed, with the reason.
    pub failed: Vec<(String, String)>,
}

impl LinkReport {
    /// Check if every package went through.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Link each package into the home directory.
pub fn link_packages<F: LinkFarm>(farm: &F, packages: &[Package]) -> LinkReport {
    run_each(packages, "link", |package| farm.link(package))
}

/// Remove links of each package from the home directory.
pub fn unlink_packages<F: LinkFarm>(farm: &F, packages: &[Package]) -> LinkReport {
    run_each(packages, "unlink", |package| farm.unlink(package))
}

/// Detect which packages currently have links in the home directory.
///
/// Probe failures are logged, and count as not linked.
pub fn detect_linked<F: LinkFarm>(farm: &F, packages: &[Package]) -> Vec<Package> {
    packages
        .iter()
        .filter(|package| match farm.is_linked(package) {
            Ok(linked) => {
                debug!("{} linked: {linked}", package.name());
                linked
            }
            Err(error) => {
                warn!("cannot check {}: {error}", package.name());
                false
            }
        })
        .cloned()
        .collect()
}

fn run_each(
    packages: &[Package],
    action: &str,
    mut call: impl FnMut(&Package) -> Result<String>,
) -> LinkReport {
    let mut report = LinkReport::default();
    for package in packages {
        match call(package) {
            Ok(output) => {
                if !output.is_empty() {
                    info!("{output}");
                }
                info!("{action} {}: done", package.name());
                report.succeeded.push(package.name().to_string());
            }
            Err(error) => {
                warn!("{action} {}: {error}", package.name());
                report.failed.push((package.name().to_string(), error.to_string()));
            }
        }
    }

    report
}

fn reports_unlink(output: &str) -> bool {
    output
        .lines()
        .any(|line| line.trim_start().starts_with("UNLINK:"))
}

#[instrument(skip(cmd, args), level = "debug")]
fn syscall_non_interactive(
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
) -> Result<String> {
    let output = Command::new(cmd.as_ref())
        .args(args)
        .output()
        .map_err(|err| FarmError::Spawn {
            source: err,
            program: cmd.as_ref().to_os_string(),
        })?;
    let stdout = String::from_utf8_lossy(output.stdout.as_slice()).into_owned();
    let stderr = String::from_utf8_lossy(output.stderr.as_slice()).into_owned();
    let mut message = String::new();

    // INVARIANT: Stow reports verbose output on stderr, keep both streams.
    message.push_str(stdout.as_str());
    message.push_str(stderr.as_str());

    // INVARIANT: Chomp trailing newlines.
    let message = message.trim_end().to_string();

    if !output.status.success() {
        return Err(FarmError::Syscall {
            program: cmd.as_ref().to_os_string(),
            message,
        });
    }

    Ok(message)
}

/// Symlink farm error types.
#[derive(Debug, thiserror::Error)]
pub enum FarmError {
    /// Farm tool cannot be started.
    #[error("failed to run {program:?}")]
    Spawn {
        #[source]
        source: std::io::Error,
        program: OsString,
    },

    /// Farm tool exited unsuccessfully.
    #[error("command {program:?} failed:\n{message}")]
    Syscall { program: OsString, message: String },
}

/// Friendly result alias :3
pub type Result<T, E = FarmError> = std::result::Result<T, E>;
