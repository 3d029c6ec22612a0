// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Prerequisite detection and installation.
//!
//! Dotstow needs its symlink-farm tool on the `PATH`. When the tool is
//! missing, the system package manager can install it. The package manager is
//! picked once at startup from a fixed strategy table, in table order.

use std::{
    ffi::OsString,
    fmt::{Display, Formatter, Result as FmtResult},
    path::PathBuf,
    process::Command,
};
use tracing::{debug, info, instrument};

/// Locate a program on the `PATH`.
pub fn find_tool(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}

/// Supported system package managers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Apt,
    Dnf,
    Yum,
    Pacman,
    Zypper,
    Apk,
    Brew,
}

impl PackageManager {
    /// Strategy table in detection order.
    pub const ALL: [PackageManager; 7] = [
        Self::Apt,
        Self::Dnf,
        Self::Yum,
        Self::Pacman,
        Self::Zypper,
        Self::Apk,
        Self::Brew,
    ];

    /// Program that identifies this package manager.
    pub fn program(&self) -> &'static str {
        match self {
            Self::Apt => "apt-get",
            Self::Dnf => "dnf",
            Self::Yum => "yum",
            Self::Pacman => "pacman",
            Self::Zypper => "zypper",
            Self::Apk => "apk",
            Self::Brew => "brew",
        }
    }

    /// Install command template, package name excluded.
    pub fn install_template(&self) -> &'static [&'static str] {
        match self {
            Self::Apt => &["apt-get", "install", "-y"],
            Self::Dnf => &["dnf", "install", "-y"],
            Self::Yum => &["yum", "install", "-y"],
            Self::Pacman => &["pacman", "-S", "--noconfirm"],
            Self::Zypper => &["zypper", "install", "-y"],
            Self::Apk => &["apk", "add"],
            Self::Brew => &["brew", "install"],
        }
    }

    /// Check if the package manager installs system-wide, needing root.
    pub fn needs_root(&self) -> bool {
        !matches!(self, Self::Brew)
    }

    /// Detect first available package manager of the strategy table.
    pub fn detect() -> Option<Self> {
        Self::detect_with(|program| find_tool(program).is_some())
    }

    /// Detect first package manager whose program passes `available`.
    pub fn detect_with(available: impl Fn(&str) -> bool) -> Option<Self> {
        let found = Self::ALL
            .into_iter()
            .find(|manager| available(manager.program()));
        debug!("detected package manager: {found:?}");
        found
    }

    /// Full command line to install a package.
    ///
    /// Prefixes `sudo` when the package manager needs root and the caller is
    /// not root already.
    pub fn install_command(&self, package: &str, is_root: bool) -> Vec<OsString> {
        let mut command = Vec::new();
        if self.needs_root() && !is_root {
            command.push(OsString::from("sudo"));
        }
        command.extend(self.install_template().iter().map(OsString::from));
        command.push(package.into());

        command
    }

    /// Install a package through this package manager.
    ///
    /// Inherits standard streams, so the package manager can prompt for
    /// passwords or confirmation.
    ///
    /// # Errors
    ///
    /// - Return [`PrereqError::Spawn`] if the package manager cannot be run.
    /// - Return [`PrereqError::InstallFailed`] if it exits unsuccessfully.
    #[instrument(skip(self), level = "debug")]
    pub fn install(&self, package: &str) -> Result<()> {
        let command = self.install_command(package, is_root());
        info!("installing {package} through {self}");

        let status = Command::new(&command[0])
            .args(&command[1..])
            .spawn()
            .and_then(|mut child| child.wait())
            .map_err(|err| PrereqError::Spawn {
                source: err,
                program: command[0].clone(),
            })?;

        if !status.success() {
            return Err(PrereqError::InstallFailed {
                package: package.to_string(),
                manager: *self,
            });
        }

        Ok(())
    }
}

impl Display for PackageManager {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.program())
    }
}

#[cfg(unix)]
fn is_root() -> bool {
    nix::unistd::Uid::effective().is_root()
}

#[cfg(not(unix))]
fn is_root() -> bool {
    false
}

/// Prerequisite error types.
#[derive(Debug, thiserror::Error)]
pub enum PrereqError {
    /// Package manager cannot be started.
    #[error("failed to run {program:?}")]
    Spawn {
        #[source]
        source: std::io::Error,
        program: OsString,
    },

    /// Package manager failed to install package.
    #[error("{manager} failed to install {package}")]
    InstallFailed {
        package: String,
        manager: PackageManager,
    },
}

/// Friendly result alias :3
pub type Result<T, E = PrereqError> = std::result::Result<T, E>;
