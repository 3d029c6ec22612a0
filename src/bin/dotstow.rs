// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use dotstow::{
    backup::{BackupEngine, BackupOutcome},
    config::{ConfigFile, Settings},
    farm::{detect_linked, link_packages, unlink_packages, LinkReport, Stow},
    metadata::{InstallMetadata, MetadataStore, UninstallState},
    package::{discover_packages, Package},
    path::default_config_file,
    prereq::{find_tool, PackageManager},
    restore::{cleanup, remove_traces, restore_backup, TraceScanner},
    select::{parse_selection, Selection},
};

use anyhow::{anyhow, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::{Confirm, InquireError, Text};
use std::{
    path::{Path, PathBuf},
    process::exit,
    slice,
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "dotstow [options] <dotstow-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, global = true, value_name = "path")]
    pub config: Option<PathBuf>,

    /// Directory holding dotfile packages.
    #[arg(short, long, global = true, value_name = "path")]
    pub dotfiles_dir: Option<PathBuf>,

    /// Directory to link packages into.
    #[arg(long, global = true, value_name = "path")]
    pub home: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        let settings = self.settings()?;
        match self.command {
            Command::Install => run_install(&settings),
            Command::Uninstall => run_uninstall(&settings),
        }
    }

    fn settings(&self) -> Result<Settings> {
        let path = match &self.config {
            Some(path) => path.clone(),
            None => default_config_file()?,
        };
        let overrides = ConfigFile {
            dotfiles_dir: self
                .dotfiles_dir
                .as_ref()
                .map(|path| path.to_string_lossy().into_owned()),
            home_dir: self
                .home
                .as_ref()
                .map(|path| path.to_string_lossy().into_owned()),
            ..Default::default()
        };

        let config = ConfigFile::load(path)?.merge(overrides);
        debug!("configuration:\n{config}");

        Ok(Settings::resolve(config)?)
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Interactively link dotfile packages into home directory.
    #[command(override_usage = "dotstow install [options]")]
    Install,

    /// Interactively unlink dotfile packages, and restore backups.
    #[command(override_usage = "dotstow uninstall [options]")]
    Uninstall,
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run() {
        if is_cancel(&error) {
            info!("cancelled");
            exit(0);
        }

        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run() -> Result<()> {
    Cli::parse().run()
}

fn is_cancel(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref::<InquireError>(),
        Some(InquireError::OperationCanceled | InquireError::OperationInterrupted)
    )
}

fn run_install(settings: &Settings) -> Result<()> {
    ensure_farm_tool(settings)?;
    let packages = discover_packages(&settings.dotfiles_dir)?;
    let Some(selected) = select_packages("Select packages to install", &packages)? else {
        info!("nothing installed");
        return Ok(());
    };

    if !Confirm::new(&format!("Install {} package(s)?", selected.len()))
        .with_default(true)
        .prompt()?
    {
        info!("nothing installed");
        return Ok(());
    }

    let backup = BackupEngine::new(settings).backup(&selected)?;
    for (name, reason) in &backup.failed {
        warn!("skip {name}, backup failed: {reason}");
    }

    let to_link = selected
        .into_iter()
        .filter(|package| !backup.is_failed(package.name()))
        .collect::<Vec<_>>();
    let farm = Stow::new(settings);
    let mut report = with_progress(&to_link, |package| {
        link_packages(&farm, slice::from_ref(package))
    })?;
    report
        .failed
        .extend(backup.failed.iter().cloned());

    MetadataStore::new(&settings.metadata_file).save(&InstallMetadata {
        date: Local::now().to_rfc3339(),
        backup_dir: backup.outcome.path().map(Path::to_path_buf),
        packages: report.succeeded.clone(),
    })?;

    print_report("installed", &report);
    if let BackupOutcome::Created(path) = &backup.outcome {
        info!("conflicting files backed up to {:?}", path.display());
    }

    Ok(())
}

fn run_uninstall(settings: &Settings) -> Result<()> {
    ensure_farm_tool(settings)?;
    let farm = Stow::new(settings);
    let store = MetadataStore::new(&settings.metadata_file);
    let metadata = store.load()?;

    let candidates = match &metadata {
        Some(metadata) => {
            info!("install metadata from {}", metadata.date);
            metadata
                .packages
                .iter()
                .map(|name| Package::new(&settings.dotfiles_dir, name.as_str()))
                .collect::<Vec<_>>()
        }
        None => {
            warn!("no install metadata, detecting linked packages");
            detect_linked(&farm, &discover_packages(&settings.dotfiles_dir)?)
        }
    };

    let report = if candidates.is_empty() {
        info!("no installed packages found");
        Some(LinkReport::default())
    } else if let Some(selected) = select_packages("Select packages to uninstall", &candidates)? {
        if Confirm::new(&format!("Uninstall {} package(s)?", selected.len()))
            .with_default(true)
            .prompt()?
        {
            let report = with_progress(&selected, |package| {
                unlink_packages(&farm, slice::from_ref(package))
            })?;
            print_report("uninstalled", &report);
            Some(report)
        } else {
            None
        }
    } else {
        info!("nothing uninstalled");
        return Ok(());
    };

    if let (Some(metadata), Some(report)) = (metadata, report) {
        finish_metadata(settings, &store, metadata, &report)?;
    }

    check_traces(settings)
}

fn finish_metadata(
    settings: &Settings,
    store: &MetadataStore,
    metadata: InstallMetadata,
    report: &LinkReport,
) -> Result<()> {
    let backup_dir = match metadata.after_unlink(&report.succeeded) {
        UninstallState::Partial(remaining) => {
            info!("still installed: {}", remaining.packages.join(" "));
            return Ok(store.save(&remaining)?);
        }
        UninstallState::Complete { backup_dir } => backup_dir,
    };

    if let Some(backup_dir) = &backup_dir {
        if backup_dir.is_dir()
            && Confirm::new(&format!("Restore backups from {:?}?", backup_dir.display()))
                .with_default(false)
                .prompt()?
        {
            let restored = restore_backup(backup_dir, &settings.home_dir)?;
            info!("restored {} entries", restored.restored.len());
            for (path, reason) in &restored.failed {
                warn!("cannot restore {:?}: {reason}", path.display());
            }
        }
    }

    if Confirm::new("Remove install metadata and backup directory?")
        .with_default(false)
        .prompt()?
    {
        cleanup(store, backup_dir.as_deref())?;
    }

    Ok(())
}

fn check_traces(settings: &Settings) -> Result<()> {
    let traces = TraceScanner::new(settings)?.scan();
    if traces.is_empty() {
        info!("no leftover traces found");
        return Ok(());
    }

    for path in &traces.dangling {
        warn!("dangling symlink: {:?}", path.display());
    }
    for path in &traces.markers {
        warn!("leftover marker file: {:?}", path.display());
    }

    if Confirm::new("Remove leftover traces?")
        .with_default(false)
        .prompt()?
    {
        for (path, reason) in remove_traces(&traces) {
            warn!("cannot remove {:?}: {reason}", path.display());
        }
    }

    Ok(())
}

fn ensure_farm_tool(settings: &Settings) -> Result<()> {
    let tool = settings.farm_tool.as_str();
    if find_tool(tool).is_some() {
        return Ok(());
    }

    warn!("{tool} is not installed");
    let manager = PackageManager::detect()
        .ok_or_else(|| anyhow!("{tool} is missing, and no supported package manager was found"))?;

    if !Confirm::new(&format!("Install {tool} through {manager}?"))
        .with_default(true)
        .prompt()?
    {
        return Err(anyhow!("{tool} is required"));
    }

    manager.install(tool)?;
    find_tool(tool).ok_or_else(|| anyhow!("{tool} still not found after install"))?;

    Ok(())
}

fn select_packages(title: &str, packages: &[Package]) -> Result<Option<Vec<Package>>> {
    println!("{title}:");
    for (index, package) in packages.iter().enumerate() {
        println!("  {:>2}) {package}", index + 1);
    }

    let input = Text::new("Selection:")
        .with_help_message("numbers separated by spaces, 'a' for all, 'q' to quit")
        .prompt()?;

    match parse_selection(&input, packages)? {
        Selection::Quit => Ok(None),
        Selection::Picked { items, warnings } => {
            for warning in warnings {
                warn!("{warning}");
            }
            Ok(Some(items))
        }
    }
}

fn with_progress(
    packages: &[Package],
    mut call: impl FnMut(&Package) -> LinkReport,
) -> Result<LinkReport> {
    let bar = ProgressBar::new(packages.len() as u64);
    let style = ProgressStyle::with_template(
        "{elapsed_precise:.green}  {msg:<30}  [{wide_bar:.yellow/blue}] {pos}/{len}",
    )?
    .progress_chars("-Cco.");
    bar.set_style(style);

    let mut report = LinkReport::default();
    for package in packages {
        bar.set_message(package.name().to_string());
        let single = bar.suspend(|| call(package));
        report.succeeded.extend(single.succeeded);
        report.failed.extend(single.failed);
        bar.inc(1);
    }
    bar.finish_and_clear();

    Ok(report)
}

fn print_report(action: &str, report: &LinkReport) {
    if !report.succeeded.is_empty() {
        info!("{action}: {}", report.succeeded.join(" "));
    }
    for (name, reason) in &report.failed {
        warn!("failed {name}: {reason}");
    }
    if report.succeeded.is_empty() && report.failed.is_empty() {
        info!("nothing {action}");
    }
}
