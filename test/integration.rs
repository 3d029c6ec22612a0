// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{FileFarm, HomeFixture};

use anyhow::Result;
use dotstow::{
    backup::{BackupEngine, BackupOutcome},
    farm::{detect_linked, link_packages, unlink_packages},
    metadata::{InstallMetadata, MetadataStore},
    package::discover_packages,
    restore::{cleanup, restore_backup, TraceScanner},
    select::{parse_selection, Selection},
};
use pretty_assertions::assert_eq;
use std::{
    fs::{self, read_to_string},
    os::unix::fs::symlink,
    path::Path,
};

fn names(packages: &[dotstow::package::Package]) -> Vec<String> {
    packages.iter().map(|pkg| pkg.name().to_string()).collect()
}

#[test]
fn install_records_backup_and_is_idempotent() -> Result<()> {
    let fixture = HomeFixture::new()?;
    fixture.package("bash", &[(".bashrc", "new bashrc"), (".bash_profile", "new profile")])?;
    fixture.package("git", &[(".gitconfig", "new gitconfig")])?;
    fixture.package("nvim", &[(".config/nvim/init.lua", "-- new")])?;
    fixture.write_home(".bashrc", "old bashrc")?;
    fixture.write_home(".config/nvim/init.lua", "-- old")?;

    let packages = discover_packages(&fixture.settings.dotfiles_dir)?;
    assert_eq!(names(&packages), vec!["bash", "git", "nvim"]);

    let Selection::Picked { items: selected, .. } = parse_selection("3 1", &packages)? else {
        panic!("expected packages to be picked");
    };
    assert_eq!(names(&selected), vec!["nvim", "bash"]);

    let engine = BackupEngine::new(&fixture.settings);
    let backup = engine.backup(&selected)?;
    let backup_dir = backup.outcome.path().expect("backup set").to_path_buf();
    assert!(backup_dir.is_dir());
    assert_eq!(read_to_string(backup_dir.join(".bashrc"))?, "old bashrc");
    assert_eq!(read_to_string(backup_dir.join(".config/nvim/init.lua"))?, "-- old");

    let farm = FileFarm::new(&fixture.settings);
    let report = link_packages(&farm, &selected);
    assert!(report.is_clean());
    assert_eq!(read_to_string(fixture.home(".bashrc"))?, "new bashrc");

    let store = MetadataStore::new(&fixture.settings.metadata_file);
    store.save(&InstallMetadata {
        date: "now".into(),
        backup_dir: backup.outcome.path().map(Path::to_path_buf),
        packages: report.succeeded.clone(),
    })?;
    let saved = store.load()?.expect("metadata");
    assert_eq!(saved.backup_dir.as_deref(), Some(backup_dir.as_path()));
    assert_eq!(saved.packages, vec!["nvim", "bash"]);

    // Re-install finds nothing to back up.
    for package in &selected {
        assert!(engine.detect_conflicts(package)?.is_empty());
    }
    let again = engine.backup(&selected)?;
    assert_eq!(again.outcome, BackupOutcome::None);

    store.save(&InstallMetadata {
        date: "later".into(),
        backup_dir: again.outcome.path().map(Path::to_path_buf),
        packages: report.succeeded,
    })?;
    let raw = read_to_string(store.path())?;
    assert!(raw.contains("BACKUP_DIR=none\n"));

    Ok(())
}

#[test]
fn uninstall_without_metadata_detects_live_links() -> Result<()> {
    let fixture = HomeFixture::new()?;
    fixture.package("bash", &[(".bashrc", "bashrc")])?;
    fixture.package("git", &[(".gitconfig", "gitconfig")])?;
    fixture.package("zsh", &[(".zshrc", "zshrc")])?;

    let packages = discover_packages(&fixture.settings.dotfiles_dir)?;
    let farm = FileFarm::new(&fixture.settings);
    link_packages(&farm, &packages);
    unlink_packages(&farm, &packages[1..2]);

    let store = MetadataStore::new(&fixture.settings.metadata_file);
    assert_eq!(store.load()?, None);

    let linked = detect_linked(&farm, &packages);
    assert_eq!(names(&linked), vec!["bash", "zsh"]);
    assert!(fs::symlink_metadata(fixture.home(".bashrc"))?.file_type().is_symlink());
    assert!(fs::symlink_metadata(fixture.home(".gitconfig")).is_err());

    Ok(())
}

#[test]
fn full_uninstall_restores_and_cleans_up() -> Result<()> {
    let fixture = HomeFixture::new()?;
    fixture.package("bash", &[(".bashrc", "new bashrc")])?;
    fixture.package("tmux", &[(".tmux.conf", "new tmux")])?;
    fixture.write_home(".bashrc", "old bashrc")?;
    symlink("/etc/tmux.conf", fixture.home(".tmux.conf"))?;

    let packages = discover_packages(&fixture.settings.dotfiles_dir)?;
    let backup = BackupEngine::new(&fixture.settings).backup(&packages)?;
    let farm = FileFarm::new(&fixture.settings);
    let installed = link_packages(&farm, &packages);
    let store = MetadataStore::new(&fixture.settings.metadata_file);
    store.save(&InstallMetadata {
        date: "now".into(),
        backup_dir: backup.outcome.path().map(Path::to_path_buf),
        packages: installed.succeeded,
    })?;

    let metadata = store.load()?.expect("metadata");
    let report = unlink_packages(&farm, &packages);
    assert_eq!(report.succeeded, metadata.packages);

    let backup_dir = metadata.backup_dir.expect("backup set");
    let restored = restore_backup(&backup_dir, &fixture.settings.home_dir)?;
    assert!(restored.failed.is_empty());
    assert_eq!(read_to_string(fixture.home(".bashrc"))?, "old bashrc");
    assert_eq!(
        fs::read_link(fixture.home(".tmux.conf"))?,
        Path::new("/etc/tmux.conf")
    );

    cleanup(&store, Some(&backup_dir))?;
    assert_eq!(store.load()?, None);
    assert!(!backup_dir.exists());

    // The restored tmux link dangles on hosts without a system config, so
    // only check that the farm itself left nothing behind.
    let traces = TraceScanner::new(&fixture.settings)?.scan();
    assert!(traces.markers.is_empty());
    assert!(traces
        .dangling
        .iter()
        .all(|path| path == &fixture.home(".tmux.conf")));

    Ok(())
}
