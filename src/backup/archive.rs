// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Archive-style file copying.
//!
//! Copies preserve what `cp -a` preserves that matters for dotfiles:
//! permission bits, access and modification times, and symlink-ness.
//! Symlinks are never followed, they are recreated with the same target.

use filetime::{set_file_times, set_symlink_file_times, FileTime};
use std::{
    fs::{self, Metadata},
    io,
    path::Path,
};

/// Copy `from` to `to` archive-style.
///
/// Directories are copied recursively, and merged into an existing directory
/// at `to`, even one that `to` only links to. A linked directory keeps its
/// own permissions and times. Any other existing entry at `to` is replaced,
/// never written through, so a symlink sitting at `to` does not get its
/// target clobbered.
pub(crate) fn copy_archive(from: &Path, to: &Path) -> io::Result<()> {
    let meta = fs::symlink_metadata(from)?;
    let linked_dir = clear_destination(to, &meta)?;

    if meta.file_type().is_symlink() {
        let target = fs::read_link(from)?;
        make_symlink(&target, to)?;
        set_symlink_file_times(to, atime(&meta), mtime(&meta))?;
    } else if meta.is_dir() {
        fs::create_dir_all(to)?;
        for entry in fs::read_dir(from)? {
            let entry = entry?;
            copy_archive(&entry.path(), &to.join(entry.file_name()))?;
        }
        if !linked_dir {
            // INVARIANT: Directory times are set last, children would bump them.
            fs::set_permissions(to, meta.permissions())?;
            set_file_times(to, atime(&meta), mtime(&meta))?;
        }
    } else {
        fs::copy(from, to)?;
        fs::set_permissions(to, meta.permissions())?;
        set_file_times(to, atime(&meta), mtime(&meta))?;
    }

    Ok(())
}

/// Remove whatever lives at `path` without following symlinks.
///
/// Missing paths are fine.
pub(crate) fn remove_entry(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

/// Make room for `source` at `to`.
///
/// Returns true if `to` is a symlink to a directory that `source` merges into.
fn clear_destination(to: &Path, source: &Metadata) -> io::Result<bool> {
    let existing = match fs::symlink_metadata(to) {
        Ok(existing) => existing,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };

    // INVARIANT: Merge directory into directory, replace everything else.
    //   - A link to a directory counts as a directory, the link stays.
    if source.is_dir() {
        if existing.is_dir() {
            return Ok(false);
        }

        if existing.file_type().is_symlink() && fs::metadata(to).is_ok_and(|meta| meta.is_dir()) {
            return Ok(true);
        }
    }

    remove_entry(to)?;

    Ok(false)
}

fn atime(meta: &Metadata) -> FileTime {
    FileTime::from_last_access_time(meta)
}

fn mtime(meta: &Metadata) -> FileTime {
    FileTime::from_last_modification_time(meta)
}

#[cfg(unix)]
fn make_symlink(original: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(windows)]
fn make_symlink(original: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(original, link)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::{
        fs::{create_dir_all, read_link, read_to_string, write},
        os::unix::fs::{symlink, PermissionsExt},
    };
    use tempfile::tempdir;

    #[test]
    fn copy_keeps_mode_and_mtime() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let from = dir.path().join("script.sh");
        write(&from, "echo hi")?;
        fs::set_permissions(&from, fs::Permissions::from_mode(0o750))?;
        set_file_times(&from, FileTime::from_unix_time(1_000, 0), FileTime::from_unix_time(2_000, 0))?;

        let to = dir.path().join("copy.sh");
        copy_archive(&from, &to)?;

        let meta = fs::metadata(&to)?;
        assert_eq!(read_to_string(&to)?, "echo hi");
        assert_eq!(meta.permissions().mode() & 0o777, 0o750);
        assert_eq!(FileTime::from_last_modification_time(&meta).unix_seconds(), 2_000);

        Ok(())
    }

    #[test]
    fn copy_recreates_symlink() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let from = dir.path().join("link");
        symlink("somewhere/else", &from)?;

        let to = dir.path().join("copy");
        copy_archive(&from, &to)?;

        assert!(fs::symlink_metadata(&to)?.file_type().is_symlink());
        assert_eq!(read_link(&to)?, Path::new("somewhere/else"));

        Ok(())
    }

    #[test]
    fn copy_replaces_symlink_instead_of_writing_through() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let victim = dir.path().join("victim");
        write(&victim, "untouched")?;
        let to = dir.path().join("dest");
        symlink(&victim, &to)?;

        let from = dir.path().join("from");
        write(&from, "restored")?;
        copy_archive(&from, &to)?;

        assert!(!fs::symlink_metadata(&to)?.file_type().is_symlink());
        assert_eq!(read_to_string(&to)?, "restored");
        assert_eq!(read_to_string(&victim)?, "untouched");

        Ok(())
    }

    #[test]
    fn copy_merges_directories() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let from = dir.path().join("from");
        create_dir_all(from.join("nested"))?;
        write(from.join("nested/a"), "a")?;

        let to = dir.path().join("to");
        create_dir_all(to.join("nested"))?;
        write(to.join("nested/b"), "b")?;

        copy_archive(&from, &to)?;

        assert_eq!(read_to_string(to.join("nested/a"))?, "a");
        assert_eq!(read_to_string(to.join("nested/b"))?, "b");

        Ok(())
    }

    #[test]
    fn copy_merges_through_directory_link() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let data = dir.path().join("data");
        create_dir_all(data.join("git"))?;
        write(data.join("git/config"), "git")?;
        fs::set_permissions(&data, fs::Permissions::from_mode(0o700))?;
        let to = dir.path().join("config");
        symlink(&data, &to)?;

        let from = dir.path().join("from");
        create_dir_all(from.join("app"))?;
        write(from.join("app/rc"), "rc")?;
        fs::set_permissions(&from, fs::Permissions::from_mode(0o755))?;

        copy_archive(&from, &to)?;

        assert!(fs::symlink_metadata(&to)?.file_type().is_symlink());
        assert_eq!(read_to_string(data.join("app/rc"))?, "rc");
        assert_eq!(read_to_string(data.join("git/config"))?, "git");
        assert_eq!(fs::metadata(&data)?.permissions().mode() & 0o777, 0o700);

        Ok(())
    }

    #[test]
    fn remove_entry_handles_every_kind() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let file = dir.path().join("file");
        let tree = dir.path().join("tree");
        let link = dir.path().join("link");
        write(&file, "x")?;
        create_dir_all(tree.join("deep"))?;
        symlink(&tree, &link)?;

        remove_entry(&link)?;
        assert!(tree.exists());
        remove_entry(&tree)?;
        remove_entry(&file)?;
        remove_entry(&dir.path().join("missing"))?;

        assert!(!tree.exists());
        assert!(!file.exists());

        Ok(())
    }
}
