// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Dotfile package installer built on a symlink farm.
//!
//! Dotstow links __packages__ from a dotfiles directory into the home
//! directory through GNU Stow. Anything already sitting in the way gets
//! preserved in a timestamped backup set first, and every install run leaves
//! a small metadata record behind so that it can be undone later, backups
//! restored included.

pub mod backup;
pub mod config;
pub mod farm;
pub mod metadata;
pub mod package;
pub mod path;
pub mod prereq;
pub mod restore;
pub mod select;
