// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Menu selection parsing.
//!
//! The user picks packages from a numbered menu by typing a free-form
//! selection string. This module only interprets that string. Rendering the
//! menu and reading input is left to the caller.
//!
//! # Selection Syntax
//!
//! - `all` or `a` picks every candidate.
//! - `quit` or `q` aborts without doing anything.
//! - Anything else is read as a whitespace-separated list of 1-based indices,
//!   e.g., `1 3 4`.
//!
//! Bad indices and duplicates are not fatal. They are skipped and reported
//! back as [`SelectionWarning`]s.

use std::{
    collections::HashSet,
    fmt::{Display, Formatter, Result as FmtResult},
};

/// Outcome of a parsed selection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection<T> {
    /// User wants to bail out.
    Quit,

    /// Picked candidates in first-seen order, along with anything that was
    /// skipped.
    Picked {
        items: Vec<T>,
        warnings: Vec<SelectionWarning>,
    },
}

/// Skipped part of a selection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionWarning {
    /// Token is not a number, or is out of range.
    InvalidIndex(String),

    /// Index was already picked.
    Duplicate(usize),
}

impl Display for SelectionWarning {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::InvalidIndex(token) => write!(fmt, "invalid selection {token:?}, skipping"),
            Self::Duplicate(index) => write!(fmt, "{index} selected more than once, skipping"),
        }
    }
}

/// Parse selection string against an ordered list of candidates.
///
/// # Errors
///
/// - Return [`SelectError::EmptySelection`] if nothing valid was picked.
pub fn parse_selection<T: Clone>(input: &str, candidates: &[T]) -> Result<Selection<T>> {
    let trimmed = input.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "q" | "quit" => return Ok(Selection::Quit),
        "a" | "all" => {
            if candidates.is_empty() {
                return Err(SelectError::EmptySelection);
            }

            return Ok(Selection::Picked {
                items: candidates.to_vec(),
                warnings: Vec::new(),
            });
        }
        _ => {}
    }

    let mut seen = HashSet::new();
    let mut items = Vec::new();
    let mut warnings = Vec::new();
    for token in trimmed.split_whitespace() {
        let index = match token.parse::<usize>() {
            Ok(index) if (1..=candidates.len()).contains(&index) => index,
            _ => {
                warnings.push(SelectionWarning::InvalidIndex(token.to_string()));
                continue;
            }
        };

        if !seen.insert(index) {
            warnings.push(SelectionWarning::Duplicate(index));
            continue;
        }

        items.push(candidates[index - 1].clone());
    }

    if items.is_empty() {
        return Err(SelectError::EmptySelection);
    }

    Ok(Selection::Picked { items, warnings })
}

/// Selection error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectError {
    /// Nothing valid was selected.
    #[error("no valid packages selected")]
    EmptySelection,
}

/// Friendly result alias :3
pub type Result<T, E = SelectError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use simple_test_case::test_case;

    const CANDIDATES: [&str; 3] = ["A", "B", "C"];

    #[test_case("a"; "short")]
    #[test_case("all"; "long")]
    #[test_case("  ALL \n"; "padded uppercase")]
    #[test]
    fn select_all(input: &str) -> anyhow::Result<()> {
        let result = parse_selection(input, &CANDIDATES)?;
        let expect = Selection::Picked {
            items: CANDIDATES.to_vec(),
            warnings: Vec::new(),
        };
        assert_eq!(result, expect);

        Ok(())
    }

    #[test_case("q"; "short")]
    #[test_case("quit"; "long")]
    #[test]
    fn select_quit(input: &str) -> anyhow::Result<()> {
        assert_eq!(parse_selection(input, &CANDIDATES)?, Selection::Quit);

        Ok(())
    }

    #[test]
    fn select_deduplicates() -> anyhow::Result<()> {
        let result = parse_selection("1 1 2", &CANDIDATES)?;
        let expect = Selection::Picked {
            items: vec!["A", "B"],
            warnings: vec![SelectionWarning::Duplicate(1)],
        };
        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn select_skips_invalid_indices() -> anyhow::Result<()> {
        let result = parse_selection("0 3 foo 4 -1", &CANDIDATES)?;
        let expect = Selection::Picked {
            items: vec!["C"],
            warnings: vec![
                SelectionWarning::InvalidIndex("0".into()),
                SelectionWarning::InvalidIndex("foo".into()),
                SelectionWarning::InvalidIndex("4".into()),
                SelectionWarning::InvalidIndex("-1".into()),
            ],
        };
        assert_eq!(result, expect);

        Ok(())
    }

    #[test_case(""; "blank")]
    #[test_case("9 x"; "nothing valid")]
    #[test]
    fn select_empty_is_an_error(input: &str) {
        assert_eq!(
            parse_selection(input, &CANDIDATES),
            Err(SelectError::EmptySelection)
        );
    }
}
