// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convpipe contributors

//! Passthrough builtin (identity)

use std::path::{Path, PathBuf};

use crate::errors::{ConvpipeError, ConvpipeResult};

const ALIASES: [&str; 5] = ["_", "echo", "bypass", "pass", "noop"];

/// Passthrough builtin
pub struct Passthrough;

impl Passthrough {
    /// Return the input unchanged
    pub fn execute(input: &Path) -> ConvpipeResult<PathBuf> {
        if !input.exists() {
            return Err(ConvpipeError::InputNotFound {
                path: input.to_path_buf(),
            });
        }
        Ok(input.to_path_buf())
    }

    /// Check if a target name is the passthrough builtin
    ///
    /// Accepts `_`, `echo`, `bypass`, `pass` and `noop`.
    pub fn is_passthrough(target: &str) -> bool {
        ALIASES.iter().any(|alias| target.eq_ignore_ascii_case(alias))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases() {
        for alias in ["_", "echo", "ECHO", "Bypass", "pass", "NoOp"] {
            assert!(Passthrough::is_passthrough(alias), "{alias}");
        }
        assert!(!Passthrough::is_passthrough("passthrough"));
        assert!(!Passthrough::is_passthrough("__"));
        assert!(!Passthrough::is_passthrough("jpg"));
    }

    #[test]
    fn test_execute() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("notes.txt");
        std::fs::write(&file, "hello").unwrap();

        assert_eq!(Passthrough::execute(&file).unwrap(), file);

        let err = Passthrough::execute(&dir.path().join("gone.txt")).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
