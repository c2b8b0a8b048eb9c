// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convpipe contributors

//! Tee builtin (fan-out)
//!
//! Tee never copies bytes. Its output is its input, and every element of
//! the following stage consumes that same file as its own branch.

use std::path::{Path, PathBuf};

use crate::errors::{ConvpipeError, ConvpipeResult};

/// Tee builtin
pub struct Tee;

impl Tee {
    /// Hand the input through so downstream branches can share it
    pub fn execute(input: &Path) -> ConvpipeResult<PathBuf> {
        if !input.exists() {
            return Err(ConvpipeError::InputNotFound {
                path: input.to_path_buf(),
            });
        }
        Ok(input.to_path_buf())
    }

    /// Check if a target name is the tee builtin
    pub fn is_tee(target: &str) -> bool {
        target.eq_ignore_ascii_case("tee")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_tee() {
        assert!(Tee::is_tee("tee"));
        assert!(Tee::is_tee("Tee"));
        assert!(!Tee::is_tee("t"));
        assert!(!Tee::is_tee(""));
    }

    #[test]
    fn test_execute_returns_input() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("photo.heic");
        std::fs::write(&file, b"data").unwrap();

        assert_eq!(Tee::execute(&file).unwrap(), file);
        assert!(Tee::execute(&dir.path().join("missing")).is_err());
    }
}
