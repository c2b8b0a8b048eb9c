// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convpipe contributors

//! Collect builtin (fan-in)
//!
//! Gathers the outputs of several branches into one directory. Each file
//! is copied as `{ordinal:04}_{original name}` so that the gather order
//! survives any later directory listing. Directory inputs are copied
//! whole under the same naming.

use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::errors::{ConvpipeError, ConvpipeResult};
use crate::pipeline::ValidationResult;

/// Name of the directory created under the work directory
pub const COLLECT_DIR: &str = "collected";

/// Output of a collect operation
#[derive(Debug, Clone)]
pub struct CollectOutput {
    /// Directory containing the collected files
    pub output_dir: PathBuf,
    /// Collected files, in gather order
    pub files: Vec<PathBuf>,
}

/// Collect builtin
pub struct Collect;

impl Collect {
    /// Gather `inputs` into `temp_dir/collected/`, preserving argument order
    pub fn execute(inputs: &[PathBuf], temp_dir: &Path) -> ConvpipeResult<CollectOutput> {
        if inputs.is_empty() {
            return Err(ConvpipeError::CollectFailed {
                reason: "Collect requires at least one input file".into(),
            });
        }

        // Nothing is written until every input is known to exist
        if let Some(missing) = inputs.iter().find(|input| !input.exists()) {
            return Err(ConvpipeError::InputNotFound {
                path: missing.clone(),
            });
        }

        let output_dir = temp_dir.join(COLLECT_DIR);
        std::fs::create_dir_all(&output_dir).map_err(|e| ConvpipeError::CollectFailed {
            reason: format!(
                "Failed to create collect directory '{}': {}",
                output_dir.display(),
                e
            ),
        })?;

        let mut files = Vec::with_capacity(inputs.len());
        for (ordinal, input) in inputs.iter().enumerate() {
            let dest = output_dir.join(Self::ordered_name(ordinal, input));

            copy_tree(input, &dest).map_err(|e| ConvpipeError::CollectFailed {
                reason: format!("Failed to collect '{}': {}", input.display(), e),
            })?;
            files.push(dest);
        }

        debug!(count = files.len(), dir = %output_dir.display(), "collected files");

        Ok(CollectOutput { output_dir, files })
    }

    /// Gather the files of `source_dir`, used when collect opens the pipeline
    pub fn execute_directory(
        source_dir: &Path,
        temp_dir: &Path,
        recursive: bool,
        glob_pattern: Option<&str>,
    ) -> ConvpipeResult<CollectOutput> {
        if !source_dir.exists() {
            return Err(ConvpipeError::SourceNotFound {
                path: source_dir.to_path_buf(),
            });
        }
        if !source_dir.is_dir() {
            return Err(ConvpipeError::CollectFailed {
                reason: format!("Source is not a directory: {}", source_dir.display()),
            });
        }

        let mut entries = Vec::new();
        list_files(source_dir, recursive, &mut entries)?;
        entries.sort();

        if entries.is_empty() {
            return Err(ConvpipeError::EmptySourceDirectory {
                path: source_dir.to_path_buf(),
            });
        }

        let matches = match glob_pattern {
            Some(pattern) => {
                let pattern_matcher = glob::Pattern::new(pattern)?;
                let matched: Vec<PathBuf> = entries
                    .into_iter()
                    .filter(|path| {
                        path.file_name()
                            .map(|name| pattern_matcher.matches(&name.to_string_lossy()))
                            .unwrap_or(false)
                    })
                    .collect();

                if matched.is_empty() {
                    return Err(ConvpipeError::NoMatchingFiles {
                        pattern: pattern.to_string(),
                        path: source_dir.to_path_buf(),
                    });
                }
                matched
            }
            None => entries,
        };

        Self::execute(&matches, temp_dir)
    }

    /// Structural check for a collect at `current_stage_index`
    ///
    /// Whether a leading collect has a directory to read is checked by
    /// the pipeline validator, which knows the source.
    pub fn validate(current_stage_index: usize, total_stages: usize) -> ValidationResult {
        let mut result = ValidationResult::new();
        if current_stage_index >= total_stages {
            result.add_error(&format!(
                "Collect at stage {} is outside a pipeline of {} stage(s)",
                current_stage_index + 1,
                total_stages
            ));
        }
        result
    }

    /// Check if a target name is the collect builtin
    pub fn is_collect(target: &str) -> bool {
        target.eq_ignore_ascii_case("collect")
    }

    fn ordered_name(ordinal: usize, input: &Path) -> String {
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("{:04}_{}", ordinal, name)
    }
}

/// Regular files under `dir`, including symlinks to files
///
/// Symlinked directories are never entered, so link cycles are harmless.
fn list_files(dir: &Path, recursive: bool, out: &mut Vec<PathBuf>) -> ConvpipeResult<()> {
    let mut walker = WalkDir::new(dir).follow_links(false).min_depth(1);
    if !recursive {
        walker = walker.max_depth(1);
    }

    for entry in walker {
        let entry = entry?;
        let file_type = entry.file_type();
        if file_type.is_file() || (file_type.is_symlink() && entry.path().is_file()) {
            out.push(entry.into_path());
        }
    }
    Ok(())
}

/// Copy a file, or a directory with everything below it, to `to`
pub(crate) fn copy_tree(from: &Path, to: &Path) -> ConvpipeResult<()> {
    if !from.is_dir() {
        std::fs::copy(from, to)?;
        return Ok(());
    }

    for entry in WalkDir::new(from).follow_links(false) {
        let entry = entry?;
        let relative = entry.path().strip_prefix(from).map_err(|e| ConvpipeError::Io {
            message: e.to_string(),
        })?;
        let dest = to.join(relative);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            std::fs::create_dir_all(&dest)?;
        } else if file_type.is_file() || entry.path().is_file() {
            std::fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}
