// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convpipe contributors

//! Error types
//!
//! Errors are grouped the way they surface to users: problems with the
//! pipeline text, problems with its shape, and problems while running it.

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for convpipe operations
pub type ConvpipeResult<T> = Result<T, ConvpipeError>;

/// Main error type for convpipe
#[derive(Error, Debug, Diagnostic)]
pub enum ConvpipeError {
    // ─────────────────────────────────────────────────────────────────────────
    // Parse Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Failed to parse pipeline: {reason}")]
    #[diagnostic(
        code(convpipe::parse_error),
        help("Stages are separated by '|', elements by ',', options look like '--name value'")
    )]
    Parse { reason: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Validation Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Invalid pipeline: {reason}")]
    #[diagnostic(code(convpipe::invalid_pipeline))]
    InvalidPipeline {
        reason: String,
        #[help]
        help: Option<String>,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Execution Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Node {node} ('{target}') expected {expected} input branch(es) but its predecessor produced {actual} outputs")]
    #[diagnostic(
        code(convpipe::scatter_mismatch),
        help("The number of files produced at run time does not match the number of branches declared in the next stage")
    )]
    ScatterMismatch {
        node: usize,
        target: String,
        expected: usize,
        actual: usize,
    },

    #[error("Node {node} ('{target}') has no input: {reason}")]
    #[diagnostic(code(convpipe::missing_input))]
    MissingInput {
        node: usize,
        target: String,
        reason: String,
    },

    #[error("Stage {stage} ('{target}') failed: {message}")]
    #[diagnostic(code(convpipe::node_failed))]
    NodeFailed {
        stage: usize,
        target: String,
        message: String,
    },

    #[error("Pipeline run was cancelled: {reason}")]
    #[diagnostic(code(convpipe::cancelled))]
    Cancelled { reason: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Builtin Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Collect failed: {reason}")]
    #[diagnostic(code(convpipe::collect_failed))]
    CollectFailed { reason: String },

    #[error("Source directory does not exist: {path}")]
    #[diagnostic(code(convpipe::source_not_found))]
    SourceNotFound { path: PathBuf },

    #[error("Source directory is empty: {path}")]
    #[diagnostic(code(convpipe::empty_source_directory))]
    EmptySourceDirectory { path: PathBuf },

    #[error("No files matching '{pattern}' in {path}")]
    #[diagnostic(
        code(convpipe::no_matching_files),
        help("Check the --glob pattern, or pass --recursive to search subdirectories")
    )]
    NoMatchingFiles { pattern: String, path: PathBuf },

    #[error("Input file does not exist: {path}")]
    #[diagnostic(code(convpipe::input_not_found))]
    InputNotFound { path: PathBuf },

    #[error("Clipboard error: {message}")]
    #[diagnostic(code(convpipe::clipboard))]
    Clipboard { message: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Plugin Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("No plugin found for target '{target}'")]
    #[diagnostic(code(convpipe::plugin_not_found))]
    PluginNotFound {
        target: String,
        #[help]
        help: Option<String>,
    },

    #[error("Plugin for target '{target}' failed: {error}")]
    #[diagnostic(code(convpipe::plugin_failed))]
    PluginFailed { target: String, error: String },

    #[error("Plugin for target '{target}' timed out after {limit}")]
    #[diagnostic(code(convpipe::plugin_timeout))]
    PluginTimeout { target: String, limit: String },

    #[error("Required option '{option}' was not provided for target '{target}'")]
    #[diagnostic(code(convpipe::missing_option))]
    MissingOption { option: String, target: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Config Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Invalid configuration in {path}: {reason}")]
    #[diagnostic(code(convpipe::config_error))]
    ConfigError { path: PathBuf, reason: String },

    #[error("Failed to read file '{path}': {error}")]
    #[diagnostic(code(convpipe::file_read_error))]
    FileReadError { path: PathBuf, error: String },

    // ─────────────────────────────────────────────────────────────────────────
    // IO/System Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("IO error: {message}")]
    #[diagnostic(code(convpipe::io_error))]
    Io { message: String },

    #[error("YAML parsing error: {message}")]
    #[diagnostic(code(convpipe::yaml_error))]
    Yaml { message: String },

    #[error("JSON parsing error: {message}")]
    #[diagnostic(code(convpipe::json_error))]
    Json { message: String },

    #[error("TOML parsing error: {message}")]
    #[diagnostic(code(convpipe::toml_error))]
    Toml { message: String },

    #[error("Glob pattern error: {message}")]
    #[diagnostic(code(convpipe::glob_error))]
    GlobPattern { message: String },
}

impl From<std::io::Error> for ConvpipeError {
    fn from(e: std::io::Error) -> Self {
        Self::Io { message: e.to_string() }
    }
}

impl From<serde_yaml::Error> for ConvpipeError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Yaml { message: e.to_string() }
    }
}

impl From<serde_json::Error> for ConvpipeError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json { message: e.to_string() }
    }
}

impl From<toml::de::Error> for ConvpipeError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml { message: e.to_string() }
    }
}

impl From<walkdir::Error> for ConvpipeError {
    fn from(e: walkdir::Error) -> Self {
        Self::Io { message: e.to_string() }
    }
}

impl From<glob::PatternError> for ConvpipeError {
    fn from(e: glob::PatternError) -> Self {
        Self::GlobPattern { message: e.to_string() }
    }
}

impl ConvpipeError {
    /// Shorthand for a parse error
    pub fn parse(reason: impl Into<String>) -> Self {
        Self::Parse {
            reason: reason.into(),
        }
    }

    /// Create a plugin not found error with an install hint
    pub fn plugin_not_found(target: &str, executable: &str) -> Self {
        Self::PluginNotFound {
            target: target.to_string(),
            help: Some(format!(
                "Install a plugin providing '{}' and ensure '{}' is in your PATH",
                target, executable
            )),
        }
    }

    /// Whether this error should stop every node that has not started yet
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::PluginNotFound { .. } | Self::Cancelled { .. } | Self::ConfigError { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_context() {
        let err = ConvpipeError::NoMatchingFiles {
            pattern: "*.heic".into(),
            path: PathBuf::from("/photos"),
        };
        assert!(err.to_string().contains("No files matching"));

        let err = ConvpipeError::EmptySourceDirectory {
            path: PathBuf::from("/photos"),
        };
        assert!(err.to_string().contains("empty"));

        let err = ConvpipeError::SourceNotFound {
            path: PathBuf::from("/nope"),
        };
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(ConvpipeError::plugin_not_found("jpg", "convpipe-jpg").is_fatal());
        assert!(!ConvpipeError::PluginFailed {
            target: "jpg".into(),
            error: "boom".into()
        }
        .is_fatal());
        assert!(!ConvpipeError::Io {
            message: "disk full".into()
        }
        .is_fatal());
    }
}
