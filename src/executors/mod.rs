// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convpipe contributors

//! Plugin execution boundary
//!
//! The graph executor runs builtins itself and hands every other node to a
//! [`NodeRunner`]. How a runner converts the file is its own business.

mod process;

pub use process::ProcessRunner;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::{ConvpipeError, ConvpipeResult};
use crate::pipeline::Options;

/// Outcome of one node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    Error,
    Skipped,
}

impl std::fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Result of running one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeResult {
    pub status: ResultStatus,
    /// Id of the node in its execution graph
    #[serde(default)]
    pub node_id: usize,
    /// Zero-based stage the node belongs to
    #[serde(default)]
    pub stage_idx: usize,
    pub target: String,
    /// Name of whatever produced the result (`builtin` for in-process nodes)
    pub plugin_used: String,
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    /// Scatter outputs, one node producing many files
    pub outputs: Vec<PathBuf>,
    pub input_size: u64,
    pub output_size: Option<u64>,
    pub error: Option<String>,
    /// Plugin-specific payload
    pub extra: serde_json::Value,
}

impl NodeResult {
    fn new(status: ResultStatus, target: &str, input: &Path) -> Self {
        Self {
            status,
            node_id: 0,
            stage_idx: 0,
            target: target.to_string(),
            plugin_used: String::new(),
            input: input.to_path_buf(),
            output: None,
            outputs: Vec::new(),
            input_size: file_size(input).unwrap_or(0),
            output_size: None,
            error: None,
            extra: serde_json::Value::Null,
        }
    }

    /// Successful single-output result; sizes are read from disk
    pub fn success(target: &str, plugin: &str, input: &Path, output: &Path) -> Self {
        Self {
            plugin_used: plugin.to_string(),
            output: Some(output.to_path_buf()),
            output_size: file_size(output),
            ..Self::new(ResultStatus::Success, target, input)
        }
    }

    /// Successful result with several outputs
    pub fn scatter(target: &str, plugin: &str, input: &Path, outputs: Vec<PathBuf>) -> Self {
        let output_size = outputs.iter().map(|p| file_size(p)).sum::<Option<u64>>();
        Self {
            plugin_used: plugin.to_string(),
            outputs,
            output_size,
            ..Self::new(ResultStatus::Success, target, input)
        }
    }

    /// Node-local failure
    pub fn failure(target: &str, input: &Path, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(ResultStatus::Error, target, input)
        }
    }

    /// Node that never ran
    pub fn skipped(target: &str, input: &Path, reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::new(ResultStatus::Skipped, target, input)
        }
    }

    pub fn with_plugin(mut self, plugin: impl Into<String>) -> Self {
        self.plugin_used = plugin.into();
        self
    }

    /// Place the result in its graph
    pub fn at_node(mut self, node_id: usize, stage_idx: usize) -> Self {
        self.node_id = node_id;
        self.stage_idx = stage_idx;
        self
    }

    pub fn with_extra(mut self, extra: serde_json::Value) -> Self {
        self.extra = extra;
        self
    }

    /// True iff `outputs` is non-empty, whether or not `output` is set
    pub fn is_scatter(&self) -> bool {
        !self.outputs.is_empty()
    }

    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == ResultStatus::Error
    }

    pub fn is_skipped(&self) -> bool {
        self.status == ResultStatus::Skipped
    }

    /// Files downstream nodes consume: the scatter outputs, else the output
    pub fn output_paths(&self) -> Vec<PathBuf> {
        if self.is_scatter() {
            self.outputs.clone()
        } else {
            self.output.iter().cloned().collect()
        }
    }

    /// The failure as an error naming its stage and target
    pub fn node_error(&self) -> Option<ConvpipeError> {
        if !self.is_error() {
            return None;
        }
        Some(ConvpipeError::NodeFailed {
            stage: self.stage_idx + 1,
            target: self.target.clone(),
            message: self.error.clone().unwrap_or_else(|| "unknown error".into()),
        })
    }

    /// JSON form for machine-readable reports
    pub fn to_json(&self) -> serde_json::Value {
        let mut j = serde_json::json!({
            "success": self.is_success(),
            "status": self.status,
            "node": self.node_id,
            "stage": self.stage_idx + 1,
            "target": self.target,
            "plugin": self.plugin_used,
            "input": self.input.display().to_string(),
            "input_size": self.input_size,
        });

        if let Some(output) = &self.output {
            j["output"] = serde_json::json!(output.display().to_string());
        }
        if let Some(output_size) = self.output_size {
            j["output_size"] = serde_json::json!(output_size);
            if self.input_size > 0 {
                j["size_ratio"] = serde_json::json!(output_size as f64 / self.input_size as f64);
            }
        }
        if let Some(error) = &self.error {
            j["error"] = serde_json::json!(error);
        }
        if self.is_scatter() {
            let outputs: Vec<String> = self.outputs.iter().map(|p| p.display().to_string()).collect();
            j["outputs"] = serde_json::json!(outputs);
        }
        if !self.extra.is_null() {
            j["extra"] = self.extra.clone();
        }

        j
    }
}

fn file_size(path: &Path) -> Option<u64> {
    std::fs::metadata(path).ok().map(|m| m.len())
}

/// Everything a runner needs to convert one file
#[derive(Debug, Clone)]
pub struct NodeRequest {
    pub node_id: usize,
    pub stage_idx: usize,
    pub target: String,
    pub input: PathBuf,
    pub options: Options,
    /// Directory owned by this node; nothing else writes here
    pub work_dir: PathBuf,
}

/// Runs non-builtin nodes
///
/// `Ok` with an error status is a failure of this node only and makes its
/// dependents skip. `Err` is fatal for the whole run: nodes that have not
/// started yet are cancelled.
#[async_trait]
pub trait NodeRunner: Send + Sync {
    async fn run(&self, request: &NodeRequest) -> ConvpipeResult<NodeResult>;

    /// Name used in logs
    fn name(&self) -> &str {
        "plugin"
    }
}

/// Option a plugin declares in its manifest
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginOptionDef {
    /// Option name, with or without leading dashes
    pub name: String,
    #[serde(rename = "type", default = "default_option_type")]
    pub kind: String,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub choices: Vec<String>,
    /// Targets the option applies to; empty means all
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default)]
    pub required: bool,
}

fn default_option_type() -> String {
    "string".to_string()
}

impl PluginOptionDef {
    /// Name as it appears in parsed options
    pub fn key(&self) -> &str {
        self.name
            .strip_prefix("--")
            .or_else(|| self.name.strip_prefix('-'))
            .unwrap_or(&self.name)
    }

    fn applies_to(&self, target: &str) -> bool {
        self.targets.is_empty() || self.targets.iter().any(|t| t == target)
    }

    fn has_default(&self) -> bool {
        self.default.as_deref().is_some_and(|d| !d.is_empty())
    }
}

/// Check that every required option for `target` was given
///
/// Options scoped to other targets, and options with a non-empty default,
/// are satisfied without being given.
pub fn validate_required_options(
    defs: &[PluginOptionDef],
    provided: &Options,
    target: &str,
) -> ConvpipeResult<()> {
    for def in defs {
        if !def.required || !def.applies_to(target) || def.has_default() {
            continue;
        }
        if !provided.contains_key(def.key()) {
            return Err(ConvpipeError::MissingOption {
                option: def.name.clone(),
                target: target.to_string(),
            });
        }
    }
    Ok(())
}

/// Options to pass to `target`: checked against `defs`, with declared
/// defaults filled in for anything not given
pub fn resolve_options(defs: &[PluginOptionDef], provided: &Options, target: &str) -> ConvpipeResult<Options> {
    validate_required_options(defs, provided, target)?;

    let mut options = provided.clone();
    for def in defs.iter().filter(|d| d.applies_to(target) && d.has_default()) {
        if let Some(default) = &def.default {
            options
                .entry(def.key().to_string())
                .or_insert_with(|| default.clone());
        }
    }
    Ok(options)
}
