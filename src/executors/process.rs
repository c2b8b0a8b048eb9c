// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convpipe contributors

//! External process runner
//!
//! Runs `<prefix><target>` as a child process:
//!
//! ```text
//! convpipe-jpg --input photo.heic --output-dir /tmp/.../node-0001-jpg --quality 90
//! ```
//!
//! The plugin may print `{"output": ..., "outputs": [...], "extra": {...}}`
//! on stdout. Without it, whatever the plugin left in its output directory
//! is the result.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use super::{resolve_options, NodeRequest, NodeResult, NodeRunner, PluginOptionDef};
use crate::config::EngineConfig;
use crate::errors::{ConvpipeError, ConvpipeResult};
use crate::output::format_duration;
use crate::pipeline::{Options, FLAG_VALUE};

/// Reply a plugin prints on stdout
#[derive(Debug, Default, Deserialize)]
struct PluginReply {
    #[serde(default)]
    output: Option<PathBuf>,
    #[serde(default)]
    outputs: Vec<PathBuf>,
    #[serde(default)]
    extra: serde_json::Value,
}

/// Runner that executes plugins as external programs
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    prefix: String,
    timeout: Option<Duration>,
    search_path: Option<PathBuf>,
    option_defs: Vec<PluginOptionDef>,
}

impl ProcessRunner {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            timeout: None,
            search_path: None,
            option_defs: Vec::new(),
        }
    }

    /// Runner set up from engine configuration
    pub fn from_config(config: &EngineConfig) -> Self {
        let runner = Self::new(config.plugin_prefix.clone()).with_option_defs(config.plugin_options.clone());
        match config.timeout() {
            Some(timeout) => runner.with_timeout(timeout),
            None => runner,
        }
    }

    /// Give up on a plugin after `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Declared plugin options, checked and defaulted before each run
    pub fn with_option_defs(mut self, defs: Vec<PluginOptionDef>) -> Self {
        self.option_defs = defs;
        self
    }

    /// Look for plugins in `dir` instead of `PATH`
    pub fn with_search_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_path = Some(dir.into());
        self
    }

    /// Executable name for a target
    pub fn executable_name(&self, target: &str) -> String {
        format!("{}{}", self.prefix, target.to_ascii_lowercase())
    }

    /// Locate the executable for a target
    pub fn resolve(&self, target: &str) -> ConvpipeResult<PathBuf> {
        let name = self.executable_name(target);
        let found = match &self.search_path {
            Some(dir) => which::which_in(&name, Some(dir), dir),
            None => which::which(&name),
        };
        found.map_err(|_| ConvpipeError::plugin_not_found(target, &name))
    }

    fn command(&self, executable: &Path, request: &NodeRequest, options: &Options) -> Command {
        let mut cmd = Command::new(executable);
        cmd.arg("--input")
            .arg(&request.input)
            .arg("--output-dir")
            .arg(&request.work_dir);

        for (name, value) in options {
            cmd.arg(format!("--{}", name));
            if value != FLAG_VALUE {
                cmd.arg(value);
            }
        }

        cmd.current_dir(&request.work_dir);
        cmd.kill_on_drop(true);
        cmd
    }

    /// Turn the plugin's stdout (or its output directory) into a result
    fn collect_outputs(
        &self,
        request: &NodeRequest,
        plugin: &str,
        stdout: &str,
    ) -> ConvpipeResult<NodeResult> {
        let reply = if stdout.trim().is_empty() {
            PluginReply::default()
        } else {
            serde_json::from_str::<PluginReply>(stdout.trim()).map_err(|e| {
                ConvpipeError::PluginFailed {
                    target: request.target.clone(),
                    error: format!("unreadable plugin reply: {}", e),
                }
            })?
        };

        let resolve = |p: PathBuf| {
            if p.is_absolute() {
                p
            } else {
                request.work_dir.join(p)
            }
        };

        let mut outputs: Vec<PathBuf> = reply.outputs.into_iter().map(resolve).collect();
        let mut output = reply.output.map(resolve);

        if output.is_none() && outputs.is_empty() {
            let mut produced = list_dir(&request.work_dir)?;
            match produced.len() {
                0 => {}
                1 => output = produced.pop(),
                _ => outputs = produced,
            }
        }

        let result = match (output, outputs.is_empty()) {
            (Some(output), true) => NodeResult::success(&request.target, plugin, &request.input, &output),
            (output, false) => {
                let mut result = NodeResult::scatter(&request.target, plugin, &request.input, outputs);
                result.output = output;
                result
            }
            (None, true) => NodeResult::failure(&request.target, &request.input, "plugin produced no output")
                .with_plugin(plugin),
        };

        Ok(result.with_extra(reply.extra))
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_PLUGIN_PREFIX)
    }
}

#[async_trait]
impl NodeRunner for ProcessRunner {
    async fn run(&self, request: &NodeRequest) -> ConvpipeResult<NodeResult> {
        let executable = self.resolve(&request.target)?;
        let plugin = self.executable_name(&request.target);

        let options = match resolve_options(&self.option_defs, &request.options, &request.target) {
            Ok(options) => options,
            Err(e) => {
                return Ok(NodeResult::failure(&request.target, &request.input, e.to_string()).with_plugin(plugin))
            }
        };

        if let Err(e) = std::fs::create_dir_all(&request.work_dir) {
            return Ok(NodeResult::failure(
                &request.target,
                &request.input,
                format!("cannot create output directory {}: {}", request.work_dir.display(), e),
            )
            .with_plugin(plugin));
        }

        debug!(plugin = %executable.display(), input = %request.input.display(), "spawning plugin");

        let mut cmd = self.command(&executable, request, &options);
        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, cmd.output()).await {
                Ok(output) => output,
                Err(_) => {
                    let err = ConvpipeError::PluginTimeout {
                        target: request.target.clone(),
                        limit: format_duration(limit),
                    };
                    return Ok(NodeResult::failure(&request.target, &request.input, err.to_string())
                        .with_plugin(plugin));
                }
            },
            None => cmd.output().await,
        };

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                return Ok(NodeResult::failure(
                    &request.target,
                    &request.input,
                    format!("failed to start {}: {}", executable.display(), e),
                )
                .with_plugin(plugin))
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() {
            let exit_code = output.status.code().unwrap_or(-1);
            let message = if stderr.is_empty() {
                format!("exited with status {}", exit_code)
            } else {
                stderr
            };
            return Ok(NodeResult::failure(&request.target, &request.input, message).with_plugin(plugin));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        match self.collect_outputs(request, &plugin, &stdout) {
            Ok(result) => Ok(result),
            Err(e) => Ok(NodeResult::failure(&request.target, &request.input, e.to_string()).with_plugin(plugin)),
        }
    }

    fn name(&self) -> &str {
        "process"
    }
}

fn list_dir(dir: &Path) -> ConvpipeResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
