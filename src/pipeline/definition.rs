// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convpipe contributors

//! Pipeline definition structures
//!
//! The parsed form of a pipeline expression such as
//! `tee | jpg --quality 90, png | collect`.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::builtins::Builtin;
use crate::errors::ConvpipeResult;
use crate::pipeline::{PipelineValidator, ValidationResult};

/// Option name to value, as given with `--name value`
pub type Options = BTreeMap<String, String>;

/// Source word that makes the pipeline read from the clipboard
pub const CLIPBOARD_SOURCE: &str = "clipboard";

/// One conversion request within a stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageElement {
    target: String,
    options: Options,
    builtin: Builtin,
}

impl StageElement {
    /// Create an element for a target with no options
    pub fn new(target: impl Into<String>) -> Self {
        let target = target.into();
        let builtin = Builtin::classify(&target);
        Self {
            target,
            options: Options::new(),
            builtin,
        }
    }

    /// Create an element with options
    pub fn with_options(target: impl Into<String>, options: Options) -> Self {
        Self {
            options,
            ..Self::new(target)
        }
    }

    /// Add or replace an option
    pub fn set_option(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.options.insert(name.into(), value.into());
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Look up a single option
    pub fn option(&self, name: &str) -> Option<&str> {
        self.options.get(name).map(String::as_str)
    }

    /// Whether a boolean-style option is switched on
    pub fn flag(&self, name: &str) -> bool {
        matches!(
            self.option(name).map(str::to_ascii_lowercase).as_deref(),
            Some("true" | "yes" | "1" | "on")
        )
    }

    pub fn builtin(&self) -> Builtin {
        self.builtin
    }

    pub fn is_tee(&self) -> bool {
        self.builtin == Builtin::Tee
    }

    pub fn is_collect(&self) -> bool {
        self.builtin == Builtin::Collect
    }

    pub fn is_clipboard(&self) -> bool {
        self.builtin == Builtin::Clipboard
    }

    pub fn is_passthrough(&self) -> bool {
        self.builtin == Builtin::Passthrough
    }

    /// Render back to element text, e.g. `jpg --quality 90 --strip`
    pub fn to_expression(&self) -> String {
        let mut out = self.target.clone();
        for (name, value) in &self.options {
            out.push_str(&format!(" --{}", name));
            if value == "true" {
                continue;
            }
            out.push(' ');
            out.push_str(&quote_value(value));
        }
        out
    }
}

/// Quote an option value so the parser reads it back unchanged
fn quote_value(value: &str) -> String {
    let plain = !value.is_empty()
        && !value.contains(|c: char| c.is_whitespace() || ",|'\"".contains(c));
    if plain {
        value.to_string()
    } else if !value.contains('"') {
        format!("\"{}\"", value)
    } else if !value.contains('\'') {
        format!("'{}'", value)
    } else {
        // Adjacent quoted runs join into one token
        value
            .split('\'')
            .map(|part| format!("'{}'", part))
            .collect::<Vec<_>>()
            .join("\"'\"")
    }
}

/// Elements that run side by side, each on its own branch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStage {
    pub elements: Vec<StageElement>,
}

impl PipelineStage {
    pub fn new(elements: Vec<StageElement>) -> Self {
        Self { elements }
    }

    /// Stage with a single element
    pub fn single(element: StageElement) -> Self {
        Self::new(vec![element])
    }

    /// Number of elements
    pub fn width(&self) -> usize {
        self.elements.len()
    }

    pub fn has_tee(&self) -> bool {
        self.elements.iter().any(StageElement::is_tee)
    }

    pub fn has_collect(&self) -> bool {
        self.elements.iter().any(StageElement::is_collect)
    }

    /// Comma-separated target names, for messages
    pub fn describe(&self) -> String {
        self.elements
            .iter()
            .map(StageElement::target)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A parsed pipeline: a source and the stages it flows through
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Pipeline {
    pub source: PathBuf,
    pub stages: Vec<PipelineStage>,
}

impl Pipeline {
    /// Create a pipeline without validating it
    pub fn new(source: impl Into<PathBuf>, stages: Vec<PipelineStage>) -> Self {
        Self {
            source: source.into(),
            stages,
        }
    }

    /// Create a pipeline, rejecting shapes that cannot run
    pub fn try_new(source: impl Into<PathBuf>, stages: Vec<PipelineStage>) -> ConvpipeResult<Self> {
        let pipeline = Self::new(source, stages);
        pipeline.validate().into_result()?;
        Ok(pipeline)
    }

    /// Check the pipeline shape; never mutates
    pub fn validate(&self) -> ValidationResult {
        PipelineValidator::validate(self)
    }

    /// Whether the source names the clipboard rather than a file
    pub fn reads_clipboard(&self) -> bool {
        is_clipboard_source(&self.source)
    }

    /// Total number of elements across all stages
    pub fn element_count(&self) -> usize {
        self.stages.iter().map(PipelineStage::width).sum()
    }

    /// Render back to pipeline text
    pub fn to_expression(&self) -> String {
        self.stages
            .iter()
            .map(|stage| {
                stage
                    .elements
                    .iter()
                    .map(StageElement::to_expression)
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

/// True when `source` is the clipboard word and no such file exists
pub fn is_clipboard_source(source: &Path) -> bool {
    source
        .to_str()
        .map(|s| s.eq_ignore_ascii_case(CLIPBOARD_SOURCE))
        .unwrap_or(false)
        && !source.exists()
}
