// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convpipe contributors

//! Pipeline validation
//!
//! Cross-stage shape rules, checked after parsing and whenever a pipeline
//! is built by hand.

use crate::builtins::{Clipboard, Collect};
use crate::errors::{ConvpipeError, ConvpipeResult};
use crate::pipeline::{Pipeline, PipelineStage, StageElement};

/// Pipeline validator
pub struct PipelineValidator;

impl PipelineValidator {
    /// Validate a pipeline's shape
    pub fn validate(pipeline: &Pipeline) -> ValidationResult {
        let mut result = ValidationResult::new();

        if pipeline.stages.is_empty() {
            result.add_error("Pipeline has no stages");
            return result;
        }

        let total = pipeline.stages.len();
        for (idx, stage) in pipeline.stages.iter().enumerate() {
            Self::validate_stage(idx, total, stage, &mut result);
        }

        Self::validate_collect_source(pipeline, &mut result);
        Self::validate_widths(pipeline, &mut result);

        result
    }

    /// Rules local to one stage
    fn validate_stage(idx: usize, total: usize, stage: &PipelineStage, result: &mut ValidationResult) {
        let position = idx + 1;

        if stage.elements.is_empty() {
            result.add_error(&format!("Stage {} is empty", position));
            return;
        }

        if stage.elements.iter().any(|e| e.target().trim().is_empty()) {
            result.add_error(&format!("Stage {} has an element with no target", position));
        }

        if stage.has_collect() {
            if stage.width() > 1 {
                result.add_error(&format!(
                    "Stage {}: collect must be the only element in its stage (found: {})",
                    position,
                    stage.describe()
                ));
            }
            result.merge(Collect::validate(idx, total));
        }

        if stage.has_tee() && stage.width() > 1 {
            result.add_error(&format!(
                "Stage {}: tee must be the only element in its stage (found: {})",
                position,
                stage.describe()
            ));
        }

        if stage.elements.iter().any(StageElement::is_clipboard) {
            result.merge(Clipboard::validate(idx));
        }

        if stage.has_tee() && idx + 1 == total {
            result.add_warning(&format!(
                "Stage {}: tee is the last stage and has no branches to feed",
                position
            ));
        }
    }

    /// A leading collect reads the source directory itself
    fn validate_collect_source(pipeline: &Pipeline, result: &mut ValidationResult) {
        let Some(first) = pipeline.stages.first() else {
            return;
        };
        if !first.has_collect() {
            return;
        }

        if pipeline.source.as_os_str().is_empty() {
            result.add_error(
                "collect as the first stage requires a directory source, but no source was given",
            );
        } else if !pipeline.source.is_dir() {
            result.add_error(&format!(
                "collect as the first stage requires a directory source, but '{}' is not a directory",
                pipeline.source.display()
            ));
        }
    }

    /// Consecutive stages must agree on how many branches flow between them
    fn validate_widths(pipeline: &Pipeline, result: &mut ValidationResult) {
        // Number of branches flowing out of the previous stage
        let mut frontier: Option<usize> = None;
        let mut after_tee = false;

        for (idx, stage) in pipeline.stages.iter().enumerate() {
            let width = stage.width();
            if width == 0 {
                continue;
            }
            let position = idx + 1;

            let out_width = if stage.has_collect() {
                1
            } else if stage.has_tee() {
                if let Some(branches) = frontier.filter(|&b| b > 1) {
                    result.add_error(&format!(
                        "Stage {}: tee needs a single upstream branch, but stage {} produces {}",
                        position, idx, branches
                    ));
                }
                1
            } else {
                match frontier {
                    None => width,
                    Some(_) if after_tee => width,
                    Some(branches) if width == branches => width,
                    Some(branches) if width == 1 => branches,
                    Some(branches) => {
                        let hint = if branches == 1 {
                            " (add a 'tee' stage to fan out)".to_string()
                        } else {
                            format!(" (use 1 or {} elements)", branches)
                        };
                        result.add_error(&format!(
                            "Stage {} has {} elements but stage {} produces {} branch(es){}",
                            position, width, idx, branches, hint
                        ));
                        width
                    }
                }
            };

            frontier = Some(out_width);
            after_tee = stage.has_tee();
        }
    }
}

/// Result of pipeline validation
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }

    pub fn add_warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }

    /// Fold another result into this one
    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// All errors as one message, `None` when valid
    pub fn error(&self) -> Option<String> {
        (!self.errors.is_empty()).then(|| self.errors.join("; "))
    }

    /// Convert into an error carrying every message verbatim
    pub fn into_result(self) -> ConvpipeResult<()> {
        match self.error() {
            None => Ok(()),
            Some(reason) => Err(ConvpipeError::InvalidPipeline {
                reason,
                help: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn stage(targets: &[&str]) -> PipelineStage {
        PipelineStage::new(targets.iter().map(|t| StageElement::new(*t)).collect())
    }

    fn pipeline(source: &str, stages: &[&[&str]]) -> Pipeline {
        Pipeline::new(source, stages.iter().map(|s| stage(s)).collect())
    }

    #[test]
    fn test_validate_empty_pipeline() {
        let result = pipeline("in.png", &[]).validate();
        assert!(!result.is_valid());
        assert!(result.errors[0].contains("no stages"));
    }

    #[test]
    fn test_validate_empty_stage() {
        let result = pipeline("in.png", &[&["jpg"], &[]]).validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.contains("Stage 2 is empty")));
    }

    #[test]
    fn test_collect_must_be_alone() {
        let result = pipeline("in.zip", &[&["tee"], &["jpg", "png"], &["collect", "zip"]]).validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.contains("only element")));

        let result = pipeline("in.zip", &[&["tee"], &["collect", "jpg"]]).validate();
        assert!(!result.is_valid());
    }

    #[test]
    fn test_tee_then_collect_is_valid() {
        let result = pipeline("in.zip", &[&["tee"], &["jpg", "png"], &["collect"], &["zip"]]).validate();
        assert!(result.is_valid(), "{:?}", result.errors);
    }

    #[test]
    fn test_collect_first_with_directory() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().to_str().unwrap();
        let result = pipeline(source, &[&["collect"], &["tar-gz"]]).validate();
        assert!(result.is_valid(), "{:?}", result.errors);
    }

    #[test]
    fn test_collect_first_with_file_fails() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("test.txt");
        std::fs::write(&file, "content").unwrap();

        let result = pipeline(file.to_str().unwrap(), &[&["collect"]]).validate();
        assert!(!result.is_valid());
        assert!(result.error().unwrap().contains("directory"));
    }

    #[test]
    fn test_collect_first_with_empty_source_fails() {
        let result = pipeline("", &[&["collect"]]).validate();
        assert!(!result.is_valid());
        assert!(result.error().unwrap().contains("directory"));
    }

    #[test]
    fn test_width_rules() {
        // one-to-one pairing
        assert!(pipeline("in", &[&["tee"], &["a", "b"], &["c", "d"]]).validate().is_valid());
        // width 1 applied to each branch
        assert!(pipeline("in", &[&["tee"], &["a", "b"], &["zip"]]).validate().is_valid());
        // stage 0 may be wide; each element reads the source
        assert!(pipeline("in", &[&["a", "b"], &["collect"]]).validate().is_valid());

        let result = pipeline("in", &[&["tee"], &["a", "b"], &["c", "d", "e"]]).validate();
        assert!(!result.is_valid());
        assert!(result.errors[0].contains("Stage 3 has 3 elements"));

        let result = pipeline("in", &[&["jpg"], &["a", "b"]]).validate();
        assert!(!result.is_valid());
        assert!(result.errors[0].contains("tee"));
    }

    #[test]
    fn test_tee_needs_single_branch() {
        let result = pipeline("in", &[&["tee"], &["a", "b"], &["tee"], &["c"]]).validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.contains("single upstream branch")));

        let result = pipeline("in", &[&["tee", "jpg"], &["a"]]).validate();
        assert!(!result.is_valid());
    }

    #[test]
    fn test_trailing_tee_warns() {
        let result = pipeline("in", &[&["jpg"], &["tee"]]).validate();
        assert!(result.is_valid());
        assert!(result.has_warnings());
    }

    #[test]
    fn test_clipboard_anywhere() {
        assert!(pipeline("in.png", &[&["clipboard"]]).validate().is_valid());
        assert!(pipeline("in.png", &[&["jpg"], &["clipboard"], &["webp"]]).validate().is_valid());
        assert!(pipeline("in.png", &[&["tee"], &["clipboard", "jpg"]]).validate().is_valid());
    }

    #[test]
    fn test_into_result_carries_message() {
        let err = pipeline("", &[&["collect"]]).validate().into_result().unwrap_err();
        assert!(err.to_string().contains("directory"));
    }
}
