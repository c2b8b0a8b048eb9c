// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convpipe contributors

//! Pipeline expression parser
//!
//! ```text
//! tee | jpg --quality 90, png | collect | zip
//! ```
//!
//! - Stages are separated by `|`, elements within a stage by `,`
//! - Each element is a target followed by `--name value` or bare `--flag`
//!   options (`--name=value` is accepted too)
//! - Values may be single- or double-quoted; separators inside quotes do
//!   not split
//! - Whitespace around separators is insignificant

use std::path::Path;

use tracing::{debug, warn};

use crate::errors::{ConvpipeError, ConvpipeResult};
use crate::pipeline::{Options, Pipeline, PipelineStage, StageElement};

/// Value stored for a bare `--flag`
pub const FLAG_VALUE: &str = "true";

/// Parser for pipeline expressions
#[derive(Debug, Default, Clone, Copy)]
pub struct PipelineParser;

impl PipelineParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse `text` into a validated pipeline reading from `source`
    ///
    /// `default_options` are merged into every element; options written on
    /// the element win. Nothing is returned unless the pipeline is valid.
    pub fn parse(
        &self,
        text: &str,
        source: &Path,
        default_options: &Options,
    ) -> ConvpipeResult<Pipeline> {
        if text.trim().is_empty() {
            return Err(ConvpipeError::parse("pipeline expression is empty"));
        }

        let mut stages = Vec::new();
        for (idx, stage_text) in split_unquoted(text, '|')?.iter().enumerate() {
            stages.push(self.parse_stage(idx + 1, stage_text, default_options)?);
        }

        let pipeline = Pipeline::new(source, stages);

        let validation = pipeline.validate();
        for warning in &validation.warnings {
            warn!("{}", warning);
        }
        validation.into_result()?;

        debug!(
            stages = pipeline.stages.len(),
            elements = pipeline.element_count(),
            "parsed pipeline '{}'",
            pipeline.to_expression()
        );

        Ok(pipeline)
    }

    fn parse_stage(
        &self,
        position: usize,
        stage_text: &str,
        default_options: &Options,
    ) -> ConvpipeResult<PipelineStage> {
        // Left empty on purpose; the validator reports empty stages
        if stage_text.trim().is_empty() {
            return Ok(PipelineStage::default());
        }

        let mut elements = Vec::new();
        for element_text in split_unquoted(stage_text, ',')? {
            if element_text.trim().is_empty() {
                return Err(ConvpipeError::parse(format!(
                    "stage {} has an empty element",
                    position
                )));
            }
            elements.push(self.parse_element(position, &element_text, default_options)?);
        }

        Ok(PipelineStage::new(elements))
    }

    fn parse_element(
        &self,
        position: usize,
        element_text: &str,
        default_options: &Options,
    ) -> ConvpipeResult<StageElement> {
        let tokens = tokenize(element_text)?;
        let mut tokens = tokens.into_iter().peekable();

        let target = match tokens.next() {
            Some(token) if !token.starts_with("--") => token,
            _ => {
                return Err(ConvpipeError::parse(format!(
                    "element '{}' in stage {} has no target",
                    element_text.trim(),
                    position
                )))
            }
        };

        let mut options = default_options.clone();
        while let Some(token) = tokens.next() {
            let Some(name) = token.strip_prefix("--") else {
                return Err(ConvpipeError::parse(format!(
                    "unexpected token '{}' after '{}' in stage {} (options start with '--')",
                    token, target, position
                )));
            };

            if let Some((name, value)) = name.split_once('=') {
                check_option_name(name, &target, position)?;
                options.insert(name.to_string(), value.to_string());
                continue;
            }

            check_option_name(name, &target, position)?;
            let value = match tokens.peek() {
                Some(next) if !next.starts_with("--") => tokens.next().unwrap_or_default(),
                _ => FLAG_VALUE.to_string(),
            };
            options.insert(name.to_string(), value);
        }

        Ok(StageElement::with_options(target, options))
    }
}

fn check_option_name(name: &str, target: &str, position: usize) -> ConvpipeResult<()> {
    if name.is_empty() {
        return Err(ConvpipeError::parse(format!(
            "option without a name after '{}' in stage {}",
            target, position
        )));
    }
    Ok(())
}

/// Split on `separator` outside of quotes
fn split_unquoted(text: &str, separator: char) -> ConvpipeResult<Vec<String>> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in text.chars() {
        match quote {
            Some(q) if c == q => {
                quote = None;
                current.push(c);
            }
            Some(_) => current.push(c),
            None if c == '\'' || c == '"' => {
                quote = Some(c);
                current.push(c);
            }
            None if c == separator => parts.push(std::mem::take(&mut current)),
            None => current.push(c),
        }
    }

    if let Some(q) = quote {
        return Err(ConvpipeError::parse(format!("unterminated {} quote", q)));
    }

    parts.push(current);
    Ok(parts)
}

/// Split an element into whitespace-separated tokens, stripping quotes
fn tokenize(text: &str) -> ConvpipeResult<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;

    for c in text.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '\'' || c == '"' => {
                quote = Some(c);
                in_token = true;
            }
            None if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            None => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if let Some(q) = quote {
        return Err(ConvpipeError::parse(format!("unterminated {} quote", q)));
    }
    if in_token {
        tokens.push(current);
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::Builtin;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn parse(text: &str) -> ConvpipeResult<Pipeline> {
        PipelineParser::new().parse(text, Path::new("/path/to/input.zip"), &Options::new())
    }

    #[test]
    fn test_collect_as_stage() {
        let pipeline = parse("decompress | png | collect | zip").unwrap();
        assert_eq!(pipeline.stages.len(), 4);
        assert_eq!(pipeline.stages[0].elements[0].target(), "decompress");
        assert_eq!(pipeline.stages[1].elements[0].target(), "png");
        assert!(pipeline.stages[2].elements[0].is_collect());
        assert!(pipeline.stages[2].has_collect());
        assert_eq!(pipeline.stages[3].elements[0].target(), "zip");
    }

    #[test]
    fn test_collect_after_tee() {
        let pipeline = parse("tee | jpg, png | collect | zip").unwrap();
        assert_eq!(pipeline.stages.len(), 4);
        assert!(pipeline.stages[0].has_tee());
        assert_eq!(pipeline.stages[1].elements.len(), 2);
        assert!(pipeline.stages[2].has_collect());
    }

    #[test]
    fn test_stage_and_element_counts_follow_separators() {
        for text in ["jpg", "tee | a, b", "tee | a, b, c | x, y, z | collect", "_ | echo"] {
            let pipeline = parse(text).unwrap();
            let stage_texts: Vec<&str> = text.split('|').collect();
            assert_eq!(pipeline.stages.len(), stage_texts.len(), "{text}");
            for (stage, stage_text) in pipeline.stages.iter().zip(stage_texts) {
                assert_eq!(stage.elements.len(), stage_text.split(',').count(), "{text}");
            }
        }
    }

    #[test]
    fn test_whitespace_insignificant() {
        let tight = parse("tee|jpg,png|collect").unwrap();
        let loose = parse("  tee  |  jpg ,   png |collect  ").unwrap();
        assert_eq!(tight, loose);
    }

    #[test]
    fn test_builtin_names_case_insensitive() {
        let pipeline = parse("TEE | Collect").unwrap();
        assert_eq!(pipeline.stages[0].elements[0].builtin(), Builtin::Tee);
        assert_eq!(pipeline.stages[1].elements[0].builtin(), Builtin::Collect);
        // target text is kept as written
        assert_eq!(pipeline.stages[1].elements[0].target(), "Collect");

        let pipeline = parse("collector").unwrap();
        assert_eq!(pipeline.stages[0].elements[0].builtin(), Builtin::None);
    }

    #[test]
    fn test_options() {
        let pipeline = parse("jpg --quality 90 --strip --size=800x600").unwrap();
        let elem = &pipeline.stages[0].elements[0];
        assert_eq!(elem.option("quality"), Some("90"));
        assert_eq!(elem.option("strip"), Some(FLAG_VALUE));
        assert_eq!(elem.option("size"), Some("800x600"));
    }

    #[test]
    fn test_bare_flag_before_option() {
        let pipeline = parse("jpg --strip --quality 80").unwrap();
        let elem = &pipeline.stages[0].elements[0];
        assert!(elem.flag("strip"));
        assert_eq!(elem.option("quality"), Some("80"));
    }

    #[test]
    fn test_options_are_per_element() {
        let pipeline = parse("tee | jpg --quality 90, png --compression 9").unwrap();
        let jpg = &pipeline.stages[1].elements[0];
        let png = &pipeline.stages[1].elements[1];
        assert_eq!(jpg.option("quality"), Some("90"));
        assert_eq!(jpg.option("compression"), None);
        assert_eq!(png.option("compression"), Some("9"));
    }

    #[test]
    fn test_default_options_merge() {
        let mut defaults = Options::new();
        defaults.insert("quality".into(), "75".into());
        defaults.insert("force".into(), "true".into());

        let pipeline = PipelineParser::new()
            .parse("tee | jpg --quality 95, webp", Path::new("in.png"), &defaults)
            .unwrap();
        let jpg = &pipeline.stages[1].elements[0];
        let webp = &pipeline.stages[1].elements[1];
        assert_eq!(jpg.option("quality"), Some("95"));
        assert_eq!(webp.option("quality"), Some("75"));
        assert!(webp.flag("force"));
    }

    #[test]
    fn test_quoted_values_keep_separators() {
        let pipeline = parse("tee | pdf --title 'a, b | c', txt").unwrap();
        assert_eq!(pipeline.stages.len(), 2);
        assert_eq!(pipeline.stages[1].elements.len(), 2);
        assert_eq!(pipeline.stages[1].elements[0].option("title"), Some("a, b | c"));
    }

    #[test]
    fn test_collect_first_stage_with_options() {
        let tmp = TempDir::new().unwrap();
        let pipeline = PipelineParser::new()
            .parse("collect --glob '*.heic' --recursive", tmp.path(), &Options::new())
            .unwrap();
        assert_eq!(pipeline.stages.len(), 1);
        assert!(pipeline.stages[0].has_collect());

        let elem = &pipeline.stages[0].elements[0];
        assert_eq!(elem.option("glob"), Some("*.heic"));
        assert!(elem.flag("recursive"));
    }

    #[test]
    fn test_collect_first_stage_requires_directory() {
        let err = parse("collect").unwrap_err();
        assert!(err.to_string().contains("directory"));
    }

    #[test]
    fn test_collect_with_other_elements_fails() {
        assert!(parse("tee | jpg, png | collect, zip").is_err());
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse(""), Err(ConvpipeError::Parse { .. })));
        assert!(matches!(parse("   "), Err(ConvpipeError::Parse { .. })));
        assert!(matches!(parse("tee | jpg,,png"), Err(ConvpipeError::Parse { .. })));
        assert!(matches!(parse("--quality 90"), Err(ConvpipeError::Parse { .. })));
        assert!(matches!(parse("jpg extra"), Err(ConvpipeError::Parse { .. })));
        assert!(matches!(parse("jpg --"), Err(ConvpipeError::Parse { .. })));
        assert!(matches!(parse("jpg --title 'open"), Err(ConvpipeError::Parse { .. })));
    }

    #[test]
    fn test_empty_stage_is_validation_error() {
        let err = parse("jpg || png").unwrap_err();
        assert!(matches!(err, ConvpipeError::InvalidPipeline { .. }));
        assert!(err.to_string().contains("Stage 2 is empty"));
    }

    #[test]
    fn test_source_is_kept() {
        let pipeline = parse("jpg").unwrap();
        assert_eq!(pipeline.source, PathBuf::from("/path/to/input.zip"));
    }

    #[test]
    fn test_rendered_expression_parses_back() {
        let mut pipeline = parse("tee | pdf --title x, txt --sep y").unwrap();
        let title = "say \"hi\", it's | fine";
        pipeline.stages[1].elements[0].set_option("title", title);
        pipeline.stages[1].elements[1].set_option("sep", "a\"b");

        let reparsed = parse(&pipeline.to_expression()).unwrap();
        assert_eq!(reparsed.stages[1].elements[0].option("title"), Some(title));
        assert_eq!(reparsed.stages[1].elements[1].option("sep"), Some("a\"b"));
    }
}
