// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convpipe contributors

//! Validate command - check a pipeline expression

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;

use crate::pipeline::{ExecutionGraph, PipelineParser};

/// Run the validate command
pub async fn run(
    pipeline_text: String,
    source: PathBuf,
    config_path: Option<PathBuf>,
    verbose: bool,
) -> Result<()> {
    let config = super::load_config(config_path.as_deref())?;

    let pipeline = match PipelineParser::new().parse(&pipeline_text, &source, &config.default_options) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("  {} {}", "✗".red(), pipeline_text);
            return Err(e.into());
        }
    };

    let validation = pipeline.validate();
    if validation.has_warnings() {
        println!("{}:", "Warnings".yellow().bold());
        for warning in &validation.warnings {
            println!("  {} {}", "⚠".yellow(), warning);
        }
        println!();
    }

    if verbose {
        let graph = ExecutionGraph::build_from_pipeline(&pipeline)?;
        println!("{}:", "Pipeline summary".bold());
        println!("  Source: {}", pipeline.source.display());
        println!("  Stages: {}", pipeline.stages.len());
        for (idx, stage) in pipeline.stages.iter().enumerate() {
            println!("    {}. {}", idx + 1, stage.describe());
        }
        println!("  Nodes: {}", graph.len());
        println!();
    }

    println!("{}", "Pipeline is valid!".green().bold());
    Ok(())
}
