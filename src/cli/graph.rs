// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convpipe contributors

//! Graph command - show the execution graph of a pipeline

use miette::Result;
use std::path::PathBuf;

use super::GraphFormat;
use crate::pipeline::{ExecutionGraph, PipelineParser};

/// Run the graph command
pub async fn run(
    pipeline_text: String,
    source: PathBuf,
    format: GraphFormat,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = super::load_config(config_path.as_deref())?;
    let pipeline = PipelineParser::new().parse(&pipeline_text, &source, &config.default_options)?;

    let graph = ExecutionGraph::build_from_pipeline(&pipeline)?;

    let output = match format {
        GraphFormat::Text => graph.to_text(),
        GraphFormat::Dot => graph.to_dot(),
        GraphFormat::Mermaid => graph.to_mermaid(),
    };

    print!("{}", output);

    Ok(())
}
