// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convpipe contributors

//! Run command - execute a pipeline

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;
use std::sync::Arc;

use super::RunArgs;
use crate::errors::ConvpipeError;
use crate::executors::ProcessRunner;
use crate::output::{format_duration, ConsoleProgress};
use crate::pipeline::{ExecutionOptions, GraphExecutor, PipelineParser};

/// Run the pipeline
pub async fn run(args: RunArgs, config_path: Option<PathBuf>, verbose: bool) -> Result<()> {
    let mut config = super::load_config(config_path.as_deref())?;
    config.set_defaults(args.set.clone());
    if let Some(jobs) = args.jobs {
        config.max_parallel = jobs;
    }

    let pipeline = PipelineParser::new().parse(&args.pipeline, &args.source, &config.default_options)?;

    if !pipeline.reads_clipboard() && !pipeline.source.exists() {
        return Err(ConvpipeError::InputNotFound {
            path: args.source.clone(),
        }
        .into());
    }

    if verbose && !args.json {
        eprintln!("{} {}", "Pipeline:".bold(), pipeline.to_expression());
    }

    let executor = GraphExecutor::new(Arc::new(ProcessRunner::from_config(&config)))
        .with_progress(Arc::new(ConsoleProgress::new(args.quiet || args.json)))
        .with_options(ExecutionOptions::from_config(&config));

    let mut report = executor.run_pipeline(&pipeline).await?;

    let copied = report.copy_outputs(&args.output)?;

    if args.json {
        let mut json = report.to_json();
        json["outputs"] = serde_json::json!(copied
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>());
        let rendered = serde_json::to_string_pretty(&json).map_err(ConvpipeError::from)?;
        println!("{}", rendered);
    } else if !args.quiet {
        for failure in report.failures() {
            match failure.node_error() {
                Some(err) => eprintln!("  {} {}", "✗".red(), err.to_string().red()),
                None => eprintln!(
                    "  {} Stage {} ('{}') {}: {}",
                    "✗".red(),
                    failure.stage_idx + 1,
                    failure.target.bold(),
                    "skipped".yellow(),
                    failure.error.as_deref().unwrap_or("unknown reason").dimmed()
                ),
            }
        }

        for path in &copied {
            println!("  {} {}", "✓".green(), path.display());
        }

        let summary = format!("Finished in {}", format_duration(report.duration));
        if report.success() {
            println!("{}", summary.green().bold());
        } else {
            println!("{}", summary.yellow().bold());
        }
    }

    if let Some(fatal) = report.fatal.take() {
        return Err(fatal.into());
    }

    let failed = report.failures().len();
    if failed > 0 {
        return Err(miette::miette!(
            "{} of {} node(s) did not succeed",
            failed,
            report.results.len()
        ));
    }

    Ok(())
}
