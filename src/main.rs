// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convpipe contributors

//! convpipe - file conversion pipelines
//!
//! Route a file through named conversions, in parallel where the pipeline
//! fans out.

use clap::Parser;
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use convpipe::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_filter = if cli.verbose {
        "convpipe=debug"
    } else {
        "convpipe=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    // Dispatch to command handlers
    match cli.command {
        Commands::Run(args) => convpipe::cli::run::run(args, cli.config, cli.verbose).await,
        Commands::Validate { pipeline, source } => {
            convpipe::cli::validate::run(pipeline, source, cli.config, cli.verbose).await
        }
        Commands::Graph {
            pipeline,
            source,
            format,
        } => convpipe::cli::graph::run(pipeline, source, format, cli.config).await,
    }
}
