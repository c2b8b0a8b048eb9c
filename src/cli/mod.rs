// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convpipe contributors

//! CLI command definitions and handlers
//!
//! Defines the command-line interface for convpipe.

pub mod graph;
pub mod run;
pub mod validate;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::config::EngineConfig;

/// File conversion pipelines
///
/// Route a file through a chain of conversions, fanning out with `tee` and
/// gathering with `collect`.
#[derive(Parser, Debug)]
#[clap(
    name = "convpipe",
    version,
    about = "Run files through conversion pipelines",
    long_about = None,
    after_help = "Examples:\n\
        convpipe run \"jpg\" photo.heic                        Convert one file\n\
        convpipe run \"tee | jpg, webp | collect | zip\" x.png  Fan out, gather, archive\n\
        convpipe run \"collect --glob '*.heic' | zip\" album/   Archive matching files\n\
        convpipe graph \"tee | jpg, png\" photo.heic -f dot     Show the execution graph\n\n\
        Pipeline syntax: stages are separated by '|', parallel elements by ','.\n\
        Options follow their target as '--name value' or a bare '--flag'."
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (TOML or YAML)
    #[clap(short, long, global = true, value_name = "FILE", env = "CONVPIPE_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a pipeline on a source
    Run(RunArgs),

    /// Check a pipeline without running it
    Validate {
        /// Pipeline expression
        pipeline: String,

        /// Source file or directory (or 'clipboard')
        source: PathBuf,
    },

    /// Show the execution graph of a pipeline
    Graph {
        /// Pipeline expression
        pipeline: String,

        /// Source file or directory (or 'clipboard')
        source: PathBuf,

        /// Output format
        #[clap(short, long, default_value = "text")]
        format: GraphFormat,
    },
}

/// Arguments of `convpipe run`
#[derive(clap::Args, Debug, Clone)]
pub struct RunArgs {
    /// Pipeline expression, e.g. "tee | jpg, png | collect"
    pub pipeline: String,

    /// Source file or directory (or 'clipboard')
    pub source: PathBuf,

    /// Directory receiving the final outputs
    #[clap(short, long, value_name = "DIR", default_value = ".")]
    pub output: PathBuf,

    /// Default option for every element (repeatable)
    #[clap(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub set: Vec<(String, String)>,

    /// Maximum number of nodes running at once
    #[clap(short = 'j', long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Print the run report as JSON
    #[clap(long)]
    pub json: bool,

    /// Suppress progress output
    #[clap(short, long)]
    pub quiet: bool,
}

/// Graph output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphFormat {
    Text,
    Dot,
    Mermaid,
}

impl std::str::FromStr for GraphFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "dot" => Ok(Self::Dot),
            "mermaid" => Ok(Self::Mermaid),
            _ => Err(format!("Unknown graph format: {}", s)),
        }
    }
}

/// Parse `KEY=VALUE`
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().trim_start_matches("--").to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

/// Load configuration for a command
pub fn load_config(path: Option<&Path>) -> miette::Result<EngineConfig> {
    Ok(EngineConfig::load(path)?)
}
