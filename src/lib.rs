// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convpipe contributors

//! # convpipe - File Conversion Pipelines
//!
//! `convpipe` routes a source file through chains of named conversions.
//! Conversions are provided by plugin executables; a handful of builtins
//! (`tee`, `collect`, `clipboard`, passthrough) shape the flow.
//!
//! ## Features
//!
//! - **Pipeline expressions** - `|` separates stages, `,` separates parallel elements
//! - **Fan-out and fan-in** - `tee` broadcasts, `collect` gathers
//! - **Parallel execution** - independent nodes run concurrently, bounded by a limit
//! - **Scatter outputs** - a node may emit many files that flow downstream
//!
//! ## Quick Start
//!
//! ```bash
//! # Convert one file
//! convpipe run "jpg" photo.heic
//!
//! # Fan out, gather and archive
//! convpipe run "tee | jpg, webp | collect | zip" photo.png -o out/
//!
//! # Show the execution graph
//! convpipe graph "tee | jpg, png" photo.heic -f mermaid
//! ```

pub mod builtins;
pub mod cli;
pub mod config;
pub mod errors;
pub mod executors;
pub mod output;
pub mod pipeline;

// Re-export commonly used types
pub use config::EngineConfig;
pub use errors::{ConvpipeError, ConvpipeResult};
pub use executors::{NodeResult, NodeRunner, ProcessRunner};
pub use pipeline::{ExecutionGraph, GraphExecutor, Pipeline, PipelineParser};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
