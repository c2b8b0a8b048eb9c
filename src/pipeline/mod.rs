// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convpipe contributors

//! Pipelines: text to graph to results
//!
//! A pipeline expression is parsed into a [`Pipeline`], checked by the
//! [`PipelineValidator`], turned into an [`ExecutionGraph`] and run by the
//! [`GraphExecutor`].

mod dag;
mod definition;
mod executor;
mod parser;
mod validation;

pub use dag::{ExecutionGraph, ExecutionNode};
pub use definition::*;
pub use executor::{ExecutionOptions, ExecutionReport, GraphExecutor, BUILTIN_PLUGIN};
pub use parser::{PipelineParser, FLAG_VALUE};
pub use validation::{PipelineValidator, ValidationResult};
