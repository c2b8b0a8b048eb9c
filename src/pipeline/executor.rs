// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convpipe contributors

//! Graph executor
//!
//! Runs an [`ExecutionGraph`] with as much concurrency as its edges allow.
//! A node starts once every predecessor has a result. Builtins run
//! in-process; everything else goes to the [`NodeRunner`].
//!
//! Failure handling:
//! - a node-local failure marks its descendants skipped and leaves
//!   unrelated branches running
//! - an `Err` the runner marks fatal (see [`ConvpipeError::is_fatal`])
//!   cancels the nodes that have not started and reports them skipped;
//!   any other `Err` fails only its own node

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn, Instrument};

use crate::builtins::{copy_tree, Builtin, Clipboard, Collect, Passthrough, Tee};
use crate::config::EngineConfig;
use crate::errors::{ConvpipeError, ConvpipeResult};
use crate::executors::{NodeRequest, NodeResult, NodeRunner};
use crate::output::{ProgressReporter, TracingProgress};
use crate::pipeline::{is_clipboard_source, ExecutionGraph, ExecutionNode, Pipeline};

/// Name reported as `plugin_used` for in-process nodes
pub const BUILTIN_PLUGIN: &str = "builtin";

/// Graph execution options
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    /// Upper bound on concurrently running nodes (0 = available parallelism)
    pub max_parallel: usize,
    /// Root for per-node work directories; a temporary one when unset
    pub work_dir: Option<PathBuf>,
}

impl ExecutionOptions {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            max_parallel: config.max_parallel,
            work_dir: config.temp_dir.clone(),
        }
    }

    fn parallelism(&self) -> usize {
        match self.max_parallel {
            0 => std::thread::available_parallelism().map_or(4, |n| n.get()),
            n => n,
        }
    }
}

/// Outcome of a graph run
#[derive(Debug)]
pub struct ExecutionReport {
    /// One result per node, indexed by node id
    pub results: Vec<NodeResult>,
    /// Nodes whose outputs are the pipeline's outputs
    pub terminal_nodes: Vec<usize>,
    /// Total execution time
    pub duration: Duration,
    /// Error that stopped the run early
    pub fatal: Option<ConvpipeError>,
    work_root: PathBuf,
    // Held so the work directory lives as long as the report
    _temp_dir: Option<TempDir>,
}

impl ExecutionReport {
    /// Whether every node succeeded and nothing was cancelled
    pub fn success(&self) -> bool {
        self.fatal.is_none() && self.results.iter().all(NodeResult::is_success)
    }

    pub fn result(&self, id: usize) -> Option<&NodeResult> {
        self.results.get(id)
    }

    pub fn terminal_results(&self) -> Vec<&NodeResult> {
        self.terminal_nodes
            .iter()
            .filter_map(|&id| self.results.get(id))
            .collect()
    }

    /// Nodes that failed or were skipped
    pub fn failures(&self) -> Vec<&NodeResult> {
        self.results.iter().filter(|r| !r.is_success()).collect()
    }

    /// Files produced by successful terminal nodes
    pub fn final_outputs(&self) -> Vec<PathBuf> {
        self.terminal_results()
            .into_iter()
            .filter(|r| r.is_success())
            .flat_map(NodeResult::output_paths)
            .collect()
    }

    /// Root of the per-node work directories
    pub fn work_dir(&self) -> &Path {
        &self.work_root
    }

    /// Copy the final outputs into `dest`, returning the copied paths
    ///
    /// Outputs keep their file name. When two branches produce the same
    /// name, later ones are prefixed with their node id (`0002_photo.jpg`).
    /// A file reached through several branches is copied once.
    pub fn copy_outputs(&self, dest: &Path) -> ConvpipeResult<Vec<PathBuf>> {
        std::fs::create_dir_all(dest)?;

        let mut copied = Vec::new();
        let mut seen = HashSet::new();
        let mut used_names = HashSet::new();

        for result in self.terminal_results().into_iter().filter(|r| r.is_success()) {
            for output in result.output_paths() {
                if !seen.insert(output.clone()) {
                    continue;
                }
                let Some(name) = output.file_name() else {
                    continue;
                };
                let name = unique_name(&name.to_string_lossy(), result.node_id, &mut used_names);

                let target = dest.join(name);
                if !same_file(&output, &target) {
                    copy_tree(&output, &target)?;
                }
                copied.push(target);
            }
        }
        Ok(copied)
    }

    /// JSON summary of the run
    pub fn to_json(&self) -> serde_json::Value {
        let outputs: Vec<String> = self
            .final_outputs()
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        serde_json::json!({
            "success": self.success(),
            "duration_ms": self.duration.as_millis() as u64,
            "error": self.fatal.as_ref().map(|e| e.to_string()),
            "outputs": outputs,
            "results": self.results.iter().map(NodeResult::to_json).collect::<Vec<_>>(),
        })
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn unique_name(name: &str, node_id: usize, used: &mut HashSet<String>) -> String {
    let mut candidate = name.to_string();
    let mut attempt = 0;
    while used.contains(&candidate) {
        candidate = match attempt {
            0 => format!("{:04}_{}", node_id, name),
            n => format!("{:04}_{}_{}", node_id, n, name),
        };
        attempt += 1;
    }
    used.insert(candidate.clone());
    candidate
}

/// What a ready node will consume
#[derive(Debug)]
enum NodeInput {
    /// One file or directory
    Single(PathBuf),
    /// Every output of a scattering predecessor, one run each
    Map(Vec<PathBuf>),
    /// Ordered files gathered from all predecessors
    Gather(Vec<PathBuf>),
}

/// Decision taken for a node once its predecessors are done
enum Readiness {
    Run(NodeInput),
    Skip(String),
    Fail(String),
}

/// State shared with node tasks
struct TaskContext {
    runner: Arc<dyn NodeRunner>,
    progress: Arc<dyn ProgressReporter>,
    clipboard: Clipboard,
    semaphore: Arc<Semaphore>,
    cancelled: AtomicBool,
    work_root: PathBuf,
    total: usize,
}

/// Executes execution graphs
pub struct GraphExecutor {
    runner: Arc<dyn NodeRunner>,
    progress: Arc<dyn ProgressReporter>,
    clipboard: Clipboard,
    options: ExecutionOptions,
}

impl GraphExecutor {
    /// Create an executor delegating plugin nodes to `runner`
    pub fn new(runner: Arc<dyn NodeRunner>) -> Self {
        Self {
            runner,
            progress: Arc::new(TracingProgress),
            clipboard: Clipboard::system(),
            options: ExecutionOptions::default(),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_clipboard(mut self, clipboard: Clipboard) -> Self {
        self.clipboard = clipboard;
        self
    }

    pub fn with_options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }

    /// Build the graph for `pipeline` and run it
    pub async fn run_pipeline(&self, pipeline: &Pipeline) -> ConvpipeResult<ExecutionReport> {
        let graph = ExecutionGraph::build_from_pipeline(pipeline)?;
        self.run(&graph).await
    }

    /// Run every node of `graph`
    ///
    /// Returns `Err` only when the run cannot start (work directory or
    /// clipboard source). Everything after that is reported per node.
    pub async fn run(&self, graph: &ExecutionGraph) -> ConvpipeResult<ExecutionReport> {
        let start = Instant::now();

        let (work_root, temp_dir) = match &self.options.work_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                (dir.clone(), None)
            }
            None => {
                let temp = tempfile::Builder::new().prefix("convpipe-").tempdir()?;
                (temp.path().to_path_buf(), Some(temp))
            }
        };

        let source = self.resolve_source(graph, &work_root).await?;

        let ctx = Arc::new(TaskContext {
            runner: Arc::clone(&self.runner),
            progress: Arc::clone(&self.progress),
            clipboard: self.clipboard.clone(),
            semaphore: Arc::new(Semaphore::new(self.options.parallelism())),
            cancelled: AtomicBool::new(false),
            work_root: work_root.clone(),
            total: graph.len(),
        });

        debug!(nodes = graph.len(), work_dir = %work_root.display(), "running pipeline");

        let mut scheduler = Scheduler::new(graph, source);
        let fatal = scheduler.run(&ctx).await;

        let results = scheduler.finish();
        let duration = start.elapsed();

        debug!(
            duration_ms = duration.as_millis() as u64,
            failed = results.iter().filter(|r| !r.is_success()).count(),
            "pipeline finished"
        );

        Ok(ExecutionReport {
            results,
            terminal_nodes: graph.terminal_nodes(),
            duration,
            fatal,
            work_root,
            _temp_dir: temp_dir,
        })
    }

    /// Source file for nodes without predecessors
    async fn resolve_source(&self, graph: &ExecutionGraph, work_root: &Path) -> ConvpipeResult<PathBuf> {
        let source = graph.source().to_path_buf();
        if !is_clipboard_source(&source) {
            return Ok(source);
        }

        let clipboard = self.clipboard.clone();
        let dir = work_root.join("clipboard");
        let read = tokio::task::spawn_blocking(move || clipboard.read_to_file(&dir, None))
            .await
            .map_err(|e| ConvpipeError::Clipboard {
                message: e.to_string(),
            })??;

        info!(file = %read.file.display(), format = %read.detected_format, "read pipeline source from clipboard");
        Ok(read.file)
    }
}

/// Dependency bookkeeping for one run
struct Scheduler<'g> {
    graph: &'g ExecutionGraph,
    source: PathBuf,
    results: Vec<Option<NodeResult>>,
    /// Predecessors each node still waits for
    pending: Vec<usize>,
    ready: VecDeque<usize>,
}

impl<'g> Scheduler<'g> {
    fn new(graph: &'g ExecutionGraph, source: PathBuf) -> Self {
        let pending: Vec<usize> = graph.nodes().iter().map(|n| n.input_nodes.len()).collect();
        let ready = graph
            .nodes()
            .iter()
            .filter(|n| n.input_nodes.is_empty())
            .map(|n| n.id)
            .collect();

        Self {
            graph,
            source,
            results: vec![None; graph.len()],
            pending,
            ready,
        }
    }

    /// Drive the graph to completion, returning the fatal error if any
    async fn run(&mut self, ctx: &Arc<TaskContext>) -> Option<ConvpipeError> {
        let mut tasks: JoinSet<(usize, ConvpipeResult<NodeResult>)> = JoinSet::new();
        let mut fatal: Option<ConvpipeError> = None;
        let graph = self.graph;

        loop {
            while let Some(id) = self.ready.pop_front() {
                let node = &graph.nodes()[id];

                if fatal.is_some() {
                    self.skip(ctx, node, "cancelled after a fatal error".to_string());
                    continue;
                }

                match self.readiness(node) {
                    Readiness::Skip(reason) => self.skip(ctx, node, reason),
                    Readiness::Fail(reason) => {
                        warn!(node = id, target = node.target(), "{}", reason);
                        ctx.progress.stage_started(id + 1, ctx.total, node.target());
                        ctx.progress.stage_completed(
                            id + 1,
                            ctx.total,
                            node.target(),
                            Duration::ZERO,
                            false,
                            Some(&reason),
                        );
                        let input = node.input.clone().unwrap_or_default();
                        self.complete(id, NodeResult::failure(node.target(), &input, reason));
                    }
                    Readiness::Run(input) => {
                        debug!(node = id, target = node.target(), "dispatching node");
                        let span = tracing::info_span!(
                            "node",
                            node = id,
                            stage = node.stage_idx + 1,
                            target = %node.target()
                        );
                        tasks.spawn(
                            execute_node(Arc::clone(ctx), node.clone(), input).instrument(span),
                        );
                    }
                }
            }

            let Some(joined) = tasks.join_next().await else {
                break;
            };

            match joined {
                Ok((id, Ok(result))) => self.complete(id, result),
                Ok((id, Err(err))) => {
                    let node = &graph.nodes()[id];
                    let input = node.input.clone().unwrap_or_default();
                    let cancelled = matches!(err, ConvpipeError::Cancelled { .. });

                    let result = if cancelled {
                        NodeResult::skipped(node.target(), &input, err.to_string())
                    } else {
                        NodeResult::failure(node.target(), &input, err.to_string())
                    };
                    self.complete(id, result);

                    if !err.is_fatal() {
                        warn!(node = id, target = node.target(), "node failed: {}", err);
                    } else if !cancelled && fatal.is_none() {
                        warn!(node = id, target = node.target(), "fatal error, cancelling remaining nodes: {}", err);
                        ctx.cancelled.store(true, Ordering::SeqCst);
                        fatal = Some(err);
                    }
                }
                Err(join_err) => {
                    // Which node panicked is unknown; it is filled in by finish()
                    warn!("node task aborted: {}", join_err);
                    ctx.cancelled.store(true, Ordering::SeqCst);
                    if fatal.is_none() {
                        fatal = Some(ConvpipeError::Cancelled {
                            reason: format!("a node task aborted: {}", join_err),
                        });
                    }
                }
            }
        }

        fatal
    }

    /// Record a result and release dependents that are now ready
    fn complete(&mut self, id: usize, result: NodeResult) {
        let stage_idx = self.graph.nodes()[id].stage_idx;
        self.results[id] = Some(result.at_node(id, stage_idx));
        for dependent in self.graph.dependents(id) {
            self.pending[dependent] -= 1;
            if self.pending[dependent] == 0 {
                self.ready.push_back(dependent);
            }
        }
    }

    fn skip(&mut self, ctx: &TaskContext, node: &ExecutionNode, reason: String) {
        debug!(node = node.id, target = node.target(), "skipping node: {}", reason);
        ctx.progress.stage_started(node.id + 1, ctx.total, node.target());
        ctx.progress.stage_completed(
            node.id + 1,
            ctx.total,
            node.target(),
            Duration::ZERO,
            false,
            Some(&reason),
        );
        let input = node.input.clone().unwrap_or_default();
        self.complete(node.id, NodeResult::skipped(node.target(), &input, reason));
    }

    /// Decide how a node with all predecessors done should proceed
    fn readiness(&self, node: &ExecutionNode) -> Readiness {
        if node.input_nodes.is_empty() {
            return Readiness::Run(NodeInput::Single(self.source.clone()));
        }

        for &pred in &node.input_nodes {
            if let Some(reason) = self.upstream_problem(pred) {
                return Readiness::Skip(reason);
            }
        }

        if node.is_collect() {
            let files: Vec<PathBuf> = node
                .input_nodes
                .iter()
                .filter_map(|&pred| self.results[pred].as_ref())
                .flat_map(NodeResult::output_paths)
                .collect();
            if files.is_empty() {
                return Readiness::Fail("collect received no files from upstream".into());
            }
            return Readiness::Run(NodeInput::Gather(files));
        }

        if node.input_nodes.len() > 1 {
            return Readiness::Fail(
                ConvpipeError::MissingInput {
                    node: node.id,
                    target: node.target().to_string(),
                    reason: format!("expects one predecessor, found {}", node.input_nodes.len()),
                }
                .to_string(),
            );
        }

        let pred = node.input_nodes[0];
        let Some(upstream) = self.results[pred].as_ref() else {
            return Readiness::Skip(format!("upstream node {} has no result", pred));
        };

        let mut paths = upstream.output_paths();
        if paths.is_empty() {
            return Readiness::Fail(
                ConvpipeError::MissingInput {
                    node: node.id,
                    target: node.target().to_string(),
                    reason: format!("upstream '{}' produced no output", upstream.target),
                }
                .to_string(),
            );
        }

        if !upstream.is_scatter() {
            return Readiness::Run(NodeInput::Single(paths.swap_remove(0)));
        }

        // Scatter: pair with siblings by position, or map when alone
        let siblings = self.graph.dependents(pred);
        if siblings.len() == 1 {
            return Readiness::Run(NodeInput::Map(paths));
        }
        if siblings.len() == paths.len() {
            let position = siblings.iter().position(|&s| s == node.id).unwrap_or(0);
            return Readiness::Run(NodeInput::Single(paths.swap_remove(position)));
        }

        Readiness::Fail(
            ConvpipeError::ScatterMismatch {
                node: node.id,
                target: node.target().to_string(),
                expected: siblings.len(),
                actual: paths.len(),
            }
            .to_string(),
        )
    }

    /// Reason a dependent cannot run, if the predecessor did not succeed
    fn upstream_problem(&self, pred: usize) -> Option<String> {
        let target = self.graph.nodes()[pred].target();
        match self.results[pred].as_ref() {
            Some(r) if r.is_success() => None,
            Some(r) if r.is_skipped() => Some(format!("upstream '{}' (node {}) was skipped", target, pred)),
            Some(r) => Some(format!(
                "upstream '{}' (node {}) failed: {}",
                target,
                pred,
                r.error.as_deref().unwrap_or("unknown error")
            )),
            None => Some(format!("upstream '{}' (node {}) did not run", target, pred)),
        }
    }

    /// Results in id order; nodes that never finished count as cancelled
    fn finish(self) -> Vec<NodeResult> {
        self.results
            .into_iter()
            .zip(self.graph.nodes())
            .map(|(result, node)| {
                result.unwrap_or_else(|| {
                    let input = node.input.clone().unwrap_or_default();
                    NodeResult::skipped(node.target(), &input, "cancelled").at_node(node.id, node.stage_idx)
                })
            })
            .collect()
    }
}

/// Body of a node task: wait for a slot, report progress, do the work
async fn execute_node(
    ctx: Arc<TaskContext>,
    node: ExecutionNode,
    input: NodeInput,
) -> (usize, ConvpipeResult<NodeResult>) {
    let id = node.id;

    let _permit = match Arc::clone(&ctx.semaphore).acquire_owned().await {
        Ok(permit) => permit,
        Err(e) => {
            return (
                id,
                Err(ConvpipeError::Cancelled {
                    reason: e.to_string(),
                }),
            )
        }
    };

    if ctx.cancelled.load(Ordering::SeqCst) {
        let reason = "cancelled after a fatal error".to_string();
        ctx.progress.stage_started(id + 1, ctx.total, node.target());
        ctx.progress
            .stage_completed(id + 1, ctx.total, node.target(), Duration::ZERO, false, Some(&reason));
        return (id, Err(ConvpipeError::Cancelled { reason }));
    }

    ctx.progress.stage_started(id + 1, ctx.total, node.target());
    let started = Instant::now();

    let work_dir = ctx.work_root.join(node_dir_name(&node));
    let outcome = match std::fs::create_dir_all(&work_dir) {
        Ok(()) => run_input(&ctx, &node, input, &work_dir).await,
        Err(e) => Err(e.into()),
    };

    let elapsed = started.elapsed();
    match &outcome {
        Ok(result) => ctx.progress.stage_completed(
            id + 1,
            ctx.total,
            node.target(),
            elapsed,
            result.is_success(),
            result.error.as_deref(),
        ),
        Err(err) => {
            let message = err.to_string();
            ctx.progress
                .stage_completed(id + 1, ctx.total, node.target(), elapsed, false, Some(&message))
        }
    }

    (id, outcome)
}

/// `node-0003-jpg`, unique per node
fn node_dir_name(node: &ExecutionNode) -> String {
    let target: String = node
        .target()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("node-{:04}-{}", node.id, target)
}

async fn run_input(
    ctx: &TaskContext,
    node: &ExecutionNode,
    input: NodeInput,
    work_dir: &Path,
) -> ConvpipeResult<NodeResult> {
    match input {
        NodeInput::Single(path) => run_single(ctx, node, path, work_dir.to_path_buf()).await,
        NodeInput::Gather(paths) => {
            let first = paths.first().cloned().unwrap_or_default();
            Ok(collect_result(node, &first, Collect::execute(&paths, work_dir)))
        }
        NodeInput::Map(paths) => {
            let display = paths.first().cloned().unwrap_or_default();
            let mut outputs = Vec::new();
            for (idx, path) in paths.into_iter().enumerate() {
                let item_dir = work_dir.join(format!("item-{:04}", idx));
                std::fs::create_dir_all(&item_dir)?;

                let result = run_single(ctx, node, path, item_dir).await?;
                if !result.is_success() {
                    let error = result.error.unwrap_or_else(|| "unknown error".into());
                    return Ok(NodeResult::failure(
                        node.target(),
                        &display,
                        format!("item {}: {}", idx, error),
                    )
                    .with_plugin(result.plugin_used));
                }
                outputs.extend(result.output_paths());
            }

            let plugin = if node.builtin().is_builtin() {
                BUILTIN_PLUGIN
            } else {
                ctx.runner.name()
            };
            Ok(NodeResult::scatter(node.target(), plugin, &display, outputs))
        }
    }
}

async fn run_single(
    ctx: &TaskContext,
    node: &ExecutionNode,
    input: PathBuf,
    work_dir: PathBuf,
) -> ConvpipeResult<NodeResult> {
    let target = node.target();

    match node.builtin() {
        Builtin::Tee => Ok(builtin_result(target, &input, Tee::execute(&input))),
        Builtin::Passthrough => Ok(builtin_result(target, &input, Passthrough::execute(&input))),
        Builtin::Collect => {
            let outcome = if input.is_dir() {
                Collect::execute_directory(
                    &input,
                    &work_dir,
                    node.element.flag("recursive"),
                    node.element.option("glob"),
                )
            } else {
                Collect::execute(std::slice::from_ref(&input), &work_dir)
            };
            Ok(collect_result(node, &input, outcome))
        }
        Builtin::Clipboard => {
            let clipboard = ctx.clipboard.clone();
            let path = input.clone();
            let outcome = tokio::task::spawn_blocking(move || clipboard.execute(&path))
                .await
                .map_err(|e| ConvpipeError::Clipboard {
                    message: e.to_string(),
                })
                .and_then(|r| r);

            Ok(match outcome {
                Ok(outcome) => NodeResult::success(target, BUILTIN_PLUGIN, &input, &outcome.output)
                    .with_extra(serde_json::json!({
                        "kind": format!("{:?}", outcome.kind).to_lowercase(),
                        "copied": outcome.copied,
                        "clipboard_error": outcome.error,
                    })),
                Err(e) => NodeResult::failure(target, &input, e.to_string()).with_plugin(BUILTIN_PLUGIN),
            })
        }
        Builtin::None => {
            let request = NodeRequest {
                node_id: node.id,
                stage_idx: node.stage_idx,
                target: target.to_string(),
                input,
                options: node.options().clone(),
                work_dir,
            };
            ctx.runner.run(&request).await
        }
    }
}

fn builtin_result(target: &str, input: &Path, outcome: ConvpipeResult<PathBuf>) -> NodeResult {
    match outcome {
        Ok(output) => NodeResult::success(target, BUILTIN_PLUGIN, input, &output),
        Err(e) => NodeResult::failure(target, input, e.to_string()).with_plugin(BUILTIN_PLUGIN),
    }
}

fn collect_result(
    node: &ExecutionNode,
    input: &Path,
    outcome: ConvpipeResult<crate::builtins::CollectOutput>,
) -> NodeResult {
    match outcome {
        Ok(collected) => NodeResult::success(node.target(), BUILTIN_PLUGIN, input, &collected.output_dir)
            .with_extra(serde_json::json!({ "files": collected.files.len() })),
        Err(e) => NodeResult::failure(node.target(), input, e.to_string()).with_plugin(BUILTIN_PLUGIN),
    }
}
