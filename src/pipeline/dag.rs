// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convpipe contributors

//! Execution graph builder
//!
//! Turns a parsed pipeline into an arena of nodes. Nodes only reference
//! nodes created before them, so creation order is a topological order and
//! the graph is acyclic by construction.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::builtins::Builtin;
use crate::errors::{ConvpipeError, ConvpipeResult};
use crate::pipeline::{Options, Pipeline, StageElement};

/// One schedulable unit of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionNode {
    /// Position in creation order
    pub id: usize,
    /// Originating stage
    pub stage_idx: usize,
    pub element: StageElement,
    /// Literal input, set only for nodes without predecessors
    pub input: Option<PathBuf>,
    /// Predecessor ids in gather order
    pub input_nodes: Vec<usize>,
}

impl ExecutionNode {
    pub fn target(&self) -> &str {
        self.element.target()
    }

    pub fn options(&self) -> &Options {
        self.element.options()
    }

    pub fn builtin(&self) -> Builtin {
        self.element.builtin()
    }

    pub fn is_collect(&self) -> bool {
        self.element.is_collect()
    }

    /// Whether the node reads the pipeline source rather than a predecessor
    pub fn reads_source(&self) -> bool {
        self.input_nodes.is_empty()
    }
}

/// DAG of execution nodes, owned in one arena and linked by id
#[derive(Debug, Clone, Default)]
pub struct ExecutionGraph {
    nodes: Vec<ExecutionNode>,
    edges: DiGraph<usize, ()>,
    source: PathBuf,
}

impl ExecutionGraph {
    /// Build the graph for a pipeline
    ///
    /// Pure and deterministic. Fails only for stage widths no node layout
    /// can express; a validated pipeline always builds.
    pub fn build_from_pipeline(pipeline: &Pipeline) -> ConvpipeResult<Self> {
        let mut graph = Self {
            source: pipeline.source.clone(),
            ..Self::default()
        };

        // Ids available as inputs to the next stage
        let mut frontier: Vec<usize> = Vec::new();

        for (stage_idx, stage) in pipeline.stages.iter().enumerate() {
            if stage.elements.is_empty() {
                return Err(ConvpipeError::InvalidPipeline {
                    reason: format!("Stage {} is empty", stage_idx + 1),
                    help: None,
                });
            }

            let mut next = Vec::new();

            if stage.has_collect() || stage.has_tee() {
                // Gathers the whole frontier, or fans out its single branch
                let element = &stage.elements[0];
                next.push(graph.add_node(stage_idx, element, frontier.clone()));
            } else {
                let width = stage.width();
                match frontier.len() {
                    0 => {
                        for element in &stage.elements {
                            next.push(graph.add_node(stage_idx, element, Vec::new()));
                        }
                    }
                    1 => {
                        for element in &stage.elements {
                            next.push(graph.add_node(stage_idx, element, vec![frontier[0]]));
                        }
                    }
                    branches if branches == width => {
                        for (element, &pred) in stage.elements.iter().zip(&frontier) {
                            next.push(graph.add_node(stage_idx, element, vec![pred]));
                        }
                    }
                    _ if width == 1 => {
                        for &pred in &frontier {
                            next.push(graph.add_node(stage_idx, &stage.elements[0], vec![pred]));
                        }
                    }
                    branches => {
                        return Err(ConvpipeError::InvalidPipeline {
                            reason: format!(
                                "Stage {} has {} elements but the previous stage produces {} branches",
                                stage_idx + 1,
                                width,
                                branches
                            ),
                            help: Some(format!("use 1 or {} elements", branches)),
                        });
                    }
                }
            }

            frontier = next;
        }

        debug!(nodes = graph.nodes.len(), "built execution graph");

        Ok(graph)
    }

    fn add_node(&mut self, stage_idx: usize, element: &StageElement, input_nodes: Vec<usize>) -> usize {
        let id = self.nodes.len();
        let index = self.edges.add_node(id);
        for &pred in &input_nodes {
            self.edges.add_edge(NodeIndex::new(pred), index, ());
        }

        let input = input_nodes.is_empty().then(|| self.source.clone());
        self.nodes.push(ExecutionNode {
            id,
            stage_idx,
            element: element.clone(),
            input,
            input_nodes,
        });
        id
    }

    /// All nodes in creation (topological) order
    pub fn nodes(&self) -> &[ExecutionNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Source the graph was built for
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Nodes consuming `id`'s output, in id order
    pub fn dependents(&self, id: usize) -> Vec<usize> {
        if id >= self.nodes.len() {
            return Vec::new();
        }
        let mut out: Vec<usize> = self
            .edges
            .neighbors_directed(NodeIndex::new(id), Direction::Outgoing)
            .map(|n| self.edges[n])
            .collect();
        out.sort_unstable();
        out
    }

    /// Nodes nothing else consumes; their outputs are the pipeline's outputs
    pub fn terminal_nodes(&self) -> Vec<usize> {
        self.nodes
            .iter()
            .filter(|node| {
                self.edges
                    .neighbors_directed(NodeIndex::new(node.id), Direction::Outgoing)
                    .next()
                    .is_none()
            })
            .map(|node| node.id)
            .collect()
    }

    /// Generate text representation of execution order
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            let from = if node.reads_source() {
                self.source.display().to_string()
            } else {
                node.input_nodes
                    .iter()
                    .map(|id| format!("#{}", id))
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            out.push_str(&format!(
                "#{} [stage {}] {} <- {}\n",
                node.id,
                node.stage_idx + 1,
                node.element.to_expression(),
                from
            ));
        }
        out
    }

    /// Generate DOT diagram of the graph
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph pipeline {\n");
        out.push_str("    rankdir=TB;\n");
        out.push_str("    node [shape=box, style=rounded];\n\n");
        out.push_str(&format!(
            "    source [shape=note, label=\"{}\"];\n",
            escape_label(&self.source.display().to_string())
        ));

        for node in &self.nodes {
            let shape = match node.builtin() {
                Builtin::Tee => ", shape=trapezium",
                Builtin::Collect => ", shape=invtrapezium",
                _ => "",
            };
            out.push_str(&format!(
                "    n{} [label=\"{}\"{}];\n",
                node.id,
                escape_label(&node.element.to_expression()),
                shape
            ));
        }
        out.push('\n');

        for node in self.nodes.iter().filter(|n| n.reads_source()) {
            out.push_str(&format!("    source -> n{};\n", node.id));
        }
        for edge in self.edges.raw_edges() {
            out.push_str(&format!(
                "    n{} -> n{};\n",
                self.edges[edge.source()],
                self.edges[edge.target()]
            ));
        }

        out.push_str("}\n");
        out
    }

    /// Generate Mermaid diagram of the graph
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("graph TD\n");
        out.push_str(&format!(
            "    source[(\"{}\")]\n",
            escape_label(&self.source.display().to_string())
        ));

        for node in &self.nodes {
            let label = escape_label(&node.element.to_expression());
            match node.builtin() {
                Builtin::Tee | Builtin::Collect => {
                    out.push_str(&format!("    n{}{{\"{}\"}}\n", node.id, label))
                }
                _ => out.push_str(&format!("    n{}[\"{}\"]\n", node.id, label)),
            }
        }

        for node in self.nodes.iter().filter(|n| n.reads_source()) {
            out.push_str(&format!("    source --> n{}\n", node.id));
        }
        for edge in self.edges.raw_edges() {
            out.push_str(&format!(
                "    n{} --> n{}\n",
                self.edges[edge.source()],
                self.edges[edge.target()]
            ));
        }

        out
    }
}

fn escape_label(text: &str) -> String {
    text.replace('"', "'")
}
