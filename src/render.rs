//! Render dependency graphs as DOT documents.

use std::collections::{BTreeMap, BTreeSet};
use std::process::Command;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::classify::{StackNodeClass, classify_service_nodes, classify_stack_nodes};
use crate::dot::DotBuilder;
use crate::graph::{ServiceGraph, StackGraph};

pub const STACKS_FILE: &str = "export-stacks.gv";
pub const SERVICES_FILE: &str = "export-services.gv";

const EXTERNAL_FILL: &str = "tomato";

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Graphviz failed to render {path}: {stderr}")]
    Graphviz { path: Utf8PathBuf, stderr: String },
}

/// Stack nodes grouped by owning service; `None` holds the ungrouped ones.
pub type Clusters = BTreeMap<Option<String>, BTreeSet<String>>;

fn new_document(title: &str) -> DotBuilder {
    let mut dot = DotBuilder::new("StacksGraph");
    dot.attr("rankdir", "LR")
        .attr("label", title)
        .attr("labelloc", "t")
        .attr("fontsize", "20")
        .node_defaults(&[("shape", "box"), ("style", "filled"), ("fillcolor", "grey")]);
    dot
}

fn stack_node(dot: &mut DotBuilder, classes: &BTreeMap<&str, StackNodeClass>, node: &str) {
    match classes.get(node).copied().unwrap_or(StackNodeClass::Plain) {
        StackNodeClass::Plain => dot.node(node, &[]),
        class => dot.node(node, &[("fillcolor", class.fill_color())]),
    };
}

/// Render the stack graph, optionally grouping nodes into service clusters.
///
/// Cluster ids carry the group index, so services whose names sanitize to the
/// same identifier still get separate boxes.
pub fn render_stack_graph(graph: &StackGraph, clusters: Option<&Clusters>) -> String {
    let mut dot = new_document("Stack Dependencies");
    let classes = classify_stack_nodes(graph);

    match clusters {
        Some(clusters) => {
            for (index, (service, nodes)) in clusters.iter().enumerate() {
                match service {
                    Some(service) => {
                        dot.start_cluster(&format!("{}_{}", index, service), service);
                        for node in nodes {
                            stack_node(&mut dot, &classes, node);
                        }
                        dot.end_cluster();
                    }
                    None => {
                        for node in nodes {
                            stack_node(&mut dot, &classes, node);
                        }
                    }
                }
            }
        }
        None => {
            for node in &graph.all_nodes {
                stack_node(&mut dot, &classes, node);
            }
        }
    }

    for edge in &graph.edges {
        dot.edge(&edge.from, &edge.to);
    }

    for node in &graph.external_nodes {
        dot.node(node, &[("fillcolor", EXTERNAL_FILL)]);
    }
    for edge in &graph.external_edges {
        dot.edge(&edge.from, &edge.to);
    }

    dot.build()
}

/// Render the service graph. A node in several categories is emitted once per category.
pub fn render_service_graph(graph: &ServiceGraph) -> String {
    let mut dot = new_document("Service Dependencies");

    for (node, class) in classify_service_nodes(graph) {
        let label = format!(
            "<<font point-size=\"{}\">{}</font>>",
            class.font_size(),
            html_escape(node)
        );
        dot.node(
            node,
            &[
                ("fillcolor", class.fill_color()),
                ("style", class.style()),
                ("label", label.as_str()),
            ],
        );
    }

    for edge in graph.all_edges() {
        dot.edge(&edge.from, &edge.to);
    }

    dot.build()
}

fn html_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Write a DOT document into `dir`, returning its path.
pub fn write_graph(dir: &Utf8Path, file_name: &str, content: &str) -> Result<Utf8PathBuf, RenderError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(file_name);
    std::fs::write(&path, content)?;
    tracing::info!(path = %path, "graph written");
    Ok(path)
}

/// Render a DOT file to `<path>.png` with the graphviz `dot` executable.
pub fn render_png(path: &Utf8Path) -> Result<Utf8PathBuf, RenderError> {
    let target = Utf8PathBuf::from(format!("{}.png", path));
    let output = Command::new("dot")
        .arg("-Tpng")
        .arg(path.as_str())
        .arg("-o")
        .arg(target.as_str())
        .output()?;

    if !output.status.success() {
        return Err(RenderError::Graphviz {
            path: path.to_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    tracing::info!(path = %target, "image rendered");
    Ok(target)
}
