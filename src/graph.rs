//! Stack-level and service-level dependency graphs.
//!
//! Both graphs are plain values built from one inventory snapshot. Node and
//! edge collections are sets; iteration order is sorted so rendering is
//! reproducible.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::config::{ManualDependency, ManualInternalDependency};
use crate::model::{EnrichedExport, StackRecord};

/// An exporting stack with more importers than this is important.
pub const IMPORTANT_THRESHOLD: usize = 4;

/// Placeholder for a service that could not be resolved.
pub const UNKNOWN_SERVICE: &str = "Unknown";

/// A directed edge, pointing from the provider to the consumer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

impl Edge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Strip the `{prefix}-` part of a stack name.
///
/// Names that do not carry the prefix are returned unchanged.
pub fn short_name<'a>(stack_name: &'a str, prefix: &str) -> &'a str {
    stack_name
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('-'))
        .unwrap_or(stack_name)
}

/// Dependencies between stacks, named by their short names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StackGraph {
    pub edges: BTreeSet<Edge>,
    pub all_nodes: BTreeSet<String>,
    pub important_nodes: BTreeSet<String>,
    pub nodes_with_downstream: BTreeSet<String>,
    pub leaf_nodes: BTreeSet<String>,
    pub external_nodes: BTreeSet<String>,
    pub external_edges: BTreeSet<Edge>,
}

impl StackGraph {
    /// Build the stack graph with the default importance threshold.
    ///
    /// `exports` are expected to be the exports that have at least one importer.
    pub fn build(exports: &[EnrichedExport], stacks: &[StackRecord], prefix: &str) -> Self {
        Self::build_with_threshold(exports, stacks, prefix, IMPORTANT_THRESHOLD)
    }

    pub fn build_with_threshold(
        exports: &[EnrichedExport],
        stacks: &[StackRecord],
        prefix: &str,
        threshold: usize,
    ) -> Self {
        let mut graph = Self::default();

        for export in exports {
            let exporting = short_name(&export.exporting_stack, prefix);
            graph.all_nodes.insert(exporting.to_string());
            graph.nodes_with_downstream.insert(exporting.to_string());

            for importer in &export.importing_stacks {
                let importing = short_name(importer, prefix);
                graph.edges.insert(Edge::new(exporting, importing));
                graph.all_nodes.insert(importing.to_string());
            }

            if export.importing_stacks.len() > threshold {
                graph.important_nodes.insert(exporting.to_string());
            }
        }

        for stack in stacks {
            let consuming = short_name(&stack.name, prefix);
            for dependency in stack.external_dependencies() {
                graph.external_nodes.insert(dependency.service_name.clone());
                graph
                    .external_edges
                    .insert(Edge::new(dependency.service_name.as_str(), consuming));
                graph.all_nodes.insert(consuming.to_string());
            }
        }

        graph.leaf_nodes = graph
            .all_nodes
            .difference(&graph.nodes_with_downstream)
            .cloned()
            .collect();

        tracing::debug!(important = ?graph.important_nodes, "important stack nodes");
        tracing::debug!(leafs = ?graph.leaf_nodes, "leaf stack nodes");
        graph
    }
}

/// Dependencies between services, plus external and manually declared ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServiceGraph {
    pub edges: BTreeSet<Edge>,
    pub internal_nodes: BTreeSet<String>,
    pub external_nodes: BTreeSet<String>,
    pub external_edges: BTreeSet<Edge>,
    pub manual_downstream_nodes: BTreeSet<String>,
    pub manual_downstream_edges: BTreeSet<Edge>,
    pub manual_internal_nodes: BTreeSet<String>,
    pub manual_internal_edges: BTreeSet<Edge>,
}

impl ServiceGraph {
    /// Build the service graph.
    ///
    /// Services depending on their own exports produce no edge. Downstream
    /// declarations point from the owning service to the declared one; internal
    /// declarations point from the declared upstream to the owning service.
    pub fn build(
        exports: &[EnrichedExport],
        stacks: &[StackRecord],
        downstream_dependencies: &BTreeMap<String, Vec<ManualDependency>>,
        internal_manual_dependencies: &BTreeMap<String, Vec<ManualInternalDependency>>,
    ) -> Self {
        let mut graph = Self::default();

        for export in exports {
            let exporting = export.exporting_service.as_deref().unwrap_or(UNKNOWN_SERVICE);
            for importing in &export.importing_services {
                if importing == exporting {
                    continue;
                }
                graph.edges.insert(Edge::new(exporting, importing.as_str()));
                graph.internal_nodes.insert(exporting.to_string());
                graph.internal_nodes.insert(importing.clone());
            }
        }

        for stack in stacks {
            let consuming = stack.service_name.as_deref().unwrap_or(UNKNOWN_SERVICE);
            for dependency in stack.external_dependencies() {
                graph.external_nodes.insert(dependency.service_name.clone());
                graph
                    .external_edges
                    .insert(Edge::new(dependency.service_name.as_str(), consuming));
            }
        }

        for (service, dependencies) in downstream_dependencies {
            for dependency in dependencies {
                graph.manual_downstream_nodes.insert(dependency.service.clone());
                graph
                    .manual_downstream_edges
                    .insert(Edge::new(service.as_str(), dependency.service.as_str()));
            }
        }

        for (service, dependencies) in internal_manual_dependencies {
            for dependency in dependencies {
                graph.manual_internal_nodes.insert(dependency.service.clone());
                graph
                    .manual_internal_edges
                    .insert(Edge::new(dependency.service.as_str(), service.as_str()));
            }
        }

        tracing::debug!(
            edges = graph.edges.len(),
            external = graph.external_nodes.len(),
            "service graph built"
        );
        graph
    }

    /// Every edge of the graph, across all categories.
    pub fn all_edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges
            .iter()
            .chain(&self.external_edges)
            .chain(&self.manual_downstream_edges)
            .chain(&self.manual_internal_edges)
    }
}
