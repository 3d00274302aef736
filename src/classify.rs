//! Node classification for rendering.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::graph::{ServiceGraph, StackGraph};

/// Classification of a stack node. Exactly one applies per node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StackNodeClass {
    /// Exports consumed by more importers than the threshold
    Important,
    /// Consumes but is never consumed
    Leaf,
    Plain,
}

impl StackNodeClass {
    pub fn fill_color(self) -> &'static str {
        match self {
            StackNodeClass::Important => "orange",
            StackNodeClass::Leaf => "green",
            StackNodeClass::Plain => "grey",
        }
    }
}

/// Category of a service node. A node can belong to several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceNodeClass {
    Internal,
    External,
    ManualDownstream,
    ManualInternal,
}

impl ServiceNodeClass {
    pub fn fill_color(self) -> &'static str {
        match self {
            ServiceNodeClass::Internal => "grey",
            ServiceNodeClass::External => "tomato",
            ServiceNodeClass::ManualDownstream => "skyblue",
            ServiceNodeClass::ManualInternal => "grey68",
        }
    }

    pub fn style(self) -> &'static str {
        match self {
            ServiceNodeClass::ManualInternal => "dotted, filled",
            _ => "filled",
        }
    }

    pub fn font_size(self) -> &'static str {
        match self {
            ServiceNodeClass::External | ServiceNodeClass::ManualDownstream => "19",
            ServiceNodeClass::Internal | ServiceNodeClass::ManualInternal => "17",
        }
    }
}

/// Classify a stack node. Precedence: important, then leaf, then plain.
pub fn classify_stack_node(graph: &StackGraph, node: &str) -> StackNodeClass {
    if graph.important_nodes.contains(node) {
        StackNodeClass::Important
    } else if graph.leaf_nodes.contains(node) {
        StackNodeClass::Leaf
    } else {
        StackNodeClass::Plain
    }
}

/// Classification of every stack node in the graph.
pub fn classify_stack_nodes(graph: &StackGraph) -> BTreeMap<&str, StackNodeClass> {
    graph
        .all_nodes
        .iter()
        .map(|node| (node.as_str(), classify_stack_node(graph, node)))
        .collect()
}

/// Every category a service node belongs to, in declaration order.
pub fn classify_service_node(graph: &ServiceGraph, node: &str) -> Vec<ServiceNodeClass> {
    [
        (ServiceNodeClass::Internal, &graph.internal_nodes),
        (ServiceNodeClass::External, &graph.external_nodes),
        (ServiceNodeClass::ManualDownstream, &graph.manual_downstream_nodes),
        (ServiceNodeClass::ManualInternal, &graph.manual_internal_nodes),
    ]
    .into_iter()
    .filter(|(_, nodes)| nodes.contains(node))
    .map(|(class, _)| class)
    .collect()
}

/// Every (node, category) pair of the service graph, in node order.
pub fn classify_service_nodes(graph: &ServiceGraph) -> Vec<(&str, ServiceNodeClass)> {
    let nodes: BTreeSet<&str> = graph
        .internal_nodes
        .iter()
        .chain(&graph.external_nodes)
        .chain(&graph.manual_downstream_nodes)
        .chain(&graph.manual_internal_nodes)
        .map(String::as_str)
        .collect();

    nodes
        .into_iter()
        .flat_map(|node| {
            classify_service_node(graph, node)
                .into_iter()
                .map(move |class| (node, class))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use rstest::rstest;

    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn stack_graph() -> StackGraph {
        StackGraph {
            all_nodes: set(&["core", "mid", "leaf", "both"]),
            important_nodes: set(&["core", "both"]),
            nodes_with_downstream: set(&["core", "mid"]),
            // "both" is forced into both predicates to check precedence
            leaf_nodes: set(&["leaf", "both"]),
            ..Default::default()
        }
    }

    #[rstest]
    #[case("core", StackNodeClass::Important)]
    #[case("mid", StackNodeClass::Plain)]
    #[case("leaf", StackNodeClass::Leaf)]
    #[case("both", StackNodeClass::Important)]
    #[case("absent", StackNodeClass::Plain)]
    fn test_stack_precedence(#[case] node: &str, #[case] expected: StackNodeClass) {
        assert_eq!(classify_stack_node(&stack_graph(), node), expected);
    }

    #[test]
    fn test_classify_all_stack_nodes() {
        let graph = stack_graph();
        let classes = classify_stack_nodes(&graph);
        assert_eq!(classes.len(), 4);
        assert_eq!(classes["leaf"], StackNodeClass::Leaf);
        assert_eq!(classes["core"].fill_color(), "orange");
    }

    #[test]
    fn test_service_categories_are_not_exclusive() {
        let graph = ServiceGraph {
            internal_nodes: set(&["api", "etl"]),
            external_nodes: set(&["Snowflake", "api"]),
            manual_downstream_nodes: set(&["ExternalService"]),
            manual_internal_nodes: set(&["etl"]),
            ..Default::default()
        };

        assert_eq!(
            classify_service_node(&graph, "api"),
            vec![ServiceNodeClass::Internal, ServiceNodeClass::External]
        );
        assert_eq!(
            classify_service_node(&graph, "etl"),
            vec![ServiceNodeClass::Internal, ServiceNodeClass::ManualInternal]
        );
        assert!(classify_service_node(&graph, "nothing").is_empty());

        let all = classify_service_nodes(&graph);
        assert_eq!(all.len(), 6);
        assert_eq!(all.iter().filter(|(n, _)| *n == "api").count(), 2);
        assert_eq!(all[0], ("ExternalService", ServiceNodeClass::ManualDownstream));
        assert_eq!(
            &all[2..4],
            &[("api", ServiceNodeClass::Internal), ("api", ServiceNodeClass::External)]
        );
    }

    #[test]
    fn test_service_rendering_hints() {
        assert_eq!(ServiceNodeClass::External.fill_color(), "tomato");
        assert_eq!(ServiceNodeClass::ManualInternal.style(), "dotted, filled");
        assert_eq!(ServiceNodeClass::ManualDownstream.font_size(), "19");
    }
}
