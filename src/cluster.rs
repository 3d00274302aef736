//! Group stack nodes by their owning service.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::graph::short_name;
use crate::model::StackRecord;

/// Map each stack short name to its service, if it has one.
pub fn stack_services(stacks: &[StackRecord], prefix: &str) -> HashMap<String, Option<String>> {
    stacks
        .iter()
        .map(|s| (short_name(&s.name, prefix).to_string(), s.service_name.clone()))
        .collect()
}

/// Partition `nodes` by service.
///
/// Every node lands in exactly one group. Nodes that are missing from
/// `services` or have no service go to the `None` group.
pub fn partition_by_service(
    nodes: &BTreeSet<String>,
    services: &HashMap<String, Option<String>>,
) -> BTreeMap<Option<String>, BTreeSet<String>> {
    let mut groups: BTreeMap<Option<String>, BTreeSet<String>> = BTreeMap::new();
    for node in nodes {
        let service = services.get(node).cloned().flatten();
        groups.entry(service).or_default().insert(node.clone());
    }
    groups
}
