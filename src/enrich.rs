//! Attach service identities to exports.

use std::collections::HashMap;

use crate::model::{EnrichedExport, ExportRecord, StackRecord};

/// Map stack name to service name. Stacks without a service are left out.
pub fn service_lookup(stacks: &[StackRecord]) -> HashMap<&str, &str> {
    stacks
        .iter()
        .filter_map(|s| Some((s.name.as_str(), s.service_name.as_deref()?)))
        .collect()
}

/// Enrich exports with the services of their exporting and importing stacks.
///
/// Importing stacks with no known service are dropped from
/// `importing_services`, keeping the order and duplicates of the rest. An
/// exporting stack with no known service leaves `exporting_service` empty;
/// graph construction renders it as [`crate::graph::UNKNOWN_SERVICE`].
pub fn enrich_exports(exports: &[ExportRecord], stacks: &[StackRecord]) -> Vec<EnrichedExport> {
    let services = service_lookup(stacks);

    exports
        .iter()
        .map(|export| {
            let exporting_service = services.get(export.exporting_stack.as_str()).map(|s| s.to_string());
            if exporting_service.is_none() {
                tracing::warn!(
                    export = %export.export_name,
                    stack = %export.exporting_stack,
                    "exporting stack has no known service"
                );
            }

            let importing_services = export
                .importing_stacks
                .iter()
                .filter_map(|stack| services.get(stack.as_str()).map(|s| s.to_string()))
                .collect();

            EnrichedExport {
                export_name: export.export_name.clone(),
                exporting_stack: export.exporting_stack.clone(),
                export_value: export.export_value.clone(),
                importing_stacks: export.importing_stacks.clone(),
                exporting_service,
                importing_services,
            }
        })
        .collect()
}
