//! Inventory records: stacks, parameters, exports and their enriched form.

use serde::{Deserialize, Serialize};

/// A system outside the managed inventory that a stack depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalDependency {
    /// Owning team, if declared
    pub team_name: Option<String>,
    /// Name of the external service
    pub service_name: String,
}

impl ExternalDependency {
    /// Parse the metadata suffix of a parameter description.
    ///
    /// The expected shape is `"<free text> | team=<T>,service=<S>"`. Anything
    /// without a pipe segment, or whose segment has no `service` key, yields
    /// `None`. Segments that are not `key=value` pairs are skipped.
    pub fn from_description(description: &str) -> Option<Self> {
        let metadata = description.split('|').nth(1)?.trim();
        if metadata.is_empty() {
            return None;
        }

        let mut team_name = None;
        let mut service_name = None;
        for entry in metadata.split(',') {
            let Some((key, value)) = entry.split_once('=') else {
                tracing::debug!(entry, "ignoring malformed dependency metadata entry");
                continue;
            };
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match key.trim() {
                "team" => team_name = Some(value.to_string()),
                "service" => service_name = Some(value.to_string()),
                _ => {}
            }
        }

        Some(Self {
            team_name,
            service_name: service_name?,
        })
    }
}

/// A stack input parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_dependency: Option<ExternalDependency>,
}

impl Parameter {
    /// Build a parameter, deriving the external dependency from the description.
    pub fn new(name: impl Into<String>, value: impl Into<String>, description: Option<String>) -> Self {
        let external_dependency = description.as_deref().and_then(ExternalDependency::from_description);
        Self {
            name: name.into(),
            value: value.into(),
            description,
            external_dependency,
        }
    }
}

/// A resource deployed by a stack. Informational only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub logical_id: String,
    pub resource_type: String,
    #[serde(default)]
    pub physical_id: Option<String>,
}

/// A deployed stack as seen by one collection cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackRecord {
    /// Full stack name, unique within a snapshot
    pub name: String,
    /// Owning service, resolved from tags
    pub service_name: Option<String>,
    /// Component within the service, resolved from tags
    pub component_name: Option<String>,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default)]
    pub resources: Vec<Resource>,
}

impl StackRecord {
    /// External dependencies declared by this stack's parameters, in parameter order.
    pub fn external_dependencies(&self) -> impl Iterator<Item = &ExternalDependency> {
        self.parameters.iter().filter_map(|p| p.external_dependency.as_ref())
    }
}

/// An active export joined with the stacks importing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRecord {
    pub export_name: String,
    pub exporting_stack: String,
    pub export_value: String,
    #[serde(default)]
    pub importing_stacks: Vec<String>,
}

/// An export carrying both stack-level and service-level identities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedExport {
    pub export_name: String,
    pub exporting_stack: String,
    pub export_value: String,
    pub importing_stacks: Vec<String>,
    /// Service of the exporting stack; absent when the stack has no service tag
    pub exporting_service: Option<String>,
    /// Services of the importing stacks, in importer order, duplicates kept
    pub importing_services: Vec<String>,
}

impl EnrichedExport {
    /// True when every importing service is the exporting service itself.
    pub fn is_only_reflexive(&self) -> bool {
        !self.importing_services.is_empty()
            && self
                .importing_services
                .iter()
                .all(|s| Some(s) == self.exporting_service.as_ref())
    }
}
