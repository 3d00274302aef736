//! JSON/YAML data export.

use std::collections::HashMap;

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::model::{EnrichedExport, StackRecord};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Json,
    Yaml,
}

impl OutputFormat {
    /// File name of the data export for this format.
    pub fn file_name(self) -> &'static str {
        match self {
            OutputFormat::Json => "export-data.json",
            OutputFormat::Yaml => "export-data.yaml",
        }
    }
}

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("JSON serialization failed: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("YAML serialization failed: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

/// Occurrences of each resource type, most frequent first.
///
/// Serialized as a map that keeps this order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceStatistics(pub Vec<(String, usize)>);

impl ResourceStatistics {
    /// Count resource types across all stacks. Ties are ordered by type name.
    pub fn from_stacks(stacks: &[StackRecord]) -> Self {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for resource in stacks.iter().flat_map(|s| &s.resources) {
            *counts.entry(resource.resource_type.as_str()).or_default() += 1;
        }

        let mut entries: Vec<(String, usize)> = counts
            .into_iter()
            .map(|(kind, count)| (kind.to_string(), count))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Self(entries)
    }
}

impl Serialize for ResourceStatistics {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(kind, count)| (kind, count)))
    }
}

/// Machine-readable snapshot of one export run
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataExport<'a> {
    pub stacks: &'a [StackRecord],
    pub stack_exports: &'a [EnrichedExport],
    pub resource_statistics: ResourceStatistics,
}

impl<'a> DataExport<'a> {
    pub fn new(stacks: &'a [StackRecord], stack_exports: &'a [EnrichedExport]) -> Self {
        Self {
            stacks,
            stack_exports,
            resource_statistics: ResourceStatistics::from_stacks(stacks),
        }
    }
}

/// Generate the data export in the specified format
pub fn generate_output(data: &DataExport<'_>, format: OutputFormat) -> Result<String, OutputError> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(data)?),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(data)?),
    }
}
