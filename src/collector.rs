//! Gather stacks and exports from CloudFormation API responses.
//!
//! The raw API surface is abstracted behind [`InventorySource`]. The collector
//! applies the prefix and status filters, resolves tags, merges parameter
//! descriptions and joins exports with their importers.

use std::collections::HashMap;
use std::fmt::Write;

use camino::Utf8Path;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::cache::{CacheError, CacheStore, cached};
use crate::model::{ExportRecord, Parameter, Resource, StackRecord};
use crate::tags::{Tag, TagResolver};

/// Stack statuses considered part of the live inventory
pub const ACTIVE_STACK_STATUSES: &[&str] = &[
    "CREATE_IN_PROGRESS",
    "CREATE_COMPLETE",
    "ROLLBACK_COMPLETE",
    "DELETE_FAILED",
    "UPDATE_IN_PROGRESS",
    "UPDATE_COMPLETE",
    "UPDATE_ROLLBACK_FAILED",
    "UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS",
    "UPDATE_ROLLBACK_COMPLETE",
    "REVIEW_IN_PROGRESS",
];

#[derive(Error, Debug)]
pub enum CollectError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to decode inventory snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),
    #[error("Stack {0} does not exist")]
    UnknownStack(String),
    #[error("Export {0} is not imported by any stack")]
    NotImported(String),
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

/// Entry of a stack listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StackSummary {
    pub stack_name: String,
    pub stack_status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ParameterValue {
    pub parameter_key: String,
    #[serde(default)]
    pub parameter_value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateParameter {
    pub parameter_key: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateSummary {
    #[serde(default)]
    pub parameters: Vec<TemplateParameter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StackResourceDetail {
    pub logical_resource_id: String,
    #[serde(default)]
    pub physical_resource_id: Option<String>,
    pub resource_type: String,
}

/// Description of a single stack, as returned by `DescribeStacks`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StackDescription {
    pub stack_name: String,
    pub stack_status: String,
    #[serde(default)]
    pub tags: Vec<Tag>,
    /// Absent when the template declares no parameters
    #[serde(default)]
    pub parameters: Option<Vec<ParameterValue>>,
}

/// Everything known about one stack before tag resolution.
#[derive(Debug, Clone)]
pub struct RawStack {
    pub description: StackDescription,
    pub template: TemplateSummary,
    pub resources: Vec<StackResourceDetail>,
}

/// An active export, as returned by `ListExports`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawExport {
    pub exporting_stack_id: String,
    pub name: String,
    pub value: String,
}

/// The CloudFormation calls the collector depends on.
pub trait InventorySource: Sync {
    fn list_stacks(&self) -> Result<Vec<StackSummary>, CollectError>;

    fn describe_stack(&self, stack_name: &str) -> Result<RawStack, CollectError>;

    fn list_exports(&self) -> Result<Vec<RawExport>, CollectError>;

    /// Names of the stacks importing `export_name`.
    ///
    /// Fails with [`CollectError::NotImported`] when nothing imports it.
    fn list_imports(&self, export_name: &str) -> Result<Vec<String>, CollectError>;

    /// Identity of the inventory contents, if the source can tell.
    ///
    /// Cached results are only shared between sources with the same fingerprint.
    fn fingerprint(&self) -> Option<String> {
        None
    }
}

/// Inventory captured as a JSON document of raw API responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SnapshotSource {
    #[serde(default)]
    pub stacks: Vec<StackDescription>,
    #[serde(default)]
    pub template_summaries: HashMap<String, TemplateSummary>,
    #[serde(default)]
    pub stack_resources: HashMap<String, Vec<StackResourceDetail>>,
    #[serde(default)]
    pub exports: Vec<RawExport>,
    #[serde(default)]
    pub imports: HashMap<String, Vec<String>>,
    #[serde(skip)]
    fingerprint: Option<String>,
}

impl SnapshotSource {
    pub fn from_file(path: &Utf8Path) -> Result<Self, CollectError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, CollectError> {
        let mut source: Self = serde_json::from_str(content)?;
        source.fingerprint = Some(content_digest(content));
        Ok(source)
    }
}

/// First 8 bytes of the SHA-256 of `content`, hex encoded.
fn content_digest(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    digest[..8].iter().fold(String::new(), |mut acc, b| {
        let _ = write!(acc, "{:02x}", b);
        acc
    })
}

impl InventorySource for SnapshotSource {
    fn list_stacks(&self) -> Result<Vec<StackSummary>, CollectError> {
        Ok(self
            .stacks
            .iter()
            .map(|s| StackSummary {
                stack_name: s.stack_name.clone(),
                stack_status: s.stack_status.clone(),
            })
            .collect())
    }

    fn describe_stack(&self, stack_name: &str) -> Result<RawStack, CollectError> {
        let description = self
            .stacks
            .iter()
            .find(|s| s.stack_name == stack_name)
            .cloned()
            .ok_or_else(|| CollectError::UnknownStack(stack_name.to_string()))?;

        Ok(RawStack {
            description,
            template: self
                .template_summaries
                .get(stack_name)
                .cloned()
                .unwrap_or_default(),
            resources: self
                .stack_resources
                .get(stack_name)
                .cloned()
                .unwrap_or_default(),
        })
    }

    fn list_exports(&self) -> Result<Vec<RawExport>, CollectError> {
        Ok(self.exports.clone())
    }

    fn list_imports(&self, export_name: &str) -> Result<Vec<String>, CollectError> {
        match self.imports.get(export_name) {
            Some(importers) if !importers.is_empty() => Ok(importers.clone()),
            _ => Err(CollectError::NotImported(export_name.to_string())),
        }
    }

    fn fingerprint(&self) -> Option<String> {
        self.fingerprint.clone()
    }
}

/// Extract the stack name from a stack id of the form
/// `arn:aws:cloudformation:<region>:<account>:stack/<name>/<uuid>`.
pub fn stack_name_from_id(stack_id: &str) -> Option<&str> {
    let mut parts = stack_id.rsplitn(3, '/');
    let _uuid = parts.next()?;
    let name = parts.next()?;
    parts.next()?;
    Some(name)
}

/// Merge deployed parameter values with their template descriptions.
///
/// Parameter order follows the deployed values. Template parameters with no
/// deployed value are ignored.
fn extract_parameters(description: &StackDescription, template: &TemplateSummary) -> Vec<Parameter> {
    let Some(values) = &description.parameters else {
        return vec![];
    };

    let descriptions: HashMap<&str, &str> = template
        .parameters
        .iter()
        .filter_map(|p| Some((p.parameter_key.as_str(), p.description.as_deref()?)))
        .collect();

    values
        .iter()
        .map(|v| {
            let description = descriptions
                .get(v.parameter_key.as_str())
                .map(|d| d.to_string());
            Parameter::new(v.parameter_key.clone(), v.parameter_value.clone(), description)
        })
        .collect()
}

fn extract_resources(details: &[StackResourceDetail]) -> Vec<Resource> {
    details
        .iter()
        .map(|d| Resource {
            logical_id: d.logical_resource_id.clone(),
            resource_type: d.resource_type.clone(),
            physical_id: d.physical_resource_id.clone(),
        })
        .collect()
}

/// Collects the stacks and exports belonging to one `{project}-{env}` prefix.
#[derive(Debug)]
pub struct Collector<S> {
    source: S,
    prefix: String,
    service_tags: TagResolver,
    component_tags: TagResolver,
}

impl<S: InventorySource> Collector<S> {
    pub fn new(source: S, prefix: impl Into<String>, service_tags: TagResolver, component_tags: TagResolver) -> Self {
        Self {
            source,
            prefix: prefix.into(),
            service_tags,
            component_tags,
        }
    }

    /// Cache key of a gathering operation, scoped to the prefix and the source contents.
    pub fn cache_key(&self, operation: &str) -> String {
        match self.source.fingerprint() {
            Some(fingerprint) => format!("{}.{}.{}", self.prefix, fingerprint, operation),
            None => format!("{}.{}", self.prefix, operation),
        }
    }

    /// All active stacks whose name starts with the prefix, in listing order.
    pub fn gather_stacks(&self) -> Result<Vec<StackRecord>, CollectError> {
        let names: Vec<String> = self
            .source
            .list_stacks()?
            .into_iter()
            .filter(|s| ACTIVE_STACK_STATUSES.contains(&s.stack_status.as_str()))
            .filter(|s| s.stack_name.starts_with(&self.prefix))
            .map(|s| s.stack_name)
            .collect();

        tracing::debug!(count = names.len(), prefix = %self.prefix, "describing stacks");

        let stacks = names
            .par_iter()
            .map(|name| self.gather_stack(name))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::info!(count = stacks.len(), "stacks gathered");
        Ok(stacks)
    }

    fn gather_stack(&self, stack_name: &str) -> Result<StackRecord, CollectError> {
        let raw = self.source.describe_stack(stack_name)?;
        tracing::debug!(stack = stack_name, "described stack");

        Ok(StackRecord {
            name: stack_name.to_string(),
            service_name: self.service_tags.resolve(&raw.description.tags),
            component_name: self.component_tags.resolve(&raw.description.tags),
            parameters: extract_parameters(&raw.description, &raw.template),
            resources: extract_resources(&raw.resources),
        })
    }

    /// Exports originating from stacks under the prefix, joined with their importers.
    ///
    /// An export nobody imports is kept with an empty importer list.
    pub fn gather_exports(&self) -> Result<Vec<ExportRecord>, CollectError> {
        let raw_exports = self.source.list_exports()?;

        let exports: Vec<(RawExport, String)> = raw_exports
            .into_iter()
            .filter_map(|raw| {
                let Some(stack) = stack_name_from_id(&raw.exporting_stack_id) else {
                    tracing::debug!(id = %raw.exporting_stack_id, "unparsable exporting stack id");
                    return None;
                };
                if !stack.starts_with(&self.prefix) {
                    return None;
                }
                let stack = stack.to_string();
                Some((raw, stack))
            })
            .collect();

        tracing::info!(count = exports.len(), "exports gathered");

        let mut records = Vec::with_capacity(exports.len());
        for (raw, exporting_stack) in exports {
            tracing::debug!(export = %raw.name, "gathering importing stacks");
            let importing_stacks = match self.source.list_imports(&raw.name) {
                Ok(importers) => importers,
                Err(CollectError::NotImported(_)) => vec![],
                Err(e) => return Err(e),
            };
            records.push(ExportRecord {
                export_name: raw.name,
                exporting_stack,
                export_value: raw.value,
                importing_stacks,
            });
        }

        tracing::info!(
            imported = records.iter().filter(|r| !r.importing_stacks.is_empty()).count(),
            "exports joined with imports"
        );
        Ok(records)
    }

    pub fn gather_stacks_cached(&self, cache: &mut dyn CacheStore) -> Result<Vec<StackRecord>, CollectError> {
        cached(cache, &self.cache_key("stacks"), || self.gather_stacks())
    }

    pub fn gather_exports_cached(&self, cache: &mut dyn CacheStore) -> Result<Vec<ExportRecord>, CollectError> {
        cached(cache, &self.cache_key("exports"), || self.gather_exports())
    }
}
