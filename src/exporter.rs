//! The export pipeline: collect, enrich, build graphs, write outputs.

use std::collections::{BTreeMap, HashSet};

use camino::Utf8PathBuf;
use glob::Pattern;
use thiserror::Error;

use crate::cache::{CacheError, CacheStore};
use crate::cluster::{partition_by_service, stack_services};
use crate::collector::{CollectError, Collector, InventorySource};
use crate::config::ProjectConfig;
use crate::enrich::enrich_exports;
use crate::graph::{ServiceGraph, StackGraph, short_name};
use crate::model::{EnrichedExport, ExportRecord, StackRecord};
use crate::output::{DataExport, OutputError, OutputFormat, generate_output};
use crate::render::{self, RenderError, SERVICES_FILE, STACKS_FILE};

#[derive(Error, Debug)]
pub enum ExportError {
    #[error(transparent)]
    Collect(#[from] CollectError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Output(#[from] OutputError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Options of one export run
#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub project: String,
    pub env: String,
    pub output_dir: Utf8PathBuf,
    pub format: OutputFormat,
    /// Group stack nodes into one cluster per service
    pub cluster_by_service: bool,
    /// Only keep stacks whose short name matches
    pub filter: Option<Pattern>,
    /// Also render each graph to PNG with graphviz
    pub render_png: bool,
    /// Invalidate cached collector results first
    pub refresh: bool,
}

impl ExportSettings {
    pub fn new(project: impl Into<String>, env: impl Into<String>, output_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            project: project.into(),
            env: env.into(),
            output_dir: output_dir.into(),
            format: OutputFormat::Json,
            cluster_by_service: false,
            filter: None,
            render_png: false,
            refresh: false,
        }
    }

    /// `{project}-{env}`, the prefix every stack of the project carries
    pub fn stack_prefix(&self) -> String {
        format!("{}-{}", self.project, self.env)
    }
}

/// What an export run produced
#[derive(Debug, Default)]
pub struct ExportReport {
    pub stacks: usize,
    pub exports: usize,
    pub imported_exports: usize,
    pub files: Vec<Utf8PathBuf>,
}

/// Keep only stacks whose short name matches `pattern`, and the exports between them.
fn apply_filter(
    pattern: &Pattern,
    prefix: &str,
    stacks: Vec<StackRecord>,
    exports: Vec<ExportRecord>,
) -> (Vec<StackRecord>, Vec<ExportRecord>) {
    let stacks: Vec<StackRecord> = stacks
        .into_iter()
        .filter(|s| pattern.matches(short_name(&s.name, prefix)))
        .collect();
    let kept: HashSet<&str> = stacks.iter().map(|s| s.name.as_str()).collect();

    let exports = exports
        .into_iter()
        .filter(|e| kept.contains(e.exporting_stack.as_str()))
        .map(|mut e| {
            e.importing_stacks.retain(|s| kept.contains(s.as_str()));
            e
        })
        .collect();

    (stacks, exports)
}

fn log_stack_summary(stacks: &[StackRecord]) {
    let mut by_service: BTreeMap<&str, Vec<&StackRecord>> = BTreeMap::new();
    for stack in stacks {
        match &stack.service_name {
            Some(service) => by_service.entry(service).or_default().push(stack),
            None => tracing::info!(stack = %stack.name, "stack without service name"),
        }
    }

    for (service, stacks) in &by_service {
        for stack in stacks {
            tracing::info!(
                service,
                stack = %stack.name,
                component = stack.component_name.as_deref().unwrap_or("-"),
                "stack"
            );
        }
    }

    for stack in stacks {
        for param in &stack.parameters {
            tracing::debug!(
                stack = %stack.name,
                parameter = %param.name,
                value = %param.value,
                description = param.description.as_deref().unwrap_or(""),
                "parameter"
            );
            if let Some(dependency) = &param.external_dependency {
                tracing::info!(
                    stack = %stack.name,
                    service = %dependency.service_name,
                    team = dependency.team_name.as_deref().unwrap_or("-"),
                    "external dependency"
                );
            }
        }
    }
}

fn log_export_summary(exports: &[EnrichedExport]) {
    for export in exports {
        tracing::info!(
            export = %export.export_name,
            value = %export.export_value,
            stack = %export.exporting_stack,
            importers = ?export.importing_stacks,
            "export"
        );
    }

    for export in exports {
        let service = export.exporting_service.as_deref().unwrap_or("-");
        if export.is_only_reflexive() {
            tracing::info!(export = %export.export_name, service, "only reflexive dependency");
        } else {
            tracing::info!(
                export = %export.export_name,
                service,
                importers = ?export.importing_services,
                "export services"
            );
        }
    }
}

/// Run the whole pipeline and write graphs and data export into the output directory.
pub fn run_export<S: InventorySource>(
    collector: &Collector<S>,
    cache: &mut dyn CacheStore,
    project: &ProjectConfig,
    settings: &ExportSettings,
) -> Result<ExportReport, ExportError> {
    let prefix = settings.stack_prefix();

    if settings.refresh {
        let removed = cache.invalidate()?;
        tracing::info!(removed, "cache invalidated");
    }

    // All stacks must be known before enrichment
    let stacks = collector.gather_stacks_cached(cache)?;
    let exports = collector.gather_exports_cached(cache)?;

    let (stacks, exports) = match &settings.filter {
        Some(pattern) => {
            let (stacks, exports) = apply_filter(pattern, &prefix, stacks, exports);
            tracing::info!(pattern = %pattern, stacks = stacks.len(), "stacks kept by filter");
            (stacks, exports)
        }
        None => (stacks, exports),
    };
    log_stack_summary(&stacks);

    let enriched = enrich_exports(&exports, &stacks);
    let imported: Vec<EnrichedExport> = enriched
        .iter()
        .filter(|e| !e.importing_stacks.is_empty())
        .cloned()
        .collect();
    log_export_summary(&imported);

    let stack_graph = StackGraph::build(&imported, &stacks, &prefix);
    let service_graph = ServiceGraph::build(
        &imported,
        &stacks,
        &project.downstream_dependencies,
        &project.internal_manual_dependencies,
    );

    let clusters = settings
        .cluster_by_service
        .then(|| partition_by_service(&stack_graph.all_nodes, &stack_services(&stacks, &prefix)));

    let mut files = vec![
        render::write_graph(
            &settings.output_dir,
            STACKS_FILE,
            &render::render_stack_graph(&stack_graph, clusters.as_ref()),
        )?,
        render::write_graph(
            &settings.output_dir,
            SERVICES_FILE,
            &render::render_service_graph(&service_graph),
        )?,
    ];

    if settings.render_png {
        let images = files
            .iter()
            .map(|path| render::render_png(path))
            .collect::<Result<Vec<_>, _>>()?;
        files.extend(images);
    }

    let data = DataExport::new(&stacks, &enriched);
    let data_path = settings.output_dir.join(settings.format.file_name());
    std::fs::write(&data_path, generate_output(&data, settings.format)?)?;
    files.push(data_path);

    tracing::info!(dir = %settings.output_dir, "graph exports finished");

    Ok(ExportReport {
        stacks: stacks.len(),
        exports: enriched.len(),
        imported_exports: imported.len(),
        files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::collector::SnapshotSource;
    use crate::config::{ManualDependency, ManualInternalDependency};
    use crate::tags::TagResolver;

    const SNAPSHOT: &str = r#"{
        "Stacks": [
            {"StackName": "team-dev-api", "StackStatus": "CREATE_COMPLETE",
             "Tags": [{"Key": "ServiceName", "Value": "api"}]},
            {"StackName": "team-dev-etl", "StackStatus": "CREATE_COMPLETE",
             "Tags": [{"Key": "ServiceName", "Value": "etl"}],
             "Parameters": [{"ParameterKey": "WarehouseHost", "ParameterValue": "db"}]},
            {"StackName": "team-dev-etl-jobs", "StackStatus": "CREATE_COMPLETE",
             "Tags": [{"Key": "ServiceName", "Value": "etl"}]}
        ],
        "TemplateSummaries": {
            "team-dev-etl": {"Parameters": [
                {"ParameterKey": "WarehouseHost", "Description": "Warehouse | team=data,service=Snowflake"}
            ]}
        },
        "StackResources": {
            "team-dev-etl": [{"LogicalResourceId": "Bucket", "ResourceType": "AWS::S3::Bucket"}]
        },
        "Exports": [
            {"ExportingStackId": "arn:aws:cloudformation:eu-west-1:1:stack/team-dev-etl/a", "Name": "etl-data-path", "Value": "s3://x"},
            {"ExportingStackId": "arn:aws:cloudformation:eu-west-1:1:stack/team-dev-etl/a", "Name": "etl-unused", "Value": "x"}
        ],
        "Imports": {"etl-data-path": ["team-dev-api", "team-dev-etl-jobs"]}
    }"#;

    fn collector() -> Collector<SnapshotSource> {
        Collector::new(
            SnapshotSource::from_json(SNAPSHOT).unwrap(),
            "team-dev",
            TagResolver::from_keys(["ServiceName"]),
            TagResolver::from_keys(["Component"]),
        )
    }

    fn settings(dir: &tempfile::TempDir) -> ExportSettings {
        let out = Utf8PathBuf::from_path_buf(dir.path().join("output")).unwrap();
        ExportSettings::new("team", "dev", out)
    }

    fn project() -> ProjectConfig {
        ProjectConfig {
            downstream_dependencies: BTreeMap::from([(
                "api".to_string(),
                vec![ManualDependency {
                    team: "partner".to_string(),
                    service: "ExternalService".to_string(),
                }],
            )]),
            internal_manual_dependencies: BTreeMap::from([(
                "etl".to_string(),
                vec![ManualInternalDependency {
                    service: "scheduler".to_string(),
                }],
            )]),
        }
    }

    #[test]
    fn test_run_export_writes_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(&dir);
        let mut cache = MemoryCache::new();

        let report = run_export(&collector(), &mut cache, &project(), &settings).unwrap();

        assert_eq!(report.stacks, 3);
        assert_eq!(report.exports, 2);
        assert_eq!(report.imported_exports, 1);
        assert_eq!(report.files.len(), 3);

        let services = std::fs::read_to_string(settings.output_dir.join(SERVICES_FILE)).unwrap();
        assert!(services.contains("\"etl\" -> \"api\";"));
        assert!(services.contains("\"Snowflake\" -> \"etl\";"));
        assert!(services.contains("\"api\" -> \"ExternalService\";"));
        assert!(services.contains("\"scheduler\" -> \"etl\";"));
        // etl-jobs belongs to etl itself
        assert!(!services.contains("\"etl\" -> \"etl\";"));

        let stacks = std::fs::read_to_string(settings.output_dir.join(STACKS_FILE)).unwrap();
        assert!(stacks.contains("\"etl\" -> \"api\";"));
        assert!(stacks.contains("\"etl\" -> \"etl-jobs\";"));
        assert!(stacks.contains("\"api\" [fillcolor=\"green\"];"));

        let data: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(settings.output_dir.join("export-data.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(data["stackExports"].as_array().unwrap().len(), 2);
        assert_eq!(data["resourceStatistics"]["AWS::S3::Bucket"], 1);
    }

    #[test]
    fn test_run_export_clusters_by_service() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(&dir);
        settings.cluster_by_service = true;

        run_export(&collector(), &mut MemoryCache::new(), &ProjectConfig::default(), &settings).unwrap();

        let stacks = std::fs::read_to_string(settings.output_dir.join(STACKS_FILE)).unwrap();
        assert!(stacks.contains("subgraph cluster_1_etl {"));
        assert!(stacks.contains("subgraph cluster_0_api {"));
    }

    #[test]
    fn test_run_export_with_filter() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(&dir);
        settings.filter = Some(Pattern::new("etl*").unwrap());
        settings.format = OutputFormat::Yaml;

        let report = run_export(&collector(), &mut MemoryCache::new(), &ProjectConfig::default(), &settings).unwrap();

        assert_eq!(report.stacks, 2);
        let stacks = std::fs::read_to_string(settings.output_dir.join(STACKS_FILE)).unwrap();
        assert!(stacks.contains("\"etl\" -> \"etl-jobs\";"));
        assert!(!stacks.contains("\"api\""));
        assert!(settings.output_dir.join("export-data.yaml").exists());
    }

    #[test]
    fn test_refresh_invalidates_cache() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(&dir);
        let collector = collector();
        let mut cache = MemoryCache::new();
        cache.put(&collector.cache_key("stacks"), "[]".to_string()).unwrap();
        cache.put(&collector.cache_key("exports"), "[]".to_string()).unwrap();

        let stale = run_export(&collector, &mut cache, &ProjectConfig::default(), &settings).unwrap();
        assert_eq!(stale.stacks, 0);

        settings.refresh = true;
        let fresh = run_export(&collector, &mut cache, &ProjectConfig::default(), &settings).unwrap();
        assert_eq!(fresh.stacks, 3);
    }

    #[test]
    fn test_cache_is_not_shared_between_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(&dir);
        let mut cache = MemoryCache::new();
        let single = Collector::new(
            SnapshotSource::from_json(
                r#"{"Stacks": [{"StackName": "team-dev-api", "StackStatus": "CREATE_COMPLETE"}]}"#,
            )
            .unwrap(),
            "team-dev",
            TagResolver::from_keys(["ServiceName"]),
            TagResolver::from_keys(["Component"]),
        );

        let first = run_export(&single, &mut cache, &ProjectConfig::default(), &settings).unwrap();
        let second = run_export(&collector(), &mut cache, &ProjectConfig::default(), &settings).unwrap();

        assert_eq!(first.stacks, 1);
        assert_eq!(second.stacks, 3);
        assert_eq!(cache.len(), 4);
    }

    #[test]
    fn test_empty_inventory_still_writes_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(&dir);
        let collector = Collector::new(
            SnapshotSource::default(),
            "team-dev",
            TagResolver::from_keys(["ServiceName"]),
            TagResolver::from_keys(["Component"]),
        );

        let report = run_export(&collector, &mut MemoryCache::new(), &ProjectConfig::default(), &settings).unwrap();

        assert_eq!(report.stacks, 0);
        assert!(settings.output_dir.join(STACKS_FILE).exists());
        assert!(settings.output_dir.join(SERVICES_FILE).exists());
    }

    #[test]
    fn test_stack_prefix() {
        assert_eq!(ExportSettings::new("team", "prd", "out").stack_prefix(), "team-prd");
    }
}
