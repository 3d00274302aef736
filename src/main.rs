//! cfn-infra-graph CLI - Generate dependency graphs for CloudFormation projects

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand, ValueEnum};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use cfn_infra_graph::cache::FileCache;
use cfn_infra_graph::collector::{Collector, SnapshotSource};
use cfn_infra_graph::config::{self, CONFIG_TEMPLATE, InitOutcome};
use cfn_infra_graph::exporter::{ExportSettings, run_export};
use cfn_infra_graph::output::OutputFormat;
use cfn_infra_graph::tags::TagResolver;

#[derive(Parser)]
#[command(name = "cfn-infra-graph")]
#[command(
    author,
    version,
    about = "Generate dependency graphs for CloudFormation projects"
)]
struct Cli {
    /// Verbose output (debug logs to stderr)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Export stack and service dependency graphs
    Export(ExportArgs),
    /// Bootstrap the user configuration from the template
    Init,
}

#[derive(clap::Args)]
struct ExportArgs {
    /// JSON snapshot of the CloudFormation API responses
    #[arg(short, long)]
    snapshot: Utf8PathBuf,

    /// Environment to export, e.g. dev, stg, prd
    #[arg(short, long, default_value = "dev")]
    env: String,

    /// Project name, part of every stack name (defaults to the configured project)
    #[arg(short = 't', long)]
    project_name: Option<String>,

    /// Config file, falls back to the user config when missing
    #[arg(short, long, default_value = "./config.yaml")]
    config: Utf8PathBuf,

    /// Directory receiving the graphs and data export
    #[arg(short, long, default_value = "./output")]
    output_dir: Utf8PathBuf,

    /// Clear cached collector results beforehand
    #[arg(short, long)]
    refresh: bool,

    /// Directory holding cached collector results
    #[arg(long, default_value = ".cache")]
    cache_dir: Utf8PathBuf,

    /// Data export format
    #[arg(short, long, default_value = "json", value_enum)]
    format: Format,

    /// Group stacks by service in the stack graph
    #[arg(long)]
    cluster_by_service: bool,

    /// Filter stacks by glob pattern on their short name (e.g., 'api-*')
    #[arg(long)]
    filter: Option<String>,

    /// Also render PNG images with graphviz
    #[arg(long)]
    png: bool,
}

#[derive(Clone, ValueEnum)]
enum Format {
    Json,
    Yaml,
}

impl From<Format> for OutputFormat {
    fn from(f: Format) -> Self {
        match f {
            Format::Json => OutputFormat::Json,
            Format::Yaml => OutputFormat::Yaml,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Export(args) => export(args),
        Command::Init => init(),
    }
}

fn export(args: ExportArgs) -> Result<(), Box<dyn std::error::Error>> {
    if !args.snapshot.exists() {
        return Err(format!("Snapshot file does not exist: {}", args.snapshot).into());
    }

    let config = config::load_config(&args.config)?;
    let project = args
        .project_name
        .clone()
        .unwrap_or_else(|| config.default_project.clone());

    let mut settings = ExportSettings::new(project, args.env.clone(), args.output_dir.clone());
    settings.format = args.format.into();
    settings.cluster_by_service = args.cluster_by_service;
    settings.render_png = args.png;
    settings.refresh = args.refresh;
    settings.filter = args.filter.as_deref().map(glob::Pattern::new).transpose()?;

    tracing::info!(env = %settings.env, project = %settings.project, "starting infra export");

    let collector = Collector::new(
        SnapshotSource::from_file(&args.snapshot)?,
        settings.stack_prefix(),
        TagResolver::from_keys(config.service_tags.iter().cloned()),
        TagResolver::from_keys(config.component_tags.iter().cloned()),
    );
    let mut cache = FileCache::new(args.cache_dir);

    let report = run_export(&collector, &mut cache, &config.project(&settings.project), &settings)?;

    tracing::info!(
        stacks = report.stacks,
        exports = report.exports,
        imported = report.imported_exports,
        "export complete"
    );
    for file in &report.files {
        println!("{}", file);
    }

    Ok(())
}

fn init() -> Result<(), Box<dyn std::error::Error>> {
    let target = config::user_config_path().ok_or("Cannot determine the home directory")?;

    match config::init_config(&target)? {
        InitOutcome::Created(path) => {
            tracing::info!(path = %path, "bootstrapped config from template, adapt it to your needs");
        }
        InitOutcome::AlreadyExists(path) => {
            tracing::info!(path = %path, "config already exists, printing the current template");
            println!("{}", CONFIG_TEMPLATE);
        }
    }
    Ok(())
}
