//! # Restore Planner
//!
//! Command-line tool for checking restore engine configuration and for
//! previewing what a restore request would do: which backups are restored in
//! which stage, and the tasks the first reconciliation would submit.
//!
//! ```text
//! restore-planner validate-config --environment production
//! restore-planner plan --defaults --fixture demos/incremental-restore.yaml
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use restore_core::builder::action_name;
use restore_core::config::{ConfigManager, RestoreEngineConfig};
use restore_core::control_plane::{ControlPlane, MemoryControlPlane, SystemClock};
use restore_core::events::EventPublisher;
use restore_core::models::{ActionDefinition, Backup, BackupRepo, Pod, RestoreRequest, RestoreStage, Task};
use restore_core::orchestration::select_targets;
use restore_core::RestoreEngine;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "restore-planner")]
#[command(about = "Validate restore engine configuration and preview restore plans")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Environment whose configuration section applies
    #[arg(short, long, env = "RESTORE_ENV", default_value = "development")]
    environment: String,

    /// Configuration directory path
    #[arg(short, long, default_value = "config")]
    config_dir: PathBuf,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Yaml)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Yaml,
}

#[derive(Subcommand)]
enum Commands {
    /// Load, validate and print the sanitized configuration
    ValidateConfig,

    /// Resolve a restore request from a fixture and print the planned tasks
    Plan {
        /// YAML file holding backups, action definitions, pods and the restore request
        #[arg(long)]
        fixture: PathBuf,

        /// Use built-in configuration defaults instead of the config directory
        #[arg(long)]
        defaults: bool,
    },
}

/// Records seeded into the in-memory control plane
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Fixture {
    backups: Vec<Backup>,
    action_definitions: Vec<ActionDefinition>,
    backup_repos: Vec<BackupRepo>,
    pods: Vec<Pod>,
    volume_snapshots: Vec<SnapshotRef>,
    restore: RestoreRequest,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SnapshotRef {
    namespace: String,
    name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Plan {
    restore: String,
    prepare_data: Vec<String>,
    post_ready: Vec<String>,
    tasks: Vec<Task>,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let _subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();

    let result = match &cli.command {
        Commands::ValidateConfig => validate_config(&cli),
        Commands::Plan { fixture, defaults } => plan(&cli, fixture, *defaults),
    };

    if let Err(e) = result {
        error!("restore-planner failed: {e:#}");
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn load_config(cli: &Cli) -> Result<Arc<ConfigManager>> {
    ConfigManager::load_from_directory_with_env(Some(cli.config_dir.clone()), &cli.environment)
        .with_context(|| format!("loading configuration from {}", cli.config_dir.display()))
}

fn print<T: Serialize>(format: OutputFormat, value: &T) -> Result<()> {
    let rendered = match format {
        OutputFormat::Json => serde_json::to_string_pretty(value)?,
        OutputFormat::Yaml => serde_yaml::to_string(value)?,
    };
    println!("{rendered}");
    Ok(())
}

fn validate_config(cli: &Cli) -> Result<()> {
    let manager = load_config(cli)?;
    info!(environment = manager.environment(), "Configuration is valid");
    print(cli.format, &manager.debug_config())
}

fn plan(cli: &Cli, fixture_path: &Path, defaults: bool) -> Result<()> {
    let config = if defaults {
        RestoreEngineConfig::default()
    } else {
        load_config(cli)?.config().clone()
    };

    let content = std::fs::read_to_string(fixture_path)
        .with_context(|| format!("reading fixture {}", fixture_path.display()))?;
    let fixture: Fixture = serde_yaml::from_str(&content).context("parsing fixture")?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("starting runtime")?;
    let plan = runtime.block_on(build_plan(fixture, config))?;
    print(cli.format, &plan)
}

async fn build_plan(fixture: Fixture, config: RestoreEngineConfig) -> Result<Plan> {
    let control_plane = Arc::new(MemoryControlPlane::new());
    for backup in fixture.backups {
        control_plane.insert_backup(backup);
    }
    for definition in fixture.action_definitions {
        control_plane.insert_action_definition(definition);
    }
    for repo in fixture.backup_repos {
        control_plane.insert_backup_repo(repo);
    }
    for pod in fixture.pods {
        control_plane.insert_pod(pod);
    }
    for snapshot in &fixture.volume_snapshots {
        control_plane.insert_volume_snapshot(&snapshot.namespace, &snapshot.name);
    }
    let request = fixture.restore;
    control_plane.insert_restore(request.clone());

    let cp: Arc<dyn ControlPlane> = control_plane;
    let engine = RestoreEngine::new(cp, Arc::new(EventPublisher::default()), Arc::new(SystemClock), config);
    let lineage = engine.resolver().resolve(&request).await?;
    let source_target = request.spec.backup.source_target_name.as_deref();

    let mut tasks = Vec::new();
    for set in &lineage.prepare_data {
        for target in select_targets(&set.backup, source_target)? {
            let action = action_name(RestoreStage::PrepareData, None, target.map(|t| t.name.as_str()));
            tasks.extend(
                engine
                    .manager()
                    .build_prepare_data_tasks(&request, set, target, &action)
                    .await?,
            );
        }
    }
    for set in &lineage.post_ready {
        let steps = set.action_definition.as_ref().map_or(0, |d| d.post_ready().len());
        for target in select_targets(&set.backup, source_target)? {
            for step in 0..steps {
                tasks.extend(
                    engine
                        .manager()
                        .build_post_ready_tasks(&request, set, target, step)
                        .await?,
                );
            }
        }
    }

    Ok(Plan {
        restore: format!("{}/{}", request.namespace(), request.name()),
        prepare_data: lineage.prepare_data.iter().map(|s| s.backup_name().to_string()).collect(),
        post_ready: lineage.post_ready.iter().map(|s| s.backup_name().to_string()).collect(),
        tasks,
    })
}
