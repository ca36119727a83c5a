//! casework - run analysis workflows against evidence stores.
//!
//! Usage:
//!   casework run --workflow <file> --plugins <dir> <STORE>...   Run a workflow on each store
//!   casework validate --workflow <file>                        Validate a workflow without running
//!   casework list --workflow <file>                            List tasks in execution order
//!   casework plugins                                           List built-in plugins

use casework::{
    ContainerExitPolicy, EngineConfig, Event, EventBus, EventHandler, PluginRegistry,
    StoreAccess, WorkflowError, YamlLoader,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// casework - a small workflow engine for analysis tasks
#[derive(Parser)]
#[command(name = "casework")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow against one or more stores
    Run {
        /// Workflow YAML file
        #[arg(short, long, value_name = "FILE")]
        workflow: PathBuf,

        /// Directory holding plugin scripts and plugin build contexts
        #[arg(short, long, value_name = "DIR")]
        plugins: PathBuf,

        /// Engine configuration file
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Maximum concurrent tasks (default: unlimited)
        #[arg(short = 't', long)]
        max_concurrent_tasks: Option<usize>,

        /// Global argument as key=value; may be repeated
        #[arg(long = "arg", value_name = "KEY=VALUE", value_parser = parse_argument)]
        arguments: Vec<(String, serde_json::Value)>,

        /// How concurrent tasks share the store (serialize-writes, serialize-tasks, concurrent)
        #[arg(long)]
        store_access: Option<StoreAccess>,

        /// Treatment of non-zero container exits (enforce, ignore)
        #[arg(long)]
        container_exit: Option<ContainerExitPolicy>,

        /// Store directories, run one after another
        #[arg(value_name = "STORE", required = true)]
        stores: Vec<PathBuf>,
    },

    /// Validate a workflow without running it
    Validate {
        /// Workflow YAML file
        #[arg(short, long, value_name = "FILE")]
        workflow: PathBuf,
    },

    /// List the tasks of a workflow in execution order
    List {
        /// Workflow YAML file
        #[arg(short, long, value_name = "FILE")]
        workflow: PathBuf,
    },

    /// List built-in plugins
    Plugins,
}

/// Logs workflow events.
struct LoggingHandler;

#[async_trait::async_trait]
impl EventHandler for LoggingHandler {
    async fn handle(&self, event: &Event) {
        match event {
            Event::WorkflowStarted {
                run_id, task_count, ..
            } => {
                info!("Workflow started with {} task(s) (run: {})", task_count, run_id);
            }
            Event::WorkflowCompleted {
                run_id,
                success,
                duration,
                ..
            } => {
                if *success {
                    info!("Workflow completed in {:?} (run: {})", duration, run_id);
                } else {
                    error!("Workflow failed after {:?} (run: {})", duration, run_id);
                }
            }
            Event::TaskStarted { task_id, kind, .. } => {
                info!("  Task '{}' started ({})", task_id, kind);
            }
            Event::TaskCompleted {
                task_id,
                duration,
                output,
                ..
            } => {
                info!("  Task '{}' completed in {:?}", task_id, duration);
                if let Some(out) = output {
                    for line in out.trim().lines() {
                        info!("    {}", line);
                    }
                }
            }
            Event::TaskFailed { task_id, error, .. } => {
                warn!("  Task '{}' failed", task_id);
                for line in error.trim().lines() {
                    warn!("    {}", line);
                }
            }
            Event::TaskSkipped {
                task_id,
                blocked_by,
                ..
            } => {
                warn!("  Task '{}' skipped, requirement '{}' did not succeed", task_id, blocked_by);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            workflow,
            plugins,
            config,
            max_concurrent_tasks,
            arguments,
            store_access,
            container_exit,
            stores,
        } => {
            let mut engine = match config {
                Some(path) => YamlLoader::load_engine_config(path)?,
                None => EngineConfig::default(),
            };
            if max_concurrent_tasks.is_some() {
                engine.max_concurrent_tasks = max_concurrent_tasks;
            }
            if let Some(access) = store_access {
                engine.store_access = access;
            }
            if let Some(policy) = container_exit {
                engine.container_exit = policy;
            }
            for (name, value) in arguments {
                engine.arguments.insert(name, value);
            }

            let succeeded = run_workflow(&workflow, &plugins, &engine, &stores).await?;
            if !succeeded {
                std::process::exit(1);
            }
        }
        Commands::Validate { workflow } => {
            validate_workflow(&workflow)?;
        }
        Commands::List { workflow } => {
            list_workflow(&workflow)?;
        }
        Commands::Plugins => {
            list_plugins();
        }
    }

    Ok(())
}

/// Run the workflow against each store in turn. Returns whether every run
/// succeeded.
async fn run_workflow(
    path: &Path,
    plugin_dir: &Path,
    engine: &EngineConfig,
    stores: &[PathBuf],
) -> Result<bool, Box<dyn std::error::Error>> {
    info!("Loading workflow from: {}", path.display());
    let workflow = YamlLoader::load_workflow(path)?;
    YamlLoader::validate_workflow(&workflow)?;

    let event_bus = Arc::new(EventBus::new());
    event_bus.register(Arc::new(LoggingHandler)).await;

    let walker = engine
        .walker(PluginRegistry::with_builtins())
        .with_event_bus(event_bus);

    let mut succeeded = true;
    for store in stores {
        info!("Processing store: {}", store.display());
        match walker
            .run(&workflow, store, plugin_dir, &engine.arguments)
            .await
        {
            Ok(report) => {
                info!(
                    "Store {} done: {} task(s) succeeded",
                    store.display(),
                    report.succeeded_count()
                );
            }
            Err(WorkflowError::Failed(failure)) => {
                eprintln!("{}: {}", store.display(), failure);
                succeeded = false;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(succeeded)
}

/// Validate a workflow without running it.
fn validate_workflow(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    info!("Validating workflow: {}", path.display());

    let result = YamlLoader::load_workflow(path)
        .and_then(|workflow| YamlLoader::validate_workflow(&workflow).map(|()| workflow));
    match result {
        Ok(workflow) => {
            info!("Workflow is valid: {} task(s)", workflow.len());
            Ok(())
        }
        Err(e) => {
            error!("Validation failed: {}", e);
            Err(e.into())
        }
    }
}

/// List tasks in execution order with their requirements.
fn list_workflow(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let workflow = YamlLoader::load_workflow(path)?;
    let order = workflow.execution_order()?;

    if order.is_empty() {
        println!("No tasks in {}", path.display());
        return Ok(());
    }

    println!("Tasks in {}:", path.display());
    for task_id in &order {
        let Some(task) = workflow.get(task_id) else {
            continue;
        };
        if task.requires.is_empty() {
            println!("  - {} ({})", task_id, task.kind);
        } else {
            let requires: Vec<&str> = task.requires.iter().map(|r| r.as_str()).collect();
            println!(
                "  - {} ({}, requires: {})",
                task_id,
                task.kind,
                requires.join(", ")
            );
        }
    }

    Ok(())
}

fn list_plugins() {
    let registry = PluginRegistry::with_builtins();
    println!("Built-in plugins:");
    for (name, description) in registry.descriptions() {
        println!("  {:<12} {}", name, description);
    }
}

/// Parse `key=value`; the value is read as a YAML scalar so `--arg deep=true`
/// yields a boolean and `--arg depth=3` a number.
fn parse_argument(raw: &str) -> Result<(String, serde_json::Value), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    if name.is_empty() {
        return Err(format!("empty argument name in '{raw}'"));
    }
    let value = match serde_yaml::from_str::<serde_json::Value>(value) {
        Ok(scalar @ (serde_json::Value::Bool(_) | serde_json::Value::Number(_))) => scalar,
        _ => serde_json::Value::String(value.to_string()),
    };
    Ok((name.to_string(), value))
}
