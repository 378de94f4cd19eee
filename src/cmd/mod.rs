//! Subcommand drivers for the `dockyard` CLI.

use std::sync::Arc;

use anyhow::{Context, Result};

use dockyard::config::DockyardConfig;
use dockyard::engine::git::GitClient;
use dockyard::engine::runtime::DockerCli;
use dockyard::engine::{Orchestrator, RuntimeRegistry, detect, recipe};
use dockyard::store::{Store, StoreHandle};

/// Wire the engine together against the configured data directory.
fn init_engine(config: DockyardConfig) -> Result<Arc<Orchestrator>> {
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("Failed to create {}", config.data_dir.display()))?;
    std::fs::create_dir_all(config.deployments_dir())?;

    let store = StoreHandle::new(Store::open(&config.db_path())?);
    let registry = RuntimeRegistry::new();
    let runtime = Arc::new(DockerCli::new(config.docker_bin.clone()));
    let git = GitClient::new(config.git_bin.clone());
    Ok(Arc::new(Orchestrator::new(
        store, registry, runtime, git, config,
    )))
}

/// Daemon mode: reconcile orphaned containers, replay auto-start, then
/// serve until interrupted.
pub async fn cmd_run(config: DockyardConfig) -> Result<()> {
    let orchestrator = init_engine(config)?;
    orchestrator.reconcile_and_auto_start().await?;
    println!("dockyard running; press Ctrl-C to exit");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    println!("shutting down");
    Ok(())
}

pub async fn cmd_deploy(config: DockyardConfig, id: i64, url: String) -> Result<()> {
    let orchestrator = init_engine(config)?;
    let port = orchestrator
        .provision(id, &url)
        .await
        .with_context(|| format!("Failed to deploy workload {}", id))?;
    println!("workload {} deployed on port {}", id, port);
    Ok(())
}

pub async fn cmd_start(config: DockyardConfig, id: i64, pull: bool) -> Result<()> {
    let orchestrator = init_engine(config)?;
    let port = orchestrator
        .start(id, pull)
        .await
        .with_context(|| format!("Failed to start workload {}", id))?;
    println!("workload {} running on port {}", id, port);
    Ok(())
}

pub async fn cmd_stop(config: DockyardConfig, id: i64) -> Result<()> {
    let orchestrator = init_engine(config)?;
    if orchestrator.stop(id).await? {
        println!("workload {} stopped", id);
    } else {
        println!("workload {} was not running", id);
    }
    Ok(())
}

pub async fn cmd_restart(config: DockyardConfig, id: i64) -> Result<()> {
    let orchestrator = init_engine(config)?;
    let port = orchestrator
        .restart(id)
        .await
        .with_context(|| format!("Failed to restart workload {}", id))?;
    println!("workload {} running on port {}", id, port);
    Ok(())
}

pub async fn cmd_remove(config: DockyardConfig, id: i64) -> Result<()> {
    let orchestrator = init_engine(config)?;
    orchestrator.remove(id).await?;
    println!("workload {} removed", id);
    Ok(())
}

pub async fn cmd_list(config: DockyardConfig) -> Result<()> {
    let orchestrator = init_engine(config)?;
    let workloads = orchestrator.list().await?;
    if workloads.is_empty() {
        println!("no workloads");
        return Ok(());
    }
    println!(
        "{:<6} {:<24} {:<10} {:<6} {}",
        "ID", "NAME", "STATUS", "PORT", "LAST DEPLOY"
    );
    for (workload, port) in workloads {
        println!(
            "{:<6} {:<24} {:<10} {:<6} {}",
            workload.id,
            workload.name,
            workload.status,
            port.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
            workload.last_deploy.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

pub async fn cmd_logs(config: DockyardConfig, id: i64) -> Result<()> {
    let orchestrator = init_engine(config)?;
    for entry in orchestrator.logs(id) {
        println!(
            "{} [{}] {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.kind,
            entry.message
        );
    }
    Ok(())
}

pub async fn cmd_stats(config: DockyardConfig, id: i64) -> Result<()> {
    let orchestrator = init_engine(config)?;
    let stats = orchestrator.stats(id);
    println!(
        "cpu: {:.1}%  memory: {} MB / {} MB",
        stats.cpu_percent, stats.memory_mb, stats.memory_limit_mb
    );
    Ok(())
}

pub async fn cmd_port(config: DockyardConfig, id: i64) -> Result<()> {
    let orchestrator = init_engine(config)?;
    match orchestrator.port(id) {
        Some(port) => println!("{}", port),
        None => println!("workload {} has no assigned port", id),
    }
    Ok(())
}

/// Classify a source tree without touching the store or the runtime.
pub fn cmd_detect(path: std::path::PathBuf) -> Result<()> {
    let stack = detect::detect(&path)?;
    println!("{}", stack);
    Ok(())
}

/// Print the generated Dockerfile for a stack type.
pub fn cmd_recipe(stack: String) -> Result<()> {
    let stack = stack.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let recipe = recipe::for_stack(stack)?;
    print!("{}", recipe.dockerfile);
    Ok(())
}
