use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use dockyard::config::DockyardConfig;

mod cmd;

#[derive(Parser)]
#[command(name = "dockyard")]
#[command(version, about = "Self-hosted deployment orchestrator")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to dockyard.toml. Defaults to ./dockyard.toml when present.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the data directory (database and cloned sources).
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the daemon: reconcile orphans, auto-start workloads, serve
    Run,
    /// Register a repository and run its first deployment
    Deploy {
        /// Workload id to assign
        id: i64,
        /// Git URL of the source repository
        url: String,
    },
    /// Build and start a workload from its existing source tree
    Start {
        id: i64,
        /// Pull the latest source before building
        #[arg(long)]
        pull: bool,
    },
    /// Stop a workload's container
    Stop { id: i64 },
    /// Stop then start a workload
    Restart { id: i64 },
    /// Delete a workload, its container, image, and source tree
    Remove { id: i64 },
    /// List all workloads
    List,
    /// Print a workload's buffered logs
    Logs { id: i64 },
    /// Print a workload's last resource sample
    Stats { id: i64 },
    /// Print a workload's assigned port
    Port { id: i64 },
    /// Detect the stack type of a source tree
    Detect { path: PathBuf },
    /// Print the Dockerfile generated for a stack type
    Recipe {
        /// One of: node, python, java-maven, java-gradle, go
        stack: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "dockyard=debug,info"
    } else {
        "dockyard=info,warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let config_path = cli
        .config
        .unwrap_or_else(|| PathBuf::from("dockyard.toml"));
    let mut config = DockyardConfig::load(&config_path)?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    match cli.command {
        Commands::Run => cmd::cmd_run(config).await,
        Commands::Deploy { id, url } => cmd::cmd_deploy(config, id, url).await,
        Commands::Start { id, pull } => cmd::cmd_start(config, id, pull).await,
        Commands::Stop { id } => cmd::cmd_stop(config, id).await,
        Commands::Restart { id } => cmd::cmd_restart(config, id).await,
        Commands::Remove { id } => cmd::cmd_remove(config, id).await,
        Commands::List => cmd::cmd_list(config).await,
        Commands::Logs { id } => cmd::cmd_logs(config, id).await,
        Commands::Stats { id } => cmd::cmd_stats(config, id).await,
        Commands::Port { id } => cmd::cmd_port(config, id).await,
        Commands::Detect { path } => cmd::cmd_detect(path),
        Commands::Recipe { stack } => cmd::cmd_recipe(stack),
    }
}
