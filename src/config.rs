//! Engine configuration loaded from `dockyard.toml`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Runtime configuration for the deployment engine.
#[derive(Debug, Clone)]
pub struct DockyardConfig {
    /// Root for the database and cloned deployment trees.
    pub data_dir: PathBuf,
    pub docker_bin: String,
    pub git_bin: String,
    /// Prefix for container and image names; also the orphan-reconciliation key.
    pub name_prefix: String,
    /// First host port handed out to workloads.
    pub base_port: u16,
    pub stats_interval_secs: u64,
    pub build_timeout_secs: u64,
    /// Replay `start` for every known workload at daemon startup.
    pub auto_start: bool,
}

impl Default for DockyardConfig {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("dockyard"),
            docker_bin: "docker".to_string(),
            git_bin: "git".to_string(),
            name_prefix: "dockyard".to_string(),
            base_port: 3001,
            stats_interval_secs: 2,
            build_timeout_secs: 1800,
            auto_start: true,
        }
    }
}

/// Raw TOML structure for `dockyard.toml`.
#[derive(Debug, Deserialize)]
struct DockyardToml {
    engine: Option<EngineSection>,
}

#[derive(Debug, Deserialize)]
struct EngineSection {
    data_dir: Option<PathBuf>,
    docker_bin: Option<String>,
    git_bin: Option<String>,
    name_prefix: Option<String>,
    base_port: Option<u16>,
    stats_interval_secs: Option<u64>,
    build_timeout_secs: Option<u64>,
    auto_start: Option<bool>,
}

impl DockyardConfig {
    /// Load configuration from a `dockyard.toml` file.
    /// Returns defaults if the file doesn't exist.
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let toml: DockyardToml = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        let mut config = Self::default();
        if let Some(section) = toml.engine {
            if let Some(data_dir) = section.data_dir {
                config.data_dir = data_dir;
            }
            if let Some(docker_bin) = section.docker_bin {
                config.docker_bin = docker_bin;
            }
            if let Some(git_bin) = section.git_bin {
                config.git_bin = git_bin;
            }
            if let Some(name_prefix) = section.name_prefix {
                config.name_prefix = name_prefix;
            }
            if let Some(base_port) = section.base_port {
                config.base_port = base_port;
            }
            if let Some(stats_interval_secs) = section.stats_interval_secs {
                config.stats_interval_secs = stats_interval_secs;
            }
            if let Some(build_timeout_secs) = section.build_timeout_secs {
                config.build_timeout_secs = build_timeout_secs;
            }
            if let Some(auto_start) = section.auto_start {
                config.auto_start = auto_start;
            }
        }

        Ok(config)
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("dockyard.db")
    }

    pub fn deployments_dir(&self) -> PathBuf {
        self.data_dir.join("deployments")
    }
}
