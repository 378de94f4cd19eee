//! Container runtime boundary.
//!
//! The engine drives the external container runtime through a small fixed
//! verb set: build, run detached with a port publish and restart policy,
//! stop/remove by name, remove image, list by prefix, one-shot stats
//! sample, and a following log stream. `DockerCli` is the production
//! implementation (shelling out to the `docker` binary); tests inject a
//! double through the `ContainerRuntime` trait.

use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc::{self, UnboundedReceiver};

use crate::engine::models::{LogKind, StatsSample};
use crate::errors::EngineError;

/// Deterministic container name for a workload, so lifecycle operations
/// never need an auxiliary lookup table.
pub fn container_name(prefix: &str, workload_id: i64) -> String {
    format!("{}-{}", prefix, workload_id)
}

/// Deterministic image name for a workload.
pub fn image_name(prefix: &str, workload_id: i64) -> String {
    format!("{}-image-{}", prefix, workload_id)
}

/// Outcome of a best-effort cleanup verb. An absent target is a normal
/// result, not an error; genuine failures surface as `Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cleanup {
    Removed,
    NotFound,
}

/// Parameters for launching a detached, auto-restarting container.
#[derive(Debug, Clone)]
pub struct RunSpec {
    pub image: String,
    pub name: String,
    pub host_port: u16,
    pub container_port: u16,
}

/// Receives build/runtime output lines as they are produced.
#[derive(Clone)]
pub struct LogSink(Arc<dyn Fn(LogKind, &str) + Send + Sync>);

impl LogSink {
    pub fn new(f: impl Fn(LogKind, &str) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// A sink that drops everything, for callers without a workload id.
    pub fn discard() -> Self {
        Self::new(|_, _| {})
    }

    pub fn emit(&self, kind: LogKind, line: &str) {
        let f = &*self.0;
        f(kind, line);
    }
}

/// Abstraction over the container runtime for testability.
/// Real implementation: `DockerCli`. Test double: mock in orchestrator tests.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Write the recipe into the source tree as `Dockerfile` and build an
    /// image from it, streaming build output into `sink`.
    async fn build(
        &self,
        image: &str,
        context: &Path,
        dockerfile: &str,
        sink: LogSink,
    ) -> Result<(), EngineError>;

    /// Launch a detached, auto-restarting container publishing
    /// `host_port -> container_port`. Returns the runtime container id.
    async fn run(&self, spec: &RunSpec) -> Result<String, EngineError>;

    async fn stop(&self, name: &str) -> Result<Cleanup, EngineError>;

    async fn remove(&self, name: &str) -> Result<Cleanup, EngineError>;

    async fn remove_image(&self, image: &str) -> Result<Cleanup, EngineError>;

    /// Names of all containers (running or not) whose name starts with
    /// `name_prefix`.
    async fn list_containers(&self, name_prefix: &str) -> Result<Vec<String>, EngineError>;

    /// Repositories of all images whose name starts with `repo_prefix`.
    async fn list_images(&self, repo_prefix: &str) -> Result<Vec<String>, EngineError>;

    /// One resource-usage sample for a running container.
    async fn sample_stats(&self, name: &str) -> Result<StatsSample, EngineError>;

    /// Attach a following read of the container's combined output streams.
    /// The stream ends when the container exits or the receiver is dropped.
    async fn follow_logs(
        &self,
        name: &str,
    ) -> Result<UnboundedReceiver<(LogKind, String)>, EngineError>;
}

/// Drives the `docker` binary.
pub struct DockerCli {
    bin: String,
}

impl DockerCli {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    async fn exec(&self, args: &[&str]) -> Result<std::process::Output, EngineError> {
        Ok(Command::new(&self.bin)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await?)
    }

    async fn cleanup(&self, args: &[&str], what: &str) -> Result<Cleanup, EngineError> {
        let output = self.exec(args).await?;
        if output.status.success() {
            return Ok(Cleanup::Removed);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.to_lowercase().contains("no such") {
            return Ok(Cleanup::NotFound);
        }
        Err(EngineError::Other(anyhow!(
            "docker {} failed: {}",
            what,
            stderr.trim()
        )))
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn build(
        &self,
        image: &str,
        context: &Path,
        dockerfile: &str,
        sink: LogSink,
    ) -> Result<(), EngineError> {
        tokio::fs::write(context.join("Dockerfile"), dockerfile).await?;

        let mut child = Command::new(&self.bin)
            .args(["build", "-t", image, "."])
            .current_dir(context)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Stream stderr on a side task, keeping a short tail for the error
        // message; stdout streams inline.
        let stderr = child.stderr.take();
        let err_sink = sink.clone();
        let tail_task = tokio::spawn(async move {
            let mut tail: VecDeque<String> = VecDeque::new();
            if let Some(stderr) = stderr {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    err_sink.emit(LogKind::Stderr, &line);
                    if tail.len() == 5 {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            }
            tail
        });

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                sink.emit(LogKind::Stdout, &line);
            }
        }

        let status = child.wait().await?;
        let tail = tail_task.await.unwrap_or_default();
        if !status.success() {
            return Err(EngineError::Build(format!(
                "docker build exited with {:?}: {}",
                status.code(),
                tail.into_iter().collect::<Vec<_>>().join(" | ")
            )));
        }
        Ok(())
    }

    async fn run(&self, spec: &RunSpec) -> Result<String, EngineError> {
        let publish = format!("{}:{}", spec.host_port, spec.container_port);
        let port_env = format!("PORT={}", spec.container_port);
        let output = self
            .exec(&[
                "run",
                "-d",
                "--restart",
                "unless-stopped",
                "-p",
                &publish,
                "-e",
                &port_env,
                "--name",
                &spec.name,
                &spec.image,
            ])
            .await?;

        if !output.status.success() {
            return Err(EngineError::Run(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn stop(&self, name: &str) -> Result<Cleanup, EngineError> {
        self.cleanup(&["stop", name], "stop").await
    }

    async fn remove(&self, name: &str) -> Result<Cleanup, EngineError> {
        self.cleanup(&["rm", "-f", name], "rm").await
    }

    async fn remove_image(&self, image: &str) -> Result<Cleanup, EngineError> {
        self.cleanup(&["rmi", "-f", image], "rmi").await
    }

    async fn list_containers(&self, name_prefix: &str) -> Result<Vec<String>, EngineError> {
        let filter = format!("name={}", name_prefix);
        let output = self
            .exec(&["ps", "-a", "--filter", &filter, "--format", "{{.Names}}"])
            .await?;
        if !output.status.success() {
            return Err(EngineError::Other(anyhow!(
                "docker ps failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        // The name filter matches substrings; re-check the prefix.
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|n| n.starts_with(name_prefix))
            .map(String::from)
            .collect())
    }

    async fn list_images(&self, repo_prefix: &str) -> Result<Vec<String>, EngineError> {
        let output = self
            .exec(&["images", "--format", "{{.Repository}}"])
            .await?;
        if !output.status.success() {
            return Err(EngineError::Other(anyhow!(
                "docker images failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|n| n.starts_with(repo_prefix))
            .map(String::from)
            .collect())
    }

    async fn sample_stats(&self, name: &str) -> Result<StatsSample, EngineError> {
        let output = self
            .exec(&[
                "stats",
                "--no-stream",
                "--format",
                "{{.CPUPerc}};{{.MemUsage}}",
                name,
            ])
            .await?;
        if !output.status.success() {
            return Err(EngineError::Other(anyhow!(
                "docker stats failed for {}: {}",
                name,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let line = String::from_utf8_lossy(&output.stdout);
        parse_stats_line(line.trim())
            .ok_or_else(|| EngineError::Other(anyhow!("unparseable stats output: {}", line.trim())))
    }

    async fn follow_logs(
        &self,
        name: &str,
    ) -> Result<UnboundedReceiver<(LogKind, String)>, EngineError> {
        let mut child = Command::new(&self.bin)
            .args(["logs", "-f", "--tail", "0", name])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let (tx, rx) = mpsc::unbounded_channel();

        let stderr = child.stderr.take();
        let err_tx = tx.clone();
        tokio::spawn(async move {
            if let Some(stderr) = stderr {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if err_tx.send((LogKind::Stderr, line)).is_err() {
                        break;
                    }
                }
            }
        });

        let stdout = child.stdout.take();
        tokio::spawn(async move {
            if let Some(stdout) = stdout {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if tx.send((LogKind::Stdout, line)).is_err() {
                        break;
                    }
                }
            }
            // Reached on container exit or receiver drop; reap the child.
            let _ = child.start_kill();
            let _ = child.wait().await;
        });

        Ok(rx)
    }
}

/// Parse one `docker stats` line in `{{.CPUPerc}};{{.MemUsage}}` format,
/// e.g. `0.07%;25.5MiB / 1.952GiB`.
pub(crate) fn parse_stats_line(line: &str) -> Option<StatsSample> {
    let (cpu_raw, mem_raw) = line.split_once(';')?;
    let cpu_percent = parse_percent(cpu_raw.trim())?;
    let (memory_mb, memory_limit_mb) = parse_mem_pair(mem_raw.trim())?;
    Some(StatsSample {
        cpu_percent,
        memory_mb,
        memory_limit_mb,
    })
}

fn parse_percent(s: &str) -> Option<f64> {
    s.strip_suffix('%')?.trim().parse().ok()
}

fn parse_mem_pair(s: &str) -> Option<(u64, u64)> {
    let (used, limit) = s.split_once('/')?;
    Some((parse_size_mb(used.trim())?, parse_size_mb(limit.trim())?))
}

fn parse_size_mb(s: &str) -> Option<u64> {
    // Longer suffixes first so "B" does not shadow "GiB"/"MB".
    const UNITS: &[(&str, f64)] = &[
        ("GiB", 1024.0 * 1024.0 * 1024.0),
        ("MiB", 1024.0 * 1024.0),
        ("KiB", 1024.0),
        ("GB", 1e9),
        ("MB", 1e6),
        ("kB", 1e3),
        ("B", 1.0),
    ];
    for (suffix, factor) in UNITS {
        if let Some(value) = s.strip_suffix(suffix) {
            let bytes = value.trim().parse::<f64>().ok()? * factor;
            return Some((bytes / (1024.0 * 1024.0)).round() as u64);
        }
    }
    None
}
