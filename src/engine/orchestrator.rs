//! Deployment orchestration façade.
//!
//! Drives the per-workload status state machine
//! (`PENDING → DEPLOYING → {SUCCESS, FAILED}`, plus `STOPPED`) by
//! sequencing the detector, recipe generator, container runtime, registry,
//! and monitors, and persisting every transition to the store.
//!
//! Lifecycle operations for one workload are serialized through a
//! per-workload mutex; operations on different workloads run concurrently.
//! `stop` always finishes cancelling monitors and tearing the unit down
//! before a subsequent `start` for the same workload begins building, so
//! a workload never has two live units.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::config::DockyardConfig;
use crate::engine::git::GitClient;
use crate::engine::models::{LogEntry, LogKind, StatsSample, Workload, WorkloadStatus};
use crate::engine::registry::{ContainerHandle, MonitorHandles, RuntimeRegistry};
use crate::engine::runtime::{self, ContainerRuntime, LogSink, RunSpec};
use crate::engine::{detect, logs, recipe, stats};
use crate::errors::EngineError;
use crate::store::StoreHandle;

/// Bound on `docker run -d`, which normally returns in well under a second.
const RUN_TIMEOUT: Duration = Duration::from_secs(60);

pub struct Orchestrator {
    store: StoreHandle,
    registry: RuntimeRegistry,
    runtime: Arc<dyn ContainerRuntime>,
    git: GitClient,
    config: DockyardConfig,
    auto_start: AtomicBool,
    op_locks: std::sync::Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl Orchestrator {
    pub fn new(
        store: StoreHandle,
        registry: RuntimeRegistry,
        runtime: Arc<dyn ContainerRuntime>,
        git: GitClient,
        config: DockyardConfig,
    ) -> Self {
        let auto_start = AtomicBool::new(config.auto_start);
        Self {
            store,
            registry,
            runtime,
            git,
            config,
            auto_start,
            op_locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Per-workload mutual-exclusion scope for lifecycle operations.
    fn op_lock(&self, id: i64) -> Arc<tokio::sync::Mutex<()>> {
        self.op_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(id)
            .or_default()
            .clone()
    }

    async fn fetch(&self, id: i64) -> Result<Workload, EngineError> {
        self.store
            .call(move |s| s.get_workload(id))
            .await?
            .ok_or(EngineError::NotFound(id))
    }

    async fn set_status(&self, id: i64, status: WorkloadStatus) -> Result<(), EngineError> {
        self.store.call(move |s| s.update_status(id, status)).await?;
        Ok(())
    }

    /// Create the workload record in `PENDING`, clone its source tree, and
    /// run the first deployment. Returns the allocated port.
    pub async fn provision(&self, id: i64, source_url: &str) -> Result<u16, EngineError> {
        let name = repo_name(source_url);
        let deploy_path = self
            .config
            .deployments_dir()
            .join(format!("{}-{}", id, name));

        {
            let url = source_url.to_string();
            let path = deploy_path.clone();
            self.store
                .call(move |s| s.create_workload(id, 0, &name, &url, &path))
                .await?;
        }
        info!(workload = id, url = source_url, "provisioned workload");

        self.registry
            .append_log(id, LogKind::Info, &format!("cloning {}", source_url));
        if let Err(err) = self.git.clone(source_url, &deploy_path).await {
            self.registry
                .append_log(id, LogKind::Error, &format!("clone failed: {}", err));
            if let Err(e) = self.set_status(id, WorkloadStatus::Failed).await {
                warn!(workload = id, "failed to record FAILED status: {e}");
            }
            return Err(err);
        }

        self.start(id, false).await
    }

    /// Deploy (or redeploy) a workload. Resolves to `SUCCESS` with the
    /// allocated port, or `FAILED` with an error trail in the log buffer —
    /// never left in `DEPLOYING`.
    pub async fn start(&self, id: i64, pull: bool) -> Result<u16, EngineError> {
        let lock = self.op_lock(id);
        let _guard = lock.lock().await;

        let workload = self.fetch(id).await?;
        self.set_status(id, WorkloadStatus::Deploying).await?;
        self.registry
            .append_log(id, LogKind::Info, "starting deployment");

        match self.start_inner(&workload, pull).await {
            Ok(port) => {
                let deployed_at = Utc::now().to_rfc3339();
                self.store
                    .call(move |s| {
                        s.update_status(id, WorkloadStatus::Success)?;
                        s.update_last_deploy(id, &deployed_at)
                    })
                    .await?;
                info!(workload = id, port, "deployment succeeded");
                Ok(port)
            }
            Err(err) => {
                // Leave no partially-registered handle, port, or monitor.
                self.teardown_runtime(id).await;
                self.registry.append_log(
                    id,
                    LogKind::Error,
                    &format!("deployment failed ({}): {}", err.class(), err),
                );
                if let Err(e) = self.set_status(id, WorkloadStatus::Failed).await {
                    warn!(workload = id, "failed to record FAILED status: {e}");
                }
                error!(workload = id, "deployment failed: {err}");
                Err(err)
            }
        }
    }

    async fn start_inner(&self, workload: &Workload, pull: bool) -> Result<u16, EngineError> {
        let id = workload.id;

        // Enforce the single-live-unit invariant before anything else.
        self.teardown_runtime(id).await;

        if pull {
            self.git.pull(&workload.deploy_path).await?;
            self.registry
                .append_log(id, LogKind::Info, "pulled latest source");
        }

        self.write_env_file(workload).await?;

        let stack = detect::detect(&workload.deploy_path)?;
        self.registry
            .append_log(id, LogKind::Info, &format!("detected {} project", stack));

        let recipe = recipe::for_stack(stack)?;
        let image = runtime::image_name(&self.config.name_prefix, id);
        let container = runtime::container_name(&self.config.name_prefix, id);

        let sink = {
            let registry = self.registry.clone();
            LogSink::new(move |kind, line| registry.append_log(id, kind, line))
        };
        let build_bound = Duration::from_secs(self.config.build_timeout_secs);
        timeout(
            build_bound,
            self.runtime
                .build(&image, &workload.deploy_path, &recipe.dockerfile, sink),
        )
        .await
        .map_err(|_| {
            EngineError::Build(format!(
                "timed out after {}s",
                self.config.build_timeout_secs
            ))
        })??;

        let port = self.registry.reserve_port(id, self.config.base_port);
        self.registry
            .append_log(id, LogKind::Info, &format!("assigned port {}", port));

        let spec = RunSpec {
            image: image.clone(),
            name: container.clone(),
            host_port: port,
            container_port: recipe.listen_port,
        };
        let container_id = timeout(RUN_TIMEOUT, self.runtime.run(&spec))
            .await
            .map_err(|_| {
                EngineError::Run(format!("timed out after {}s", RUN_TIMEOUT.as_secs()))
            })??;

        let log_stream = match self.runtime.follow_logs(&container).await {
            Ok(stream) => stream,
            Err(err) => {
                // Roll back the unit we just launched so no handle leaks.
                warn!(workload = id, "log attachment failed, rolling back: {err}");
                let _ = self.runtime.stop(&container).await;
                let _ = self.runtime.remove(&container).await;
                return Err(err);
            }
        };
        let log_task = logs::spawn_collector(log_stream, self.registry.clone(), id);
        let stats_task = stats::spawn_monitor(
            Arc::clone(&self.runtime),
            self.registry.clone(),
            id,
            container.clone(),
            Duration::from_secs(self.config.stats_interval_secs),
        );

        self.registry.install(
            id,
            ContainerHandle {
                id: container_id,
                name: container,
                image,
            },
            MonitorHandles {
                stats_task,
                log_task,
            },
        );

        Ok(port)
    }

    /// Materialize the workload's stored environment variables as a `.env`
    /// file in the source tree, so the image build picks them up.
    async fn write_env_file(&self, workload: &Workload) -> Result<(), EngineError> {
        let id = workload.id;
        let vars = self.store.call(move |s| s.env_vars(id)).await?;
        if vars.is_empty() {
            return Ok(());
        }
        let mut content = vars
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("\n");
        content.push('\n');
        tokio::fs::write(workload.deploy_path.join(".env"), content).await?;
        Ok(())
    }

    /// Stop a workload's runtime unit. Returns `true` iff something was
    /// actually running; stopping an idle workload is a no-op, not an
    /// error.
    pub async fn stop(&self, id: i64) -> Result<bool, EngineError> {
        let lock = self.op_lock(id);
        let _guard = lock.lock().await;

        let stopped = self.teardown_runtime(id).await;
        if stopped {
            self.registry.append_log(id, LogKind::Info, "workload stopped");
            self.set_status(id, WorkloadStatus::Stopped).await?;
            info!(workload = id, "stopped");
        }
        Ok(stopped)
    }

    pub async fn restart(&self, id: i64) -> Result<u16, EngineError> {
        self.stop(id).await?;
        self.start(id, false).await
    }

    /// Cancel monitors and tear down any live unit for `id`. Returns
    /// whether a unit was running. Cleanup is maximally complete:
    /// individual failures are logged and do not abort the remaining
    /// steps. Performs no runtime calls when nothing is running.
    async fn teardown_runtime(&self, id: i64) -> bool {
        let (handle, monitors) = self.registry.clear_runtime(id);
        // Monitors go first so no sampler reports on a unit mid-teardown.
        if let Some(monitors) = monitors {
            monitors.cancel();
        }
        let Some(handle) = handle else {
            return false;
        };

        if let Err(err) = self.runtime.stop(&handle.name).await {
            warn!(workload = id, container = %handle.name, "stop failed: {err}");
            self.registry
                .append_log(id, LogKind::Error, &format!("failed to stop container: {}", err));
        }
        if let Err(err) = self.runtime.remove(&handle.name).await {
            warn!(workload = id, container = %handle.name, "remove failed: {err}");
            self.registry.append_log(
                id,
                LogKind::Error,
                &format!("failed to remove container: {}", err),
            );
        }
        if let Err(err) = self.runtime.remove_image(&handle.image).await {
            warn!(workload = id, image = %handle.image, "image remove failed: {err}");
            self.registry
                .append_log(id, LogKind::Error, &format!("failed to remove image: {}", err));
        }
        self.registry.reset_stats(id);
        true
    }

    /// Delete a workload entirely: runtime unit, registry entry, store
    /// rows, and the deployment directory (best effort).
    pub async fn remove(&self, id: i64) -> Result<(), EngineError> {
        {
            let lock = self.op_lock(id);
            let _guard = lock.lock().await;

            self.teardown_runtime(id).await;
            self.registry.remove(id);

            let workload = self.store.call(move |s| s.get_workload(id)).await?;
            self.store.call(move |s| s.delete_workload(id)).await?;

            if let Some(w) = workload {
                if let Err(err) = tokio::fs::remove_dir_all(&w.deploy_path).await {
                    if err.kind() != std::io::ErrorKind::NotFound {
                        warn!(workload = id, "failed to delete deployment directory: {err}");
                    }
                }
            }
        }
        self.op_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&id);
        info!(workload = id, "removed");
        Ok(())
    }

    /// Startup sequence: sweep every container and image carrying the
    /// engine's name prefix (orphans of a previous process instance), then
    /// replay `start` for every persisted workload unless auto-start is
    /// disabled. Replays run concurrently, one task per workload.
    pub async fn reconcile_and_auto_start(self: &Arc<Self>) -> Result<(), EngineError> {
        self.reconcile_orphans().await?;

        if !self.auto_start.load(Ordering::SeqCst) {
            info!("auto-start disabled; skipping workload replay");
            return Ok(());
        }

        let workloads = self.store.call(|s| s.list_workloads()).await?;
        info!(count = workloads.len(), "replaying auto-start");
        for workload in workloads {
            let orchestrator = Arc::clone(self);
            tokio::spawn(async move {
                if let Err(err) = orchestrator.start(workload.id, false).await {
                    warn!(workload = workload.id, "auto-start failed: {err}");
                }
            });
        }
        Ok(())
    }

    async fn reconcile_orphans(&self) -> Result<(), EngineError> {
        let container_prefix = format!("{}-", self.config.name_prefix);
        let image_prefix = format!("{}-image-", self.config.name_prefix);

        let containers = self.runtime.list_containers(&container_prefix).await?;
        for name in &containers {
            info!(container = %name, "reconciling orphaned container");
            if let Err(err) = self.runtime.stop(name).await {
                warn!(container = %name, "orphan stop failed: {err}");
            }
            if let Err(err) = self.runtime.remove(name).await {
                warn!(container = %name, "orphan remove failed: {err}");
            }
        }

        let images = self.runtime.list_images(&image_prefix).await?;
        for image in &images {
            if let Err(err) = self.runtime.remove_image(image).await {
                warn!(image = %image, "orphan image remove failed: {err}");
            }
        }

        if !containers.is_empty() || !images.is_empty() {
            info!(
                containers = containers.len(),
                images = images.len(),
                "orphan reconciliation complete"
            );
        }
        Ok(())
    }

    // ── Read-side interface for the route layer ─────────────────────────

    /// Chronological log buffer; empty for an unknown workload.
    pub fn logs(&self, id: i64) -> Vec<LogEntry> {
        self.registry.logs(id)
    }

    /// Last stats sample; zeros for an unknown or idle workload.
    pub fn stats(&self, id: i64) -> StatsSample {
        self.registry.stats(id)
    }

    pub fn port(&self, id: i64) -> Option<u16> {
        self.registry.port(id)
    }

    pub async fn list(&self) -> Result<Vec<(Workload, Option<u16>)>, EngineError> {
        let workloads = self.store.call(|s| s.list_workloads()).await?;
        Ok(workloads
            .into_iter()
            .map(|w| {
                let port = self.registry.port(w.id);
                (w, port)
            })
            .collect())
    }

    pub fn set_auto_start(&self, enabled: bool) {
        self.auto_start.store(enabled, Ordering::SeqCst);
    }
}

/// Display name for a workload, derived from the last path segment of its
/// source URL with a trailing `.git` stripped.
fn repo_name(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    let last = trimmed.rsplit('/').next().unwrap_or(trimmed);
    let name = last.trim_end_matches(".git");
    if name.is_empty() {
        "workload".to_string()
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::runtime::Cleanup;
    use crate::store::Store;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    /// In-memory container runtime double. Tracks live containers/images
    /// and counts every runtime call.
    #[derive(Default)]
    struct MockRuntime {
        containers: Mutex<Vec<String>>,
        images: Mutex<Vec<String>>,
        calls: AtomicUsize,
        fail_build: AtomicBool,
    }

    impl MockRuntime {
        fn live_containers(&self) -> Vec<String> {
            self.containers.lock().unwrap().clone()
        }

        fn live_images(&self) -> Vec<String> {
            self.images.lock().unwrap().clone()
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ContainerRuntime for MockRuntime {
        async fn build(
            &self,
            image: &str,
            _context: &Path,
            _dockerfile: &str,
            sink: LogSink,
        ) -> Result<(), EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_build.load(Ordering::SeqCst) {
                return Err(EngineError::Build("simulated build failure".to_string()));
            }
            sink.emit(LogKind::Stdout, "Step 1/1 : FROM base");
            let mut images = self.images.lock().unwrap();
            if !images.iter().any(|i| i == image) {
                images.push(image.to_string());
            }
            Ok(())
        }

        async fn run(&self, spec: &RunSpec) -> Result<String, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.containers.lock().unwrap().push(spec.name.clone());
            Ok(format!("cid-{}", spec.name))
        }

        async fn stop(&self, name: &str) -> Result<Cleanup, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.containers.lock().unwrap().iter().any(|c| c == name) {
                Ok(Cleanup::Removed)
            } else {
                Ok(Cleanup::NotFound)
            }
        }

        async fn remove(&self, name: &str) -> Result<Cleanup, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut containers = self.containers.lock().unwrap();
            match containers.iter().position(|c| c == name) {
                Some(idx) => {
                    containers.remove(idx);
                    Ok(Cleanup::Removed)
                }
                None => Ok(Cleanup::NotFound),
            }
        }

        async fn remove_image(&self, image: &str) -> Result<Cleanup, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut images = self.images.lock().unwrap();
            match images.iter().position(|i| i == image) {
                Some(idx) => {
                    images.remove(idx);
                    Ok(Cleanup::Removed)
                }
                None => Ok(Cleanup::NotFound),
            }
        }

        async fn list_containers(&self, prefix: &str) -> Result<Vec<String>, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .containers
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.starts_with(prefix))
                .cloned()
                .collect())
        }

        async fn list_images(&self, prefix: &str) -> Result<Vec<String>, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .images
                .lock()
                .unwrap()
                .iter()
                .filter(|i| i.starts_with(prefix))
                .cloned()
                .collect())
        }

        async fn sample_stats(&self, name: &str) -> Result<StatsSample, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.containers.lock().unwrap().iter().any(|c| c == name) {
                Ok(StatsSample {
                    cpu_percent: 1.0,
                    memory_mb: 20,
                    memory_limit_mb: 512,
                })
            } else {
                Err(EngineError::Other(anyhow!("no such container")))
            }
        }

        async fn follow_logs(
            &self,
            name: &str,
        ) -> Result<UnboundedReceiver<(LogKind, String)>, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let (tx, rx) = mpsc::unbounded_channel();
            let _ = tx.send((LogKind::Stdout, format!("{} listening", name)));
            Ok(rx)
        }
    }

    struct Harness {
        orchestrator: Arc<Orchestrator>,
        runtime: Arc<MockRuntime>,
        store: StoreHandle,
        registry: RuntimeRegistry,
        _deploy_dirs: Vec<tempfile::TempDir>,
    }

    impl Harness {
        fn new() -> Self {
            let runtime = Arc::new(MockRuntime::default());
            let registry = RuntimeRegistry::new();
            let store = StoreHandle::new(Store::in_memory().unwrap());
            let config = DockyardConfig {
                stats_interval_secs: 3600, // keep the sampler quiet during tests
                ..DockyardConfig::default()
            };
            let orchestrator = Arc::new(Orchestrator::new(
                store.clone(),
                registry.clone(),
                Arc::clone(&runtime) as Arc<dyn ContainerRuntime>,
                GitClient::new("git"),
                config,
            ));
            Self {
                orchestrator,
                runtime,
                store,
                registry,
                _deploy_dirs: Vec::new(),
            }
        }

        /// Insert a workload whose deploy tree contains `files`.
        async fn seed(&mut self, id: i64, files: &[&str]) {
            let dir = tempfile::tempdir().unwrap();
            for f in files {
                std::fs::write(dir.path().join(f), "{}").unwrap();
            }
            let path = dir.path().to_path_buf();
            self.store
                .call(move |s| {
                    s.create_workload(id, 0, "app", "https://example.com/me/app.git", &path)
                })
                .await
                .unwrap();
            self._deploy_dirs.push(dir);
        }

        async fn status(&self, id: i64) -> WorkloadStatus {
            self.store
                .call(move |s| s.get_workload(id))
                .await
                .unwrap()
                .unwrap()
                .status
        }
    }

    #[tokio::test]
    async fn test_start_deploys_node_project() {
        let mut h = Harness::new();
        h.seed(1, &["package.json"]).await;

        let port = h.orchestrator.start(1, false).await.unwrap();
        assert_eq!(port, 3001);
        assert_eq!(h.orchestrator.port(1), Some(3001));
        assert_eq!(h.status(1).await, WorkloadStatus::Success);
        assert_eq!(h.runtime.live_containers(), vec!["dockyard-1"]);
        assert_eq!(h.runtime.live_images(), vec!["dockyard-image-1"]);

        let workload = h
            .store
            .call(|s| s.get_workload(1))
            .await
            .unwrap()
            .unwrap();
        assert!(workload.last_deploy.is_some());

        let messages: Vec<String> = h
            .orchestrator
            .logs(1)
            .iter()
            .map(|l| l.message.clone())
            .collect();
        assert!(messages.iter().any(|m| m == "detected node project"));
        assert!(messages.iter().any(|m| m == "assigned port 3001"));
        assert!(messages.iter().any(|m| m.contains("FROM base")));
    }

    #[tokio::test]
    async fn test_start_unsupported_resolves_to_failed() {
        let mut h = Harness::new();
        h.seed(1, &[]).await;

        let err = h.orchestrator.start(1, false).await.unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedProject { .. }));
        // Never left in DEPLOYING.
        assert_eq!(h.status(1).await, WorkloadStatus::Failed);
        assert_eq!(h.orchestrator.port(1), None);
        assert!(h.runtime.live_containers().is_empty());

        let logs = h.orchestrator.logs(1);
        let last = logs.last().unwrap();
        assert_eq!(last.kind, LogKind::Error);
        assert!(last.message.contains("unsupported_project"));
    }

    #[tokio::test]
    async fn test_build_failure_resolves_to_failed() {
        let mut h = Harness::new();
        h.seed(1, &["package.json"]).await;
        h.runtime.fail_build.store(true, Ordering::SeqCst);

        let err = h.orchestrator.start(1, false).await.unwrap_err();
        assert!(matches!(err, EngineError::Build(_)));
        assert_eq!(h.status(1).await, WorkloadStatus::Failed);
        assert_eq!(h.orchestrator.port(1), None);
        assert!(h.runtime.live_containers().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_workload_is_not_found() {
        let h = Harness::new();
        let err = h.orchestrator.start(42, false).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(42)));
    }

    #[tokio::test]
    async fn test_repeated_start_keeps_single_unit() {
        let mut h = Harness::new();
        h.seed(1, &["package.json"]).await;

        h.orchestrator.start(1, false).await.unwrap();
        h.orchestrator.start(1, false).await.unwrap();
        h.orchestrator.start(1, false).await.unwrap();

        assert_eq!(h.runtime.live_containers().len(), 1);
        assert_eq!(h.runtime.live_images().len(), 1);
    }

    #[tokio::test]
    async fn test_restart_replaces_unit() {
        let mut h = Harness::new();
        h.seed(1, &["package.json"]).await;

        let first = h.orchestrator.start(1, false).await.unwrap();
        let second = h.orchestrator.restart(1).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(h.runtime.live_containers().len(), 1);
        assert_eq!(h.status(1).await, WorkloadStatus::Success);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let mut h = Harness::new();
        h.seed(1, &["package.json"]).await;

        // Nothing running: returns false and touches the runtime zero times.
        assert!(!h.orchestrator.stop(1).await.unwrap());
        assert_eq!(h.runtime.call_count(), 0);
        assert_eq!(h.status(1).await, WorkloadStatus::Pending);

        h.orchestrator.start(1, false).await.unwrap();
        assert!(h.orchestrator.stop(1).await.unwrap());
        assert_eq!(h.status(1).await, WorkloadStatus::Stopped);
        assert_eq!(h.orchestrator.port(1), None);
        assert_eq!(h.orchestrator.stats(1), StatsSample::default());
        assert!(h.runtime.live_containers().is_empty());
        assert!(h.runtime.live_images().is_empty());

        // Second stop in a row: no-op again.
        assert!(!h.orchestrator.stop(1).await.unwrap());
    }

    #[tokio::test]
    async fn test_logs_survive_stop() {
        let mut h = Harness::new();
        h.seed(1, &["package.json"]).await;

        h.orchestrator.start(1, false).await.unwrap();
        h.orchestrator.stop(1).await.unwrap();

        let messages: Vec<String> = h
            .orchestrator
            .logs(1)
            .iter()
            .map(|l| l.message.clone())
            .collect();
        assert!(messages.iter().any(|m| m == "starting deployment"));
        assert!(messages.iter().any(|m| m == "workload stopped"));
    }

    #[tokio::test]
    async fn test_ports_unique_across_workloads() {
        let mut h = Harness::new();
        h.seed(1, &["package.json"]).await;
        h.seed(2, &["go.mod"]).await;

        let p1 = h.orchestrator.start(1, false).await.unwrap();
        let p2 = h.orchestrator.start(2, false).await.unwrap();
        assert_eq!(p1, 3001);
        assert_eq!(p2, 3002);

        // Stopping the first frees its port for the next workload.
        h.orchestrator.stop(1).await.unwrap();
        h.seed(3, &["package.json"]).await;
        assert_eq!(h.orchestrator.start(3, false).await.unwrap(), 3001);
    }

    #[tokio::test]
    async fn test_reconcile_clears_orphans() {
        let h = Harness::new();
        // Units left behind by a previous process instance.
        h.runtime
            .containers
            .lock()
            .unwrap()
            .extend(["dockyard-3".to_string(), "dockyard-9".to_string()]);
        h.runtime
            .images
            .lock()
            .unwrap()
            .push("dockyard-image-3".to_string());

        h.orchestrator.set_auto_start(false);
        h.orchestrator.reconcile_and_auto_start().await.unwrap();

        assert!(h.runtime.live_containers().is_empty());
        assert!(h.runtime.live_images().is_empty());
    }

    #[tokio::test]
    async fn test_auto_start_replays_workloads() {
        let mut h = Harness::new();
        h.seed(1, &["package.json"]).await;

        h.orchestrator.reconcile_and_auto_start().await.unwrap();

        // Replay runs on a spawned task; poll until it lands.
        for _ in 0..100 {
            if h.orchestrator.port(1).is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(h.orchestrator.port(1), Some(3001));
        assert_eq!(h.status(1).await, WorkloadStatus::Success);
    }

    #[tokio::test]
    async fn test_remove_discards_everything() {
        let mut h = Harness::new();
        h.seed(1, &["package.json"]).await;

        h.orchestrator.start(1, false).await.unwrap();
        h.orchestrator.remove(1).await.unwrap();

        assert!(h.runtime.live_containers().is_empty());
        assert!(!h.registry.contains(1));
        assert!(
            h.store
                .call(|s| s.get_workload(1))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_env_file_materialized_before_build() {
        let mut h = Harness::new();
        h.seed(1, &["package.json"]).await;
        h.store
            .call(|s| {
                s.set_env_vars(
                    1,
                    &[("NODE_ENV".to_string(), "production".to_string())],
                )
            })
            .await
            .unwrap();

        h.orchestrator.start(1, false).await.unwrap();

        let deploy_path = h
            .store
            .call(|s| s.get_workload(1))
            .await
            .unwrap()
            .unwrap()
            .deploy_path;
        let env = std::fs::read_to_string(deploy_path.join(".env")).unwrap();
        assert_eq!(env, "NODE_ENV=production\n");
    }

    #[tokio::test]
    async fn test_reads_never_fail_for_unknown_workload() {
        let h = Harness::new();
        assert!(h.orchestrator.logs(12345).is_empty());
        assert_eq!(h.orchestrator.stats(12345), StatsSample::default());
        assert_eq!(h.orchestrator.port(12345), None);
    }

    #[test]
    fn test_repo_name_derivation() {
        assert_eq!(repo_name("https://github.com/me/my-app.git"), "my-app");
        assert_eq!(repo_name("https://github.com/me/my-app"), "my-app");
        assert_eq!(repo_name("https://github.com/me/my-app/"), "my-app");
        assert_eq!(repo_name("git@host:thing.git"), "git@host:thing");
        assert_eq!(repo_name(""), "workload");
    }
}
