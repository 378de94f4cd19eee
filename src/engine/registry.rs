//! In-memory runtime registry.
//!
//! One entry per workload id, created lazily on first touch and discarded
//! only when the workload itself is deleted. An entry survives stop/start
//! cycles so operators keep log and stats history. The registry is an
//! explicit, injected object (cloned handles share state) with per-entry
//! locking; cross-entry reads take a consistent snapshot under the map
//! lock.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;

use crate::engine::models::{LogEntry, LogKind, StatsSample};
use crate::engine::ports;

/// Maximum retained log lines per workload; oldest evicted first.
pub const LOG_CAPACITY: usize = 100;

/// Reference to the live container backing a workload.
#[derive(Debug, Clone)]
pub struct ContainerHandle {
    /// Runtime-assigned container id.
    pub id: String,
    /// Deterministic name (`<prefix>-<workloadId>`).
    pub name: String,
    /// Image the container was started from (`<prefix>-image-<workloadId>`).
    pub image: String,
}

/// Owned, cancellable handles for the background tasks attached to a
/// running workload. Both are cancelled before the container is torn down.
pub struct MonitorHandles {
    pub stats_task: JoinHandle<()>,
    pub log_task: JoinHandle<()>,
}

impl MonitorHandles {
    pub fn cancel(&self) {
        self.stats_task.abort();
        self.log_task.abort();
    }
}

/// Ephemeral per-workload state.
#[derive(Default)]
pub struct RuntimeState {
    pub container: Option<ContainerHandle>,
    pub port: Option<u16>,
    pub logs: VecDeque<LogEntry>,
    pub stats: StatsSample,
    pub monitors: Option<MonitorHandles>,
}

impl RuntimeState {
    fn push_log(&mut self, entry: LogEntry) {
        if self.logs.len() == LOG_CAPACITY {
            self.logs.pop_front();
        }
        self.logs.push_back(entry);
    }
}

type Entry = Arc<Mutex<RuntimeState>>;

/// Shared table of workload id → runtime state.
#[derive(Clone, Default)]
pub struct RuntimeRegistry {
    entries: Arc<Mutex<HashMap<i64, Entry>>>,
}

/// A poisoned registry lock only means a panic mid-update of ephemeral
/// state; recover the inner value rather than wedging every caller.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RuntimeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the entry for `id`, creating it on first touch.
    pub fn entry(&self, id: i64) -> Entry {
        lock(&self.entries).entry(id).or_default().clone()
    }

    fn get(&self, id: i64) -> Option<Entry> {
        lock(&self.entries).get(&id).cloned()
    }

    /// Append one line to the workload's ring buffer, evicting the oldest
    /// past capacity.
    pub fn append_log(&self, id: i64, kind: LogKind, message: &str) {
        let entry = self.entry(id);
        lock(&entry).push_log(LogEntry::new(kind, message));
    }

    /// Chronological copy of the buffer. Empty for an unknown workload.
    pub fn logs(&self, id: i64) -> Vec<LogEntry> {
        self.get(id)
            .map(|e| lock(&e).logs.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Last sample, or the zero default for an unknown workload.
    pub fn stats(&self, id: i64) -> StatsSample {
        self.get(id).map(|e| lock(&e).stats.clone()).unwrap_or_default()
    }

    pub fn set_stats(&self, id: i64, sample: StatsSample) {
        let entry = self.entry(id);
        lock(&entry).stats = sample;
    }

    /// Zero usage but keep the last known memory ceiling. Used when a
    /// sample fails because the container has exited.
    pub fn zero_usage(&self, id: i64) {
        if let Some(entry) = self.get(id) {
            let mut state = lock(&entry);
            state.stats.cpu_percent = 0.0;
            state.stats.memory_mb = 0;
        }
    }

    /// Reset the sample to the all-zero default. Used on stop.
    pub fn reset_stats(&self, id: i64) {
        if let Some(entry) = self.get(id) {
            lock(&entry).stats = StatsSample::default();
        }
    }

    pub fn port(&self, id: i64) -> Option<u16> {
        self.get(id).and_then(|e| lock(&e).port)
    }

    /// Atomically pick the lowest free port >= `base` across all entries
    /// and record it against `id`. Holding the map lock for the whole scan
    /// keeps concurrent reservations from colliding.
    pub fn reserve_port(&self, id: i64, base: u16) -> u16 {
        let mut map = lock(&self.entries);
        let used: Vec<u16> = map.values().filter_map(|e| lock(e).port).collect();
        let port = ports::lowest_free(base, &used);
        let entry = map.entry(id).or_default().clone();
        lock(&entry).port = Some(port);
        port
    }

    /// Snapshot of every assigned port across the registry.
    pub fn used_ports(&self) -> Vec<u16> {
        let map = lock(&self.entries);
        map.values().filter_map(|e| lock(e).port).collect()
    }

    /// Record a successfully started container and its attached monitors.
    pub fn install(&self, id: i64, container: ContainerHandle, monitors: MonitorHandles) {
        let entry = self.entry(id);
        let mut state = lock(&entry);
        state.container = Some(container);
        state.monitors = Some(monitors);
    }

    /// Take the live handle and monitors out of the entry, clearing the
    /// port. Returns what was present so the caller can tear it down;
    /// logs and stats stay behind.
    pub fn clear_runtime(&self, id: i64) -> (Option<ContainerHandle>, Option<MonitorHandles>) {
        match self.get(id) {
            Some(entry) => {
                let mut state = lock(&entry);
                state.port = None;
                (state.container.take(), state.monitors.take())
            }
            None => (None, None),
        }
    }

    /// Drop the whole entry. Only called when the workload is deleted.
    pub fn remove(&self, id: i64) {
        lock(&self.entries).remove(&id);
    }

    pub fn contains(&self, id: i64) -> bool {
        lock(&self.entries).contains_key(&id)
    }
}
