//! Log collection for running workloads.
//!
//! Consumes the line stream handed back by the container runtime's
//! following log attachment and appends each line to the workload's ring
//! buffer. The returned task handle is owned by the runtime registry and
//! aborted on stop; aborting drops the stream receiver, which in turn
//! shuts down the underlying attachment. History already appended stays
//! in the buffer.

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::engine::models::LogKind;
use crate::engine::registry::RuntimeRegistry;

pub fn spawn_collector(
    mut lines: UnboundedReceiver<(LogKind, String)>,
    registry: RuntimeRegistry,
    workload_id: i64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some((kind, line)) = lines.recv().await {
            registry.append_log(workload_id, kind, &line);
        }
        debug!(workload_id, "log stream ended");
    })
}
