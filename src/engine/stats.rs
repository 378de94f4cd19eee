//! Periodic resource-usage sampling.
//!
//! A fixed-interval timer polls the runtime for one stats sample per tick
//! and overwrites the workload's entry. A failed sample means the
//! container has exited, which is expected, not a fault: usage zeroes
//! silently and the loop keeps ticking until the handle is aborted on
//! stop.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::trace;

use crate::engine::registry::RuntimeRegistry;
use crate::engine::runtime::ContainerRuntime;

pub fn spawn_monitor(
    runtime: Arc<dyn ContainerRuntime>,
    registry: RuntimeRegistry,
    workload_id: i64,
    container: String,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match runtime.sample_stats(&container).await {
                Ok(sample) => registry.set_stats(workload_id, sample),
                Err(err) => {
                    trace!(workload_id, container, "stats sample failed: {err}");
                    registry.zero_usage(workload_id);
                }
            }
        }
    })
}
