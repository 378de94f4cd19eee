//! Deployment orchestration engine.
//!
//! ## Overview
//!
//! Given a cloned source tree, the engine detects the project's stack,
//! generates a Dockerfile for it, builds an image, runs the container on
//! an internally allocated port, and keeps following logs and sampling
//! resource usage until the workload is stopped. A per-workload status
//! state machine (`PENDING → DEPLOYING → {SUCCESS, FAILED}`, `STOPPED`)
//! is persisted through the store on every transition.
//!
//! ## Module Map
//!
//! ```text
//!   trigger (CLI / embedder)
//!        │
//!        v
//!   orchestrator.rs ── status state machine, start/stop/restart,
//!        │              orphan reconcile + auto-start
//!        ├─> git.rs        clone/pull via the git CLI
//!        ├─> detect.rs     source tree → StackType
//!        ├─> recipe.rs     StackType → Dockerfile + default port
//!        ├─> runtime.rs    ContainerRuntime trait, DockerCli impl
//!        ├─> registry.rs   id → RuntimeState (handle, port, logs, stats)
//!        ├─> logs.rs       follow-stream → ring buffer task
//!        └─> stats.rs      2 s usage sampler task
//! ```
//!
//! ## Supporting Modules
//!
//! | Module     | Responsibility                                        |
//! |------------|-------------------------------------------------------|
//! | `models`   | Shared types: `WorkloadStatus`, `StackType`, `LogEntry`|
//! | `ports`    | Lowest-free-port computation over a registry snapshot  |

pub mod detect;
pub mod git;
pub mod logs;
pub mod models;
pub mod orchestrator;
pub mod ports;
pub mod recipe;
pub mod registry;
pub mod runtime;
pub mod stats;

pub use orchestrator::Orchestrator;
pub use registry::RuntimeRegistry;
