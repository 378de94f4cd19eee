//! Typed error taxonomy for the deployment engine.
//!
//! Every fallible engine operation resolves to an `EngineError`. The first
//! five variants mirror the externally visible failure classes (unsupported
//! stack, source sync, image build, container run, unknown workload); the
//! rest wrap I/O and internal errors from collaborators.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unsupported project: {reason}")]
    UnsupportedProject { reason: String },

    #[error("source sync failed: {0}")]
    Sync(String),

    #[error("image build failed: {0}")]
    Build(String),

    #[error("container failed to start: {0}")]
    Run(String),

    #[error("workload {0} not found")]
    NotFound(i64),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    /// Short machine-readable class name, used when writing an error trail
    /// into a workload's log buffer.
    pub fn class(&self) -> &'static str {
        match self {
            Self::UnsupportedProject { .. } => "unsupported_project",
            Self::Sync(_) => "sync",
            Self::Build(_) => "build",
            Self::Run(_) => "run",
            Self::NotFound(_) => "not_found",
            Self::Io(_) => "io",
            Self::Other(_) => "internal",
        }
    }
}
