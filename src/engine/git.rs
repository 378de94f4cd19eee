//! Version-control boundary: clone and pull via the `git` binary.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::errors::EngineError;

pub struct GitClient {
    bin: String,
}

impl GitClient {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    /// Clone `url` into `path`, creating parent directories as needed.
    pub async fn clone(&self, url: &str, path: &Path) -> Result<(), EngineError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        debug!(url, path = %path.display(), "cloning repository");
        let output = Command::new(&self.bin)
            .arg("clone")
            .arg(url)
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .await?;
        if !output.status.success() {
            return Err(EngineError::Sync(format!(
                "git clone failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    /// Fast-forward `path` to the remote head.
    pub async fn pull(&self, path: &Path) -> Result<(), EngineError> {
        debug!(path = %path.display(), "pulling latest source");
        let output = Command::new(&self.bin)
            .arg("-C")
            .arg(path)
            .args(["pull", "--ff-only"])
            .stdin(Stdio::null())
            .output()
            .await?;
        if !output.status.success() {
            return Err(EngineError::Sync(format!(
                "git pull failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}
