use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted lifecycle status of a workload.
///
/// `Success` is the only state that advances the last-deploy timestamp.
/// Stored uppercase in the database, matching the dashboard-facing values.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkloadStatus {
    Pending,
    Deploying,
    Success,
    Failed,
    Stopped,
}

impl WorkloadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Deploying => "DEPLOYING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Stopped => "STOPPED",
        }
    }
}

impl std::fmt::Display for WorkloadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkloadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "DEPLOYING" => Ok(Self::Deploying),
            "SUCCESS" => Ok(Self::Success),
            "FAILED" => Ok(Self::Failed),
            "STOPPED" => Ok(Self::Stopped),
            _ => Err(format!("Invalid workload status: {}", s)),
        }
    }
}

/// Technology classification of a workload's source tree.
///
/// Derived on demand by the detector; never persisted. Each supported
/// variant carries the default in-container listen port its recipe embeds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum StackType {
    Node,
    Python,
    JavaMaven,
    JavaGradle,
    Go,
    Unsupported,
}

impl StackType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Python => "python",
            Self::JavaMaven => "java-maven",
            Self::JavaGradle => "java-gradle",
            Self::Go => "go",
            Self::Unsupported => "unsupported",
        }
    }

    /// Default port the generated recipe listens on. `None` for
    /// `Unsupported`, which has no recipe.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::Node => Some(3000),
            Self::Python => Some(8000),
            Self::JavaMaven | Self::JavaGradle | Self::Go => Some(8080),
            Self::Unsupported => None,
        }
    }
}

impl std::fmt::Display for StackType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StackType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "node" => Ok(Self::Node),
            "python" => Ok(Self::Python),
            "java-maven" => Ok(Self::JavaMaven),
            "java-gradle" => Ok(Self::JavaGradle),
            "go" => Ok(Self::Go),
            "unsupported" => Ok(Self::Unsupported),
            _ => Err(format!("Invalid stack type: {}", s)),
        }
    }
}

/// Origin of a log line in a workload's ring buffer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    Stdout,
    Stderr,
    Info,
    Error,
}

impl LogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
            Self::Info => "info",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for LogKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stdout" => Ok(Self::Stdout),
            "stderr" => Ok(Self::Stderr),
            "info" => Ok(Self::Info),
            "error" => Ok(Self::Error),
            _ => Err(format!("Invalid log kind: {}", s)),
        }
    }
}

/// One line in a workload's bounded log buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub kind: LogKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(kind: LogKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Last-sampled resource usage for a running workload.
///
/// Always defined: defaults to zeros before the first sample and after stop.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StatsSample {
    pub cpu_percent: f64,
    pub memory_mb: u64,
    pub memory_limit_mb: u64,
}

/// A persisted workload record — one deployed repository-derived app.
///
/// Owned by the store; the engine writes only `status` and `last_deploy`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workload {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub repo_url: String,
    pub deploy_path: PathBuf,
    pub status: WorkloadStatus,
    pub last_deploy: Option<String>,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workload_status_roundtrip() {
        for s in &["PENDING", "DEPLOYING", "SUCCESS", "FAILED", "STOPPED"] {
            let parsed: WorkloadStatus = s.parse().unwrap();
            assert_eq!(parsed.as_str(), *s);
        }
        assert!("running".parse::<WorkloadStatus>().is_err());
    }

    #[test]
    fn test_stack_type_roundtrip() {
        for s in &[
            "node",
            "python",
            "java-maven",
            "java-gradle",
            "go",
            "unsupported",
        ] {
            let parsed: StackType = s.parse().unwrap();
            assert_eq!(parsed.as_str(), *s);
        }
        assert!("ruby".parse::<StackType>().is_err());
    }

    #[test]
    fn test_log_kind_roundtrip() {
        for s in &["stdout", "stderr", "info", "error"] {
            let parsed: LogKind = s.parse().unwrap();
            assert_eq!(parsed.as_str(), *s);
        }
        assert!("trace".parse::<LogKind>().is_err());
    }

    #[test]
    fn test_default_ports() {
        assert_eq!(StackType::Node.default_port(), Some(3000));
        assert_eq!(StackType::Python.default_port(), Some(8000));
        assert_eq!(StackType::JavaMaven.default_port(), Some(8080));
        assert_eq!(StackType::JavaGradle.default_port(), Some(8080));
        assert_eq!(StackType::Go.default_port(), Some(8080));
        assert_eq!(StackType::Unsupported.default_port(), None);
    }

    #[test]
    fn test_serde_string_forms() {
        assert_eq!(
            serde_json::to_string(&WorkloadStatus::Deploying).unwrap(),
            "\"DEPLOYING\""
        );
        assert_eq!(
            serde_json::to_string(&StackType::JavaMaven).unwrap(),
            "\"java-maven\""
        );
        assert_eq!(serde_json::to_string(&LogKind::Stderr).unwrap(), "\"stderr\"");
        assert_eq!(
            serde_json::from_str::<WorkloadStatus>("\"STOPPED\"").unwrap(),
            WorkloadStatus::Stopped
        );
    }

    #[test]
    fn test_stats_sample_defaults_to_zero() {
        let stats = StatsSample::default();
        assert_eq!(stats.cpu_percent, 0.0);
        assert_eq!(stats.memory_mb, 0);
        assert_eq!(stats.memory_limit_mb, 0);
    }
}
