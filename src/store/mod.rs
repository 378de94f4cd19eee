//! Persisted workload store.
//!
//! SQLite-backed record of every known workload and its environment
//! variables. The engine owns only two columns here — `status` and
//! `last_deploy` — everything else is written at provision/removal time
//! on behalf of the route layer.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::{Connection, params};

use crate::engine::models::{Workload, WorkloadStatus};

/// Async-safe handle to the store.
///
/// Wraps `Store` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, preventing synchronous
/// SQLite I/O from tying up async worker threads.
#[derive(Clone)]
pub struct StoreHandle {
    inner: Arc<std::sync::Mutex<Store>>,
}

impl StoreHandle {
    pub fn new(store: Store) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(store)),
        }
    }

    /// Run a closure with access to the store on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Store) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let store = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = store
                .lock()
                .map_err(|e| anyhow::anyhow!("store lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("store task panicked")?
    }
}

pub struct Store {
    conn: Connection,
}

struct WorkloadRow {
    id: i64,
    owner_id: i64,
    name: String,
    repo_url: String,
    deploy_path: String,
    status: String,
    last_deploy: Option<String>,
    created_at: String,
}

impl WorkloadRow {
    fn into_workload(self) -> Result<Workload> {
        let status = WorkloadStatus::from_str(&self.status)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Invalid status value in store")?;
        Ok(Workload {
            id: self.id,
            owner_id: self.owner_id,
            name: self.name,
            repo_url: self.repo_url,
            deploy_path: PathBuf::from(self.deploy_path),
            status,
            last_deploy: self.last_deploy,
            created_at: self.created_at,
        })
    }
}

const WORKLOAD_COLUMNS: &str =
    "id, owner_id, name, repo_url, deploy_path, status, last_deploy, created_at";

fn row_to_workload_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<WorkloadRow> {
    Ok(WorkloadRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        repo_url: row.get(3)?,
        deploy_path: row.get(4)?,
        status: row.get(5)?,
        last_deploy: row.get(6)?,
        created_at: row.get(7)?,
    })
}

impl Store {
    /// Open (or create) the database at the given path and run migrations.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    /// In-memory database, for tests.
    pub fn in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS workloads (
                    id INTEGER PRIMARY KEY,
                    owner_id INTEGER NOT NULL DEFAULT 0,
                    name TEXT NOT NULL,
                    repo_url TEXT NOT NULL,
                    deploy_path TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'PENDING',
                    last_deploy TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS env_variables (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    workload_id INTEGER NOT NULL REFERENCES workloads(id) ON DELETE CASCADE,
                    key TEXT NOT NULL,
                    value TEXT NOT NULL,
                    UNIQUE(workload_id, key)
                );

                CREATE INDEX IF NOT EXISTS idx_env_variables_workload
                    ON env_variables(workload_id);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    /// Insert a new workload in `PENDING`. The id is caller-assigned.
    pub fn create_workload(
        &self,
        id: i64,
        owner_id: i64,
        name: &str,
        repo_url: &str,
        deploy_path: &Path,
    ) -> Result<Workload> {
        let deploy_path = deploy_path.to_string_lossy().into_owned();
        self.conn
            .execute(
                "INSERT INTO workloads (id, owner_id, name, repo_url, deploy_path, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'PENDING')",
                params![id, owner_id, name, repo_url, deploy_path],
            )
            .context("Failed to insert workload")?;
        self.get_workload(id)?
            .context("Workload vanished after insert")
    }

    pub fn get_workload(&self, id: i64) -> Result<Option<Workload>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM workloads WHERE id = ?1",
                WORKLOAD_COLUMNS
            ))
            .context("Failed to prepare get_workload")?;
        let mut rows = stmt
            .query_map(params![id], row_to_workload_row)
            .context("Failed to query workload")?;
        match rows.next() {
            Some(row) => {
                let r = row.context("Failed to read workload row")?;
                Ok(Some(r.into_workload()?))
            }
            None => Ok(None),
        }
    }

    pub fn list_workloads(&self) -> Result<Vec<Workload>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM workloads ORDER BY id",
                WORKLOAD_COLUMNS
            ))
            .context("Failed to prepare list_workloads")?;
        let rows = stmt
            .query_map([], row_to_workload_row)
            .context("Failed to query workloads")?;
        let mut workloads = Vec::new();
        for row in rows {
            let r = row.context("Failed to read workload row")?;
            workloads.push(r.into_workload()?);
        }
        Ok(workloads)
    }

    pub fn update_status(&self, id: i64, status: WorkloadStatus) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE workloads SET status = ?1 WHERE id = ?2",
                params![status.as_str(), id],
            )
            .context("Failed to update status")?;
        if changed == 0 {
            anyhow::bail!("workload {} not found", id);
        }
        Ok(())
    }

    pub fn update_last_deploy(&self, id: i64, timestamp: &str) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE workloads SET last_deploy = ?1 WHERE id = ?2",
                params![timestamp, id],
            )
            .context("Failed to update last_deploy")?;
        if changed == 0 {
            anyhow::bail!("workload {} not found", id);
        }
        Ok(())
    }

    /// Replace the workload's environment variables wholesale.
    pub fn set_env_vars(&self, id: i64, vars: &[(String, String)]) -> Result<()> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute(
            "DELETE FROM env_variables WHERE workload_id = ?1",
            params![id],
        )
        .context("Failed to clear env variables")?;
        for (key, value) in vars {
            tx.execute(
                "INSERT INTO env_variables (workload_id, key, value) VALUES (?1, ?2, ?3)",
                params![id, key, value],
            )
            .context("Failed to insert env variable")?;
        }
        tx.commit().context("Failed to commit env variables")?;
        Ok(())
    }

    pub fn env_vars(&self, id: i64) -> Result<Vec<(String, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM env_variables WHERE workload_id = ?1 ORDER BY key")
            .context("Failed to prepare env_vars")?;
        let rows = stmt
            .query_map(params![id], |row| Ok((row.get(0)?, row.get(1)?)))
            .context("Failed to query env variables")?;
        let mut vars = Vec::new();
        for row in rows {
            vars.push(row.context("Failed to read env variable row")?);
        }
        Ok(vars)
    }

    /// Delete the workload and its env variables. Deleting an unknown id
    /// is not an error.
    pub fn delete_workload(&self, id: i64) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM env_variables WHERE workload_id = ?1",
                params![id],
            )
            .context("Failed to delete env variables")?;
        self.conn
            .execute("DELETE FROM workloads WHERE id = ?1", params![id])
            .context("Failed to delete workload")?;
        Ok(())
    }
}
