//! SQLite-backed local experiment store.
//!
//! Runs are buffered in memory and written in a single transaction when the
//! run finishes, so an aborted or failed run leaves no rows behind.

use super::{ExperimentTracker, TrackingRun};
use crate::error::MlError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS runs (
    run_id     TEXT PRIMARY KEY,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS metrics (
    run_id TEXT NOT NULL REFERENCES runs(run_id),
    key    TEXT NOT NULL,
    step   INTEGER NOT NULL,
    value  REAL NOT NULL,
    PRIMARY KEY (run_id, key, step)
);
CREATE TABLE IF NOT EXISTS params (
    run_id TEXT NOT NULL REFERENCES runs(run_id),
    key    TEXT NOT NULL,
    value  TEXT NOT NULL,
    PRIMARY KEY (run_id, key)
);
";

/// A committed local run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedRun {
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    /// Latest value per metric key.
    pub metrics: BTreeMap<String, f64>,
    pub params: BTreeMap<String, String>,
}

/// Local experiment tracker writing to a SQLite database file.
#[derive(Debug, Clone)]
pub struct LocalTracker {
    db_path: PathBuf,
}

impl LocalTracker {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Look up a committed run.
    pub async fn load_run(&self, run_id: &str) -> Result<Option<RecordedRun>, MlError> {
        let db_path = self.db_path.clone();
        let run_id = run_id.to_string();
        blocking(move || {
            let conn = open(&db_path)?;
            read_run(&conn, &run_id)
        })
        .await
    }

    /// Ids of all committed runs, oldest first.
    pub async fn list_runs(&self) -> Result<Vec<String>, MlError> {
        let db_path = self.db_path.clone();
        blocking(move || {
            let conn = open(&db_path)?;
            let mut stmt = conn.prepare("SELECT run_id FROM runs ORDER BY created_at, run_id")?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ids)
        })
        .await
    }
}

#[async_trait]
impl ExperimentTracker for LocalTracker {
    fn name(&self) -> &str {
        "local"
    }

    async fn start_run(&self) -> Result<Box<dyn TrackingRun>, MlError> {
        Ok(Box::new(LocalRun {
            db_path: self.db_path.clone(),
            run_id: uuid::Uuid::new_v4().simple().to_string(),
            created_at: Utc::now(),
            metrics: Vec::new(),
            params: Vec::new(),
        }))
    }
}

/// An open local run; nothing touches the database until `finish`.
struct LocalRun {
    db_path: PathBuf,
    run_id: String,
    created_at: DateTime<Utc>,
    metrics: Vec<(String, i64, f64)>,
    params: Vec<(String, String)>,
}

#[async_trait]
impl TrackingRun for LocalRun {
    fn run_id(&self) -> &str {
        &self.run_id
    }

    async fn log_metric(&mut self, key: &str, value: f64) -> Result<(), MlError> {
        let step = self.metrics.iter().filter(|(k, _, _)| k == key).count() as i64;
        self.metrics.push((key.to_string(), step, value));
        Ok(())
    }

    async fn log_param(&mut self, key: &str, value: &str) -> Result<(), MlError> {
        self.params.push((key.to_string(), value.to_string()));
        Ok(())
    }

    async fn finish(self: Box<Self>) -> Result<(), MlError> {
        let run = *self;
        blocking(move || commit(&run))
            .await
            .map_err(|e| match e {
                MlError::Tracking(_) => e,
                other => MlError::tracking(format!("local store commit failed: {other}")),
            })
    }

    async fn abort(self: Box<Self>, cause: &MlError) {
        tracing::debug!(
            run_id = %self.run_id,
            discarded_metrics = self.metrics.len(),
            discarded_params = self.params.len(),
            "local run discarded: {cause}"
        );
    }
}

fn commit(run: &LocalRun) -> Result<(), MlError> {
    if let Some(parent) = run.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut conn = open(&run.db_path)?;
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO runs (run_id, created_at) VALUES (?1, ?2)",
        params![run.run_id, run.created_at.to_rfc3339()],
    )?;
    for (key, step, value) in &run.metrics {
        tx.execute(
            "INSERT INTO metrics (run_id, key, step, value) VALUES (?1, ?2, ?3, ?4)",
            params![run.run_id, key, step, value],
        )?;
    }
    for (key, value) in &run.params {
        tx.execute(
            "INSERT INTO params (run_id, key, value) VALUES (?1, ?2, ?3)",
            params![run.run_id, key, value],
        )?;
    }
    // Dropping `tx` on any early return above rolls the run back.
    tx.commit()?;
    Ok(())
}

fn open(db_path: &Path) -> Result<Connection, MlError> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch(SCHEMA)?;
    Ok(conn)
}

fn read_run(conn: &Connection, run_id: &str) -> Result<Option<RecordedRun>, MlError> {
    let created_at: Option<String> = conn
        .query_row(
            "SELECT created_at FROM runs WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;
    let Some(created_at) = created_at else {
        return Ok(None);
    };
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| MlError::tracking(format!("corrupt run timestamp: {e}")))?
        .with_timezone(&Utc);

    let mut metrics = BTreeMap::new();
    let mut stmt =
        conn.prepare("SELECT key, value FROM metrics WHERE run_id = ?1 ORDER BY key, step")?;
    for row in stmt.query_map(params![run_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
    })? {
        let (key, value) = row?;
        metrics.insert(key, value);
    }

    let mut params_map = BTreeMap::new();
    let mut stmt = conn.prepare("SELECT key, value FROM params WHERE run_id = ?1")?;
    for row in stmt.query_map(params![run_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })? {
        let (key, value) = row?;
        params_map.insert(key, value);
    }

    Ok(Some(RecordedRun {
        run_id: run_id.to_string(),
        created_at,
        metrics,
        params: params_map,
    }))
}

async fn blocking<T, F>(f: F) -> Result<T, MlError>
where
    F: FnOnce() -> Result<T, MlError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| MlError::tracking(format!("Task join error: {e}")))?
}
