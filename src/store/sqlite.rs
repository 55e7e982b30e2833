use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use screenwise_common::{
    CurrentReference, Decision, ReasoningStep, ReferenceStatus, Resolution, RunProgress,
    RunStatus, ScreeningDecision,
};

use super::{DecisionLogEntry, NewRun, ReferenceScreening, ScreeningStore};

/// Async-safe handle to the screening database.
///
/// Wraps `ScreeningDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<ScreeningDb>>,
}

impl DbHandle {
    pub fn new(db: ScreeningDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&ScreeningDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }
}

pub struct ScreeningDb {
    conn: Connection,
}

impl ScreeningDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database {}", path.display()))?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
            .context("Failed to configure SQLite connection")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS screening_runs (
                session_id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                stage TEXT NOT NULL,
                total INTEGER NOT NULL,
                completed INTEGER NOT NULL DEFAULT 0,
                included INTEGER NOT NULL DEFAULT 0,
                excluded INTEGER NOT NULL DEFAULT 0,
                conflicts INTEGER NOT NULL DEFAULT 0,
                current_reference_id TEXT,
                current_title TEXT,
                current_authors TEXT,
                status TEXT NOT NULL DEFAULT 'running',
                eta_seconds INTEGER,
                criteria_json TEXT NOT NULL,
                started_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS reasoning_steps (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL REFERENCES screening_runs(session_id) ON DELETE CASCADE,
                reference_id TEXT NOT NULL,
                reviewer TEXT NOT NULL,
                step TEXT NOT NULL,
                text TEXT NOT NULL,
                confidence REAL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS decision_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                project_id TEXT NOT NULL,
                stage TEXT NOT NULL,
                reference_id TEXT NOT NULL,
                final_decision TEXT NOT NULL,
                final_confidence REAL NOT NULL,
                agreement INTEGER NOT NULL,
                conflict INTEGER NOT NULL,
                resolution TEXT NOT NULL,
                reviewer1_json TEXT NOT NULL,
                reviewer2_json TEXT NOT NULL,
                decided_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS reference_screening (
                project_id TEXT NOT NULL,
                reference_id TEXT NOT NULL,
                stage TEXT NOT NULL,
                status TEXT NOT NULL,
                ai_decision TEXT NOT NULL,
                ai_confidence REAL NOT NULL,
                conflict INTEGER NOT NULL,
                reviewer1 TEXT NOT NULL,
                reviewer2 TEXT NOT NULL,
                decision_json TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (project_id, reference_id, stage)
            );

            CREATE INDEX IF NOT EXISTS idx_reasoning_steps_session ON reasoning_steps(session_id);
            CREATE INDEX IF NOT EXISTS idx_decision_logs_project ON decision_logs(project_id);
            CREATE INDEX IF NOT EXISTS idx_screening_runs_project ON screening_runs(project_id);
            ",
        )?;
        Ok(())
    }

    // ── Runs ──────────────────────────────────────────────────────────

    pub fn create_run(&self, run: &NewRun) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let criteria_json =
            serde_json::to_string(&run.criteria).context("Failed to serialize criteria")?;
        self.conn
            .execute(
                "INSERT INTO screening_runs
                    (session_id, project_id, stage, total, criteria_json, started_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![
                    run.session_id,
                    run.project_id,
                    run.stage,
                    run.total as i64,
                    criteria_json,
                    now
                ],
            )
            .context("Failed to insert screening run")?;
        Ok(())
    }

    pub fn update_current_reference(
        &self,
        session_id: &str,
        current: &CurrentReference,
    ) -> Result<()> {
        self.conn
            .execute(
                "UPDATE screening_runs
                 SET current_reference_id = ?1, current_title = ?2, current_authors = ?3,
                     updated_at = ?4
                 WHERE session_id = ?5",
                params![
                    current.id,
                    current.title,
                    current.authors,
                    Utc::now().to_rfc3339(),
                    session_id
                ],
            )
            .context("Failed to update current reference")?;
        Ok(())
    }

    pub fn increment_counters(
        &self,
        session_id: &str,
        decision: Decision,
        conflict: bool,
        eta_seconds: Option<u64>,
    ) -> Result<()> {
        let (included, excluded) = match decision {
            Decision::Include => (1, 0),
            Decision::Exclude => (0, 1),
        };
        self.conn
            .execute(
                "UPDATE screening_runs
                 SET completed = completed + 1,
                     included = included + ?1,
                     excluded = excluded + ?2,
                     conflicts = conflicts + ?3,
                     eta_seconds = ?4,
                     updated_at = ?5
                 WHERE session_id = ?6",
                params![
                    included,
                    excluded,
                    conflict as i64,
                    eta_seconds.map(|s| s as i64),
                    Utc::now().to_rfc3339(),
                    session_id
                ],
            )
            .context("Failed to increment run counters")?;
        Ok(())
    }

    pub fn mark_run_status(&self, session_id: &str, status: RunStatus) -> Result<()> {
        let updated = self
            .conn
            .execute(
                "UPDATE screening_runs SET status = ?1, updated_at = ?2 WHERE session_id = ?3",
                params![status.as_str(), Utc::now().to_rfc3339(), session_id],
            )
            .context("Failed to update run status")?;
        anyhow::ensure!(updated == 1, "Screening run {} not found", session_id);
        Ok(())
    }

    pub fn get_progress(&self, session_id: &str) -> Result<Option<RunProgress>> {
        let row = self
            .conn
            .query_row(
                "SELECT session_id, project_id, total, completed, included, excluded, conflicts,
                        current_reference_id, current_title, current_authors, status, eta_seconds,
                        started_at, updated_at
                 FROM screening_runs WHERE session_id = ?1",
                params![session_id],
                |row| {
                    Ok(RunRow {
                        session_id: row.get(0)?,
                        project_id: row.get(1)?,
                        total: row.get(2)?,
                        completed: row.get(3)?,
                        included: row.get(4)?,
                        excluded: row.get(5)?,
                        conflicts: row.get(6)?,
                        current_reference_id: row.get(7)?,
                        current_title: row.get(8)?,
                        current_authors: row.get(9)?,
                        status: row.get(10)?,
                        eta_seconds: row.get(11)?,
                        started_at: row.get(12)?,
                        updated_at: row.get(13)?,
                    })
                },
            )
            .optional()
            .context("Failed to query screening run")?;
        row.map(RunRow::into_progress).transpose()
    }

    // ── Reasoning timeline ────────────────────────────────────────────

    pub fn append_reasoning_step(&self, step: &ReasoningStep) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO reasoning_steps
                    (session_id, reference_id, reviewer, step, text, confidence, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    step.session_id,
                    step.reference_id,
                    step.reviewer,
                    step.step,
                    step.text,
                    step.confidence,
                    step.created_at.to_rfc3339()
                ],
            )
            .context("Failed to insert reasoning step")?;
        Ok(())
    }

    pub fn reasoning_steps(&self, session_id: &str, offset: usize) -> Result<Vec<ReasoningStep>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT session_id, reference_id, reviewer, step, text, confidence, created_at
                 FROM reasoning_steps WHERE session_id = ?1
                 ORDER BY id LIMIT -1 OFFSET ?2",
            )
            .context("Failed to prepare reasoning_steps")?;
        let rows = stmt
            .query_map(params![session_id, offset as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<f64>>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })
            .context("Failed to query reasoning steps")?;

        rows.map(|row| -> Result<ReasoningStep> {
            let (session_id, reference_id, reviewer, step, text, confidence, created_at) =
                row.context("Failed to read reasoning_steps row")?;
            Ok(ReasoningStep {
                session_id,
                reference_id,
                reviewer,
                step,
                text,
                confidence,
                created_at: parse_timestamp(&created_at)?,
            })
        })
        .collect()
    }

    // ── Decisions ─────────────────────────────────────────────────────

    pub fn append_decision_log(&self, entry: &DecisionLogEntry) -> Result<()> {
        let d = &entry.decision;
        self.conn
            .execute(
                "INSERT INTO decision_logs
                    (session_id, project_id, stage, reference_id, final_decision, final_confidence,
                     agreement, conflict, resolution, reviewer1_json, reviewer2_json, decided_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    entry.session_id,
                    entry.project_id,
                    entry.stage,
                    d.reference_id,
                    d.final_decision.as_str(),
                    d.final_confidence,
                    d.agreement,
                    d.conflict,
                    d.resolution.as_str(),
                    serde_json::to_string(&d.reviewer1)?,
                    serde_json::to_string(&d.reviewer2)?,
                    d.decided_at.to_rfc3339()
                ],
            )
            .context("Failed to insert decision log row")?;
        Ok(())
    }

    pub fn decision_log(&self, project_id: &str) -> Result<Vec<DecisionLogEntry>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT session_id, project_id, stage, reference_id, final_decision,
                        final_confidence,
                        agreement, conflict, resolution, reviewer1_json, reviewer2_json, decided_at
                 FROM decision_logs WHERE project_id = ?1 ORDER BY id",
            )
            .context("Failed to prepare decision_log")?;
        let rows = stmt
            .query_map(params![project_id], |row| {
                Ok(DecisionRow {
                    session_id: row.get(0)?,
                    project_id: row.get(1)?,
                    stage: row.get(2)?,
                    reference_id: row.get(3)?,
                    final_decision: row.get(4)?,
                    final_confidence: row.get(5)?,
                    agreement: row.get(6)?,
                    conflict: row.get(7)?,
                    resolution: row.get(8)?,
                    reviewer1_json: row.get(9)?,
                    reviewer2_json: row.get(10)?,
                    decided_at: row.get(11)?,
                })
            })
            .context("Failed to query decision log")?;

        rows.map(|row| -> Result<DecisionLogEntry> {
            row.context("Failed to read decision_logs row")?.into_entry()
        })
        .collect()
    }

    pub fn upsert_reference_status(&self, status: &ReferenceScreening) -> Result<()> {
        let decision_json =
            serde_json::to_string(&status.decision).context("Failed to serialize decision")?;
        self.conn
            .execute(
                "INSERT INTO reference_screening
                    (project_id, reference_id, stage, status, ai_decision, ai_confidence, conflict,
                     reviewer1, reviewer2, decision_json, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT(project_id, reference_id, stage) DO UPDATE SET
                    status = excluded.status,
                    ai_decision = excluded.ai_decision,
                    ai_confidence = excluded.ai_confidence,
                    conflict = excluded.conflict,
                    reviewer1 = excluded.reviewer1,
                    reviewer2 = excluded.reviewer2,
                    decision_json = excluded.decision_json,
                    updated_at = excluded.updated_at",
                params![
                    status.project_id,
                    status.reference_id,
                    status.stage,
                    status.status.as_str(),
                    status.ai_decision.as_str(),
                    status.ai_confidence,
                    status.conflict,
                    status.reviewer1,
                    status.reviewer2,
                    decision_json,
                    status.updated_at.to_rfc3339()
                ],
            )
            .context("Failed to upsert reference screening status")?;
        Ok(())
    }

    pub fn reference_status(
        &self,
        project_id: &str,
        stage: &str,
        reference_id: &str,
    ) -> Result<Option<ReferenceScreening>> {
        let row = self
            .conn
            .query_row(
                "SELECT status, ai_decision, ai_confidence, conflict, reviewer1, reviewer2,
                        decision_json, updated_at
                 FROM reference_screening
                 WHERE project_id = ?1 AND stage = ?2 AND reference_id = ?3",
                params![project_id, stage, reference_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, f64>(2)?,
                        row.get::<_, bool>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, String>(7)?,
                    ))
                },
            )
            .optional()
            .context("Failed to query reference screening status")?;

        let Some((
            status,
            ai_decision,
            ai_confidence,
            conflict,
            reviewer1,
            reviewer2,
            decision_json,
            updated_at,
        )) = row
        else {
            return Ok(None);
        };
        Ok(Some(ReferenceScreening {
            project_id: project_id.to_string(),
            reference_id: reference_id.to_string(),
            stage: stage.to_string(),
            status: ReferenceStatus::from_str(&status)?,
            ai_decision: Decision::from_str(&ai_decision)?,
            ai_confidence,
            conflict,
            reviewer1,
            reviewer2,
            decision: serde_json::from_str(&decision_json)
                .context("Invalid decision JSON in reference screening status")?,
            updated_at: parse_timestamp(&updated_at)?,
        }))
    }
}

struct RunRow {
    session_id: String,
    project_id: String,
    total: i64,
    completed: i64,
    included: i64,
    excluded: i64,
    conflicts: i64,
    current_reference_id: Option<String>,
    current_title: Option<String>,
    current_authors: Option<String>,
    status: String,
    eta_seconds: Option<i64>,
    started_at: String,
    updated_at: String,
}

impl RunRow {
    fn into_progress(self) -> Result<RunProgress> {
        let current = self.current_reference_id.map(|id| CurrentReference {
            id,
            title: self.current_title.unwrap_or_default(),
            authors: self.current_authors.unwrap_or_default(),
        });
        Ok(RunProgress {
            session_id: self.session_id,
            project_id: self.project_id,
            total: self.total as usize,
            completed: self.completed as usize,
            included: self.included as usize,
            excluded: self.excluded as usize,
            conflicts: self.conflicts as usize,
            current,
            status: RunStatus::from_str(&self.status)?,
            eta_seconds: self.eta_seconds.map(|s| s as u64),
            started_at: parse_timestamp(&self.started_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

struct DecisionRow {
    session_id: String,
    project_id: String,
    stage: String,
    reference_id: String,
    final_decision: String,
    final_confidence: f64,
    agreement: bool,
    conflict: bool,
    resolution: String,
    reviewer1_json: String,
    reviewer2_json: String,
    decided_at: String,
}

impl DecisionRow {
    fn into_entry(self) -> Result<DecisionLogEntry> {
        let decision = ScreeningDecision {
            reference_id: self.reference_id,
            reviewer1: serde_json::from_str(&self.reviewer1_json)
                .context("Invalid reviewer1 JSON in decision log")?,
            reviewer2: serde_json::from_str(&self.reviewer2_json)
                .context("Invalid reviewer2 JSON in decision log")?,
            agreement: self.agreement,
            final_decision: Decision::from_str(&self.final_decision)?,
            final_confidence: self.final_confidence,
            conflict: self.conflict,
            resolution: Resolution::from_str(&self.resolution)?,
            decided_at: parse_timestamp(&self.decided_at)?,
        };
        Ok(DecisionLogEntry {
            session_id: self.session_id,
            project_id: self.project_id,
            stage: self.stage,
            decision,
        })
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("Invalid timestamp '{}'", raw))
}

/// [`ScreeningStore`] backed by an embedded SQLite database.
#[derive(Clone)]
pub struct SqliteStore {
    db: DbHandle,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            db: DbHandle::new(ScreeningDb::new(path)?),
        })
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self {
            db: DbHandle::new(ScreeningDb::new_in_memory()?),
        })
    }
}

#[async_trait]
impl ScreeningStore for SqliteStore {
    async fn create_run(&self, run: &NewRun) -> Result<()> {
        let run = run.clone();
        self.db.call(move |db| db.create_run(&run)).await
    }

    async fn update_current_reference(
        &self,
        session_id: &str,
        current: &CurrentReference,
    ) -> Result<()> {
        let session_id = session_id.to_string();
        let current = current.clone();
        self.db
            .call(move |db| db.update_current_reference(&session_id, &current))
            .await
    }

    async fn append_reasoning_step(&self, step: &ReasoningStep) -> Result<()> {
        let step = step.clone();
        self.db.call(move |db| db.append_reasoning_step(&step)).await
    }

    async fn append_decision_log(&self, entry: &DecisionLogEntry) -> Result<()> {
        let entry = entry.clone();
        self.db.call(move |db| db.append_decision_log(&entry)).await
    }

    async fn update_reference_status(
        &self,
        project_id: &str,
        stage: &str,
        decision: &ScreeningDecision,
    ) -> Result<()> {
        let status = ReferenceScreening::from_decision(project_id, stage, decision);
        self.db
            .call(move |db| db.upsert_reference_status(&status))
            .await
    }

    async fn increment_counters(
        &self,
        session_id: &str,
        decision: &ScreeningDecision,
        eta_seconds: Option<u64>,
    ) -> Result<()> {
        let session_id = session_id.to_string();
        let (final_decision, conflict) = (decision.final_decision, decision.conflict);
        self.db
            .call(move |db| {
                db.increment_counters(&session_id, final_decision, conflict, eta_seconds)
            })
            .await
    }

    async fn mark_run_status(&self, session_id: &str, status: RunStatus) -> Result<()> {
        let session_id = session_id.to_string();
        self.db
            .call(move |db| db.mark_run_status(&session_id, status))
            .await
    }

    async fn get_progress(&self, session_id: &str) -> Result<Option<RunProgress>> {
        let session_id = session_id.to_string();
        self.db.call(move |db| db.get_progress(&session_id)).await
    }

    async fn reasoning_steps(&self, session_id: &str, offset: usize) -> Result<Vec<ReasoningStep>> {
        let session_id = session_id.to_string();
        self.db
            .call(move |db| db.reasoning_steps(&session_id, offset))
            .await
    }

    async fn decision_log(&self, project_id: &str) -> Result<Vec<DecisionLogEntry>> {
        let project_id = project_id.to_string();
        self.db.call(move |db| db.decision_log(&project_id)).await
    }

    async fn reference_status(
        &self,
        project_id: &str,
        stage: &str,
        reference_id: &str,
    ) -> Result<Option<ReferenceScreening>> {
        let (project_id, stage, reference_id) =
            (project_id.to_string(), stage.to_string(), reference_id.to_string());
        self.db
            .call(move |db| db.reference_status(&project_id, &stage, &reference_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::conformance;

    #[test]
    fn test_create_database_and_run_migrations() -> Result<()> {
        let db = ScreeningDb::new_in_memory()?;
        let table_count: i32 = db.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table'
             AND name IN ('screening_runs', 'reasoning_steps', 'decision_logs', 'reference_screening')",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(table_count, 4, "Expected 4 tables to exist");

        // Re-running migrations is a no-op.
        db.run_migrations()?;
        Ok(())
    }

    #[test]
    fn test_open_on_disk_creates_parent_dirs() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join("screenwise.db");
        let db = ScreeningDb::new(&path)?;
        db.create_run(&conformance::new_run("s-disk", 1))?;
        drop(db);

        let reopened = ScreeningDb::new(&path)?;
        assert!(reopened.get_progress("s-disk")?.is_some());
        Ok(())
    }

    #[test]
    fn test_duplicate_session_is_rejected() -> Result<()> {
        let db = ScreeningDb::new_in_memory()?;
        db.create_run(&conformance::new_run("dup", 1))?;
        assert!(db.create_run(&conformance::new_run("dup", 1)).is_err());
        Ok(())
    }

    #[test]
    fn test_mark_status_of_unknown_run_fails() -> Result<()> {
        let db = ScreeningDb::new_in_memory()?;
        assert!(db.mark_run_status("nope", RunStatus::Error).is_err());
        Ok(())
    }

    #[test]
    fn test_reasoning_step_for_unknown_run_violates_foreign_key() -> Result<()> {
        let db = ScreeningDb::new_in_memory()?;
        let step = ReasoningStep::new("ghost", "ref-1", "orchestrator", "starting", "x");
        assert!(db.append_reasoning_step(&step).is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_sqlite_run_lifecycle() -> Result<()> {
        conformance::run_lifecycle(&SqliteStore::in_memory()?).await
    }

    #[tokio::test]
    async fn test_sqlite_reasoning_in_order() -> Result<()> {
        conformance::reasoning_in_order(&SqliteStore::in_memory()?).await
    }

    #[tokio::test]
    async fn test_sqlite_decisions_and_reference_status() -> Result<()> {
        conformance::decisions_and_reference_status(&SqliteStore::in_memory()?).await
    }

    #[tokio::test]
    async fn test_sqlite_terminal_status() -> Result<()> {
        conformance::terminal_status(&SqliteStore::in_memory()?).await
    }
}
