use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use chrono::Utc;

use screenwise_common::{
    CurrentReference, ReasoningStep, RunProgress, RunStatus, ScreeningDecision,
};

use super::{DecisionLogEntry, NewRun, ReferenceScreening, ScreeningStore};

#[derive(Default)]
struct Inner {
    runs: HashMap<String, RunProgress>,
    steps: Vec<ReasoningStep>,
    decisions: Vec<DecisionLogEntry>,
    references: HashMap<(String, String, String), ReferenceScreening>,
}

/// Process-local [`ScreeningStore`] for tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    fail_create: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `create_run` fail, simulating an unreachable database.
    pub fn fail_create(self) -> Self {
        self.fail_create.store(true, Ordering::SeqCst);
        self
    }

    /// Toggle failures for every write after run creation.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn write<R>(&self, f: impl FnOnce(&mut Inner) -> Result<R>) -> Result<R> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("store writes are disabled");
        }
        let mut inner = self
            .inner
            .lock()
            .map_err(|e| anyhow!("Store lock poisoned: {}", e))?;
        f(&mut inner)
    }

    fn read<R>(&self, f: impl FnOnce(&Inner) -> R) -> Result<R> {
        let inner = self
            .inner
            .lock()
            .map_err(|e| anyhow!("Store lock poisoned: {}", e))?;
        Ok(f(&inner))
    }
}

fn run_mut<'a>(inner: &'a mut Inner, session_id: &str) -> Result<&'a mut RunProgress> {
    inner
        .runs
        .get_mut(session_id)
        .ok_or_else(|| anyhow!("Screening run {} not found", session_id))
}

#[async_trait]
impl ScreeningStore for MemoryStore {
    async fn create_run(&self, run: &NewRun) -> Result<()> {
        if self.fail_create.load(Ordering::SeqCst) {
            bail!("store is unavailable");
        }
        let mut inner = self
            .inner
            .lock()
            .map_err(|e| anyhow!("Store lock poisoned: {}", e))?;
        if inner.runs.contains_key(&run.session_id) {
            bail!("Screening run {} already exists", run.session_id);
        }
        inner.runs.insert(
            run.session_id.clone(),
            RunProgress::new(&run.session_id, &run.project_id, run.total),
        );
        Ok(())
    }

    async fn update_current_reference(
        &self,
        session_id: &str,
        current: &CurrentReference,
    ) -> Result<()> {
        self.write(|inner| {
            let run = run_mut(inner, session_id)?;
            run.current = Some(current.clone());
            run.updated_at = Utc::now();
            Ok(())
        })
    }

    async fn append_reasoning_step(&self, step: &ReasoningStep) -> Result<()> {
        self.write(|inner| {
            run_mut(inner, &step.session_id)?;
            inner.steps.push(step.clone());
            Ok(())
        })
    }

    async fn append_decision_log(&self, entry: &DecisionLogEntry) -> Result<()> {
        self.write(|inner| {
            inner.decisions.push(entry.clone());
            Ok(())
        })
    }

    async fn update_reference_status(
        &self,
        project_id: &str,
        stage: &str,
        decision: &ScreeningDecision,
    ) -> Result<()> {
        self.write(|inner| {
            let status = ReferenceScreening::from_decision(project_id, stage, decision);
            inner.references.insert(
                (
                    project_id.to_string(),
                    stage.to_string(),
                    decision.reference_id.clone(),
                ),
                status,
            );
            Ok(())
        })
    }

    async fn increment_counters(
        &self,
        session_id: &str,
        decision: &ScreeningDecision,
        eta_seconds: Option<u64>,
    ) -> Result<()> {
        self.write(|inner| {
            let run = run_mut(inner, session_id)?;
            run.record(decision);
            run.eta_seconds = eta_seconds;
            Ok(())
        })
    }

    async fn mark_run_status(&self, session_id: &str, status: RunStatus) -> Result<()> {
        self.write(|inner| {
            let run = run_mut(inner, session_id)?;
            run.status = status;
            run.updated_at = Utc::now();
            Ok(())
        })
    }

    async fn get_progress(&self, session_id: &str) -> Result<Option<RunProgress>> {
        self.read(|inner| inner.runs.get(session_id).cloned())
    }

    async fn reasoning_steps(&self, session_id: &str, offset: usize) -> Result<Vec<ReasoningStep>> {
        self.read(|inner| {
            inner
                .steps
                .iter()
                .filter(|s| s.session_id == session_id)
                .skip(offset)
                .cloned()
                .collect()
        })
    }

    async fn decision_log(&self, project_id: &str) -> Result<Vec<DecisionLogEntry>> {
        self.read(|inner| {
            inner
                .decisions
                .iter()
                .filter(|d| d.project_id == project_id)
                .cloned()
                .collect()
        })
    }

    async fn reference_status(
        &self,
        project_id: &str,
        stage: &str,
        reference_id: &str,
    ) -> Result<Option<ReferenceScreening>> {
        self.read(|inner| {
            inner
                .references
                .get(&(
                    project_id.to_string(),
                    stage.to_string(),
                    reference_id.to_string(),
                ))
                .cloned()
        })
    }
}
