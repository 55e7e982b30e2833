//! Durable screening state: run progress, reasoning timeline, decision log.
//!
//! The coordinator is the only writer. Pollers, the CLI and the HTTP API read
//! through the same [`ScreeningStore`] trait.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::{DbHandle, ScreeningDb, SqliteStore};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use screenwise_common::{
    CriteriaSnapshot, CurrentReference, Decision, ReasoningStep, ReferenceStatus, RunProgress,
    RunStatus, ScreeningDecision,
};

/// Everything needed to open a run record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRun {
    pub session_id: String,
    pub project_id: String,
    pub stage: String,
    pub total: usize,
    pub criteria: CriteriaSnapshot,
}

/// One row of the append-only decision log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionLogEntry {
    pub session_id: String,
    pub project_id: String,
    pub stage: String,
    pub decision: ScreeningDecision,
}

/// Current screening fields of one reference in one project stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceScreening {
    pub project_id: String,
    pub reference_id: String,
    pub stage: String,
    pub status: ReferenceStatus,
    pub ai_decision: Decision,
    pub ai_confidence: f64,
    pub conflict: bool,
    pub reviewer1: String,
    pub reviewer2: String,
    /// The full reconciled decision, reviewer reasoning and assessments included.
    pub decision: ScreeningDecision,
    pub updated_at: DateTime<Utc>,
}

impl ReferenceScreening {
    pub fn from_decision(project_id: &str, stage: &str, decision: &ScreeningDecision) -> Self {
        Self {
            project_id: project_id.to_string(),
            reference_id: decision.reference_id.clone(),
            stage: stage.to_string(),
            status: decision.status(),
            ai_decision: decision.final_decision,
            ai_confidence: decision.final_confidence,
            conflict: decision.conflict,
            reviewer1: decision.reviewer1.reviewer.clone(),
            reviewer2: decision.reviewer2.reviewer.clone(),
            decision: decision.clone(),
            updated_at: decision.decided_at,
        }
    }
}

#[async_trait]
pub trait ScreeningStore: Send + Sync {
    /// Open a run in `running` state with zeroed counters.
    async fn create_run(&self, run: &NewRun) -> Result<()>;

    async fn update_current_reference(
        &self,
        session_id: &str,
        current: &CurrentReference,
    ) -> Result<()>;

    async fn append_reasoning_step(&self, step: &ReasoningStep) -> Result<()>;

    async fn append_decision_log(&self, entry: &DecisionLogEntry) -> Result<()>;

    /// Upsert the reference's current screening fields.
    async fn update_reference_status(
        &self,
        project_id: &str,
        stage: &str,
        decision: &ScreeningDecision,
    ) -> Result<()>;

    /// Count one decision and record the new estimate of time remaining.
    async fn increment_counters(
        &self,
        session_id: &str,
        decision: &ScreeningDecision,
        eta_seconds: Option<u64>,
    ) -> Result<()>;

    async fn mark_run_completed(&self, session_id: &str) -> Result<()> {
        self.mark_run_status(session_id, RunStatus::Completed).await
    }

    async fn mark_run_status(&self, session_id: &str, status: RunStatus) -> Result<()>;

    async fn get_progress(&self, session_id: &str) -> Result<Option<RunProgress>>;

    /// Reasoning steps of a session in insertion order, skipping the first `offset`.
    async fn reasoning_steps(&self, session_id: &str, offset: usize) -> Result<Vec<ReasoningStep>>;

    async fn decision_log(&self, project_id: &str) -> Result<Vec<DecisionLogEntry>>;

    async fn reference_status(
        &self,
        project_id: &str,
        stage: &str,
        reference_id: &str,
    ) -> Result<Option<ReferenceScreening>>;
}
