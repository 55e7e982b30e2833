//! Sequential screening runs.
//!
//! A run moves `running → completed`, or ends `cancelled` when its token
//! fires between references. Failing to open the run record is the only
//! error returned to the caller; everything that goes wrong while screening
//! one reference becomes a worst-case decision for that reference.

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use screenwise_common::{
    Criteria, CurrentReference, FailureKind, ReasoningStep, Reference, ReviewerResult,
    RunProgress, RunStatus, ScreeningDecision, new_session_id,
};

use crate::errors::{ConfigError, ScreeningError};
use crate::fallback::DualReviewer;
use crate::observer::{ScreeningEvent, ScreeningObserver};
use crate::reconcile::reconcile;
use crate::store::{DecisionLogEntry, NewRun, ScreeningStore};

pub const DEFAULT_STAGE: &str = "title_abstract";
const ORCHESTRATOR: &str = "orchestrator";

#[derive(Debug, Clone)]
pub struct ScreeningRequest {
    pub session_id: String,
    pub project_id: String,
    pub stage: String,
    pub references: Vec<Reference>,
    pub criteria: Criteria,
}

impl ScreeningRequest {
    pub fn new(project_id: &str, references: Vec<Reference>, criteria: Criteria) -> Self {
        Self {
            session_id: new_session_id(),
            project_id: project_id.to_string(),
            stage: DEFAULT_STAGE.to_string(),
            references,
            criteria,
        }
    }

    pub fn with_session_id(mut self, session_id: &str) -> Self {
        self.session_id = session_id.to_string();
        self
    }

    pub fn with_stage(mut self, stage: &str) -> Self {
        self.stage = stage.to_string();
        self
    }
}

#[derive(Debug, Clone)]
pub struct ScreeningOutcome {
    pub session_id: String,
    pub status: RunStatus,
    /// One per screened reference, in input order.
    pub decisions: Vec<ScreeningDecision>,
}

#[derive(Clone)]
pub struct ScreeningCoordinator {
    reviewer: Arc<dyn DualReviewer>,
    store: Arc<dyn ScreeningStore>,
    pacing: Duration,
}

impl ScreeningCoordinator {
    pub fn new(reviewer: Arc<dyn DualReviewer>, store: Arc<dyn ScreeningStore>) -> Self {
        Self {
            reviewer,
            store,
            pacing: Duration::from_millis(500),
        }
    }

    /// Pause between consecutive references.
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn store(&self) -> &Arc<dyn ScreeningStore> {
        &self.store
    }

    /// Check the reviewer can run before accepting a request.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.reviewer.validate()
    }

    pub async fn run_screening(
        &self,
        request: ScreeningRequest,
        observer: &dyn ScreeningObserver,
        cancel: &CancellationToken,
    ) -> Result<ScreeningOutcome, ScreeningError> {
        let ScreeningRequest {
            session_id,
            project_id,
            stage,
            references,
            criteria,
        } = request;
        let total = references.len();

        if let Err(e) = self.reviewer.validate() {
            error!(session_id = %session_id, error = %e, "Reviewer configuration is unusable");
            emit(observer, &ScreeningEvent::RunFinished {
                session_id: session_id.clone(),
                status: RunStatus::Error,
                error: Some(e.to_string()),
            });
            return Err(e.into());
        }

        let snapshot = criteria.snapshot();
        let run = NewRun {
            session_id: session_id.clone(),
            project_id: project_id.clone(),
            stage: stage.clone(),
            total,
            criteria: snapshot.clone(),
        };
        if let Err(source) = self.store.create_run(&run).await {
            error!(session_id = %session_id, error = %source, "Failed to create screening run");
            emit(observer, &ScreeningEvent::RunFinished {
                session_id: session_id.clone(),
                status: RunStatus::Error,
                error: Some(source.to_string()),
            });
            return Err(ScreeningError::RunInit { session_id, source });
        }

        info!(session_id = %session_id, project_id = %project_id, total, "Screening run started");
        emit(observer, &ScreeningEvent::RunStarted {
            session_id: session_id.clone(),
            project_id: project_id.clone(),
            total,
        });

        let ctx = RunContext {
            session_id: &session_id,
            project_id: &project_id,
            stage: &stage,
            criteria: &snapshot.criteria,
            observer,
        };
        let started = Instant::now();
        let mut progress = RunProgress::new(&session_id, &project_id, total);
        let mut decisions = Vec::with_capacity(total);
        let mut status = RunStatus::Completed;

        for (index, reference) in references.iter().enumerate() {
            if cancel.is_cancelled() {
                info!(
                    session_id = %session_id,
                    screened = index,
                    total,
                    "Screening run cancelled"
                );
                status = RunStatus::Cancelled;
                break;
            }

            let decision = self.screen_reference(&ctx, reference).await;

            progress.record(&decision);
            let eta_seconds = progress
                .estimate_remaining(started.elapsed())
                .map(|eta| eta.as_secs());
            self.persist(
                &ctx,
                "increment_counters",
                self.store
                    .increment_counters(&session_id, &decision, eta_seconds)
                    .await,
            );

            emit(observer, &ScreeningEvent::Decision {
                session_id: session_id.clone(),
                decision: decision.clone(),
            });
            emit(observer, &ScreeningEvent::Progress {
                session_id: session_id.clone(),
                completed: progress.completed,
                total,
                eta_seconds,
            });
            decisions.push(decision);

            if index + 1 < total && !self.pacing.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.pacing) => {}
                }
            }
        }

        let finished = match status {
            RunStatus::Completed => self.store.mark_run_completed(&session_id).await,
            other => self.store.mark_run_status(&session_id, other).await,
        };
        self.persist(&ctx, "mark_run_status", finished);

        info!(
            session_id = %session_id,
            status = %status,
            screened = decisions.len(),
            included = progress.included,
            excluded = progress.excluded,
            conflicts = progress.conflicts,
            "Screening run finished"
        );
        emit(observer, &ScreeningEvent::RunFinished {
            session_id: session_id.clone(),
            status,
            error: None,
        });

        Ok(ScreeningOutcome {
            session_id,
            status,
            decisions,
        })
    }

    /// Screen one reference. Never fails: errors and panics become a
    /// worst-case decision.
    async fn screen_reference(
        &self,
        ctx: &RunContext<'_>,
        reference: &Reference,
    ) -> ScreeningDecision {
        let current = CurrentReference {
            id: reference.id.clone(),
            title: reference.title.clone(),
            authors: reference.authors_or_empty().to_string(),
        };
        self.persist(
            ctx,
            "update_current_reference",
            self.store
                .update_current_reference(ctx.session_id, &current)
                .await,
        );
        emit(ctx.observer, &ScreeningEvent::CurrentReference {
            session_id: ctx.session_id.to_string(),
            reference: current,
        });

        self.record_step(
            ctx,
            ReasoningStep::new(
                ctx.session_id,
                &reference.id,
                ORCHESTRATOR,
                "starting",
                &format!(
                    "Screening \"{}\" with conservative and comprehensive reviewers",
                    reference.title
                ),
            ),
        )
        .await;

        let attempt = AssertUnwindSafe(self.review_and_reconcile(reference, ctx.criteria))
            .catch_unwind()
            .await;
        let decision = match attempt {
            Ok(Ok(decision)) => decision,
            Ok(Err(e)) => {
                error!(
                    session_id = ctx.session_id,
                    reference_id = %reference.id,
                    error = %e,
                    "Reference screening failed"
                );
                worst_case_decision(&reference.id, &e.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(
                    session_id = ctx.session_id,
                    reference_id = %reference.id,
                    panic = %message,
                    "Reference screening panicked"
                );
                worst_case_decision(&reference.id, &format!("panic: {}", message))
            }
        };

        for (step, result) in [
            ("conservative_review", &decision.reviewer1),
            ("comprehensive_review", &decision.reviewer2),
        ] {
            self.record_step(
                ctx,
                ReasoningStep::new(
                    ctx.session_id,
                    &reference.id,
                    &result.reviewer,
                    step,
                    &result.reasoning,
                )
                .with_confidence(result.confidence),
            )
            .await;
        }

        let entry = DecisionLogEntry {
            session_id: ctx.session_id.to_string(),
            project_id: ctx.project_id.to_string(),
            stage: ctx.stage.to_string(),
            decision: decision.clone(),
        };
        self.persist(
            ctx,
            "append_decision_log",
            self.store.append_decision_log(&entry).await,
        );
        self.persist(
            ctx,
            "update_reference_status",
            self.store
                .update_reference_status(ctx.project_id, ctx.stage, &decision)
                .await,
        );

        self.record_step(
            ctx,
            ReasoningStep::new(
                ctx.session_id,
                &reference.id,
                ORCHESTRATOR,
                "completed",
                &decision.summary(),
            )
            .with_confidence(decision.final_confidence),
        )
        .await;

        info!(
            session_id = ctx.session_id,
            reference_id = %reference.id,
            decision = decision.final_decision.as_str(),
            confidence = decision.final_confidence,
            conflict = decision.conflict,
            "Reference screened"
        );
        decision
    }

    async fn review_and_reconcile(
        &self,
        reference: &Reference,
        criteria: &Criteria,
    ) -> anyhow::Result<ScreeningDecision> {
        let pair = self.reviewer.review(reference, criteria).await?;
        Ok(reconcile(&reference.id, pair.conservative, pair.comprehensive))
    }

    async fn record_step(&self, ctx: &RunContext<'_>, step: ReasoningStep) {
        self.persist(
            ctx,
            "append_reasoning_step",
            self.store.append_reasoning_step(&step).await,
        );
        emit(ctx.observer, &ScreeningEvent::Reasoning { step });
    }

    fn persist(&self, ctx: &RunContext<'_>, operation: &'static str, result: anyhow::Result<()>) {
        if let Err(e) = result {
            warn!(
                session_id = ctx.session_id,
                operation,
                error = %e,
                "Store write failed, continuing"
            );
        }
    }
}

/// Borrowed per-run values threaded through reference screening.
struct RunContext<'a> {
    session_id: &'a str,
    project_id: &'a str,
    stage: &'a str,
    criteria: &'a Criteria,
    observer: &'a dyn ScreeningObserver,
}

/// Both slots failed internally: exclude and flag for human review.
fn worst_case_decision(reference_id: &str, reason: &str) -> ScreeningDecision {
    let sentinel = |stance: &str| {
        ReviewerResult::error_sentinel(
            &format!("{} {}", ORCHESTRATOR, stance),
            &format!("Screening aborted for this reference: {}", reason),
            FailureKind::Internal,
        )
    };
    reconcile(reference_id, sentinel("conservative"), sentinel("comprehensive"))
}

/// Deliver one event. A panicking observer loses the event, not the run.
fn emit(observer: &dyn ScreeningObserver, event: &ScreeningEvent) {
    let delivered = std::panic::catch_unwind(AssertUnwindSafe(|| observer.on_event(event)));
    if let Err(panic) = delivered {
        warn!(
            session_id = event.session_id(),
            panic = %panic_message(panic.as_ref()),
            "Screening observer panicked, event dropped"
        );
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
