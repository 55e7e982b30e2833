//! Progress and reasoning events, and the adapters that consume them.
//!
//! Everything a client can learn about a running screening arrives as a
//! [`ScreeningEvent`] through [`ScreeningObserver::on_event`]:
//!
//! - [`CallbackObserver`]: in-process closures
//! - [`BroadcastObserver`]: JSON frames on a broadcast channel (WebSocket clients)
//! - [`StorePoller`]: replays persisted state for a session run elsewhere
//! - `ui::progress::ProgressObserver`: terminal progress bars

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use screenwise_common::{
    CurrentReference, ReasoningStep, RunProgress, RunStatus, ScreeningDecision,
};

use crate::store::ScreeningStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ScreeningEvent {
    RunStarted {
        session_id: String,
        project_id: String,
        total: usize,
    },
    CurrentReference {
        session_id: String,
        reference: CurrentReference,
    },
    Reasoning {
        step: ReasoningStep,
    },
    Progress {
        session_id: String,
        completed: usize,
        total: usize,
        eta_seconds: Option<u64>,
    },
    Decision {
        session_id: String,
        decision: ScreeningDecision,
    },
    RunFinished {
        session_id: String,
        status: RunStatus,
        error: Option<String>,
    },
}

impl ScreeningEvent {
    pub fn session_id(&self) -> &str {
        match self {
            Self::RunStarted { session_id, .. }
            | Self::CurrentReference { session_id, .. }
            | Self::Progress { session_id, .. }
            | Self::Decision { session_id, .. }
            | Self::RunFinished { session_id, .. } => session_id,
            Self::Reasoning { step } => &step.session_id,
        }
    }
}

/// Receives screening events in emission order. Must not block.
///
/// The coordinator catches a panic raised here, logs it and drops the event.
pub trait ScreeningObserver: Send + Sync {
    fn on_event(&self, event: &ScreeningEvent);
}

pub struct NoopObserver;

impl ScreeningObserver for NoopObserver {
    fn on_event(&self, _event: &ScreeningEvent) {}
}

type ProgressFn = Box<dyn Fn(usize, usize) + Send + Sync>;
type CurrentFn = Box<dyn Fn(&CurrentReference) + Send + Sync>;
type ReasoningFn = Box<dyn Fn(&ReasoningStep) + Send + Sync>;

/// Observer built from optional closures.
#[derive(Default)]
pub struct CallbackObserver {
    on_progress: Option<ProgressFn>,
    on_current_reference: Option<CurrentFn>,
    on_reasoning_step: Option<ReasoningFn>,
}

impl CallbackObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with `(completed, total)` after each reference.
    pub fn on_progress(mut self, f: impl Fn(usize, usize) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Box::new(f));
        self
    }

    pub fn on_current_reference(
        mut self,
        f: impl Fn(&CurrentReference) + Send + Sync + 'static,
    ) -> Self {
        self.on_current_reference = Some(Box::new(f));
        self
    }

    pub fn on_reasoning_step(mut self, f: impl Fn(&ReasoningStep) + Send + Sync + 'static) -> Self {
        self.on_reasoning_step = Some(Box::new(f));
        self
    }
}

impl ScreeningObserver for CallbackObserver {
    fn on_event(&self, event: &ScreeningEvent) {
        match event {
            ScreeningEvent::Progress {
                completed, total, ..
            } => {
                if let Some(f) = &self.on_progress {
                    f(*completed, *total);
                }
            }
            ScreeningEvent::CurrentReference { reference, .. } => {
                if let Some(f) = &self.on_current_reference {
                    f(reference);
                }
            }
            ScreeningEvent::Reasoning { step } => {
                if let Some(f) = &self.on_reasoning_step {
                    f(step);
                }
            }
            _ => {}
        }
    }
}

/// Scoped handle that publishes events as JSON on a broadcast channel.
///
/// Each run gets its own handle; dropping or closing it stops publication
/// without affecting other runs sharing the channel.
pub struct BroadcastObserver {
    tx: Option<broadcast::Sender<String>>,
}

impl BroadcastObserver {
    pub fn connect(tx: &broadcast::Sender<String>) -> Self {
        Self {
            tx: Some(tx.clone()),
        }
    }

    /// Publish one event. Returns the number of subscribers that received it.
    pub fn send(&self, event: &ScreeningEvent) -> usize {
        let Some(tx) = &self.tx else {
            return 0;
        };
        match serde_json::to_string(event) {
            // No subscribers is not an error.
            Ok(json) => tx.send(json).unwrap_or(0),
            Err(e) => {
                warn!(error = %e, "Failed to serialize screening event");
                0
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.tx.is_some()
    }

    pub fn close(mut self) {
        self.tx = None;
        debug!("Broadcast observer closed");
    }
}

impl ScreeningObserver for BroadcastObserver {
    fn on_event(&self, event: &ScreeningEvent) {
        self.send(event);
    }
}

/// Rebuilds the event stream of a session by polling the store.
pub struct StorePoller {
    store: Arc<dyn ScreeningStore>,
    interval: Duration,
}

impl StorePoller {
    pub fn new(store: Arc<dyn ScreeningStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Follow `session_id` until it reaches a terminal status or `cancel` fires.
    ///
    /// Returns the last observed progress, or `None` for an unknown session.
    pub async fn follow(
        &self,
        session_id: &str,
        observer: &dyn ScreeningObserver,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Option<RunProgress>> {
        let mut seen_steps = 0usize;
        let mut last_current: Option<String> = None;
        let mut last_completed: Option<usize> = None;

        loop {
            let Some(progress) = self.store.get_progress(session_id).await? else {
                return Ok(None);
            };

            let steps = self.store.reasoning_steps(session_id, seen_steps).await?;
            seen_steps += steps.len();
            for step in steps {
                observer.on_event(&ScreeningEvent::Reasoning { step });
            }

            if let Some(current) = &progress.current {
                if last_current.as_deref() != Some(current.id.as_str()) {
                    last_current = Some(current.id.clone());
                    observer.on_event(&ScreeningEvent::CurrentReference {
                        session_id: session_id.to_string(),
                        reference: current.clone(),
                    });
                }
            }

            if last_completed != Some(progress.completed) {
                last_completed = Some(progress.completed);
                observer.on_event(&ScreeningEvent::Progress {
                    session_id: session_id.to_string(),
                    completed: progress.completed,
                    total: progress.total,
                    eta_seconds: progress.eta_seconds,
                });
            }

            if progress.status.is_terminal() {
                observer.on_event(&ScreeningEvent::RunFinished {
                    session_id: session_id.to_string(),
                    status: progress.status,
                    error: None,
                });
                return Ok(Some(progress));
            }

            tokio::select! {
                _ = cancel.cancelled() => return Ok(Some(progress)),
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingObserver;
    use super::*;
    use crate::store::{MemoryStore, NewRun};
    use screenwise_common::{Criteria, Decision, Resolution, ReviewerResult};
    use std::sync::Mutex;

    fn decision(reference_id: &str) -> ScreeningDecision {
        let r = ReviewerResult::new(Decision::Include, 0.9, "r", "m");
        ScreeningDecision {
            reference_id: reference_id.into(),
            reviewer1: r.clone(),
            reviewer2: r,
            agreement: true,
            final_decision: Decision::Include,
            final_confidence: 0.9,
            conflict: false,
            resolution: Resolution::Agreement,
            decided_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = ScreeningEvent::Progress {
            session_id: "s".into(),
            completed: 2,
            total: 5,
            eta_seconds: Some(9),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"Progress\""));
        assert!(json.contains("\"data\""));
        assert!(json.contains("\"completed\":2"));

        let back: ScreeningEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.session_id(), "s");
    }

    #[test]
    fn test_callback_observer_routes_events() {
        let progress = Arc::new(Mutex::new(Vec::new()));
        let titles = Arc::new(Mutex::new(Vec::new()));
        let (p, t) = (progress.clone(), titles.clone());
        let observer = CallbackObserver::new()
            .on_progress(move |done, total| p.lock().unwrap().push((done, total)))
            .on_current_reference(move |r| t.lock().unwrap().push(r.title.clone()));

        observer.on_event(&ScreeningEvent::CurrentReference {
            session_id: "s".into(),
            reference: CurrentReference {
                id: "ref-1".into(),
                title: "Metformin".into(),
                authors: String::new(),
            },
        });
        observer.on_event(&ScreeningEvent::Progress {
            session_id: "s".into(),
            completed: 1,
            total: 3,
            eta_seconds: None,
        });
        // No reasoning callback registered; must not panic.
        observer.on_event(&ScreeningEvent::Reasoning {
            step: ReasoningStep::new("s", "ref-1", "orchestrator", "starting", "x"),
        });

        assert_eq!(*progress.lock().unwrap(), vec![(1, 3)]);
        assert_eq!(*titles.lock().unwrap(), vec!["Metformin".to_string()]);
    }

    #[tokio::test]
    async fn test_broadcast_observer_publishes_until_closed() {
        let (tx, mut rx) = broadcast::channel(16);
        let observer = BroadcastObserver::connect(&tx);
        assert!(observer.is_connected());

        let delivered = observer.send(&ScreeningEvent::Decision {
            session_id: "s".into(),
            decision: decision("ref-1"),
        });
        assert_eq!(delivered, 1);
        let frame = rx.recv().await.unwrap();
        assert!(frame.contains("\"type\":\"Decision\""));
        assert!(frame.contains("\"ref-1\""));

        observer.close();
        drop(tx);
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }

    #[test]
    fn test_broadcast_without_subscribers_is_silent() {
        let (tx, rx) = broadcast::channel::<String>(4);
        drop(rx);
        let observer = BroadcastObserver::connect(&tx);
        assert_eq!(
            observer.send(&ScreeningEvent::RunStarted {
                session_id: "s".into(),
                project_id: "p".into(),
                total: 1,
            }),
            0
        );
    }

    #[tokio::test]
    async fn test_store_poller_replays_finished_run() -> anyhow::Result<()> {
        let store = Arc::new(MemoryStore::new());
        store
            .create_run(&NewRun {
                session_id: "s".into(),
                project_id: "p".into(),
                stage: "title_abstract".into(),
                total: 1,
                criteria: Criteria::default().snapshot(),
            })
            .await?;
        store
            .update_current_reference(
                "s",
                &CurrentReference {
                    id: "ref-1".into(),
                    title: "T".into(),
                    authors: String::new(),
                },
            )
            .await?;
        store
            .append_reasoning_step(&ReasoningStep::new(
                "s",
                "ref-1",
                "orchestrator",
                "starting",
                "x",
            ))
            .await?;
        store.increment_counters("s", &decision("ref-1"), Some(0)).await?;
        store.mark_run_completed("s").await?;

        let observer = RecordingObserver::default();
        let poller = StorePoller::new(store, Duration::from_millis(10));
        let progress = poller
            .follow("s", &observer, &CancellationToken::new())
            .await?
            .expect("known session");
        assert_eq!(progress.completed, 1);

        let kinds: Vec<_> = observer
            .events()
            .iter()
            .map(|e| match e {
                ScreeningEvent::Reasoning { .. } => "reasoning",
                ScreeningEvent::CurrentReference { .. } => "current",
                ScreeningEvent::Progress { .. } => "progress",
                ScreeningEvent::RunFinished { .. } => "finished",
                _ => "other",
            })
            .collect();
        assert_eq!(kinds, vec!["reasoning", "current", "progress", "finished"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_store_poller_unknown_session() -> anyhow::Result<()> {
        let poller = StorePoller::new(Arc::new(MemoryStore::new()), Duration::from_millis(10));
        let result = poller
            .follow("missing", &NoopObserver, &CancellationToken::new())
            .await?;
        assert!(result.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_store_poller_stops_on_cancel() -> anyhow::Result<()> {
        let store = Arc::new(MemoryStore::new());
        store
            .create_run(&NewRun {
                session_id: "live".into(),
                project_id: "p".into(),
                stage: "title_abstract".into(),
                total: 3,
                criteria: Criteria::default().snapshot(),
            })
            .await?;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let poller = StorePoller::new(store, Duration::from_secs(60));
        let progress = poller.follow("live", &NoopObserver, &cancel).await?;
        assert_eq!(progress.map(|p| p.status), Some(RunStatus::Running));
        Ok(())
    }
}
