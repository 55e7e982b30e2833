use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use screenwise_common::{Criteria, Reference};

use crate::coordinator::{DEFAULT_STAGE, ScreeningCoordinator, ScreeningRequest};
use crate::observer::BroadcastObserver;
use crate::store::ScreeningStore;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub coordinator: ScreeningCoordinator,
    pub ws_tx: broadcast::Sender<String>,
    /// Cancellation tokens of runs started by this server and still in flight.
    pub runs: Mutex<HashMap<String, CancellationToken>>,
}

impl AppState {
    pub fn new(coordinator: ScreeningCoordinator, ws_tx: broadcast::Sender<String>) -> Self {
        Self {
            coordinator,
            ws_tx,
            runs: Mutex::new(HashMap::new()),
        }
    }

    fn store(&self) -> &Arc<dyn ScreeningStore> {
        self.coordinator.store()
    }

    fn active_token(&self, session_id: &str) -> Result<Option<CancellationToken>, ApiError> {
        let runs = self
            .runs
            .lock()
            .map_err(|e| ApiError::Internal(format!("Run registry lock poisoned: {}", e)))?;
        Ok(runs.get(session_id).cloned())
    }

    fn release(&self, session_id: &str) {
        if let Ok(mut runs) = self.runs.lock() {
            runs.remove(session_id);
        }
    }
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct StartScreeningRequest {
    pub project_id: String,
    pub references: Vec<Reference>,
    #[serde(default)]
    pub criteria: Criteria,
    pub stage: Option<String>,
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartScreeningResponse {
    pub session_id: String,
    pub total: usize,
}

#[derive(Deserialize)]
pub struct ReasoningQuery {
    pub offset: Option<usize>,
}

#[derive(Deserialize)]
pub struct StageQuery {
    pub stage: Option<String>,
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

fn internal(e: anyhow::Error) -> ApiError {
    ApiError::Internal(format!("{:#}", e))
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/screenings", post(start_screening))
        .route("/api/screenings/{id}", get(get_screening))
        .route("/api/screenings/{id}/reasoning", get(get_reasoning))
        .route("/api/screenings/{id}/cancel", post(cancel_screening))
        .route("/api/projects/{id}/decisions", get(get_decisions))
        .route(
            "/api/projects/{id}/references/{reference_id}",
            get(get_reference_status),
        )
        .route("/health", get(health_check))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn start_screening(
    State(state): State<SharedState>,
    Json(req): Json<StartScreeningRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.project_id.trim().is_empty() {
        return Err(ApiError::BadRequest("project_id must not be empty".into()));
    }
    state
        .coordinator
        .validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let mut request = ScreeningRequest::new(&req.project_id, req.references, req.criteria)
        .with_stage(req.stage.as_deref().unwrap_or(DEFAULT_STAGE));
    if let Some(session_id) = &req.session_id {
        request = request.with_session_id(session_id);
    }
    let session_id = request.session_id.clone();
    let total = request.references.len();

    if state
        .store()
        .get_progress(&session_id)
        .await
        .map_err(internal)?
        .is_some()
    {
        return Err(ApiError::Conflict(format!(
            "Screening {} already exists",
            session_id
        )));
    }

    let cancel = CancellationToken::new();
    {
        let mut runs = state
            .runs
            .lock()
            .map_err(|e| ApiError::Internal(format!("Run registry lock poisoned: {}", e)))?;
        if runs.contains_key(&session_id) {
            return Err(ApiError::Conflict(format!(
                "Screening {} is already running",
                session_id
            )));
        }
        runs.insert(session_id.clone(), cancel.clone());
    }

    let task_state = state.clone();
    tokio::spawn(async move {
        let session_id = request.session_id.clone();
        let observer = BroadcastObserver::connect(&task_state.ws_tx);
        match task_state
            .coordinator
            .run_screening(request, &observer, &cancel)
            .await
        {
            Ok(outcome) => info!(
                session_id = %outcome.session_id,
                status = %outcome.status,
                decisions = outcome.decisions.len(),
                "Screening task finished"
            ),
            Err(e) => error!(session_id = %session_id, error = %e, "Screening task failed"),
        }
        observer.close();
        task_state.release(&session_id);
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(StartScreeningResponse { session_id, total }),
    ))
}

async fn get_screening(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let progress = state.store().get_progress(&id).await.map_err(internal)?;
    match progress {
        Some(progress) => Ok(Json(progress)),
        None => Err(ApiError::NotFound(format!("Screening {} not found", id))),
    }
}

async fn get_reasoning(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(query): Query<ReasoningQuery>,
) -> Result<impl IntoResponse, ApiError> {
    if state.store().get_progress(&id).await.map_err(internal)?.is_none() {
        return Err(ApiError::NotFound(format!("Screening {} not found", id)));
    }
    let steps = state
        .store()
        .reasoning_steps(&id, query.offset.unwrap_or(0))
        .await
        .map_err(internal)?;
    Ok(Json(steps))
}

async fn cancel_screening(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(token) = state.active_token(&id)? {
        token.cancel();
        info!(session_id = %id, "Cancellation requested");
        return Ok((
            StatusCode::ACCEPTED,
            Json(serde_json::json!({"session_id": id, "cancelling": true})),
        ));
    }
    match state.store().get_progress(&id).await.map_err(internal)? {
        Some(progress) => Err(ApiError::Conflict(format!(
            "Screening {} is not running (status: {})",
            id, progress.status
        ))),
        None => Err(ApiError::NotFound(format!("Screening {} not found", id))),
    }
}

async fn get_decisions(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let entries = state.store().decision_log(&id).await.map_err(internal)?;
    Ok(Json(entries))
}

async fn get_reference_status(
    State(state): State<SharedState>,
    Path((project_id, reference_id)): Path<(String, String)>,
    Query(query): Query<StageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let stage = query.stage.as_deref().unwrap_or(DEFAULT_STAGE);
    let status = state
        .store()
        .reference_status(&project_id, stage, &reference_id)
        .await
        .map_err(internal)?;
    match status {
        Some(status) => Ok(Json(status)),
        None => Err(ApiError::NotFound(format!(
            "Reference {} has not been screened in project {}",
            reference_id, project_id
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::{FallbackChain, ModelTarget, ReviewTier};
    use crate::gateway::testing::{ScriptedProvider, no_delay};
    use crate::gateway::{CompletionProvider, ModelGateway};
    use crate::store::MemoryStore;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use screenwise_common::{RunProgress, RunStatus};
    use std::time::Duration;
    use tower::ServiceExt;

    fn chain(provider: ScriptedProvider) -> FallbackChain {
        let provider: Arc<dyn CompletionProvider> = Arc::new(provider);
        let gateway = ModelGateway::new(provider, no_delay(1));
        FallbackChain::new(vec![ReviewTier::new(
            "primary",
            ModelTarget::new(gateway.clone(), "model-a"),
            ModelTarget::new(gateway, "model-b"),
        )])
    }

    fn test_state(reviewer: FallbackChain, pacing: Duration) -> SharedState {
        let store = Arc::new(MemoryStore::new());
        let coordinator =
            ScreeningCoordinator::new(Arc::new(reviewer), store).with_pacing(pacing);
        let (ws_tx, _) = broadcast::channel(64);
        Arc::new(AppState::new(coordinator, ws_tx))
    }

    fn test_app() -> (Router, SharedState) {
        let state = test_state(
            chain(ScriptedProvider::answering("mock", "include", 0.8)),
            Duration::ZERO,
        );
        (api_router().with_state(state.clone()), state)
    }

    async fn body_json<T: serde::de::DeserializeOwned>(body: Body) -> T {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn start_request(session_id: &str, references: usize) -> Request<Body> {
        let references: Vec<_> = (1..=references)
            .map(|i| {
                serde_json::json!({"id": format!("ref-{}", i), "title": format!("Study {}", i)})
            })
            .collect();
        Request::builder()
            .method("POST")
            .uri("/api/screenings")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({
                    "project_id": "project-1",
                    "session_id": session_id,
                    "references": references,
                    "criteria": {"population": "adults"}
                })
                .to_string(),
            ))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn wait_for_status(
        state: &SharedState,
        session_id: &str,
        status: RunStatus,
    ) -> RunProgress {
        for _ in 0..200 {
            if let Some(progress) = state.store().get_progress(session_id).await.unwrap() {
                if progress.status == status {
                    return progress;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("session {} never reached {}", session_id, status);
    }

    #[tokio::test]
    async fn test_health_check() {
        let (app, _) = test_app();
        let response = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_start_screening_runs_to_completion() {
        let (app, state) = test_app();

        let response = app.clone().oneshot(start_request("s-1", 3)).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let started: StartScreeningResponse = body_json(response.into_body()).await;
        assert_eq!(started.session_id, "s-1");
        assert_eq!(started.total, 3);

        wait_for_status(&state, "s-1", RunStatus::Completed).await;

        let response = app.clone().oneshot(get("/api/screenings/s-1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let progress: RunProgress = body_json(response.into_body()).await;
        assert_eq!(progress.completed, 3);
        assert_eq!(progress.included, 3);

        let response = app
            .clone()
            .oneshot(get("/api/screenings/s-1/reasoning?offset=1"))
            .await
            .unwrap();
        let steps: Vec<serde_json::Value> = body_json(response.into_body()).await;
        // Four steps per reference, first one skipped.
        assert_eq!(steps.len(), 11);

        let response = app
            .clone()
            .oneshot(get("/api/projects/project-1/decisions"))
            .await
            .unwrap();
        let decisions: Vec<serde_json::Value> = body_json(response.into_body()).await;
        assert_eq!(decisions.len(), 3);
        assert_eq!(decisions[0]["decision"]["reference_id"], "ref-1");

        let response = app
            .oneshot(get("/api/projects/project-1/references/ref-2"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let status: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(status["ai_decision"], "include");
        assert_eq!(status["decision"]["reference_id"], "ref-2");
        assert_eq!(status["decision"]["reviewer1"]["reasoning"], "scripted");
        assert_eq!(status["decision"]["reviewer2"]["reasoning"], "scripted");
    }

    #[tokio::test]
    async fn test_unknown_screening_is_not_found() {
        let (app, _) = test_app();
        for uri in [
            "/api/screenings/missing",
            "/api/screenings/missing/reasoning",
            "/api/projects/p/references/r",
        ] {
            let response = app.clone().oneshot(get(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_start_rejected_without_tiers() {
        let state = test_state(FallbackChain::new(Vec::new()), Duration::ZERO);
        let app = api_router().with_state(state);
        let response = app.oneshot(start_request("s-1", 1)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert!(body["error"].as_str().unwrap().contains("no review tiers"));
    }

    #[tokio::test]
    async fn test_cancel_running_screening() {
        let state = test_state(
            chain(ScriptedProvider::answering("mock", "exclude", 0.7)),
            Duration::from_secs(5),
        );
        let app = api_router().with_state(state.clone());

        let response = app.clone().oneshot(start_request("s-1", 5)).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        // A second start with the same id is refused while the first runs.
        let response = app.clone().oneshot(start_request("s-1", 1)).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let cancel = Request::builder()
            .method("POST")
            .uri("/api/screenings/s-1/cancel")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(cancel).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let progress = wait_for_status(&state, "s-1", RunStatus::Cancelled).await;
        assert!(progress.completed < 5);

        // Once finished the session is no longer cancellable.
        for _ in 0..200 {
            if state.active_token("s-1").unwrap().is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let cancel = Request::builder()
            .method("POST")
            .uri("/api/screenings/s-1/cancel")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(cancel).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_start_refuses_finished_session_id() {
        let (app, state) = test_app();

        let response = app.clone().oneshot(start_request("dup", 1)).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        wait_for_status(&state, "dup", RunStatus::Completed).await;
        for _ in 0..200 {
            if state.active_token("dup").unwrap().is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let response = app.oneshot(start_request("dup", 2)).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert!(body["error"].as_str().unwrap().contains("already exists"));

        let progress = state.store().get_progress("dup").await.unwrap().unwrap();
        assert_eq!(progress.total, 1);
        assert_eq!(progress.completed, 1);
    }

    #[tokio::test]
    async fn test_cancel_unknown_screening() {
        let (app, _) = test_app();
        let cancel = Request::builder()
            .method("POST")
            .uri("/api/screenings/nope/cancel")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(cancel).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_events_are_broadcast() {
        let (app, state) = test_app();
        let mut rx = state.ws_tx.subscribe();

        app.oneshot(start_request("s-1", 1)).await.unwrap();
        wait_for_status(&state, "s-1", RunStatus::Completed).await;

        let first: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(first["type"], "RunStarted");
        assert_eq!(first["data"]["session_id"], "s-1");
    }
}
