use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, post},
    Json, Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use uuid::Uuid;

use crate::{
    attempts,
    config::Config,
    error::ApiError,
    models::*,
    runtime::{FailureSender, LaunchContext, Scorm12Runtime, Scorm2004Runtime},
    sessions::{ActiveRuntime, CallOutcome, SessionRegistry},
    store::AttemptStore,
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn AttemptStore>,
    pub sessions: SessionRegistry,
    pub config: Config,
    pub failures: Option<FailureSender>,
}

impl AppState {
    pub fn new(store: Arc<dyn AttemptStore>, config: Config) -> Self {
        Self {
            store,
            sessions: SessionRegistry::new(),
            config,
            failures: None,
        }
    }

    pub fn with_failures(mut self, failures: FailureSender) -> Self {
        self.failures = Some(failures);
        self
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        // attempt lifecycle + queries
        .route("/api/attempts", post(create_attempt).get(list_attempts))
        .route("/api/attempts/latest", get(latest_attempt))
        .route("/api/attempts/:attempt_id", get(get_attempt))
        // runtime API
        .route("/runtime/:attempt_id/open", post(rt_open))
        .route("/runtime/:attempt_id/call", post(rt_call))
        .route("/runtime/:attempt_id", delete(rt_close))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)),
        )
        .with_state(state)
}

async fn create_attempt(
    State(st): State<AppState>,
    Json(req): Json<CreateAttemptReq>,
) -> Result<Json<AttemptRecord>, ApiError> {
    if req.user_id.trim().is_empty() {
        return Err(ApiError::BadRequest("userId is required".into()));
    }
    let rec = attempts::create_attempt(st.store.as_ref(), &req.user_id, req.package_id).await?;
    Ok(Json(rec))
}

async fn list_attempts(
    State(st): State<AppState>,
    Query(q): Query<AttemptQuery>,
) -> Result<Json<Vec<AttemptRecord>>, ApiError> {
    let list = attempts::list_attempts(st.store.as_ref(), &q.user_id, q.package_id).await?;
    Ok(Json(list))
}

async fn latest_attempt(
    State(st): State<AppState>,
    Query(q): Query<AttemptQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = attempts::get_latest_attempt(st.store.as_ref(), &q.user_id, q.package_id).await?;
    Ok(Json(serde_json::json!({ "attemptId": id })))
}

async fn get_attempt(
    State(st): State<AppState>,
    Path(attempt_id): Path<Uuid>,
) -> Result<Json<AttemptRecord>, ApiError> {
    attempts::get_attempt(st.store.as_ref(), attempt_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("attempt {attempt_id} not found")))
}

// --- Runtime endpoints ---

async fn rt_open(
    State(st): State<AppState>,
    Path(attempt_id): Path<Uuid>,
    Json(req): Json<OpenRuntimeReq>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ctx = LaunchContext {
        learner_name: req.learner_name.unwrap_or_default(),
        launch_data: req.launch_data.unwrap_or_default(),
        completion_threshold: req.completion_threshold,
        scaled_passing_score: req.scaled_passing_score,
        suspend_data_limit: Some(match req.version {
            ScormVersion::Scorm12 => st.config.suspend_limit_12,
            ScormVersion::Scorm2004 => st.config.suspend_limit_2004,
        }),
        failures: st.failures.clone(),
    };

    let runtime = match req.version {
        ScormVersion::Scorm12 => {
            ActiveRuntime::Scorm12(Scorm12Runtime::open(st.store.clone(), attempt_id, ctx).await?)
        }
        ScormVersion::Scorm2004 => ActiveRuntime::Scorm2004(
            Scorm2004Runtime::open(st.store.clone(), attempt_id, ctx).await?,
        ),
    };
    st.sessions.insert(attempt_id, runtime);

    Ok(Json(serde_json::json!({ "attemptId": attempt_id, "version": req.version })))
}

async fn rt_call(
    State(st): State<AppState>,
    Path(attempt_id): Path<Uuid>,
    Json(req): Json<RuntimeCallReq>,
) -> Result<Json<serde_json::Value>, ApiError> {
    match st.sessions.call(attempt_id, &req.method, &req.args) {
        CallOutcome::Result(result) => Ok(Json(serde_json::json!({ "result": result }))),
        CallOutcome::NoSession => Err(ApiError::NotFound(format!(
            "no open runtime session for attempt {attempt_id}"
        ))),
        CallOutcome::UnknownMethod => Err(ApiError::BadRequest(format!(
            "unknown runtime method `{}`",
            req.method
        ))),
    }
}

async fn rt_close(
    State(st): State<AppState>,
    Path(attempt_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if st.sessions.remove(attempt_id) {
        Ok(Json(serde_json::json!({ "ok": true })))
    } else {
        Err(ApiError::NotFound(format!(
            "no open runtime session for attempt {attempt_id}"
        )))
    }
}
