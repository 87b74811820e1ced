//! HTTP route handlers and their request/response bodies.
//!
//! Every request gets a trace id (taken from the body when the caller
//! supplies one). Failures publish an `ERROR` event before responding.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use taskweave_core::{
    EventBlock, MemoryPrefs, ServerEvent, Subtask, TaskweaveError, Timeline, TraceId,
};

use crate::error::ApiError;
use crate::server::AppState;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn default_dry_run() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct PlanRequest {
    pub user_id: String,
    pub query: String,
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
pub struct PlanResponse {
    pub subtasks: Vec<Subtask>,
    pub rationale: String,
    pub trace_id: TraceId,
}

/// Body shared by `/api/agents/spawn` and `/api/agents/run`.
#[derive(Debug, Deserialize)]
pub struct AgentsRequest {
    pub user_id: String,
    pub subtasks: Vec<Subtask>,
    #[serde(default)]
    pub trace_id: Option<TraceId>,
}

#[derive(Debug, Serialize)]
pub struct AgentSpawnResponse {
    pub agent_ids: Vec<String>,
    pub trace_id: TraceId,
}

#[derive(Debug, Serialize)]
pub struct AgentRunResponse {
    pub timeline: Timeline,
    pub trace_id: TraceId,
}

#[derive(Debug, Deserialize)]
pub struct MemoryQuery {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct MemoryUpsertRequest {
    pub prefs: MemoryPrefs,
}

#[derive(Debug, Serialize)]
pub struct MemoryResponse {
    pub prefs: MemoryPrefs,
    pub trace_id: TraceId,
}

#[derive(Debug, Deserialize)]
pub struct ApplyCalendarRequest {
    pub user_id: String,
    pub blocks: Vec<EventBlock>,
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
pub struct ApplyCalendarResponse {
    pub applied_count: usize,
    pub dry_run: bool,
    pub trace_id: TraceId,
}

/// Publish an `ERROR` event for `err` and turn it into a response.
async fn fail(state: &AppState, err: TaskweaveError, trace_id: &TraceId) -> ApiError {
    let err = err.with_trace(trace_id);
    tracing::warn!(trace_id = %trace_id, kind = err.kind(), error = %err, "request failed");
    let _ = state
        .events
        .publish(&ServerEvent::error(
            err.to_string(),
            Some(err.kind().to_string()),
            Some(trace_id),
        ))
        .await;
    ApiError(err)
}

fn require_user(user_id: &str) -> Result<(), TaskweaveError> {
    if user_id.trim().is_empty() {
        return Err(TaskweaveError::validation("user_id must not be empty"));
    }
    Ok(())
}

fn validate_agents_request(req: &AgentsRequest) -> Result<(), TaskweaveError> {
    require_user(&req.user_id)?;
    req.subtasks.iter().try_for_each(Subtask::validate)
}

pub async fn root() -> Json<Value> {
    Json(json!({ "service": "TaskWeave", "version": VERSION, "status": "running" }))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": VERSION }))
}

pub async fn plan(
    State(state): State<AppState>,
    Json(req): Json<PlanRequest>,
) -> Result<Json<PlanResponse>, ApiError> {
    let trace_id = TraceId::new();
    info!(trace_id = %trace_id, user_id = %req.user_id, dry_run = req.dry_run, "plan request");

    let result = match require_user(&req.user_id) {
        Ok(()) => state.planner.parse_query(&req.query, &req.user_id, &trace_id).await,
        Err(e) => Err(e),
    };
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => return Err(fail(&state, e, &trace_id).await),
    };

    let _ = state
        .events
        .publish(&ServerEvent::plan_complete(
            &outcome.subtasks,
            &outcome.rationale,
            &trace_id,
        ))
        .await;

    Ok(Json(PlanResponse {
        subtasks: outcome.subtasks,
        rationale: outcome.rationale,
        trace_id,
    }))
}

pub async fn spawn_agents(
    State(state): State<AppState>,
    Json(req): Json<AgentsRequest>,
) -> Result<Json<AgentSpawnResponse>, ApiError> {
    let trace_id = req.trace_id.clone().unwrap_or_default();
    info!(trace_id = %trace_id, subtasks = req.subtasks.len(), "spawn request");
    if let Err(e) = validate_agents_request(&req) {
        return Err(fail(&state, e, &trace_id).await);
    }

    let agent_ids = state.coordinator.spawn_agents(&req.subtasks, &trace_id).await;
    Ok(Json(AgentSpawnResponse { agent_ids, trace_id }))
}

pub async fn run_agents(
    State(state): State<AppState>,
    Json(req): Json<AgentsRequest>,
) -> Result<Json<AgentRunResponse>, ApiError> {
    let trace_id = req.trace_id.clone().unwrap_or_default();
    info!(trace_id = %trace_id, subtasks = req.subtasks.len(), "run request");
    if let Err(e) = validate_agents_request(&req) {
        return Err(fail(&state, e, &trace_id).await);
    }

    match state
        .coordinator
        .execute(&req.user_id, &req.subtasks, &trace_id)
        .await
    {
        Ok(timeline) => Ok(Json(AgentRunResponse { timeline, trace_id })),
        Err(e) => Err(fail(&state, e, &trace_id).await),
    }
}

pub async fn get_memory(
    State(state): State<AppState>,
    Query(query): Query<MemoryQuery>,
) -> Result<Json<MemoryResponse>, ApiError> {
    let trace_id = TraceId::new();
    info!(trace_id = %trace_id, user_id = %query.user_id, "memory lookup");
    if let Err(e) = require_user(&query.user_id) {
        return Err(fail(&state, e, &trace_id).await);
    }

    match state.prefs.get(&query.user_id).await {
        Ok(prefs) => Ok(Json(MemoryResponse { prefs, trace_id })),
        Err(e) => {
            let err = TaskweaveError::orchestration(format!("preference lookup failed: {e}"));
            Err(fail(&state, err, &trace_id).await)
        }
    }
}

pub async fn upsert_memory(
    State(state): State<AppState>,
    Json(req): Json<MemoryUpsertRequest>,
) -> Result<Json<MemoryResponse>, ApiError> {
    let trace_id = TraceId::new();
    info!(trace_id = %trace_id, user_id = %req.prefs.user_id, "memory upsert");
    if let Err(e) = req.prefs.validate() {
        return Err(fail(&state, e, &trace_id).await);
    }

    match state.prefs.put(req.prefs).await {
        Ok(prefs) => Ok(Json(MemoryResponse { prefs, trace_id })),
        Err(e) => {
            let err = TaskweaveError::orchestration(format!("preference update failed: {e}"));
            Err(fail(&state, err, &trace_id).await)
        }
    }
}

pub async fn apply_calendar(
    State(state): State<AppState>,
    Json(req): Json<ApplyCalendarRequest>,
) -> Result<Json<ApplyCalendarResponse>, ApiError> {
    let trace_id = TraceId::new();
    info!(
        trace_id = %trace_id,
        user_id = %req.user_id,
        blocks = req.blocks.len(),
        dry_run = req.dry_run,
        sink = state.calendar.name(),
        "calendar apply"
    );
    let valid = require_user(&req.user_id)
        .and_then(|()| req.blocks.iter().try_for_each(EventBlock::validate));
    if let Err(e) = valid {
        return Err(fail(&state, e, &trace_id).await);
    }

    match state.calendar.apply(&req.blocks, req.dry_run).await {
        Ok(applied_count) => Ok(Json(ApplyCalendarResponse {
            applied_count,
            dry_run: req.dry_run,
            trace_id,
        })),
        Err(e) => {
            let err = TaskweaveError::orchestration(format!("calendar apply failed: {e}"));
            Err(fail(&state, err, &trace_id).await)
        }
    }
}
