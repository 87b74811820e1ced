//! Planner service: turns a free-text request into three subtasks.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use taskweave_core::collaborators::PlanningOracle;
use taskweave_core::{AgentKind, Subtask, SubtaskId, TaskweaveError, TraceId};

/// Number of subtasks a plan must contain.
pub const PLAN_SIZE: usize = 3;

pub const SYSTEM_PROMPT: &str = r#"You are a planner that converts a user's task into exactly three subtasks, each mapped to one of: 'study_agent', 'meal_agent', 'calendar_agent'. Return strict JSON only with keys: 'rationale' and 'subtasks'. 'subtasks' must contain exactly three items. Keep descriptions imperative and specific. Respect quiet hours from memory if provided.

STRICT OUTPUT SCHEMA:
{
  "rationale": "...",
  "subtasks": [
    {"id":"<uuid>", "agent":"study_agent", "description":"..."},
    {"id":"<uuid>", "agent":"meal_agent", "description":"..."},
    {"id":"<uuid>", "agent":"calendar_agent", "description":"..."}
  ]
}

Rules:
- No extra keys, no prose outside JSON.
- Assume university student schedule.
- Prefer 3x90m study blocks/day with 15m breaks, adjust to memory sleep window.
- If memory missing, use defaults: sleep 23:00-07:00; study_block_minutes 90; break_minutes 15."#;

/// A validated plan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlanOutcome {
    pub subtasks: Vec<Subtask>,
    pub rationale: String,
}

/// Subtask as returned by the oracle; the id is optional and filled in.
#[derive(Deserialize)]
struct PlannedSubtask {
    #[serde(default)]
    id: Option<SubtaskId>,
    agent: AgentKind,
    description: String,
}

pub struct PlannerService {
    oracle: Arc<dyn PlanningOracle>,
}

impl PlannerService {
    pub fn new(oracle: Arc<dyn PlanningOracle>) -> Self {
        Self { oracle }
    }

    pub fn oracle_name(&self) -> &str {
        self.oracle.name()
    }

    /// Ask the planning oracle for a plan and validate its shape.
    pub async fn parse_query(
        &self,
        query: &str,
        user_id: &str,
        trace_id: &TraceId,
    ) -> Result<PlanOutcome, TaskweaveError> {
        let preview: String = query.chars().take(50).collect();
        info!(user_id, trace_id = %trace_id, oracle = self.oracle.name(), query = %preview, "planning query");

        let raw = self
            .oracle
            .complete_json(query, SYSTEM_PROMPT)
            .await
            .map_err(|e| TaskweaveError::planning(format!("planner unavailable: {e}")));

        let outcome = raw.and_then(validate_plan).map_err(|e| {
            warn!(trace_id = %trace_id, error = %e, "planning failed");
            TaskweaveError::planning(e.reason()).with_trace(trace_id)
        })?;

        info!(trace_id = %trace_id, subtasks = outcome.subtasks.len(), "plan created");
        Ok(outcome)
    }
}

/// Check the oracle's JSON: both keys present, exactly [`PLAN_SIZE`] valid subtasks.
pub fn validate_plan(raw: Value) -> Result<PlanOutcome, TaskweaveError> {
    let (Some(rationale), Some(subtasks)) = (raw.get("rationale"), raw.get("subtasks")) else {
        return Err(TaskweaveError::planning("invalid response structure from planner"));
    };
    let rationale = rationale
        .as_str()
        .ok_or_else(|| TaskweaveError::planning("rationale must be a string"))?
        .to_string();
    let entries = subtasks
        .as_array()
        .ok_or_else(|| TaskweaveError::planning("subtasks must be a list"))?;
    if entries.len() != PLAN_SIZE {
        return Err(TaskweaveError::planning(format!(
            "expected {PLAN_SIZE} subtasks, got {}",
            entries.len()
        )));
    }

    let subtasks = entries
        .iter()
        .map(|entry| {
            let planned: PlannedSubtask = serde_json::from_value(entry.clone())
                .map_err(|e| TaskweaveError::planning(format!("malformed subtask: {e}")))?;
            let subtask = Subtask {
                id: planned.id.unwrap_or_default(),
                agent: planned.agent,
                description: planned.description,
            };
            subtask
                .validate()
                .map_err(|e| TaskweaveError::planning(e.reason()))?;
            Ok(subtask)
        })
        .collect::<Result<Vec<_>, TaskweaveError>>()?;

    Ok(PlanOutcome {
        subtasks,
        rationale,
    })
}
