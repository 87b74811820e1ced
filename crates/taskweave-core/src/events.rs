use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{EventBlock, Subtask};
use crate::ids::TraceId;

/// Kinds of events streamed to observers.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    AgentLog,
    TimelineUpdate,
    Error,
    PlanComplete,
    AgentsSpawned,
    AgentsComplete,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        Self::AgentLog,
        Self::TimelineUpdate,
        Self::Error,
        Self::PlanComplete,
        Self::AgentsSpawned,
        Self::AgentsComplete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AgentLog => "AGENT_LOG",
            Self::TimelineUpdate => "TIMELINE_UPDATE",
            Self::Error => "ERROR",
            Self::PlanComplete => "PLAN_COMPLETE",
            Self::AgentsSpawned => "AGENTS_SPAWNED",
            Self::AgentsComplete => "AGENTS_COMPLETE",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-to-observer event. Not retained after delivery.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ServerEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub payload: Value,
    #[serde(default)]
    pub trace_id: Option<TraceId>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentLogPayload {
    pub agent: String,
    pub message: String,
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_level() -> String {
    "INFO".to_string()
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimelineUpdatePayload {
    pub user_id: String,
    pub blocks: Vec<EventBlock>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorPayload {
    pub message: String,
    #[serde(default)]
    pub details: Option<String>,
}

impl ServerEvent {
    pub fn new(kind: EventKind, payload: Value, trace_id: Option<TraceId>) -> Self {
        Self {
            kind,
            payload,
            trace_id,
        }
    }

    pub fn agent_log(agent: impl Into<String>, message: impl Into<String>, trace_id: &TraceId) -> Self {
        let payload = AgentLogPayload {
            agent: agent.into(),
            message: message.into(),
            level: default_level(),
        };
        Self::new(EventKind::AgentLog, to_payload(&payload), Some(trace_id.clone()))
    }

    pub fn timeline_update(user_id: &str, blocks: &[EventBlock], trace_id: &TraceId) -> Self {
        let payload = TimelineUpdatePayload {
            user_id: user_id.to_string(),
            blocks: blocks.to_vec(),
        };
        Self::new(
            EventKind::TimelineUpdate,
            to_payload(&payload),
            Some(trace_id.clone()),
        )
    }

    pub fn agents_complete(block_count: usize, trace_id: &TraceId) -> Self {
        Self::new(
            EventKind::AgentsComplete,
            serde_json::json!({ "block_count": block_count }),
            Some(trace_id.clone()),
        )
    }

    pub fn agents_spawned(agent_ids: &[String], trace_id: &TraceId) -> Self {
        Self::new(
            EventKind::AgentsSpawned,
            serde_json::json!({ "agent_ids": agent_ids }),
            Some(trace_id.clone()),
        )
    }

    pub fn plan_complete(subtasks: &[Subtask], rationale: &str, trace_id: &TraceId) -> Self {
        Self::new(
            EventKind::PlanComplete,
            serde_json::json!({
                "subtasks": to_payload(&subtasks),
                "rationale": rationale,
            }),
            Some(trace_id.clone()),
        )
    }

    pub fn error(message: impl Into<String>, details: Option<String>, trace_id: Option<&TraceId>) -> Self {
        let payload = ErrorPayload {
            message: message.into(),
            details,
        };
        Self::new(EventKind::Error, to_payload(&payload), trace_id.cloned())
    }
}

fn to_payload<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}
