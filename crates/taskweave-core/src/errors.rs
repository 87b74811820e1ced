use crate::ids::TraceId;

/// Errors surfaced by the planning and orchestration layers.
///
/// Every variant carries the trace id of the request that produced it so
/// the failure can be matched against the run's published events.
#[derive(Clone, Debug, thiserror::Error)]
pub enum TaskweaveError {
    #[error("planning failed: {reason}")]
    Planning {
        reason: String,
        trace_id: Option<TraceId>,
    },

    #[error("orchestration failed: {reason}")]
    Orchestration {
        reason: String,
        trace_id: Option<TraceId>,
    },

    #[error("validation failed: {reason}")]
    Validation {
        reason: String,
        trace_id: Option<TraceId>,
    },
}

impl TaskweaveError {
    pub fn planning(reason: impl Into<String>) -> Self {
        Self::Planning {
            reason: reason.into(),
            trace_id: None,
        }
    }

    pub fn orchestration(reason: impl Into<String>) -> Self {
        Self::Orchestration {
            reason: reason.into(),
            trace_id: None,
        }
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
            trace_id: None,
        }
    }

    /// Attach (or replace) the correlation id.
    pub fn with_trace(mut self, trace: &TraceId) -> Self {
        match &mut self {
            Self::Planning { trace_id, .. }
            | Self::Orchestration { trace_id, .. }
            | Self::Validation { trace_id, .. } => *trace_id = Some(trace.clone()),
        }
        self
    }

    pub fn trace_id(&self) -> Option<&TraceId> {
        match self {
            Self::Planning { trace_id, .. }
            | Self::Orchestration { trace_id, .. }
            | Self::Validation { trace_id, .. } => trace_id.as_ref(),
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            Self::Planning { reason, .. }
            | Self::Orchestration { reason, .. }
            | Self::Validation { reason, .. } => reason,
        }
    }

    /// Short classification string for logging and API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Planning { .. } => "planning_failure",
            Self::Orchestration { .. } => "orchestration_failure",
            Self::Validation { .. } => "validation_failure",
        }
    }
}

/// Failure reported by an external collaborator (planner, proposal
/// oracle, preference store, calendar sink).
#[derive(Clone, Debug, thiserror::Error)]
pub enum OracleError {
    #[error("{0} unavailable")]
    Unavailable(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("http error {status}: {body}")]
    Http { status: u16, body: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("storage error: {0}")]
    Storage(String),
}
