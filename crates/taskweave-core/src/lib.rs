pub mod collaborators;
pub mod domain;
pub mod errors;
pub mod events;
pub mod ids;

pub use domain::{AgentKind, EventBlock, EventStatus, MemoryPrefs, ProposalMode, Subtask, Timeline};
pub use errors::{OracleError, TaskweaveError};
pub use events::{EventKind, ServerEvent};
pub use ids::{EventId, SubtaskId, TraceId};
