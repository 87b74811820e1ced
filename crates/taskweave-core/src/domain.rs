use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::errors::TaskweaveError;
use crate::ids::{EventId, SubtaskId};

/// Which proposal specialization a subtask or block belongs to.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AgentKind {
    #[serde(rename = "study_agent")]
    Study,
    #[serde(rename = "meal_agent")]
    Meal,
    #[serde(rename = "calendar_agent")]
    Calendar,
}

impl AgentKind {
    pub const ALL: [AgentKind; 3] = [Self::Study, Self::Meal, Self::Calendar];

    /// Wire name. Also the tie-break key when two blocks start together.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Study => "study_agent",
            Self::Meal => "meal_agent",
            Self::Calendar => "calendar_agent",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown agent kind: {s}"))
    }
}

/// A unit of planning work assigned to one agent kind.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subtask {
    pub id: SubtaskId,
    pub agent: AgentKind,
    pub description: String,
}

impl Subtask {
    pub fn new(agent: AgentKind, description: impl Into<String>) -> Self {
        Self {
            id: SubtaskId::new(),
            agent,
            description: description.into(),
        }
    }

    pub fn validate(&self) -> Result<(), TaskweaveError> {
        if self.id.as_str().trim().is_empty() {
            return Err(TaskweaveError::validation("subtask id must not be empty"));
        }
        if self.description.trim().is_empty() {
            return Err(TaskweaveError::validation(format!(
                "subtask {} has an empty description",
                self.id
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    #[default]
    Proposed,
    Applied,
}

/// A concrete, time-bounded calendar entry proposed by an agent.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventBlock {
    pub id: EventId,
    pub title: String,
    #[serde(rename = "start_iso")]
    pub start: NaiveDateTime,
    #[serde(rename = "end_iso")]
    pub end: NaiveDateTime,
    pub source_agent: AgentKind,
    #[serde(default)]
    pub status: EventStatus,
}

impl EventBlock {
    pub fn proposed(
        title: impl Into<String>,
        start: NaiveDateTime,
        end: NaiveDateTime,
        source_agent: AgentKind,
    ) -> Self {
        Self {
            id: EventId::new(),
            title: title.into(),
            start,
            end,
            source_agent,
            status: EventStatus::Proposed,
        }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// A block must end strictly after it starts.
    pub fn validate(&self) -> Result<(), TaskweaveError> {
        if self.start >= self.end {
            return Err(TaskweaveError::validation(format!(
                "block {} must end after it starts ({} >= {})",
                self.id, self.start, self.end
            )));
        }
        Ok(())
    }

    /// Copy of this block moved to `start`, keeping its duration.
    pub fn shifted_to(&self, start: NaiveDateTime) -> Self {
        Self {
            start,
            end: start + self.duration(),
            ..self.clone()
        }
    }
}

/// Ordered, non-overlapping blocks produced by one merge.
pub type Timeline = Vec<EventBlock>;

/// How the coordinator schedules proposal calls within one run.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProposalMode {
    /// One subtask at a time, in input order.
    #[default]
    Sequential,
    /// All subtasks at once; each subtask's log pair stays ordered.
    Concurrent,
}

pub const DEFAULT_SLEEP_START: &str = "23:00";
pub const DEFAULT_SLEEP_END: &str = "07:00";
pub const DEFAULT_BREAK_MINUTES: u32 = 15;
pub const DEFAULT_STUDY_BLOCK_MINUTES: u32 = 90;

/// Per-user scheduling preferences.
///
/// Sleep bounds stay as `HH:MM` strings; a malformed value is tolerated
/// here and read as midnight by the merge engine.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemoryPrefs {
    pub user_id: String,
    #[serde(default = "default_sleep_start")]
    pub sleep_start: String,
    #[serde(default = "default_sleep_end")]
    pub sleep_end: String,
    #[serde(default = "default_break_minutes")]
    pub break_minutes: u32,
    #[serde(default = "default_study_block_minutes")]
    pub study_block_minutes: u32,
    #[serde(default)]
    pub dietary: Option<String>,
}

fn default_sleep_start() -> String {
    DEFAULT_SLEEP_START.to_string()
}

fn default_sleep_end() -> String {
    DEFAULT_SLEEP_END.to_string()
}

fn default_break_minutes() -> u32 {
    DEFAULT_BREAK_MINUTES
}

fn default_study_block_minutes() -> u32 {
    DEFAULT_STUDY_BLOCK_MINUTES
}

impl MemoryPrefs {
    /// Defaults for a user with no stored preferences.
    pub fn defaults_for(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            sleep_start: default_sleep_start(),
            sleep_end: default_sleep_end(),
            break_minutes: DEFAULT_BREAK_MINUTES,
            study_block_minutes: DEFAULT_STUDY_BLOCK_MINUTES,
            dietary: None,
        }
    }

    pub fn validate(&self) -> Result<(), TaskweaveError> {
        if self.user_id.trim().is_empty() {
            return Err(TaskweaveError::validation("user_id must not be empty"));
        }
        if self.study_block_minutes == 0 {
            return Err(TaskweaveError::validation(
                "study_block_minutes must be greater than zero",
            ));
        }
        Ok(())
    }
}
