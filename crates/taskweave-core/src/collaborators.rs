//! Capability interfaces for the collaborators the engine depends on.
//!
//! Each trait has a deterministic stand-in and, where one exists, a real
//! backend in `taskweave-adapters`. Which implementation is used is decided
//! once, when the service is built.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::{EventBlock, MemoryPrefs, Subtask};
use crate::errors::OracleError;

/// Keyed store of user preferences.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    fn name(&self) -> &str;

    /// Preferences for `user_id`, or defaults when nothing is stored.
    async fn get(&self, user_id: &str) -> Result<MemoryPrefs, OracleError>;

    async fn put(&self, prefs: MemoryPrefs) -> Result<MemoryPrefs, OracleError>;
}

/// Turns one subtask into candidate blocks.
#[async_trait]
pub trait ProposalOracle: Send + Sync {
    fn name(&self) -> &str;

    async fn propose(
        &self,
        subtask: &Subtask,
        prefs: &MemoryPrefs,
    ) -> Result<Vec<EventBlock>, OracleError>;
}

/// Completes a prompt into a JSON document.
#[async_trait]
pub trait PlanningOracle: Send + Sync {
    fn name(&self) -> &str;

    async fn complete_json(&self, prompt: &str, system_prompt: &str) -> Result<Value, OracleError>;
}

/// Commits blocks to a calendar.
#[async_trait]
pub trait CalendarSink: Send + Sync {
    fn name(&self) -> &str;

    /// Returns how many blocks were (or, when simulating, would be) applied.
    async fn apply(&self, blocks: &[EventBlock], simulate: bool) -> Result<usize, OracleError>;
}
