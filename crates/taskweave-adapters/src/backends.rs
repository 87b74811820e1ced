use std::path::Path;
use std::sync::Arc;

use secrecy::SecretString;
use tracing::{info, warn};

use taskweave_core::collaborators::{CalendarSink, PlanningOracle, PreferenceStore, ProposalOracle};
use taskweave_core::OracleError;
use taskweave_settings::{CalendarBackend, MemoryBackend, PlannerBackend, Settings};

use crate::calendar::{DryRunCalendar, InMemoryCalendar};
use crate::memory::{InMemoryPreferenceStore, SqlitePreferenceStore};
use crate::planner::{AnthropicPlanner, MockPlanner};
use crate::proposals::MockProposalOracle;

/// One implementation per collaborator capability.
#[derive(Clone)]
pub struct Backends {
    pub prefs: Arc<dyn PreferenceStore>,
    pub proposals: Arc<dyn ProposalOracle>,
    pub planner: Arc<dyn PlanningOracle>,
    pub calendar: Arc<dyn CalendarSink>,
}

impl Backends {
    /// Deterministic stand-ins for everything.
    pub fn mock() -> Self {
        Self {
            prefs: Arc::new(InMemoryPreferenceStore::new()),
            proposals: Arc::new(MockProposalOracle::new()),
            planner: Arc::new(MockPlanner::new()),
            calendar: Arc::new(DryRunCalendar),
        }
    }

    /// Build the configured backends.
    ///
    /// `planner = anthropic` without an API key falls back to the mock
    /// planner with a warning. Failing to open the SQLite store is an error.
    pub fn from_settings(settings: &Settings) -> Result<Self, OracleError> {
        let backends = &settings.backends;

        let prefs: Arc<dyn PreferenceStore> = match backends.memory {
            MemoryBackend::InMemory => Arc::new(InMemoryPreferenceStore::new()),
            MemoryBackend::Sqlite => {
                Arc::new(SqlitePreferenceStore::open(Path::new(&backends.memory_db_path))?)
            }
        };

        let planner: Arc<dyn PlanningOracle> = match (backends.planner, &backends.anthropic.api_key) {
            (PlannerBackend::Anthropic, Some(key)) if !key.trim().is_empty() => Arc::new(
                AnthropicPlanner::new(SecretString::from(key.clone()), &backends.anthropic)?,
            ),
            (PlannerBackend::Anthropic, _) => {
                warn!("anthropic planner selected without an API key, using mock planner");
                Arc::new(MockPlanner::new())
            }
            (PlannerBackend::Mock, _) => Arc::new(MockPlanner::new()),
        };

        let calendar: Arc<dyn CalendarSink> = match backends.calendar {
            CalendarBackend::DryRun => Arc::new(DryRunCalendar),
            CalendarBackend::InMemory => Arc::new(InMemoryCalendar::new()),
        };

        let built = Self {
            prefs,
            proposals: Arc::new(MockProposalOracle::new()),
            planner,
            calendar,
        };
        info!(
            prefs = built.prefs.name(),
            proposals = built.proposals.name(),
            planner = built.planner.name(),
            calendar = built.calendar.name(),
            "backends selected"
        );
        Ok(built)
    }
}
