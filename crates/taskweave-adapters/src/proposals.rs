use async_trait::async_trait;
use chrono::{Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};
use tracing::debug;

use taskweave_core::collaborators::ProposalOracle;
use taskweave_core::{AgentKind, EventBlock, MemoryPrefs, OracleError, Subtask};

const PLAN_DAYS: i64 = 3;
const SESSIONS_PER_DAY: i64 = 3;
const MEAL_MINUTES: i64 = 45;
const MEALS: [(u32, &str); 2] = [(12, "Lunch"), (18, "Dinner")];

/// Deterministic proposals on a fixed three-day grid starting at 08:00.
///
/// Study sessions every two hours from 08:00, lunch and dinner, and breaks
/// at 09:30, 11:30 and 13:30. Lengths come from the user's preferences.
pub struct MockProposalOracle {
    anchor: Option<NaiveDate>,
}

impl MockProposalOracle {
    /// Anchored on tomorrow (local time), evaluated at each call.
    pub fn new() -> Self {
        Self { anchor: None }
    }

    /// Anchored on a fixed first day.
    pub fn anchored(day: NaiveDate) -> Self {
        Self { anchor: Some(day) }
    }

    fn first_morning(&self) -> NaiveDateTime {
        let day = self
            .anchor
            .unwrap_or_else(|| Local::now().date_naive() + Duration::days(1));
        day.and_time(NaiveTime::from_hms_opt(8, 0, 0).unwrap_or_default())
    }

    fn study(&self, prefs: &MemoryPrefs) -> Vec<EventBlock> {
        let morning = self.first_morning();
        let length = Duration::minutes(i64::from(prefs.study_block_minutes));
        let mut blocks = Vec::new();
        for day in 0..PLAN_DAYS {
            for session in 0..SESSIONS_PER_DAY {
                let start = morning + Duration::days(day) + Duration::hours(session * 2);
                blocks.push(EventBlock::proposed(
                    format!("Study Session {} - Day {}", session + 1, day + 1),
                    start,
                    start + length,
                    AgentKind::Study,
                ));
            }
        }
        blocks
    }

    fn meals(&self, prefs: &MemoryPrefs) -> Vec<EventBlock> {
        let first_day = self.first_morning().date();
        let note = prefs
            .dietary
            .as_deref()
            .map(|d| format!(" ({d})"))
            .unwrap_or_default();
        let mut blocks = Vec::new();
        for day in 0..PLAN_DAYS {
            for (hour, meal) in MEALS {
                let start = (first_day + Duration::days(day))
                    .and_time(NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or_default());
                blocks.push(EventBlock::proposed(
                    format!("{meal}{note}"),
                    start,
                    start + Duration::minutes(MEAL_MINUTES),
                    AgentKind::Meal,
                ));
            }
        }
        blocks
    }

    fn breaks(&self, prefs: &MemoryPrefs) -> Vec<EventBlock> {
        let morning = self.first_morning();
        let length = Duration::minutes(i64::from(prefs.break_minutes));
        let mut blocks = Vec::new();
        for day in 0..PLAN_DAYS {
            for n in 0..SESSIONS_PER_DAY {
                let start = morning
                    + Duration::days(day)
                    + Duration::hours(n * 2 + 1)
                    + Duration::minutes(30);
                blocks.push(EventBlock::proposed("Break", start, start + length, AgentKind::Calendar));
            }
        }
        blocks
    }
}

impl Default for MockProposalOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProposalOracle for MockProposalOracle {
    fn name(&self) -> &str {
        "mock"
    }

    async fn propose(
        &self,
        subtask: &Subtask,
        prefs: &MemoryPrefs,
    ) -> Result<Vec<EventBlock>, OracleError> {
        debug!(agent = %subtask.agent, "mock agent proposing blocks");
        Ok(match subtask.agent {
            AgentKind::Study => self.study(prefs),
            AgentKind::Meal => self.meals(prefs),
            AgentKind::Calendar => self.breaks(prefs),
        })
    }
}
