//! Orchestration coordinator: one run turns subtasks into a merged timeline.
//!
//! A run fetches preferences, asks the proposal oracle for blocks per
//! subtask (narrating progress as `AGENT_LOG` events), merges everything
//! and announces the result with `TIMELINE_UPDATE` then `AGENTS_COMPLETE`.

use std::sync::Arc;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use taskweave_core::collaborators::{PreferenceStore, ProposalOracle};
use taskweave_core::{
    EventBlock, MemoryPrefs, ProposalMode, ServerEvent, Subtask, TaskweaveError, Timeline, TraceId,
};

use crate::bus::EventChannel;
use crate::timeline::merge_blocks;

const LOG_DESCRIPTION_CHARS: usize = 80;

pub struct Coordinator {
    prefs: Arc<dyn PreferenceStore>,
    proposals: Arc<dyn ProposalOracle>,
    events: Arc<EventChannel>,
    mode: ProposalMode,
}

impl Coordinator {
    pub fn new(
        prefs: Arc<dyn PreferenceStore>,
        proposals: Arc<dyn ProposalOracle>,
        events: Arc<EventChannel>,
    ) -> Self {
        Self {
            prefs,
            proposals,
            events,
            mode: ProposalMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: ProposalMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> ProposalMode {
        self.mode
    }

    pub fn events(&self) -> &Arc<EventChannel> {
        &self.events
    }

    /// Run all subtasks for `user_id` and return the merged timeline.
    pub async fn execute(
        &self,
        user_id: &str,
        subtasks: &[Subtask],
        trace_id: &TraceId,
    ) -> Result<Timeline, TaskweaveError> {
        self.execute_with_cancel(user_id, subtasks, trace_id, &CancellationToken::new())
            .await
    }

    /// Like [`execute`](Self::execute), stopping early once `cancel` fires.
    ///
    /// The token is checked before each subtask and before merging. Nothing
    /// is published for steps that did not run.
    #[instrument(skip_all, fields(user_id = %user_id, trace_id = %trace_id, subtasks = subtasks.len()))]
    pub async fn execute_with_cancel(
        &self,
        user_id: &str,
        subtasks: &[Subtask],
        trace_id: &TraceId,
        cancel: &CancellationToken,
    ) -> Result<Timeline, TaskweaveError> {
        let prefs = self.prefs.get(user_id).await.map_err(|e| {
            TaskweaveError::orchestration(format!("preference lookup failed: {e}"))
                .with_trace(trace_id)
        })?;

        let blocks = match self.mode {
            ProposalMode::Sequential => {
                let mut blocks = Vec::new();
                for subtask in subtasks {
                    ensure_not_cancelled(cancel, trace_id)?;
                    blocks.extend(self.propose_one(subtask, &prefs, trace_id).await?);
                }
                blocks
            }
            ProposalMode::Concurrent => {
                ensure_not_cancelled(cancel, trace_id)?;
                let runs = join_all(
                    subtasks
                        .iter()
                        .map(|subtask| self.propose_one(subtask, &prefs, trace_id)),
                );
                let results = tokio::select! {
                    results = runs => results,
                    () = cancel.cancelled() => return Err(cancelled(trace_id)),
                };
                let mut blocks = Vec::new();
                for result in results {
                    blocks.extend(result?);
                }
                blocks
            }
        };

        ensure_not_cancelled(cancel, trace_id)?;
        let timeline = merge_blocks(&blocks, &prefs);
        info!(
            raw = blocks.len(),
            merged = timeline.len(),
            "orchestration complete"
        );

        let _ = self
            .events
            .publish(&ServerEvent::timeline_update(user_id, &timeline, trace_id))
            .await;
        let _ = self
            .events
            .publish(&ServerEvent::agents_complete(timeline.len(), trace_id))
            .await;

        Ok(timeline)
    }

    async fn propose_one(
        &self,
        subtask: &Subtask,
        prefs: &MemoryPrefs,
        trace_id: &TraceId,
    ) -> Result<Vec<EventBlock>, TaskweaveError> {
        let agent = subtask.agent.as_str();
        let preview: String = subtask.description.chars().take(LOG_DESCRIPTION_CHARS).collect();
        let _ = self
            .events
            .publish(&ServerEvent::agent_log(
                agent,
                format!("Starting: {preview}..."),
                trace_id,
            ))
            .await;

        let blocks = self.proposals.propose(subtask, prefs).await.map_err(|e| {
            warn!(agent, subtask = %subtask.id, error = %e, "proposal failed");
            TaskweaveError::orchestration(format!("{agent} proposal failed: {e}"))
                .with_trace(trace_id)
        })?;
        if let Some(err) = blocks.iter().find_map(|b| b.validate().err()) {
            warn!(agent, subtask = %subtask.id, error = %err, "invalid proposal");
            return Err(TaskweaveError::orchestration(format!(
                "{agent} proposed an invalid block: {}",
                err.reason()
            ))
            .with_trace(trace_id));
        }

        let _ = self
            .events
            .publish(&ServerEvent::agent_log(
                agent,
                format!("Proposed {} blocks", blocks.len()),
                trace_id,
            ))
            .await;
        Ok(blocks)
    }

    /// Assign an agent id to each subtask and announce them.
    pub async fn spawn_agents(&self, subtasks: &[Subtask], trace_id: &TraceId) -> Vec<String> {
        let agent_ids: Vec<String> = subtasks
            .iter()
            .map(|s| {
                let short: String = s.id.as_str().chars().take(8).collect();
                format!("agent_{}_{short}", s.agent.as_str())
            })
            .collect();
        info!(trace_id = %trace_id, count = agent_ids.len(), "agents spawned");
        let _ = self
            .events
            .publish(&ServerEvent::agents_spawned(&agent_ids, trace_id))
            .await;
        agent_ids
    }
}

fn cancelled(trace_id: &TraceId) -> TaskweaveError {
    TaskweaveError::orchestration("cancelled").with_trace(trace_id)
}

fn ensure_not_cancelled(cancel: &CancellationToken, trace_id: &TraceId) -> Result<(), TaskweaveError> {
    if cancel.is_cancelled() {
        return Err(cancelled(trace_id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveDateTime};
    use parking_lot::Mutex;
    use taskweave_core::{AgentKind, EventKind, OracleError};

    use crate::bus::{EventHandler, HandlerError};

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    struct StaticPrefs {
        fail: bool,
    }

    #[async_trait]
    impl PreferenceStore for StaticPrefs {
        fn name(&self) -> &str {
            "static"
        }
        async fn get(&self, user_id: &str) -> Result<MemoryPrefs, OracleError> {
            if self.fail {
                return Err(OracleError::Storage("disk gone".into()));
            }
            Ok(MemoryPrefs::defaults_for(user_id))
        }
        async fn put(&self, prefs: MemoryPrefs) -> Result<MemoryPrefs, OracleError> {
            Ok(prefs)
        }
    }

    /// One block per subtask: study at 08:00 (90m), meal at 09:00 (45m).
    struct ScriptedOracle {
        fail_on: Option<AgentKind>,
        reversed_for: Option<AgentKind>,
        delay_for: Option<(AgentKind, Duration)>,
        call_count: AtomicUsize,
    }

    impl ScriptedOracle {
        fn ok() -> Self {
            Self {
                fail_on: None,
                reversed_for: None,
                delay_for: None,
                call_count: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ProposalOracle for ScriptedOracle {
        fn name(&self) -> &str {
            "scripted"
        }
        async fn propose(
            &self,
            subtask: &Subtask,
            _prefs: &MemoryPrefs,
        ) -> Result<Vec<EventBlock>, OracleError> {
            let _ = self.call_count.fetch_add(1, Ordering::Relaxed);
            if let Some((kind, delay)) = self.delay_for {
                if kind == subtask.agent {
                    tokio::time::sleep(delay).await;
                }
            }
            if self.fail_on == Some(subtask.agent) {
                return Err(OracleError::Unavailable("proposal service".into()));
            }
            let block = match subtask.agent {
                AgentKind::Study => EventBlock::proposed("Study", at(8, 0), at(9, 30), subtask.agent),
                AgentKind::Meal => EventBlock::proposed("Lunch", at(9, 0), at(9, 45), subtask.agent),
                AgentKind::Calendar => {
                    EventBlock::proposed("Break", at(23, 30), at(23, 45), subtask.agent)
                }
            };
            if self.reversed_for == Some(subtask.agent) {
                return Ok(vec![EventBlock { end: block.start, ..block }]);
            }
            Ok(vec![block])
        }
    }

    struct Recorder {
        seen: Mutex<Vec<ServerEvent>>,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }
        async fn handle(&self, event: &ServerEvent) -> Result<(), HandlerError> {
            self.seen.lock().push(event.clone());
            Ok(())
        }
    }

    fn setup(
        prefs_fail: bool,
        oracle: ScriptedOracle,
    ) -> (Coordinator, Arc<Recorder>, Arc<ScriptedOracle>) {
        let channel = Arc::new(EventChannel::new());
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });
        channel.subscribe_all(recorder.clone());
        let oracle = Arc::new(oracle);
        let coordinator = Coordinator::new(
            Arc::new(StaticPrefs { fail: prefs_fail }),
            oracle.clone(),
            channel,
        );
        (coordinator, recorder, oracle)
    }

    fn subtasks() -> Vec<Subtask> {
        vec![
            Subtask::new(AgentKind::Study, "Review dynamic programming"),
            Subtask::new(AgentKind::Meal, "Plan meals"),
            Subtask::new(AgentKind::Calendar, "Protect focus time"),
        ]
    }

    fn log_messages(recorder: &Recorder) -> Vec<(String, String)> {
        recorder
            .seen
            .lock()
            .iter()
            .filter(|e| e.kind == EventKind::AgentLog)
            .map(|e| {
                (
                    e.payload["agent"].as_str().unwrap_or_default().to_string(),
                    e.payload["message"].as_str().unwrap_or_default().to_string(),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn execute_narrates_merges_and_announces() {
        let (coordinator, recorder, _) = setup(false, ScriptedOracle::ok());
        let trace = TraceId::from_raw("trace_run");

        let timeline = coordinator.execute("u1", &subtasks(), &trace).await.unwrap();

        // calendar block at 23:30 falls in the sleep window
        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline[1].start, at(9, 30));

        let kinds: Vec<EventKind> = recorder.seen.lock().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::AgentLog,
                EventKind::AgentLog,
                EventKind::AgentLog,
                EventKind::AgentLog,
                EventKind::AgentLog,
                EventKind::AgentLog,
                EventKind::TimelineUpdate,
                EventKind::AgentsComplete,
            ]
        );
        assert_eq!(
            log_messages(&recorder)[0],
            (
                "study_agent".to_string(),
                "Starting: Review dynamic programming...".to_string()
            )
        );
        assert_eq!(log_messages(&recorder)[1].1, "Proposed 1 blocks");

        let seen = recorder.seen.lock();
        assert!(seen.iter().all(|e| e.trace_id.as_ref() == Some(&trace)));
        assert_eq!(seen[6].payload["user_id"], "u1");
        assert_eq!(seen[6].payload["blocks"].as_array().unwrap().len(), 2);
        assert_eq!(seen[7].payload["block_count"], 2);
    }

    #[tokio::test]
    async fn long_descriptions_are_truncated_in_logs() {
        let (coordinator, recorder, _) = setup(false, ScriptedOracle::ok());
        let subtask = Subtask::new(AgentKind::Study, "x".repeat(200));

        let _ = coordinator
            .execute("u1", &[subtask], &TraceId::from_raw("t"))
            .await
            .unwrap();
        assert_eq!(log_messages(&recorder)[0].1, format!("Starting: {}...", "x".repeat(80)));
    }

    #[tokio::test]
    async fn empty_subtasks_still_announce_an_empty_timeline() {
        let (coordinator, recorder, _) = setup(false, ScriptedOracle::ok());
        let timeline = coordinator
            .execute("u1", &[], &TraceId::from_raw("t"))
            .await
            .unwrap();
        assert!(timeline.is_empty());
        let kinds: Vec<EventKind> = recorder.seen.lock().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::TimelineUpdate, EventKind::AgentsComplete]);
    }

    #[tokio::test]
    async fn preference_failure_is_wrapped_with_trace() {
        let (coordinator, recorder, oracle) = setup(true, ScriptedOracle::ok());
        let trace = TraceId::from_raw("trace_prefs");

        let err = coordinator.execute("u1", &subtasks(), &trace).await.unwrap_err();
        assert_eq!(err.kind(), "orchestration_failure");
        assert_eq!(err.trace_id(), Some(&trace));
        assert!(err.reason().contains("disk gone"));
        assert_eq!(oracle.call_count.load(Ordering::Relaxed), 0);
        assert!(recorder.seen.lock().is_empty());
    }

    #[tokio::test]
    async fn proposal_failure_stops_the_run() {
        let oracle = ScriptedOracle {
            fail_on: Some(AgentKind::Meal),
            ..ScriptedOracle::ok()
        };
        let (coordinator, recorder, oracle) = setup(false, oracle);
        let trace = TraceId::from_raw("trace_fail");

        let err = coordinator.execute("u1", &subtasks(), &trace).await.unwrap_err();
        assert_eq!(err.kind(), "orchestration_failure");
        assert_eq!(err.trace_id(), Some(&trace));
        // calendar never asked, no timeline published
        assert_eq!(oracle.call_count.load(Ordering::Relaxed), 2);
        assert!(recorder
            .seen
            .lock()
            .iter()
            .all(|e| e.kind == EventKind::AgentLog));
    }

    #[tokio::test]
    async fn zero_length_proposal_is_rejected() {
        let oracle = ScriptedOracle {
            reversed_for: Some(AgentKind::Study),
            ..ScriptedOracle::ok()
        };
        let (coordinator, recorder, oracle) = setup(false, oracle);
        let trace = TraceId::from_raw("trace_invalid");

        let err = coordinator.execute("u1", &subtasks(), &trace).await.unwrap_err();
        assert_eq!(err.kind(), "orchestration_failure");
        assert_eq!(err.trace_id(), Some(&trace));
        assert!(err.reason().starts_with("study_agent proposed an invalid block"));
        assert_eq!(oracle.call_count.load(Ordering::Relaxed), 1);
        // only the start log went out
        assert_eq!(recorder.seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn cancelled_before_start_publishes_nothing() {
        let (coordinator, recorder, oracle) = setup(false, ScriptedOracle::ok());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = coordinator
            .execute_with_cancel("u1", &subtasks(), &TraceId::from_raw("t"), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "cancelled");
        assert_eq!(oracle.call_count.load(Ordering::Relaxed), 0);
        assert!(recorder.seen.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_mode_cancels_inflight_proposals() {
        let oracle = ScriptedOracle {
            delay_for: Some((AgentKind::Study, Duration::from_secs(60))),
            ..ScriptedOracle::ok()
        };
        let (coordinator, recorder, _) = setup(false, oracle);
        let coordinator = coordinator.with_mode(ProposalMode::Concurrent);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let _ = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let err = coordinator
            .execute_with_cancel("u1", &subtasks(), &TraceId::from_raw("t"), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "cancelled");
        assert!(recorder
            .seen
            .lock()
            .iter()
            .all(|e| e.kind == EventKind::AgentLog));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_mode_keeps_each_log_pair_ordered() {
        let oracle = ScriptedOracle {
            delay_for: Some((AgentKind::Study, Duration::from_millis(200))),
            ..ScriptedOracle::ok()
        };
        let (coordinator, recorder, _) = setup(false, oracle);
        let coordinator = coordinator.with_mode(ProposalMode::Concurrent);

        let timeline = coordinator
            .execute("u1", &subtasks(), &TraceId::from_raw("t"))
            .await
            .unwrap();
        assert_eq!(timeline.len(), 2);

        let logs = log_messages(&recorder);
        assert_eq!(logs.len(), 6);
        for agent in ["study_agent", "meal_agent", "calendar_agent"] {
            let own: Vec<&str> = logs
                .iter()
                .filter(|(a, _)| a == agent)
                .map(|(_, m)| m.as_str())
                .collect();
            assert_eq!(own.len(), 2);
            assert!(own[0].starts_with("Starting: "));
            assert!(own[1].starts_with("Proposed "));
        }
        // study was delayed, so its result arrives last
        assert_eq!(logs[5].0, "study_agent");
    }

    #[tokio::test]
    async fn spawn_agents_names_and_announces() {
        let (coordinator, recorder, _) = setup(false, ScriptedOracle::ok());
        let mut subtask = Subtask::new(AgentKind::Meal, "Plan meals");
        subtask.id = taskweave_core::SubtaskId::from_raw("sub_0192abcdef");

        let ids = coordinator
            .spawn_agents(&[subtask], &TraceId::from_raw("t"))
            .await;
        assert_eq!(ids, vec!["agent_meal_agent_sub_0192".to_string()]);

        let seen = recorder.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].kind, EventKind::AgentsSpawned);
        assert_eq!(seen[0].payload["agent_ids"][0], "agent_meal_agent_sub_0192");
    }
}
