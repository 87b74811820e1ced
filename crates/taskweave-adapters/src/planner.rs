use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::{debug, instrument};

use taskweave_core::collaborators::PlanningOracle;
use taskweave_core::{AgentKind, OracleError, SubtaskId};
use taskweave_settings::AnthropicSettings;

const ANTHROPIC_VERSION: &str = "2023-06-01";

struct Canned {
    rationale: &'static str,
    study: &'static str,
    meal: &'static str,
    calendar: &'static str,
}

const EXAM: Canned = Canned {
    rationale: "Breaking down exam preparation into study sessions, meal planning for energy, and calendar blocking for focus time.",
    study: "Create 3 focused study blocks per day (90min each) covering CS fundamentals, algorithms, and practice problems",
    meal: "Schedule healthy meals and snacks to maintain energy during study sessions",
    calendar: "Block study time in calendar, ensuring breaks and avoiding conflicts with existing commitments",
};

const PROJECT: Canned = Canned {
    rationale: "Organizing project work into coding sessions, nutrition planning, and time blocking.",
    study: "Allocate dedicated coding blocks for project implementation and testing",
    meal: "Plan meals around deep work sessions to optimize productivity",
    calendar: "Reserve uninterrupted time slots for coding and review",
};

const GENERAL: Canned = Canned {
    rationale: "Structuring the task into actionable work blocks, nutrition planning, and calendar management.",
    study: "Break task into focused work sessions with clear objectives",
    meal: "Ensure proper nutrition and breaks during work periods",
    calendar: "Schedule time blocks and protect focus time from interruptions",
};

/// Keyword-driven planner that never leaves the process.
#[derive(Default)]
pub struct MockPlanner {
    call_count: AtomicUsize,
}

impl MockPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    fn pick(prompt: &str) -> &'static Canned {
        let lower = prompt.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));
        if has(&["midterm", "exam", "study"]) {
            &EXAM
        } else if has(&["project", "code"]) {
            &PROJECT
        } else {
            &GENERAL
        }
    }
}

#[async_trait]
impl PlanningOracle for MockPlanner {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete_json(&self, prompt: &str, _system_prompt: &str) -> Result<Value, OracleError> {
        let _ = self.call_count.fetch_add(1, Ordering::Relaxed);
        let canned = Self::pick(prompt);
        let subtask = |agent: AgentKind, description: &str| {
            json!({ "id": SubtaskId::new(), "agent": agent, "description": description })
        };
        Ok(json!({
            "rationale": canned.rationale,
            "subtasks": [
                subtask(AgentKind::Study, canned.study),
                subtask(AgentKind::Meal, canned.meal),
                subtask(AgentKind::Calendar, canned.calendar),
            ]
        }))
    }
}

/// Planner backed by the Anthropic Messages API.
pub struct AnthropicPlanner {
    client: Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicPlanner {
    pub fn new(api_key: SecretString, settings: &AnthropicSettings) -> Result<Self, OracleError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| OracleError::Network(format!("http client: {e}")))?;
        Ok(Self {
            client,
            api_key,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl std::fmt::Debug for AnthropicPlanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicPlanner")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PlanningOracle for AnthropicPlanner {
    fn name(&self) -> &str {
        "anthropic"
    }

    #[instrument(skip_all, fields(model = %self.model))]
    async fn complete_json(&self, prompt: &str, system_prompt: &str) -> Result<Value, OracleError> {
        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": system_prompt,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let resp = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| OracleError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(OracleError::Http { status, body });
        }

        let data: Value = resp
            .json()
            .await
            .map_err(|e| OracleError::InvalidResponse(e.to_string()))?;
        let text = data
            .pointer("/content/0/text")
            .and_then(Value::as_str)
            .ok_or_else(|| OracleError::InvalidResponse("missing content[0].text".into()))?;
        debug!(chars = text.len(), "planner reply received");

        serde_json::from_str(strip_code_fence(text))
            .map_err(|e| OracleError::InvalidResponse(format!("reply is not JSON: {e}")))
    }
}

/// Drop a surrounding markdown code fence, if any.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}
