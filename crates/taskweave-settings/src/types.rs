use serde::{Deserialize, Serialize};
use taskweave_core::ProposalMode;

/// Root settings document.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub bus: BusSettings,
    pub orchestrator: OrchestratorSettings,
    pub backends: BackendSettings,
    pub logging: LoggingSettings,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Per-WebSocket outbound queue; events beyond this are dropped.
    pub max_send_queue: usize,
    pub allowed_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_send_queue: 256,
            allowed_origins: vec!["http://localhost:5173".to_string()],
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BusSettings {
    /// Upper bound on a single handler invocation during publish.
    pub handler_timeout_ms: u64,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            handler_timeout_ms: 5_000,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrchestratorSettings {
    pub proposal_mode: ProposalMode,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlannerBackend {
    #[default]
    Mock,
    Anthropic,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MemoryBackend {
    #[default]
    InMemory,
    Sqlite,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CalendarBackend {
    #[default]
    DryRun,
    InMemory,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendSettings {
    pub planner: PlannerBackend,
    pub memory: MemoryBackend,
    pub calendar: CalendarBackend,
    /// SQLite file used when `memory` is `sqlite`.
    pub memory_db_path: String,
    pub anthropic: AnthropicSettings,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            planner: PlannerBackend::default(),
            memory: MemoryBackend::default(),
            calendar: CalendarBackend::default(),
            memory_db_path: default_memory_db_path(),
            anthropic: AnthropicSettings::default(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnthropicSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for AnthropicSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.anthropic.com/v1".to_string(),
            model: "claude-3-5-sonnet-20241022".to_string(),
            max_tokens: 1024,
            timeout_secs: 30,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    /// JSON lines on stdout; `false` switches to human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

fn default_memory_db_path() -> String {
    crate::loader::taskweave_dir()
        .join("memory.db")
        .to_string_lossy()
        .into_owned()
}
