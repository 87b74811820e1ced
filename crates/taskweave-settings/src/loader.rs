//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::Settings;

/// `~/.taskweave`, falling back to `/tmp/.taskweave` without a home.
pub fn taskweave_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".taskweave")
}

/// Resolve the path to the settings file (`~/.taskweave/settings.json`).
pub fn settings_path() -> PathBuf {
    taskweave_dir().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<Settings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<Settings> {
    let mut settings: Settings = merge_file_over_defaults(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

fn merge_file_over_defaults(path: &Path) -> Result<Settings> {
    let defaults = serde_json::to_value(Settings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are logged and ignored (file/default value wins).
pub fn apply_env_overrides(settings: &mut Settings) {
    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = read_env_string("TASKWEAVE_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_env_parsed("TASKWEAVE_PORT", |s| parse_u16_range(s, 1, 65535)) {
        settings.server.port = v;
    }
    if let Some(v) = read_env_parsed("TASKWEAVE_MAX_SEND_QUEUE", |s| {
        parse_usize_range(s, 1, 65_536)
    }) {
        settings.server.max_send_queue = v;
    }
    if let Some(v) = read_env_string("TASKWEAVE_ALLOWED_ORIGINS") {
        settings.server.allowed_origins = split_list(&v);
    }

    // ── Bus / orchestrator ──────────────────────────────────────────
    if let Some(v) = read_env_parsed("TASKWEAVE_HANDLER_TIMEOUT_MS", |s| {
        parse_u64_range(s, 1, 600_000)
    }) {
        settings.bus.handler_timeout_ms = v;
    }
    if let Some(v) = read_env_parsed("TASKWEAVE_PROPOSAL_MODE", parse_variant) {
        settings.orchestrator.proposal_mode = v;
    }

    // ── Backends ────────────────────────────────────────────────────
    if let Some(v) = read_env_parsed("TASKWEAVE_PLANNER", parse_variant) {
        settings.backends.planner = v;
    }
    if let Some(v) = read_env_parsed("TASKWEAVE_MEMORY_BACKEND", parse_variant) {
        settings.backends.memory = v;
    }
    if let Some(v) = read_env_parsed("TASKWEAVE_CALENDAR", parse_variant) {
        settings.backends.calendar = v;
    }
    if let Some(v) = read_env_string("TASKWEAVE_MEMORY_DB") {
        settings.backends.memory_db_path = v;
    }
    if let Some(v) = read_env_string("ANTHROPIC_API_KEY") {
        settings.backends.anthropic.api_key = Some(v);
    }
    if let Some(v) = read_env_string("TASKWEAVE_ANTHROPIC_MODEL") {
        settings.backends.anthropic.model = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read_env_string("TASKWEAVE_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_env_parsed("TASKWEAVE_LOG_JSON", parse_bool) {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a snake_case enum variant name (`"sqlite"`, `"dry_run"`, ...).
pub fn parse_variant<T: DeserializeOwned>(val: &str) -> Option<T> {
    serde_json::from_value(Value::String(val.trim().to_lowercase())).ok()
}

/// Comma separated list, blanks dropped.
pub fn split_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_parsed<T>(name: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
    let val = std::env::var(name).ok()?;
    let result = parse(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid env var, ignoring");
    }
    result
}
