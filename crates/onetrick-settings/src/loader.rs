//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`EngineSettings::default()`]
//! 2. If `~/.onetrick/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `ONETRICK_*` environment overrides (highest priority)
//! 4. Validate

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::EngineSettings;

/// `~/.onetrick`, falling back to `/tmp/.onetrick` without a home directory.
pub fn onetrick_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".onetrick")
}

pub fn settings_path() -> PathBuf {
    onetrick_home().join("settings.json")
}

/// Resolve a configured path: absolute paths pass through, relative ones
/// land under [`onetrick_home`].
pub fn resolve_path(raw: &str) -> PathBuf {
    let path = Path::new(raw);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        onetrick_home().join(path)
    }
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<EngineSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<EngineSettings> {
    let defaults = serde_json::to_value(EngineSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: EngineSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Invalid env values are ignored with a warning.
pub fn apply_env_overrides(settings: &mut EngineSettings) {
    if let Some(v) = read_env_string("ONETRICK_DB_PATH") {
        settings.store.db_path = v;
    }
    if let Some(v) = read_env_u32("ONETRICK_LOOKBACK_HOURS", 1, 24 * 30) {
        settings.matching.lookback_hours = v;
    }
    if let Some(v) = read_env_u32("ONETRICK_SLACK_MINUTES", 0, 24 * 60) {
        settings.matching.slack_minutes = v;
    }
    if let Some(v) = read_env_u32("ONETRICK_CUTOFF_HOURS", 1, 24 * 30) {
        settings.sessions.cutoff_hours = v;
    }
    if let Some(v) = read_env_u32("ONETRICK_ACTIVITY_PAGE_SIZE", 1, 250) {
        settings.polling.activity_page_size = v;
    }
    if let Some(v) = read_env_string("ONETRICK_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_env_bool("ONETRICK_PERSIST_WARNINGS") {
        settings.logging.persist_warnings = v;
    }
    if let Some(v) = read_env_string("ONETRICK_LOG_DB_PATH") {
        settings.logging.log_db_path = v;
    }
}

/// Reject settings that would make the engine misbehave rather than fail.
pub fn validate(settings: &EngineSettings) -> Result<()> {
    if settings.store.db_path.trim().is_empty() {
        return Err(SettingsError::invalid("store.dbPath", "is empty"));
    }
    let positive = [
        ("matching.lookbackHours", settings.matching.lookback_hours),
        ("sessions.cutoffHours", settings.sessions.cutoff_hours),
        ("polling.activityPageSize", settings.polling.activity_page_size),
    ];
    if let Some((key, _)) = positive.into_iter().find(|(_, v)| *v == 0) {
        return Err(SettingsError::invalid(key, "must be positive"));
    }
    Ok(())
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

pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers ─────────────────────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u32(name: &str, min: u32, max: u32) -> Option<u32> {
    let val = std::env::var(name).ok()?;
    let result = parse_u32_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u32 env var, ignoring");
    }
    result
}
