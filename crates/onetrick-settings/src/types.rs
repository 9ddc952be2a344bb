//! Settings type definitions.
//!
//! Field names are camelCase on disk. Every section is `#[serde(default)]`,
//! so a partial settings file only has to name the values it changes.

use serde::{Deserialize, Serialize};

/// Root settings for the correlation engine.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineSettings {
    pub store: StoreSettings,
    pub matching: MatchingSettings,
    pub sessions: SessionSettings,
    pub polling: PollingSettings,
    pub logging: LoggingSettings,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSettings {
    /// SQLite database path (relative paths resolve against `~/.onetrick`).
    pub db_path: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            db_path: "database/onetrick.db".to_string(),
        }
    }
}

/// Candidate window for snapshot matching: `[start - lookback, start + slack]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MatchingSettings {
    pub lookback_hours: u32,
    pub slack_minutes: u32,
}

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            lookback_hours: 12,
            slack_minutes: 15,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Staleness and inactivity threshold.
    pub cutoff_hours: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self { cutoff_hours: 10 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PollingSettings {
    /// How many recent activities to request per session per cycle.
    pub activity_page_size: u32,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            activity_page_size: 2,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level; `RUST_LOG` wins when set.
    pub level: String,
    /// Persist WARN+ events to SQLite.
    pub persist_warnings: bool,
    pub log_db_path: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            persist_warnings: true,
            log_db_path: "database/onetrick-logs.db".to_string(),
        }
    }
}
