mod logging;

pub use logging::{format_timestamp, LogQuery, LogRecord, SqliteLogLayer, SqliteLogSink};

use std::path::PathBuf;
use std::sync::Arc;

use onetrick_settings::{resolve_path, LoggingSettings};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "onetrick_store" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// Whether to persist warn+ logs to SQLite.
    pub log_to_sqlite: bool,
    pub log_db_path: PathBuf,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self::from(&LoggingSettings::default())
    }
}

impl From<&LoggingSettings> for TelemetryConfig {
    fn from(settings: &LoggingSettings) -> Self {
        Self {
            log_level: settings.level.parse().unwrap_or(Level::INFO),
            module_levels: Vec::new(),
            log_to_sqlite: settings.persist_warnings,
            log_db_path: resolve_path(&settings.log_db_path),
        }
    }
}

/// Keeps the log sink reachable for queries after init.
pub struct TelemetryGuard {
    log_sink: Option<Arc<SqliteLogSink>>,
}

impl TelemetryGuard {
    /// Access the log sink for querying persisted logs.
    pub fn logs(&self) -> Option<&SqliteLogSink> {
        self.log_sink.as_deref()
    }
}

fn filter_directive(config: &TelemetryConfig) -> String {
    let mut filter_str = config.log_level.to_string().to_lowercase();
    for (module, level) in &config.module_levels {
        filter_str.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
    }
    filter_str
}

/// Initialize the telemetry subsystem. Call once at startup; a second call
/// leaves the first subscriber in place.
pub fn init_telemetry(config: TelemetryConfig) -> TelemetryGuard {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(&config)));

    // JSON formatting layer for stdout
    let fmt_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_target(true)
        .with_span_list(true)
        .with_filter(env_filter);

    let (sqlite_layer, sqlite_sink) = if config.log_to_sqlite {
        match SqliteLogSink::new(&config.log_db_path) {
            Ok(sink) => {
                let sink = Arc::new(sink);
                (Some(SqliteLogLayer::new(sink.clone())), Some(sink))
            }
            Err(e) => {
                eprintln!("onetrick-telemetry: failed to open log DB: {e}");
                (None, None)
            }
        }
    } else {
        (None, None)
    };

    if tracing_subscriber::registry()
        .with(fmt_layer)
        .with(sqlite_layer)
        .try_init()
        .is_err()
    {
        eprintln!("onetrick-telemetry: global subscriber already set");
    }

    TelemetryGuard {
        log_sink: sqlite_sink,
    }
}
