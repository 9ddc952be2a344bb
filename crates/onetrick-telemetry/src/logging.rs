use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::field::{Field, Visit};
use tracing::span;
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// A persisted WARN+ event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: i64,
    pub timestamp: String,
    pub level: String,
    pub target: String,
    pub message: String,
    pub fields: Option<String>,
    pub session_id: Option<String>,
    pub character_id: Option<String>,
    pub activity_id: Option<String>,
}

/// Fixed-width UTC form used for stored timestamps. `LogQuery::since`
/// compares as text, so callers should build it with this too.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Clone, Debug, Default)]
pub struct LogQuery {
    pub level: Option<String>,
    pub session_id: Option<String>,
    pub activity_id: Option<String>,
    pub since: Option<String>,
    pub limit: Option<u32>,
}

/// SQLite sink for skipped sessions and failed merges, so a driver can see
/// which sessions were retried and why.
pub struct SqliteLogSink {
    conn: Mutex<Connection>,
}

impl SqliteLogSink {
    pub fn new(db_path: &Path) -> Result<Self, rusqlite::Error> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(db_path)?;
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self, rusqlite::Error> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, rusqlite::Error> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             CREATE TABLE IF NOT EXISTS logs (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 timestamp TEXT NOT NULL,
                 level TEXT NOT NULL,
                 target TEXT NOT NULL,
                 message TEXT NOT NULL,
                 fields TEXT,
                 session_id TEXT,
                 character_id TEXT,
                 activity_id TEXT
             );
             CREATE INDEX IF NOT EXISTS idx_logs_level ON logs(level);
             CREATE INDEX IF NOT EXISTS idx_logs_session ON logs(session_id);
             CREATE INDEX IF NOT EXISTS idx_logs_activity ON logs(activity_id);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn insert(&self, record: &LogInsert) {
        let conn = self.conn.lock();
        // A failed log write must never surface into the engine.
        let _ = conn.execute(
            "INSERT INTO logs (timestamp, level, target, message, fields, session_id, character_id, activity_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                record.timestamp,
                record.level,
                record.target,
                record.message,
                record.fields,
                record.keys.session_id,
                record.keys.character_id,
                record.keys.activity_id,
            ],
        );
    }

    /// Most recent first.
    pub fn query(&self, q: &LogQuery) -> Result<Vec<LogRecord>, rusqlite::Error> {
        let conn = self.conn.lock();
        let mut sql = String::from(
            "SELECT id, timestamp, level, target, message, fields, session_id, character_id, activity_id
             FROM logs WHERE 1=1",
        );
        let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(level) = &q.level {
            sql.push_str(&format!(" AND level = ?{}", params.len() + 1));
            params.push(Box::new(level.clone()));
        }
        if let Some(session_id) = &q.session_id {
            sql.push_str(&format!(" AND session_id = ?{}", params.len() + 1));
            params.push(Box::new(session_id.clone()));
        }
        if let Some(activity_id) = &q.activity_id {
            sql.push_str(&format!(" AND activity_id = ?{}", params.len() + 1));
            params.push(Box::new(activity_id.clone()));
        }
        if let Some(since) = &q.since {
            sql.push_str(&format!(" AND timestamp >= ?{}", params.len() + 1));
            params.push(Box::new(since.clone()));
        }
        sql.push_str(&format!(" ORDER BY id DESC LIMIT {}", q.limit.unwrap_or(100)));

        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            params.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), |row| {
            Ok(LogRecord {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                level: row.get(2)?,
                target: row.get(3)?,
                message: row.get(4)?,
                fields: row.get(5)?,
                session_id: row.get(6)?,
                character_id: row.get(7)?,
                activity_id: row.get(8)?,
            })
        })?;
        rows.collect()
    }

    pub fn count(&self) -> Result<i64, rusqlite::Error> {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM logs", [], |row| row.get(0))
    }
}

struct LogInsert {
    timestamp: String,
    level: String,
    target: String,
    message: String,
    fields: Option<String>,
    keys: CorrelationKeys,
}

/// Identifying keys lifted out of event or span fields.
#[derive(Clone, Debug, Default)]
struct CorrelationKeys {
    session_id: Option<String>,
    character_id: Option<String>,
    activity_id: Option<String>,
}

impl CorrelationKeys {
    fn is_empty(&self) -> bool {
        self.session_id.is_none() && self.character_id.is_none() && self.activity_id.is_none()
    }

    fn is_complete(&self) -> bool {
        self.session_id.is_some() && self.character_id.is_some() && self.activity_id.is_some()
    }

    fn fill_from(&mut self, other: &CorrelationKeys) {
        if self.session_id.is_none() {
            self.session_id.clone_from(&other.session_id);
        }
        if self.character_id.is_none() {
            self.character_id.clone_from(&other.character_id);
        }
        if self.activity_id.is_none() {
            self.activity_id.clone_from(&other.activity_id);
        }
    }

    fn set(&mut self, name: &str, value: String) -> bool {
        let slot = match name {
            "session_id" => &mut self.session_id,
            "character_id" => &mut self.character_id,
            "activity_id" => &mut self.activity_id,
            _ => return false,
        };
        *slot = Some(value);
        true
    }
}

/// tracing Layer that writes WARN+ events to a [`SqliteLogSink`].
pub struct SqliteLogLayer {
    sink: Arc<SqliteLogSink>,
}

impl SqliteLogLayer {
    pub fn new(sink: Arc<SqliteLogSink>) -> Self {
        Self { sink }
    }
}

struct FieldVisitor {
    message: Option<String>,
    fields: serde_json::Map<String, serde_json::Value>,
    keys: CorrelationKeys,
}

impl FieldVisitor {
    fn new() -> Self {
        Self {
            message: None,
            fields: serde_json::Map::new(),
            keys: CorrelationKeys::default(),
        }
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let val = format!("{value:?}");
        if field.name() == "message" {
            self.message = Some(val);
        } else if !self.keys.set(field.name(), val.trim_matches('"').to_string()) {
            self.fields
                .insert(field.name().to_string(), serde_json::Value::String(val));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else if !self.keys.set(field.name(), value.to_string()) {
            self.fields.insert(
                field.name().to_string(),
                serde_json::Value::String(value.to_string()),
            );
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::Number(value.into()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::Number(value.into()));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::Bool(value));
    }
}

impl<S> Layer<S> for SqliteLogLayer
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fn on_event(&self, event: &tracing::Event<'_>, ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if level > tracing::Level::WARN {
            return;
        }

        let mut visitor = FieldVisitor::new();
        event.record(&mut visitor);

        // Inherit keys from the innermost span that carries them.
        if !visitor.keys.is_complete() {
            if let Some(scope) = ctx.event_scope(event) {
                for span in scope {
                    if let Some(keys) = span.extensions().get::<CorrelationKeys>() {
                        visitor.keys.fill_from(keys);
                    }
                }
            }
        }

        let fields = if visitor.fields.is_empty() {
            None
        } else {
            serde_json::to_string(&visitor.fields).ok()
        };

        self.sink.insert(&LogInsert {
            timestamp: format_timestamp(Utc::now()),
            level: level.to_string().to_uppercase(),
            target: event.metadata().target().to_string(),
            message: visitor.message.unwrap_or_default(),
            fields,
            keys: visitor.keys,
        });
    }

    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::new();
        attrs.record(&mut visitor);

        if !visitor.keys.is_empty() {
            if let Some(span) = ctx.span(id) {
                span.extensions_mut().insert(visitor.keys);
            }
        }
    }
}
