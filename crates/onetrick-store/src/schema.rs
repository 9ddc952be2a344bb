/// SQL DDL for the onetrick store.
/// Timestamps are fixed-width RFC 3339 text, so lexical order is time order.
pub const SCHEMA_VERSION: u32 = 1;

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS snapshots (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    character_id TEXT NOT NULL,
    hash TEXT NOT NULL,
    loadout TEXT NOT NULL,
    stats TEXT,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (user_id, character_id, hash)
);

CREATE TABLE IF NOT EXISTS histories (
    id TEXT PRIMARY KEY,
    snapshot_id TEXT NOT NULL REFERENCES snapshots(id),
    user_id TEXT NOT NULL,
    character_id TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    kinetic_hash INTEGER,
    energy_hash INTEGER,
    power_hash INTEGER
);

CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    character_id TEXT NOT NULL,
    started_at TEXT NOT NULL,
    last_seen_activity_id TEXT,
    last_seen_at TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    completed_by TEXT,
    completed_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS aggregates (
    id TEXT PRIMARY KEY,
    activity_id TEXT NOT NULL UNIQUE,
    activity TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS session_aggregates (
    session_id TEXT NOT NULL REFERENCES sessions(id),
    aggregate_id TEXT NOT NULL,
    PRIMARY KEY (session_id, aggregate_id)
);

CREATE TABLE IF NOT EXISTS aggregate_characters (
    aggregate_id TEXT NOT NULL REFERENCES aggregates(id),
    character_id TEXT NOT NULL,
    confidence_level TEXT NOT NULL,
    confidence_source TEXT NOT NULL,
    link_created_at TEXT NOT NULL,
    snapshot_id TEXT,
    session_id TEXT,
    performance TEXT,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (aggregate_id, character_id)
);

CREATE TABLE IF NOT EXISTS aggregate_members (
    aggregate_id TEXT NOT NULL REFERENCES aggregates(id),
    kind TEXT NOT NULL,
    member_id TEXT NOT NULL,
    PRIMARY KEY (aggregate_id, kind, member_id)
);

CREATE INDEX IF NOT EXISTS idx_histories_character_ts ON histories(user_id, character_id, timestamp);
CREATE INDEX IF NOT EXISTS idx_histories_snapshot ON histories(snapshot_id);
CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);
"#;

pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
"#;
