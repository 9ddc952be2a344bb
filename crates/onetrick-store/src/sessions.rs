use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use onetrick_core::ids::{ActivityId, AggregateId, CharacterId, SessionId, UserId};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers::{self, ts_to_sql};

/// Session lifecycle: `pending → active → {stale-ended | inactive-ended} → complete`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionStatus {
    Pending,
    Active,
    StaleEnded,
    InactiveEnded,
    Complete,
}

impl SessionStatus {
    /// Re-entering the current status is always allowed.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        self == next
            || matches!(
                (self, next),
                (Pending, Active | StaleEnded | InactiveEnded | Complete)
                    | (Active, StaleEnded | InactiveEnded | Complete)
                    | (StaleEnded | InactiveEnded, Complete)
            )
    }

    pub fn is_terminal(self) -> bool {
        self == SessionStatus::Complete
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Active => write!(f, "active"),
            Self::StaleEnded => write!(f, "stale-ended"),
            Self::InactiveEnded => write!(f, "inactive-ended"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "stale-ended" => Ok(Self::StaleEnded),
            "inactive-ended" => Ok(Self::InactiveEnded),
            "complete" => Ok(Self::Complete),
            other => Err(format!("unknown session status: {other}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionRow {
    pub id: SessionId,
    pub user_id: UserId,
    pub character_id: CharacterId,
    pub started_at: DateTime<Utc>,
    pub last_seen_activity_id: Option<ActivityId>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub aggregate_ids: Vec<AggregateId>,
    pub completed_by: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const SESSION_COLUMNS: &str = "id, user_id, character_id, started_at, last_seen_activity_id, last_seen_at,
     status, completed_by, completed_at, created_at, updated_at";

pub struct SessionRepo {
    db: Database,
}

impl SessionRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Open a pending session. Sessions are opened by whoever enrolls a
    /// player; the poll cycle only advances them.
    #[instrument(skip(self), fields(user_id = %user_id, character_id = %character_id))]
    pub fn create(
        &self,
        user_id: &UserId,
        character_id: &CharacterId,
        started_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<SessionRow, StoreError> {
        let id = SessionId::new();
        let now_sql = ts_to_sql(now);

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (id, user_id, character_id, started_at, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?6)",
                rusqlite::params![
                    id.as_str(),
                    user_id.as_str(),
                    character_id.as_str(),
                    ts_to_sql(started_at),
                    now_sql,
                    now_sql,
                ],
            )?;

            Ok(SessionRow {
                id,
                user_id: user_id.clone(),
                character_id: character_id.clone(),
                started_at,
                last_seen_activity_id: None,
                last_seen_at: None,
                status: SessionStatus::Pending,
                aggregate_ids: Vec::new(),
                completed_by: None,
                completed_at: None,
                created_at: now,
                updated_at: now,
            })
        })
    }

    #[instrument(skip(self), fields(session_id = %id))]
    pub fn get(&self, id: &SessionId) -> Result<SessionRow, StoreError> {
        self.db.with_conn(|conn| {
            let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1");
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query([id.as_str()])?;
            let mut session = match rows.next()? {
                Some(row) => row_to_session(row)?,
                None => return Err(StoreError::NotFound(format!("session {id}"))),
            };
            session.aggregate_ids = load_aggregate_ids(conn, &session.id)?;
            Ok(session)
        })
    }

    /// Every session not yet complete, oldest start first.
    #[instrument(skip(self))]
    pub fn list_open(&self) -> Result<Vec<SessionRow>, StoreError> {
        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {SESSION_COLUMNS} FROM sessions WHERE status != 'complete'
                 ORDER BY started_at ASC, id ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query([])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_session(row)?);
            }
            for session in &mut results {
                session.aggregate_ids = load_aggregate_ids(conn, &session.id)?;
            }
            Ok(results)
        })
    }

    /// Remember the newest activity seen for a session. A pending session
    /// becomes active.
    #[instrument(skip(self), fields(session_id = %id, activity_id = %activity_id))]
    pub fn record_last_activity(
        &self,
        id: &SessionId,
        activity_id: &ActivityId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let at = ts_to_sql(at);
        self.db.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE sessions SET
                    last_seen_activity_id = ?1,
                    last_seen_at = ?2,
                    updated_at = ?2,
                    status = CASE WHEN status = 'pending' THEN 'active' ELSE status END
                 WHERE id = ?3",
                rusqlite::params![activity_id.as_str(), at, id.as_str()],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("session {id}")));
            }
            Ok(())
        })
    }

    /// Move to `status`. Re-applying the current status is a no-op; moving
    /// backwards is a conflict.
    #[instrument(skip(self), fields(session_id = %id, status = %status))]
    pub fn transition(
        &self,
        id: &SessionId,
        status: SessionStatus,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.db.with_tx(|conn| {
            let current = current_status(conn, id)?;
            if current == status {
                return Ok(());
            }
            if !current.can_transition_to(status) {
                return Err(StoreError::Conflict(format!(
                    "session {id} cannot move from {current} to {status}"
                )));
            }
            conn.execute(
                "UPDATE sessions SET status = ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![status.to_string(), ts_to_sql(at), id.as_str()],
            )?;
            Ok(())
        })
    }

    /// Mark complete with an audit actor. Returns `false` when the session
    /// was already complete, in which case nothing is written.
    #[instrument(skip(self), fields(session_id = %id))]
    pub fn complete(
        &self,
        id: &SessionId,
        actor: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.db.with_tx(|conn| {
            if current_status(conn, id)?.is_terminal() {
                debug!("session already complete");
                return Ok(false);
            }
            let at = ts_to_sql(at);
            conn.execute(
                "UPDATE sessions SET status = 'complete', completed_by = ?1, completed_at = ?2, updated_at = ?2
                 WHERE id = ?3",
                rusqlite::params![actor, at, id.as_str()],
            )?;
            Ok(true)
        })
    }

    /// Set-union `ids` into the session's aggregate ids.
    #[instrument(skip(self, ids), fields(session_id = %id, count = ids.len()))]
    pub fn add_aggregate_ids(
        &self,
        id: &SessionId,
        ids: &[AggregateId],
    ) -> Result<(), StoreError> {
        self.db.with_tx(|conn| {
            current_status(conn, id)?;
            let mut stmt = conn.prepare(
                "INSERT OR IGNORE INTO session_aggregates (session_id, aggregate_id) VALUES (?1, ?2)",
            )?;
            for aggregate_id in ids {
                stmt.execute([id.as_str(), aggregate_id.as_str()])?;
            }
            Ok(())
        })
    }
}

fn current_status(
    conn: &rusqlite::Connection,
    id: &SessionId,
) -> Result<SessionStatus, StoreError> {
    let mut stmt = conn.prepare("SELECT status FROM sessions WHERE id = ?1")?;
    let mut rows = stmt.query([id.as_str()])?;
    match rows.next()? {
        Some(row) => {
            let raw: String = row_helpers::get(row, 0, "sessions", "status")?;
            row_helpers::parse_enum(&raw, "sessions", "status")
        }
        None => Err(StoreError::NotFound(format!("session {id}"))),
    }
}

fn load_aggregate_ids(
    conn: &rusqlite::Connection,
    id: &SessionId,
) -> Result<Vec<AggregateId>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT aggregate_id FROM session_aggregates WHERE session_id = ?1 ORDER BY aggregate_id",
    )?;
    let mut rows = stmt.query([id.as_str()])?;
    let mut ids = Vec::new();
    while let Some(row) = rows.next()? {
        ids.push(AggregateId::from_raw(row_helpers::get::<String>(
            row,
            0,
            "session_aggregates",
            "aggregate_id",
        )?));
    }
    Ok(ids)
}

fn opt_ts(
    row: &rusqlite::Row<'_>,
    idx: usize,
    column: &'static str,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    row_helpers::get_opt::<String>(row, idx, "sessions", column)?
        .map(|raw| row_helpers::parse_ts(&raw, "sessions", column))
        .transpose()
}

fn row_to_session(row: &rusqlite::Row<'_>) -> Result<SessionRow, StoreError> {
    let status: String = row_helpers::get(row, 6, "sessions", "status")?;
    let started_at: String = row_helpers::get(row, 3, "sessions", "started_at")?;
    let created_at: String = row_helpers::get(row, 9, "sessions", "created_at")?;
    let updated_at: String = row_helpers::get(row, 10, "sessions", "updated_at")?;

    Ok(SessionRow {
        id: SessionId::from_raw(row_helpers::get::<String>(row, 0, "sessions", "id")?),
        user_id: UserId::from_raw(row_helpers::get::<String>(row, 1, "sessions", "user_id")?),
        character_id: CharacterId::from_raw(row_helpers::get::<String>(
            row,
            2,
            "sessions",
            "character_id",
        )?),
        started_at: row_helpers::parse_ts(&started_at, "sessions", "started_at")?,
        last_seen_activity_id: row_helpers::get_opt::<String>(
            row,
            4,
            "sessions",
            "last_seen_activity_id",
        )?
        .map(ActivityId::from_raw),
        last_seen_at: opt_ts(row, 5, "last_seen_at")?,
        status: row_helpers::parse_enum(&status, "sessions", "status")?,
        aggregate_ids: Vec::new(),
        completed_by: row_helpers::get_opt(row, 7, "sessions", "completed_by")?,
        completed_at: opt_ts(row, 8, "completed_at")?,
        created_at: row_helpers::parse_ts(&created_at, "sessions", "created_at")?,
        updated_at: row_helpers::parse_ts(&updated_at, "sessions", "updated_at")?,
    })
}
