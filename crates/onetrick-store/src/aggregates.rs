use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use onetrick_core::activity::{ActivitySummary, InstancePerformance};
use onetrick_core::ids::{ActivityId, AggregateId, CharacterId, SessionId, SnapshotId};
use onetrick_core::link::SnapshotLink;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers::{self, ts_to_sql};

const MEMBER_SESSION: &str = "session";
const MEMBER_SNAPSHOT: &str = "snapshot";
const MEMBER_CHARACTER: &str = "character";

/// Merged view of one match instance across every character written so far.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    pub id: AggregateId,
    pub activity_id: ActivityId,
    pub activity: ActivitySummary,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub links: BTreeMap<CharacterId, SnapshotLink>,
    pub performance: BTreeMap<CharacterId, InstancePerformance>,
    pub session_ids: BTreeSet<SessionId>,
    pub snapshot_ids: BTreeSet<SnapshotId>,
    pub character_ids: BTreeSet<CharacterId>,
}

impl AggregateRow {
    pub fn link_for(&self, character_id: &CharacterId) -> Option<&SnapshotLink> {
        self.links.get(character_id)
    }
}

/// One character's contribution to a match aggregate.
#[derive(Clone, Debug)]
pub struct AggregateWrite {
    pub activity: ActivitySummary,
    pub character_id: CharacterId,
    pub session_id: Option<SessionId>,
    pub link: SnapshotLink,
    pub performance: Option<InstancePerformance>,
}

pub struct AggregateRepo {
    db: Database,
}

impl AggregateRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create-if-absent / merge-if-present keyed by activity id.
    ///
    /// The writer's character entry replaces any earlier entry for the same
    /// character; other characters are untouched. Member ids are unioned.
    /// The first writer's activity summary is kept.
    #[instrument(skip(self, write), fields(
        activity_id = %write.activity.instance_id,
        character_id = %write.character_id,
    ))]
    pub fn upsert(
        &self,
        write: &AggregateWrite,
        now: DateTime<Utc>,
    ) -> Result<AggregateRow, StoreError> {
        let activity_id = &write.activity.instance_id;
        let now = ts_to_sql(now);
        let activity_json = serde_json::to_string(&write.activity)?;
        let performance_json = write
            .performance
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.db.with_tx(|conn| {
            conn.execute(
                "INSERT INTO aggregates (id, activity_id, activity, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(activity_id) DO UPDATE SET updated_at = excluded.updated_at",
                rusqlite::params![
                    AggregateId::new().as_str(),
                    activity_id.as_str(),
                    activity_json,
                    now,
                ],
            )?;
            let aggregate_id: String = conn.query_row(
                "SELECT id FROM aggregates WHERE activity_id = ?1",
                [activity_id.as_str()],
                |row| row.get(0),
            )?;

            let link = &write.link;
            conn.execute(
                "INSERT INTO aggregate_characters
                    (aggregate_id, character_id, confidence_level, confidence_source, link_created_at,
                     snapshot_id, session_id, performance, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(aggregate_id, character_id) DO UPDATE SET
                    confidence_level = excluded.confidence_level,
                    confidence_source = excluded.confidence_source,
                    link_created_at = excluded.link_created_at,
                    snapshot_id = excluded.snapshot_id,
                    session_id = excluded.session_id,
                    performance = excluded.performance,
                    updated_at = excluded.updated_at",
                rusqlite::params![
                    aggregate_id,
                    write.character_id.as_str(),
                    link.confidence_level.to_string(),
                    link.confidence_source.to_string(),
                    ts_to_sql(link.created_at),
                    link.snapshot_id.as_ref().map(|id| id.as_str()),
                    link.session_id.as_ref().map(|id| id.as_str()),
                    performance_json,
                    now,
                ],
            )?;

            let mut members = conn.prepare(
                "INSERT OR IGNORE INTO aggregate_members (aggregate_id, kind, member_id) VALUES (?1, ?2, ?3)",
            )?;
            if let Some(session_id) = &write.session_id {
                members.execute([aggregate_id.as_str(), MEMBER_SESSION, session_id.as_str()])?;
            }
            if let Some(snapshot_id) = &link.snapshot_id {
                members.execute([aggregate_id.as_str(), MEMBER_SNAPSHOT, snapshot_id.as_str()])?;
            }
            members.execute([
                aggregate_id.as_str(),
                MEMBER_CHARACTER,
                write.character_id.as_str(),
            ])?;

            let merged = load(conn, &aggregate_id)?;
            debug!(
                aggregate_id = %merged.id,
                characters = merged.character_ids.len(),
                "aggregate merged"
            );
            Ok(merged)
        })
    }

    #[instrument(skip(self), fields(activity_id = %activity_id))]
    pub fn find_by_activity(
        &self,
        activity_id: &ActivityId,
    ) -> Result<Option<AggregateRow>, StoreError> {
        Ok(self
            .find_by_activities(std::slice::from_ref(activity_id))?
            .remove(activity_id))
    }

    /// Existing aggregates for any of `activity_ids`, keyed by activity id.
    /// Ids without an aggregate are simply absent.
    #[instrument(skip(self, activity_ids), fields(count = activity_ids.len()))]
    pub fn find_by_activities(
        &self,
        activity_ids: &[ActivityId],
    ) -> Result<HashMap<ActivityId, AggregateRow>, StoreError> {
        if activity_ids.is_empty() {
            return Ok(HashMap::new());
        }
        self.db.with_conn(|conn| {
            let placeholders = (1..=activity_ids.len())
                .map(|i| format!("?{i}"))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!("SELECT id FROM aggregates WHERE activity_id IN ({placeholders})");
            let mut stmt = conn.prepare(&sql)?;
            let params = rusqlite::params_from_iter(activity_ids.iter().map(|id| id.as_str()));
            let ids: Vec<String> = stmt
                .query_map(params, |row| row.get(0))?
                .collect::<Result<_, _>>()?;

            let mut found = HashMap::with_capacity(ids.len());
            for id in ids {
                let row = load(conn, &id)?;
                found.insert(row.activity_id.clone(), row);
            }
            Ok(found)
        })
    }
}

fn load(conn: &Connection, aggregate_id: &str) -> Result<AggregateRow, StoreError> {
    let (activity_id, activity, created_at, updated_at): (String, String, String, String) = conn
        .query_row(
            "SELECT activity_id, activity, created_at, updated_at FROM aggregates WHERE id = ?1",
            [aggregate_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                StoreError::NotFound(format!("aggregate {aggregate_id}"))
            }
            other => other.into(),
        })?;

    let mut row = AggregateRow {
        id: AggregateId::from_raw(aggregate_id),
        activity_id: ActivityId::from_raw(activity_id),
        activity: row_helpers::parse_json(&activity, "aggregates", "activity")?,
        created_at: row_helpers::parse_ts(&created_at, "aggregates", "created_at")?,
        updated_at: row_helpers::parse_ts(&updated_at, "aggregates", "updated_at")?,
        links: BTreeMap::new(),
        performance: BTreeMap::new(),
        session_ids: BTreeSet::new(),
        snapshot_ids: BTreeSet::new(),
        character_ids: BTreeSet::new(),
    };

    let mut stmt = conn.prepare(
        "SELECT character_id, confidence_level, confidence_source, link_created_at,
                snapshot_id, session_id, performance
         FROM aggregate_characters WHERE aggregate_id = ?1",
    )?;
    let mut rows = stmt.query([aggregate_id])?;
    while let Some(r) = rows.next()? {
        let character_id = CharacterId::from_raw(row_helpers::get::<String>(
            r,
            0,
            "aggregate_characters",
            "character_id",
        )?);
        let level: String = row_helpers::get(r, 1, "aggregate_characters", "confidence_level")?;
        let source: String = row_helpers::get(r, 2, "aggregate_characters", "confidence_source")?;
        let created: String = row_helpers::get(r, 3, "aggregate_characters", "link_created_at")?;
        let performance: Option<String> =
            row_helpers::get_opt(r, 6, "aggregate_characters", "performance")?;

        let link = SnapshotLink {
            character_id: character_id.clone(),
            confidence_level: row_helpers::parse_enum(
                &level,
                "aggregate_characters",
                "confidence_level",
            )?,
            confidence_source: row_helpers::parse_enum(
                &source,
                "aggregate_characters",
                "confidence_source",
            )?,
            created_at: row_helpers::parse_ts(&created, "aggregate_characters", "link_created_at")?,
            snapshot_id: row_helpers::get_opt::<String>(r, 4, "aggregate_characters", "snapshot_id")?
                .map(SnapshotId::from_raw),
            session_id: row_helpers::get_opt::<String>(r, 5, "aggregate_characters", "session_id")?
                .map(SessionId::from_raw),
        };
        if let Some(raw) = performance {
            row.performance.insert(
                character_id.clone(),
                row_helpers::parse_json(&raw, "aggregate_characters", "performance")?,
            );
        }
        row.links.insert(character_id, link);
    }

    let mut stmt =
        conn.prepare("SELECT kind, member_id FROM aggregate_members WHERE aggregate_id = ?1")?;
    let mut rows = stmt.query([aggregate_id])?;
    while let Some(r) = rows.next()? {
        let kind: String = row_helpers::get(r, 0, "aggregate_members", "kind")?;
        let member: String = row_helpers::get(r, 1, "aggregate_members", "member_id")?;
        match kind.as_str() {
            MEMBER_SESSION => {
                row.session_ids.insert(SessionId::from_raw(member));
            }
            MEMBER_SNAPSHOT => {
                row.snapshot_ids.insert(SnapshotId::from_raw(member));
            }
            MEMBER_CHARACTER => {
                row.character_ids.insert(CharacterId::from_raw(member));
            }
            other => {
                return Err(StoreError::CorruptRow {
                    table: "aggregate_members",
                    column: "kind",
                    detail: format!("unknown variant: {other}"),
                })
            }
        }
    }

    Ok(row)
}
