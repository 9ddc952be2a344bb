use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use onetrick_core::ids::{CharacterId, HistoryId, SnapshotId, UserId};
use onetrick_core::loadout::{ClassStat, Loadout, WeaponFingerprint};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers::{self, ts_to_sql};

/// Canonical, deduplicated loadout for one character.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRow {
    pub id: SnapshotId,
    pub user_id: UserId,
    pub character_id: CharacterId,
    pub hash: String,
    pub loadout: Loadout,
    pub stats: Option<BTreeMap<String, ClassStat>>,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One immutable observation of a snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryRow {
    pub id: HistoryId,
    pub snapshot_id: SnapshotId,
    pub user_id: UserId,
    pub character_id: CharacterId,
    pub timestamp: DateTime<Utc>,
    pub fingerprint: WeaponFingerprint,
}

/// Input to [`SnapshotRepo::put`].
#[derive(Clone, Debug)]
pub struct NewSnapshot {
    pub user_id: UserId,
    pub character_id: CharacterId,
    pub loadout: Loadout,
    pub stats: Option<BTreeMap<String, ClassStat>>,
    /// Display name; generated only when a new snapshot is created without one.
    pub name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PutOutcome {
    pub snapshot_id: SnapshotId,
    pub history_id: HistoryId,
    pub is_new: bool,
}

pub struct SnapshotRepo {
    db: Database,
}

impl SnapshotRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Store an observed loadout. Resolves to the existing snapshot with the
    /// same content hash for this character, or creates one, then appends a
    /// history entry. Both happen in one transaction.
    #[instrument(skip(self, snapshot, name_fallback), fields(character_id = %snapshot.character_id))]
    pub fn put(
        &self,
        snapshot: &NewSnapshot,
        observed_at: DateTime<Utc>,
        name_fallback: impl FnOnce() -> String,
    ) -> Result<PutOutcome, StoreError> {
        let hash = snapshot.loadout.content_hash();
        let fingerprint = snapshot.loadout.fingerprint();
        let now = ts_to_sql(observed_at);

        self.db.with_tx(|conn| {
            let existing: Option<String> = conn
                .query_row(
                    "SELECT id FROM snapshots WHERE user_id = ?1 AND character_id = ?2 AND hash = ?3",
                    rusqlite::params![
                        snapshot.user_id.as_str(),
                        snapshot.character_id.as_str(),
                        hash
                    ],
                    |row| row.get(0),
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(other),
                })?;

            let (snapshot_id, is_new) = match existing {
                Some(id) => {
                    let id = SnapshotId::from_raw(id);
                    conn.execute(
                        "UPDATE snapshots SET updated_at = MAX(updated_at, ?1) WHERE id = ?2",
                        rusqlite::params![now, id.as_str()],
                    )?;
                    (id, false)
                }
                None => {
                    let id = SnapshotId::new();
                    let name = snapshot.name.clone().unwrap_or_else(name_fallback);
                    let stats = snapshot
                        .stats
                        .as_ref()
                        .map(serde_json::to_string)
                        .transpose()?;
                    conn.execute(
                        "INSERT INTO snapshots (id, user_id, character_id, hash, loadout, stats, name, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                        rusqlite::params![
                            id.as_str(),
                            snapshot.user_id.as_str(),
                            snapshot.character_id.as_str(),
                            hash,
                            serde_json::to_string(&snapshot.loadout)?,
                            stats,
                            name,
                            now,
                            now,
                        ],
                    )?;
                    (id, true)
                }
            };

            let history_id = HistoryId::new();
            conn.execute(
                "INSERT INTO histories (id, snapshot_id, user_id, character_id, timestamp, kinetic_hash, energy_hash, power_hash)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    history_id.as_str(),
                    snapshot_id.as_str(),
                    snapshot.user_id.as_str(),
                    snapshot.character_id.as_str(),
                    now,
                    fingerprint.kinetic,
                    fingerprint.energy,
                    fingerprint.power,
                ],
            )?;

            debug!(snapshot_id = %snapshot_id, is_new, "snapshot observed");
            Ok(PutOutcome {
                snapshot_id,
                history_id,
                is_new,
            })
        })
    }

    #[instrument(skip(self), fields(snapshot_id = %id))]
    pub fn get(&self, id: &SnapshotId) -> Result<SnapshotRow, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, character_id, hash, loadout, stats, name, created_at, updated_at
                 FROM snapshots WHERE id = ?1",
            )?;
            let mut rows = stmt.query([id.as_str()])?;
            match rows.next()? {
                Some(row) => row_to_snapshot(row),
                None => Err(StoreError::NotFound(format!("snapshot {id}"))),
            }
        })
    }

    /// History for one character with `from <= timestamp <= to`, newest first.
    #[instrument(skip(self), fields(character_id = %character_id))]
    pub fn query_history(
        &self,
        user_id: &UserId,
        character_id: &CharacterId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<HistoryRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, snapshot_id, user_id, character_id, timestamp, kinetic_hash, energy_hash, power_hash
                 FROM histories
                 WHERE user_id = ?1 AND character_id = ?2 AND timestamp >= ?3 AND timestamp <= ?4
                 ORDER BY timestamp DESC, id DESC",
            )?;
            let mut rows = stmt.query(rusqlite::params![
                user_id.as_str(),
                character_id.as_str(),
                ts_to_sql(from),
                ts_to_sql(to),
            ])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_history(row)?);
            }
            Ok(results)
        })
    }
}

fn row_to_snapshot(row: &rusqlite::Row<'_>) -> Result<SnapshotRow, StoreError> {
    let loadout: String = row_helpers::get(row, 4, "snapshots", "loadout")?;
    let stats: Option<String> = row_helpers::get_opt(row, 5, "snapshots", "stats")?;
    let created_at: String = row_helpers::get(row, 7, "snapshots", "created_at")?;
    let updated_at: String = row_helpers::get(row, 8, "snapshots", "updated_at")?;

    Ok(SnapshotRow {
        id: SnapshotId::from_raw(row_helpers::get::<String>(row, 0, "snapshots", "id")?),
        user_id: UserId::from_raw(row_helpers::get::<String>(row, 1, "snapshots", "user_id")?),
        character_id: CharacterId::from_raw(row_helpers::get::<String>(
            row,
            2,
            "snapshots",
            "character_id",
        )?),
        hash: row_helpers::get(row, 3, "snapshots", "hash")?,
        loadout: row_helpers::parse_json(&loadout, "snapshots", "loadout")?,
        stats: stats
            .map(|raw| row_helpers::parse_json(&raw, "snapshots", "stats"))
            .transpose()?,
        name: row_helpers::get(row, 6, "snapshots", "name")?,
        created_at: row_helpers::parse_ts(&created_at, "snapshots", "created_at")?,
        updated_at: row_helpers::parse_ts(&updated_at, "snapshots", "updated_at")?,
    })
}

fn row_to_history(row: &rusqlite::Row<'_>) -> Result<HistoryRow, StoreError> {
    let timestamp: String = row_helpers::get(row, 4, "histories", "timestamp")?;

    Ok(HistoryRow {
        id: HistoryId::from_raw(row_helpers::get::<String>(row, 0, "histories", "id")?),
        snapshot_id: SnapshotId::from_raw(row_helpers::get::<String>(
            row,
            1,
            "histories",
            "snapshot_id",
        )?),
        user_id: UserId::from_raw(row_helpers::get::<String>(row, 2, "histories", "user_id")?),
        character_id: CharacterId::from_raw(row_helpers::get::<String>(
            row,
            3,
            "histories",
            "character_id",
        )?),
        timestamp: row_helpers::parse_ts(&timestamp, "histories", "timestamp")?,
        fingerprint: WeaponFingerprint {
            kinetic: row_helpers::get_opt(row, 5, "histories", "kinetic_hash")?,
            energy: row_helpers::get_opt(row, 6, "histories", "energy_hash")?,
            power: row_helpers::get_opt(row, 7, "histories", "power_hash")?,
        },
    })
}
