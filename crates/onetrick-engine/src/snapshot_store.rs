use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use onetrick_core::clock::Clock;
use onetrick_core::ids::{CharacterId, SnapshotId, UserId};
use onetrick_core::loadout::{ClassStat, Loadout};
use onetrick_store::{Database, HistoryRow, NewSnapshot, PutOutcome, SnapshotRepo, SnapshotRow, StoreError};

use crate::error::EngineError;
use crate::naming::SnapshotNamer;
use crate::providers::{LoadoutProvider, Membership};

/// Content-addressed loadout snapshots plus their observation history.
pub struct SnapshotStore {
    repo: SnapshotRepo,
    namer: Arc<dyn SnapshotNamer>,
    clock: Arc<dyn Clock>,
}

impl SnapshotStore {
    pub fn new(db: Database, namer: Arc<dyn SnapshotNamer>, clock: Arc<dyn Clock>) -> Self {
        Self {
            repo: SnapshotRepo::new(db),
            namer,
            clock,
        }
    }

    /// Record an observation of `loadout` at the current time.
    pub fn put(
        &self,
        user_id: &UserId,
        character_id: &CharacterId,
        loadout: Loadout,
        stats: Option<BTreeMap<String, ClassStat>>,
    ) -> Result<PutOutcome, StoreError> {
        self.put_at(user_id, character_id, loadout, stats, self.clock.now())
    }

    pub fn put_at(
        &self,
        user_id: &UserId,
        character_id: &CharacterId,
        loadout: Loadout,
        stats: Option<BTreeMap<String, ClassStat>>,
        observed_at: DateTime<Utc>,
    ) -> Result<PutOutcome, StoreError> {
        let snapshot = NewSnapshot {
            user_id: user_id.clone(),
            character_id: character_id.clone(),
            loadout,
            stats,
            name: None,
        };
        self.repo.put(&snapshot, observed_at, || self.namer.name())
    }

    pub fn get(&self, id: &SnapshotId) -> Result<SnapshotRow, StoreError> {
        self.repo.get(id)
    }

    pub fn query_history(
        &self,
        user_id: &UserId,
        character_id: &CharacterId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<HistoryRow>, StoreError> {
        self.repo.query_history(user_id, character_id, from, to)
    }

    /// Fetch what the character has equipped right now and store it. The
    /// upstream mint time is used as the observation time when present.
    #[instrument(skip(self, membership, loadouts), fields(character_id = %character_id))]
    pub async fn capture(
        &self,
        user_id: &UserId,
        character_id: &CharacterId,
        membership: &Membership,
        loadouts: &dyn LoadoutProvider,
    ) -> Result<PutOutcome, EngineError> {
        let observation = loadouts.equipped(membership, character_id).await?;
        let observed_at = observation.minted_at.unwrap_or_else(|| self.clock.now());
        let loadout = Loadout::from_items(observation.items);
        if loadout.is_empty() {
            debug!("no tracked buckets equipped");
        }

        let outcome = self.put_at(user_id, character_id, loadout, observation.stats, observed_at)?;
        info!(
            snapshot_id = %outcome.snapshot_id,
            is_new = outcome.is_new,
            "saved loadout"
        );
        Ok(outcome)
    }
}
