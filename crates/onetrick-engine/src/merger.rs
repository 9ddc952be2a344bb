use std::collections::HashMap;
use std::sync::Arc;

use tracing::instrument;

use onetrick_core::activity::{ActivitySummary, InstancePerformance};
use onetrick_core::clock::Clock;
use onetrick_core::ids::{ActivityId, CharacterId, SessionId};
use onetrick_core::link::SnapshotLink;
use onetrick_store::{AggregateRepo, AggregateRow, AggregateWrite, Database, StoreError};

/// Per-match aggregates, merged across every character that reports in.
pub struct AggregateMerger {
    repo: AggregateRepo,
    clock: Arc<dyn Clock>,
}

impl AggregateMerger {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self {
            repo: AggregateRepo::new(db),
            clock,
        }
    }

    /// Fold one character's link and performance into the match aggregate,
    /// creating it on first write.
    #[instrument(skip_all, fields(activity_id = %activity.instance_id, character_id = %character_id))]
    pub fn upsert(
        &self,
        activity: &ActivitySummary,
        character_id: &CharacterId,
        session_id: Option<&SessionId>,
        link: SnapshotLink,
        performance: Option<InstancePerformance>,
    ) -> Result<AggregateRow, StoreError> {
        let write = AggregateWrite {
            activity: activity.clone(),
            character_id: character_id.clone(),
            session_id: session_id.cloned(),
            link,
            performance,
        };
        self.repo.upsert(&write, self.clock.now())
    }

    pub fn find_by_activity(
        &self,
        activity_id: &ActivityId,
    ) -> Result<Option<AggregateRow>, StoreError> {
        self.repo.find_by_activity(activity_id)
    }

    pub fn find_by_activities(
        &self,
        activity_ids: &[ActivityId],
    ) -> Result<HashMap<ActivityId, AggregateRow>, StoreError> {
        self.repo.find_by_activities(activity_ids)
    }
}

/// The character's link on `aggregate`, if both exist.
pub fn lookup_link<'a>(
    aggregate: Option<&'a AggregateRow>,
    character_id: &CharacterId,
) -> Option<&'a SnapshotLink> {
    aggregate.and_then(|agg| agg.link_for(character_id))
}
