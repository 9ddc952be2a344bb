use std::sync::Arc;

use chrono::Duration;
use tracing::{info, instrument};

use onetrick_core::activity::ActivitySummary;
use onetrick_core::clock::{abs_diff, Clock};
use onetrick_core::ids::{ActivityId, AggregateId, SessionId};
use onetrick_settings::SessionSettings;
use onetrick_store::{Database, SessionRepo, SessionRow, SessionStatus, StoreError};

/// Audit actor recorded when the engine completes a session.
pub const SYSTEM_ACTOR: &str = "system";

/// Why a session was ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndReason {
    /// No new activity, and the last one seen is far from the latest match.
    Stale,
    /// Nothing played since the session started, for too long.
    Inactive,
}

impl EndReason {
    fn status(self) -> SessionStatus {
        match self {
            Self::Stale => SessionStatus::StaleEnded,
            Self::Inactive => SessionStatus::InactiveEnded,
        }
    }
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stale => write!(f, "stale"),
            Self::Inactive => write!(f, "inactive"),
        }
    }
}

/// Session lifecycle checks and transitions.
pub struct SessionTracker {
    repo: SessionRepo,
    clock: Arc<dyn Clock>,
    cutoff: Duration,
}

impl SessionTracker {
    pub fn new(db: Database, settings: &SessionSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            repo: SessionRepo::new(db),
            clock,
            cutoff: Duration::hours(i64::from(settings.cutoff_hours)),
        }
    }

    pub fn repo(&self) -> &SessionRepo {
        &self.repo
    }

    pub fn list_open(&self) -> Result<Vec<SessionRow>, StoreError> {
        self.repo.list_open()
    }

    pub fn get(&self, id: &SessionId) -> Result<SessionRow, StoreError> {
        self.repo.get(id)
    }

    pub fn record_last_activity(
        &self,
        id: &SessionId,
        activity_id: &ActivityId,
    ) -> Result<(), StoreError> {
        self.repo
            .record_last_activity(id, activity_id, self.clock.now())
    }

    /// The last check-in (or last update, if none) is at least the cutoff
    /// away from the latest activity's start.
    pub fn is_stale(&self, session: &SessionRow, latest: &ActivitySummary) -> bool {
        let reference = session.last_seen_at.unwrap_or(session.updated_at);
        abs_diff(reference, latest.period) >= self.cutoff
    }

    /// The session started at least the cutoff ago.
    pub fn is_inactive(&self, session: &SessionRow) -> bool {
        abs_diff(session.started_at, self.clock.now()) >= self.cutoff
    }

    /// Record the `*-ended` state for `reason`, then complete the session as
    /// the system actor. Returns `false` if it was already complete.
    #[instrument(skip(self), fields(session_id = %id, reason = %reason))]
    pub fn end(&self, id: &SessionId, reason: EndReason) -> Result<bool, StoreError> {
        let now = self.clock.now();
        if self.repo.get(id)?.status.is_terminal() {
            return Ok(false);
        }
        self.repo.transition(id, reason.status(), now)?;
        let completed = self.repo.complete(id, SYSTEM_ACTOR, now)?;
        if completed {
            info!("session ended");
        }
        Ok(completed)
    }

    pub fn add_aggregate_ids(
        &self,
        id: &SessionId,
        ids: &[AggregateId],
    ) -> Result<(), StoreError> {
        self.repo.add_aggregate_ids(id, ids)
    }
}
