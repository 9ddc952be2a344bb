//! The poll cycle: walk every open session, save the current loadout, pick
//! up newly finished matches, attribute each to a snapshot and merge it into
//! the match aggregate.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, info_span, warn, Instrument};

use onetrick_core::activity::ActivitySummary;
use onetrick_core::clock::{Clock, SystemClock};
use onetrick_core::ids::{ActivityId, AggregateId};
use onetrick_settings::{loader, resolve_path, EngineSettings};
use onetrick_store::{AggregateRow, Database, SessionRow, SessionStatus};

use crate::enrich::{enrich_performance, resolve_definitions};
use crate::error::{EngineError, ProviderError};
use crate::matcher::{BestFitMatcher, MatchWindow};
use crate::merger::{lookup_link, AggregateMerger};
use crate::naming::{PvpNamer, SnapshotNamer};
use crate::providers::{
    ActivityHistoryProvider, DefinitionLookup, LoadoutProvider, MembershipResolver,
    PostGameReportProvider,
};
use crate::snapshot_store::SnapshotStore;
use crate::tracker::{EndReason, SessionTracker};

/// Upstream systems the engine reads from.
#[derive(Clone)]
pub struct Providers {
    pub memberships: Arc<dyn MembershipResolver>,
    pub activities: Arc<dyn ActivityHistoryProvider>,
    pub reports: Arc<dyn PostGameReportProvider>,
    pub loadouts: Arc<dyn LoadoutProvider>,
    pub definitions: Arc<dyn DefinitionLookup>,
}

/// Tally of one pass over the open sessions.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CycleReport {
    pub sessions_seen: usize,
    /// Sessions that had new activities to attribute.
    pub processed: usize,
    /// Sessions abandoned for this cycle after an upstream or store failure.
    pub skipped: usize,
    pub ended: usize,
    /// Sessions with nothing new that are not yet due to end.
    pub idle: usize,
    pub aggregate_ids: Vec<AggregateId>,
}

enum SessionOutcome {
    Processed(Vec<AggregateId>),
    Ended,
    Idle,
}

pub struct Engine {
    db: Database,
    settings: EngineSettings,
    providers: Providers,
    snapshots: Arc<SnapshotStore>,
    tracker: SessionTracker,
    matcher: BestFitMatcher,
    merger: AggregateMerger,
}

impl Engine {
    /// Validate settings and open the configured database.
    pub fn open(settings: &EngineSettings, providers: Providers) -> Result<Self, EngineError> {
        loader::validate(settings)?;
        let path = resolve_path(&settings.store.db_path);
        let db = Database::open(&path).map_err(|e| {
            EngineError::Startup(format!("cannot open database {}: {e}", path.display()))
        })?;
        Ok(Self::new(db, settings.clone(), providers))
    }

    pub fn new(db: Database, settings: EngineSettings, providers: Providers) -> Self {
        Self::with_parts(
            db,
            settings,
            providers,
            Arc::new(SystemClock),
            Arc::new(PvpNamer),
        )
    }

    pub fn with_parts(
        db: Database,
        settings: EngineSettings,
        providers: Providers,
        clock: Arc<dyn Clock>,
        namer: Arc<dyn SnapshotNamer>,
    ) -> Self {
        let snapshots = Arc::new(SnapshotStore::new(db.clone(), namer, clock.clone()));
        let tracker = SessionTracker::new(db.clone(), &settings.sessions, clock.clone());
        let matcher = BestFitMatcher::new(
            snapshots.clone(),
            MatchWindow::from_settings(&settings.matching),
            clock.clone(),
        );
        let merger = AggregateMerger::new(db.clone(), clock);
        Self {
            db,
            settings,
            providers,
            snapshots,
            tracker,
            matcher,
            merger,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    pub fn tracker(&self) -> &SessionTracker {
        &self.tracker
    }

    pub fn matcher(&self) -> &BestFitMatcher {
        &self.matcher
    }

    pub fn merger(&self) -> &AggregateMerger {
        &self.merger
    }

    /// One pass over every open session, in start order.
    ///
    /// A failure inside a session skips that session for this cycle; only a
    /// failure to list the sessions aborts the pass.
    pub async fn run_cycle(&self) -> Result<CycleReport, EngineError> {
        let sessions = self.tracker.list_open()?;
        let mut report = CycleReport {
            sessions_seen: sessions.len(),
            ..Default::default()
        };

        for session in &sessions {
            let span = info_span!(
                "session",
                session_id = %session.id,
                character_id = %session.character_id
            );
            match self.process_session(session).instrument(span.clone()).await {
                Ok(SessionOutcome::Processed(ids)) => {
                    report.processed += 1;
                    report.aggregate_ids.extend(ids);
                }
                Ok(SessionOutcome::Ended) => report.ended += 1,
                Ok(SessionOutcome::Idle) => report.idle += 1,
                Err(e) => {
                    span.in_scope(|| warn!(error = %e, "skipping session this cycle"));
                    report.skipped += 1;
                }
            }
        }

        info!(
            sessions = report.sessions_seen,
            processed = report.processed,
            skipped = report.skipped,
            ended = report.ended,
            "poll cycle finished"
        );
        Ok(report)
    }

    async fn process_session(&self, session: &SessionRow) -> Result<SessionOutcome, EngineError> {
        // Ended on an earlier cycle but never completed.
        match session.status {
            SessionStatus::StaleEnded => return self.end(session, EndReason::Stale),
            SessionStatus::InactiveEnded => return self.end(session, EndReason::Inactive),
            _ => {}
        }

        let membership = self
            .providers
            .memberships
            .membership(&session.user_id)
            .await?;

        self.snapshots
            .capture(
                &session.user_id,
                &session.character_id,
                &membership,
                self.providers.loadouts.as_ref(),
            )
            .await?;

        let activities = self
            .providers
            .activities
            .recent_activities(
                &membership,
                &session.character_id,
                self.settings.polling.activity_page_size,
            )
            .await?;
        let Some(latest) = activities.first() else {
            return Err(ProviderError::NotFound("no recent activities".into()).into());
        };

        if session.last_seen_activity_id.as_ref() == Some(&latest.instance_id) {
            if self.tracker.is_stale(session, latest) {
                return self.end(session, EndReason::Stale);
            }
            debug!("no new activity");
            return Ok(SessionOutcome::Idle);
        }

        let fresh: Vec<&ActivitySummary> = activities
            .iter()
            .filter(|a| a.period > session.started_at)
            .collect();
        if fresh.is_empty() {
            if self.tracker.is_inactive(session) {
                return self.end(session, EndReason::Inactive);
            }
            debug!("no activity since session start");
            return Ok(SessionOutcome::Idle);
        }

        let ids: Vec<ActivityId> = fresh.iter().map(|a| a.instance_id.clone()).collect();
        let existing = self.merger.find_by_activities(&ids)?;

        if let Err(e) = self
            .tracker
            .record_last_activity(&session.id, &latest.instance_id)
        {
            warn!(activity_id = %latest.instance_id, error = %e, "failed to record last activity");
        }

        let mut touched = Vec::with_capacity(fresh.len());
        for activity in fresh {
            let span = info_span!("activity", activity_id = %activity.instance_id);
            match self
                .attribute(session, activity, &existing)
                .instrument(span.clone())
                .await
            {
                Ok(Some(id)) => touched.push(id),
                Ok(None) => {}
                Err(e) => span.in_scope(|| {
                    warn!(
                        activity_id = %activity.instance_id,
                        character_id = %session.character_id,
                        error = %e,
                        "failed to attribute activity"
                    )
                }),
            }
        }

        if !touched.is_empty() {
            self.tracker.add_aggregate_ids(&session.id, &touched)?;
        }
        Ok(SessionOutcome::Processed(touched))
    }

    /// Match one activity to a snapshot and merge it. `Ok(None)` when there
    /// is nothing to write.
    async fn attribute(
        &self,
        session: &SessionRow,
        activity: &ActivitySummary,
        existing: &HashMap<ActivityId, AggregateRow>,
    ) -> Result<Option<AggregateId>, EngineError> {
        let prior = lookup_link(existing.get(&activity.instance_id), &session.character_id);
        if prior.is_some_and(|link| link.session_id.is_some()) {
            debug!("already linked");
            return Ok(None);
        }

        let report = match self.providers.reports.report(&activity.instance_id).await {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "post-game report unavailable");
                return Ok(None);
            }
        };
        let Some(performance) = report.performance_for(&session.character_id).cloned() else {
            warn!("character missing from post-game report");
            return Ok(None);
        };

        let observed = performance.observed_weapons();
        let outcome = self.matcher.find_best_fit(
            &session.user_id,
            &session.character_id,
            activity.period,
            &observed,
        )?;

        let definitions =
            resolve_definitions(self.providers.definitions.as_ref(), &observed).await;
        let performance = enrich_performance(outcome.snapshot.as_ref(), performance, &definitions);
        let link = outcome.link.with_session(session.id.clone());
        let confidence = link.confidence_level;

        let aggregate = self.merger.upsert(
            activity,
            &session.character_id,
            Some(&session.id),
            link,
            Some(performance),
        )?;
        info!(aggregate_id = %aggregate.id, confidence = %confidence, "activity attributed");
        Ok(Some(aggregate.id))
    }

    fn end(&self, session: &SessionRow, reason: EndReason) -> Result<SessionOutcome, EngineError> {
        self.tracker.end(&session.id, reason)?;
        Ok(SessionOutcome::Ended)
    }
}
