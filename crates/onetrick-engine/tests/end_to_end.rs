//! Full poll cycles against in-memory SQLite and scripted providers.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tracing_subscriber::layer::SubscriberExt;

use onetrick_core::activity::{ActivitySummary, Display, InstancePerformance, WeaponMetrics};
use onetrick_core::clock::{Clock, FixedClock};
use onetrick_core::ids::{ActivityId, CharacterId, MembershipId, UserId};
use onetrick_core::link::ConfidenceLevel;
use onetrick_core::loadout::{
    ItemProperties, ItemSnapshot, ENERGY_BUCKET, KINETIC_BUCKET, POWER_BUCKET,
};
use onetrick_engine::mock::{
    FixedNamer, MockActivityHistory, MockDefinitions, MockLoadouts, MockMemberships, MockReports,
};
use onetrick_engine::providers::{
    ItemDefinition, LoadoutObservation, Membership, PostGameReport, ReportEntry,
};
use onetrick_engine::{Engine, EngineError, Providers};
use onetrick_settings::EngineSettings;
use onetrick_store::{Database, SessionRow, SessionStatus};
use onetrick_telemetry::{LogQuery, SqliteLogLayer, SqliteLogSink};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 18, 0, 0).unwrap()
}

struct Harness {
    engine: Engine,
    clock: Arc<FixedClock>,
    memberships: Arc<MockMemberships>,
    activities: Arc<MockActivityHistory>,
    reports: Arc<MockReports>,
    loadouts: Arc<MockLoadouts>,
}

impl Harness {
    fn new() -> Self {
        let clock = Arc::new(FixedClock::new(t0()));
        let memberships = Arc::new(MockMemberships::new());
        let activities = Arc::new(MockActivityHistory::new());
        let reports = Arc::new(MockReports::new());
        let loadouts = Arc::new(MockLoadouts::new());
        let definitions = Arc::new(MockDefinitions::new([ItemDefinition {
            hash: 999,
            display: Display {
                name: "Borrowed Rifle".into(),
                ..Default::default()
            },
        }]));

        let providers = Providers {
            memberships: memberships.clone(),
            activities: activities.clone(),
            reports: reports.clone(),
            loadouts: loadouts.clone(),
            definitions,
        };
        let engine = Engine::with_parts(
            Database::in_memory().unwrap(),
            EngineSettings::default(),
            providers,
            clock.clone(),
            Arc::new(FixedNamer::new("Rush Swift Bot Lobby")),
        );
        Self {
            engine,
            clock,
            memberships,
            activities,
            reports,
            loadouts,
        }
    }

    /// Register a user with one character and open a session starting at `started_at`.
    fn session(&self, user: &str, character: &str, started_at: DateTime<Utc>) -> SessionRow {
        self.memberships.set(
            user,
            Membership {
                membership_id: MembershipId::from_raw(format!("m-{user}")),
                membership_type: 3,
            },
        );
        self.engine
            .tracker()
            .repo()
            .create(
                &UserId::from_raw(user),
                &CharacterId::from_raw(character),
                started_at,
                self.clock.now(),
            )
            .unwrap()
    }

    fn reload(&self, session: &SessionRow) -> SessionRow {
        self.engine.tracker().get(&session.id).unwrap()
    }
}

fn item(bucket: u32, hash: i64, name: &str) -> ItemSnapshot {
    ItemSnapshot {
        bucket_hash: bucket,
        item_hash: hash,
        instance_id: format!("inst-{hash}"),
        name: Some(name.into()),
        properties: Some(ItemProperties {
            name: Some(name.into()),
            ..Default::default()
        }),
    }
}

fn observation(minted_at: DateTime<Utc>) -> LoadoutObservation {
    LoadoutObservation {
        items: vec![
            item(KINETIC_BUCKET, 100, "Ace of Spades"),
            item(ENERGY_BUCKET, 200, "Le Monarque"),
            item(POWER_BUCKET, 300, "Cataclysmic"),
        ],
        stats: None,
        minted_at: Some(minted_at),
    }
}

fn activity(id: &str, period: DateTime<Utc>) -> ActivitySummary {
    ActivitySummary {
        instance_id: ActivityId::from_raw(id),
        period,
        mode: Some("control".into()),
        reference_id: 2_000,
        director_activity_hash: 2_001,
        is_private: Some(false),
        name: Some("Control".into()),
        description: None,
        location: Some("Javelin-4".into()),
        image_url: None,
    }
}

fn performance(weapons: &[i64]) -> InstancePerformance {
    InstancePerformance {
        weapons: weapons
            .iter()
            .enumerate()
            .map(|(i, hash)| {
                (
                    i.to_string(),
                    WeaponMetrics {
                        reference_id: Some(*hash),
                        ..Default::default()
                    },
                )
            })
            .collect::<BTreeMap<_, _>>(),
        ..Default::default()
    }
}

fn report(id: &str, entries: &[(&str, Vec<i64>)]) -> PostGameReport {
    PostGameReport {
        activity_id: ActivityId::from_raw(id),
        entries: entries
            .iter()
            .map(|(character, weapons)| ReportEntry {
                character_id: Some(CharacterId::from_raw(*character)),
                performance: Some(performance(weapons)),
            })
            .collect(),
    }
}

#[tokio::test]
async fn match_links_to_recent_snapshot_with_high_confidence() {
    let h = Harness::new();
    let session = h.session("u1", "C1", t0());
    h.loadouts.set("C1", observation(t0() + Duration::hours(1)));
    h.activities
        .set("C1", vec![activity("A1", t0() + Duration::minutes(65))]);
    h.reports.set(report("A1", &[("C1", vec![100, 200, 999])]));
    h.clock.set(t0() + Duration::minutes(80));

    let cycle = h.engine.run_cycle().await.unwrap();
    assert_eq!(cycle.sessions_seen, 1);
    assert_eq!(cycle.processed, 1);
    assert_eq!(cycle.skipped, 0);
    assert_eq!(cycle.aggregate_ids.len(), 1);

    let aggregate = h
        .engine
        .merger()
        .find_by_activity(&ActivityId::from_raw("A1"))
        .unwrap()
        .unwrap();
    let c1 = CharacterId::from_raw("C1");
    let link = aggregate.link_for(&c1).unwrap();
    assert_eq!(link.confidence_level, ConfidenceLevel::High);
    assert_eq!(link.session_id.as_ref(), Some(&session.id));

    let snapshot_id = link.snapshot_id.clone().unwrap();
    let snapshot = h.engine.snapshots().get(&snapshot_id).unwrap();
    assert_eq!(snapshot.name, "Rush Swift Bot Lobby");
    assert!(aggregate.snapshot_ids.contains(&snapshot_id));
    assert_eq!(aggregate.activity.location.as_deref(), Some("Javelin-4"));

    let perf = &aggregate.performance[&c1];
    assert_eq!(
        perf.weapons["100"].properties.as_ref().and_then(|p| p.name.as_deref()),
        Some("Ace of Spades")
    );
    assert_eq!(
        perf.weapons["999"].display.as_ref().map(|d| d.name.as_str()),
        Some("Borrowed Rifle")
    );
    assert!(perf.weapons["999"].properties.is_none());

    let session = h.reload(&session);
    assert_eq!(session.status, SessionStatus::Active);
    assert_eq!(session.last_seen_activity_id, Some(ActivityId::from_raw("A1")));
    assert_eq!(session.aggregate_ids, vec![aggregate.id]);
}

#[tokio::test]
async fn characters_in_the_same_match_converge() {
    let h = Harness::new();
    let s1 = h.session("u1", "C1", t0());
    let s2 = h.session("u2", "C2", t0());
    h.loadouts.set("C1", observation(t0() + Duration::hours(1)));
    h.loadouts.set(
        "C2",
        LoadoutObservation {
            items: vec![item(KINETIC_BUCKET, 400, "Hawkmoon")],
            stats: None,
            minted_at: Some(t0() + Duration::minutes(50)),
        },
    );
    let a1 = activity("A1", t0() + Duration::minutes(65));
    h.activities.set("C1", vec![a1.clone()]);
    h.activities.set("C2", vec![a1]);
    h.reports
        .set(report("A1", &[("C1", vec![100, 200, 300]), ("C2", vec![400, 999])]));
    h.clock.set(t0() + Duration::minutes(80));

    let cycle = h.engine.run_cycle().await.unwrap();
    assert_eq!(cycle.processed, 2);

    let aggregate = h
        .engine
        .merger()
        .find_by_activity(&ActivityId::from_raw("A1"))
        .unwrap()
        .unwrap();
    let c1 = CharacterId::from_raw("C1");
    let c2 = CharacterId::from_raw("C2");
    assert_eq!(aggregate.character_ids.len(), 2);
    assert_eq!(aggregate.link_for(&c1).unwrap().confidence_level, ConfidenceLevel::High);
    assert_eq!(aggregate.link_for(&c2).unwrap().confidence_level, ConfidenceLevel::Medium);
    assert!(aggregate.session_ids.contains(&s1.id));
    assert!(aggregate.session_ids.contains(&s2.id));
    assert_eq!(aggregate.snapshot_ids.len(), 2);
    assert!(cycle.aggregate_ids.iter().all(|id| *id == aggregate.id));

    assert_eq!(h.reload(&s1).aggregate_ids, vec![aggregate.id.clone()]);
    assert_eq!(h.reload(&s2).aggregate_ids, vec![aggregate.id]);
}

#[tokio::test]
async fn linked_activities_are_not_reprocessed() {
    let h = Harness::new();
    let session = h.session("u1", "C1", t0());
    h.loadouts.set("C1", observation(t0() + Duration::hours(1)));
    let a1 = activity("A1", t0() + Duration::minutes(65));
    h.activities.set("C1", vec![a1.clone()]);
    h.reports.set(report("A1", &[("C1", vec![100, 200, 300])]));
    h.clock.set(t0() + Duration::minutes(80));
    h.engine.run_cycle().await.unwrap();
    assert_eq!(h.reports.call_count(), 1);

    // Same latest activity: nothing new, and not stale yet.
    let idle = h.engine.run_cycle().await.unwrap();
    assert_eq!(idle.idle, 1);
    assert_eq!(h.reports.call_count(), 1);

    // A newer match arrives; A1 is still in the page but already linked.
    h.activities.set(
        "C1",
        vec![activity("A2", t0() + Duration::minutes(130)), a1],
    );
    h.reports.set(report("A2", &[("C1", vec![100])]));
    h.clock.set(t0() + Duration::minutes(150));
    let cycle = h.engine.run_cycle().await.unwrap();
    assert_eq!(cycle.processed, 1);
    assert_eq!(cycle.aggregate_ids.len(), 1);
    assert_eq!(h.reports.call_count(), 2);

    let a2 = h
        .engine
        .merger()
        .find_by_activity(&ActivityId::from_raw("A2"))
        .unwrap()
        .unwrap();
    let link = a2.link_for(&CharacterId::from_raw("C1")).unwrap();
    assert_eq!(link.confidence_level, ConfidenceLevel::Medium);

    let session = h.reload(&session);
    assert_eq!(session.last_seen_activity_id, Some(ActivityId::from_raw("A2")));
    assert_eq!(session.aggregate_ids.len(), 2);
}

#[tokio::test]
async fn stale_session_is_completed() {
    let h = Harness::new();
    let session = h.session("u1", "C1", t0() - Duration::hours(12));
    h.engine
        .tracker()
        .repo()
        .record_last_activity(&session.id, &ActivityId::from_raw("A0"), t0())
        .unwrap();
    h.loadouts.set("C1", observation(t0()));
    h.activities
        .set("C1", vec![activity("A0", t0() - Duration::hours(11))]);

    let cycle = h.engine.run_cycle().await.unwrap();
    assert_eq!(cycle.ended, 1);
    assert_eq!(h.reports.call_count(), 0);

    let session = h.reload(&session);
    assert_eq!(session.status, SessionStatus::Complete);
    assert_eq!(session.completed_by.as_deref(), Some("system"));
    assert_eq!(session.completed_at, Some(t0()));

    let next = h.engine.run_cycle().await.unwrap();
    assert_eq!(next.sessions_seen, 0);
}

#[tokio::test]
async fn inactive_session_ends_after_cutoff() {
    let h = Harness::new();
    let session = h.session("u1", "C1", t0());
    h.loadouts.set("C1", observation(t0()));
    h.activities
        .set("C1", vec![activity("A0", t0() - Duration::hours(1))]);

    h.clock.set(t0() + Duration::hours(9));
    let early = h.engine.run_cycle().await.unwrap();
    assert_eq!(early.idle, 1);
    assert_eq!(h.reload(&session).status, SessionStatus::Pending);

    h.clock.set(t0() + Duration::hours(10));
    let late = h.engine.run_cycle().await.unwrap();
    assert_eq!(late.ended, 1);
    assert_eq!(h.reload(&session).status, SessionStatus::Complete);
}

#[tokio::test]
async fn missing_report_entry_leaves_no_aggregate() {
    let h = Harness::new();
    let session = h.session("u1", "C1", t0());
    h.loadouts.set("C1", observation(t0()));
    h.activities
        .set("C1", vec![activity("A1", t0() + Duration::minutes(30))]);
    h.reports.set(report("A1", &[("someone-else", vec![100])]));
    h.clock.set(t0() + Duration::hours(1));

    let cycle = h.engine.run_cycle().await.unwrap();
    assert_eq!(cycle.processed, 1);
    assert!(cycle.aggregate_ids.is_empty());
    assert!(h
        .engine
        .merger()
        .find_by_activity(&ActivityId::from_raw("A1"))
        .unwrap()
        .is_none());

    // The activity is still marked seen, so it is not fetched again.
    let reloaded = h.reload(&session);
    assert_eq!(reloaded.last_seen_activity_id, Some(ActivityId::from_raw("A1")));
    assert_eq!(reloaded.status, SessionStatus::Active);
    assert!(reloaded.aggregate_ids.is_empty());

    let next = h.engine.run_cycle().await.unwrap();
    assert_eq!(next.idle, 1);
    assert_eq!(h.reports.call_count(), 1);
}

#[tokio::test]
async fn unavailable_report_still_records_last_activity() {
    let h = Harness::new();
    let session = h.session("u1", "C1", t0());
    h.loadouts.set("C1", observation(t0()));
    h.activities
        .set("C1", vec![activity("A1", t0() + Duration::minutes(30))]);
    h.clock.set(t0() + Duration::hours(1));

    let cycle = h.engine.run_cycle().await.unwrap();
    assert_eq!(cycle.processed, 1);
    assert_eq!(cycle.skipped, 0);
    assert!(cycle.aggregate_ids.is_empty());
    assert_eq!(h.reports.call_count(), 1);
    assert_eq!(
        h.reload(&session).last_seen_activity_id,
        Some(ActivityId::from_raw("A1"))
    );

    let next = h.engine.run_cycle().await.unwrap();
    assert_eq!(next.idle, 1);
    assert_eq!(next.processed, 0);
    assert_eq!(h.reports.call_count(), 1);
}

#[tokio::test]
async fn skipped_session_warning_is_persisted() {
    let sink = Arc::new(SqliteLogSink::in_memory().unwrap());
    let subscriber = tracing_subscriber::registry().with(SqliteLogLayer::new(sink.clone()));
    let _default = tracing::subscriber::set_default(subscriber);

    let h = Harness::new();
    let session = h
        .engine
        .tracker()
        .repo()
        .create(
            &UserId::from_raw("ghost"),
            &CharacterId::from_raw("C9"),
            t0(),
            t0(),
        )
        .unwrap();

    let cycle = h.engine.run_cycle().await.unwrap();
    assert_eq!(cycle.skipped, 1);
    assert_eq!(h.loadouts.call_count(), 0);

    let rows = sink
        .query(&LogQuery {
            session_id: Some(session.id.to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].level, "WARN");
    assert_eq!(rows[0].character_id.as_deref(), Some("C9"));
    assert_eq!(rows[0].message, "skipping session this cycle");
}

#[test]
fn open_rejects_invalid_settings() {
    let providers = Providers {
        memberships: Arc::new(MockMemberships::new()),
        activities: Arc::new(MockActivityHistory::new()),
        reports: Arc::new(MockReports::new()),
        loadouts: Arc::new(MockLoadouts::new()),
        definitions: Arc::new(MockDefinitions::default()),
    };

    let mut settings = EngineSettings::default();
    settings.polling.activity_page_size = 0;
    assert!(matches!(
        Engine::open(&settings, providers.clone()),
        Err(EngineError::Settings(_))
    ));

    let dir = tempfile::tempdir().unwrap();
    let mut settings = EngineSettings::default();
    settings.store.db_path = dir.path().join("onetrick.db").display().to_string();
    let engine = Engine::open(&settings, providers).unwrap();
    assert!(engine.database().path().ends_with("onetrick.db"));
}
