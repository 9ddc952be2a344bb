//! Best-fit attribution of a finished match to a prior loadout snapshot.
//!
//! Loadouts and match results are polled independently, so the snapshot a
//! match was played with has to be inferred. Candidates are history entries
//! inside a window around the match start, scored by how many of their
//! weapons show up in the match report.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, instrument, warn};

use onetrick_core::clock::Clock;
use onetrick_core::ids::{CharacterId, UserId};
use onetrick_core::link::{ConfidenceLevel, SnapshotLink};
use onetrick_core::loadout::WeaponFingerprint;
use onetrick_settings::MatchingSettings;
use onetrick_store::{HistoryRow, SnapshotRow, StoreError};

use crate::snapshot_store::SnapshotStore;

const KINETIC_WEIGHT: u8 = 2;
const ENERGY_WEIGHT: u8 = 2;
const POWER_WEIGHT: u8 = 1;

/// `[start - lookback, start + slack]`, both ends inclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MatchWindow {
    pub lookback: Duration,
    pub slack: Duration,
}

impl MatchWindow {
    pub fn from_settings(settings: &MatchingSettings) -> Self {
        Self {
            lookback: Duration::hours(i64::from(settings.lookback_hours)),
            slack: Duration::minutes(i64::from(settings.slack_minutes)),
        }
    }

    pub fn bounds(&self, match_start: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (match_start - self.lookback, match_start + self.slack)
    }
}

impl Default for MatchWindow {
    fn default() -> Self {
        Self::from_settings(&MatchingSettings::default())
    }
}

/// A link (no session attached yet) and the snapshot it points at, when one
/// was selected and could be loaded.
#[derive(Clone, Debug)]
pub struct MatchOutcome {
    pub link: SnapshotLink,
    pub snapshot: Option<SnapshotRow>,
}

/// Weapon overlap score, 0..=5. Empty slots never score.
pub fn score(fingerprint: &WeaponFingerprint, observed: &HashSet<i64>) -> u8 {
    let hit = |slot: Option<i64>, weight: u8| match slot {
        Some(hash) if observed.contains(&hash) => weight,
        _ => 0,
    };
    hit(fingerprint.kinetic, KINETIC_WEIGHT)
        + hit(fingerprint.energy, ENERGY_WEIGHT)
        + hit(fingerprint.power, POWER_WEIGHT)
}

/// Highest-scoring candidate with a score of at least 1. Ties go to the most
/// recent timestamp, then the greatest history id.
pub fn select_best<'a>(
    candidates: &'a [HistoryRow],
    observed: &HashSet<i64>,
) -> Option<(&'a HistoryRow, u8)> {
    candidates
        .iter()
        .map(|row| (row, score(&row.fingerprint, observed)))
        .filter(|(_, s)| *s >= 1)
        .max_by(|(a, sa), (b, sb)| {
            sa.cmp(sb)
                .then_with(|| a.timestamp.cmp(&b.timestamp))
                .then_with(|| a.id.cmp(&b.id))
        })
}

pub struct BestFitMatcher {
    snapshots: Arc<SnapshotStore>,
    window: MatchWindow,
    clock: Arc<dyn Clock>,
}

impl BestFitMatcher {
    pub fn new(snapshots: Arc<SnapshotStore>, window: MatchWindow, clock: Arc<dyn Clock>) -> Self {
        Self {
            snapshots,
            window,
            clock,
        }
    }

    pub fn window(&self) -> MatchWindow {
        self.window
    }

    /// Pick the snapshot `character_id` most plausibly used in a match that
    /// started at `match_start` with `observed` weapons.
    ///
    /// Only a failed history query is an error. A selected snapshot that
    /// cannot be loaded still yields the link, without the snapshot.
    #[instrument(skip(self, observed), fields(character_id = %character_id))]
    pub fn find_best_fit(
        &self,
        user_id: &UserId,
        character_id: &CharacterId,
        match_start: DateTime<Utc>,
        observed: &HashSet<i64>,
    ) -> Result<MatchOutcome, StoreError> {
        let (from, to) = self.window.bounds(match_start);
        let candidates = self
            .snapshots
            .query_history(user_id, character_id, from, to)?;
        let now = self.clock.now();

        if candidates.is_empty() {
            debug!("no history in window");
            return Ok(MatchOutcome {
                link: SnapshotLink::system(
                    character_id.clone(),
                    ConfidenceLevel::NotFound,
                    None,
                    now,
                ),
                snapshot: None,
            });
        }

        let Some((best, best_score)) = select_best(&candidates, observed) else {
            debug!(candidates = candidates.len(), "no candidate shares a weapon");
            return Ok(MatchOutcome {
                link: SnapshotLink::system(
                    character_id.clone(),
                    ConfidenceLevel::NoMatch,
                    None,
                    now,
                ),
                snapshot: None,
            });
        };

        let level = ConfidenceLevel::from_score(best_score).unwrap_or(ConfidenceLevel::Low);
        let snapshot = match self.snapshots.get(&best.snapshot_id) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(snapshot_id = %best.snapshot_id, error = %e, "matched snapshot could not be loaded");
                None
            }
        };

        debug!(
            snapshot_id = %best.snapshot_id,
            score = best_score,
            confidence = %level,
            "best fit selected"
        );
        Ok(MatchOutcome {
            link: SnapshotLink::system(
                character_id.clone(),
                level,
                Some(best.snapshot_id.clone()),
                now,
            ),
            snapshot,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use onetrick_core::clock::FixedClock;
    use onetrick_core::ids::{HistoryId, SnapshotId};
    use onetrick_core::loadout::{Loadout, ItemSnapshot, ENERGY_BUCKET, KINETIC_BUCKET, POWER_BUCKET};
    use onetrick_store::Database;

    use crate::mock::FixedNamer;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 18, 0, 0).unwrap()
    }

    fn observed(ids: &[i64]) -> HashSet<i64> {
        ids.iter().copied().collect()
    }

    fn fp(k: i64, e: i64, p: i64) -> WeaponFingerprint {
        WeaponFingerprint {
            kinetic: Some(k),
            energy: Some(e),
            power: Some(p),
        }
    }

    fn row(id: &str, ts: DateTime<Utc>, fingerprint: WeaponFingerprint) -> HistoryRow {
        HistoryRow {
            id: HistoryId::from_raw(id),
            snapshot_id: SnapshotId::from_raw(format!("snap_{id}")),
            user_id: UserId::from_raw("u1"),
            character_id: CharacterId::from_raw("c1"),
            timestamp: ts,
            fingerprint,
        }
    }

    #[test]
    fn score_weights() {
        let f = fp(100, 200, 300);
        assert_eq!(score(&f, &observed(&[100, 200, 300])), 5);
        assert_eq!(score(&f, &observed(&[100, 200, 999])), 4);
        assert_eq!(score(&f, &observed(&[200, 300])), 3);
        assert_eq!(score(&f, &observed(&[300])), 1);
        assert_eq!(score(&f, &observed(&[])), 0);
    }

    #[test]
    fn empty_slot_never_scores() {
        let f = WeaponFingerprint {
            kinetic: None,
            energy: Some(200),
            power: None,
        };
        assert_eq!(score(&f, &observed(&[0, 200])), 2);
    }

    #[test]
    fn full_match_outranks_power_only() {
        let rows = vec![
            row("hist_b", t0(), fp(1, 2, 300)),
            row("hist_a", t0() - Duration::hours(1), fp(100, 200, 300)),
        ];
        let (best, s) = select_best(&rows, &observed(&[100, 200, 300])).unwrap();
        assert_eq!(best.id.as_str(), "hist_a");
        assert_eq!(s, 5);
    }

    #[test]
    fn tie_prefers_most_recent_then_greatest_id() {
        let rows = vec![
            row("hist_1", t0() - Duration::hours(2), fp(100, 1, 1)),
            row("hist_2", t0(), fp(100, 2, 2)),
            row("hist_3", t0(), fp(100, 3, 3)),
        ];
        let (best, _) = select_best(&rows, &observed(&[100])).unwrap();
        assert_eq!(best.id.as_str(), "hist_3");

        let reversed: Vec<_> = rows.into_iter().rev().collect();
        let (best, _) = select_best(&reversed, &observed(&[100])).unwrap();
        assert_eq!(best.id.as_str(), "hist_3");
    }

    #[test]
    fn zero_scores_are_ineligible() {
        let rows = vec![row("hist_1", t0(), fp(1, 2, 3))];
        assert!(select_best(&rows, &observed(&[9])).is_none());
    }

    #[test]
    fn window_from_settings() {
        let window = MatchWindow::default();
        let (from, to) = window.bounds(t0());
        assert_eq!(from, t0() - Duration::hours(12));
        assert_eq!(to, t0() + Duration::minutes(15));
    }

    struct Fixture {
        store: Arc<SnapshotStore>,
        matcher: BestFitMatcher,
        user: UserId,
        character: CharacterId,
    }

    fn fixture() -> Fixture {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(t0()));
        let store = Arc::new(SnapshotStore::new(
            Database::in_memory().unwrap(),
            Arc::new(FixedNamer::new("n")),
            clock.clone(),
        ));
        Fixture {
            matcher: BestFitMatcher::new(store.clone(), MatchWindow::default(), clock),
            store,
            user: UserId::from_raw("u1"),
            character: CharacterId::from_raw("c1"),
        }
    }

    fn loadout(k: i64, e: i64, p: i64) -> Loadout {
        let item = |bucket, hash: i64| ItemSnapshot {
            bucket_hash: bucket,
            item_hash: hash,
            instance_id: format!("i{hash}"),
            name: None,
            properties: None,
        };
        Loadout::from_items(vec![
            item(KINETIC_BUCKET, k),
            item(ENERGY_BUCKET, e),
            item(POWER_BUCKET, p),
        ])
    }

    impl Fixture {
        fn observe(&self, l: Loadout, at: DateTime<Utc>) -> SnapshotId {
            self.store
                .put_at(&self.user, &self.character, l, None, at)
                .unwrap()
                .snapshot_id
        }

        fn fit(&self, start: DateTime<Utc>, weapons: &[i64]) -> MatchOutcome {
            self.matcher
                .find_best_fit(&self.user, &self.character, start, &observed(weapons))
                .unwrap()
        }
    }

    #[test]
    fn confidence_levels() {
        let f = fixture();
        let snap = f.observe(loadout(100, 200, 300), t0());

        let high = f.fit(t0(), &[100, 200, 300]);
        assert_eq!(high.link.confidence_level, ConfidenceLevel::High);
        assert_eq!(high.link.snapshot_id, Some(snap.clone()));
        assert_eq!(high.snapshot.unwrap().id, snap);

        assert_eq!(f.fit(t0(), &[200, 300]).link.confidence_level, ConfidenceLevel::Medium);
        assert_eq!(f.fit(t0(), &[300]).link.confidence_level, ConfidenceLevel::Low);

        let none = f.fit(t0(), &[7]);
        assert_eq!(none.link.confidence_level, ConfidenceLevel::NoMatch);
        assert!(none.link.snapshot_id.is_none());
        assert!(none.snapshot.is_none());
    }

    #[test]
    fn nothing_in_window_is_not_found() {
        let f = fixture();
        f.observe(loadout(100, 200, 300), t0() - Duration::days(2));
        let out = f.fit(t0(), &[100]);
        assert_eq!(out.link.confidence_level, ConfidenceLevel::NotFound);
        assert!(out.link.snapshot_id.is_none());
        assert!(out.link.session_id.is_none());
    }

    #[test]
    fn window_boundaries_are_inclusive() {
        let start = t0();
        let lower = fixture();
        lower.observe(loadout(1, 2, 3), start - Duration::hours(12));
        assert!(lower.fit(start, &[1]).link.confidence_level.is_linked());

        let upper = fixture();
        upper.observe(loadout(1, 2, 3), start + Duration::minutes(15));
        assert!(upper.fit(start, &[1]).link.confidence_level.is_linked());

        let outside = fixture();
        outside.observe(
            loadout(1, 2, 3),
            start - Duration::hours(12) - Duration::seconds(1),
        );
        assert_eq!(
            outside.fit(start, &[1]).link.confidence_level,
            ConfidenceLevel::NotFound
        );
    }
}
