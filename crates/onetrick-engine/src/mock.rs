//! Scripted provider doubles for deterministic tests without upstream calls.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use onetrick_core::activity::ActivitySummary;
use onetrick_core::ids::{ActivityId, CharacterId, UserId};

use crate::error::ProviderError;
use crate::naming::SnapshotNamer;
use crate::providers::{
    ActivityHistoryProvider, DefinitionLookup, ItemDefinition, LoadoutObservation, LoadoutProvider,
    Membership, MembershipResolver, PostGameReport, PostGameReportProvider,
};

/// Always returns the same name.
pub struct FixedNamer(String);

impl FixedNamer {
    pub fn new(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl SnapshotNamer for FixedNamer {
    fn name(&self) -> String {
        self.0.clone()
    }
}

#[derive(Default)]
pub struct MockMemberships {
    members: Mutex<HashMap<UserId, Membership>>,
    call_count: AtomicUsize,
}

impl MockMemberships {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, user_id: &str, membership: Membership) {
        self.members.lock().insert(UserId::from_raw(user_id), membership);
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MembershipResolver for MockMemberships {
    async fn membership(&self, user_id: &UserId) -> Result<Membership, ProviderError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.members
            .lock()
            .get(user_id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(format!("membership for {user_id}")))
    }
}

/// Per-character activity lists, stored newest first.
#[derive(Default)]
pub struct MockActivityHistory {
    activities: Mutex<HashMap<CharacterId, Vec<ActivitySummary>>>,
    failures: Mutex<HashMap<CharacterId, ProviderError>>,
    call_count: AtomicUsize,
}

impl MockActivityHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, character_id: &str, activities: Vec<ActivitySummary>) {
        self.activities.lock().insert(CharacterId::from_raw(character_id), activities);
    }

    /// Make every call for `character_id` fail with `error`.
    pub fn fail(&self, character_id: &str, error: ProviderError) {
        self.failures.lock().insert(CharacterId::from_raw(character_id), error);
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ActivityHistoryProvider for MockActivityHistory {
    async fn recent_activities(
        &self,
        _membership: &Membership,
        character_id: &CharacterId,
        count: u32,
    ) -> Result<Vec<ActivitySummary>, ProviderError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        if let Some(error) = self.failures.lock().get(character_id) {
            return Err(error.clone());
        }
        let mut list = self
            .activities
            .lock()
            .get(character_id)
            .cloned()
            .unwrap_or_default();
        list.truncate(count as usize);
        Ok(list)
    }
}

#[derive(Default)]
pub struct MockReports {
    reports: Mutex<HashMap<ActivityId, PostGameReport>>,
    call_count: AtomicUsize,
}

impl MockReports {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, report: PostGameReport) {
        self.reports.lock().insert(report.activity_id.clone(), report);
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl PostGameReportProvider for MockReports {
    async fn report(&self, activity_id: &ActivityId) -> Result<PostGameReport, ProviderError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.reports
            .lock()
            .get(activity_id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(format!("report for {activity_id}")))
    }
}

/// Equipped loadouts per character. Unknown characters are unavailable.
#[derive(Default)]
pub struct MockLoadouts {
    loadouts: Mutex<HashMap<CharacterId, LoadoutObservation>>,
    call_count: AtomicUsize,
}

impl MockLoadouts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, character_id: &str, observation: LoadoutObservation) {
        self.loadouts.lock().insert(CharacterId::from_raw(character_id), observation);
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl LoadoutProvider for MockLoadouts {
    async fn equipped(
        &self,
        _membership: &Membership,
        character_id: &CharacterId,
    ) -> Result<LoadoutObservation, ProviderError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.loadouts
            .lock()
            .get(character_id)
            .cloned()
            .ok_or_else(|| ProviderError::Unavailable(format!("no profile for {character_id}")))
    }
}

#[derive(Default)]
pub struct MockDefinitions {
    items: HashMap<i64, ItemDefinition>,
}

impl MockDefinitions {
    pub fn new(items: impl IntoIterator<Item = ItemDefinition>) -> Self {
        Self {
            items: items.into_iter().map(|d| (d.hash, d)).collect(),
        }
    }
}

#[async_trait]
impl DefinitionLookup for MockDefinitions {
    async fn item(&self, hash: i64) -> Result<Option<ItemDefinition>, ProviderError> {
        Ok(self.items.get(&hash).cloned())
    }
}
