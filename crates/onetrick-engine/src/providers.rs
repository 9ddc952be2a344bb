//! Contracts for the upstream systems the engine polls.
//!
//! Implementations live with the driver; [`crate::mock`] has scripted
//! doubles for tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use onetrick_core::activity::{ActivitySummary, Display, InstancePerformance};
use onetrick_core::ids::{ActivityId, CharacterId, MembershipId, UserId};
use onetrick_core::loadout::{ClassStat, ItemSnapshot};

use crate::error::ProviderError;

/// A user's primary platform membership.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub membership_id: MembershipId,
    pub membership_type: i64,
}

/// Currently equipped items as reported by the profile endpoint.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadoutObservation {
    pub items: Vec<ItemSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<BTreeMap<String, ClassStat>>,
    /// When the upstream response was minted, if it said.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minted_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_id: Option<CharacterId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance: Option<InstancePerformance>,
}

/// Post-match report for one activity instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostGameReport {
    pub activity_id: ActivityId,
    #[serde(default)]
    pub entries: Vec<ReportEntry>,
}

impl PostGameReport {
    /// The first entry for `character_id` that carries performance data.
    pub fn performance_for(&self, character_id: &CharacterId) -> Option<&InstancePerformance> {
        self.entries
            .iter()
            .filter(|e| e.character_id.as_ref() == Some(character_id))
            .find_map(|e| e.performance.as_ref())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDefinition {
    pub hash: i64,
    pub display: Display,
}

#[async_trait]
pub trait MembershipResolver: Send + Sync {
    async fn membership(&self, user_id: &UserId) -> Result<Membership, ProviderError>;
}

#[async_trait]
pub trait ActivityHistoryProvider: Send + Sync {
    /// Up to `count` most recent activities, newest first.
    async fn recent_activities(
        &self,
        membership: &Membership,
        character_id: &CharacterId,
        count: u32,
    ) -> Result<Vec<ActivitySummary>, ProviderError>;
}

#[async_trait]
pub trait PostGameReportProvider: Send + Sync {
    async fn report(&self, activity_id: &ActivityId) -> Result<PostGameReport, ProviderError>;
}

#[async_trait]
pub trait LoadoutProvider: Send + Sync {
    async fn equipped(
        &self,
        membership: &Membership,
        character_id: &CharacterId,
    ) -> Result<LoadoutObservation, ProviderError>;
}

/// Cosmetic lookup only. `Ok(None)` and errors both just leave display
/// fields empty.
#[async_trait]
pub trait DefinitionLookup: Send + Sync {
    async fn item(&self, hash: i64) -> Result<Option<ItemDefinition>, ProviderError>;
}
