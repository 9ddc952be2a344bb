use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::ActivityId;
use crate::loadout::ItemProperties;

/// Denormalized summary of one match instance from activity history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySummary {
    pub instance_id: ActivityId,
    /// Match start.
    pub period: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    pub reference_id: i64,
    pub director_activity_hash: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_private: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsValuePair {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_value: Option<String>,
}

impl StatsValuePair {
    pub fn of(value: f64) -> Self {
        Self {
            value: Some(value),
            display_value: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UniqueStatValue {
    pub basic: StatsValuePair,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pga: Option<StatsValuePair>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weighted: Option<StatsValuePair>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kills: Option<StatsValuePair>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deaths: Option<StatsValuePair>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assists: Option<StatsValuePair>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kd: Option<StatsValuePair>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kda: Option<StatsValuePair>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standing: Option<StatsValuePair>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<StatsValuePair>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fireteam_id: Option<StatsValuePair>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_played: Option<StatsValuePair>,
}

/// Cosmetic metadata resolved from item definitions.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Display {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier_type_name: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeaponMetrics {
    /// Item definition hash of the weapon.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<BTreeMap<String, UniqueStatValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<ItemProperties>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<Display>,
}

/// One character's performance in one match.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstancePerformance {
    #[serde(default)]
    pub player_stats: PlayerStats,
    /// Keyed by weapon reference id.
    #[serde(default)]
    pub weapons: BTreeMap<String, WeaponMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<BTreeMap<String, UniqueStatValue>>,
}

impl InstancePerformance {
    /// Weapon reference ids that appear in this report.
    pub fn observed_weapons(&self) -> HashSet<i64> {
        self.weapons
            .values()
            .filter_map(|w| w.reference_id)
            .collect()
    }
}
