//! Equipped-loadout model and its content hash.
//!
//! A [`Loadout`] is keyed by inventory bucket hash, so two observations of the
//! same equipped items always serialize identically no matter what order the
//! profile provider listed them in.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const KINETIC_BUCKET: u32 = 1_498_876_634;
pub const ENERGY_BUCKET: u32 = 2_465_295_065;
pub const POWER_BUCKET: u32 = 953_998_645;
pub const HELMET_BUCKET: u32 = 3_448_274_439;
pub const GAUNTLETS_BUCKET: u32 = 3_551_918_588;
pub const CHEST_BUCKET: u32 = 14_239_492;
pub const LEG_BUCKET: u32 = 20_886_954;
pub const CLASS_ITEM_BUCKET: u32 = 1_585_787_867;
pub const SUBCLASS_BUCKET: u32 = 3_284_755_031;

/// Buckets a snapshot keeps; anything else the provider returns is ignored.
pub const TRACKED_BUCKETS: [u32; 9] = [
    HELMET_BUCKET,
    GAUNTLETS_BUCKET,
    CHEST_BUCKET,
    LEG_BUCKET,
    CLASS_ITEM_BUCKET,
    KINETIC_BUCKET,
    ENERGY_BUCKET,
    POWER_BUCKET,
    SUBCLASS_BUCKET,
];

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Perk {
    pub hash: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Socket {
    pub plug_hash: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_visible: Option<bool>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemStat {
    pub hash: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub value: i64,
}

/// Instanced item details as captured at observation time.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier_type_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_type_display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damage_type: Option<String>,
    #[serde(default)]
    pub perks: Vec<Perk>,
    #[serde(default)]
    pub sockets: Vec<Socket>,
    #[serde(default)]
    pub stats: BTreeMap<String, ItemStat>,
}

/// One equipped item in one bucket.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSnapshot {
    pub bucket_hash: u32,
    pub item_hash: i64,
    pub instance_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<ItemProperties>,
}

/// Character-level stat summary (mobility, resilience, ...).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassStat {
    pub value: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Loadout {
    items: BTreeMap<u32, ItemSnapshot>,
}

/// The subset of an item that identifies it for hashing.
#[derive(Serialize)]
struct CanonicalItem<'a> {
    bucket: u32,
    item: i64,
    instance: &'a str,
    plugs: Vec<i64>,
}

impl Loadout {
    /// Build from provider items, keeping only tracked buckets.
    /// A later item for an already-seen bucket replaces the earlier one.
    pub fn from_items(items: impl IntoIterator<Item = ItemSnapshot>) -> Self {
        let items = items
            .into_iter()
            .filter(|item| TRACKED_BUCKETS.contains(&item.bucket_hash))
            .map(|item| (item.bucket_hash, item))
            .collect();
        Self { items }
    }

    pub fn get(&self, bucket: u32) -> Option<&ItemSnapshot> {
        self.items.get(&bucket)
    }

    pub fn items(&self) -> impl Iterator<Item = &ItemSnapshot> {
        self.items.values()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Weapon item hashes used to pre-filter snapshot matches.
    pub fn fingerprint(&self) -> WeaponFingerprint {
        WeaponFingerprint {
            kinetic: self.get(KINETIC_BUCKET).map(|i| i.item_hash),
            energy: self.get(ENERGY_BUCKET).map(|i| i.item_hash),
            power: self.get(POWER_BUCKET).map(|i| i.item_hash),
        }
    }

    /// SHA-256 over the canonical item set, lowercase hex.
    ///
    /// Display fields (names, icons, stat values) are excluded; only which
    /// item instance sits in which bucket and its enabled plugs count.
    pub fn content_hash(&self) -> String {
        let canonical: Vec<CanonicalItem<'_>> = self
            .items
            .values()
            .map(|item| {
                let mut plugs: Vec<i64> = item
                    .properties
                    .iter()
                    .flat_map(|p| p.sockets.iter())
                    .filter(|s| s.is_enabled.unwrap_or(true))
                    .map(|s| s.plug_hash)
                    .collect();
                plugs.sort_unstable();
                CanonicalItem {
                    bucket: item.bucket_hash,
                    item: item.item_hash,
                    instance: &item.instance_id,
                    plugs,
                }
            })
            .collect();

        // Serializing plain integers, strings and vectors cannot fail.
        let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
        format!("{:x}", Sha256::digest(&bytes))
    }
}

/// Kinetic/energy/power item hashes at observation time. A slot with
/// nothing equipped is `None` and never scores.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeaponFingerprint {
    pub kinetic: Option<i64>,
    pub energy: Option<i64>,
    pub power: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(bucket: u32, hash: i64, instance: &str) -> ItemSnapshot {
        ItemSnapshot {
            bucket_hash: bucket,
            item_hash: hash,
            instance_id: instance.to_string(),
            name: None,
            properties: None,
        }
    }

    fn weapons() -> Vec<ItemSnapshot> {
        vec![
            item(KINETIC_BUCKET, 100, "i-1"),
            item(ENERGY_BUCKET, 200, "i-2"),
            item(POWER_BUCKET, 300, "i-3"),
        ]
    }

    #[test]
    fn hash_ignores_item_order() {
        let a = Loadout::from_items(weapons());
        let mut reversed = weapons();
        reversed.reverse();
        let b = Loadout::from_items(reversed);
        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn hash_ignores_display_fields() {
        let a = Loadout::from_items(weapons());
        let mut decorated = weapons();
        decorated[0].name = Some("Ace of Spades".into());
        decorated[1].properties = Some(ItemProperties {
            name: Some("Riskrunner".into()),
            icon: Some("/icon.png".into()),
            stats: BTreeMap::from([(
                "range".into(),
                ItemStat { hash: 1, name: None, value: 70 },
            )]),
            ..Default::default()
        });
        let b = Loadout::from_items(decorated);
        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn hash_changes_with_any_item() {
        let a = Loadout::from_items(weapons());
        let mut swapped = weapons();
        swapped[2].item_hash = 301;
        let b = Loadout::from_items(swapped);
        assert_ne!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn hash_changes_with_enabled_plugs() {
        let a = Loadout::from_items(weapons());
        let mut modded = weapons();
        modded[0].properties = Some(ItemProperties {
            sockets: vec![Socket { plug_hash: 42, is_enabled: Some(true), ..Default::default() }],
            ..Default::default()
        });
        let b = Loadout::from_items(modded);
        assert_ne!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn hash_is_sha256_hex() {
        let hash = Loadout::from_items(weapons()).content_hash();
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn untracked_buckets_are_dropped() {
        let mut items = weapons();
        items.push(item(215_593_132, 9, "ghost"));
        let loadout = Loadout::from_items(items);
        assert_eq!(loadout.len(), 3);
    }

    #[test]
    fn fingerprint_reads_weapon_buckets() {
        let loadout = Loadout::from_items(vec![
            item(KINETIC_BUCKET, 100, "i-1"),
            item(HELMET_BUCKET, 7, "i-9"),
        ]);
        assert_eq!(
            loadout.fingerprint(),
            WeaponFingerprint { kinetic: Some(100), energy: None, power: None }
        );
    }

    #[test]
    fn serde_roundtrip_keeps_bucket_keys() {
        let loadout = Loadout::from_items(weapons());
        let json = serde_json::to_value(&loadout).unwrap();
        assert!(json.get(KINETIC_BUCKET.to_string()).is_some());
        let back: Loadout = serde_json::from_value(json).unwrap();
        assert_eq!(back, loadout);
    }
}
