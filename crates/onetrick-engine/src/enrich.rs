use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::debug;

use onetrick_core::activity::InstancePerformance;
use onetrick_core::loadout::ItemProperties;
use onetrick_store::SnapshotRow;

use crate::providers::{DefinitionLookup, ItemDefinition};

/// Look up display metadata for each weapon hash. Missing definitions and
/// lookup failures are left out.
pub async fn resolve_definitions(
    lookup: &dyn DefinitionLookup,
    hashes: &HashSet<i64>,
) -> HashMap<i64, ItemDefinition> {
    let mut found = HashMap::with_capacity(hashes.len());
    for &hash in hashes {
        match lookup.item(hash).await {
            Ok(Some(definition)) => {
                found.insert(hash, definition);
            }
            Ok(None) => debug!(hash, "no item definition"),
            Err(e) => debug!(hash, error = %e, "item definition lookup failed"),
        }
    }
    found
}

/// Attach instanced item properties from the matched snapshot and display
/// metadata from `definitions` to each weapon metric.
///
/// Weapon metrics without a reference id are dropped and the rest are keyed
/// by reference id. Nothing else about the performance changes.
pub fn enrich_performance(
    snapshot: Option<&SnapshotRow>,
    performance: InstancePerformance,
    definitions: &HashMap<i64, ItemDefinition>,
) -> InstancePerformance {
    let properties: HashMap<i64, &ItemProperties> = snapshot
        .map(|s| {
            s.loadout
                .items()
                .filter_map(|item| item.properties.as_ref().map(|p| (item.item_hash, p)))
                .collect()
        })
        .unwrap_or_default();

    let weapons: BTreeMap<String, _> = performance
        .weapons
        .into_values()
        .filter_map(|mut metric| {
            let reference_id = metric.reference_id?;
            if let Some(props) = properties.get(&reference_id) {
                metric.properties = Some((*props).clone());
            }
            if let Some(definition) = definitions.get(&reference_id) {
                metric.display = Some(definition.display.clone());
            }
            Some((reference_id.to_string(), metric))
        })
        .collect();

    InstancePerformance {
        weapons,
        ..performance
    }
}
