//! Reference cache: the published mapping from raw references to batch definitions.
//!
//! A [`ReferenceCache`] is built completely before it is published and is
//! never mutated afterwards. [`CacheHandle`] owns the current snapshot and
//! swaps it atomically, so readers never observe a half-built cache.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::core::BatchDefinition;

/// Definitions mapped from the references of one asset, keyed by reference.
///
/// An empty definition list marks a reference that did not match the
/// asset's pattern.
pub type AssetReferences = BTreeMap<String, Vec<BatchDefinition>>;

/// Immutable snapshot: asset name to reference to definitions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceCache {
    assets: BTreeMap<String, AssetReferences>,
}

impl ReferenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the references of an asset, replacing any previous entry.
    pub fn insert_asset(&mut self, asset: impl Into<String>, references: AssetReferences) {
        self.assets.insert(asset.into(), references);
    }

    /// Asset names in the snapshot, in order.
    pub fn asset_names(&self) -> impl Iterator<Item = &str> {
        self.assets.keys().map(String::as_str)
    }

    pub fn asset_entries(&self, asset: &str) -> Option<&AssetReferences> {
        self.assets.get(asset)
    }

    /// Total number of references across all assets, matched or not.
    pub fn reference_count(&self) -> usize {
        self.assets.values().map(BTreeMap::len).sum()
    }

    /// References that matched no pattern, in asset then reference order.
    pub fn unmatched_references(&self) -> Vec<String> {
        self.assets
            .values()
            .flat_map(unmatched_in)
            .collect()
    }

    /// Unmatched references of one asset; empty if the asset is unknown.
    pub fn unmatched_for(&self, asset: &str) -> Vec<String> {
        self.assets
            .get(asset)
            .map(|entries| unmatched_in(entries).collect())
            .unwrap_or_default()
    }

    /// References of an asset that produced at least one definition.
    pub fn matched_for(&self, asset: &str) -> Vec<&str> {
        self.assets
            .get(asset)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|(_, defs)| !defs.is_empty())
                    .map(|(reference, _)| reference.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The first definition of every matched reference, in asset then
    /// reference order.
    pub fn first_definitions(&self) -> Vec<BatchDefinition> {
        self.assets
            .values()
            .flat_map(|entries| entries.values())
            .filter_map(|defs| defs.first().cloned())
            .collect()
    }

    /// Returns `true` if `reference` of `asset` maps to `definition`.
    pub fn reference_maps_to(&self, asset: &str, reference: &str, definition: &BatchDefinition) -> bool {
        self.assets
            .get(asset)
            .and_then(|entries| entries.get(reference))
            .is_some_and(|defs| defs.contains(definition))
    }

    /// Finds the reference of `asset` whose definitions include `definition`.
    pub fn find_reference(&self, asset: &str, definition: &BatchDefinition) -> Option<&str> {
        self.assets.get(asset).and_then(|entries| {
            entries
                .iter()
                .find(|(_, defs)| defs.contains(definition))
                .map(|(reference, _)| reference.as_str())
        })
    }
}

fn unmatched_in(entries: &AssetReferences) -> impl Iterator<Item = String> + '_ {
    entries
        .iter()
        .filter(|(_, defs)| defs.is_empty())
        .map(|(reference, _)| reference.clone())
}

/// Owner of the current cache snapshot.
///
/// Readers clone the `Arc` and release the lock immediately; building a new
/// snapshot happens without holding the lock.
#[derive(Debug, Default)]
pub struct CacheHandle {
    current: RwLock<Option<Arc<ReferenceCache>>>,
}

impl CacheHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current snapshot, or `None` before the first publish.
    pub async fn snapshot(&self) -> Option<Arc<ReferenceCache>> {
        self.current.read().await.clone()
    }

    /// Replaces the current snapshot.
    pub async fn publish(&self, cache: ReferenceCache) -> Arc<ReferenceCache> {
        let cache = Arc::new(cache);
        *self.current.write().await = Some(Arc::clone(&cache));
        debug!(references = cache.reference_count(), "Published reference cache");
        cache
    }

    /// Publishes `cache` only if no snapshot exists yet, and returns the
    /// snapshot in force afterwards.
    pub async fn publish_if_empty(&self, cache: ReferenceCache) -> Arc<ReferenceCache> {
        let mut current = self.current.write().await;
        match current.as_ref() {
            Some(existing) => {
                debug!("Discarding reference cache built concurrently with another refresh");
                Arc::clone(existing)
            }
            None => {
                let cache = Arc::new(cache);
                *current = Some(Arc::clone(&cache));
                cache
            }
        }
    }

    /// Drops the current snapshot.
    pub async fn invalidate(&self) {
        *self.current.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PartitionIdentity;

    fn def(asset: &str, id: &str) -> BatchDefinition {
        BatchDefinition::new("env", "conn", asset, PartitionIdentity::new().with("id", id))
    }

    fn sample() -> ReferenceCache {
        let mut cache = ReferenceCache::new();
        cache.insert_asset(
            "B",
            BTreeMap::from([
                ("B-2.csv".to_string(), vec![def("B", "2")]),
                ("zz.txt".to_string(), vec![]),
            ]),
        );
        cache.insert_asset(
            "A",
            BTreeMap::from([
                ("A-1.csv".to_string(), vec![def("A", "1")]),
                ("README".to_string(), vec![]),
                ("A-0.csv".to_string(), vec![def("A", "0")]),
            ]),
        );
        cache
    }

    #[test]
    fn test_counts_and_order() {
        let cache = sample();
        assert_eq!(cache.reference_count(), 5);
        assert_eq!(cache.unmatched_references(), vec!["README", "zz.txt"]);
        assert_eq!(cache.unmatched_for("B"), vec!["zz.txt"]);
        assert!(cache.unmatched_for("missing").is_empty());
        assert_eq!(cache.matched_for("A"), vec!["A-0.csv", "A-1.csv"]);
        assert_eq!(
            cache.first_definitions(),
            vec![def("A", "0"), def("A", "1"), def("B", "2")]
        );
    }

    #[test]
    fn test_reference_lookup() {
        let cache = sample();
        assert!(cache.reference_maps_to("A", "A-1.csv", &def("A", "1")));
        assert!(!cache.reference_maps_to("A", "A-0.csv", &def("A", "1")));
        assert_eq!(cache.find_reference("B", &def("B", "2")), Some("B-2.csv"));
        assert_eq!(cache.find_reference("B", &def("B", "3")), None);
    }

    #[tokio::test]
    async fn test_handle_lifecycle() {
        let handle = CacheHandle::new();
        assert!(handle.snapshot().await.is_none());

        let first = handle.publish_if_empty(sample()).await;
        let second = handle.publish_if_empty(ReferenceCache::new()).await;
        assert!(Arc::ptr_eq(&first, &second));

        let replaced = handle.publish(ReferenceCache::new()).await;
        assert_eq!(replaced.reference_count(), 0);
        assert_eq!(handle.snapshot().await.map(|c| c.reference_count()), Some(0));

        handle.invalidate().await;
        assert!(handle.snapshot().await.is_none());
    }
}
