//! The per-session, category-partitioned hash store.
//!
//! A `CacheStore` is constructed for one analysis session and shared by
//! every request running against that session. All state sits behind a
//! single coarse mutex. Hashing happens before the lock is taken and entry
//! data is handed out as `Arc` clones, so numeric work on cached arrays
//! never runs while the lock is held.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use codex_common::{ContentHash, FeatureArray, WarningCode, WarningSink};
use codex_config::CacheConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock, Timestamp};
use crate::entry::{CacheEntry, Category, Field};
use crate::error::CacheError;
use crate::eviction::{EvictionManager, EvictionReport};
use crate::probe::{MemoryProbe, ProcessMemoryProbe};

/// Replacement codes for non-finite values found in a set of features.
///
/// Each code lies well above the largest finite value so that, once
/// substituted, it cannot be confused with real data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SentinelValues {
    /// Code standing in for NaN.
    pub nan: Option<f64>,
    /// Code standing in for positive infinity.
    pub inf: Option<f64>,
    /// Code standing in for negative infinity.
    pub ninf: Option<f64>,
}

/// Number of entries held in each category.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheCounts {
    /// Feature entries.
    pub features: usize,
    /// Subset entries.
    pub subsets: usize,
    /// Downsample entries.
    pub downsamples: usize,
    /// Label entries.
    pub labels: usize,
}

impl CacheCounts {
    /// Entries across all categories.
    pub fn total(&self) -> usize {
        self.features + self.subsets + self.downsamples + self.labels
    }
}

#[derive(Default)]
pub(crate) struct Partitions {
    pub(crate) lists: [Vec<CacheEntry>; 4],
    pub(crate) next_seq: u64,
    pub(crate) sentinels: SentinelValues,
}

impl Partitions {
    fn list(&self, category: Category) -> &Vec<CacheEntry> {
        &self.lists[category.index()]
    }

    fn list_mut(&mut self, category: Category) -> &mut Vec<CacheEntry> {
        &mut self.lists[category.index()]
    }

    fn find(&self, field: Field, value: &str, category: Category) -> Option<&CacheEntry> {
        self.list(category).iter().find(|e| e.matches(field, value))
    }
}

/// The content-addressable store for one session.
pub struct CacheStore {
    partitions: Mutex<Partitions>,
    clock: Arc<dyn Clock>,
    probe: Arc<dyn MemoryProbe>,
    eviction: EvictionManager,
    warnings: WarningSink,
}

impl CacheStore {
    /// Creates an empty store with injected time and memory sources.
    pub fn new(
        clock: Arc<dyn Clock>,
        probe: Arc<dyn MemoryProbe>,
        eviction: EvictionManager,
    ) -> Self {
        Self {
            partitions: Mutex::new(Partitions::default()),
            clock,
            probe,
            eviction,
            warnings: WarningSink::new(),
        }
    }

    /// Creates a store using wall-clock time, the process memory probe, and
    /// the eviction bounds from configuration.
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(
            Arc::new(SystemClock),
            Arc::new(ProcessMemoryProbe::new()),
            EvictionManager::from_config(config),
        )
    }

    pub(crate) fn from_parts(
        partitions: Partitions,
        clock: Arc<dyn Clock>,
        probe: Arc<dyn MemoryProbe>,
        eviction: EvictionManager,
    ) -> Self {
        Self {
            partitions: Mutex::new(partitions),
            clock,
            probe,
            eviction,
            warnings: WarningSink::new(),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Partitions> {
        self.partitions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Warnings recorded by operations on this store.
    pub fn warnings(&self) -> &WarningSink {
        &self.warnings
    }

    /// The memory probe consulted by [`maintain`](Self::maintain).
    pub fn probe(&self) -> &dyn MemoryProbe {
        self.probe.as_ref()
    }

    /// The eviction bounds applied by [`maintain`](Self::maintain).
    pub fn eviction(&self) -> &EvictionManager {
        &self.eviction
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub(crate) fn probe_handle(&self) -> &Arc<dyn MemoryProbe> {
        &self.probe
    }

    /// Stores an array, or returns the existing entry with the same identity.
    ///
    /// Identity is the content hash for features and subsets, the name for
    /// labels, and the name plus sample count for downsamples (whose name is
    /// the hash of the array they were reduced from). An existing entry is
    /// returned unchanged.
    pub fn put(&self, name: &str, data: FeatureArray, category: Category) -> CacheEntry {
        self.insert(name, data, category, false)
    }

    /// Like [`put`](Self::put), marking the entry as derived in-session.
    pub fn put_virtual(&self, name: &str, data: FeatureArray, category: Category) -> CacheEntry {
        self.insert(name, data, category, true)
    }

    fn insert(
        &self,
        name: &str,
        data: FeatureArray,
        category: Category,
        virtual_feature: bool,
    ) -> CacheEntry {
        let hash = ContentHash::of_array(&data);
        let samples = data.rows();
        let data = Arc::new(data);

        let mut parts = self.lock();
        let existing = parts.list(category).iter().find(|e| match category {
            Category::Label => e.name == name,
            Category::Downsample => e.name == name && e.samples == samples,
            Category::Feature | Category::Subset => e.hash == hash,
        });
        if let Some(entry) = existing {
            debug!(%category, name, hash = %entry.hash, "entry already cached");
            return entry.clone();
        }

        let entry = CacheEntry {
            category,
            name: name.to_string(),
            hash,
            data,
            samples,
            created_at: self.clock.now(),
            seq: parts.next_seq,
            virtual_feature,
        };
        parts.next_seq += 1;
        parts.list_mut(category).push(entry.clone());
        debug!(%category, name, %hash, samples, "cached entry");
        entry
    }

    /// Finds the first entry in `category` whose `field` equals `value`.
    pub fn get(&self, field: Field, value: &str, category: Category) -> Option<CacheEntry> {
        self.lock().find(field, value, category).cloned()
    }

    /// Finds the entry in `category` with the given content hash.
    pub fn get_by_hash(&self, hash: &ContentHash, category: Category) -> Option<CacheEntry> {
        self.lock()
            .list(category)
            .iter()
            .find(|e| e.hash == *hash)
            .cloned()
    }

    /// Resolves several hashes under one lock acquisition.
    pub(crate) fn resolve_hashes(
        &self,
        hashes: &[ContentHash],
        category: Category,
    ) -> Vec<Option<CacheEntry>> {
        let parts = self.lock();
        hashes
            .iter()
            .map(|h| parts.list(category).iter().find(|e| e.hash == *h).cloned())
            .collect()
    }

    /// Removes the first entry in `category` named `name`.
    ///
    /// Returns whether anything was removed.
    pub fn delete(&self, name: &str, category: Category) -> bool {
        let mut parts = self.lock();
        let list = parts.list_mut(category);
        match list.iter().position(|e| e.name == name) {
            Some(pos) => {
                let removed = list.remove(pos);
                debug!(%category, name, hash = %removed.hash, "deleted entry");
                true
            }
            None => false,
        }
    }

    /// All entries in `category`, in insertion order.
    pub fn list(&self, category: Category) -> Vec<CacheEntry> {
        self.lock().list(category).clone()
    }

    /// Renames an entry, moving it to the end of its category.
    ///
    /// Only [`Field::Name`] can change; hash and data always travel with the
    /// entry. Renaming a label onto a name already in use is rejected.
    pub fn update(
        &self,
        field: Field,
        old: &str,
        new: &str,
        category: Category,
    ) -> Result<CacheEntry, CacheError> {
        if field != Field::Name {
            return Err(CacheError::invalid(
                "only the name of a cached entry can be updated",
            ));
        }

        let mut parts = self.lock();
        if category.keyed_by_name()
            && old != new
            && parts.find(Field::Name, new, category).is_some()
        {
            return Err(CacheError::invalid(format!("label '{new}' already exists")));
        }

        let list = parts.list_mut(category);
        let pos = list
            .iter()
            .position(|e| e.matches(field, old))
            .ok_or_else(|| CacheError::not_found(category, old))?;
        let mut entry = list.remove(pos);
        entry.name = new.to_string();
        list.push(entry.clone());
        debug!(%category, old, new, "renamed entry");
        Ok(entry)
    }

    /// Drops every entry in `category`.
    pub fn reset(&self, category: Category) {
        let mut parts = self.lock();
        let dropped = parts.list_mut(category).len();
        parts.list_mut(category).clear();
        debug!(%category, dropped, "reset category");
    }

    /// Drops every entry in every category.
    pub fn clear(&self) {
        let mut parts = self.lock();
        for list in parts.lists.iter_mut() {
            list.clear();
        }
        parts.sentinels = SentinelValues::default();
    }

    /// Entry counts per category, also logged at info level.
    pub fn counts(&self) -> CacheCounts {
        let parts = self.lock();
        let counts = CacheCounts {
            features: parts.list(Category::Feature).len(),
            subsets: parts.list(Category::Subset).len(),
            downsamples: parts.list(Category::Downsample).len(),
            labels: parts.list(Category::Label).len(),
        };
        info!(
            features = counts.features,
            subsets = counts.subsets,
            downsamples = counts.downsamples,
            labels = counts.labels,
            "cache counts"
        );
        counts
    }

    /// Total number of entries.
    pub fn len(&self) -> usize {
        self.lock().lists.iter().map(Vec::len).sum()
    }

    /// Returns `true` if no category holds an entry.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes of array data held across all categories.
    pub fn total_bytes(&self) -> u64 {
        self.lock()
            .lists
            .iter()
            .flatten()
            .map(|e| e.byte_size() as u64)
            .sum()
    }

    /// Maps feature names to their content hashes.
    ///
    /// Unknown names are skipped with a warning.
    pub fn names_to_hashes<S: AsRef<str>>(&self, names: &[S]) -> Vec<ContentHash> {
        let mut hashes = Vec::with_capacity(names.len());
        let mut missing = Vec::new();
        {
            let parts = self.lock();
            for name in names {
                match parts.find(Field::Name, name.as_ref(), Category::Feature) {
                    Some(entry) => hashes.push(entry.hash),
                    None => missing.push(name.as_ref().to_string()),
                }
            }
        }
        for name in missing {
            self.warnings.warn(
                WarningCode::UnknownFeature,
                format!("could not add '{name}' to feature list"),
            );
        }
        hashes
    }

    /// Chooses replacement codes for NaN and infinities in the named features.
    ///
    /// With `max` the largest finite value across the features, the codes are
    /// `round(10 * max) + 3` for NaN, `+ 2` for infinity and `+ 1` for negative
    /// infinity. Codes that are found are remembered on the store.
    pub fn sentinel_values<S: AsRef<str>>(&self, names: &[S]) -> SentinelValues {
        let arrays: Vec<Arc<FeatureArray>> = {
            let parts = self.lock();
            names
                .iter()
                .filter_map(|n| parts.find(Field::Name, n.as_ref(), Category::Feature))
                .map(|e| Arc::clone(&e.data))
                .collect()
        };

        let mut max = f64::NEG_INFINITY;
        let (mut nan, mut inf, mut ninf) = (false, false, false);
        for value in arrays.iter().flat_map(|a| a.iter()) {
            if value.is_nan() {
                nan = true;
            } else if value == f64::INFINITY {
                inf = true;
            } else if value == f64::NEG_INFINITY {
                ninf = true;
            } else if value > max {
                max = value;
            }
        }
        if !max.is_finite() {
            max = 0.0;
        }

        let base = (max * 10.0).round();
        let found = SentinelValues {
            nan: nan.then_some(base + 3.0),
            inf: inf.then_some(base + 2.0),
            ninf: ninf.then_some(base + 1.0),
        };

        let mut parts = self.lock();
        if found.nan.is_some() {
            parts.sentinels.nan = found.nan;
        }
        if found.inf.is_some() {
            parts.sentinels.inf = found.inf;
        }
        if found.ninf.is_some() {
            parts.sentinels.ninf = found.ninf;
        }
        found
    }

    /// The sentinel codes remembered by [`sentinel_values`](Self::sentinel_values).
    pub fn sentinels(&self) -> SentinelValues {
        self.lock().sentinels
    }

    /// Removes and returns the oldest entry across all categories.
    pub(crate) fn evict_oldest(&self) -> Option<CacheEntry> {
        let mut parts = self.lock();
        let mut oldest: Option<((Timestamp, u64), Category, usize)> = None;
        for cat in Category::ALL {
            for (pos, entry) in parts.list(cat).iter().enumerate() {
                let key = entry.age_key();
                if oldest.map_or(true, |(best, _, _)| key < best) {
                    oldest = Some((key, cat, pos));
                }
            }
        }
        let (_, cat, pos) = oldest?;
        Some(parts.list_mut(cat).remove(pos))
    }

    /// Evicts oldest entries while the memory probe reports pressure.
    pub fn maintain(&self) -> EvictionReport {
        self.eviction.run(self)
    }
}

impl fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = self.lock();
        f.debug_struct("CacheStore")
            .field("features", &parts.list(Category::Feature).len())
            .field("subsets", &parts.list(Category::Subset).len())
            .field("downsamples", &parts.list(Category::Downsample).len())
            .field("labels", &parts.list(Category::Label).len())
            .field("eviction", &self.eviction)
            .field("warnings", &self.warnings.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::probe::FootprintProbe;
    use codex_common::ByteSize;

    fn make_store() -> (Arc<ManualClock>, CacheStore) {
        let clock = Arc::new(ManualClock::new(1));
        let store = CacheStore::new(
            clock.clone(),
            Arc::new(FootprintProbe),
            EvictionManager::new(ByteSize::new(1 << 20), ByteSize::new(0)),
        );
        (clock, store)
    }

    fn values(v: &[f64]) -> FeatureArray {
        FeatureArray::from_vec(v.to_vec())
    }

    fn x1() -> FeatureArray {
        FeatureArray::from_ints(&[2, 3, 1, 0])
    }

    #[test]
    fn put_computes_hash_and_samples() {
        let (_clock, store) = make_store();
        let entry = store.put("x1", x1(), Category::Feature);
        assert_eq!(
            entry.hash.to_string(),
            "bb99f457e6632e9944b801e6c53ad7353e08ce00"
        );
        assert_eq!(entry.samples, 4);
        assert_eq!(entry.category, Category::Feature);
        assert!(!entry.virtual_feature);
    }

    #[test]
    fn put_same_content_is_idempotent() {
        let (_clock, store) = make_store();
        let a = store.put("x1", x1(), Category::Feature);
        let b = store.put("x2", x1(), Category::Feature);
        assert_eq!(a.hash, b.hash);
        assert_eq!(b.name, "x1");
        assert_eq!(store.list(Category::Feature).len(), 1);
    }

    #[test]
    fn same_content_in_other_category_is_separate() {
        let (_clock, store) = make_store();
        store.put("x1", x1(), Category::Feature);
        store.put("s1", x1(), Category::Subset);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn labels_are_keyed_by_name() {
        let (_clock, store) = make_store();
        store.put("kmeans", x1(), Category::Label);
        store.put("dbscan", x1(), Category::Label);
        let again = store.put("kmeans", values(&[9.0]), Category::Label);
        assert_eq!(store.list(Category::Label).len(), 2);
        assert_eq!(again.samples, 4);
    }

    #[test]
    fn downsamples_are_keyed_by_source_and_size() {
        let (_clock, store) = make_store();
        let reduced = values(&[0.0, 3.0, 6.0]);
        store.put("source-a", reduced.clone(), Category::Downsample);
        store.put("source-b", reduced.clone(), Category::Downsample);
        store.put("source-a", reduced, Category::Downsample);
        store.put("source-a", values(&[0.0, 5.0]), Category::Downsample);

        let keys: Vec<_> = store
            .list(Category::Downsample)
            .into_iter()
            .map(|e| (e.name, e.samples))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("source-a".to_string(), 3),
                ("source-b".to_string(), 3),
                ("source-a".to_string(), 2),
            ]
        );
    }

    #[test]
    fn debug_lists_category_sizes() {
        let (_clock, store) = make_store();
        store.put("x1", x1(), Category::Feature);
        store.put("l1", x1(), Category::Label);
        let shown = format!("{store:?}");
        assert!(shown.starts_with("CacheStore {"));
        assert!(shown.contains("features: 1"));
        assert!(shown.contains("labels: 1"));
        assert!(shown.contains("subsets: 0"));
    }

    #[test]
    fn put_virtual_marks_entry() {
        let (_clock, store) = make_store();
        let e = store.put_virtual("ratio", x1(), Category::Feature);
        assert!(e.virtual_feature);
    }

    #[test]
    fn created_at_comes_from_clock() {
        let (clock, store) = make_store();
        let a = store.put("a", values(&[1.0]), Category::Feature);
        clock.advance(10);
        let b = store.put("b", values(&[2.0]), Category::Feature);
        assert_eq!(a.created_at, Timestamp(1));
        assert_eq!(b.created_at, Timestamp(11));
        assert!(b.seq > a.seq);
    }

    #[test]
    fn get_by_name_and_hash() {
        let (_clock, store) = make_store();
        let e = store.put("x1", x1(), Category::Feature);
        let by_name = store.get(Field::Name, "x1", Category::Feature).unwrap();
        let by_hash = store
            .get(Field::Hash, &e.hash.to_string(), Category::Feature)
            .unwrap();
        assert_eq!(by_name.hash, by_hash.hash);
        assert!(store.get(Field::Name, "x1", Category::Subset).is_none());
        assert!(store.get(Field::Name, "nope", Category::Feature).is_none());
        assert!(store.get_by_hash(&e.hash, Category::Feature).is_some());
    }

    #[test]
    fn delete_removes_first_match() {
        let (_clock, store) = make_store();
        store.put("dup", values(&[1.0]), Category::Feature);
        store.put("dup", values(&[2.0]), Category::Feature);
        assert!(store.delete("dup", Category::Feature));
        let left = store.list(Category::Feature);
        assert_eq!(left.len(), 1);
        assert_eq!(*left[0].data, values(&[2.0]));
        assert!(store.delete("dup", Category::Feature));
        assert!(!store.delete("dup", Category::Feature));
    }

    #[test]
    fn update_renames_and_relocates() {
        let (_clock, store) = make_store();
        let original = store.put("x1", x1(), Category::Subset);
        store.put("other", values(&[5.0]), Category::Subset);

        let renamed = store
            .update(Field::Name, "x1", "x2", Category::Subset)
            .unwrap();
        assert_eq!(renamed.name, "x2");
        assert_eq!(renamed.hash, original.hash);
        assert_eq!(renamed.created_at, original.created_at);
        assert!(Arc::ptr_eq(&renamed.data, &original.data));

        let names: Vec<_> = store
            .list(Category::Subset)
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["other", "x2"]);
    }

    #[test]
    fn update_by_hash_field_rejected() {
        let (_clock, store) = make_store();
        store.put("x1", x1(), Category::Feature);
        let err = store
            .update(Field::Hash, "x1", "abc", Category::Feature)
            .unwrap_err();
        assert!(matches!(err, CacheError::InvalidParameter { .. }));
    }

    #[test]
    fn update_missing_is_not_found() {
        let (_clock, store) = make_store();
        let err = store
            .update(Field::Name, "ghost", "x", Category::Feature)
            .unwrap_err();
        assert!(matches!(err, CacheError::NotFound { .. }));
    }

    #[test]
    fn update_label_onto_existing_name_rejected() {
        let (_clock, store) = make_store();
        store.put("a", x1(), Category::Label);
        store.put("b", x1(), Category::Label);
        let err = store
            .update(Field::Name, "a", "b", Category::Label)
            .unwrap_err();
        assert!(matches!(err, CacheError::InvalidParameter { .. }));
        assert_eq!(store.list(Category::Label).len(), 2);
    }

    #[test]
    fn reset_and_counts() {
        let (_clock, store) = make_store();
        store.put("x1", x1(), Category::Feature);
        store.put("s1", x1(), Category::Subset);
        store.put("d1", x1(), Category::Downsample);
        store.put("l1", x1(), Category::Label);
        assert_eq!(store.counts().total(), 4);

        store.reset(Category::Subset);
        let counts = store.counts();
        assert_eq!(counts.subsets, 0);
        assert_eq!(counts.features, 1);
        assert_eq!(counts.total(), 3);

        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn total_bytes_sums_entries() {
        let (_clock, store) = make_store();
        store.put("a", values(&[0.0; 4]), Category::Feature);
        store.put("b", values(&[1.0; 2]), Category::Subset);
        assert_eq!(store.total_bytes(), 48);
    }

    #[test]
    fn names_to_hashes_skips_unknown() {
        let (_clock, store) = make_store();
        let a = store.put("a", values(&[1.0]), Category::Feature);
        let b = store.put("b", values(&[2.0]), Category::Feature);
        let hashes = store.names_to_hashes(&["b", "missing", "a"]);
        assert_eq!(hashes, vec![b.hash, a.hash]);
        assert_eq!(store.warnings().count(WarningCode::UnknownFeature), 1);
    }

    #[test]
    fn sentinel_values_sit_above_max() {
        let (_clock, store) = make_store();
        store.put("a", values(&[1.0, f64::NAN, 4.5]), Category::Feature);
        store.put("b", values(&[f64::NEG_INFINITY, 2.0]), Category::Feature);
        let s = store.sentinel_values(&["a", "b"]);
        assert_eq!(s.nan, Some(48.0));
        assert_eq!(s.inf, None);
        assert_eq!(s.ninf, Some(46.0));
        assert_eq!(store.sentinels(), s);
    }

    #[test]
    fn sentinel_values_none_for_finite_data() {
        let (_clock, store) = make_store();
        store.put("a", x1(), Category::Feature);
        assert_eq!(store.sentinel_values(&["a"]), SentinelValues::default());
    }

    #[test]
    fn evict_oldest_ignores_category() {
        let (clock, store) = make_store();
        clock.set(5);
        store.put("newer", values(&[1.0]), Category::Feature);
        clock.set(2);
        store.put("oldest", values(&[2.0]), Category::Label);
        clock.set(9);
        store.put("newest", values(&[3.0]), Category::Subset);

        let victim = store.evict_oldest().unwrap();
        assert_eq!(victim.name, "oldest");
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn evict_oldest_breaks_ties_by_insertion() {
        let (_clock, store) = make_store();
        store.put("first", values(&[1.0]), Category::Subset);
        store.put("second", values(&[2.0]), Category::Feature);
        assert_eq!(store.evict_oldest().unwrap().name, "first");
        assert_eq!(store.evict_oldest().unwrap().name, "second");
        assert!(store.evict_oldest().is_none());
    }

    #[test]
    fn concurrent_puts_keep_one_entry_per_hash() {
        let (_clock, store) = make_store();
        let store = Arc::new(store);
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let data = values(&[i as f64]);
                        store.put(&format!("t{t}-{i}"), data, Category::Feature);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let hashes: std::collections::HashSet<_> = store
            .list(Category::Feature)
            .into_iter()
            .map(|e| e.hash)
            .collect();
        assert_eq!(hashes.len(), 50);
    }
}
