//! Column-wise merging of cached features.

use codex_common::{ContentHash, FeatureArray, WarningCode};
use ndarray::{concatenate, Array2, ArrayView2, Axis};
use tracing::debug;

use crate::entry::Category;
use crate::error::CacheError;
use crate::store::CacheStore;

impl CacheStore {
    /// Stacks the named features column-wise into one rank-2 array.
    ///
    /// The first feature fixes the sample count. A later feature with a
    /// different sample count is left out and recorded as a warning. Every
    /// hash must resolve to a cached feature. When only the first feature
    /// remains, it is returned unchanged, whatever its rank.
    pub fn merge_features(&self, hashes: &[ContentHash]) -> Result<FeatureArray, CacheError> {
        if hashes.is_empty() {
            return Err(CacheError::invalid("no features to merge"));
        }

        let resolved = self.resolve_hashes(hashes, Category::Feature);
        let mut entries = Vec::with_capacity(hashes.len());
        for (hash, entry) in hashes.iter().zip(resolved) {
            let Some(entry) = entry else {
                return Err(CacheError::not_found(Category::Feature, hash));
            };
            entries.push(entry);
        }

        let samples = entries[0].samples;
        let mut kept = Vec::with_capacity(entries.len());
        for entry in &entries {
            if entry.samples == samples {
                kept.push(entry);
            } else {
                self.warnings().warn(
                    WarningCode::MergeSampleMismatch,
                    format!(
                        "feature '{}' has {} samples, expected {}; left out of merge",
                        entry.name, entry.samples, samples
                    ),
                );
            }
        }

        if kept.len() == 1 {
            return Ok(kept[0].data.as_ref().clone());
        }

        let matrices: Vec<Array2<f64>> = kept.iter().map(|e| e.data.to_matrix()).collect();
        let views: Vec<ArrayView2<'_, f64>> = matrices.iter().map(Array2::view).collect();
        let merged = concatenate(Axis(1), &views)
            .map_err(|e| CacheError::invalid(format!("cannot stack features: {e}")))?;
        debug!(features = kept.len(), samples, "merged features");
        Ok(FeatureArray::Rank2(merged))
    }
}
