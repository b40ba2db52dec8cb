//! Row filtering by cached subset masks.

use codex_common::{ContentHash, FeatureArray};

use crate::entry::Category;
use crate::error::CacheError;
use crate::store::CacheStore;

/// Keeps the rows of `feature` whose mask value is non-zero.
///
/// The mask holds one value per row: a rank-1 array, or a rank-2 array with
/// a single column.
pub fn apply_subset_mask(
    feature: &FeatureArray,
    mask: &FeatureArray,
) -> Result<FeatureArray, CacheError> {
    if mask.cols() != 1 {
        return Err(CacheError::ShapeMismatch {
            context: "subset mask columns".to_string(),
            expected: 1,
            actual: mask.cols(),
        });
    }
    if mask.rows() != feature.rows() {
        return Err(CacheError::ShapeMismatch {
            context: "subset mask".to_string(),
            expected: feature.rows(),
            actual: mask.rows(),
        });
    }
    let keep: Vec<usize> = mask
        .iter()
        .enumerate()
        .filter(|(_, m)| *m != 0.0)
        .map(|(i, _)| i)
        .collect();
    Ok(feature.select_rows(&keep))
}

impl CacheStore {
    /// Filters `feature` by the cached subset with hash `mask_hash`.
    ///
    /// Returns the filtered array and the subset's name.
    pub fn apply_subset_mask(
        &self,
        feature: &FeatureArray,
        mask_hash: &ContentHash,
    ) -> Result<(FeatureArray, String), CacheError> {
        let subset = self
            .get_by_hash(mask_hash, Category::Subset)
            .ok_or_else(|| CacheError::not_found(Category::Subset, mask_hash))?;
        let filtered = apply_subset_mask(feature, &subset.data)?;
        Ok((filtered, subset.name))
    }
}
