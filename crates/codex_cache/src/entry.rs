//! Cache entries and the closed set of categories they live in.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use codex_common::{ContentHash, FeatureArray};
use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;
use crate::error::CacheError;

/// The partition an entry is stored in.
///
/// Feature and Subset entries are identified by content hash, Label entries
/// by name, and Downsample entries by name (the source array's hash) together
/// with their sample count.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum Category {
    /// Raw feature columns.
    Feature,
    /// Boolean or 0/1 row masks.
    Subset,
    /// Reduced arrays, named by the hash of the array they came from.
    Downsample,
    /// Model output labels.
    Label,
}

impl Category {
    /// All categories, in partition order.
    pub const ALL: [Category; 4] = [
        Category::Feature,
        Category::Subset,
        Category::Downsample,
        Category::Label,
    ];

    /// Lowercase name used in logs and category strings.
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Feature => "feature",
            Category::Subset => "subset",
            Category::Downsample => "downsample",
            Category::Label => "label",
        }
    }

    /// Returns `true` if entries in this category are keyed by name.
    pub fn keyed_by_name(self) -> bool {
        matches!(self, Category::Label)
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Category::Feature => 0,
            Category::Subset => 1,
            Category::Downsample => 2,
            Category::Label => 3,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "feature" => Ok(Category::Feature),
            "subset" => Ok(Category::Subset),
            "downsample" => Ok(Category::Downsample),
            "label" => Ok(Category::Label),
            _ => Err(CacheError::InvalidCategory {
                name: s.to_string(),
            }),
        }
    }
}

/// The entry attribute a lookup or update matches on.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Field {
    /// The human-assigned name.
    Name,
    /// The content hash, as 40 hex digits.
    Hash,
}

impl FromStr for Field {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "name" => Ok(Field::Name),
            "hash" => Ok(Field::Hash),
            other => Err(CacheError::invalid(format!("unknown lookup field '{other}'"))),
        }
    }
}

/// One stored array.
///
/// The data is shared behind an `Arc`: handing an entry to a caller copies
/// a pointer, never the values, and the values are never mutated after
/// insertion.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Partition the entry lives in.
    pub category: Category,
    /// Human-assigned label; not unique outside the Label category.
    pub name: String,
    /// Digest of the canonical bytes of `data`.
    pub hash: ContentHash,
    /// The stored values.
    pub data: Arc<FeatureArray>,
    /// Length of `data` along its first axis.
    pub samples: usize,
    /// Creation stamp used for eviction ordering.
    pub created_at: Timestamp,
    /// Store-wide insertion counter; breaks `created_at` ties.
    pub seq: u64,
    /// Derived in-session rather than loaded from a file.
    pub virtual_feature: bool,
}

impl CacheEntry {
    /// Returns `true` if `field` of this entry equals `value`.
    ///
    /// Hash values compare as hex digests, ignoring case.
    pub fn matches(&self, field: Field, value: &str) -> bool {
        match field {
            Field::Name => self.name == value,
            Field::Hash => value
                .parse::<ContentHash>()
                .map_or(false, |h| h == self.hash),
        }
    }

    /// Resident size of the entry's values in bytes.
    pub fn byte_size(&self) -> usize {
        self.data.byte_size()
    }

    /// Eviction order key: oldest first, insertion order on ties.
    pub(crate) fn age_key(&self) -> (Timestamp, u64) {
        (self.created_at, self.seq)
    }
}
