//! Memory-triggered eviction of the oldest cached entries.
//!
//! Eviction runs only when [`CacheStore::maintain`] is called. It repeatedly
//! removes the single oldest entry across every category, re-reading the
//! memory probe after each removal, until usage is back under the ceiling,
//! the store is empty, or an eviction fails to lower usage by more than the
//! configured tolerance.

use codex_common::{ByteSize, ContentHash, WarningCode};
use codex_config::CacheConfig;
use tracing::{debug, info};

use crate::clock::Timestamp;
use crate::entry::Category;
use crate::error::CacheError;
use crate::store::CacheStore;

/// Whether measured usage is over the ceiling.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PressureState {
    /// Usage is at or below the ceiling.
    Normal,
    /// Usage exceeds the ceiling.
    UnderPressure,
}

/// Summary of an entry removed by eviction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvictedEntry {
    /// Category the entry was removed from.
    pub category: Category,
    /// The entry's name.
    pub name: String,
    /// The entry's content hash.
    pub hash: ContentHash,
    /// When the entry was created.
    pub created_at: Timestamp,
    /// Bytes of data the entry held.
    pub bytes: u64,
}

/// Outcome of one [`CacheStore::maintain`] pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvictionReport {
    /// Pressure before any eviction.
    pub initial_state: PressureState,
    /// Pressure after the last probe.
    pub final_state: PressureState,
    /// Entries removed, oldest first.
    pub evicted: Vec<EvictedEntry>,
    /// The store ran out of entries while still over the ceiling.
    pub exhausted: bool,
    /// An eviction lowered usage by no more than the tolerance.
    pub stalled: bool,
    /// Usage measured before the pass.
    pub usage_before: u64,
    /// Usage measured at the end of the pass.
    pub usage_after: u64,
}

impl EvictionReport {
    /// The exhaustion condition as an error value, for callers that want to
    /// escalate it.
    pub fn exhaustion(&self, ceiling: ByteSize) -> Option<CacheError> {
        self.exhausted.then(|| CacheError::ResourceExhausted {
            usage: self.usage_after,
            ceiling: ceiling.bytes(),
        })
    }
}

/// Ceiling and tolerance bounds for eviction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EvictionManager {
    ceiling: ByteSize,
    tolerance: ByteSize,
}

impl EvictionManager {
    /// Creates a manager that evicts above `ceiling`.
    ///
    /// An eviction that lowers usage by `tolerance` bytes or less counts as
    /// no progress and ends the pass.
    pub fn new(ceiling: ByteSize, tolerance: ByteSize) -> Self {
        Self { ceiling, tolerance }
    }

    /// Creates a manager from the `[cache]` configuration section.
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.eviction_ceiling, config.eviction_tolerance)
    }

    /// The configured ceiling.
    pub fn ceiling(&self) -> ByteSize {
        self.ceiling
    }

    /// The configured tolerance.
    pub fn tolerance(&self) -> ByteSize {
        self.tolerance
    }

    /// Classifies a usage reading.
    pub fn state(&self, usage: u64) -> PressureState {
        if usage > self.ceiling.bytes() {
            PressureState::UnderPressure
        } else {
            PressureState::Normal
        }
    }

    /// Runs one eviction pass over `store`.
    ///
    /// Shortfalls are reported through the store's warning sink and the
    /// returned report, never as an error.
    pub fn run(&self, store: &CacheStore) -> EvictionReport {
        let probe = store.probe();
        let usage_before = probe.resident_bytes(store.total_bytes());
        let initial_state = self.state(usage_before);

        let mut report = EvictionReport {
            initial_state,
            final_state: initial_state,
            evicted: Vec::new(),
            exhausted: false,
            stalled: false,
            usage_before,
            usage_after: usage_before,
        };
        if initial_state == PressureState::Normal {
            return report;
        }

        info!(
            usage = usage_before,
            ceiling = self.ceiling.bytes(),
            "memory over ceiling, evicting oldest entries"
        );

        let mut usage = usage_before;
        while self.state(usage) == PressureState::UnderPressure {
            let Some(entry) = store.evict_oldest() else {
                report.exhausted = true;
                store.warnings().warn(
                    WarningCode::ResourceExhausted,
                    format!(
                        "cache is empty but usage {} is still over the {} ceiling",
                        ByteSize::new(usage),
                        self.ceiling
                    ),
                );
                break;
            };

            debug!(
                category = %entry.category,
                name = %entry.name,
                hash = %entry.hash,
                "evicted entry"
            );
            report.evicted.push(EvictedEntry {
                category: entry.category,
                name: entry.name.clone(),
                hash: entry.hash,
                created_at: entry.created_at,
                bytes: entry.byte_size() as u64,
            });
            drop(entry);

            let next = probe.resident_bytes(store.total_bytes());
            let freed = usage.saturating_sub(next);
            usage = next;
            let over = self.state(usage) == PressureState::UnderPressure;
            if over && freed <= self.tolerance.bytes() {
                report.stalled = true;
                store.warnings().warn(
                    WarningCode::EvictionStalled,
                    format!(
                        "eviction freed {freed} bytes, within the {} tolerance; \
                         stopping with usage {}",
                        self.tolerance,
                        ByteSize::new(usage)
                    ),
                );
                break;
            }
        }

        report.usage_after = usage;
        report.final_state = self.state(usage);
        info!(
            evicted = report.evicted.len(),
            usage,
            "eviction pass finished"
        );
        report
    }
}
