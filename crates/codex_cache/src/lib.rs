//! Content-addressable feature cache.
//!
//! This crate stores the numeric arrays an analytics session works with
//! (features, subset masks, downsamples, labels) keyed by content hash. It
//! provides subset masking, column merging, memory-triggered eviction of the
//! oldest entries, and serialization of a whole session into an opaque blob.

#![warn(missing_docs)]

pub mod clock;
pub mod entry;
pub mod error;
pub mod eviction;
pub mod mask;
pub mod merge;
pub mod probe;
pub mod registry;
pub mod session;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use entry::{CacheEntry, Category, Field};
pub use error::CacheError;
pub use eviction::{EvictedEntry, EvictionManager, EvictionReport, PressureState};
pub use mask::apply_subset_mask;
pub use probe::{FootprintProbe, MemoryProbe, ProcessMemoryProbe};
pub use registry::SessionRegistry;
pub use session::{
    decode_snapshot, deserialize, list_sessions, load_session, save_session, serialize,
    SessionSnapshot, AUTOSAVE_SESSION,
};
pub use store::{CacheCounts, CacheStore, SentinelValues};
