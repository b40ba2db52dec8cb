//! Failures of the feature cache and its session files.

use std::fmt;
use std::path::PathBuf;

/// Why a cache operation could not complete.
///
/// Plain lookups never produce these: a missing entry is an `Option::None`
/// so analysis code can degrade gracefully. Errors are reserved for caller
/// bugs and bad input (shape and parameter violations), for operations that
/// cannot proceed without an entry (merging, masking), and for session blob
/// I/O.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// A hash or name required by the operation is not in the store.
    #[error("{category} entry not found: {key}")]
    NotFound {
        /// Category that was searched.
        category: String,
        /// The hash or name that was looked up.
        key: String,
    },

    /// Two arrays disagree on their sample count.
    #[error("shape mismatch in {context}: expected {expected} samples, got {actual}")]
    ShapeMismatch {
        /// Operation that detected the mismatch.
        context: String,
        /// Sample count required.
        expected: usize,
        /// Sample count supplied.
        actual: usize,
    },

    /// A category name outside {feature, subset, downsample, label}.
    #[error("invalid cache category '{name}'")]
    InvalidCategory {
        /// The unrecognized name.
        name: String,
    },

    /// An argument is out of range or otherwise unusable.
    #[error("invalid parameter: {reason}")]
    InvalidParameter {
        /// Description of the problem.
        reason: String,
    },

    /// Memory is over the ceiling and nothing is left to evict.
    #[error("resource exhausted: {usage} bytes resident, ceiling {ceiling} bytes")]
    ResourceExhausted {
        /// Last measured usage in bytes.
        usage: u64,
        /// Configured ceiling in bytes.
        ceiling: u64,
    },

    /// A saved session with this name already exists.
    #[error("session '{name}' already exists")]
    SessionExists {
        /// The session name.
        name: String,
    },

    /// Reading or writing a session file failed.
    #[error("session file {}: {source}", path.display())]
    Io {
        /// File or directory being accessed.
        path: PathBuf,
        /// What the filesystem reported.
        source: std::io::Error,
    },

    /// The blob does not start with a readable session header.
    #[error("not a session blob: {reason}")]
    InvalidHeader {
        /// What was wrong with the first bytes.
        reason: String,
    },

    /// The payload hash differs from the one written at save time.
    #[error("session payload corrupted: header {recorded:032x}, payload {computed:032x}")]
    ChecksumMismatch {
        /// Hash stored in the header.
        recorded: u128,
        /// Hash of the bytes actually read.
        computed: u128,
    },

    /// The blob was written by an incompatible format revision.
    #[error("session format {found} cannot be read (this build reads format {supported})")]
    VersionMismatch {
        /// Revision found in the header.
        found: u32,
        /// Revision this build writes.
        supported: u32,
    },

    /// Encoding or decoding the snapshot failed.
    #[error("cannot encode session snapshot: {reason}")]
    Serialization {
        /// Encoder or decoder message.
        reason: String,
    },
}

impl CacheError {
    pub(crate) fn not_found(category: impl fmt::Display, key: impl fmt::Display) -> Self {
        CacheError::NotFound {
            category: category.to_string(),
            key: key.to_string(),
        }
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        CacheError::InvalidParameter {
            reason: reason.into(),
        }
    }
}
