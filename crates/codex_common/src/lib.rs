//! Shared foundational types used across the Codex analytics core.
//!
//! This crate provides the numeric array model stored in the feature cache,
//! SHA-1 content hashing over canonical array bytes, human-readable byte
//! sizes for memory ceilings, and the thread-safe warning sink used to report
//! recoverable failures.

#![warn(missing_docs)]

pub mod array;
pub mod hash;
pub mod size;
pub mod warning;

pub use array::{ArrayError, FeatureArray, Rank};
pub use hash::{ContentHash, ParseHashError};
pub use size::{ByteSize, ParseByteSizeError};
pub use warning::{Warning, WarningCode, WarningSink, DEFAULT_WARNING_CAPACITY};
