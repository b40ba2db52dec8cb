//! Diversity subsampling over cached features.
//!
//! This crate implements greedy farthest-point ("spanning") selection across
//! any number of feature dimensions, the downsampler that memoizes reduced
//! arrays in a [`codex_cache::CacheStore`], cooperative cancellation for both,
//! and the bounded worker pool that long-running selections are dispatched to.

#![warn(missing_docs)]

pub mod cancel;
pub mod downsample;
pub mod error;
pub mod metric;
pub mod noise;
pub mod normalize;
pub mod pool;
pub mod spanning;

pub use cancel::{CancelToken, Interrupt};
pub use downsample::{Algorithm, Downsampler, Target};
pub use error::SamplingError;
pub use metric::DistanceMetric;
pub use noise::separating_noise;
pub use normalize::Normalization;
pub use pool::{JobHandle, WorkerPool};
pub use spanning::{mask_spanning_subset, SpanningOptions, SpanningSelection};
