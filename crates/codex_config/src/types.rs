//! Configuration types deserialized from `codex.toml`.

use codex_common::ByteSize;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};

/// The top-level configuration parsed from `codex.toml`.
///
/// Every section is optional; a missing file section takes its defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CodexConfig {
    /// Feature cache settings (eviction ceiling and tolerance).
    #[serde(default)]
    pub cache: CacheConfig,
    /// Defaults for spanning selection and downsampling.
    #[serde(default)]
    pub sampling: SamplingConfig,
    /// Session persistence settings.
    #[serde(default)]
    pub session: SessionConfig,
}

/// Memory bounds for the feature cache.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Resident memory above which cached entries are evicted.
    ///
    /// Accepts a size string (`"2GiB"`, `"500MB"`) or a bare byte count.
    #[serde(default = "default_ceiling", deserialize_with = "deserialize_byte_size")]
    pub eviction_ceiling: ByteSize,
    /// Minimum decrease in measured usage for an eviction to count as progress.
    #[serde(default = "default_tolerance", deserialize_with = "deserialize_byte_size")]
    pub eviction_tolerance: ByteSize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            eviction_ceiling: default_ceiling(),
            eviction_tolerance: default_tolerance(),
        }
    }
}

fn default_ceiling() -> ByteSize {
    ByteSize::new(2 << 30)
}

fn default_tolerance() -> ByteSize {
    ByteSize::new(0)
}

/// Defaults for the spanning selector and downsampler.
///
/// Normalization, metric and algorithm are kept as names here and parsed by
/// the sampling crate, which owns the set of valid values.
#[derive(Debug, Clone, Deserialize)]
pub struct SamplingConfig {
    /// Per-dimension normalization: `none`, `standardize`, or `scale`.
    #[serde(default = "default_normalization")]
    pub normalization: String,
    /// Distance metric name, e.g. `sqeuclidean`, `euclidean`, `cityblock`.
    #[serde(default = "default_metric")]
    pub distance_metric: String,
    /// Whether to add separating noise to low-cardinality dimensions.
    #[serde(default)]
    pub separate_values: bool,
    /// Seed for separating noise and random downsampling.
    #[serde(default)]
    pub noise_seed: u64,
    /// Worker pool size; `0` lets the pool pick one thread per core.
    #[serde(default)]
    pub worker_threads: usize,
    /// Default downsampling algorithm: `simple`, `random`, or `spanning`.
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            normalization: default_normalization(),
            distance_metric: default_metric(),
            separate_values: false,
            noise_seed: 0,
            worker_threads: 0,
            algorithm: default_algorithm(),
        }
    }
}

fn default_normalization() -> String {
    "standardize".to_string()
}

fn default_metric() -> String {
    "sqeuclidean".to_string()
}

fn default_algorithm() -> String {
    "spanning".to_string()
}

/// Where saved sessions live.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Directory holding the `sessions/` tree.
    #[serde(default = "default_save_dir")]
    pub save_dir: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            save_dir: default_save_dir(),
        }
    }
}

fn default_save_dir() -> String {
    ".".to_string()
}

/// Deserializes a byte size given either as a unit string or a bare integer.
///
/// Allows `eviction_ceiling = "2GiB"` as well as `eviction_ceiling = 1048576`.
fn deserialize_byte_size<'de, D>(deserializer: D) -> Result<ByteSize, D::Error>
where
    D: Deserializer<'de>,
{
    struct StringOrInt;

    impl<'de> Visitor<'de> for StringOrInt {
        type Value = ByteSize;

        fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            formatter.write_str("a size string like \"512MiB\" or a byte count")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            v.parse().map_err(E::custom)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(ByteSize::new(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            u64::try_from(v)
                .map(ByteSize::new)
                .map_err(|_| E::custom(format!("byte size cannot be negative: {v}")))
        }
    }

    deserializer.deserialize_any(StringOrInt)
}
