//! Memoized reduction of arrays to fewer samples.
//!
//! Results are cached in the Downsample category under the input array's
//! hash (as the entry name), so asking again for the same input and sample
//! count returns the stored array without recomputing.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use codex_cache::{CacheStore, Category};
use codex_common::{ContentHash, FeatureArray, WarningCode};
use codex_config::SamplingConfig;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::cancel::Interrupt;
use crate::error::SamplingError;
use crate::spanning::{mask_spanning_subset, SpanningOptions};

/// How many samples to keep.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Target {
    /// An absolute sample count.
    Samples(usize),
    /// A percentage of the input's samples, in `[0, 100]`.
    Percentage(f64),
}

impl Target {
    /// Resolves to a sample count for an input of `total` samples.
    ///
    /// Returns `None` when the target selects nothing usable.
    pub fn resolve(self, total: usize) -> Option<usize> {
        match self {
            Target::Samples(0) => None,
            Target::Samples(n) => Some(n),
            Target::Percentage(p) if (0.0..=100.0).contains(&p) => {
                let n = (p / 100.0 * total as f64).floor() as usize;
                (n > 0).then_some(n)
            }
            Target::Percentage(_) => None,
        }
    }
}

/// The row selection strategy.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Algorithm {
    /// Every k-th row.
    Simple,
    /// Distinct rows drawn uniformly with a seeded generator.
    Random,
    /// Rows picked by farthest-point selection over all columns.
    #[default]
    Spanning,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Algorithm::Simple => "simple",
            Algorithm::Random => "random",
            Algorithm::Spanning => "spanning",
        })
    }
}

impl FromStr for Algorithm {
    type Err = SamplingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Ok(Algorithm::Simple),
            "random" => Ok(Algorithm::Random),
            "spanning" => Ok(Algorithm::Spanning),
            other => Err(SamplingError::invalid(format!(
                "unknown downsampling algorithm '{other}'"
            ))),
        }
    }
}

/// Downsamples arrays against one session's cache.
pub struct Downsampler {
    store: Arc<CacheStore>,
    options: SpanningOptions,
    algorithm: Algorithm,
}

impl Downsampler {
    /// Creates a downsampler with default spanning options and seed 0.
    pub fn new(store: Arc<CacheStore>) -> Self {
        Self::with_options(store, SpanningOptions::default())
    }

    /// Creates a downsampler whose spanning runs use `options`.
    ///
    /// The random algorithm shares `options.noise_seed`.
    pub fn with_options(store: Arc<CacheStore>, options: SpanningOptions) -> Self {
        Self {
            store,
            options,
            algorithm: Algorithm::default(),
        }
    }

    /// Creates a downsampler from the `[sampling]` configuration section.
    ///
    /// `sampling.algorithm` becomes the default used by
    /// [`downsample_default`](Self::downsample_default).
    pub fn from_config(
        store: Arc<CacheStore>,
        config: &SamplingConfig,
    ) -> Result<Self, SamplingError> {
        let algorithm: Algorithm = config.algorithm.parse()?;
        let options = SpanningOptions::from_config(config)?;
        Ok(Self::with_options(store, options).with_algorithm(algorithm))
    }

    /// Sets the algorithm used when the caller does not name one.
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// The default algorithm.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// The store results are memoized in.
    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// [`downsample`](Self::downsample) with the default algorithm.
    pub fn downsample_default(
        &self,
        array: &FeatureArray,
        target: Target,
        interrupt: &Interrupt,
    ) -> Result<FeatureArray, SamplingError> {
        self.downsample(array, target, self.algorithm, interrupt)
    }

    /// Reduces `array` to the target number of rows.
    ///
    /// An unusable target returns the array unchanged and records a warning.
    /// A target at or above the row count also returns the array unchanged.
    /// NaNs are replaced by their column mean before rows are selected.
    pub fn downsample(
        &self,
        array: &FeatureArray,
        target: Target,
        algorithm: Algorithm,
        interrupt: &Interrupt,
    ) -> Result<FeatureArray, SamplingError> {
        interrupt.check()?;
        let input_hash = ContentHash::of_array(array);
        let total = array.rows();

        let Some(samples) = target.resolve(total) else {
            self.store.warnings().warn(
                WarningCode::InvalidDownsampleTarget,
                format!("target {target:?} is unusable for {total} samples; keeping all"),
            );
            return Ok(array.clone());
        };
        if samples >= total {
            return Ok(array.clone());
        }

        let key = input_hash.to_string();
        if let Some(hit) = self
            .store
            .list(Category::Downsample)
            .into_iter()
            .find(|e| e.name == key && e.samples == samples)
        {
            debug!(input = %input_hash, samples, "downsample cache hit");
            return Ok(hit.data.as_ref().clone());
        }

        let input: Cow<'_, FeatureArray> = if array.has_nan() {
            Cow::Owned(array.impute_nan())
        } else {
            Cow::Borrowed(array)
        };

        let rows = match self.select_rows(&input, samples, algorithm, interrupt) {
            Ok(rows) => rows,
            Err(SamplingError::InvalidParameter { reason }) => {
                self.store.warnings().warn(
                    WarningCode::DownsampleFallback,
                    format!("{algorithm} downsample failed ({reason}); keeping all samples"),
                );
                return Ok(array.clone());
            }
            Err(e) => return Err(e),
        };

        let output = input.select_rows(&rows);
        self.store.put(&key, output.clone(), Category::Downsample);
        self.store.maintain();
        info!(
            input = %input_hash,
            from = total,
            to = output.rows(),
            %algorithm,
            "downsampled"
        );
        Ok(output)
    }

    fn select_rows(
        &self,
        input: &FeatureArray,
        samples: usize,
        algorithm: Algorithm,
        interrupt: &Interrupt,
    ) -> Result<Vec<usize>, SamplingError> {
        let total = input.rows();
        match algorithm {
            Algorithm::Simple => {
                let stride = (total / samples).max(1);
                Ok((0..total).step_by(stride).take(samples).collect())
            }
            Algorithm::Random => {
                let mut rng = StdRng::seed_from_u64(self.options.noise_seed);
                let mut rows = index::sample(&mut rng, total, samples).into_vec();
                rows.sort_unstable();
                Ok(rows)
            }
            Algorithm::Spanning => {
                let number = i64::try_from(samples)
                    .map_err(|_| SamplingError::invalid("sample count too large"))?;
                let columns = input.columns();
                let selection = mask_spanning_subset(&columns, number, &self.options, interrupt)?;
                Ok(selection.sorted_indices())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use codex_cache::{EvictionManager, FootprintProbe, ManualClock};
    use codex_common::ByteSize;

    fn downsampler() -> Downsampler {
        let store = CacheStore::new(
            Arc::new(ManualClock::new(0)),
            Arc::new(FootprintProbe),
            EvictionManager::new(ByteSize::new(1 << 30), ByteSize::new(0)),
        );
        Downsampler::new(Arc::new(store))
    }

    fn ramp(n: usize) -> FeatureArray {
        FeatureArray::from_vec((0..n).map(|i| i as f64).collect())
    }

    fn reduce(
        ds: &Downsampler,
        input: &FeatureArray,
        samples: usize,
        algorithm: Algorithm,
    ) -> FeatureArray {
        let target = Target::Samples(samples);
        ds.downsample(input, target, algorithm, &Interrupt::none())
            .unwrap()
    }

    fn key(array: &FeatureArray) -> String {
        ContentHash::of_array(array).to_string()
    }

    #[test]
    fn target_resolution() {
        assert_eq!(Target::Samples(5).resolve(100), Some(5));
        assert_eq!(Target::Samples(0).resolve(100), None);
        assert_eq!(Target::Percentage(25.0).resolve(10), Some(2));
        assert_eq!(Target::Percentage(150.0).resolve(10), None);
        assert_eq!(Target::Percentage(-1.0).resolve(10), None);
        assert_eq!(Target::Percentage(0.0).resolve(10), None);
    }

    #[test]
    fn simple_takes_every_kth_row() {
        let ds = downsampler();
        let out = reduce(&ds, &ramp(10), 3, Algorithm::Simple);
        assert_eq!(out, FeatureArray::from_vec(vec![0.0, 3.0, 6.0]));
    }

    #[test]
    fn random_is_seeded_and_sorted() {
        let ds = downsampler();
        let a = reduce(&ds, &ramp(50), 7, Algorithm::Random);
        let values: Vec<f64> = a.iter().collect();
        assert_eq!(values.len(), 7);
        assert!(values.windows(2).all(|w| w[0] < w[1]));

        let other = reduce(&downsampler(), &ramp(50), 7, Algorithm::Random);
        assert_eq!(a, other);
    }

    #[test]
    fn spanning_keeps_rows_in_ascending_order() {
        let ds = downsampler();
        let input = FeatureArray::from_ints(&[
            1, 1, 1, 2, 2, 3, 4, 4, 5, 5, 5, 6, 6, 7, 8, 8, 9, 9, 9,
        ]);
        let out = reduce(&ds, &input, 5, Algorithm::Spanning);
        assert_eq!(out, FeatureArray::from_vec(vec![1.0, 3.0, 5.0, 7.0, 9.0]));
    }

    #[test]
    fn result_is_memoized_under_input_hash() {
        let ds = downsampler();
        let input = ramp(20);
        let first = reduce(&ds, &input, 4, Algorithm::Simple);

        let cached = ds.store().list(Category::Downsample);
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].name, key(&input));
        assert_eq!(cached[0].samples, 4);

        // A different algorithm with the same target hits the memo.
        let second = reduce(&ds, &input, 4, Algorithm::Random);
        assert_eq!(first, second);
        assert_eq!(ds.store().list(Category::Downsample).len(), 1);
    }

    #[test]
    fn identical_outputs_from_different_inputs_are_memoized_separately() {
        let ds = downsampler();
        let (short, long) = (ramp(10), ramp(11));
        let a = reduce(&ds, &short, 3, Algorithm::Simple);
        let b = reduce(&ds, &long, 3, Algorithm::Simple);
        assert_eq!(a, b);

        let names: Vec<String> = ds
            .store()
            .list(Category::Downsample)
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec![key(&short), key(&long)]);

        // Both memos hit, so repeating either input stores nothing new.
        assert_eq!(reduce(&ds, &long, 3, Algorithm::Random), b);
        assert_eq!(reduce(&ds, &short, 3, Algorithm::Random), a);
        assert_eq!(ds.store().list(Category::Downsample).len(), 2);
    }

    #[test]
    fn configured_algorithm_is_the_default() {
        let store = Arc::clone(downsampler().store());
        let config = SamplingConfig {
            algorithm: "simple".to_string(),
            ..SamplingConfig::default()
        };
        let ds = Downsampler::from_config(store, &config).unwrap();
        assert_eq!(ds.algorithm(), Algorithm::Simple);

        let out = ds
            .downsample_default(&ramp(10), Target::Samples(3), &Interrupt::none())
            .unwrap();
        assert_eq!(out, FeatureArray::from_vec(vec![0.0, 3.0, 6.0]));
    }

    #[test]
    fn unknown_configured_algorithm_is_rejected() {
        let store = Arc::clone(downsampler().store());
        let config = SamplingConfig {
            algorithm: "kmeans".to_string(),
            ..SamplingConfig::default()
        };
        let err = Downsampler::from_config(store, &config).err().unwrap();
        assert!(matches!(err, SamplingError::InvalidParameter { .. }));
    }

    #[test]
    fn unusable_target_returns_input_with_warning() {
        let ds = downsampler();
        let input = ramp(5);
        let out = ds
            .downsample_default(&input, Target::Samples(0), &Interrupt::none())
            .unwrap();
        assert_eq!(out, input);
        let warnings = ds.store().warnings();
        assert_eq!(warnings.count(WarningCode::InvalidDownsampleTarget), 1);
        assert!(ds.store().list(Category::Downsample).is_empty());
    }

    #[test]
    fn oversized_target_returns_input() {
        let ds = downsampler();
        let input = ramp(5);
        let out = reduce(&ds, &input, 50, Algorithm::Spanning);
        assert_eq!(out, input);
    }

    #[test]
    fn nans_are_imputed_before_selection() {
        let ds = downsampler();
        let input = FeatureArray::from_vec(vec![0.0, f64::NAN, 2.0, 4.0]);
        let out = reduce(&ds, &input, 2, Algorithm::Simple);
        assert_eq!(out, FeatureArray::from_vec(vec![0.0, 2.0]));
        assert!(!out.has_nan());
    }

    #[test]
    fn rank2_spanning_uses_every_column() {
        let ds = downsampler();
        let rows: Vec<Vec<f64>> = (0..5)
            .flat_map(|x| (0..5).map(move |y| vec![x as f64, y as f64]))
            .collect();
        let grid = FeatureArray::from_rows(&rows).unwrap();
        let out = reduce(&ds, &grid, 4, Algorithm::Spanning);
        assert_eq!(out.rows(), 4);
        let values: Vec<f64> = out.iter().collect();
        assert_eq!(values, vec![0.0, 0.0, 0.0, 4.0, 4.0, 0.0, 4.0, 4.0]);
    }

    #[test]
    fn cancelled_downsample_propagates() {
        let ds = downsampler();
        let token = CancelToken::new();
        token.cancel();
        let interrupt = Interrupt::none().with_cancel(token);
        let input = ramp(10);
        let err = ds
            .downsample(&input, Target::Samples(3), Algorithm::Spanning, &interrupt)
            .unwrap_err();
        assert!(matches!(err, SamplingError::Cancelled));
        assert!(ds.store().list(Category::Downsample).is_empty());
    }

    #[test]
    fn algorithm_parse() {
        let parse = |s: &str| Algorithm::from_str(s).unwrap();
        assert_eq!(parse("Spanning"), Algorithm::Spanning);
        assert_eq!(parse("random"), Algorithm::Random);
        assert!("kmeans".parse::<Algorithm>().is_err());
    }
}
