//! Greedy farthest-point selection across many feature dimensions.
//!
//! Starting from a seed point, the selector repeatedly takes the sample whose
//! distance to the nearest already-chosen sample is largest. A running
//! "distance to nearest chosen" value is kept per sample and lowered with
//! each pick, so every iteration costs one pass over the data. Chosen samples
//! carry a distance of `-1` so they can never win again.

use codex_config::SamplingConfig;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use tracing::debug;

use crate::cancel::Interrupt;
use crate::error::SamplingError;
use crate::metric::DistanceMetric;
use crate::noise::separating_noise;
use crate::normalize::Normalization;

/// Distance recorded for samples already chosen.
const TAKEN: f64 = -1.0;

/// Multiplier applied to the data's bounding-box diagonal to form the
/// initial "very far" distance.
const FAR_FACTOR: f64 = 1.0e6;

/// Settings for [`mask_spanning_subset`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpanningOptions {
    /// Rescaling applied to each dimension before distances are taken.
    pub normalization: Normalization,
    /// Per-dimension multipliers applied after normalization. `None` weighs
    /// every dimension equally.
    pub weights: Option<Vec<f64>>,
    /// Add separating noise to each dimension before normalizing.
    pub separate_values: bool,
    /// Seed for the separating noise.
    pub noise_seed: u64,
    /// Metric used between samples.
    pub metric: DistanceMetric,
    /// Samples treated as already chosen. Empty means start from sample 0.
    pub preselected: Vec<usize>,
}

impl SpanningOptions {
    /// Reads defaults from the `[sampling]` configuration section.
    pub fn from_config(config: &SamplingConfig) -> Result<Self, SamplingError> {
        Ok(Self {
            normalization: config.normalization.parse()?,
            weights: None,
            separate_values: config.separate_values,
            noise_seed: config.noise_seed,
            metric: config.distance_metric.parse()?,
            preselected: Vec::new(),
        })
    }
}

/// Result of a spanning selection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpanningSelection {
    /// One flag per sample; `true` for chosen samples.
    pub mask: Vec<bool>,
    /// Chosen samples in the order they were taken.
    pub indices: Vec<usize>,
}

impl SpanningSelection {
    fn empty(samples: usize) -> Self {
        Self {
            mask: vec![false; samples],
            indices: Vec::new(),
        }
    }

    fn everything(samples: usize) -> Self {
        Self {
            mask: vec![true; samples],
            indices: (0..samples).collect(),
        }
    }

    /// Chosen samples in ascending order.
    pub fn sorted_indices(&self) -> Vec<usize> {
        self.mask
            .iter()
            .enumerate()
            .filter_map(|(i, &taken)| taken.then_some(i))
            .collect()
    }
}

/// Picks `number` maximally spread samples from the joint space of `features`.
///
/// Each element of `features` is one dimension holding a value per sample;
/// all must have the same length. Edge cases:
///
/// - no dimensions is an error;
/// - zero samples gives an empty selection;
/// - `number < 1` selects nothing;
/// - `number` at or above the sample count selects everything, in index order.
///
/// Ties go to the lowest index. The interrupt is checked once per pick.
pub fn mask_spanning_subset(
    features: &[Vec<f64>],
    number: i64,
    options: &SpanningOptions,
    interrupt: &Interrupt,
) -> Result<SpanningSelection, SamplingError> {
    let Some(first) = features.first() else {
        return Err(SamplingError::invalid("No features to span!"));
    };
    let samples = first.len();
    if let Some(dim) = features.iter().position(|f| f.len() != samples) {
        return Err(SamplingError::invalid(format!(
            "feature {dim} has {} samples, expected {samples}",
            features[dim].len()
        )));
    }
    if let Some(weights) = &options.weights {
        if weights.len() != features.len() {
            return Err(SamplingError::invalid(format!(
                "{} weights given for {} features",
                weights.len(),
                features.len()
            )));
        }
    }
    if let Some(&bad) = options.preselected.iter().find(|&&i| i >= samples) {
        return Err(SamplingError::invalid(format!(
            "preselected index {bad} out of range for {samples} samples"
        )));
    }

    if samples == 0 {
        return Ok(SpanningSelection::empty(0));
    }
    if number < 1 {
        return Ok(SpanningSelection::empty(samples));
    }
    let number = usize::try_from(number).unwrap_or(usize::MAX);
    if number >= samples {
        return Ok(SpanningSelection::everything(samples));
    }

    interrupt.check()?;
    let dims = features.len();
    let points = prepare_points(features, options);

    let mut shortest = vec![far_distance(&points, dims, options.metric); samples];
    let mut chosen: Vec<usize> = if options.preselected.is_empty() {
        vec![0]
    } else {
        options.preselected.clone()
    };
    for &i in &chosen {
        shortest[i] = TAKEN;
    }

    // The last seed is folded in by the first iteration of the main loop.
    for &seed in &chosen[..chosen.len() - 1] {
        interrupt.check()?;
        update_shortest(&mut shortest, &points, dims, seed, options.metric);
    }

    let incoming = chosen.len();
    for _ in incoming..number {
        interrupt.check()?;
        let last = chosen[chosen.len() - 1];
        update_shortest(&mut shortest, &points, dims, last, options.metric);

        let next = argmax(&shortest);
        chosen.push(next);
        shortest[next] = TAKEN;
    }

    let mut mask = vec![false; samples];
    for &i in &chosen {
        mask[i] = true;
    }
    debug!(
        samples,
        dims,
        selected = chosen.len(),
        metric = %options.metric,
        "spanning selection done"
    );
    Ok(SpanningSelection {
        mask,
        indices: chosen,
    })
}

/// Builds the row-major `samples x dims` matrix: noise, then normalization,
/// then weights, one dimension at a time.
fn prepare_points(features: &[Vec<f64>], options: &SpanningOptions) -> Vec<f64> {
    let dims = features.len();
    let samples = features[0].len();
    let mut rng = StdRng::seed_from_u64(options.noise_seed);
    let mut points = vec![0.0; samples * dims];

    for (dim, feature) in features.iter().enumerate() {
        let mut column = feature.clone();
        if options.separate_values {
            let noise = separating_noise(&column, &mut rng);
            for (v, n) in column.iter_mut().zip(noise) {
                *v += n;
            }
        }
        options.normalization.apply(&mut column);
        let weight = options.weights.as_ref().map_or(1.0, |w| w[dim]);
        for (row, v) in column.into_iter().enumerate() {
            points[row * dims + dim] = v * weight;
        }
    }
    points
}

/// A distance larger than any two samples can be apart.
fn far_distance(points: &[f64], dims: usize, metric: DistanceMetric) -> f64 {
    let mut hi = vec![f64::NEG_INFINITY; dims];
    let mut lo = vec![f64::INFINITY; dims];
    for row in points.chunks(dims) {
        for (d, &v) in row.iter().enumerate() {
            hi[d] = hi[d].max(v);
            lo[d] = lo[d].min(v);
        }
    }
    let far = metric.distance(&hi, &lo) * FAR_FACTOR;
    if far.is_finite() && far > 0.0 {
        far
    } else {
        f64::MAX
    }
}

fn update_shortest(
    shortest: &mut [f64],
    points: &[f64],
    dims: usize,
    from: usize,
    metric: DistanceMetric,
) {
    let origin = &points[from * dims..(from + 1) * dims];
    shortest
        .par_iter_mut()
        .zip(points.par_chunks(dims))
        .for_each(|(best, row)| {
            let d = metric.distance(row, origin);
            if d < *best {
                *best = d;
            }
        });
}

/// Index of the largest value; the first one wins ties.
fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;

    fn regression_values() -> Vec<f64> {
        [1, 1, 1, 2, 2, 3, 4, 4, 5, 5, 5, 6, 6, 7, 8, 8, 9, 9, 9]
            .iter()
            .map(|&v| v as f64)
            .collect()
    }

    type Selected = Result<SpanningSelection, SamplingError>;

    fn span(features: &[Vec<f64>], number: i64) -> Selected {
        span_with(features, number, &SpanningOptions::default())
    }

    fn span_with(features: &[Vec<f64>], number: i64, options: &SpanningOptions) -> Selected {
        mask_spanning_subset(features, number, options, &Interrupt::none())
    }

    #[test]
    fn regression_selection_order() {
        let vals = regression_values();
        let sel = span(&[vals.clone()], 5).unwrap();
        assert_eq!(sel.indices, vec![0, 16, 8, 5, 13]);
        let picked: Vec<f64> = sel.indices.iter().map(|&i| vals[i]).collect();
        assert_eq!(picked, vec![1.0, 9.0, 5.0, 3.0, 7.0]);
        assert_eq!(sel.mask.iter().filter(|&&m| m).count(), 5);
        assert_eq!(sel.sorted_indices(), vec![0, 5, 8, 13, 16]);
    }

    #[test]
    fn regression_holds_for_every_normalization() {
        let all = [
            Normalization::None,
            Normalization::Standardize,
            Normalization::Scale,
        ];
        for normalization in all {
            let options = SpanningOptions {
                normalization,
                ..SpanningOptions::default()
            };
            let sel = span_with(&[regression_values()], 5, &options).unwrap();
            assert_eq!(sel.indices, vec![0, 16, 8, 5, 13], "{normalization}");
        }
    }

    #[test]
    fn number_equal_to_samples_selects_all() {
        let vals = regression_values();
        let n = vals.len();
        let sel = span(&[vals], n as i64).unwrap();
        assert!(sel.mask.iter().all(|&m| m));
        let mut sorted = sel.indices.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..n).collect::<Vec<_>>());
    }

    #[test]
    fn number_zero_or_negative_selects_nothing() {
        for number in [0, -3] {
            let sel = span(&[regression_values()], number).unwrap();
            assert!(sel.mask.iter().all(|&m| !m));
            assert_eq!(sel.mask.len(), 19);
            assert!(sel.indices.is_empty());
        }
    }

    #[test]
    fn no_features_is_invalid() {
        let err = span(&[], 2).unwrap_err();
        assert!(matches!(err, SamplingError::InvalidParameter { .. }));
    }

    #[test]
    fn no_samples_is_empty() {
        let sel = span(&[Vec::new()], 3).unwrap();
        assert!(sel.mask.is_empty());
        assert!(sel.indices.is_empty());
    }

    #[test]
    fn ragged_features_are_invalid() {
        let err = span(&[vec![1.0, 2.0], vec![1.0]], 1).unwrap_err();
        assert!(matches!(err, SamplingError::InvalidParameter { .. }));
    }

    #[test]
    fn weight_count_must_match() {
        let options = SpanningOptions {
            weights: Some(vec![1.0, 2.0]),
            ..SpanningOptions::default()
        };
        let err = span_with(&[vec![1.0, 2.0]], 1, &options).unwrap_err();
        assert!(matches!(err, SamplingError::InvalidParameter { .. }));
    }

    #[test]
    fn grid_corners_are_taken_first() {
        // 5x5 grid; after (0,0) the far corner, then the remaining corners.
        let mut xs = Vec::new();
        let mut ys = Vec::new();
        for x in 0..5 {
            for y in 0..5 {
                xs.push(x as f64);
                ys.push(y as f64);
            }
        }
        let sel = span(&[xs, ys], 4).unwrap();
        assert_eq!(sel.indices, vec![0, 24, 4, 20]);
    }

    #[test]
    fn preselected_points_seed_the_search() {
        let options = SpanningOptions {
            preselected: vec![16, 0],
            ..SpanningOptions::default()
        };
        let sel = span_with(&[regression_values()], 3, &options).unwrap();
        assert_eq!(sel.indices, vec![16, 0, 8]);
    }

    #[test]
    fn preselected_out_of_range_is_invalid() {
        let options = SpanningOptions {
            preselected: vec![99],
            ..SpanningOptions::default()
        };
        let err = span_with(&[regression_values()], 3, &options).unwrap_err();
        assert!(matches!(err, SamplingError::InvalidParameter { .. }));
    }

    #[test]
    fn weights_steer_selection() {
        // With y weighted to zero only x matters.
        let xs = vec![0.0, 1.0, 2.0, 3.0];
        let ys = vec![0.0, 10.0, -10.0, 0.0];
        let options = SpanningOptions {
            normalization: Normalization::None,
            weights: Some(vec![1.0, 0.0]),
            ..SpanningOptions::default()
        };
        let sel = span_with(&[xs, ys], 2, &options).unwrap();
        assert_eq!(sel.indices, vec![0, 3]);
    }

    #[test]
    fn separating_noise_is_deterministic_per_seed() {
        let options = SpanningOptions {
            separate_values: true,
            noise_seed: 42,
            ..SpanningOptions::default()
        };
        let run = || span_with(&[regression_values()], 6, &options).unwrap();
        assert_eq!(run(), run());
    }

    #[test]
    fn metrics_agree_on_one_dimension() {
        let metrics = [
            DistanceMetric::Euclidean,
            DistanceMetric::Cityblock,
            DistanceMetric::Chebyshev,
        ];
        for metric in metrics {
            let options = SpanningOptions {
                metric,
                ..SpanningOptions::default()
            };
            let sel = span_with(&[regression_values()], 3, &options).unwrap();
            assert_eq!(sel.indices, vec![0, 16, 8], "{metric}");
        }
    }

    #[test]
    fn cancelled_token_stops_selection() {
        let token = CancelToken::new();
        token.cancel();
        let interrupt = Interrupt::none().with_cancel(token);
        let options = SpanningOptions::default();
        let err = mask_spanning_subset(&[regression_values()], 5, &options, &interrupt)
            .unwrap_err();
        assert!(matches!(err, SamplingError::Cancelled));
    }

    #[test]
    fn options_from_config() {
        let config = SamplingConfig {
            normalization: "scale".to_string(),
            distance_metric: "cityblock".to_string(),
            ..SamplingConfig::default()
        };
        let options = SpanningOptions::from_config(&config).unwrap();
        assert_eq!(options.normalization, Normalization::Scale);
        assert_eq!(options.metric, DistanceMetric::Cityblock);

        let bad = SamplingConfig {
            distance_metric: "hamming".to_string(),
            ..SamplingConfig::default()
        };
        assert!(SpanningOptions::from_config(&bad).is_err());
    }
}
