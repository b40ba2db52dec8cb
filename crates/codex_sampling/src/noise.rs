//! Tie-breaking noise for low-cardinality dimensions.

use rand::Rng;

/// The noise amplitude is this many times smaller than the smallest gap
/// between distinct values.
pub const NOISE_DIVISOR: f64 = 100.0;

/// Draws uniform noise that separates repeated values without reordering
/// distinct ones.
///
/// Each sample gets `gap / 100 * (u - 0.5)` with `u` uniform in `[0, 1)` and
/// `gap` the smallest difference between distinct non-NaN values. With fewer
/// than two distinct values, `gap` is taken as 100.
pub fn separating_noise<R: Rng + ?Sized>(values: &[f64], rng: &mut R) -> Vec<f64> {
    let mut distinct: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    distinct.sort_by(f64::total_cmp);
    distinct.dedup();

    let gap = if distinct.len() < 2 {
        NOISE_DIVISOR
    } else {
        distinct
            .windows(2)
            .map(|w| w[1] - w[0])
            .fold(f64::INFINITY, f64::min)
    };
    let amplitude = gap / NOISE_DIVISOR;
    values
        .iter()
        .map(|_| amplitude * (rng.gen::<f64>() - 0.5))
        .collect()
}
