//! Distance metrics between points in feature space.

use std::fmt;
use std::str::FromStr;

use crate::error::SamplingError;

/// A distance between two equal-length points.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum DistanceMetric {
    /// Sum of squared differences.
    #[default]
    SqEuclidean,
    /// Straight-line distance.
    Euclidean,
    /// Sum of absolute differences.
    Cityblock,
    /// Largest absolute difference.
    Chebyshev,
    /// One minus the cosine of the angle between the points.
    Cosine,
    /// Sum of `|a - b| / (|a| + |b|)`, skipping terms where both are zero.
    Canberra,
}

impl DistanceMetric {
    /// Distance between `a` and `b`.
    pub fn distance(self, a: &[f64], b: &[f64]) -> f64 {
        let pairs = a.iter().zip(b);
        match self {
            DistanceMetric::SqEuclidean => pairs.map(|(x, y)| (x - y) * (x - y)).sum(),
            DistanceMetric::Euclidean => DistanceMetric::SqEuclidean.distance(a, b).sqrt(),
            DistanceMetric::Cityblock => pairs.map(|(x, y)| (x - y).abs()).sum(),
            DistanceMetric::Chebyshev => pairs.map(|(x, y)| (x - y).abs()).fold(0.0, f64::max),
            DistanceMetric::Cosine => {
                let (dot, na, nb) = pairs.fold((0.0, 0.0, 0.0), |(d, na, nb), (x, y)| {
                    (d + x * y, na + x * x, nb + y * y)
                });
                1.0 - dot / (na.sqrt() * nb.sqrt())
            }
            DistanceMetric::Canberra => pairs
                .map(|(x, y)| {
                    let denom = x.abs() + y.abs();
                    if denom == 0.0 {
                        0.0
                    } else {
                        (x - y).abs() / denom
                    }
                })
                .sum(),
        }
    }

    /// Lowercase name, as accepted by [`FromStr`].
    pub fn as_str(self) -> &'static str {
        match self {
            DistanceMetric::SqEuclidean => "sqeuclidean",
            DistanceMetric::Euclidean => "euclidean",
            DistanceMetric::Cityblock => "cityblock",
            DistanceMetric::Chebyshev => "chebyshev",
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::Canberra => "canberra",
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistanceMetric {
    type Err = SamplingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqeuclidean" => Ok(DistanceMetric::SqEuclidean),
            "euclidean" => Ok(DistanceMetric::Euclidean),
            "cityblock" | "manhattan" => Ok(DistanceMetric::Cityblock),
            "chebyshev" => Ok(DistanceMetric::Chebyshev),
            "cosine" => Ok(DistanceMetric::Cosine),
            "canberra" => Ok(DistanceMetric::Canberra),
            other => Err(SamplingError::invalid(format!("unknown distance metric '{other}'"))),
        }
    }
}
