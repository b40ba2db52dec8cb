//! Per-dimension normalization applied before distances are measured.

use std::fmt;
use std::str::FromStr;

use crate::error::SamplingError;

/// How each feature dimension is rescaled.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Normalization {
    /// Values are used as given.
    None,
    /// Zero mean, unit sample standard deviation.
    #[default]
    Standardize,
    /// Min-max scaling onto `[0, 1]`.
    Scale,
}

impl Normalization {
    /// Rescales `values` in place.
    ///
    /// A dimension with no spread (constant, or a single value) becomes all
    /// zeros under both `Standardize` and `Scale`.
    pub fn apply(self, values: &mut [f64]) {
        if values.is_empty() {
            return;
        }
        match self {
            Normalization::None => {}
            Normalization::Standardize => {
                let n = values.len() as f64;
                let mean = values.iter().sum::<f64>() / n;
                let var = if values.len() > 1 {
                    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)
                } else {
                    0.0
                };
                let std = var.sqrt();
                if std == 0.0 {
                    values.fill(0.0);
                } else {
                    for v in values.iter_mut() {
                        *v = (*v - mean) / std;
                    }
                }
            }
            Normalization::Scale => {
                let min = values.iter().copied().fold(f64::INFINITY, f64::min);
                let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let range = max - min;
                if range == 0.0 {
                    values.fill(0.0);
                } else {
                    for v in values.iter_mut() {
                        *v = (*v - min) / range;
                    }
                }
            }
        }
    }
}

impl fmt::Display for Normalization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Normalization::None => "none",
            Normalization::Standardize => "standardize",
            Normalization::Scale => "scale",
        })
    }
}

impl FromStr for Normalization {
    type Err = SamplingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "no" => Ok(Normalization::None),
            "standardize" | "standard" | "z" => Ok(Normalization::Standardize),
            "scale" | "scaling" | "flat" => Ok(Normalization::Scale),
            other => Err(SamplingError::invalid(format!("unknown normalization '{other}'"))),
        }
    }
}
