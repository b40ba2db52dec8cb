//! Numeric arrays held by the feature cache.
//!
//! Every cached value is a rank-1 (one value per sample) or rank-2 (one row
//! per sample, one column per dimension) array of `f64`. Integer and string
//! columns are converted on ingestion so that hashing always sees the same
//! canonical representation.

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Errors raised while building or reshaping a [`FeatureArray`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArrayError {
    /// The flat value buffer does not fill the requested shape.
    #[error("cannot shape {len} values into {rows}x{cols}")]
    Shape {
        /// Requested row count.
        rows: usize,
        /// Requested column count.
        cols: usize,
        /// Number of values supplied.
        len: usize,
    },

    /// Rows of a nested input have different lengths.
    #[error("ragged rows: row {row} has {actual} values, expected {expected}")]
    Ragged {
        /// Index of the offending row.
        row: usize,
        /// Length of the first row.
        expected: usize,
        /// Length of the offending row.
        actual: usize,
    },
}

/// The shape of a [`FeatureArray`], branched on instead of probing dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rank {
    /// A single column of `len` samples.
    Rank1 {
        /// Number of samples.
        len: usize,
    },
    /// A `rows` x `cols` matrix, one row per sample.
    Rank2 {
        /// Number of samples.
        rows: usize,
        /// Number of dimensions per sample.
        cols: usize,
    },
}

/// An owned rank-1 or rank-2 `f64` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeatureArray {
    /// One value per sample.
    Rank1(Array1<f64>),
    /// One row per sample.
    Rank2(Array2<f64>),
}

impl FeatureArray {
    /// Wraps a vector of floats as a rank-1 array.
    pub fn from_vec(values: Vec<f64>) -> Self {
        Self::Rank1(Array1::from_vec(values))
    }

    /// Upcasts integer samples to `f64`.
    pub fn from_ints(values: &[i64]) -> Self {
        Self::Rank1(values.iter().map(|&v| v as f64).collect())
    }

    /// Tokenizes string samples to integer codes.
    ///
    /// Codes are assigned by position in the sorted set of distinct strings,
    /// so the same column always produces the same array.
    pub fn from_tokens<S: AsRef<str>>(values: &[S]) -> Self {
        let mut codes: BTreeMap<&str, f64> = values.iter().map(|v| (v.as_ref(), 0.0)).collect();
        for (i, code) in codes.values_mut().enumerate() {
            *code = i as f64;
        }
        Self::Rank1(values.iter().map(|v| codes[v.as_ref()]).collect())
    }

    /// Builds a rank-2 array from a row-major flat buffer.
    pub fn from_shape_vec(rows: usize, cols: usize, values: Vec<f64>) -> Result<Self, ArrayError> {
        let len = values.len();
        Array2::from_shape_vec((rows, cols), values)
            .map(Self::Rank2)
            .map_err(|_| ArrayError::Shape { rows, cols, len })
    }

    /// Builds a rank-2 array from nested rows.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, ArrayError> {
        let cols = rows.first().map_or(0, Vec::len);
        let mut flat = Vec::with_capacity(rows.len() * cols);
        for (row, values) in rows.iter().enumerate() {
            if values.len() != cols {
                return Err(ArrayError::Ragged {
                    row,
                    expected: cols,
                    actual: values.len(),
                });
            }
            flat.extend_from_slice(values);
        }
        Self::from_shape_vec(rows.len(), cols, flat)
    }

    /// Returns the rank and dimensions of this array.
    pub fn rank(&self) -> Rank {
        match self {
            Self::Rank1(v) => Rank::Rank1 { len: v.len() },
            Self::Rank2(m) => {
                let (rows, cols) = m.dim();
                Rank::Rank2 { rows, cols }
            }
        }
    }

    /// Number of samples (length along the first axis).
    pub fn rows(&self) -> usize {
        match self.rank() {
            Rank::Rank1 { len } => len,
            Rank::Rank2 { rows, .. } => rows,
        }
    }

    /// Number of dimensions per sample; a rank-1 array has one.
    pub fn cols(&self) -> usize {
        match self.rank() {
            Rank::Rank1 { .. } => 1,
            Rank::Rank2 { cols, .. } => cols,
        }
    }

    /// Total number of values.
    pub fn len(&self) -> usize {
        match self {
            Self::Rank1(v) => v.len(),
            Self::Rank2(m) => m.len(),
        }
    }

    /// Returns `true` if the array holds no values.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resident size of the value buffer in bytes.
    pub fn byte_size(&self) -> usize {
        self.len() * std::mem::size_of::<f64>()
    }

    /// Iterates all values in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        let (flat, matrix) = match self {
            Self::Rank1(v) => (Some(v.iter()), None),
            Self::Rank2(m) => (None, Some(m.iter())),
        };
        flat.into_iter()
            .flatten()
            .chain(matrix.into_iter().flatten())
            .copied()
    }

    /// The canonical byte form: row-major little-endian `f64` values.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.byte_size());
        for value in self.iter() {
            out.extend_from_slice(&value.to_le_bytes());
        }
        out
    }

    /// Copies column `index` out as a vector.
    ///
    /// A rank-1 array has a single column at index 0. Returns `None` when the
    /// index is out of range.
    pub fn column(&self, index: usize) -> Option<Vec<f64>> {
        match self {
            Self::Rank1(v) if index == 0 => Some(v.to_vec()),
            Self::Rank1(_) => None,
            Self::Rank2(m) if index < m.ncols() => Some(m.column(index).to_vec()),
            Self::Rank2(_) => None,
        }
    }

    /// Copies every column out as a vector, in column order.
    pub fn columns(&self) -> Vec<Vec<f64>> {
        match self {
            Self::Rank1(v) => vec![v.to_vec()],
            Self::Rank2(m) => m.columns().into_iter().map(|c| c.to_vec()).collect(),
        }
    }

    /// Views the array as a matrix; a rank-1 array becomes a single column.
    pub fn to_matrix(&self) -> Array2<f64> {
        match self {
            Self::Rank1(v) => v.clone().insert_axis(Axis(1)),
            Self::Rank2(m) => m.clone(),
        }
    }

    /// Returns a new array holding the given rows, in the given order.
    ///
    /// # Panics
    ///
    /// Panics if any index is out of range.
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        match self {
            Self::Rank1(v) => Self::Rank1(indices.iter().map(|&i| v[i]).collect()),
            Self::Rank2(m) => Self::Rank2(m.select(Axis(0), indices)),
        }
    }

    /// Returns `true` if any value is NaN.
    pub fn has_nan(&self) -> bool {
        self.iter().any(f64::is_nan)
    }

    /// Replaces NaN values with the mean of the non-NaN values in their column.
    ///
    /// A column with no finite mean (all NaN) is filled with zeros.
    pub fn impute_nan(&self) -> Self {
        fn fill(column: &mut ndarray::ArrayViewMut1<'_, f64>) {
            let (sum, count) = column
                .iter()
                .filter(|v| !v.is_nan())
                .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
            let mean = if count == 0 { 0.0 } else { sum / count as f64 };
            column.mapv_inplace(|v| if v.is_nan() { mean } else { v });
        }

        match self {
            Self::Rank1(v) => {
                let mut out = v.clone();
                fill(&mut out.view_mut());
                Self::Rank1(out)
            }
            Self::Rank2(m) => {
                let mut out = m.clone();
                for mut column in out.columns_mut() {
                    fill(&mut column);
                }
                Self::Rank2(out)
            }
        }
    }
}

impl From<Vec<f64>> for FeatureArray {
    fn from(values: Vec<f64>) -> Self {
        Self::from_vec(values)
    }
}

impl From<Array1<f64>> for FeatureArray {
    fn from(values: Array1<f64>) -> Self {
        Self::Rank1(values)
    }
}

impl From<Array2<f64>> for FeatureArray {
    fn from(values: Array2<f64>) -> Self {
        Self::Rank2(values)
    }
}
