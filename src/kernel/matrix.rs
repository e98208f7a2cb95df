//! Covariance and correlation matrices built from [`StreamingStats`].

use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

use super::running_stats::StreamingStats;
use crate::error::{NumericalError, Result};

/// Dense square matrix in row-major storage, kept symmetric by its builders.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SymmetricMatrix {
    n: usize,
    data: Vec<f64>,
}

impl SymmetricMatrix {
    pub fn zeros(n: usize) -> Self {
        Self {
            n,
            data: vec![0.0; n * n],
        }
    }

    pub fn identity(n: usize) -> Self {
        let mut m = Self::zeros(n);
        for i in 0..n {
            m[(i, i)] = 1.0;
        }
        m
    }

    /// Build from row-major data, symmetrising as `(A + Aᵀ) / 2`.
    ///
    /// # Errors
    /// [`NumericalError::DimensionMismatch`] if `data.len() != n * n`.
    pub fn from_row_major(n: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != n * n {
            return Err(NumericalError::DimensionMismatch {
                expected: n * n,
                actual: data.len(),
            }
            .into());
        }
        let mut m = Self { n, data };
        for i in 0..n {
            for j in (i + 1)..n {
                let avg = 0.5 * (m[(i, j)] + m[(j, i)]);
                m[(i, j)] = avg;
                m[(j, i)] = avg;
            }
        }
        Ok(m)
    }

    /// Set `(i, j)` and `(j, i)` together.
    pub fn set_symmetric(&mut self, i: usize, j: usize, value: f64) {
        self[(i, j)] = value;
        self[(j, i)] = value;
    }

    pub fn dim(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn trace(&self) -> f64 {
        (0..self.n).map(|i| self[(i, i)]).sum()
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.n..(i + 1) * self.n]
    }

    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }

    /// Matrix-vector product.
    pub fn mul_vec(&self, v: &[f64]) -> Result<Vec<f64>> {
        if v.len() != self.n {
            return Err(NumericalError::DimensionMismatch {
                expected: self.n,
                actual: v.len(),
            }
            .into());
        }
        Ok((0..self.n)
            .map(|i| self.row(i).iter().zip(v).map(|(a, b)| a * b).sum())
            .collect())
    }
}

impl Index<(usize, usize)> for SymmetricMatrix {
    type Output = f64;

    #[inline]
    fn index(&self, (i, j): (usize, usize)) -> &f64 {
        &self.data[i * self.n + j]
    }
}

impl IndexMut<(usize, usize)> for SymmetricMatrix {
    #[inline]
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut f64 {
        &mut self.data[i * self.n + j]
    }
}

/// Which matrix PCA runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatrixMode {
    /// Raw-scale sample covariance.
    Covariance,
    /// Variance-standardised (Pearson) correlation.
    #[default]
    Correlation,
}

impl MatrixMode {
    pub fn from_use_covariance(use_covariance: bool) -> Self {
        if use_covariance {
            MatrixMode::Covariance
        } else {
            MatrixMode::Correlation
        }
    }

    pub fn uses_covariance(self) -> bool {
        self == MatrixMode::Covariance
    }
}

/// A matrix together with the field ordering that indexes it.
#[derive(Clone, Debug, PartialEq)]
pub struct BuiltMatrix {
    /// Fields kept in the matrix, sorted by name.
    pub fields: Vec<String>,
    pub matrix: SymmetricMatrix,
    /// Fields left out because no usable variance exists for them.
    pub degenerate: Vec<String>,
}

/// Derives covariance/correlation matrices from streaming statistics.
pub struct MatrixBuilder;

impl MatrixBuilder {
    /// Build the matrix for `mode`, excluding degenerate fields.
    ///
    /// A field is degenerate when it has fewer than two observations, or,
    /// in correlation mode, when its variance is exactly zero. Such fields
    /// are reported in [`BuiltMatrix::degenerate`] instead of failing the
    /// build.
    ///
    /// Off-diagonal entries come from each pair's joint correlation, scaled
    /// by the field standard deviations in covariance mode. Pairs observed
    /// together fewer than two times get a zero entry.
    pub fn build(stats: &StreamingStats, mode: MatrixMode) -> BuiltMatrix {
        let mut fields = Vec::new();
        let mut degenerate = Vec::new();

        for (name, moments) in stats.fields() {
            match moments.variance() {
                Some(v) if mode == MatrixMode::Covariance || v > 0.0 => {
                    fields.push(name.to_string())
                }
                _ => degenerate.push(name.to_string()),
            }
        }

        let n = fields.len();
        let mut matrix = SymmetricMatrix::zeros(n);
        for i in 0..n {
            for j in i..n {
                let value = match mode {
                    MatrixMode::Covariance => stats.covariance(&fields[i], &fields[j]),
                    MatrixMode::Correlation => stats.correlation(&fields[i], &fields[j]),
                };
                matrix.set_symmetric(i, j, value.unwrap_or(0.0));
            }
        }

        BuiltMatrix {
            fields,
            matrix,
            degenerate,
        }
    }

    /// Like [`build`](Self::build) but fails on the first degenerate field.
    pub fn build_strict(stats: &StreamingStats, mode: MatrixMode) -> Result<BuiltMatrix> {
        let built = Self::build(stats, mode);
        if let Some(field) = built.degenerate.first() {
            return Err(NumericalError::ZeroVariance {
                field: field.clone(),
            }
            .into());
        }
        Ok(built)
    }
}
