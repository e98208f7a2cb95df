//! Symmetric eigen-decomposition by cyclic Jacobi rotations.
//!
//! Input matrices are field-count sized and decomposed once per
//! aggregation. Eigenvectors are orthogonal to working precision.
//!
//! # Algorithm
//!
//! Each sweep visits every off-diagonal pair `(p, q)` and applies the plane
//! rotation that zeroes `a[p][q]`. After the first few sweeps, entries too
//! small to change either diagonal element are set to zero directly.
//! The iteration stops when every off-diagonal entry is exactly zero.

use std::cmp::Ordering;

use super::matrix::SymmetricMatrix;
use crate::error::{NumericalError, Result};

/// Default sweep budget. Jacobi converges quadratically; well-conditioned
/// inputs of a few dozen fields settle in under ten sweeps.
pub const DEFAULT_MAX_SWEEPS: u32 = 50;

/// Relative slack when picking an eigenvector's dominant component.
pub const DOMINANCE_TOLERANCE: f64 = 1e-9;

/// Sweeps before negligible entries are dropped outright.
const SKIP_SMALL_AFTER: u32 = 4;

/// One eigenvalue with its unit-norm eigenvector.
#[derive(Clone, Debug, PartialEq)]
pub struct EigenPair {
    pub value: f64,
    pub vector: Vec<f64>,
}

impl EigenPair {
    /// Index of the largest-magnitude component.
    ///
    /// Components within [`DOMINANCE_TOLERANCE`] of the maximum count as
    /// tied and the first one wins, so rounding noise cannot flip the choice.
    pub fn dominant_index(&self) -> usize {
        let max = self.vector.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        self.vector
            .iter()
            .position(|v| v.abs() >= max * (1.0 - DOMINANCE_TOLERANCE))
            .unwrap_or(0)
    }
}

/// Result of a successful decomposition.
#[derive(Clone, Debug, PartialEq)]
pub struct Decomposed {
    /// Pairs sorted by eigenvalue, descending.
    pub pairs: Vec<EigenPair>,
    /// Sweeps used.
    pub sweeps: u32,
}

/// Cyclic Jacobi eigensolver for real symmetric matrices.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JacobiSolver {
    max_sweeps: u32,
}

impl Default for JacobiSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl JacobiSolver {
    pub fn new() -> Self {
        Self::with_params(DEFAULT_MAX_SWEEPS)
    }

    /// - `max_sweeps`: full passes over the off-diagonal before giving up
    pub fn with_params(max_sweeps: u32) -> Self {
        Self { max_sweeps }
    }

    pub fn max_sweeps(&self) -> u32 {
        self.max_sweeps
    }

    /// Decompose `matrix` into eigenpairs sorted by eigenvalue, descending.
    ///
    /// Equal eigenvalues are ordered by the index of their dominant
    /// component. Each eigenvector is signed so its dominant component is
    /// positive.
    ///
    /// # Errors
    /// - [`NumericalError::NonFiniteMatrix`] if any entry is NaN or infinite.
    /// - [`NumericalError::NotConverged`] if the sweep budget runs out.
    pub fn decompose(&self, matrix: &SymmetricMatrix) -> Result<Decomposed> {
        if !matrix.is_finite() {
            return Err(NumericalError::NonFiniteMatrix.into());
        }

        let n = matrix.dim();
        let mut a = matrix.clone();
        let mut v = SymmetricMatrix::identity(n);
        let mut sweeps = 0;

        loop {
            if off_diagonal_is_zero(&a) {
                break;
            }
            if sweeps >= self.max_sweeps {
                return Err(NumericalError::NotConverged {
                    sweeps: self.max_sweeps,
                }
                .into());
            }
            sweeps += 1;

            for p in 0..n {
                for q in (p + 1)..n {
                    let apq = a[(p, q)];
                    if apq == 0.0 {
                        continue;
                    }

                    let g = 100.0 * apq.abs();
                    let app = a[(p, p)].abs();
                    let aqq = a[(q, q)].abs();
                    if sweeps > SKIP_SMALL_AFTER && app + g == app && aqq + g == aqq {
                        a.set_symmetric(p, q, 0.0);
                        continue;
                    }

                    rotate(&mut a, &mut v, p, q);
                }
            }
        }

        let mut pairs: Vec<EigenPair> = (0..n)
            .map(|k| {
                let mut pair = EigenPair {
                    value: a[(k, k)],
                    vector: (0..n).map(|i| v[(i, k)]).collect(),
                };
                if pair.vector[pair.dominant_index()] < 0.0 {
                    pair.vector.iter_mut().for_each(|x| *x = -*x);
                }
                pair
            })
            .collect();

        // Entries are finite here; `+ 0.0` folds -0.0 into 0.0 so signed
        // zeros tie.
        pairs.sort_by(|x, y| {
            match (y.value + 0.0)
                .partial_cmp(&(x.value + 0.0))
                .unwrap_or(Ordering::Equal)
            {
                Ordering::Equal => x.dominant_index().cmp(&y.dominant_index()),
                ord => ord,
            }
        });

        Ok(Decomposed { pairs, sweeps })
    }
}

fn off_diagonal_is_zero(a: &SymmetricMatrix) -> bool {
    let n = a.dim();
    (0..n).all(|p| ((p + 1)..n).all(|q| a[(p, q)] == 0.0))
}

/// Apply the rotation that annihilates `a[p][q]`: `A ← Jᵀ A J`, `V ← V J`.
fn rotate(a: &mut SymmetricMatrix, v: &mut SymmetricMatrix, p: usize, q: usize) {
    let n = a.dim();
    let apq = a[(p, q)];
    let theta = (a[(q, q)] - a[(p, p)]) / (2.0 * apq);
    let t = if theta.abs() > 1e150 {
        // θ² would overflow; t → 1/(2θ)
        0.5 / theta
    } else {
        theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt())
    };
    let c = 1.0 / (t * t + 1.0).sqrt();
    let s = t * c;

    for k in 0..n {
        let akp = a[(k, p)];
        let akq = a[(k, q)];
        a[(k, p)] = c * akp - s * akq;
        a[(k, q)] = s * akp + c * akq;
    }
    for k in 0..n {
        let apk = a[(p, k)];
        let aqk = a[(q, k)];
        a[(p, k)] = c * apk - s * aqk;
        a[(q, k)] = s * apk + c * aqk;
    }
    a.set_symmetric(p, q, 0.0);

    for k in 0..n {
        let vkp = v[(k, p)];
        let vkq = v[(k, q)];
        v[(k, p)] = c * vkp - s * vkq;
        v[(k, q)] = s * vkp + c * vkq;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PcaError;
    use approx::assert_relative_eq;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn dot(a: &[f64], b: &[f64]) -> f64 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    fn random_symmetric(n: usize, seed: u64) -> SymmetricMatrix {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let data: Vec<f64> = (0..n * n).map(|_| rng.gen_range(-1.0..1.0)).collect();
        SymmetricMatrix::from_row_major(n, data).unwrap()
    }

    fn check_decomposition(m: &SymmetricMatrix, d: &Decomposed) {
        let n = m.dim();
        assert_eq!(d.pairs.len(), n);

        for w in d.pairs.windows(2) {
            assert!(w[0].value >= w[1].value, "not sorted: {} < {}", w[0].value, w[1].value);
        }

        for (i, pi) in d.pairs.iter().enumerate() {
            assert_relative_eq!(dot(&pi.vector, &pi.vector).sqrt(), 1.0, epsilon = 1e-12);
            for pj in &d.pairs[i + 1..] {
                assert!(dot(&pi.vector, &pj.vector).abs() < 1e-12);
            }
            // A v = λ v
            let av = m.mul_vec(&pi.vector).unwrap();
            for (x, y) in av.iter().zip(&pi.vector) {
                assert!((x - pi.value * y).abs() < 1e-10, "residual too large");
            }
        }

        let sum: f64 = d.pairs.iter().map(|p| p.value).sum();
        assert_relative_eq!(sum, m.trace(), epsilon = 1e-10);
    }

    #[test]
    fn test_two_by_two() {
        let m = SymmetricMatrix::from_row_major(2, vec![2.0, 1.0, 1.0, 2.0]).unwrap();
        let d = JacobiSolver::new().decompose(&m).unwrap();
        assert_relative_eq!(d.pairs[0].value, 3.0, epsilon = 1e-14);
        assert_relative_eq!(d.pairs[1].value, 1.0, epsilon = 1e-14);

        let h = std::f64::consts::FRAC_1_SQRT_2;
        assert_relative_eq!(d.pairs[0].vector[0], h, epsilon = 1e-14);
        assert_relative_eq!(d.pairs[0].vector[1], h, epsilon = 1e-14);
        assert_relative_eq!(d.pairs[1].vector[0].abs(), h, epsilon = 1e-14);
        assert_relative_eq!(d.pairs[1].vector[0], -d.pairs[1].vector[1], epsilon = 1e-14);
        check_decomposition(&m, &d);
    }

    #[test]
    fn test_random_matrices() {
        for (n, seed) in [(1, 1), (3, 2), (5, 3), (8, 4), (16, 5)] {
            let m = random_symmetric(n, seed);
            let d = JacobiSolver::new().decompose(&m).unwrap();
            check_decomposition(&m, &d);
        }
    }

    #[test]
    fn test_diagonal_input_needs_no_sweeps() {
        let mut m = SymmetricMatrix::zeros(3);
        m[(0, 0)] = 1.0;
        m[(1, 1)] = 5.0;
        m[(2, 2)] = 3.0;
        let d = JacobiSolver::new().decompose(&m).unwrap();
        assert_eq!(d.sweeps, 0);
        let values: Vec<f64> = d.pairs.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![5.0, 3.0, 1.0]);
        assert_eq!(d.pairs[0].vector, vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_ties_ordered_by_dominant_index() {
        let d = JacobiSolver::new()
            .decompose(&SymmetricMatrix::identity(3))
            .unwrap();
        let dominant: Vec<usize> = d.pairs.iter().map(EigenPair::dominant_index).collect();
        assert_eq!(dominant, vec![0, 1, 2]);
    }

    #[test]
    fn test_signed_zero_eigenvalues_tie() {
        let mut m = SymmetricMatrix::zeros(2);
        m[(0, 0)] = -0.0;
        m[(1, 1)] = 0.0;
        let d = JacobiSolver::new().decompose(&m).unwrap();
        assert_eq!(d.pairs[0].vector, vec![1.0, 0.0]);
        assert_eq!(d.pairs[1].vector, vec![0.0, 1.0]);
        assert_eq!(d.pairs[0].value, 0.0);
    }

    #[test]
    fn test_empty_matrix() {
        let d = JacobiSolver::new()
            .decompose(&SymmetricMatrix::zeros(0))
            .unwrap();
        assert!(d.pairs.is_empty());
    }

    #[test]
    fn test_non_finite_rejected() {
        let m = SymmetricMatrix::from_row_major(2, vec![1.0, f64::NAN, f64::NAN, 1.0]).unwrap();
        assert!(matches!(
            JacobiSolver::new().decompose(&m),
            Err(PcaError::Numerical(NumericalError::NonFiniteMatrix))
        ));
    }

    #[test]
    fn test_sweep_budget_exhausted() {
        let m = random_symmetric(6, 9);
        let err = JacobiSolver::with_params(1).decompose(&m).unwrap_err();
        assert!(matches!(
            err,
            PcaError::Numerical(NumericalError::NotConverged { sweeps: 1 })
        ));
    }
}
