//! Covariance-matrix validation, nearest-PSD repair, and Cholesky factorization.
//!
//! References:
//! - Higham, N. (2002), *Computing the nearest correlation matrix*, for the PSD
//!   projection idea (here the simpler eigenvalue-clipping variant, since the
//!   covariance has no unit-diagonal constraint).
//! - Glasserman, P. (2004), *Monte Carlo Methods in Financial Engineering*,
//!   Ch. 2.3, for correlated-shock generation from a lower-triangular factor.
//!
//! Estimation noise across many instruments can push a sample covariance
//! slightly outside the PSD cone; the factorizer either repairs it (and reports
//! the repair) or refuses, depending on the caller's configuration.

use nalgebra::{DMatrix, DVector, SymmetricEigen};

use crate::core::SimulationError;

/// Eigenvalues above `-PSD_TOL` are treated as non-negative.
const PSD_TOL: f64 = 1.0e-10;

/// Pivot tolerance below which a Cholesky diagonal entry collapses to exactly
/// zero. Exact zeros matter: a zero-volatility instrument must receive a shock
/// of exactly `0.0` so the degenerate deterministic path is bit-exact.
const PIVOT_TOL: f64 = 1.0e-12;

/// Lower-triangular factor `L` of a covariance matrix with `L · Lᵗ ≈ Σ`.
#[derive(Debug, Clone, PartialEq)]
pub struct CholeskyFactor {
    lower: Vec<Vec<f64>>,
}

impl CholeskyFactor {
    /// Number of factors (matrix dimension).
    pub fn dim(&self) -> usize {
        self.lower.len()
    }

    /// The lower-triangular factor, row-major.
    pub fn lower(&self) -> &[Vec<f64>] {
        &self.lower
    }

    /// Transforms independent draws into correlated, covariance-scaled shocks.
    ///
    /// `out[i]` carries the standard deviation of factor `i` at the scale of
    /// the input covariance (annualized in this engine).
    pub fn correlate(&self, indep: &[f64], out: &mut [f64]) {
        debug_assert_eq!(indep.len(), self.lower.len());
        debug_assert_eq!(out.len(), self.lower.len());
        for (i, row) in self.lower.iter().enumerate() {
            let mut sum = 0.0;
            for (lij, z) in row.iter().zip(indep.iter()).take(i + 1) {
                sum += lij * z;
            }
            out[i] = sum;
        }
    }

    /// Reconstructs `L · Lᵗ` for round-trip verification.
    pub fn reconstruct(&self) -> Vec<Vec<f64>> {
        let n = self.lower.len();
        let mut out = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in 0..n {
                let k = i.min(j) + 1;
                out[i][j] = self.lower[i]
                    .iter()
                    .zip(self.lower[j].iter())
                    .take(k)
                    .map(|(a, b)| a * b)
                    .sum();
            }
        }
        out
    }
}

/// Checks that a covariance matrix is square, finite, and symmetric.
pub fn validate_covariance_matrix(matrix: &[Vec<f64>]) -> Result<(), SimulationError> {
    let n = matrix.len();
    if n == 0 || matrix.iter().any(|row| row.len() != n) {
        return Err(SimulationError::InvalidConfiguration(
            "covariance matrix must be square and non-empty".to_string(),
        ));
    }
    for (i, row) in matrix.iter().enumerate() {
        for (j, &v) in row.iter().enumerate() {
            if !v.is_finite() {
                return Err(SimulationError::InvalidConfiguration(
                    "covariance entries must be finite".to_string(),
                ));
            }
            if (v - matrix[j][i]).abs() > 1.0e-10 {
                return Err(SimulationError::InvalidConfiguration(
                    "covariance matrix must be symmetric".to_string(),
                ));
            }
        }
        if row[i] < 0.0 {
            return Err(SimulationError::InvalidConfiguration(
                "covariance diagonal must be non-negative".to_string(),
            ));
        }
    }
    Ok(())
}

/// Minimum eigenvalue of a symmetric matrix, `None` for malformed input.
pub fn min_eigenvalue_symmetric(matrix: &[Vec<f64>]) -> Option<f64> {
    let n = matrix.len();
    if n == 0 || matrix.iter().any(|row| row.len() != n) {
        return None;
    }
    let eig = SymmetricEigen::new(to_dmatrix(matrix));
    eig.eigenvalues.iter().copied().reduce(f64::min)
}

/// Returns `true` if the matrix is positive semi-definite within tolerance.
pub fn is_positive_semidefinite(matrix: &[Vec<f64>], tol: f64) -> bool {
    min_eigenvalue_symmetric(matrix).is_some_and(|lmin| lmin >= -tol)
}

/// Projects a symmetric matrix onto the PSD cone by clipping negative
/// eigenvalues to zero.
pub fn nearest_psd_by_eigenvalue_clipping(matrix: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let eig = SymmetricEigen::new(symmetrize(&to_dmatrix(matrix)));
    let clipped = eig
        .eigenvalues
        .iter()
        .map(|v| v.max(0.0))
        .collect::<Vec<_>>();
    let d = DMatrix::from_diagonal(&DVector::from_vec(clipped));
    let projected = symmetrize(&(eig.eigenvectors.clone() * d * eig.eigenvectors.transpose()));
    from_dmatrix(&projected)
}

/// Factorizes a covariance matrix into its lower-triangular Cholesky factor.
///
/// A non-PSD estimate is projected to the nearest PSD matrix first when
/// `repair` is set; the returned `Option<f64>` then carries the offending
/// minimum eigenvalue so the caller can record the correction. With `repair`
/// unset, a non-PSD input aborts with [`SimulationError::NonPositiveDefiniteCovariance`].
pub fn factorize_covariance(
    covariance: &[Vec<f64>],
    repair: bool,
) -> Result<(CholeskyFactor, Option<f64>), SimulationError> {
    validate_covariance_matrix(covariance)?;

    let min_eigenvalue = min_eigenvalue_symmetric(covariance).ok_or_else(|| {
        SimulationError::InvalidConfiguration("covariance matrix must be square".to_string())
    })?;

    if min_eigenvalue >= -PSD_TOL {
        let factor = cholesky_lower_psd(covariance).ok_or(
            SimulationError::NonPositiveDefiniteCovariance { min_eigenvalue },
        )?;
        return Ok((factor, None));
    }

    if !repair {
        return Err(SimulationError::NonPositiveDefiniteCovariance { min_eigenvalue });
    }

    let repaired = nearest_psd_by_eigenvalue_clipping(covariance);
    let factor = cholesky_lower_psd(&repaired).ok_or(
        SimulationError::NonPositiveDefiniteCovariance { min_eigenvalue },
    )?;
    Ok((factor, Some(min_eigenvalue)))
}

/// Cholesky decomposition tolerant of exact semi-definiteness.
///
/// Zero-variance rows produce exactly-zero factor rows rather than a jittered
/// pivot, so degenerate instruments stay deterministic.
fn cholesky_lower_psd(matrix: &[Vec<f64>]) -> Option<CholeskyFactor> {
    let n = matrix.len();
    let mut l = vec![vec![0.0_f64; n]; n];

    for i in 0..n {
        for j in 0..=i {
            let mut sum = matrix[i][j];
            for (lik, ljk) in l[i].iter().zip(l[j].iter()).take(j) {
                sum -= lik * ljk;
            }

            if i == j {
                if sum < -PSD_TOL {
                    return None;
                }
                l[i][j] = if sum > PIVOT_TOL { sum.sqrt() } else { 0.0 };
            } else if l[j][j] > 0.0 {
                l[i][j] = sum / l[j][j];
            }
        }
    }

    Some(CholeskyFactor { lower: l })
}

fn to_dmatrix(matrix: &[Vec<f64>]) -> DMatrix<f64> {
    let n = matrix.len();
    let data = matrix
        .iter()
        .flat_map(|row| row.iter().copied())
        .collect::<Vec<_>>();
    DMatrix::from_row_slice(n, n, &data)
}

fn from_dmatrix(matrix: &DMatrix<f64>) -> Vec<Vec<f64>> {
    let n = matrix.nrows();
    let mut out = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..n {
            out[i][j] = matrix[(i, j)];
        }
    }
    out
}

fn symmetrize(m: &DMatrix<f64>) -> DMatrix<f64> {
    0.5 * (m + m.transpose())
}
